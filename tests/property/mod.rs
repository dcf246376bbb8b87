//! Property-based tests module

mod naming;
mod stream_config;
