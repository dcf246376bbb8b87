//! Property-based tests entry point
//!
//! Verifies fundamental properties of the naming codec and bucket config
//! mapping that must hold for all valid inputs, independent of any live
//! server.

mod property;
