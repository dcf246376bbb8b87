//! Properties of the bucket-config ↔ stream-config mapping (C2/§3).

use jetstream_kv::KvConfig;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    /// `max_history` always survives the round trip through the stream
    /// config's `max_messages_per_subject`, for every value in the valid
    /// 1..=64 range (`spec.md` §3, "Bucket configuration").
    #[test]
    fn max_history_round_trips(max_history in 1u8..=64) {
        let mut cfg = KvConfig::new("bucket");
        cfg.max_history = max_history;
        let stream_cfg = cfg.to_stream_config().unwrap();
        let back = KvConfig::from_stream_config("bucket", &stream_cfg);
        prop_assert_eq!(back.max_history, max_history);
    }

    /// Out-of-range `max_history` is always rejected before it ever
    /// reaches the stream-config derivation.
    #[test]
    fn out_of_range_max_history_is_rejected(max_history in 65u16..=255) {
        let mut cfg = KvConfig::new("bucket");
        cfg.max_history = max_history as u8;
        prop_assert!(cfg.to_stream_config().is_err());
    }

    /// A non-zero TTL is always used as the stream's `duplicate_window`,
    /// per the derivation table in `spec.md` §3.
    #[test]
    fn ttl_drives_duplicate_window_when_set(ttl_secs in 1u64..=86_400) {
        let mut cfg = KvConfig::new("bucket");
        cfg.ttl = Some(Duration::from_secs(ttl_secs));
        let stream_cfg = cfg.to_stream_config().unwrap();
        prop_assert_eq!(stream_cfg.duplicate_window, Duration::from_secs(ttl_secs));
        prop_assert_eq!(stream_cfg.max_age, Duration::from_secs(ttl_secs));
    }
}
