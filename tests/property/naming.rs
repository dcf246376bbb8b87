//! Properties of the naming & header codec (C1) that must hold for every
//! bucket name / key drawn from the allowed alphabet.

use jetstream_kv::names;
use proptest::prelude::*;

/// A single path segment from the alphabet `spec.md` §3 allows:
/// ASCII letters, digits, `-`, `_`, `/`, `=`.
fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_/=-]{1,12}"
}

/// A dot-separated key built from 1-4 valid segments.
fn valid_key() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..=4).prop_map(|segments| segments.join("."))
}

proptest! {
    #[test]
    fn stream_name_round_trips_through_bucket_from_stream_name(bucket in segment()) {
        let stream = names::stream_name(&bucket);
        prop_assert_eq!(names::bucket_from_stream_name(&stream), Some(bucket.as_str()));
    }

    #[test]
    fn key_subject_round_trips_through_key_from_subject(bucket in segment(), key in valid_key()) {
        let subject = names::key_subject(&bucket, &key);
        prop_assert_eq!(names::key_from_subject(&bucket, &subject), Some(key.as_str()));
    }

    #[test]
    fn any_alphabet_bucket_name_validates(bucket in segment()) {
        prop_assert!(names::validate_bucket_name(&bucket).is_ok());
    }

    #[test]
    fn any_dot_joined_segments_validate_as_a_key(key in valid_key()) {
        prop_assert!(names::validate_key(&key).is_ok());
    }

    #[test]
    fn a_key_with_an_empty_segment_never_validates(prefix in valid_key(), suffix in valid_key()) {
        let doubled_dot = format!("{prefix}..{suffix}");
        prop_assert!(names::validate_key(&doubled_dot).is_err());
    }

    #[test]
    fn watch_subject_prefixes_every_pattern_with_the_bucket_filter(bucket in segment(), key in valid_key()) {
        let watched = names::watch_subject(&bucket, &key).unwrap();
        prop_assert!(watched.starts_with(&format!("$KV.{bucket}.")));
        prop_assert!(watched.ends_with(&key));
    }
}
