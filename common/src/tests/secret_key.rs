use crate::SecretKey;
use crate::secret_key::{MIN_SECRET_KEY_LENGTH, SECRET_KEY_BYTES};

use std::collections::HashSet;
use std::str::FromStr;

/// **VALUE**: Two independently generated keys must never collide.
///
/// **BUG THIS CATCHES**: A seeded or constant RNG would let a client built for one
/// server authenticate against another.
#[test]
fn given_many_generated_keys_when_compared_then_all_are_distinct() {
    // GIVEN/WHEN: A batch of generated keys
    let keys: HashSet<String> = (0..256)
        .map(|_| SecretKey::generate().as_str().to_string())
        .collect();

    // THEN: No duplicates
    assert_eq!(keys.len(), 256);
}

#[test]
fn given_generated_key_when_inspected_then_is_printable_base64() {
    let key = SecretKey::generate();

    // 32 bytes -> 43 chars of unpadded base64
    assert_eq!(key.len(), (SECRET_KEY_BYTES * 4).div_ceil(3));
    assert!(
        key.as_str()
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    );
}

#[test]
fn given_same_key_when_matched_then_true_and_other_key_false() {
    let key = SecretKey::generate();
    let other = SecretKey::generate();

    assert!(key.matches(key.as_str()));
    assert!(!key.matches(other.as_str()));
    assert!(!key.matches(""));
    assert!(!key.matches(&key.as_str()[1..]));
    assert_ne!(key, other);
}

/// **VALUE**: The key must never end up in logs through `{:?}` or `{}`.
///
/// **BUG THIS CATCHES**: A derived Debug impl would print the secret in every
/// `debug!("{:?}", launcher)` call.
#[test]
fn given_key_when_formatted_then_value_is_redacted() {
    // GIVEN: A generated key
    let key = SecretKey::generate();

    // WHEN: Formatting through Debug and Display
    let debug = format!("{key:?}");
    let display = format!("{key}");

    // THEN: Neither exposes the value
    assert!(!debug.contains(key.as_str()));
    assert!(!display.contains(key.as_str()));
    assert!(debug.contains("REDACTED"));
}

#[test]
fn given_announced_key_when_parsed_then_round_trips() {
    let key = SecretKey::generate();

    let parsed = SecretKey::from_str(key.as_str()).expect("valid key should parse");

    assert_eq!(parsed, key);
}

#[test]
fn given_malformed_keys_when_parsed_then_rejected() {
    let too_short = "a".repeat(MIN_SECRET_KEY_LENGTH - 1);
    let cases = [too_short.as_str(), "", "contains spaces in the key value!", "slash/es/are/not/allowed"];

    for case in cases {
        assert!(SecretKey::from_str(case).is_err(), "should reject: {case:?}");
    }
}

/// **VALUE**: Serializing the key (e.g. as part of a config or state dump) must fail loudly.
#[test]
fn given_key_when_serialized_then_refuses() {
    let key = SecretKey::generate();

    let result = serde_json::to_string(&key);

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("cannot be serialized"));
}
