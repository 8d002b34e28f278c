//! Per-instance authentication secret with redacted Debug output.
//!
//! A [`SecretKey`] is generated once per server launch, handed to the caller
//! of `launch` and compared against the key presented on every request. It is
//! never persisted, never logged and never serialized.

use crate::{ErrorLocation, SecretKeyError};

use std::fmt;
use std::panic::Location;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::ser::Error;
use zeroize::Zeroize;

/// Number of random bytes behind a generated key.
pub const SECRET_KEY_BYTES: usize = 32;

/// Shortest encoded key accepted by [`SecretKey::from_str`].
pub const MIN_SECRET_KEY_LENGTH: usize = 16;

/// Longest encoded key accepted by [`SecretKey::from_str`].
pub const MAX_SECRET_KEY_LENGTH: usize = 256;

/// A high-entropy token that never exposes its value in logs or debug output.
#[derive(Clone)]
pub struct SecretKey {
    inner: String,
}

impl SecretKey {
    /// Generate a fresh key from the operating system's CSPRNG.
    ///
    /// The key is [`SECRET_KEY_BYTES`] random bytes encoded as URL-safe base64
    /// without padding, so it is printable and survives a line-oriented pipe.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let inner = URL_SAFE_NO_PAD.encode(bytes);
        bytes.zeroize();
        Self { inner }
    }

    /// Get the actual key value for transmission.
    ///
    /// # Security Note
    /// Only call this when actually sending the key to the server or when
    /// announcing it through the launcher's output channel.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Get the key length (safe to log).
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Compare a presented key against this one.
    ///
    /// Runs in time independent of where the first differing byte is. Length
    /// mismatches return early; key length is not secret.
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.inner.as_bytes();
        let presented = presented.as_bytes();

        if expected.len() != presented.len() {
            return false;
        }

        expected
            .iter()
            .zip(presented)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl FromStr for SecretKey {
    type Err = SecretKeyError;

    #[track_caller]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let length = value.len();

        if !(MIN_SECRET_KEY_LENGTH..=MAX_SECRET_KEY_LENGTH).contains(&length) {
            return Err(SecretKeyError::Invalid {
                reason: format!(
                    "key length {length} outside {MIN_SECRET_KEY_LENGTH}..={MAX_SECRET_KEY_LENGTH}"
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if !value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(SecretKeyError::Invalid {
                reason: String::from("key contains characters outside the URL-safe base64 alphabet"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(Self {
            inner: value.to_string(),
        })
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.as_str())
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED SECRET KEY]")
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

// Prevent accidental serialization
impl serde::Serialize for SecretKey {
    fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Err(S::Error::custom(SecretKeyError::Serialization {
            message: String::from("SecretKey cannot be serialized - use as_str() explicitly"),
            location: ErrorLocation::from(Location::caller()),
        }))
    }
}
