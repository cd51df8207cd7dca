//! Optimistic concurrency tokens
//!
//! A token is 8 random bytes reassigned on every accepted mutation. Callers
//! only ever see its wire form (standard base64) and hand it back on the next
//! write; the core compares raw bytes and never interprets them.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::providers::RandomSource;
use super::result::ErrorAggregate;

/// Width of a concurrency token in bytes
pub const TOKEN_LEN: usize = 8;

/// Opaque version stamp of a persisted entity
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConcurrencyToken([u8; TOKEN_LEN]);

impl ConcurrencyToken {
    pub fn from_bytes(bytes: [u8; TOKEN_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }

    /// Draw a fresh token that is guaranteed to differ from `previous`
    pub fn generate(random: &dyn RandomSource, previous: Option<&ConcurrencyToken>) -> Self {
        let mut bytes = [0u8; TOKEN_LEN];
        random.fill_bytes(&mut bytes);
        if previous.is_some_and(|p| p.0 == bytes) {
            bytes[TOKEN_LEN - 1] ^= 0x01;
        }
        Self(bytes)
    }

    /// Wire representation handed to callers
    pub fn to_wire(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Decode a caller-presented token; `None` when it is not a token at all
    pub fn from_wire(wire: &str) -> Option<Self> {
        let decoded = STANDARD.decode(wire.trim()).ok()?;
        let bytes: [u8; TOKEN_LEN] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Debug for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConcurrencyToken({})", self.to_wire())
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl Serialize for ConcurrencyToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for ConcurrencyToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = String::deserialize(deserializer)?;
        ConcurrencyToken::from_wire(&wire)
            .ok_or_else(|| serde::de::Error::custom("invalid concurrency token"))
    }
}

/// Compare a presented wire token against the entity's current token
///
/// Returns the current token on a byte-exact match so the caller can use it
/// as the expected value of the storage compare-and-set. An entity that was
/// never persisted has no token and rejects every presented value.
pub fn check(
    entity: &str,
    current: Option<&ConcurrencyToken>,
    presented: &str,
) -> Result<ConcurrencyToken, ErrorAggregate> {
    let current = current.ok_or_else(|| ErrorAggregate::concurrency(entity))?;
    match ConcurrencyToken::from_wire(presented) {
        Some(token) if token.as_bytes() == current.as_bytes() => Ok(*current),
        _ => Err(ErrorAggregate::concurrency(entity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::ErrorCode;

    struct ConstantRandom(u8);

    impl RandomSource for ConstantRandom {
        fn fill_bytes(&self, dest: &mut [u8]) {
            dest.fill(self.0);
        }

        fn range_inclusive(&self, low: u8, _high: u8) -> u8 {
            low
        }
    }

    #[test]
    fn test_wire_roundtrip() {
        let token = ConcurrencyToken::from_bytes([1, 2, 3, 4, 5, 6, 7, 8]);
        let wire = token.to_wire();
        assert_eq!(ConcurrencyToken::from_wire(&wire), Some(token));
    }

    #[test]
    fn test_wire_rejects_wrong_width_and_garbage() {
        assert!(ConcurrencyToken::from_wire("AQID").is_none());
        assert!(ConcurrencyToken::from_wire("not base64 at all!").is_none());
        assert!(ConcurrencyToken::from_wire("").is_none());
    }

    #[test]
    fn test_generate_never_repeats_previous() {
        let random = ConstantRandom(7);
        let first = ConcurrencyToken::generate(&random, None);
        let second = ConcurrencyToken::generate(&random, Some(&first));
        assert_ne!(first, second);
    }

    #[test]
    fn test_check_matches_exact_bytes() {
        let current = ConcurrencyToken::from_bytes([9; TOKEN_LEN]);
        let ok = check("Usuario", Some(&current), &current.to_wire());
        assert_eq!(ok, Ok(current));

        let stale = ConcurrencyToken::from_bytes([8; TOKEN_LEN]);
        let err = check("Usuario", Some(&current), &stale.to_wire()).unwrap_err();
        assert_eq!(err.codes(), vec![ErrorCode::ConcurrencyError]);
    }

    #[test]
    fn test_check_without_current_token_fails() {
        let token = ConcurrencyToken::from_bytes([1; TOKEN_LEN]);
        assert!(check("Usuario", None, &token.to_wire()).is_err());
    }

    #[test]
    fn test_check_undecodable_is_conflict() {
        let current = ConcurrencyToken::from_bytes([1; TOKEN_LEN]);
        let err = check("Cliente", Some(&current), "%%%").unwrap_err();
        assert!(err.has("Cliente", ErrorCode::ConcurrencyError));
    }
}
