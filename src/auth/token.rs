//! Opaque bearer credentials.
//!
//! # Format
//! ```text
//! 16 random bytes → base32 (RFC 4648, no padding) → 26-char plaintext
//! plaintext bytes → SHA-256 → 32-byte digest (the only form ever stored)
//! ```

use std::time::{Duration, SystemTime};

use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::principal::UserId;

/// Length of a plaintext token.
pub const TOKEN_LENGTH: usize = 26;

const ENTROPY_BYTES: usize = 16;

/// What a credential may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Authentication,
    Activation,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Authentication => "authentication",
            Scope::Activation => "activation",
        }
    }
}

/// One-way digest of a plaintext token.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenDigest([u8; 32]);

impl TokenDigest {
    pub fn of(plaintext: &str) -> Self {
        Self(Sha256::digest(plaintext.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for TokenDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenDigest({:02x}{:02x}{:02x}{:02x}..)", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// A freshly issued credential.
///
/// `plaintext` exists only here, to be handed to the caller once; stores
/// persist the [`StoredCredential`] half.
#[derive(Debug, Clone)]
pub struct Credential {
    pub plaintext: String,
    pub stored: StoredCredential,
}

/// The persisted half of a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub digest: TokenDigest,
    pub owner: UserId,
    pub expiry: SystemTime,
    pub scope: Scope,
}

impl StoredCredential {
    pub fn is_live(&self, now: SystemTime) -> bool {
        self.expiry > now
    }
}

impl Credential {
    /// Issue a new credential for `owner`, valid for `ttl`.
    pub fn generate(owner: UserId, ttl: Duration, scope: Scope) -> Self {
        let mut entropy = [0u8; ENTROPY_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut entropy);
        let plaintext = BASE32_NOPAD.encode(&entropy);

        let stored = StoredCredential {
            digest: TokenDigest::of(&plaintext),
            owner,
            expiry: SystemTime::now() + ttl,
            scope,
        };
        Self { plaintext, stored }
    }
}

/// Cheap shape check run before any store lookup.
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_LENGTH
        && plaintext
            .bytes()
            .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_shape() {
        let credential = Credential::generate(UserId(1), Duration::from_secs(60), Scope::Activation);
        assert_eq!(credential.plaintext.len(), TOKEN_LENGTH);
        assert!(is_well_formed(&credential.plaintext));
        assert_eq!(credential.stored.digest, TokenDigest::of(&credential.plaintext));
        assert_eq!(credential.stored.scope, Scope::Activation);
        assert!(credential.stored.is_live(SystemTime::now()));
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = Credential::generate(UserId(1), Duration::from_secs(60), Scope::Authentication);
        let b = Credential::generate(UserId(1), Duration::from_secs(60), Scope::Authentication);
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.stored.digest, b.stored.digest);
    }

    #[test]
    fn test_well_formed_rejects_garbage() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("ABCDEFGHIJKLMNOPQRSTUVWXY"));
        assert!(!is_well_formed("ABCDEFGHIJKLMNOPQRSTUVWXYZ2"));
        assert!(!is_well_formed("abcdefghijklmnopqrstuvwxyz"));
        assert!(!is_well_formed("ABCDEFGHIJKLMNOPQRSTUVWX01"));
        assert!(is_well_formed("ABCDEFGHIJKLMNOPQRSTUVWX27"));
    }

    #[test]
    fn test_digest_is_sha256_of_plaintext() {
        let digest = TokenDigest::of("abc");
        assert_eq!(
            digest.as_bytes()[..4],
            [0xba, 0x78, 0x16, 0xbf],
            "SHA-256(\"abc\") starts with ba7816bf"
        );
    }

    #[test]
    fn test_expiry() {
        let credential = Credential::generate(UserId(1), Duration::from_secs(60), Scope::Authentication);
        let later = SystemTime::now() + Duration::from_secs(61);
        assert!(!credential.stored.is_live(later));
    }
}
