//! Bearer-token authentication.
//!
//! # Responsibilities
//! - Parse the `Authorization` header
//! - Reject malformed tokens before touching the credential store
//! - Resolve a live `authentication` credential to its owning Principal
//!
//! # Design Decisions
//! - No header (or an empty one) is not an error: the request proceeds as
//!   `Principal::ANONYMOUS`
//! - "Not found" is `InvalidToken` (permanent); any other store failure is a
//!   server fault (the same token may work once the fault clears)

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::auth::principal::{Principal, UserId};
use crate::auth::token::{is_well_formed, StoredCredential, Scope, TokenDigest};
use crate::error::{Error, StoreError};
use crate::resilience::with_deadline;

/// Storage boundary for credentials. Only digests are ever handed to it.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn insert(&self, credential: StoredCredential) -> Result<(), StoreError>;

    /// The owner of the credential matching `digest` and `scope` whose expiry is after `now`.
    async fn principal_for(
        &self,
        scope: Scope,
        digest: TokenDigest,
        now: SystemTime,
    ) -> Result<Option<Principal>, StoreError>;

    /// Remove every credential of `owner` in `scope`. Returns how many were removed.
    async fn delete_all_for_owner(&self, owner: UserId, scope: Scope) -> Result<usize, StoreError>;
}

/// Turns a raw `Authorization` header into a Principal.
#[derive(Clone)]
pub struct TokenAuthenticator {
    store: Arc<dyn CredentialStore>,
    timeout: Duration,
}

impl TokenAuthenticator {
    pub fn new(store: Arc<dyn CredentialStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn authenticate(&self, header: Option<&str>) -> Result<Principal, Error> {
        let Some(header) = header.filter(|h| !h.is_empty()) else {
            return Ok(Principal::ANONYMOUS);
        };

        let token = bearer_token(header).ok_or(Error::InvalidToken)?;
        if !is_well_formed(token) {
            return Err(Error::InvalidToken);
        }

        self.resolve(Scope::Authentication, token)
            .await?
            .ok_or(Error::InvalidToken)
    }

    /// Look up the owner of a plaintext token in any scope.
    ///
    /// `Ok(None)` covers unknown, expired and wrong-scope tokens alike.
    pub async fn resolve(&self, scope: Scope, plaintext: &str) -> Result<Option<Principal>, Error> {
        let digest = TokenDigest::of(plaintext);
        let lookup = self.store.principal_for(scope, digest, SystemTime::now());
        Ok(with_deadline("credential lookup", self.timeout, lookup).await?)
    }
}

/// `"Bearer <token>"` → `<token>`; anything else → `None`.
fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}
