//! Permission codes and their resolution.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::auth::principal::UserId;
use crate::error::StoreError;

/// Permissions owned by a principal, as `"<resource>:<action>"` codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn include(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extend<I, S>(&mut self, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(codes.into_iter().map(Into::into));
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Storage boundary returning the permissions owned by a principal.
///
/// A principal with no grants yields an empty set, not an error.
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn permissions_for(&self, user: UserId) -> Result<Permissions, StoreError>;
}

/// Storage boundary for adding grants to a principal.
#[async_trait]
pub trait PermissionGrants: Send + Sync {
    async fn grant_codes(&self, user: UserId, codes: &[&str]) -> Result<(), StoreError>;
}
