//! Optimistic concurrency control over a conditional store.
//!
//! # Protocol
//! ```text
//! read resource (id, version V)
//!     → caller edits its copy
//!     → update(id, expected = V, fields)
//!         store matched (id, V)  → write fields, version = V + 1 → Ok(V + 1)
//!         no row matched (id, V) → EditConflict (copy is stale)
//! ```
//!
//! # Design Decisions
//! - No retry loop: an edit conflict goes back to the owner of the intent
//! - Every backend call runs under the configured deadline
//! - Delete by id is unconditional; a miss is `NotFound`, never success

use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::resilience::with_deadline;
use crate::store::{ConditionalStore, ResourceId, Version, VersionedResource};

pub struct ConcurrencyControlledStore<R: VersionedResource> {
    backend: Arc<dyn ConditionalStore<R>>,
    timeout: Duration,
}

impl<R: VersionedResource> Clone for ConcurrencyControlledStore<R> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            timeout: self.timeout,
        }
    }
}

impl<R: VersionedResource> ConcurrencyControlledStore<R> {
    pub fn new(backend: Arc<dyn ConditionalStore<R>>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Store a new resource at [`Version::INITIAL`].
    pub async fn create(&self, fields: R::Fields) -> Result<R, Error> {
        let resource = with_deadline("insert", self.timeout, self.backend.insert(fields)).await?;
        tracing::debug!(kind = R::KIND, id = resource.id(), "Resource created");
        Ok(resource)
    }

    pub async fn get(&self, id: ResourceId) -> Result<R, Error> {
        with_deadline("fetch", self.timeout, self.backend.fetch(id))
            .await?
            .ok_or(Error::NotFound)
    }

    /// Write `fields` only if the stored version is still `expected`.
    pub async fn update(&self, id: ResourceId, expected: Version, fields: R::Fields) -> Result<Version, Error> {
        let update = self.backend.update_if_version(id, expected, fields);
        match with_deadline("conditional update", self.timeout, update).await? {
            Some(version) => {
                tracing::debug!(kind = R::KIND, id, version = version.get(), "Resource updated");
                Ok(version)
            }
            None => {
                tracing::debug!(kind = R::KIND, id, expected = expected.get(), "Edit conflict");
                Err(Error::EditConflict)
            }
        }
    }

    /// Read, edit and conditionally write back one resource.
    ///
    /// `pinned` is the version the client last saw; when it differs from the
    /// stored version the edit is refused before anything is written. The
    /// write itself is conditional on the version read here, so a concurrent
    /// writer between the read and the write also yields `EditConflict`.
    pub async fn modify<F>(&self, id: ResourceId, pinned: Option<Version>, edit: F) -> Result<R, Error>
    where
        F: FnOnce(&mut R::Fields) -> Result<(), Error>,
    {
        let current = self.get(id).await?;
        if pinned.is_some_and(|v| v != current.version()) {
            return Err(Error::EditConflict);
        }

        let mut fields = current.fields();
        edit(&mut fields)?;

        let version = self.update(id, current.version(), fields.clone()).await?;
        Ok(R::assemble(id, version, fields))
    }

    pub async fn delete(&self, id: ResourceId) -> Result<(), Error> {
        if with_deadline("delete", self.timeout, self.backend.remove(id)).await? {
            tracing::debug!(kind = R::KIND, id, "Resource deleted");
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }
}
