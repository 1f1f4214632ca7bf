//! Versioned resource storage.
//!
//! # Data Flow
//! ```text
//! Mutation handler (after the gate admits the request):
//!     → controlled.rs (optimistic concurrency protocol, deadlines)
//!     → ConditionalStore boundary (atomic compare-version-and-write)
//!     → memory.rs (in-process backend) or any external store
//! ```
//!
//! # Design Decisions
//! - The backend owns atomicity; the protocol layer owns semantics
//! - A successful update bumps the version by exactly one
//! - Store failures leave the stored version unchanged

pub mod controlled;
pub mod memory;
pub mod version;

use async_trait::async_trait;

use crate::error::StoreError;

pub use controlled::ConcurrencyControlledStore;
pub use version::Version;

/// Identity of a stored resource.
pub type ResourceId = i64;

/// A persisted entity carrying an identity and a version counter.
pub trait VersionedResource: Clone + Send + Sync + 'static {
    /// The mutable part of the resource.
    type Fields: Clone + Send + Sync + 'static;

    /// Name used in logs.
    const KIND: &'static str;

    fn assemble(id: ResourceId, version: Version, fields: Self::Fields) -> Self;

    fn id(&self) -> ResourceId;

    fn version(&self) -> Version;

    fn fields(&self) -> Self::Fields;

    /// Fields that must be unique across all resources of this kind, as
    /// `(field name, value)` pairs.
    fn unique_keys(_fields: &Self::Fields) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// The persistence boundary: an atomic conditional-update primitive.
#[async_trait]
pub trait ConditionalStore<R: VersionedResource>: Send + Sync {
    /// Persist a new resource at [`Version::INITIAL`] under a fresh id.
    async fn insert(&self, fields: R::Fields) -> Result<R, StoreError>;

    async fn fetch(&self, id: ResourceId) -> Result<Option<R>, StoreError>;

    /// Atomically: if the row `id` exists at version `expected`, replace its
    /// fields, advance it to `expected + 1` and return the new version.
    /// `Ok(None)` when no row matched both id and version.
    async fn update_if_version(
        &self,
        id: ResourceId,
        expected: Version,
        fields: R::Fields,
    ) -> Result<Option<Version>, StoreError>;

    /// Remove the row `id`. `Ok(false)` when no row matched.
    async fn remove(&self, id: ResourceId) -> Result<bool, StoreError>;
}
