//! In-process store backends.
//!
//! Each backend keeps its rows behind one mutex and performs every operation
//! inside a single critical section with no await points, which is what makes
//! the conditional update atomic and cancellation-safe.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use async_trait::async_trait;

use crate::auth::authenticator::CredentialStore;
use crate::auth::permissions::{PermissionResolver, Permissions};
use crate::auth::principal::{Principal, UserId};
use crate::auth::token::{Scope, StoredCredential, TokenDigest};
use crate::domain::movies::{Movie, MovieCatalogue, MoviePage, MovieQuery};
use crate::domain::users::{User, UserDirectory};
use crate::error::StoreError;
use crate::store::{ConditionalStore, ResourceId, Version, VersionedResource};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A table of versioned resources keyed by a sequential id starting at 1.
pub struct MemoryTable<R: VersionedResource> {
    rows: Mutex<BTreeMap<ResourceId, R>>,
    next_id: AtomicI64,
}

impl<R: VersionedResource> Default for MemoryTable<R> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl<R: VersionedResource> MemoryTable<R> {
    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First row matching `predicate`, in id order.
    pub fn find<P>(&self, predicate: P) -> Option<R>
    where
        P: Fn(&R) -> bool,
    {
        lock(&self.rows).values().find(|row| predicate(row)).cloned()
    }

    /// Copy of every row, in id order.
    pub fn snapshot(&self) -> Vec<R> {
        lock(&self.rows).values().cloned().collect()
    }

    fn check_unique(
        rows: &BTreeMap<ResourceId, R>,
        fields: &R::Fields,
        except: Option<ResourceId>,
    ) -> Result<(), StoreError> {
        let wanted = R::unique_keys(fields);
        if wanted.is_empty() {
            return Ok(());
        }

        for row in rows.values().filter(|row| Some(row.id()) != except) {
            let existing = R::unique_keys(&row.fields());
            if let Some((field, _)) = wanted.iter().find(|key| existing.contains(key)) {
                return Err(StoreError::Duplicate { field });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<R: VersionedResource> ConditionalStore<R> for MemoryTable<R> {
    async fn insert(&self, fields: R::Fields) -> Result<R, StoreError> {
        let mut rows = lock(&self.rows);
        Self::check_unique(&rows, &fields, None)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let row = R::assemble(id, Version::INITIAL, fields);
        rows.insert(id, row.clone());
        Ok(row)
    }

    async fn fetch(&self, id: ResourceId) -> Result<Option<R>, StoreError> {
        Ok(lock(&self.rows).get(&id).cloned())
    }

    async fn update_if_version(
        &self,
        id: ResourceId,
        expected: Version,
        fields: R::Fields,
    ) -> Result<Option<Version>, StoreError> {
        let mut rows = lock(&self.rows);
        match rows.get(&id) {
            Some(row) if row.version() == expected => {}
            _ => return Ok(None),
        }

        Self::check_unique(&rows, &fields, Some(id))?;
        let next = expected.next().ok_or(StoreError::VersionExhausted(id))?;
        rows.insert(id, R::assemble(id, next, fields));
        Ok(Some(next))
    }

    async fn remove(&self, id: ResourceId) -> Result<bool, StoreError> {
        Ok(lock(&self.rows).remove(&id).is_some())
    }
}

#[async_trait]
impl UserDirectory for MemoryTable<User> {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find(|user| user.fields.email.eq_ignore_ascii_case(email)))
    }
}

#[async_trait]
impl MovieCatalogue for MemoryTable<Movie> {
    async fn list(&self, query: &MovieQuery) -> Result<MoviePage, StoreError> {
        Ok(query.select(self.snapshot()))
    }
}

/// Credential rows keyed by digest, joined against a user table to produce principals.
pub struct MemoryCredentialStore {
    credentials: Mutex<HashMap<TokenDigest, StoredCredential>>,
    users: Arc<MemoryTable<User>>,
}

impl MemoryCredentialStore {
    pub fn new(users: Arc<MemoryTable<User>>) -> Self {
        Self {
            credentials: Mutex::new(HashMap::new()),
            users,
        }
    }

    pub fn users(&self) -> &Arc<MemoryTable<User>> {
        &self.users
    }

    /// Rows held. Expired rows linger until the next insert.
    pub fn len(&self) -> usize {
        lock(&self.credentials).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new(Arc::new(MemoryTable::default()))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, credential: StoredCredential) -> Result<(), StoreError> {
        let now = SystemTime::now();
        let mut credentials = lock(&self.credentials);
        credentials.retain(|_, c| c.is_live(now));
        credentials.insert(credential.digest, credential);
        Ok(())
    }

    async fn principal_for(
        &self,
        scope: Scope,
        digest: TokenDigest,
        now: SystemTime,
    ) -> Result<Option<Principal>, StoreError> {
        let owner = lock(&self.credentials)
            .get(&digest)
            .filter(|c| c.scope == scope && c.is_live(now))
            .map(|c| c.owner);

        let Some(owner) = owner else {
            return Ok(None);
        };
        let user = self.users.fetch(owner.0).await?;
        Ok(user.and_then(|u| u.principal()))
    }

    async fn delete_all_for_owner(&self, owner: UserId, scope: Scope) -> Result<usize, StoreError> {
        let mut credentials = lock(&self.credentials);
        let before = credentials.len();
        credentials.retain(|_, c| !(c.owner == owner && c.scope == scope));
        Ok(before - credentials.len())
    }
}

/// Permission grants per user.
#[derive(Default)]
pub struct MemoryPermissionStore {
    grants: Mutex<HashMap<UserId, Permissions>>,
}

impl MemoryPermissionStore {
    pub fn grant<I, S>(&self, user: UserId, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.grants).entry(user).or_default().extend(codes);
    }
}

#[async_trait]
impl PermissionResolver for MemoryPermissionStore {
    async fn permissions_for(&self, user: UserId) -> Result<Permissions, StoreError> {
        Ok(lock(&self.grants).get(&user).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl crate::auth::permissions::PermissionGrants for MemoryPermissionStore {
    async fn grant_codes(&self, user: UserId, codes: &[&str]) -> Result<(), StoreError> {
        self.grant(user, codes.iter().copied());
        Ok(())
    }
}

/// Every backend the service needs, sharing one user table.
#[derive(Clone)]
pub struct MemoryBackends {
    pub movies: Arc<MemoryTable<Movie>>,
    pub users: Arc<MemoryTable<User>>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub permissions: Arc<MemoryPermissionStore>,
}

impl MemoryBackends {
    pub fn new() -> Self {
        let users = Arc::new(MemoryTable::default());
        Self {
            movies: Arc::new(MemoryTable::default()),
            credentials: Arc::new(MemoryCredentialStore::new(Arc::clone(&users))),
            users,
            permissions: Arc::new(MemoryPermissionStore::default()),
        }
    }
}

impl Default for MemoryBackends {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::Credential;
    use crate::domain::users::UserFields;
    use std::time::Duration;

    fn user_fields(email: &str, activated: bool) -> UserFields {
        UserFields {
            name: "Ada".into(),
            email: email.into(),
            password_hash: String::new(),
            activated,
        }
    }

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let users = MemoryTable::<User>::default();
        let a = users.insert(user_fields("a@example.com", false)).await.unwrap();
        let b = users.insert(user_fields("b@example.com", false)).await.unwrap();
        assert_eq!((a.id(), b.id()), (1, 2));
    }

    #[tokio::test]
    async fn test_unique_email_on_insert_and_update() {
        let users = MemoryTable::<User>::default();
        let a = users.insert(user_fields("a@example.com", false)).await.unwrap();
        users.insert(user_fields("b@example.com", false)).await.unwrap();

        let err = users.insert(user_fields("A@example.com", false)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "email" }));

        let err = users
            .update_if_version(a.id(), a.version(), user_fields("b@example.com", true))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "email" }));

        // Re-saving its own email is not a duplicate.
        let v2 = users
            .update_if_version(a.id(), a.version(), user_fields("a@example.com", true))
            .await
            .unwrap();
        assert_eq!(v2.map(Version::get), Some(2));
    }

    #[tokio::test]
    async fn test_credentials_follow_user_activation() {
        let store = MemoryCredentialStore::default();
        let user = store.users().insert(user_fields("a@example.com", false)).await.unwrap();
        let owner = UserId(user.id());

        let credential = Credential::generate(owner, Duration::from_secs(60), Scope::Authentication);
        let digest = credential.stored.digest;
        store.insert(credential.stored).await.unwrap();

        let principal = store
            .principal_for(Scope::Authentication, digest, SystemTime::now())
            .await
            .unwrap()
            .unwrap();
        assert!(!principal.is_activated());

        let mut fields = user.fields();
        fields.activated = true;
        store.users().update_if_version(user.id(), user.version(), fields).await.unwrap();

        let principal = store
            .principal_for(Scope::Authentication, digest, SystemTime::now())
            .await
            .unwrap()
            .unwrap();
        assert!(principal.is_activated());
    }

    #[tokio::test]
    async fn test_delete_all_for_owner_is_scoped() {
        let store = MemoryCredentialStore::default();
        for scope in [Scope::Activation, Scope::Activation, Scope::Authentication] {
            let credential = Credential::generate(UserId(1), Duration::from_secs(60), scope);
            store.insert(credential.stored).await.unwrap();
        }
        let other = Credential::generate(UserId(2), Duration::from_secs(60), Scope::Activation);
        store.insert(other.stored).await.unwrap();

        let removed = store.delete_all_for_owner(UserId(1), Scope::Activation).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_prunes_expired_credentials() {
        let store = MemoryCredentialStore::default();
        for _ in 0..3 {
            let stale = Credential::generate(UserId(1), Duration::ZERO, Scope::Authentication);
            store.insert(stale.stored).await.unwrap();
        }

        let fresh = Credential::generate(UserId(1), Duration::from_secs(60), Scope::Authentication);
        let digest = fresh.stored.digest;
        store.insert(fresh.stored).await.unwrap();
        assert_eq!(store.len(), 1);

        // The digest alone is not enough; the scope must match too.
        let found = store
            .principal_for(Scope::Activation, digest, SystemTime::now())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_catalogue_lists_from_table() {
        use crate::domain::movies::{MovieFields, MovieListParams};

        let movies = MemoryTable::<Movie>::default();
        for title in ["Heat", "Alien", "Aliens"] {
            let fields = MovieFields {
                title: title.into(),
                ..MovieFields::default()
            };
            movies.insert(fields).await.unwrap();
        }

        let query = MovieListParams {
            sort: Some("-title".into()),
            page_size: Some("2".into()),
            ..MovieListParams::default()
        }
        .parse()
        .unwrap();
        let page = movies.list(&query).await.unwrap();
        let titles: Vec<_> = page.movies.iter().map(|m| m.fields.title.as_str()).collect();
        assert_eq!(titles, ["Heat", "Aliens"]);
        assert_eq!(page.metadata.last_page, Some(2));
    }

    #[tokio::test]
    async fn test_permissions_default_to_empty() {
        let store = MemoryPermissionStore::default();
        assert!(store.permissions_for(UserId(9)).await.unwrap().is_empty());

        store.grant(UserId(9), ["movies:read"]);
        assert!(store.permissions_for(UserId(9)).await.unwrap().include("movies:read"));
    }
}
