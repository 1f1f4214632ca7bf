//! User accounts and password handling.

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use password_hash::{PasswordHash, SaltString};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::auth::principal::{Principal, UserId};
use crate::auth::token::is_well_formed;
use crate::domain::Validator;
use crate::error::{Error, StoreError};
use crate::store::{ResourceId, Version, VersionedResource};

const MIN_PASSWORD_BYTES: usize = 8;
const MAX_PASSWORD_BYTES: usize = 72;
const MAX_NAME_BYTES: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: ResourceId,
    #[serde(flatten)]
    pub fields: UserFields,
    pub version: Version,
}

#[derive(Clone, PartialEq, Serialize)]
pub struct UserFields {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub activated: bool,
}

impl std::fmt::Debug for UserFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserFields")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("activated", &self.activated)
            .finish_non_exhaustive()
    }
}

impl User {
    pub fn user_id(&self) -> UserId {
        UserId(self.id)
    }

    pub fn principal(&self) -> Option<Principal> {
        Principal::user(self.user_id(), self.fields.activated)
    }
}

impl VersionedResource for User {
    type Fields = UserFields;

    const KIND: &'static str = "user";

    fn assemble(id: ResourceId, version: Version, fields: UserFields) -> Self {
        Self { id, fields, version }
    }

    fn id(&self) -> ResourceId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn fields(&self) -> UserFields {
        self.fields.clone()
    }

    fn unique_keys(fields: &UserFields) -> Vec<(&'static str, String)> {
        vec![("email", fields.email.to_ascii_lowercase())]
    }
}

/// Lookup of users by login email.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    pub fn validate(&self) -> Result<(), Error> {
        let mut v = Validator::new();
        check_name(&mut v, &self.name);
        check_email(&mut v, &self.email);
        check_password(&mut v, &self.password);
        v.finish()
    }
}

/// Request body for account updates. Absent fields are left alone.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for UserInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserInput")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl UserInput {
    /// With `partial` any field may be absent (PATCH); otherwise every field
    /// must be present (PUT).
    pub fn validate(&self, partial: bool) -> Result<(), Error> {
        let mut v = Validator::new();
        match &self.name {
            Some(name) => check_name(&mut v, name),
            None => v.check(partial, "name", "must be provided"),
        }
        match &self.email {
            Some(email) => check_email(&mut v, email),
            None => v.check(partial, "email", "must be provided"),
        }
        match &self.password {
            Some(password) => check_password(&mut v, password),
            None => v.check(partial, "password", "must be provided"),
        }
        v.finish()
    }

    /// Overlay onto `fields`. `password_hash` replaces the stored hash when given.
    pub fn apply(self, fields: &mut UserFields, password_hash: Option<String>) {
        if let Some(name) = self.name {
            fields.name = name;
        }
        if let Some(email) = self.email {
            fields.email = email;
        }
        if let Some(hash) = password_hash {
            fields.password_hash = hash;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Login {
    pub email: String,
    pub password: String,
}

impl Login {
    pub fn validate(&self) -> Result<(), Error> {
        let mut v = Validator::new();
        check_email(&mut v, &self.email);
        check_password(&mut v, &self.password);
        v.finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Activation {
    pub token: String,
}

impl Activation {
    pub fn validate(&self) -> Result<(), Error> {
        let mut v = Validator::new();
        v.check(!self.token.is_empty(), "token", "must be provided");
        v.check(is_well_formed(&self.token), "token", "must be 26 bytes long");
        v.finish()
    }
}

fn check_name(v: &mut Validator, name: &str) {
    v.check(!name.trim().is_empty(), "name", "must be provided");
    v.check(name.len() <= MAX_NAME_BYTES, "name", "must not be more than 500 bytes long");
}

fn check_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(email.contains('@'), "email", "must be a valid email address");
}

fn check_password(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= MIN_PASSWORD_BYTES, "password", "must be at least 8 bytes long");
    v.check(password.len() <= MAX_PASSWORD_BYTES, "password", "must not be more than 72 bytes long");
}

/// Argon2 PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, Error> {
    let mut salt_bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(Error::fault)?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(Error::fault)
}

/// Whether `password` matches the stored PHC string. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
