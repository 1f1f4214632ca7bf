//! Request-scoped principal.
//!
//! The principal lives in the request extensions under a private type, so
//! nothing outside this module can forge or overwrite it.
//!
//! # Preconditions
//! - `attach` runs exactly once per request (the authenticate middleware)
//! - `principal` runs only after `attach`
//!
//! Either violation is a wiring bug and panics; the panic layer turns it into
//! a 500 that closes the connection.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, Extensions},
};

use crate::auth::Principal;

#[derive(Clone)]
struct PrincipalSlot(Principal);

/// Attach the principal for this request.
pub fn attach(extensions: &mut Extensions, principal: Principal) {
    if extensions.get::<PrincipalSlot>().is_some() {
        panic!("principal attached twice to the same request");
    }
    extensions.insert(PrincipalSlot(principal));
}

/// The principal attached by the authenticate middleware.
pub fn principal(extensions: &Extensions) -> &Principal {
    match extensions.get::<PrincipalSlot>() {
        Some(PrincipalSlot(principal)) => principal,
        None => panic!("principal read before the authenticate middleware ran"),
    }
}

/// Extractor for the attached principal.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl<S: Send + Sync> FromRequestParts<S> for CurrentPrincipal {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentPrincipal(principal(&parts.extensions).clone()))
    }
}
