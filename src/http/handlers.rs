//! Route handlers.
//!
//! Handlers run only after the pipeline has admitted the request; they deal
//! in domain errors and leave status mapping to [`Error`].

use std::collections::BTreeMap;
use std::time::UNIX_EPOCH;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::{Credential, Principal, Scope, UserId};
use crate::domain::movies::{MovieInput, MovieListParams};
use crate::domain::users::{self, Activation, Login, Registration, UserFields, UserInput};
use crate::error::{Error, Result};
use crate::http::context::CurrentPrincipal;
use crate::http::request::{expected_version, parse_id, JsonBody, QueryParams};
use crate::http::response::{created, envelope};
use crate::http::server::AppState;
use crate::resilience::with_deadline;

/// Permission granted to every newly registered user.
pub const DEFAULT_USER_PERMISSION: &str = "movies:read";

pub async fn healthcheck(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "available",
        "system_info": {
            "environment": state.env.as_str(),
            "version": env!("CARGO_PKG_VERSION"),
        },
    }))
}

pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<Registration>,
) -> Result<Response> {
    input.validate()?;

    let password = input.password;
    let password_hash = tokio::task::spawn_blocking(move || users::hash_password(&password))
        .await
        .map_err(Error::fault)??;

    let user = state
        .users
        .create(UserFields {
            name: input.name,
            email: input.email,
            password_hash,
            activated: false,
        })
        .await?;
    let owner = user.user_id();

    let grant = state.grants.grant_codes(owner, &[DEFAULT_USER_PERMISSION]);
    with_deadline("permission grant", state.store_timeout, grant).await?;

    let token = issue(&state, owner, Scope::Activation).await?;
    tracing::info!(user = %owner, "User registered");

    let body = serde_json::json!({
        "user": user,
        "activation_token": token,
    });
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

pub async fn activate_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<Activation>,
) -> Result<Response> {
    input.validate()?;

    let Some(principal) = state.authenticator.resolve(Scope::Activation, &input.token).await? else {
        let mut errors = BTreeMap::new();
        errors.insert("token", "invalid or expired activation token".to_string());
        return Err(Error::FailedValidation(errors));
    };
    let owner = principal.id();

    let user = state
        .users
        .modify(owner.0, None, |fields| {
            fields.activated = true;
            Ok(())
        })
        .await?;

    let purge = state.credentials.delete_all_for_owner(owner, Scope::Activation);
    with_deadline("credential purge", state.store_timeout, purge).await?;
    tracing::info!(user = %owner, "User activated");

    envelope(StatusCode::OK, "user", &user)
}

pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<Login>,
) -> Result<Response> {
    input.validate()?;

    let lookup = state.directory.find_by_email(&input.email);
    let Some(user) = with_deadline("user lookup", state.store_timeout, lookup).await? else {
        return Err(Error::InvalidCredentials);
    };

    let password = input.password;
    let hash = user.fields.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || users::verify_password(&password, &hash))
        .await
        .map_err(Error::fault)?;
    if !matches {
        return Err(Error::InvalidCredentials);
    }

    let token = issue(&state, user.user_id(), Scope::Authentication).await?;
    envelope(StatusCode::CREATED, "authentication_token", token)
}

#[derive(Debug, Serialize)]
struct IssuedToken {
    token: String,
    /// Seconds since the Unix epoch.
    expiry: u64,
}

async fn issue(state: &AppState, owner: UserId, scope: Scope) -> Result<IssuedToken> {
    let ttl = match scope {
        Scope::Authentication => state.tokens.authentication_ttl(),
        Scope::Activation => state.tokens.activation_ttl(),
    };
    let credential = Credential::generate(owner, ttl, scope);
    let expiry = credential
        .stored
        .expiry
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let insert = state.credentials.insert(credential.stored);
    with_deadline("credential insert", state.store_timeout, insert).await?;
    tracing::debug!(user = %owner, scope = scope.as_str(), "Credential issued");

    Ok(IssuedToken {
        token: credential.plaintext,
        expiry,
    })
}

pub async fn show_user(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let user = state.users.get(parse_id(&id)?).await?;
    envelope(StatusCode::OK, "user", &user)
}

/// Account changes are limited to the account owner.
fn require_owner(principal: &Principal, id: i64) -> Result<()> {
    if principal.id() == UserId(id) {
        Ok(())
    } else {
        Err(Error::PermissionDenied)
    }
}

/// `PUT` replaces every field, `PATCH` only the ones sent. A new password is
/// hashed before the versioned write.
pub async fn update_user(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
    JsonBody(input): JsonBody<UserInput>,
) -> Result<Response> {
    let id = parse_id(&id)?;
    require_owner(&principal, id)?;
    input.validate(method == Method::PATCH)?;
    let pinned = expected_version(&headers)?;

    let password_hash = match input.password.clone() {
        Some(password) => Some(
            tokio::task::spawn_blocking(move || users::hash_password(&password))
                .await
                .map_err(Error::fault)??,
        ),
        None => None,
    };

    let user = state
        .users
        .modify(id, pinned, |fields| {
            input.apply(fields, password_hash);
            Ok(())
        })
        .await?;
    tracing::info!(user = id, "User updated");
    envelope(StatusCode::OK, "user", &user)
}

/// Removing an account also revokes every credential it holds.
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_id(&id)?;
    require_owner(&principal, id)?;
    state.users.delete(id).await?;

    for scope in [Scope::Authentication, Scope::Activation] {
        let purge = state.credentials.delete_all_for_owner(UserId(id), scope);
        with_deadline("credential purge", state.store_timeout, purge).await?;
    }
    tracing::info!(user = id, "User deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn list_movies(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<MovieListParams>,
) -> Result<Response> {
    let query = params.parse()?;
    let page = with_deadline("movie list", state.store_timeout, state.catalogue.list(&query)).await?;
    Ok((StatusCode::OK, Json(page)).into_response())
}

pub async fn show_movie(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let movie = state.movies.get(parse_id(&id)?).await?;
    envelope(StatusCode::OK, "movie", &movie)
}

pub async fn create_movie(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    JsonBody(input): JsonBody<MovieInput>,
) -> Result<Response> {
    let movie = state.movies.create(input.into_fields()?).await?;
    tracing::info!(movie = movie.id, user = %principal.id(), "Movie created");
    created(&format!("/v1/movies/{}", movie.id), "movie", &movie)
}

pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    JsonBody(input): JsonBody<MovieInput>,
) -> Result<Response> {
    let id = parse_id(&id)?;
    let pinned = expected_version(&headers)?;
    let movie = state.movies.modify(id, pinned, |fields| input.apply(fields)).await?;
    envelope(StatusCode::OK, "movie", &movie)
}

pub async fn delete_movie(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    state.movies.delete(parse_id(&id)?).await?;
    envelope(StatusCode::OK, "message", "movie successfully deleted")
}

pub async fn not_found() -> Error {
    Error::NotFound
}

pub async fn method_not_allowed(method: Method) -> Error {
    Error::MethodNotAllowed(method.to_string())
}
