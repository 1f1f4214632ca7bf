//! Success response envelopes.
//!
//! Every body is a JSON object with a single named member, mirroring the
//! `{"error": ...}` shape used for refusals.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::Error;

/// `{"<name>": value}` with the given status.
pub fn envelope<T: Serialize>(status: StatusCode, name: &str, value: T) -> Result<Response, Error> {
    let value = serde_json::to_value(value).map_err(Error::fault)?;
    let mut body = serde_json::Map::new();
    body.insert(name.to_string(), value);
    Ok((status, Json(body)).into_response())
}

/// A 201 envelope with a `Location` header for the new resource.
pub fn created<T: Serialize>(location: &str, name: &str, value: T) -> Result<Response, Error> {
    let mut response = envelope(StatusCode::CREATED, name, value)?;
    let location = HeaderValue::from_str(location).map_err(Error::fault)?;
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}
