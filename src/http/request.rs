//! Request identification and body extraction.
//!
//! # Responsibilities
//! - Generate a UUID request ID for every request that lacks one
//! - Decode JSON bodies and query strings, reporting malformed input as a 400 envelope
//! - Read the optional `X-Expected-Version` precondition header

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue},
    Json,
};
use serde::de::DeserializeOwned;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::error::Error;
use crate::store::Version;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub const X_EXPECTED_VERSION: HeaderName = HeaderName::from_static("x-expected-version");

/// UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// JSON body whose rejections use the service's error envelope.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(Error::InvalidInput(describe(rejection))),
        }
    }
}

fn describe(rejection: JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => "body must be sent as application/json".into(),
        JsonRejection::JsonSyntaxError(_) => "body contains badly-formed JSON".into(),
        other => other.body_text(),
    }
}

/// Query string whose rejections use the service's error envelope.
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(QueryParams(value)),
            Err(rejection) => Err(Error::InvalidInput(rejection.body_text())),
        }
    }
}

/// The version the client pins with `X-Expected-Version`, if any.
pub fn expected_version(headers: &HeaderMap) -> Result<Option<Version>, Error> {
    let Some(value) = headers.get(X_EXPECTED_VERSION) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.parse::<Version>().ok())
        .map(Some)
        .ok_or_else(|| Error::InvalidInput("X-Expected-Version must be a positive integer".into()))
}

/// Resource ids are positive; anything else cannot exist.
pub fn parse_id(raw: &str) -> Result<i64, Error> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(Error::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_version_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(expected_version(&headers).unwrap(), None);

        headers.insert(X_EXPECTED_VERSION, HeaderValue::from_static("3"));
        assert_eq!(expected_version(&headers).unwrap(), Version::new(3));

        headers.insert(X_EXPECTED_VERSION, HeaderValue::from_static("0"));
        assert!(matches!(expected_version(&headers), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("12").unwrap(), 12);
        assert!(matches!(parse_id("0"), Err(Error::NotFound)));
        assert!(matches!(parse_id("-4"), Err(Error::NotFound)));
        assert!(matches!(parse_id("abc"), Err(Error::NotFound)));
    }

    #[test]
    fn test_request_ids_are_uuids() {
        let request = axum::http::Request::new(());
        let id = MakeRequestUuid.make_request_id(&request).unwrap();
        let text = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(text).is_ok());
    }
}
