//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// An incoming HTTP request with its body fully read.
///
/// Path parameters are filled in by the router once a route matches;
/// middleware running before that sees none.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    pub(crate) fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            headers: parts.headers,
            body,
            params: HashMap::new(),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Header lookup. Names are case-insensitive; values that are not
    /// visible ASCII are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter, exactly as it appeared in the path.
    ///
    /// For a route `/items/{id}`, `req.param("id")` on `/items/42` returns
    /// `Some("42")`. Converting it is the caller's job.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Decodes the body as JSON. A body that does not decode is the client's
    /// fault and comes back as `400 Bad Request`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))
    }
}
