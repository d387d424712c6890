//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! This is where handler outcomes become wire responses. A handler returns
//! one of:
//!
//! | Return value | Wire response |
//! |---|---|
//! | `Json(value)` | `200`, JSON body |
//! | `(StatusCode::CREATED, Json(value))` | given status, JSON body |
//! | `StatusCode::NO_CONTENT` | given status, empty body |
//! | `Err(ApiError)` | tagged status, `{"error": "..."}` |
//!
//! # One response per request
//!
//! Handlers never get a writer. They return a single owned value and the
//! dispatcher converts it exactly once. Writing a response *and* returning an
//! outcome for someone else to write is a contract violation, and with this
//! signature it cannot be expressed at all.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use tracing::error;

const JSON: &str = "application/json";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use itembox::{Response, StatusCode};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/items/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`, body taken as already-serialized bytes.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: Vec::new(), status: code }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets `name`, replacing any existing value. Used by middleware that
    /// annotates responses after the handler ran.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name.to_owned(), value)),
        }
    }

    /// Converts into the `http` response hyper writes to the socket.
    ///
    /// A header that is not a valid HTTP header value cannot be sent; the
    /// response is replaced by a bare `500` rather than dropped.
    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.body(Full::new(self.body)).unwrap_or_else(|e| {
            error!("dropping malformed response: {e}");
            let mut fallback = http::Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        let mut headers = vec![("content-type".to_owned(), JSON.to_owned())];
        headers.extend(self.headers);
        Response { body: body.into(), headers, status: self.status }
    }

    /// Terminate with no body (e.g. `204 No Content`).
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Every handler return type implements this. The dispatcher calls it once
/// per request; that call is the only place a status code and body are
/// chosen.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

/// Status only, empty body: `return Ok(StatusCode::NO_CONTENT)`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// Overrides the status of any other response value.
impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    fn into_response(self) -> Response {
        let mut res = self.1.into_response();
        res.status = self.0;
        res
    }
}

/// Success and failure both translate; which one is the handler's choice.
impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: IntoResponse,
{
    fn into_response(self) -> Response {
        match self {
            Ok(ok) => ok.into_response(),
            Err(err) => err.into_response(),
        }
    }
}

/// A JSON payload. Serialized with `serde_json`; `200 OK` unless paired with
/// a status in a tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => Response::json(bytes),
            Err(e) => {
                error!("failed to serialize response body: {e}");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .json(&br#"{"error":"internal server error"}"#[..])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn json_payload_defaults_to_ok() {
        let res = Json(vec![1, 2, 3]).into_response();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("Content-Type"), Some("application/json"));
        assert_eq!(res.body(), b"[1,2,3]");
    }

    #[test]
    fn tuple_overrides_status() {
        let res = (StatusCode::CREATED, Json("x")).into_response();
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.body(), br#""x""#);
    }

    #[test]
    fn bare_status_has_empty_body() {
        let res = Ok::<_, Response>(StatusCode::NO_CONTENT).into_response();
        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert!(res.body().is_empty());
        assert!(res.headers().is_empty());
    }

    #[test]
    fn unserializable_payload_is_a_500() {
        // JSON object keys must be strings.
        let mut map = HashMap::new();
        map.insert(vec![1u8], 1);
        let res = Json(map).into_response();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), br#"{"error":"internal server error"}"#);
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut res = Response::builder().header("X-Thing", "a").no_body();
        res.set_header("x-thing", "b");
        res.set_header("x-other", "c");
        assert_eq!(res.headers().len(), 2);
        assert_eq!(res.header("x-thing"), Some("b"));
    }

    #[test]
    fn invalid_header_value_falls_back_to_500() {
        let res = Response::builder().header("x-bad", "line\nbreak").no_body();
        assert_eq!(res.into_inner().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
