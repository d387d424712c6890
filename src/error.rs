//! Error types.
//!
//! Two kinds of failure live here and they never mix:
//!
//! - [`Error`]: infrastructure failures surfaced by [`Server`](crate::Server):
//!   binding the listener, accepting a connection.
//! - [`ApiError`]: a request-level failure returned by a handler. It is a
//!   value, not a panic, and it is turned into a response at exactly one
//!   place: its [`IntoResponse`] impl.

use std::fmt;
use std::net::SocketAddr;

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::response::{IntoResponse, Json, Response};

/// The error type returned by itembox's fallible server operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

const INTERNAL_MESSAGE: &str = "internal server error";

/// A handler failure tagged with the status it should be answered with.
///
/// Anything that implements [`std::error::Error`] converts into an `ApiError`
/// through `?`. Those conversions are always `500 Internal Server Error`
/// with a generic message; the underlying error is logged when the response
/// is produced and is never sent to the client. A handler that wants any
/// other status has to say so explicitly:
///
/// ```rust
/// use itembox::ApiError;
///
/// fn lookup(raw: &str) -> Result<i64, ApiError> {
///     raw.parse().map_err(|_| ApiError::bad_request(format!("invalid id `{raw}`")))
/// }
/// ```
pub struct ApiError {
    status: StatusCode,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), source: None }
    }

    /// `400 Bad Request` with a message meant for the client.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// `404 Not Found` with a message meant for the client.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// `500 Internal Server Error`. `err` is kept for the log line only.
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: INTERNAL_MESSAGE.to_owned(),
            source: Some(Box::new(err)),
        }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }
}

impl fmt::Debug for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiError")
            .field("status", &self.status)
            .field("message", &self.message)
            .field("source", &self.source.as_ref().map(ToString::to_string))
            .finish()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

// `ApiError` itself does not implement `std::error::Error`, which is what
// keeps this blanket impl coherent with `From<T> for T`.
impl<E> From<E> for ApiError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::internal(err)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Some(source) = &self.source {
            error!(status = self.status.as_u16(), "handler failed: {source}");
        }
        (self.status, Json(ErrorBody { error: &self.message })).into_response()
    }
}
