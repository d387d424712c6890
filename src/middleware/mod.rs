//! Middleware layer.
//!
//! A middleware wraps everything after it. It gets the request and a
//! [`Next`] continuation and decides what happens:
//!
//! - return a response without calling `next` (short-circuit),
//! - call `next.run(req).await` and hand back its response,
//! - or do both halves: touch the request, run `next`, touch the response.
//!
//! Layers run in the order they were registered with
//! [`Router::layer`](crate::Router::layer): the first one registered is the
//! outermost. The innermost stage is route resolution plus the handler, so
//! middleware also sees requests no route matches (that is how CORS
//! preflights for `OPTIONS` get answered without an `OPTIONS` route).
//!
//! ```rust
//! use itembox::{Router, Response, StatusCode};
//! use itembox::middleware::{self, Next};
//! use itembox::Request;
//!
//! async fn require_json(req: Request, next: Next) -> Response {
//!     if !req.body().is_empty() && req.header("content-type") != Some("application/json") {
//!         return Response::status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
//!     }
//!     next.run(req).await
//! }
//!
//! let app = Router::new().layer(middleware::from_fn(require_json));
//! ```

mod cors;
mod trace;

use std::future::Future;
use std::sync::Arc;

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use crate::router::Table;

pub use cors::Cors;
pub use trace::Trace;

/// A request interceptor.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> BoxFuture;
}

/// The rest of the chain, from the point of view of one middleware.
///
/// Consumed by [`run`](Next::run), so a middleware can pass control on at
/// most once.
pub struct Next {
    table: Arc<Table>,
    index: usize,
}

impl Next {
    pub(crate) fn new(table: Arc<Table>) -> Self {
        Self { table, index: 0 }
    }

    /// Runs the remaining middleware and then the routed handler.
    pub fn run(self, req: Request) -> BoxFuture {
        let Self { table, index } = self;
        match table.middleware.get(index).cloned() {
            Some(layer) => layer.call(req, Self { table, index: index + 1 }),
            None => table.route(req),
        }
    }
}

/// Turns an `async fn(Request, Next) -> Response` into a [`Middleware`].
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FromFn(f)
}

/// Middleware built by [`from_fn`].
pub struct FromFn<F>(F);

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        Box::pin((self.0)(req, next))
    }
}
