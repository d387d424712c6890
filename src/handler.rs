//! Route handlers and the shared state they close over.
//!
//! The router stores every route as an [`Endpoint`]: one boxed
//! `Fn(Request) -> BoxFuture`. Two kinds of value turn into one:
//!
//! - a plain `async fn(Request) -> impl IntoResponse`, or a closure of that
//!   shape;
//! - [`with_state`]`(state, f)`, where `f` is an
//!   `async fn(S, Request) -> impl IntoResponse`. The state is cloned into
//!   every call, so `S` is usually an `Arc`.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use itembox::{ItemStore, Json, Request, Router, with_state};
//!
//! async fn count(store: Arc<ItemStore>, _req: Request) -> Json<usize> {
//!     Json(store.len())
//! }
//!
//! let store = Arc::new(ItemStore::new());
//! let router = Router::new().get("/count", with_state(store, count));
//! ```
//!
//! Whatever a handler returns, success or [`ApiError`], is converted with
//! [`IntoResponse`] inside the endpoint, once per request.
//!
//! [`ApiError`]: crate::ApiError

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A registered route, shared by every request that matches it.
#[doc(hidden)]
pub type Endpoint = Arc<dyn Fn(Request) -> BoxFuture + Send + Sync + 'static>;

/// Anything the router accepts as a route handler.
pub trait Handler: Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self) -> Endpoint;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_endpoint(self) -> Endpoint {
        Arc::new(move |req: Request| -> BoxFuture {
            let fut = self(req);
            Box::pin(async move { fut.await.into_response() })
        })
    }
}

/// Handler built by [`with_state`].
pub struct Stateful<S, F> {
    state: S,
    f: F,
}

/// Pairs `f` with `state`; each request calls `f(state.clone(), req)`.
pub fn with_state<S, F, Fut, R>(state: S, f: F) -> Stateful<S, F>
where
    S: Clone + Send + Sync + 'static,
    F: Fn(S, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    Stateful { state, f }
}

impl<S, F, Fut, R> Handler for Stateful<S, F>
where
    S: Clone + Send + Sync + 'static,
    F: Fn(S, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_endpoint(self) -> Endpoint {
        let Self { state, f } = self;
        Arc::new(move |req: Request| -> BoxFuture {
            let fut = f(state.clone(), req);
            Box::pin(async move { fut.await.into_response() })
        })
    }
}
