//! Radix-tree request router and the dispatcher built from it.
//!
//! One tree per HTTP method, O(path-length) lookup. Routes and middleware
//! are registered on a [`Router`] at startup; [`Router::into_dispatcher`]
//! freezes them into a [`Dispatcher`] that every connection shares without
//! locking.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use matchit::Router as MatchitRouter;
use serde::Serialize;

use crate::handler::{BoxFuture, Endpoint, Handler};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::{IntoResponse, Json, Response};

/// The application router.
///
/// Each registration call returns `self` so they chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Endpoint>>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), middleware: Vec::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax and match exactly one non-empty
    /// segment; `req.param("name")` retrieves the raw text:
    ///
    /// ```rust
    /// # use itembox::{Method, Request, Router, StatusCode};
    /// # async fn get_item(_: Request) -> StatusCode { StatusCode::OK }
    /// # async fn create_item(_: Request) -> StatusCode { StatusCode::CREATED }
    /// Router::new()
    ///     .on(Method::GET,  "/items/{id}", get_item)
    ///     .on(Method::POST, "/items",      create_item);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern or conflicts with a route
    /// already registered for `method`. Routes are fixed at startup, so this
    /// is a programming error, not a runtime condition.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_endpoint())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Appends a middleware. The first layer registered runs outermost.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Freezes the routing table.
    pub fn into_dispatcher(self) -> Dispatcher {
        Dispatcher(Arc::new(Table { routes: self.routes, middleware: self.middleware }))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// The frozen routing table plus its middleware chain.
pub(crate) struct Table {
    routes: HashMap<Method, MatchitRouter<Endpoint>>,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
}

#[derive(Serialize)]
struct RouteMiss {
    error: &'static str,
}

impl Table {
    fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Endpoint, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let endpoint = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((endpoint, params))
    }

    /// Innermost stage of the chain: resolve the route and run its handler.
    pub(crate) fn route(&self, mut req: Request) -> BoxFuture {
        match self.lookup(&req.method, &req.path) {
            Some((endpoint, params)) => {
                req.params = params;
                endpoint(req)
            }
            None => {
                let res = (
                    http::StatusCode::NOT_FOUND,
                    Json(RouteMiss { error: "route not found" }),
                ).into_response();
                Box::pin(async move { res })
            }
        }
    }
}

/// A shareable, read-only handle to a frozen [`Router`].
///
/// Cloning is one atomic increment. [`Server`](crate::Server) hands a clone
/// to every connection; tests can call [`dispatch`](Dispatcher::dispatch)
/// directly without a socket.
#[derive(Clone)]
pub struct Dispatcher(Arc<Table>);

impl Dispatcher {
    /// Runs one request through the middleware chain and the matched handler.
    /// Never fails: every outcome, a routing miss included, is a response.
    pub async fn dispatch(&self, req: http::Request<Bytes>) -> Response {
        Next::new(Arc::clone(&self.0)).run(Request::from_http(req)).await
    }
}
