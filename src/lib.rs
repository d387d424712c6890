//! # itembox
//!
//! A minimal HTTP resource server: one collection of items, create, read,
//! update and delete, held in memory for the life of the process.
//!
//! ## Shape of a request
//!
//! ```text
//! hyper connection task
//!   → Dispatcher::dispatch
//!     → middleware (Trace, Cors, …)        registration order, outermost first
//!       → Router: (method, path) → handler  radix tree via matchit
//!         → handler(Request)               reads/writes the ItemStore
//!       ← Result<T, ApiError>
//!     ← IntoResponse                       the one place status + body are chosen
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use itembox::{ItemStore, Router, Server, items, middleware};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), itembox::Error> {
//!     let store = Arc::new(ItemStore::new());
//!     let app = items::routes(Router::new(), &store)
//!         .layer(middleware::Trace)
//!         .layer(middleware::Cors::permissive());
//!
//!     Server::bind("0.0.0.0:8080".parse().unwrap()).serve(app).await
//! }
//! ```
//!
//! ## Errors
//!
//! Handlers return `Result<_, ApiError>`. Use `ApiError::bad_request` or
//! `ApiError::not_found` for failures the client should see; anything that
//! reaches an `ApiError` through `?` is a `500` with a generic message.

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod health;
pub mod items;
pub mod middleware;
pub mod store;

pub use error::{ApiError, Error};
pub use handler::{BoxFuture, Handler, Stateful, with_state};
pub use http::{Method, StatusCode};
pub use request::Request;
pub use response::{IntoResponse, Json, Response, ResponseBuilder};
pub use router::{Dispatcher, Router};
pub use server::Server;
pub use store::{Item, ItemInput, ItemStore};

/// The full application: item and health routes behind request tracing and
/// a permissive CORS policy.
pub fn app(store: &std::sync::Arc<ItemStore>) -> Router {
    let router = items::routes(Router::new(), store);
    health::routes(router, store)
        .layer(middleware::Trace)
        .layer(middleware::Cors::permissive())
}
