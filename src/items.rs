//! The `/items` resource: CRUD handlers over a shared [`ItemStore`].
//!
//! | Method | Path | Success |
//! |---|---|---|
//! | `GET` | `/items` | `200` array of items |
//! | `GET` | `/items/{id}` | `200` item |
//! | `POST` | `/items` | `201` created item |
//! | `PUT` | `/items/{id}` | `200` updated item |
//! | `DELETE` | `/items/{id}` | `204` empty |
//!
//! A non-numeric `{id}` or a body that is not an item is `400`; an id with
//! no item behind it is `404 {"error":"not found"}`.

use std::sync::Arc;

use http::StatusCode;

use crate::error::ApiError;
use crate::handler::with_state;
use crate::request::Request;
use crate::response::Json;
use crate::router::Router;
use crate::store::{Item, ItemInput, ItemStore};

/// Registers the item routes on `router`, all sharing `store`.
pub fn routes(router: Router, store: &Arc<ItemStore>) -> Router {
    router
        .get("/items", with_state(Arc::clone(store), list))
        .get("/items/{id}", with_state(Arc::clone(store), get))
        .post("/items", with_state(Arc::clone(store), create))
        .put("/items/{id}", with_state(Arc::clone(store), update))
        .delete("/items/{id}", with_state(Arc::clone(store), delete))
}

fn not_found() -> ApiError {
    ApiError::not_found("not found")
}

/// Parses the `{id}` path segment. Done before any store access. Any
/// integer is a well-formed id; one the store never issued, negative ones
/// included, is simply not found.
fn item_id(req: &Request) -> Result<i64, ApiError> {
    let raw = req.param("id").unwrap_or_default();
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid id `{raw}`")))
}

async fn list(store: Arc<ItemStore>, _req: Request) -> Json<Vec<Item>> {
    Json(store.all())
}

async fn get(store: Arc<ItemStore>, req: Request) -> Result<Json<Item>, ApiError> {
    let id = item_id(&req)?;
    store.get(id).map(Json).ok_or_else(not_found)
}

async fn create(
    store: Arc<ItemStore>,
    req: Request,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    let input: ItemInput = req.json()?;
    Ok((StatusCode::CREATED, Json(store.create(input))))
}

async fn update(store: Arc<ItemStore>, req: Request) -> Result<Json<Item>, ApiError> {
    let id = item_id(&req)?;
    let input: ItemInput = req.json()?;
    store.update(id, input).map(Json).ok_or_else(not_found)
}

async fn delete(store: Arc<ItemStore>, req: Request) -> Result<StatusCode, ApiError> {
    let id = item_id(&req)?;
    if store.delete(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found())
    }
}
