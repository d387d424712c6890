//! Kubernetes health-check routes.
//!
//! | Probe | Path | Body |
//! |---|---|---|
//! | **Liveness** | `/healthz` | `{"status":"ok"}` |
//! | **Readiness** | `/readyz` | `{"status":"ready","items":<count>}` |
//!
//! The store lives in memory, so once the process answers it is ready; the
//! item count is reported for operators, not gated on.

use std::sync::Arc;

use serde::Serialize;

use crate::handler::with_state;
use crate::request::Request;
use crate::response::Json;
use crate::router::Router;
use crate::store::ItemStore;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<usize>,
}

/// Registers `/healthz` and `/readyz` on `router`.
pub fn routes(router: Router, store: &Arc<ItemStore>) -> Router {
    router
        .get("/healthz", liveness)
        .get("/readyz", with_state(Arc::clone(store), readiness))
}

/// Always `200 OK`. If the process can respond at all, it is alive.
pub async fn liveness(_req: Request) -> Json<Health> {
    Json(Health { status: "ok", items: None })
}

async fn readiness(store: Arc<ItemStore>, _req: Request) -> Json<Health> {
    Json(Health { status: "ready", items: Some(store.len()) })
}
