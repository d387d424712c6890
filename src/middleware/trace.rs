use std::time::Instant;

use tracing::{Instrument, info, info_span, warn};

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;

/// Per-request span with method and path; logs status and latency once the
/// response is ready. 5xx responses are logged at `warn`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let span = info_span!("request", method = %req.method(), path = %req.path());

        Box::pin(
            async move {
                let started = Instant::now();
                let res = next.run(req).await;
                let status = res.status_code().as_u16();
                let latency = started.elapsed();

                if res.status_code().is_server_error() {
                    warn!(status, ?latency, "request failed");
                } else {
                    info!(status, ?latency, "request completed");
                }
                res
            }
            .instrument(span),
        )
    }
}
