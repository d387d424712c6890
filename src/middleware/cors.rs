use std::time::Duration;

use http::{Method, StatusCode};

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// Cross-origin access policy.
///
/// - `OPTIONS` requests are preflights. They are answered here with
///   `204 No Content` and the access-control headers; nothing downstream runs.
/// - Every other request runs normally and gets the same headers added to
///   whatever response comes back, error responses included.
///
/// ```rust
/// use itembox::Method;
/// use itembox::middleware::Cors;
///
/// let cors = Cors::permissive()
///     .allow_origin("https://app.example.com")
///     .allow_methods([Method::GET, Method::POST]);
/// ```
#[derive(Clone, Debug)]
pub struct Cors {
    allow_origin: String,
    allow_methods: Vec<Method>,
    allow_headers: Vec<String>,
    max_age: Duration,
}

impl Cors {
    /// Any origin; the methods the item API uses; `content-type` and
    /// `authorization` request headers; preflights cached for a day.
    pub fn permissive() -> Self {
        Self {
            allow_origin: "*".to_owned(),
            allow_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allow_headers: vec!["content-type".to_owned(), "authorization".to_owned()],
            max_age: Duration::from_secs(86_400),
        }
    }

    pub fn allow_origin(mut self, origin: &str) -> Self {
        self.allow_origin = origin.to_owned();
        self
    }

    pub fn allow_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.allow_methods = methods.into_iter().collect();
        self
    }

    pub fn allow_headers<'a>(mut self, headers: impl IntoIterator<Item = &'a str>) -> Self {
        self.allow_headers = headers.into_iter().map(str::to_owned).collect();
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let methods = self.allow_methods.iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        vec![
            ("access-control-allow-origin", self.allow_origin.clone()),
            ("access-control-allow-methods", methods),
            ("access-control-allow-headers", self.allow_headers.join(", ")),
        ]
    }
}

impl Default for Cors {
    fn default() -> Self { Self::permissive() }
}

impl Middleware for Cors {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let headers = self.headers();

        if req.method() == Method::OPTIONS {
            let mut res = Response::status(StatusCode::NO_CONTENT);
            for (name, value) in headers {
                res.set_header(name, value);
            }
            res.set_header("access-control-max-age", self.max_age.as_secs().to_string());
            return Box::pin(async move { res });
        }

        Box::pin(async move {
            let mut res = next.run(req).await;
            for (name, value) in headers {
                res.set_header(name, value);
            }
            res
        })
    }
}
