//! Request routing: map exact URL paths and HTTP methods to handler functions.
//!
//! Trailing slashes are normalized on both patterns and incoming paths, so
//! `/voice/` and `/voice` are equivalent. Routes are matched in registration
//! order. A path that exists under another method yields `405 Method Not
//! Allowed` with an `Allow` header; an unknown path goes to the fallback
//! handler (`404 Not Found` unless replaced).

use std::sync::Arc;

use crate::context::Context;
use crate::http::{Method, Request, Response, StatusCode};
use crate::middleware::{BoxResponse, Middleware, Next};

/// Type-erased async handler.
pub type Handler = Arc<dyn Fn(Context) -> BoxResponse + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait through the blanket impl.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxResponse;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxResponse {
        Box::pin((self)(ctx))
    }
}

fn normalize(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        path.trim_end_matches('/')
    } else {
        path
    }
}

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

/// HTTP request router with a middleware stack.
///
/// # Examples
///
/// ```rust,no_run
/// use zyvora::context::Context;
/// use zyvora::router::Router;
/// use zyvora::http::{Response, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/health", |_ctx: Context| async { Response::new(StatusCode::Ok).body("ok") });
/// ```
pub struct Router {
    routes: Vec<Route>,
    layers: Arc<[Arc<dyn Middleware>]>,
    fallback: Handler,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            layers: Arc::from(Vec::new()),
            fallback: Arc::new(|_ctx: Context| -> BoxResponse {
                Box::pin(async { Response::new(StatusCode::NotFound).body("Not Found") })
            }),
        }
    }

    /// Registers a handler for `GET` requests on `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Registers a handler for `POST` requests on `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Replaces the handler used when no route path matches.
    pub fn fallback(&mut self, handler: impl IntoHandler) {
        self.fallback = erase(handler);
    }

    /// Appends a middleware. The first layer added is the outermost.
    pub fn layer(&mut self, middleware: impl Middleware + 'static) {
        let middleware: Arc<dyn Middleware> = Arc::new(middleware);
        self.layers = self
            .layers
            .iter()
            .cloned()
            .chain(std::iter::once(middleware))
            .collect();
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        self.routes.push(Route {
            method,
            path: normalize(path).to_owned(),
            handler: erase(handler),
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches `request` through the middleware stack to the matching route.
    pub async fn route(&self, request: Request) -> Response {
        let endpoint = self.resolve(request.method(), request.path());
        Next::new(Arc::clone(&self.layers), endpoint)
            .run(Context::new(request))
            .await
    }

    fn resolve(&self, method: &Method, path: &str) -> Handler {
        let path = normalize(path);
        let mut allowed: Vec<&str> = Vec::new();

        for route in self.routes.iter().filter(|r| r.path == path) {
            if &route.method == method {
                return Arc::clone(&route.handler);
            }
            if !allowed.contains(&route.method.as_str()) {
                allowed.push(route.method.as_str());
            }
        }

        if allowed.is_empty() {
            return Arc::clone(&self.fallback);
        }

        let allow = allowed.join(", ");
        Arc::new(move |_ctx: Context| -> BoxResponse {
            let allow = allow.clone();
            Box::pin(async move {
                Response::new(StatusCode::MethodNotAllowed)
                    .header("Allow", allow)
                    .body("Method Not Allowed")
            })
        })
    }
}

fn erase(handler: impl IntoHandler) -> Handler {
    Arc::new(move |ctx| handler.call(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    #[test]
    fn normalize_trailing_slash() {
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("/voice/"), "/voice");
        assert_eq!(normalize("/voice//"), "/voice");
        assert_eq!(normalize("/voice"), "/voice");
    }

    #[test]
    fn router_starts_empty() {
        let router = Router::default();
        assert!(router.is_empty());
        assert_eq!(router.len(), 0);
    }

    #[tokio::test]
    async fn empty_router_returns_404() {
        let router = Router::new();
        let res = router.route(make_request("GET", "/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn get_and_post_share_a_path() {
        let mut router = Router::new();
        router.get("/", |_ctx: Context| async { Response::new(StatusCode::Ok).body("form") });
        router.post("/", |_ctx: Context| async { Response::new(StatusCode::Ok).body("reply") });
        assert_eq!(router.len(), 2);
        assert_eq!(router.route(make_request("GET", "/")).await.body_text(), "form");
        assert_eq!(router.route(make_request("POST", "/")).await.body_text(), "reply");
    }

    #[tokio::test]
    async fn trailing_slash_matches() {
        let mut router = Router::new();
        router.get("/voice", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        let res = router.route(make_request("GET", "/voice/")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let mut router = Router::new();
        router.post("/chat", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        let res = router.route(make_request("DELETE", "/chat")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
        assert_eq!(res.headers().get("allow"), Some("POST"));
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/path", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.get("/path", |_ctx: Context| async { Response::new(StatusCode::BadGateway) });
        let res = router.route(make_request("GET", "/path")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn custom_fallback() {
        let mut router = Router::new();
        router.fallback(|ctx: Context| async move {
            let path = ctx.request().path().to_owned();
            Response::new(StatusCode::NotFound).body(format!("nothing at {path}"))
        });
        let res = router.route(make_request("GET", "/missing")).await;
        assert_eq!(res.body_text(), "nothing at /missing");
    }

    #[tokio::test]
    async fn layers_wrap_unmatched_requests_too() {
        let mut router = Router::new();
        router.layer(crate::middleware::SecureHeadersMiddleware);
        let res = router.route(make_request("GET", "/missing")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(res.headers().get("x-frame-options"), Some("DENY"));
    }
}
