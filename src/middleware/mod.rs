//! Middleware pipeline: composable logic that wraps every routed request.
//!
//! Each [`Middleware`] receives the request [`Context`] and a [`Next`] cursor.
//! It may pass the request through, short-circuit with its own [`Response`],
//! or decorate the downstream response. The router installs the stack with
//! [`Router::layer`](crate::router::Router::layer); the matched endpoint sits
//! at the end of the chain.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;
use tracing::{info, warn};

use crate::{context::Context, http::Response, router::Handler};

/// Boxed future returned by middleware and handlers.
pub type BoxResponse = Pin<Box<dyn Future<Output = Response> + Send>>;

/// The core middleware trait.
///
/// Implementations must be `Send + Sync` because the stack is shared across
/// connection tasks.
pub trait Middleware: Send + Sync {
    /// Handles the request, optionally delegating via [`Next::run`].
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse;
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so each layer can forward at most once.
pub struct Next {
    stack: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: Handler,
}

impl Next {
    pub(crate) fn new(stack: Arc<[Arc<dyn Middleware>]>, endpoint: Handler) -> Self {
        Self {
            stack,
            index: 0,
            endpoint,
        }
    }

    /// Invokes the next middleware, or the endpoint once the stack is exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.stack.get(self.index).cloned() {
            Some(layer) => {
                self.index += 1;
                layer.handle(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// Logs method, path, status and latency for every request.
///
/// Server errors are logged at `warn`, everything else at `info`.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            let status = response.status().as_u16();
            let elapsed_ms = start.elapsed().as_millis() as u64;
            if status >= 500 {
                warn!(%method, %path, status, elapsed_ms, "request failed");
            } else {
                info!(%method, %path, status, elapsed_ms, "request served");
            }

            response
        })
    }
}

/// Adds `X-Content-Type-Options`, `X-Frame-Options` and `Referrer-Policy`
/// to every response.
pub struct SecureHeadersMiddleware;

impl Middleware for SecureHeadersMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        Box::pin(async move {
            let mut response = next.run(ctx).await;
            response.add_header("X-Content-Type-Options", "nosniff");
            response.add_header("X-Frame-Options", "DENY");
            response.add_header("Referrer-Policy", "no-referrer");
            response
        })
    }
}
