//! Middleware pipeline: composable before/after request handler logic.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`Pipeline`]: an ordered middleware stack terminated by a [`Router`].
//! - [`LoggerMiddleware`]: one structured log line per request.
//! - [`CacheControlMiddleware`]: default `Cache-Control` for every response.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, StatusCode, context::Context, router::Router};

/// A cursor into the remaining middleware chain for a single request.
///
/// Consumed by [`run`](Self::run), so each middleware can forward at most once.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    index: usize,
}

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Wraps a [`Middleware`] implementation as a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    pub fn new(middlewares: Arc<[MiddlewareHandler]>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain.
    ///
    /// An exhausted chain answers `500`: the pipeline always ends in the
    /// router, so reaching the end means a middleware forwarded past it.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline"),
        }
    }
}

/// The core middleware trait.
///
/// Implementations may pass through (`next.run(ctx).await`), short-circuit by
/// returning a response without calling `next`, or decorate the downstream
/// response. They must not hold `&mut` shared state across an `.await`.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// An ordered middleware stack whose final layer dispatches through a [`Router`].
///
/// Cloning is cheap; the stack is shared behind an `Arc`.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use boardshelf::context::Context;
/// use boardshelf::middleware::{LoggerMiddleware, Pipeline};
/// use boardshelf::{Response, Router, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/catalog", |_ctx: Context| async { Response::new(StatusCode::Ok) });
///
/// let pipeline = Pipeline::builder()
///     .layer(Arc::new(LoggerMiddleware))
///     .finish(router);
/// ```
#[derive(Clone)]
pub struct Pipeline {
    stack: Arc<[MiddlewareHandler]>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder { layers: Vec::new() }
    }

    /// Runs `request` through every layer and the router.
    pub async fn handle(&self, request: Request) -> Response {
        Next::new(Arc::clone(&self.stack))
            .run(Context::new(request))
            .await
    }
}

/// Collects layers in the order they wrap the router (first = outermost).
pub struct PipelineBuilder {
    layers: Vec<MiddlewareHandler>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn layer<M>(mut self, middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        self.layers.push(from_middleware(middleware));
        self
    }

    pub fn finish(mut self, router: Router) -> Pipeline {
        let router = Arc::new(router);
        let endpoint: MiddlewareHandler = Arc::new(
            move |ctx: Context, _next: Next| -> Pin<Box<dyn Future<Output = Response> + Send>> {
                let router = Arc::clone(&router);
                Box::pin(async move { router.dispatch(ctx).await })
            },
        );
        self.layers.push(endpoint);
        Pipeline {
            stack: self.layers.into(),
        }
    }
}

/// Logs method, path, status and duration once the downstream handler returns.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            let status = response.status();
            if status.is_server_error() {
                tracing::warn!(
                    %method,
                    %path,
                    status = status.as_u16(),
                    elapsed = ?start.elapsed(),
                    "request failed"
                );
            } else {
                tracing::info!(
                    %method,
                    %path,
                    status = status.as_u16(),
                    elapsed = ?start.elapsed(),
                    "request completed"
                );
            }

            response
        })
    }
}

/// `Cache-Control` applied to responses whose route did not choose one.
pub const DEFAULT_CACHE_CONTROL: &str = "no-cache, no-store";

/// Sets `Cache-Control` on every response that does not already carry one,
/// so routes opt in to caching explicitly.
pub struct CacheControlMiddleware {
    default: &'static str,
}

impl CacheControlMiddleware {
    pub fn new(default: &'static str) -> Self {
        Self { default }
    }
}

impl Default for CacheControlMiddleware {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CONTROL)
    }
}

impl Middleware for CacheControlMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let default = self.default;
        Box::pin(async move {
            let mut response = next.run(ctx).await;
            if !response.headers().contains("cache-control") {
                response.add_header("Cache-Control", default);
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stamp(&'static str);

    impl Middleware for Stamp {
        fn handle(
            &self,
            ctx: Context,
            next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            let value = self.0;
            Box::pin(async move {
                let mut response = next.run(ctx).await;
                response.add_header("X-Layer", value);
                response
            })
        }
    }

    struct Deny;

    impl Middleware for Deny {
        fn handle(
            &self,
            _ctx: Context,
            _next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(async { Response::new(StatusCode::Forbidden) })
        }
    }

    fn request(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    fn router() -> Router {
        let mut router = Router::new();
        router.get("/catalog", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.get("/cached", |_ctx: Context| async {
            Response::new(StatusCode::Ok).header("Cache-Control", "public, max-age=60")
        });
        router
    }

    #[tokio::test]
    async fn layers_wrap_the_router_in_order() {
        let pipeline = Pipeline::builder()
            .layer(Arc::new(Stamp("outer")))
            .layer(Arc::new(Stamp("inner")))
            .layer(Arc::new(LoggerMiddleware))
            .finish(router());

        let response = pipeline.handle(request("/catalog")).await;
        assert_eq!(response.status(), StatusCode::Ok);
        let layers: Vec<_> = response
            .headers()
            .iter()
            .filter(|(k, _)| *k == "X-Layer")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(layers, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_router() {
        let pipeline = Pipeline::builder().layer(Arc::new(Deny)).finish(router());
        let response = pipeline.handle(request("/catalog")).await;
        assert_eq!(response.status(), StatusCode::Forbidden);
    }

    #[tokio::test]
    async fn exhausted_chain_is_500() {
        let response = Next::new(Arc::from(Vec::new()))
            .run(Context::new(request("/catalog")))
            .await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn cache_control_defaults_unless_route_sets_it() {
        let pipeline = Pipeline::builder()
            .layer(Arc::new(CacheControlMiddleware::default()))
            .finish(router());

        let plain = pipeline.handle(request("/catalog")).await;
        assert_eq!(plain.headers().get("cache-control"), Some("no-cache, no-store"));

        let missing = pipeline.handle(request("/nowhere")).await;
        assert_eq!(missing.status(), StatusCode::NotFound);
        assert_eq!(missing.headers().get("cache-control"), Some("no-cache, no-store"));

        let cached = pipeline.handle(request("/cached")).await;
        let values: Vec<_> = cached
            .headers()
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cache-control"))
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, vec!["public, max-age=60"]);
    }
}
