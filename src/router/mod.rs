//! Request routing: map URL patterns and HTTP methods to handler functions.
//!
//! | Pattern        | Example match   | Captured params |
//! |----------------|-----------------|-----------------|
//! | `/catalog`     | `/catalog`      | *(none)*        |
//! | `/catalog/:id` | `/catalog/42`   | `id → "42"`     |
//!
//! Trailing slashes are normalized on both patterns and incoming paths.
//! Routes are matched in registration order; the first match wins. A path
//! that matches some route under a different method yields `405`.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::{Method, Response, StatusCode};

/// Type-erased async handler.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this through the blanket impl.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized { segments: Vec<Segment> },
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

impl Pattern {
    /// Compiles a pattern string. Anything containing `:` is parameterized.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Parameter(name.to_string()),
                    None => Segment::Static(s.to_string()),
                })
                .collect();
            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s != path_seg => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }
                Some(params)
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

/// Dispatches requests to handlers by method and path.
///
/// # Examples
///
/// ```rust,no_run
/// use boardshelf::context::Context;
/// use boardshelf::router::Router;
/// use boardshelf::{Response, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/catalog/:id", |ctx: Context| async move {
///     let id = ctx.params().get("id").unwrap_or("unknown").to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx: Context| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches `ctx` to the first route matching its method and path.
    ///
    /// Returns `404` when no pattern matches and `405` when a pattern matches
    /// only under other methods.
    pub async fn dispatch(&self, mut ctx: Context) -> Response {
        let mut path_matched = false;

        for route in &self.routes {
            let Some(params) = route.pattern.matches(ctx.request().path()) else {
                continue;
            };
            if &route.method != ctx.request().method() {
                path_matched = true;
                continue;
            }
            ctx.set_params(params);
            return (route.handler)(ctx).await;
        }

        if path_matched {
            Response::new(StatusCode::MethodNotAllowed)
        } else {
            Response::new(StatusCode::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Request;

    fn make_ctx(method: &str, path: &str) -> Context {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req)
    }

    #[test]
    fn pattern_parse_trailing_slash_stripped() {
        assert!(matches!(Pattern::parse("/catalog/"), Pattern::Exact(s) if s == "/catalog"));
    }

    #[test]
    fn pattern_parse_parameterized() {
        match Pattern::parse("/catalog/:id") {
            Pattern::Parameterized { segments } => {
                assert_eq!(segments.len(), 2);
                assert!(matches!(&segments[0], Segment::Static(s) if s == "catalog"));
                assert!(matches!(&segments[1], Segment::Parameter(s) if s == "id"));
            }
            other => panic!("expected Parameterized, got {other:?}"),
        }
    }

    #[test]
    fn pattern_param_extracts_value() {
        let pat = Pattern::parse("/catalog/:id");
        assert_eq!(pat.matches("/catalog/42").unwrap().get("id"), Some("42"));
        assert!(pat.matches("/catalog").is_none());
        assert!(pat.matches("/catalog/42/extra").is_none());
        assert!(pat.matches("/account/42").is_none());
    }

    #[test]
    fn pattern_exact_matches_with_trailing_slash() {
        let pat = Pattern::parse("/catalog");
        assert!(pat.matches("/catalog/").is_some());
        assert!(pat.matches("/account").is_none());
    }

    #[tokio::test]
    async fn dispatch_unknown_path_is_404() {
        let mut router = Router::new();
        router.get("/catalog", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        let res = router.dispatch(make_ctx("GET", "/nowhere")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn dispatch_wrong_method_is_405() {
        let mut router = Router::new();
        router.get("/catalog", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        let res = router.dispatch(make_ctx("PUT", "/catalog")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
    }

    #[tokio::test]
    async fn dispatch_passes_path_params() {
        let mut router = Router::new();
        router.delete("/catalog/:id", |ctx: Context| async move {
            let id = ctx.params().get("id").unwrap_or("").to_owned();
            Response::new(StatusCode::Ok).body(id)
        });
        router.get("/catalog/:id", |_ctx: Context| async { Response::new(StatusCode::NoContent) });
        assert_eq!(router.len(), 2);

        let res = router.dispatch(make_ctx("DELETE", "/catalog/5")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), b"5");

        let res = router.dispatch(make_ctx("GET", "/catalog/5")).await;
        assert_eq!(res.status(), StatusCode::NoContent);
    }
}
