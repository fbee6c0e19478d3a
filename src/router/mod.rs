//! Request routing: map a request path to a handler.
//!
//! Two kinds of route are supported:
//!
//! | Kind   | Registered as      | Matches                                   |
//! |--------|--------------------|-------------------------------------------|
//! | exact  | `/user-agent`      | `/user-agent` only                        |
//! | prefix | `/echo/`           | any path starting with `/echo/`           |
//!
//! Exact routes always win. Among prefix routes the longest matching prefix
//! wins. When nothing matches, the router's not-found handler runs.
//!
//! Routes are registered once at startup; after that the router is only read,
//! so it is shared between connections behind an `Arc` with no locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{Request, Response, StatusCode};

/// Type-erased, shareable handler: a plain function from request to response.
///
/// Handlers never fail; error conditions are expressed as error-status responses.
pub type Handler = Arc<dyn Fn(&Request) -> Response + Send + Sync + 'static>;

/// Conversion trait for handler functions.
///
/// Any `Fn(&Request) -> Response + Send + Sync + 'static` implements this via the
/// blanket impl below, so closures and `fn` items can be registered directly.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given request.
    fn call(&self, request: &Request) -> Response;
}

impl<T> IntoHandler for T
where
    T: Fn(&Request) -> Response + Send + Sync + 'static,
{
    fn call(&self, request: &Request) -> Response {
        (self)(request)
    }
}

fn into_handler(handler: impl IntoHandler) -> Handler {
    Arc::new(move |req: &Request| handler.call(req))
}

/// Default fallback when no route matches.
pub fn not_found(_request: &Request) -> Response {
    Response::new(StatusCode::NotFound)
}

/// Path router with exact and longest-prefix matching.
///
/// # Examples
///
/// ```
/// use rivulet::{Method, Request, Response, Router, StatusCode};
///
/// let mut router = Router::new();
/// router.exact("/", |_req: &Request| Response::new(StatusCode::Ok));
/// router.prefix("/echo/", |req: &Request| {
///     let text = req.path().trim_start_matches("/echo/").to_owned();
///     Response::new(StatusCode::Ok).body(text)
/// });
///
/// let res = router.dispatch(&Request::new(Method::Get, "/echo/hi"));
/// assert_eq!(&res.payload()[..], b"hi");
///
/// let res = router.dispatch(&Request::new(Method::Get, "/nope"));
/// assert_eq!(res.status(), 404);
/// ```
pub struct Router {
    exact: HashMap<String, Handler>,
    // Kept sorted by descending prefix length so the first hit is the longest.
    prefixes: Vec<(String, Handler)>,
    fallback: Handler,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut exact: Vec<_> = self.exact.keys().collect();
        exact.sort();
        f.debug_struct("Router")
            .field("exact", &exact)
            .field(
                "prefixes",
                &self.prefixes.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Create an empty router whose fallback is [`not_found`].
    pub fn new() -> Self {
        Self {
            exact: HashMap::new(),
            prefixes: Vec::new(),
            fallback: Arc::new(not_found),
        }
    }

    /// Register `handler` for requests whose path equals `path` exactly.
    ///
    /// Registering the same path twice replaces the earlier handler.
    pub fn exact(&mut self, path: &str, handler: impl IntoHandler) -> &mut Self {
        self.exact.insert(path.to_owned(), into_handler(handler));
        self
    }

    /// Register `handler` for requests whose path starts with `prefix`.
    ///
    /// Registering the same prefix twice replaces the earlier handler.
    pub fn prefix(&mut self, prefix: &str, handler: impl IntoHandler) -> &mut Self {
        let handler = into_handler(handler);
        if let Some(entry) = self.prefixes.iter_mut().find(|(p, _)| p == prefix) {
            entry.1 = handler;
            return self;
        }
        let pos = self
            .prefixes
            .partition_point(|(p, _)| p.len() >= prefix.len());
        self.prefixes.insert(pos, (prefix.to_owned(), handler));
        self
    }

    /// Replace the handler used when no route matches.
    pub fn fallback(&mut self, handler: impl IntoHandler) -> &mut Self {
        self.fallback = into_handler(handler);
        self
    }

    /// Return the handler for `path`: exact match, else longest prefix, else
    /// the fallback.
    pub fn lookup(&self, path: &str) -> &Handler {
        if let Some(handler) = self.exact.get(path) {
            return handler;
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, handler)| handler)
            .unwrap_or(&self.fallback)
    }

    /// Look up the handler for `request` and run it.
    pub fn dispatch(&self, request: &Request) -> Response {
        (self.lookup(request.path()))(request)
    }

    /// Number of registered routes, exact and prefix.
    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    /// `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
