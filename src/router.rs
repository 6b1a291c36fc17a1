//! Route registry and dispatch.
//!
//! Routes are kept per method, in registration order. A request is matched
//! against its method's templates one by one and the first template that
//! matches the whole path wins, so among overlapping templates the one
//! registered first takes precedence.
//!
//! Build the router once at startup and hand it to
//! [`Server::serve`](crate::Server::serve); it is read-only from then on.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::cors::Cors;
use crate::handler::{Endpoint, Handler};
use crate::method::Method;
use crate::pattern::PathPattern;
use crate::request::Request;
use crate::responder::{Reply, ResponseType};
use crate::response::{self, Response};

/// The application router.
///
/// Each registration call returns `self`, so routes chain naturally.
/// [`Router::namespace`] scopes a group of registrations under a common
/// prefix:
///
/// ```rust
/// use routify::{Request, Response, Router, respond};
///
/// async fn list_orders(_: Request) -> Response { respond("success", (), None, None) }
/// async fn get_order(req: Request) -> Response { respond("success", req.param(0), None, None) }
///
/// let router = Router::new()
///     .allowed_origin("http://localhost:5173")
///     .namespace("/api", |api| {
///         api.get("/orders", list_orders)
///            .get("/order/{uuid}", get_order)
///     });
///
/// assert_eq!(router.routes("/api").len(), 2);
/// ```
pub struct Router {
    tables: Vec<MethodTable>,
    prefix: String,
    listing: bool,
    allowed_origin: Option<Arc<str>>,
}

struct MethodTable {
    method: Method,
    routes: Vec<Route>,
}

struct Route {
    pattern: PathPattern,
    endpoint: Endpoint,
}

impl Router {
    pub fn new() -> Self {
        Self { tables: Vec::new(), prefix: String::new(), listing: false, allowed_origin: None }
    }

    /// Sets the prefix for subsequent registrations. A trailing `/` is dropped.
    pub fn prefix(mut self, path: &str) -> Self {
        self.prefix = path.trim().trim_end_matches('/').to_owned();
        self
    }

    /// The default origin used in CORS headers when a policy names none.
    pub fn allowed_origin(mut self, origin: &str) -> Self {
        self.allowed_origin = Some(Arc::from(origin));
        self
    }

    /// When enabled, every subsequent [`namespace`](Router::namespace) also
    /// registers `GET <namespace>`, answering with the routes it contains.
    pub fn listing(mut self, enabled: bool) -> Self {
        self.listing = enabled;
        self
    }

    /// Registers the routes added by `register` under `segment`, appended to
    /// the current prefix. The previous prefix is back in place once
    /// `register` returns.
    pub fn namespace<F>(self, segment: &str, register: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let (router, previous) = self.enter(segment);
        router.leave(register, previous)
    }

    /// Like [`namespace`](Router::namespace) for registration code that can
    /// fail. An error abandons the router being built.
    pub fn try_namespace<F, E>(self, segment: &str, register: F) -> Result<Self, E>
    where
        F: FnOnce(Self) -> Result<Self, E>,
    {
        let (router, previous) = self.enter(segment);
        let router = register(router)?;
        Ok(router.leave(|r| r, previous))
    }

    fn enter(mut self, segment: &str) -> (Self, String) {
        let previous = self.prefix.clone();
        let segment = segment.trim().trim_matches('/');
        if !segment.is_empty() {
            self.prefix.push('/');
            self.prefix.push_str(segment);
        }
        (self, previous)
    }

    fn leave<F>(self, register: F, previous: String) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let mut router = register(self);
        if router.listing {
            let scope = router.prefix.clone();
            router = router.add(Method::Get, "", Endpoint::Listing(scope));
        }
        router.prefix = previous;
        router
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, path, handler)
    }

    /// Registers a handler for a method + path pair.
    ///
    /// The full path is the current prefix, `/`, and `path` without leading
    /// or trailing slashes. `{name}` placeholders capture one segment each;
    /// handlers read them with [`Request::param`]. Registering the same
    /// method and path again replaces the earlier handler.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler.into_endpoint())
    }

    fn add(mut self, method: Method, path: &str, endpoint: Endpoint) -> Self {
        let full = self.full_path(path);
        let index = match self.tables.iter().position(|t| t.method == method) {
            Some(index) => index,
            None => {
                self.tables.push(MethodTable { method, routes: Vec::new() });
                self.tables.len() - 1
            }
        };
        let routes = &mut self.tables[index].routes;

        match routes.iter_mut().find(|r| r.pattern.as_str() == full) {
            Some(existing) => {
                tracing::debug!(%method, path = %full, "route replaced");
                existing.endpoint = endpoint;
            }
            None => routes.push(Route { pattern: PathPattern::compile(&full), endpoint }),
        }
        self
    }

    fn full_path(&self, path: &str) -> String {
        let relative = path.trim().trim_matches('/');
        match (self.prefix.is_empty(), relative.is_empty()) {
            (true, true) => "/".to_owned(),
            (false, true) => self.prefix.clone(),
            _ => format!("{}/{relative}", self.prefix),
        }
    }

    /// Every registered `(method, path)` whose path starts with `prefix`, in
    /// registration order.
    pub fn routes(&self, prefix: &str) -> Vec<(Method, String)> {
        let prefix = prefix.trim_end_matches('/');
        self.tables.iter()
            .flat_map(|t| t.routes.iter().map(move |r| (t.method, r.pattern.as_str())))
            .filter(|(_, path)| path.starts_with(prefix))
            .map(|(method, path)| (method, path.to_owned()))
            .collect()
    }

    /// Answers with the routes under `prefix`, grouped by method, or with
    /// `not_found` if there are none.
    pub fn list_routes(&self, prefix: &str) -> Response {
        let prefix = prefix.trim_end_matches('/');
        let routes = self.routes(prefix);
        if routes.is_empty() {
            return Reply::new(ResponseType::NotFound)
                .message(format!("No routes found under the namespace '{prefix}'."))
                .finish();
        }

        let mut grouped = Map::new();
        for (method, path) in routes {
            let entry = grouped.entry(method.as_str()).or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(paths) = entry {
                paths.push(Value::String(path));
            }
        }
        Reply::success()
            .data(grouped)
            .message(format!("Available routes under the namespace '{prefix}':"))
            .finish()
    }

    pub(crate) fn default_origin(&self) -> Option<&Arc<str>> {
        self.allowed_origin.as_ref()
    }

    /// The response to a CORS preflight: `204`, no body, the preflight policy.
    pub fn preflight(&self) -> Response {
        Cors::preflight(self.allowed_origin.as_deref())
            .apply(Response::builder().status(204).no_body(), None)
    }

    /// Routes one request and produces one response.
    ///
    /// - `OPTIONS` is answered by [`preflight`](Router::preflight), for any path.
    /// - A method with no routes at all gets `405`.
    /// - The first matching template's handler is invoked with the captured
    ///   values in [`Request::params`].
    /// - A path that only matches under another method gets `405`; anything
    ///   else gets `404`.
    ///
    /// Handler panics are not caught here; the server is the boundary for
    /// those.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        if req.method() == Method::Options {
            return self.preflight();
        }

        let Some(table) = self.tables.iter().find(|t| t.method == req.method()) else {
            return method_not_allowed();
        };

        for route in &table.routes {
            if let Some(params) = route.pattern.captures(req.path()) {
                req.params = params;
                if req.allowed_origin.is_none() {
                    req.allowed_origin = self.allowed_origin.clone();
                }
                return self.invoke(&route.endpoint, req).await;
            }
        }

        let elsewhere = self.tables.iter()
            .filter(|t| t.method != req.method())
            .flat_map(|t| &t.routes)
            .any(|r| r.pattern.is_match(req.path()));
        if elsewhere {
            method_not_allowed()
        } else {
            Reply::new(ResponseType::NotFound).message("Route not found.").finish()
        }
    }

    async fn invoke(&self, endpoint: &Endpoint, req: Request) -> Response {
        match endpoint {
            Endpoint::Callback(handler) => handler.call(req).await,
            Endpoint::Method(method) => match method.call(req).await {
                Ok(value) => Reply::success()
                    .data(value)
                    .message("Request successful")
                    .status(200)
                    .finish(),
                Err(reason) => response::failed(reason),
            },
            Endpoint::Listing(scope) => self.list_routes(scope),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn method_not_allowed() -> Response {
    Reply::new(ResponseType::MethodNotAllowed).message("Method Not Allowed.").finish()
}
