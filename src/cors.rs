//! Cross-origin resource sharing headers.
//!
//! ```rust
//! use routify::{Cors, Response};
//!
//! let cors = Cors::new()
//!     .methods(["GET", "POST"])
//!     .origins("http://localhost:5173")
//!     .headers(["Content-Type", "Accept"])
//!     .credentials(true);
//!
//! let res = cors.apply(Response::status(204), None);
//! assert_eq!(res.header("access-control-allow-methods"), Some("GET,POST"));
//! ```

use crate::request::Request;
use crate::responder::{Reply, ResponseType};
use crate::response::Response;

pub const DEFAULT_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const DEFAULT_HEADERS: &str = "Content-Type, Authorization";

pub const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
pub const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
pub const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
pub const ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";

/// One value or an ordered list of values for an `Access-Control-Allow-*`
/// header. Lists are joined with `,`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AllowList(Vec<String>);

impl AllowList {
    fn render(&self) -> Option<String> {
        let joined = self.0.iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        (!joined.is_empty()).then_some(joined)
    }

    /// Whether `value` is one of the comma-separated entries (ASCII
    /// case-insensitive).
    fn contains(&self, value: &str) -> bool {
        self.0.iter()
            .flat_map(|v| v.split(','))
            .any(|v| v.trim().eq_ignore_ascii_case(value))
    }
}

impl From<&str> for AllowList {
    fn from(value: &str) -> Self { Self(vec![value.to_owned()]) }
}

impl From<String> for AllowList {
    fn from(value: String) -> Self { Self(vec![value]) }
}

impl<S: Into<String>> From<Vec<S>> for AllowList {
    fn from(values: Vec<S>) -> Self { Self(values.into_iter().map(Into::into).collect()) }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for AllowList {
    fn from(values: [S; N]) -> Self { Self(values.into_iter().map(Into::into).collect()) }
}

/// A CORS policy.
///
/// Empty lists fall back to defaults when rendered: methods to
/// [`DEFAULT_METHODS`], headers to [`DEFAULT_HEADERS`], origins to the
/// configured default origin, else `*`.
#[derive(Clone, Debug, Default)]
pub struct Cors {
    methods: AllowList,
    origins: AllowList,
    headers: AllowList,
    credentials: bool,
}

impl Cors {
    pub fn new() -> Self {
        Self::default()
    }

    /// The policy applied to preflight requests and to every response the
    /// server emits: default methods and headers, the configured origin,
    /// credentials allowed.
    pub fn preflight(origin: Option<&str>) -> Self {
        let cors = Self::new().methods(DEFAULT_METHODS).headers(DEFAULT_HEADERS).credentials(true);
        match origin {
            Some(origin) => cors.origins(origin),
            None => cors,
        }
    }

    pub fn methods(mut self, methods: impl Into<AllowList>) -> Self {
        self.methods = methods.into();
        self
    }

    pub fn origins(mut self, origins: impl Into<AllowList>) -> Self {
        self.origins = origins.into();
        self
    }

    pub fn headers(mut self, headers: impl Into<AllowList>) -> Self {
        self.headers = headers.into();
        self
    }

    pub fn credentials(mut self, allow: bool) -> Self {
        self.credentials = allow;
        self
    }

    /// The `Access-Control-Allow-*` header pairs for this policy.
    pub fn header_pairs(&self, fallback_origin: Option<&str>) -> [(&'static str, String); 4] {
        let origin = self.origins.render()
            .or_else(|| fallback_origin.filter(|o| !o.is_empty()).map(str::to_owned))
            .unwrap_or_else(|| "*".to_owned());
        [
            (ALLOW_METHODS, self.methods.render().unwrap_or_else(|| DEFAULT_METHODS.to_owned())),
            (ALLOW_ORIGIN, origin),
            (ALLOW_HEADERS, self.headers.render().unwrap_or_else(|| DEFAULT_HEADERS.to_owned())),
            (ALLOW_CREDENTIALS, self.credentials.to_string()),
        ]
    }

    /// Sets this policy's headers on `response`, replacing earlier values.
    pub fn apply(&self, mut response: Response, fallback_origin: Option<&str>) -> Response {
        for (name, value) in self.header_pairs(fallback_origin) {
            response.set_header(name, value);
        }
        response
    }

    /// Rejects a request whose method is not among the allowed methods.
    ///
    /// An empty method list allows the default set.
    ///
    /// ```rust
    /// use routify::{Cors, Method, Request};
    ///
    /// let cors = Cors::new().methods(["GET"]);
    /// assert!(cors.check_method(&Request::new(Method::Get, "/")).is_ok());
    /// assert!(cors.check_method(&Request::new(Method::Post, "/")).is_err());
    /// ```
    pub fn check_method(&self, req: &Request) -> Result<(), Response> {
        let method = req.method().as_str();
        let allowed = if self.methods.render().is_some() {
            self.methods.contains(method)
        } else {
            AllowList::from(DEFAULT_METHODS).contains(method)
        };
        if allowed {
            return Ok(());
        }
        let rejection = Reply::new(ResponseType::MethodNotAllowed)
            .message("Error, method not allowed")
            .finish();
        Err(self.apply(rejection, req.allowed_origin()))
    }
}
