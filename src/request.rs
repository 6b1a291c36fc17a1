//! Incoming HTTP request type.
//!
//! The server fills one [`Request`] per HTTP request with everything a
//! handler may need: method, path, query, headers, body and the values
//! captured from the route template. There is no ambient global state.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::method::Method;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// An incoming HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    pub(crate) json: Option<Value>,
    pub(crate) params: Vec<String>,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) allowed_origin: Option<Arc<str>>,
}

impl Request {
    /// A request for `target` (path plus optional `?query`), with no headers
    /// and an empty body. Useful for exercising handlers directly.
    ///
    /// ```rust
    /// use routify::{Method, Request};
    ///
    /// let req = Request::new(Method::Get, "/api/orders?page=2");
    /// assert_eq!(req.path(), "/api/orders");
    /// assert_eq!(req.query_param("page"), Some("2"));
    /// ```
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_pairs(query.as_bytes())),
            None => (target, Vec::new()),
        };
        Self {
            method,
            path: path.to_owned(),
            query,
            headers: Vec::new(),
            body: Vec::new(),
            json: None,
            params: Vec::new(),
            remote_addr: None,
            allowed_origin: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Sets the body. A leading UTF-8 byte-order mark is removed, and the
    /// remaining bytes are parsed as JSON when they form a valid document.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let mut body = body.into();
        if body.starts_with(UTF8_BOM) {
            body.drain(..UTF8_BOM.len());
        }
        self.json = serde_json::from_slice(&body).ok();
        self.body = body;
        self
    }

    pub(crate) fn with_remote_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    pub(crate) fn with_allowed_origin(mut self, origin: Option<Arc<str>>) -> Self {
        self.allowed_origin = origin;
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> &[(String, String)] { &self.query }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// The default origin the router was configured with, if any.
    pub fn allowed_origin(&self) -> Option<&str> {
        self.allowed_origin.as_deref()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First query-string value for `key`, percent-decoded.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        lookup(&self.query, key)
    }

    /// The body parsed as JSON, if it is valid JSON.
    pub fn json(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    /// The body deserialized into `T`.
    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// A field of an `application/x-www-form-urlencoded` body.
    pub fn form(&self, key: &str) -> Option<String> {
        let is_form = self.header("content-type")
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if !is_form {
            return None;
        }
        lookup(&parse_pairs(&self.body), key).map(str::to_owned)
    }

    /// Values captured from the route template, left to right.
    pub fn params(&self) -> &[String] { &self.params }

    /// The `index`-th captured value (zero-based).
    ///
    /// For a route `/order/{uuid}`, `req.param(0)` on `/order/42` returns `Some("42")`.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

fn parse_pairs(input: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input).into_owned().collect()
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[test]
    fn query_is_split_and_decoded() {
        let req = Request::new(Method::Get, "/api/orders?name=a%20b&tag=x&tag=y");
        assert_eq!(req.path(), "/api/orders");
        assert_eq!(req.query_param("name"), Some("a b"));
        assert_eq!(req.query_param("tag"), Some("x"));
        assert_eq!(req.query().len(), 3);
    }

    #[test]
    fn bom_is_stripped_before_json_parsing() {
        let req = Request::new(Method::Post, "/").with_body(b"\xEF\xBB\xBF{\"name\":\"X\"}".to_vec());
        assert_eq!(req.body(), br#"{"name":"X"}"#);
        assert_eq!(req.json(), Some(&json!({"name": "X"})));
    }

    #[test]
    fn invalid_json_leaves_raw_body() {
        let req = Request::new(Method::Post, "/").with_body("not json");
        assert_eq!(req.json(), None);
        assert_eq!(req.body(), b"not json");
    }

    #[test]
    fn typed_body() {
        #[derive(Deserialize)]
        struct Order { name: String }

        let req = Request::new(Method::Post, "/").with_body(r#"{"name":"X"}"#);
        assert_eq!(req.json_as::<Order>().unwrap().name, "X");
    }

    #[test]
    fn form_fields_require_form_content_type() {
        let req = Request::new(Method::Post, "/").with_body("name=X&price=4.5");
        assert_eq!(req.form("name"), None);

        let req = req.with_header("Content-Type", "application/x-www-form-urlencoded");
        assert_eq!(req.form("price").as_deref(), Some("4.5"));
    }
}
