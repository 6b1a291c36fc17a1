//! # routify
//!
//! A small framework for JSON APIs: scoped route registration, one response
//! envelope for every answer, and per-client rate limiting in front of it all.
//!
//! ## The envelope
//!
//! Every response the framework builds has the same shape:
//!
//! ```json
//! { "status": true, "message": "Operation successful.", "data": { … }, "error": [] }
//! ```
//!
//! [`respond`] picks status code, message and error detail from a response
//! type key (`"success"`, `"not_found"`, …) and lets the caller override the
//! message and status. The one exception is the `429` sent by the rate
//! limiter, which carries a fixed two-field body.
//!
//! ## Routing
//!
//! Routes are path templates with `{name}` placeholders, registered per
//! method. Templates are tried in registration order and captured values are
//! handed to the handler positionally through [`Request::params`]. Namespaces
//! nest prefixes and can auto-register a `GET` listing of their routes.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use routify::{Request, Response, Router, ServerOptions, respond};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), routify::Error> {
//!     let app = Router::new()
//!         .allowed_origin("http://localhost:5173")
//!         .listing(true)
//!         .namespace("/api", |api| {
//!             api.get("/order/{uuid}", get_order)
//!                .post("/order", create_order)
//!         });
//!
//!     let options = ServerOptions { port: 3003, rate_limit: 50, ..ServerOptions::default() };
//!     routify::start(options, app).await
//! }
//!
//! async fn get_order(req: Request) -> Response {
//!     let uuid = req.param(0).unwrap_or_default();
//!     respond("success", json!({ "uuid": uuid }), None, None)
//! }
//!
//! async fn create_order(req: Request) -> Response {
//!     match req.json() {
//!         Some(order) => respond("success", order, Some("Order stored."), Some(201)),
//!         None => respond("bad_request", (), None, None),
//!     }
//! }
//! ```

mod clock;
mod config;
mod cors;
mod error;
mod handler;
mod method;
mod pattern;
mod rate_limit;
mod request;
mod responder;
mod response;
mod router;
mod server;
mod tls;

pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DEFAULT_MAX_BODY_SIZE, ServerOptions, TlsFiles};
pub use cors::{AllowList, Cors};
pub use error::{ConfigError, Error, TlsPart};
pub use handler::{BoundMethod, Endpoint, Handler, bind};
pub use logging::{LogCallback, LogLevel, LogOptions, LogOutput};
pub use method::{Method, UnknownMethod};
pub use pattern::PathPattern;
pub use rate_limit::RateLimiter;
pub use request::Request;
pub use responder::{Envelope, Reply, ResponseType, UnknownResponseType, respond};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{Server, TOO_MANY_REQUESTS_BODY, start, start_with_log_callback};
