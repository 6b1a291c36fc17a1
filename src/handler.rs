//! Handler trait and type erasure.
//!
//! # Two handler shapes
//!
//! The router stores every route's handler as an [`Endpoint`], a tagged
//! variant with one case per calling convention:
//!
//! ```text
//! async fn get_order(req: Request) -> Response { … }      ← callback
//!        ↓ router.get("/order/{uuid}", get_order)
//! Endpoint::Callback(Arc<FnHandler(get_order)>)            ← answers for itself
//!
//! bind(store, OrderStore::find)                            ← instance + method
//!        ↓ router.get("/order/{uuid}", bind(..))
//! Endpoint::Method(Arc<BoundMethod { .. }>)                ← returns data; the
//!                                                            router wraps it in
//!                                                            a success envelope
//! ```
//!
//! Callbacks produce their own [`Response`] (usually via
//! [`respond`](crate::respond)). Bound methods return `Result<T, E>` with a
//! serializable `T`; the router turns `Ok` into a `success` envelope and `Err`
//! into the `500` error envelope.
//!
//! The runtime cost per request is one `Arc` clone and one virtual call.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` lets tokio move the future across worker threads.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Dispatch interface for callbacks.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<Response>;
}

/// Dispatch interface for bound methods: the success payload, or the failure
/// message.
#[doc(hidden)]
pub trait ErasedMethod {
    fn call(&self, req: Request) -> BoxFuture<Result<Value, String>>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

#[doc(hidden)]
pub type BoxedMethod = Arc<dyn ErasedMethod + Send + Sync + 'static>;

/// What a route resolves to.
#[derive(Clone)]
pub enum Endpoint {
    /// A handler that builds its own response.
    Callback(BoxedHandler),
    /// An instance + method pair whose return value is wrapped in a success
    /// envelope.
    Method(BoxedMethod),
    /// The auto-registered listing of every route under the namespace.
    Listing(String),
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_)       => f.write_str("Callback"),
            Self::Method(_)         => f.write_str("Method"),
            Self::Listing(prefix)   => f.debug_tuple("Listing").field(prefix).finish(),
        }
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by:
///
/// - any `async fn name(req: Request) -> impl IntoResponse` (a callback);
/// - the value returned by [`bind`] (an instance + method pair).
///
/// The trait is **sealed**: only the impls in this module can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self) -> Endpoint;
}

mod private {
    pub trait Sealed {}
}

// ── Callbacks ─────────────────────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_endpoint(self) -> Endpoint {
        Endpoint::Callback(Arc::new(FnHandler(self)))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Response> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

// ── Bound methods ─────────────────────────────────────────────────────────────

/// An instance paired with one of its methods. Build with [`bind`].
pub struct BoundMethod<S, F> {
    instance: Arc<S>,
    method: F,
}

/// Pairs `instance` with `method`, e.g. `bind(store, OrderStore::find)`.
///
/// The method receives the shared instance and the request and returns
/// `Result<T, E>`. `Ok(value)` is answered with
/// `{"status":true,"message":"Request successful","data":value,..}`.
///
/// ```rust
/// use std::sync::Arc;
/// use routify::{Request, Router, bind};
///
/// struct Greeter { greeting: String }
///
/// impl Greeter {
///     async fn greet(self: Arc<Self>, req: Request) -> Result<String, String> {
///         let name = req.param(0).ok_or("no name")?;
///         Ok(format!("{}, {name}", self.greeting))
///     }
/// }
///
/// let greeter = Arc::new(Greeter { greeting: "hello".into() });
/// let router = Router::new().get("/greet/{name}", bind(greeter, Greeter::greet));
/// ```
pub fn bind<S, F>(instance: Arc<S>, method: F) -> BoundMethod<S, F> {
    BoundMethod { instance, method }
}

impl<S, F, Fut, T, E> private::Sealed for BoundMethod<S, F>
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Serialize + Send + 'static,
    E: fmt::Display + Send + 'static,
{
}

impl<S, F, Fut, T, E> Handler for BoundMethod<S, F>
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Serialize + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    fn into_endpoint(self) -> Endpoint {
        Endpoint::Method(Arc::new(self))
    }
}

impl<S, F, Fut, T, E> ErasedMethod for BoundMethod<S, F>
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Serialize + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Result<Value, String>> {
        let fut = (self.method)(Arc::clone(&self.instance), req);
        Box::pin(async move {
            let value = fut.await.map_err(|e| e.to_string())?;
            serde_json::to_value(value).map_err(|e| format!("response data is not serializable: {e}"))
        })
    }
}
