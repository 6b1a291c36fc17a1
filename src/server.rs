//! HTTP server, request pipeline and graceful shutdown.
//!
//! # Request pipeline
//!
//! ```text
//! accept ─▶ [TLS handshake] ─▶ hyper ─▶ OPTIONS? ──yes──▶ 204 preflight
//!                                          │ no
//!                                          ▼
//!                                   rate limiter ──reject──▶ 429 (raw body)
//!                                          │ admit
//!                                          ▼
//!                            Request ─▶ Router::dispatch (own task)
//!                                          │
//!                       panic / timeout ───┴──▶ 500 error envelope
//!                                          ▼
//!                          standard CORS headers ─▶ wire
//! ```
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or **SIGINT** the server stops accepting connections, lets
//! every in-flight connection task run to completion and then returns from
//! [`Server::serve`].

use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::config::ServerOptions;
use crate::cors::Cors;
use crate::error::Error;
use crate::logging::{self, LogCallback, LogOptions};
use crate::method::Method;
use crate::rate_limit::RateLimiter;
use crate::request::Request;
use crate::responder::{Reply, ResponseType};
use crate::response::{self, Response};
use crate::router::Router;
use crate::tls;

/// Body of the `429` answer. Kept outside the envelope format on purpose.
pub const TOO_MANY_REQUESTS_BODY: &str =
    r#"{"status":"error","message":"Too many requests. Please try again later."}"#;

/// The HTTP(S) server.
///
/// ```rust,no_run
/// use routify::{Router, Server, ServerOptions};
///
/// # async fn run() -> Result<(), routify::Error> {
/// let options = ServerOptions { port: 3003, rate_limit: 50, ..ServerOptions::default() };
/// Server::new(options)?.serve(Router::new()).await
/// # }
/// ```
pub struct Server {
    addr: SocketAddr,
    limiter: Arc<RateLimiter>,
    tls: Option<TlsAcceptor>,
    timeout: Option<Duration>,
    max_body: usize,
}

/// State shared by every connection task.
struct Shared {
    router: Router,
    limiter: Arc<RateLimiter>,
    timeout: Option<Duration>,
    max_body: usize,
}

impl Server {
    /// Validates `options` and prepares everything needed to listen: the
    /// rate limiter and, when configured, the TLS acceptor.
    ///
    /// Any configuration problem is returned here, before a socket is bound.
    pub fn new(options: ServerOptions) -> Result<Self, Error> {
        options.validate()?;
        let addr = options.socket_addr()?;
        let limiter = RateLimiter::new(options.rate_limit, options.time_frame)?;
        let tls = match options.tls_files()? {
            Some(files) => Some(tls::load_acceptor(&files)?),
            None => None,
        };

        Ok(Self {
            addr,
            limiter: Arc::new(limiter),
            tls,
            timeout: options.request_timeout(),
            max_body: options.max_body_size,
        })
    }

    /// The address [`Server::serve`] binds.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Binds the configured address and serves `router` until SIGTERM or
    /// Ctrl-C, then drains in-flight connections.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = match TcpListener::bind(self.addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(addr = %self.addr, "bind failed: {e}");
                return Err(e.into());
            }
        };
        self.serve_on(listener, router, shutdown_signal()).await
    }

    /// Serves `router` on an already bound `listener` until `shutdown`
    /// resolves, then drains in-flight connections.
    pub async fn serve_on<F>(self, listener: TcpListener, router: Router, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr()?;
        let scheme = if self.is_tls() { "https" } else { "http" };

        let shared = Arc::new(Shared {
            router,
            limiter: Arc::clone(&self.limiter),
            timeout: self.timeout,
            max_body: self.max_body,
        });
        let sweeper = tokio::spawn(sweep_periodically(Arc::clone(&self.limiter)));

        info!("server running at {scheme}://{local}");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let shared = Arc::clone(&shared);
                    match &self.tls {
                        Some(acceptor) => {
                            let acceptor = acceptor.clone();
                            tasks.spawn(async move {
                                match acceptor.accept(stream).await {
                                    Ok(stream) => serve_connection(stream, shared, remote_addr).await,
                                    Err(e) => debug!(peer = %remote_addr, "tls handshake failed: {e}"),
                                }
                            });
                        }
                        None => {
                            tasks.spawn(serve_connection(stream, shared, remote_addr));
                        }
                    }
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}
        sweeper.abort();

        info!("server stopped");
        Ok(())
    }
}

/// Initializes logging from `options`, then builds and runs a [`Server`].
///
/// Startup failures are logged at error level before being returned.
pub async fn start(options: ServerOptions, router: Router) -> Result<(), Error> {
    let log = options.log_options();
    launch(options, log, router).await
}

/// Like [`start`], with `callback` receiving every log line when
/// `logger_output` is `service`.
pub async fn start_with_log_callback(
    options: ServerOptions,
    router: Router,
    callback: LogCallback,
) -> Result<(), Error> {
    let log = LogOptions { callback: Some(callback), ..options.log_options() };
    launch(options, log, router).await
}

async fn launch(options: ServerOptions, log: LogOptions, router: Router) -> Result<(), Error> {
    logging::init(&log);
    info!(
        host = %options.host,
        port = options.port,
        logger_level = ?options.logger_level,
        "starting server"
    );

    let server = Server::new(options).inspect_err(|e| error!("startup failed: {e}"))?;
    server.serve(router).await
}

async fn serve_connection<I>(io: I, shared: Arc<Shared>, remote_addr: SocketAddr)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // Called once per request on the connection, not once per connection.
    let svc = service_fn(move |req| {
        let shared = Arc::clone(&shared);
        async move { handle(shared, req, remote_addr).await }
    });

    let builder = ConnBuilder::new(TokioExecutor::new());
    if let Err(e) = builder.serve_connection(TokioIo::new(io), svc).await {
        debug!(peer = %remote_addr, "connection error: {e}");
    }
}

// ── Request pipeline ──────────────────────────────────────────────────────────

/// A request as it came off the wire.
struct Inbound {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

/// The error type is [`Infallible`]: every failure becomes a response, so
/// hyper never sees an error.
async fn handle(
    shared: Arc<Shared>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();

    let body = match read_body(body, shared.max_body).await {
        Ok(body) => body,
        Err(res) => {
            debug!(peer = %remote_addr, status = res.status_code(), "request body rejected");
            return Ok(with_standard_cors(res, &shared).into_http());
        }
    };

    let inbound = Inbound {
        method: parts.method.as_str().to_owned(),
        target: parts.uri.path_and_query().map_or("/", |pq| pq.as_str()).to_owned(),
        headers: parts.headers.iter()
            .map(|(k, v)| (k.as_str().to_owned(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect(),
        body,
        remote_addr: Some(remote_addr),
    };

    debug!(
        method = %inbound.method,
        uri = %parts.uri,
        headers = ?inbound.headers,
        body = %String::from_utf8_lossy(&inbound.body),
        "incoming request"
    );

    let response = process(&shared, inbound).await;

    debug!(
        status = response.status_code(),
        body = %String::from_utf8_lossy(response.body()),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "response sent"
    );
    Ok(response.into_http())
}

/// Buffers a request body of at most `limit` bytes.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, Response>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => {
            Err(Reply::new(ResponseType::BadRequest).message("Request body too large.").finish())
        }
        Err(e) => {
            debug!("failed to read request body: {e}");
            Err(Reply::new(ResponseType::BadRequest).message("Unreadable request body.").finish())
        }
    }
}

async fn process(shared: &Arc<Shared>, inbound: Inbound) -> Response {
    let client = inbound.remote_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned());
    let method = inbound.method.parse::<Method>();

    let response = if matches!(method, Ok(Method::Options)) {
        shared.router.preflight()
    } else if !shared.limiter.is_allowed(&client) {
        info!(%client, "rate limit exceeded");
        Response::builder().status(429).json(TOO_MANY_REQUESTS_BODY.as_bytes().to_vec())
    } else {
        match method {
            Ok(method) => {
                let mut req = Request::new(method, &inbound.target)
                    .with_body(inbound.body.to_vec())
                    .with_remote_addr(inbound.remote_addr)
                    .with_allowed_origin(shared.router.default_origin().cloned());
                req.headers = inbound.headers;
                dispatch_guarded(shared, req).await
            }
            Err(e) => {
                debug!("{e}");
                Reply::new(ResponseType::MethodNotAllowed).message("Method Not Allowed.").finish()
            }
        }
    };

    if let Some(reason) = response.failure() {
        error!(%client, method = %inbound.method, target = %inbound.target, "handler failed: {reason}");
    }
    with_standard_cors(response, shared)
}

/// Runs the dispatch in its own task so a panicking handler costs one `500`
/// rather than the connection, and enforces the optional time limit.
async fn dispatch_guarded(shared: &Arc<Shared>, req: Request) -> Response {
    let task_state = Arc::clone(shared);
    let mut task = tokio::spawn(async move { task_state.router.dispatch(req).await });

    let joined = match shared.timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                task.abort();
                warn!(limit_ms = limit.as_millis() as u64, "request timed out");
                return Reply::new(ResponseType::Error).message("Request timed out.").finish();
            }
        },
        None => task.await,
    };

    match joined {
        Ok(response) => response,
        Err(e) if e.is_panic() => response::failed(panic_message(e.into_panic())),
        Err(e) => response::failed(e.to_string()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_owned(),
            Err(_) => "handler panicked".to_owned(),
        },
    }
}

/// Adds the server-wide CORS headers the handler did not set itself.
fn with_standard_cors(mut response: Response, shared: &Shared) -> Response {
    let origin = shared.router.default_origin().map(|o| &**o);
    for (name, value) in Cors::preflight(origin).header_pairs(None) {
        response.default_header(name, &value);
    }
    response
}

/// Keeps the rate-limit ledger from holding clients that went quiet.
async fn sweep_periodically(limiter: Arc<RateLimiter>) {
    let mut ticks = tokio::time::interval(limiter.window());
    ticks.tick().await;
    loop {
        ticks.tick().await;
        let removed = limiter.sweep();
        if removed > 0 {
            debug!(removed, remaining = limiter.tracked_clients(), "swept idle rate-limit entries");
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives: SIGTERM or
/// SIGINT on Unix, Ctrl-C elsewhere.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
