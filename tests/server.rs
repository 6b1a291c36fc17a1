//! End-to-end tests over real TCP connections.

use std::net::SocketAddr;
use std::sync::Arc;

use routify::{
    ConfigError, Error, Request, Response, Router, Server, ServerOptions, TOO_MANY_REQUESTS_BODY, bind, respond,
};
use serde_json::json;

mod common;

use common::TestServer;

const ORIGIN: &str = "http://localhost:5173";

async fn get_order(req: Request) -> Response {
    respond("success", json!({ "uuid": req.param(0) }), None, None)
}

async fn create_order(req: Request) -> Response {
    match req.json() {
        Some(order) => respond("success", order, Some("Order stored."), Some(201)),
        None => respond("bad_request", (), Some("Body must be JSON."), None),
    }
}

async fn explode(_: Request) -> Response {
    panic!("handler bug")
}

fn api() -> Router {
    Router::new()
        .allowed_origin(ORIGIN)
        .listing(true)
        .namespace("/api", |api| {
            api.get("/order/{uuid}", get_order)
                .post("/order", create_order)
                .get("/explode", explode)
        })
}

fn options(rate_limit: u32) -> ServerOptions {
    ServerOptions { rate_limit, ..ServerOptions::default() }
}

#[tokio::test]
async fn serves_envelopes_end_to_end() {
    let server = TestServer::start(api(), options(100)).await;

    let res = server.send("GET", "/api/order/abc-123", None).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(
        res.json(),
        json!({
            "status": true,
            "message": "Operation completed successfully",
            "data": { "uuid": "abc-123" },
            "error": [],
        }),
    );

    let res = server.send("POST", "/api/order", Some(r#"{"item":"tea"}"#)).await;
    assert_eq!(res.status, 201);
    assert_eq!(res.json()["message"], "Order stored.");
    assert_eq!(res.json()["data"], json!({ "item": "tea" }));

    let res = server.send("GET", "/api", None).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.json()["message"], "Available routes under the namespace '/api':");
    let get_routes = res.json()["data"]["GET"].clone();
    assert!(get_routes.as_array().unwrap().contains(&json!("/api/order/{uuid}")));
    assert_eq!(res.json()["data"]["POST"], json!(["/api/order"]));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn unmatched_requests_get_404_or_405() {
    let server = TestServer::start(api(), options(100)).await;

    let res = server.send("GET", "/nope", None).await;
    assert_eq!(res.status, 404);
    assert_eq!(res.json()["message"], "Route not found.");
    assert_eq!(res.json()["status"], false);

    let res = server.send("GET", "/api/order/has%20a%20space", None).await;
    assert_eq!(res.status, 404);

    let res = server.send("POST", "/api/order/abc", None).await;
    assert_eq!(res.status, 405);

    let res = server.send("DELETE", "/api/order/abc", None).await;
    assert_eq!(res.status, 405);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn rate_limited_client_gets_raw_429() {
    let server = TestServer::start(api(), options(3)).await;

    for _ in 0..3 {
        let res = server.send("GET", "/api/order/1", None).await;
        assert_eq!(res.status, 200);
    }

    let res = server.send("GET", "/api/order/1", None).await;
    assert_eq!(res.status, 429);
    assert_eq!(res.text(), TOO_MANY_REQUESTS_BODY);
    assert_eq!(res.header("access-control-allow-origin"), Some(ORIGIN));

    // Preflights are answered even when the client is over its limit.
    let res = server.send("OPTIONS", "/api/order/1", None).await;
    assert_eq!(res.status, 204);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn preflight_is_answered_for_any_path() {
    let server = TestServer::start(api(), options(1)).await;

    for path in ["/api/order/1", "/not/registered", "/"] {
        let res = server.send("OPTIONS", path, None).await;
        assert_eq!(res.status, 204);
        assert!(res.body.is_empty());
        assert_eq!(res.header("access-control-allow-origin"), Some(ORIGIN));
        assert_eq!(res.header("access-control-allow-methods"), Some("GET, POST, PUT, DELETE, OPTIONS"));
        assert_eq!(res.header("access-control-allow-headers"), Some("Content-Type, Authorization"));
        assert_eq!(res.header("access-control-allow-credentials"), Some("true"));
    }

    // None of the preflights used up the single admitted request.
    let res = server.send("GET", "/api/order/1", None).await;
    assert_eq!(res.status, 200);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn every_response_carries_cors_headers() {
    let server = TestServer::start(api(), options(100)).await;

    for (method, path, status) in [("GET", "/api/order/1", 200), ("GET", "/missing", 404), ("PUT", "/api", 405)] {
        let res = server.send(method, path, None).await;
        assert_eq!(res.status, status);
        assert_eq!(res.header("access-control-allow-origin"), Some(ORIGIN));
        assert_eq!(res.header("access-control-allow-credentials"), Some("true"));
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn panicking_handler_does_not_take_the_server_down() {
    let server = TestServer::start(api(), options(100)).await;

    let res = server.send("GET", "/api/explode", None).await;
    assert_eq!(res.status, 500);
    assert_eq!(res.json()["status"], false);
    assert_eq!(res.json()["message"], "An error occurred");
    assert!(!res.text().contains("handler bug"));

    let res = server.send("GET", "/api/order/still-up", None).await;
    assert_eq!(res.status, 200);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn bound_method_results_are_wrapped() {
    struct Inventory {
        items: Vec<&'static str>,
    }

    impl Inventory {
        async fn all(self: Arc<Self>, _req: Request) -> Result<Vec<&'static str>, String> {
            Ok(self.items.clone())
        }

        async fn fail(self: Arc<Self>, _req: Request) -> Result<(), String> {
            Err("inventory offline".to_owned())
        }
    }

    let inventory = Arc::new(Inventory { items: vec!["tea", "coffee"] });
    let router = Router::new()
        .get("/items", bind(Arc::clone(&inventory), Inventory::all))
        .get("/broken", bind(inventory, Inventory::fail));
    let server = TestServer::start(router, options(100)).await;

    let res = server.send("GET", "/items", None).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.json()["message"], "Request successful");
    assert_eq!(res.json()["data"], json!(["tea", "coffee"]));

    let res = server.send("GET", "/broken", None).await;
    assert_eq!(res.status, 500);
    assert_eq!(res.json()["message"], "An error occurred");
    assert!(!res.text().contains("inventory offline"));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn shutdown_drains_and_returns() {
    let server = TestServer::start(api(), options(100)).await;
    let addr = server.addr;

    let res = server.send("GET", "/api/order/1", None).await;
    assert_eq!(res.status, 200);
    server.stop().await.unwrap();

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn answers_over_tls() {
    let pair = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (cert_path, key_path) = (dir.path().join("cert.pem"), dir.path().join("key.pem"));
    std::fs::write(&cert_path, pair.cert.pem()).unwrap();
    std::fs::write(&key_path, pair.key_pair.serialize_pem()).unwrap();

    let options = ServerOptions {
        port: 8443,
        ssl_cert_file: Some(cert_path),
        ssl_key_file: Some(key_path),
        ..options(100)
    };
    let server = Server::new(options).unwrap();
    assert!(server.is_tls());
    assert_eq!(server.addr(), "127.0.0.1:8443".parse::<SocketAddr>().unwrap());

    let server = TestServer::with_server(server, api()).await;

    let (res, alpn) = common::send_tls(server.addr, &pair.cert, "GET", "/api/order/secure").await;
    assert_eq!(alpn.as_deref(), Some(&b"http/1.1"[..]));
    assert_eq!(res.status, 200);
    assert_eq!(res.json()["data"], json!({ "uuid": "secure" }));
    assert_eq!(res.header("access-control-allow-origin"), Some(ORIGIN));

    server.stop().await.unwrap();
}

#[test]
fn plain_server_reports_its_address() {
    let server = Server::new(ServerOptions { port: 3003, ..options(100) }).unwrap();
    assert!(!server.is_tls());
    assert_eq!(server.addr(), "127.0.0.1:3003".parse::<SocketAddr>().unwrap());
}

#[test]
fn half_configured_tls_refuses_to_start() {
    let options = ServerOptions {
        ssl_cert_file: Some("/etc/routify/cert.pem".into()),
        ..ServerOptions::default()
    };
    assert!(matches!(
        Server::new(options),
        Err(Error::Config(ConfigError::PartialTls(_))),
    ));
}
