//! Order API on an in-memory store.
//!
//! Run with:
//!   cargo run --example orders
//!
//! Try:
//!   curl http://localhost:3003/api
//!   curl -X POST http://localhost:3003/api/order \
//!        -H 'content-type: application/json' \
//!        -d '{"item":"coffee","quantity":2}'
//!   curl http://localhost:3003/api/order/1
//!   curl -X DELETE http://localhost:3003/api/order/1
//!   curl http://localhost:3003/api/orders

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use routify::{LogLevel, Request, Response, Router, ServerOptions, bind, respond};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
struct Order {
    #[serde(default)]
    id: u64,
    item: String,
    quantity: u32,
}

#[derive(Default)]
struct OrderStore {
    orders: Mutex<BTreeMap<u64, Order>>,
}

impl OrderStore {
    // Bound methods return data; the router wraps it in a success envelope.
    async fn list(self: Arc<Self>, _req: Request) -> Result<Vec<Order>, String> {
        let orders = self.orders.lock().map_err(|e| e.to_string())?;
        Ok(orders.values().cloned().collect())
    }

    async fn count(self: Arc<Self>, _req: Request) -> Result<usize, String> {
        Ok(self.orders.lock().map_err(|e| e.to_string())?.len())
    }
}

#[tokio::main]
async fn main() -> Result<(), routify::Error> {
    let store = Arc::new(OrderStore::default());

    let app = Router::new()
        .allowed_origin("http://localhost:5173")
        .listing(true)
        .namespace("/api", |api| {
            let api = api
                .get("/orders", bind(Arc::clone(&store), OrderStore::list))
                .get("/orders/count", bind(Arc::clone(&store), OrderStore::count));

            let by_id = Arc::clone(&store);
            let create = Arc::clone(&store);
            let remove = Arc::clone(&store);
            api.get("/order/{id}", move |req: Request| get_order(Arc::clone(&by_id), req))
                .post("/order", move |req: Request| create_order(Arc::clone(&create), req))
                .delete("/order/{id}", move |req: Request| delete_order(Arc::clone(&remove), req))
        });

    let options = ServerOptions {
        port: 3003,
        rate_limit: 50,
        logger_level: LogLevel::Debug,
        ..ServerOptions::default()
    };
    routify::start(options, app).await
}

fn order_id(req: &Request) -> Option<u64> {
    req.param(0)?.parse().ok()
}

async fn get_order(store: Arc<OrderStore>, req: Request) -> Response {
    let Some(id) = order_id(&req) else {
        return respond("bad_request", (), Some("Order ids are numeric."), None);
    };
    let found = match store.orders.lock() {
        Ok(orders) => orders.get(&id).cloned(),
        Err(_) => return respond("error", (), None, None),
    };
    match found {
        Some(order) => respond("success", order, None, None),
        None => respond("not_found", (), Some(&format!("No order {id}.")), None),
    }
}

async fn create_order(store: Arc<OrderStore>, req: Request) -> Response {
    let mut order: Order = match req.json_as() {
        Ok(order) => order,
        Err(e) => return respond("validation_error", (), Some(&e.to_string()), None),
    };
    if order.quantity == 0 {
        return respond("validation_error", (), Some("Quantity must be positive."), None);
    }

    let Ok(mut orders) = store.orders.lock() else {
        return respond("error", (), None, None);
    };
    order.id = orders.keys().next_back().map_or(1, |last| last + 1);
    orders.insert(order.id, order.clone());
    respond("success", order, Some("Order created."), Some(201))
}

async fn delete_order(store: Arc<OrderStore>, req: Request) -> Response {
    let Some(id) = order_id(&req) else {
        return respond("bad_request", (), Some("Order ids are numeric."), None);
    };
    let removed = match store.orders.lock() {
        Ok(mut orders) => orders.remove(&id),
        Err(_) => return respond("error", (), None, None),
    };
    match removed {
        Some(_) => respond("success", (), Some("Order deleted."), None),
        None => respond("not_found", (), None, None),
    }
}
