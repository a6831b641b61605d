use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Datelike, Utc};
use futures::StreamExt;
use one_connexion::api::rest::router;
use one_connexion::config::BusinessRules;
use one_connexion::engine::notifier::run_notification_worker;
use one_connexion::models::change::{ChangeKind, Table};
use one_connexion::models::notification::Notification;
use one_connexion::state::AppState;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

const ADMIN: Uuid = Uuid::from_u128(0xad);

struct TestApp {
    state: Arc<AppState>,
    app: Router,
    notification_rx: Option<mpsc::Receiver<Notification>>,
}

fn setup() -> TestApp {
    let (state, notification_rx) = AppState::new(BusinessRules::default(), 1024, 1024);
    let state = Arc::new(state);
    TestApp {
        app: router(state.clone()),
        state,
        notification_rx: Some(notification_rx),
    }
}

fn request(method: &str, uri: &str, actor: Option<(&str, Uuid)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((role, id)) = actor {
        builder = builder
            .header("x-actor-role", role)
            .header("x-actor-id", id.to_string());
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

impl TestApp {
    async fn call(
        &self,
        method: &str,
        uri: &str,
        actor: Option<(&str, Uuid)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(request(method, uri, actor, body))
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call(method, uri, Some(("admin", ADMIN)), body).await
    }

    async fn create_client(&self, email: &str) -> Uuid {
        let (status, body) = self
            .admin(
                "POST",
                "/clients",
                Some(json!({
                    "company_name": "Acme Logistics",
                    "email": email,
                    "billing": { "city": "Paris" }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        id_of(&body)
    }

    async fn create_online_driver(&self, email: &str) -> Uuid {
        let (status, body) = self
            .admin(
                "POST",
                "/drivers",
                Some(json!({
                    "first_name": "Karim",
                    "last_name": "Benali",
                    "email": email,
                    "phone": "0612345678"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let driver_id = id_of(&body);

        let (status, _) = self
            .call(
                "PATCH",
                &format!("/drivers/{driver_id}/status"),
                Some(("driver", driver_id)),
                Some(json!({ "status": "online" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        driver_id
    }

    async fn create_order(&self, client_id: Uuid, scheduled: Option<String>) -> Value {
        let (status, body) = self
            .call(
                "POST",
                "/orders",
                Some(("client", client_id)),
                Some(json!({
                    "pickup": {
                        "street": "10 rue de Rivoli",
                        "city": "Paris",
                        "location": { "lat": 48.8556, "lng": 2.3601 }
                    },
                    "delivery": { "street": "2 place Saint-Jean", "city": "Melun" },
                    "formula": "normal",
                    "distance_meters": 45000.0,
                    "scheduled_pickup_at": scheduled
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }

    /// Creates an order and moves it to `accepted`, ready for dispatch.
    async fn accepted_order(&self, client_id: Uuid) -> Uuid {
        let order_id = id_of(&self.create_order(client_id, None).await);
        let (status, body) = self
            .admin("POST", &format!("/orders/{order_id}/accept"), None)
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "accepted");
        order_id
    }

    async fn dispatch(&self, order_id: Uuid, driver_id: Uuid) -> (StatusCode, Value) {
        self.admin(
            "POST",
            &format!("/orders/{order_id}/dispatch"),
            Some(json!({ "driver_id": driver_id })),
        )
        .await
    }

    async fn driver_action(&self, order_id: Uuid, driver_id: Uuid, action: &str) -> (StatusCode, Value) {
        self.call(
            "POST",
            &format!("/orders/{order_id}/{action}"),
            Some(("driver", driver_id)),
            None,
        )
        .await
    }

    async fn driver_status(&self, driver_id: Uuid) -> String {
        let (_, body) = self.admin("GET", &format!("/drivers/{driver_id}"), None).await;
        body["status"].as_str().unwrap().to_string()
    }
}

fn id_of(body: &Value) -> Uuid {
    Uuid::parse_str(body["id"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let t = setup();
    let response = t.app.clone().oneshot(request("GET", "/health", None, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["orders"], 0);
    assert_eq!(body["drivers"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let t = setup();
    let response = t.app.clone().oneshot(request("GET", "/metrics", None, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("notifications_in_queue"));
    assert!(body.contains("invoices_marked_overdue_total"));
}

#[tokio::test]
async fn missing_or_malformed_actor_is_unauthorized() {
    let t = setup();

    let (status, body) = t.call("GET", "/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("x-actor-role"));

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/orders")
                .header("x-actor-role", "admin")
                .header("x-actor-id", "not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = t.call("GET", "/orders", Some(("root", ADMIN)), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_role_is_forbidden() {
    let t = setup();
    let driver = Uuid::new_v4();

    let (status, _) = t
        .call(
            "POST",
            "/clients",
            Some(("driver", driver)),
            Some(json!({ "company_name": "X", "email": "x@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_payload_is_rejected() {
    let t = setup();
    let (status, body) = t
        .admin(
            "POST",
            "/clients",
            Some(json!({ "company_name": "", "email": "not-an-email" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn client_creation_generates_internal_code_and_rejects_duplicates() {
    let t = setup();
    let (status, body) = t
        .admin(
            "POST",
            "/clients",
            Some(json!({ "company_name": "Acme", "email": "Contact@Acme.fr" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["internal_code"].as_str().unwrap().starts_with("CL-"));
    assert_eq!(body["email"], "contact@acme.fr");
    assert_eq!(body["status"], "active");

    let (status, _) = t
        .admin(
            "POST",
            "/clients",
            Some(json!({ "company_name": "Acme bis", "email": "contact@acme.fr" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn order_price_comes_from_tariff_table() {
    let t = setup();
    let client_id = t.create_client("billing@acme.fr").await;

    let order = t.create_order(client_id, None).await;

    assert_eq!(order["status"], "pending_acceptance");
    assert_eq!(order["price"], 132.0);
    assert_eq!(order["refusal_count"], 0);
    assert!(order["reference"].as_str().unwrap().starts_with("CMD-"));
}

#[tokio::test]
async fn suspended_client_cannot_order() {
    let t = setup();
    let client_id = t.create_client("late@acme.fr").await;

    let (status, body) = t
        .admin(
            "POST",
            &format!("/clients/{client_id}/suspend"),
            Some(json!({ "reason": "unpaid invoices" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "suspended");

    let (status, _) = t
        .call(
            "POST",
            "/orders",
            Some(("client", client_id)),
            Some(json!({
                "pickup": { "street": "1 rue A", "city": "Paris" },
                "delivery": { "street": "2 rue B", "city": "Melun" },
                "formula": "express"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn suspended_client_cannot_duplicate() {
    let t = setup();
    let client_id = t.create_client("again@acme.fr").await;
    let original = t.create_order(client_id, None).await;

    let (status, _) = t
        .admin("POST", &format!("/clients/{client_id}/suspend"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t
        .call(
            "POST",
            &format!("/orders/{}/duplicate", original["id"].as_str().unwrap()),
            Some(("client", client_id)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(t.state.orders.len(), 1);
}

#[tokio::test]
async fn full_delivery_flow() {
    let t = setup();
    let client_id = t.create_client("flow@acme.fr").await;
    let driver_id = t.create_online_driver("karim@drivers.fr").await;
    let order_id = t.accepted_order(client_id).await;

    let (status, candidates) = t
        .admin("GET", &format!("/orders/{order_id}/candidates"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(candidates[0]["driver"]["id"], driver_id.to_string());

    let (status, order) = t.dispatch(order_id, driver_id).await;
    assert_eq!(status, StatusCode::OK, "{order}");
    assert_eq!(order["status"], "dispatched");
    assert_eq!(order["driver_id"], driver_id.to_string());
    assert!(order["dispatched_at"].is_string());
    assert_eq!(t.driver_status(driver_id).await, "busy");

    let (status, order) = t.driver_action(order_id, driver_id, "driver-accept").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "driver_accepted");

    let (status, order) = t.driver_action(order_id, driver_id, "start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "in_progress");

    let (_, active) = t
        .call("GET", &format!("/drivers/{driver_id}/orders"), Some(("driver", driver_id)), None)
        .await;
    assert_eq!(active.as_array().unwrap().len(), 1);

    let (status, order) = t.driver_action(order_id, driver_id, "complete").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "delivered");
    assert!(order["delivered_at"].is_string());

    let (_, driver) = t.admin("GET", &format!("/drivers/{driver_id}"), None).await;
    assert_eq!(driver["status"], "online");
    assert_eq!(driver["total_deliveries"], 1);

    let (_, events) = t
        .call("GET", &format!("/orders/{order_id}/events"), Some(("client", client_id)), None)
        .await;
    let types: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(
        types,
        vec!["created", "accepted", "dispatched", "driver_accepted", "in_progress", "delivered"]
    );
}

#[tokio::test]
async fn decline_returns_order_to_dispatch_pile() {
    let t = setup();
    let client_id = t.create_client("decline@acme.fr").await;
    let driver_id = t.create_online_driver("nadia@drivers.fr").await;
    let order_id = t.accepted_order(client_id).await;

    t.dispatch(order_id, driver_id).await;
    let (status, order) = t
        .call(
            "POST",
            &format!("/orders/{order_id}/driver-decline"),
            Some(("driver", driver_id)),
            Some(json!({ "reason": "flat tyre" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{order}");
    assert_eq!(order["status"], "driver_refused");
    assert_eq!(order["refusal_count"], 1);
    assert!(order["driver_id"].is_null());
    assert!(order["dispatched_at"].is_null());
    assert_eq!(order["last_refused_by"], "Karim Benali");
    assert_eq!(t.driver_status(driver_id).await, "online");

    let (_, refusals) = t
        .admin("GET", &format!("/orders/{order_id}/refusals"), None)
        .await;
    assert_eq!(refusals["refusal_count"], 1);
    assert_eq!(refusals["refused_by"][0]["driver_id"], driver_id.to_string());

    let (status, order) = t.dispatch(order_id, driver_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "dispatched");
    assert_eq!(order["refusal_count"], 1);
}

#[tokio::test]
async fn other_driver_cannot_act_on_order() {
    let t = setup();
    let client_id = t.create_client("other@acme.fr").await;
    let assigned = t.create_online_driver("a@drivers.fr").await;
    let intruder = t.create_online_driver("b@drivers.fr").await;
    let order_id = t.accepted_order(client_id).await;
    t.dispatch(order_id, assigned).await;

    let (status, _) = t.driver_action(order_id, intruder, "driver-accept").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.driver_action(order_id, intruder, "driver-decline").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn dispatch_preconditions() {
    let t = setup();
    let client_id = t.create_client("pre@acme.fr").await;
    let driver_id = t.create_online_driver("pre@drivers.fr").await;

    let pending = id_of(&t.create_order(client_id, None).await);
    let (status, _) = t.dispatch(pending, driver_id).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let scheduled = (Utc::now() + chrono::Duration::hours(3)).to_rfc3339();
    let later = id_of(&t.create_order(client_id, Some(scheduled)).await);
    t.admin("POST", &format!("/orders/{later}/accept"), None).await;
    let (status, body) = t.dispatch(later, driver_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("unlocks"));

    let ready = t.accepted_order(client_id).await;
    let (status, _) = t.dispatch(ready, Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .admin(
            "PATCH",
            &format!("/drivers/{driver_id}/status"),
            Some(json!({ "status": "suspended" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t.dispatch(ready, driver_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn normal_formula_needs_one_hour_notice() {
    let t = setup();
    let client_id = t.create_client("rush@acme.fr").await;
    let soon = (Utc::now() + chrono::Duration::minutes(20)).to_rfc3339();

    let (status, _) = t
        .call(
            "POST",
            "/orders",
            Some(("client", client_id)),
            Some(json!({
                "pickup": { "street": "1 rue A", "city": "Paris" },
                "delivery": { "street": "2 rue B", "city": "Melun" },
                "formula": "normal",
                "scheduled_pickup_at": soon
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unassign_releases_driver() {
    let t = setup();
    let client_id = t.create_client("unassign@acme.fr").await;
    let driver_id = t.create_online_driver("u@drivers.fr").await;
    let order_id = t.accepted_order(client_id).await;
    t.dispatch(order_id, driver_id).await;

    let (status, order) = t
        .admin(
            "POST",
            &format!("/orders/{order_id}/unassign"),
            Some(json!({ "reason": "client asked for a van" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "accepted");
    assert!(order["driver_id"].is_null());
    assert_eq!(t.driver_status(driver_id).await, "online");

    let (status, _) = t
        .admin("POST", &format!("/orders/{order_id}/unassign"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancellation_fee_applies_once_dispatched() {
    let t = setup();
    let client_id = t.create_client("cancel@acme.fr").await;
    let driver_id = t.create_online_driver("c@drivers.fr").await;

    let early = id_of(&t.create_order(client_id, None).await);
    let (status, order) = t
        .call(
            "POST",
            &format!("/orders/{early}/cancel"),
            Some(("client", client_id)),
            Some(json!({ "reason": "changed my mind" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "cancelled");
    assert_eq!(order["cancellation_fee"], 0.0);

    let late = t.accepted_order(client_id).await;
    t.dispatch(late, driver_id).await;
    let (status, order) = t
        .call(
            "POST",
            &format!("/orders/{late}/cancel"),
            Some(("client", client_id)),
            Some(json!({ "reason": "too late" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["cancellation_fee"], 8.0);
    assert_eq!(t.driver_status(driver_id).await, "online");

    let (status, _) = t
        .call(
            "POST",
            &format!("/orders/{late}/cancel"),
            Some(("client", client_id)),
            Some(json!({ "reason": "again" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let stranger = Uuid::new_v4();
    let other = id_of(&t.create_order(client_id, None).await);
    let (status, _) = t
        .call(
            "POST",
            &format!("/orders/{other}/cancel"),
            Some(("client", stranger)),
            Some(json!({ "reason": "not mine" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_creates_fresh_pending_order() {
    let t = setup();
    let client_id = t.create_client("dup@acme.fr").await;
    let original = t.create_order(client_id, None).await;

    let (status, copy) = t
        .call(
            "POST",
            &format!("/orders/{}/duplicate", original["id"].as_str().unwrap()),
            Some(("client", client_id)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(copy["id"], original["id"]);
    assert_eq!(copy["status"], "pending_acceptance");
    assert_eq!(copy["price"], original["price"]);
    assert_eq!(copy["delivery"]["city"], "Melun");
}

#[tokio::test]
async fn client_only_sees_own_orders() {
    let t = setup();
    let mine = t.create_client("mine@acme.fr").await;
    let theirs = t.create_client("theirs@acme.fr").await;
    t.create_order(mine, None).await;
    let foreign = t.create_order(theirs, None).await;

    let (_, orders) = t.call("GET", "/orders", Some(("client", mine)), None).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);

    let (status, _) = t
        .call(
            "GET",
            &format!("/orders/{}", foreign["id"].as_str().unwrap()),
            Some(("client", mine)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, all) = t.admin("GET", "/orders?search=rivoli", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn monthly_invoice_generation_and_payment() {
    let t = setup();
    let client_id = t.create_client("invoice@acme.fr").await;
    let driver_id = t.create_online_driver("i@drivers.fr").await;
    let order_id = t.accepted_order(client_id).await;
    t.dispatch(order_id, driver_id).await;
    t.driver_action(order_id, driver_id, "driver-accept").await;
    t.driver_action(order_id, driver_id, "start").await;
    t.driver_action(order_id, driver_id, "complete").await;

    let now = Utc::now();
    let period = json!({ "client_id": client_id, "year": now.year(), "month": now.month() });
    let (status, invoice) = t.admin("POST", "/invoices/generate", Some(period.clone())).await;
    assert_eq!(status, StatusCode::OK, "{invoice}");
    assert_eq!(invoice["order_count"], 1);
    assert_eq!(invoice["amount_ht"], 132.0);
    assert_eq!(invoice["amount_tva"], 26.4);
    assert_eq!(invoice["amount_ttc"], 158.4);
    assert_eq!(invoice["status"], "pending");

    let (status, _) = t.admin("POST", "/invoices/generate", Some(period)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let invoice_id = invoice["id"].as_str().unwrap().to_string();
    let (status, paid) = t
        .admin("POST", &format!("/invoices/{invoice_id}/pay"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "paid");
    assert!(paid["paid_at"].is_string());

    let (status, _) = t
        .admin("POST", &format!("/invoices/{invoice_id}/pay"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let response = t
        .app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/invoices/{invoice_id}/html"),
            Some(("client", client_id)),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("158.40 EUR"));

    let (_, stats) = t
        .call("GET", &format!("/clients/{client_id}/stats"), Some(("client", client_id)), None)
        .await;
    assert_eq!(stats["delivered_orders"], 1);
    assert_eq!(stats["total_paid"], 158.4);
}

#[tokio::test]
async fn invoice_without_deliveries_is_rejected() {
    let t = setup();
    let client_id = t.create_client("empty@acme.fr").await;

    let (status, _) = t
        .admin(
            "POST",
            "/invoices/generate",
            Some(json!({ "client_id": client_id, "year": 2025, "month": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn messaging_read_rules() {
    let t = setup();
    let client_id = t.create_client("chat@acme.fr").await;

    let (status, thread) = t
        .call(
            "POST",
            "/threads",
            Some(("client", client_id)),
            Some(json!({ "subject": "Parcel damaged", "content": "The box arrived crushed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{thread}");
    let thread_id = thread["id"].as_str().unwrap().to_string();

    let (_, threads) = t.admin("GET", "/threads", None).await;
    assert_eq!(threads[0]["unread_count"], 1);

    let (_, marked) = t
        .admin("POST", &format!("/threads/{thread_id}/read"), None)
        .await;
    assert_eq!(marked["marked"], 1);

    let (_, threads) = t.admin("GET", "/threads", None).await;
    assert_eq!(threads[0]["unread_count"], 0);

    let (status, _) = t
        .admin(
            "POST",
            &format!("/threads/{thread_id}/messages"),
            Some(json!({ "content": "Sorry, we are looking into it" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, threads) = t.call("GET", "/threads", Some(("client", client_id)), None).await;
    assert_eq!(threads[0]["unread_count"], 1);

    let (status, _) = t
        .call(
            "GET",
            &format!("/threads/{thread_id}/messages"),
            Some(("client", Uuid::new_v4())),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn complaint_status_follows_thread() {
    let t = setup();
    let client_id = t.create_client("complain@acme.fr").await;

    let (status, complaint) = t
        .call(
            "POST",
            "/complaints",
            Some(("client", client_id)),
            Some(json!({ "subject": "Late delivery", "description": "Two hours late" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{complaint}");
    let thread_id = complaint["thread_id"].as_str().unwrap().to_string();

    let (status, thread) = t
        .admin(
            "PATCH",
            &format!("/threads/{thread_id}/status"),
            Some(json!({ "status": "resolved" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread["kind"], "complaint");

    let (_, complaints) = t.call("GET", "/complaints", Some(("client", client_id)), None).await;
    assert_eq!(complaints[0]["status"], "resolved");
}

#[tokio::test]
async fn complaint_writes_reach_change_feed() {
    let t = setup();
    let client_id = t.create_client("feed@acme.fr").await;
    let mut changes = t.state.changes_tx.subscribe();

    let (status, complaint) = t
        .call(
            "POST",
            "/complaints",
            Some(("client", client_id)),
            Some(json!({ "subject": "Damaged parcel", "description": "Box crushed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{complaint}");
    let complaint_id = id_of(&complaint);
    let thread_id = complaint["thread_id"].as_str().unwrap().to_string();

    let mut seen = Vec::new();
    while let Ok(change) = changes.try_recv() {
        seen.push((change.table, change.kind, change.id));
    }
    assert!(seen.contains(&(Table::Complaints, ChangeKind::Insert, Some(complaint_id))));
    assert!(seen.iter().any(|(table, _, _)| *table == Table::Threads));
    assert!(seen.iter().any(|(table, _, _)| *table == Table::Messages));

    let (status, _) = t
        .admin(
            "PATCH",
            &format!("/threads/{thread_id}/status"),
            Some(json!({ "status": "in_progress" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let mut updated = false;
    while let Ok(change) = changes.try_recv() {
        updated |= change.table == Table::Complaints
            && change.kind == ChangeKind::Update
            && change.id == Some(complaint_id);
    }
    assert!(updated);
}

#[tokio::test]
async fn event_stream_sends_filtered_changes() {
    let t = setup();
    let response = t
        .app
        .clone()
        .oneshot(request("GET", "/events?table=clients", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let mut stream = response.into_body().into_data_stream();
    let _driver = t.create_online_driver("sse@acme.fr").await;
    let client_id = t.create_client("sse@acme.fr").await;

    let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("no change received")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(text.contains("event: change"), "{text}");
    assert!(text.contains("\"table\":\"clients\""), "{text}");
    assert!(text.contains(&client_id.to_string()), "{text}");
}

#[tokio::test]
async fn pricing_quote_endpoint() {
    let t = setup();

    let (status, quote) = t
        .call(
            "POST",
            "/pricing/quote",
            None,
            Some(json!({
                "departure_city": "Versailles",
                "arrival_city": "Paris",
                "distance_meters": 18000.0,
                "formula": "express"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["total_eur"], 66.0);
    assert_eq!(quote["supplement_applied"], false);

    let (status, _) = t
        .call(
            "POST",
            "/pricing/quote",
            None,
            Some(json!({
                "departure_city": "Atlantis",
                "arrival_city": "Paris",
                "distance_meters": 1000.0,
                "formula": "express"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pricing_settings_override_defaults() {
    let t = setup();

    let (status, config) = t
        .admin("PUT", "/settings/pricing", Some(json!({ "bon_value_eur": 6.0 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["bon_value_eur"], 6.0);
    assert_eq!(config["supplement_per_km_bons"], 0.1);

    let (_, quote) = t
        .call(
            "POST",
            "/pricing/quote",
            None,
            Some(json!({
                "departure_city": "Versailles",
                "arrival_city": "Paris",
                "distance_meters": 18000.0,
                "formula": "express"
            })),
        )
        .await;
    assert_eq!(quote["total_eur"], 72.0);

    let (status, _) = t
        .call(
            "PUT",
            "/settings/pricing",
            Some(("client", Uuid::new_v4())),
            Some(json!({ "bon_value_eur": 1.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn dispatch_notifies_driver() {
    let mut t = setup();
    let rx = t.notification_rx.take().unwrap();
    tokio::spawn(run_notification_worker(t.state.clone(), rx));

    let client_id = t.create_client("notify@acme.fr").await;
    let driver_id = t.create_online_driver("n@drivers.fr").await;
    let order_id = t.accepted_order(client_id).await;
    t.dispatch(order_id, driver_id).await;

    let mut notifications = Value::Null;
    for _ in 0..50 {
        let (_, body) = t
            .call("GET", "/notifications", Some(("driver", driver_id)), None)
            .await;
        if body.as_array().is_some_and(|list| !list.is_empty()) {
            notifications = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(notifications[0]["kind"], "new_order");
    assert!(notifications[0]["message"].as_str().unwrap().starts_with("Reference: CMD-"));
}

#[tokio::test]
async fn admin_stats_count_orders_by_status() {
    let t = setup();
    let client_id = t.create_client("stats@acme.fr").await;
    t.create_online_driver("s@drivers.fr").await;
    t.create_order(client_id, None).await;
    t.accepted_order(client_id).await;

    let (status, stats) = t.admin("GET", "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["orders_total"], 2);
    assert_eq!(stats["orders_by_status"]["pending_acceptance"], 1);
    assert_eq!(stats["orders_by_status"]["accepted"], 1);
    assert_eq!(stats["drivers_online"], 1);
}

#[tokio::test]
async fn driver_documents_review() {
    let t = setup();
    let driver_id = t.create_online_driver("docs@drivers.fr").await;

    let (status, driver) = t
        .call(
            "POST",
            &format!("/drivers/{driver_id}/documents/submit"),
            Some(("driver", driver_id)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(driver["documents"]["status"], "pending");

    let (status, _) = t
        .admin(
            "POST",
            &format!("/drivers/{driver_id}/documents/reject"),
            Some(json!({ "reason": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, driver) = t
        .admin(
            "POST",
            &format!("/drivers/{driver_id}/documents/approve"),
            Some(json!({ "notes": "licence checked" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(driver["documents"]["status"], "approved");
    assert_eq!(driver["documents"]["validated_by"], ADMIN.to_string());

    let (status, _) = t
        .call(
            "POST",
            &format!("/drivers/{driver_id}/documents/submit"),
            Some(("driver", driver_id)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
