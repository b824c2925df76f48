//! Shared fixtures for the route tests.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use boxoffice_core::{
    Cart, CartLine, Guest, GuestCheckIn, GuestList, Money, Operator, OperatorRole, PaymentMethod,
    Product, VatRate,
};
use boxoffice_db::{Database, DbConfig};
use boxoffice_settlement::MockGateway;

use crate::config::AppConfig;
use crate::{router, AppState};

pub(crate) const ORIGIN: &str = "https://boxoffice.test";
pub(crate) const WEBHOOK_SECRET: &str = "hook-secret";

/// A wired application over an in-memory database and a mock gateway.
pub(crate) struct TestApp {
    pub(crate) state: AppState,
    pub(crate) gateway: Arc<MockGateway>,
    pub(crate) product: Product,
    pub(crate) guests: Vec<Uuid>,
    pub(crate) operator: Operator,
    pub(crate) token: String,
    pub(crate) admin_token: String,
}

impl TestApp {
    pub(crate) async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub(crate) async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "test-secret".to_string();
        config.settlement.poll_interval_ms = 20;
        config.settlement.default_terminal_id = Some("rdr_test".to_string());
        config.gateway.webhook_secret = Some(WEBHOOK_SECRET.to_string());
        config.live.allowed_origins = vec![ORIGIN.to_string()];
        customize(&mut config);

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();

        let product = Product {
            id: Uuid::new_v4(),
            name: "Evening Ticket".to_string(),
            net_price: Money::new(dec!(40.00) / dec!(1.07)),
            vat_rate: VatRate::from_bps(700),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();

        let list = GuestList {
            id: Uuid::new_v4(),
            product_id: product.id,
            name: "Press".to_string(),
        };
        db.guests().insert_list(&list).await.unwrap();

        let mut guests = Vec::new();
        for name in ["Grace Hopper", "Alan Turing"] {
            let guest = Guest {
                id: Uuid::new_v4(),
                guest_list_id: list.id,
                product_id: product.id,
                name: name.to_string(),
                notification_address: None,
                additional_guests: 1,
                attended_guests: 0,
                arrived_at: None,
                purchase_id: None,
            };
            db.guests().insert(&guest).await.unwrap();
            guests.push(guest.id);
        }

        let gateway = Arc::new(MockGateway::new());
        let state = AppState::new(config, db, gateway.clone());

        let operator = Operator::new(Uuid::new_v4(), OperatorRole::Operator);
        let admin = Operator::new(Uuid::new_v4(), OperatorRole::Admin);
        let token = state.jwt.generate_token(&operator).unwrap();
        let admin_token = state.jwt.generate_token(&admin).unwrap();

        TestApp {
            state,
            gateway,
            product,
            guests,
            operator,
            token,
            admin_token,
        }
    }

    pub(crate) fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// A correctly priced cart of `quantity` tickets.
    pub(crate) fn cart(&self, payment_method: PaymentMethod, quantity: i64, guests: Vec<GuestCheckIn>) -> Cart {
        let unit = self.product.net_price.round_dp(2);
        let net = unit.multiply_quantity(quantity);

        Cart {
            payment_method,
            total_net_price: net,
            total_gross_price: net.with_vat(self.product.vat_rate).round_dp(2),
            lines: vec![CartLine {
                product_id: self.product.id,
                quantity,
                net_price: unit,
                guests,
            }],
            terminal_id: None,
        }
    }

    /// Sends one request through a fresh router.
    pub(crate) async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        send_request(self.router(), request).await
    }
}

pub(crate) async fn send_request(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}
