//! # Box Office Back Office API
//!
//! REST and WebSocket surface of the settlement pipeline.
//!
//! ## Routes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET    /health                   liveness                              │
//! │  POST   /purchases                checkout a cart                       │
//! │  GET    /purchases/{id}           read a purchase                       │
//! │  DELETE /purchases/{id}           delete, releasing its guests          │
//! │  POST   /purchases/{id}/refund    refund a confirmed purchase           │
//! │  GET    /purchases/{id}/live      WebSocket status channel              │
//! │  POST   /gateway/events           charge status pushed by the gateway   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use boxoffice_db::Database;
use boxoffice_settlement::{
    CheckoutCoordinator, InMemoryLoopRegistry, LiveChannel, PaymentGateway, PurchaseService,
    Reconciler, StatusPublisher, TracingNotifier,
};

use crate::auth::JwtManager;
use crate::config::AppConfig;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: PurchaseService,
    pub checkout: CheckoutCoordinator,
    pub reconciler: Reconciler,
    pub live: LiveChannel,
    pub jwt: Arc<JwtManager>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wires the settlement pipeline together.
    pub fn new(config: AppConfig, db: Database, gateway: Arc<dyn PaymentGateway>) -> Self {
        let service = PurchaseService::new(
            db,
            StatusPublisher::new(),
            Arc::new(TracingNotifier),
            config.settlement.to_options(),
        );
        let reconciler = Reconciler::new(
            service.clone(),
            Arc::clone(&gateway),
            Arc::new(InMemoryLoopRegistry::new()),
        );
        let checkout = CheckoutCoordinator::new(service.clone(), Arc::clone(&gateway), reconciler.clone());
        let live = LiveChannel::new(service.clone(), gateway);
        let jwt = JwtManager::new(config.auth.jwt_secret.clone(), config.auth.token_lifetime_secs);

        AppState {
            service,
            checkout,
            reconciler,
            live,
            jwt: Arc::new(jwt),
            config: Arc::new(config),
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/purchases", post(routes::purchases::create))
        .route(
            "/purchases/{id}",
            get(routes::purchases::get).delete(routes::purchases::delete),
        )
        .route("/purchases/{id}/refund", post(routes::purchases::refund))
        .route("/purchases/{id}/live", get(routes::live::live))
        .route("/gateway/events", post(routes::gateway::event))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing;
