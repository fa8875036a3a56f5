pub mod payments;
pub mod webhooks;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

use crate::health::{HealthChecker, HealthState, HealthStatus};
use crate::middleware::error::error_handling_middleware;
use crate::services::{PaymentGateway, WebhookIngest};

/// Shared handler state. Everything is behind an `Arc` so the router
/// clones stay cheap.
pub struct AppState {
    pub gateway: Arc<PaymentGateway>,
    pub ingest: Arc<WebhookIngest>,
    pub health_checker: HealthChecker,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .route("/collections", post(payments::create_collection))
        .route("/disbursements", post(payments::create_disbursement))
        .route(
            "/transactions/:external_ref",
            get(payments::get_transaction),
        )
        .route(
            "/transactions/:external_ref/cancel",
            post(payments::cancel_transaction),
        )
        .route(
            "/providers/:provider/balance",
            get(payments::provider_balance),
        )
        .route(
            "/providers/:provider/accountholder/:phone",
            get(payments::validate_counterparty),
        )
        .route("/webhooks/:provider", post(webhooks::receive_webhook))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(axum::middleware::from_fn(error_handling_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn root() -> &'static str {
    "Mobile money gateway API"
}

async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthStatus>, (StatusCode, String)> {
    let health_status = state.health_checker.check_health().await;

    if matches!(health_status.status, HealthState::Unhealthy) {
        error!("Health check failed, service unhealthy");
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    } else {
        Ok(Json(health_status))
    }
}

/// Readiness probe, checks all dependencies.
async fn readiness(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthStatus>, (StatusCode, String)> {
    let result = health(State(state)).await;
    if result.is_err() {
        error!("Readiness check failed");
    }
    result
}

/// Liveness probe, only confirms the process is serving.
async fn liveness() -> &'static str {
    info!("Liveness probe requested");
    "OK"
}
