use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::api::AppState;
use crate::database::payment_request_repository::PaymentRequestRow;
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::providers::{Direction, ProviderName};
use crate::tracker::CreateRequest;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentBody {
    pub provider: String,
    pub amount: String,
    pub currency: String,
    pub phone: String,
    pub external_ref: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub external_ref: String,
    pub provider: String,
    pub direction: String,
    pub amount: String,
    pub currency: String,
    pub phone: String,
    pub status: String,
    pub provider_ref: Option<String>,
    pub financial_txn_id: Option<String>,
    pub failure_reason: Option<String>,
    pub attempt_count: i32,
    pub needs_review: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl PaymentResponse {
    fn from_row(row: PaymentRequestRow) -> Self {
        Self {
            external_ref: row.external_ref,
            provider: row.provider,
            direction: row.direction,
            amount: row.amount.to_string(),
            currency: row.currency,
            phone: row.phone,
            status: row.status,
            provider_ref: row.provider_ref,
            financial_txn_id: row.financial_txn_id,
            failure_reason: row.failure_reason,
            attempt_count: row.attempt_count,
            needs_review: row.needs_review,
            created_at: row.created_at.to_rfc3339(),
            updated_at: row.updated_at.to_rfc3339(),
        }
    }
}

fn parse_provider(provider: &str) -> Result<ProviderName, AppError> {
    ProviderName::from_str(provider).map_err(|_| {
        AppError::new(AppErrorKind::Validation(ValidationError::UnknownProvider {
            provider: provider.to_string(),
        }))
    })
}

async fn create_payment(
    state: Arc<AppState>,
    direction: Direction,
    body: CreatePaymentBody,
) -> Result<impl IntoResponse, AppError> {
    let provider = parse_provider(&body.provider)?;

    info!(
        provider = %provider,
        direction = %direction,
        amount = %body.amount,
        "payment request received"
    );

    let row = state
        .gateway
        .create_and_submit(CreateRequest {
            provider,
            direction,
            amount: body.amount,
            currency: body.currency,
            phone: body.phone,
            external_ref: body.external_ref,
            note: body.note,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PaymentResponse::from_row(row)),
    ))
}

/// POST /collections
pub async fn create_collection(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePaymentBody>,
) -> Result<impl IntoResponse, AppError> {
    create_payment(state, Direction::Collection, body).await
}

/// POST /disbursements
pub async fn create_disbursement(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePaymentBody>,
) -> Result<impl IntoResponse, AppError> {
    create_payment(state, Direction::Disbursement, body).await
}

/// GET /transactions/:external_ref
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(external_ref): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let row = state.gateway.status(&external_ref).await?;
    Ok(Json(PaymentResponse::from_row(row)))
}

/// POST /transactions/:external_ref/cancel
pub async fn cancel_transaction(
    State(state): State<Arc<AppState>>,
    Path(external_ref): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let row = state.gateway.cancel(&external_ref).await?;
    Ok(Json(PaymentResponse::from_row(row)))
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub provider: String,
    pub amount: String,
    pub currency: String,
}

/// GET /providers/:provider/balance
pub async fn provider_balance(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let name = parse_provider(&provider)?;
    let balance = state.gateway.provider_balance(name).await?;
    Ok(Json(BalanceResponse {
        provider: name.to_string(),
        amount: balance.amount,
        currency: balance.currency,
    }))
}

#[derive(Debug, Serialize)]
pub struct CounterpartyResponse {
    pub provider: String,
    pub phone: String,
    pub active: bool,
}

/// GET /providers/:provider/accountholder/:phone
pub async fn validate_counterparty(
    State(state): State<Arc<AppState>>,
    Path((provider, phone)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let name = parse_provider(&provider)?;
    let active = state.gateway.validate_counterparty(name, &phone).await?;
    Ok(Json(CounterpartyResponse {
        provider: name.to_string(),
        phone,
        active,
    }))
}
