//! HTTP boundary: order submission, charge issuance, status reads for the
//! client poller, and the PSP webhook ingress.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::application::confirmation::{ConfirmationEngine, Disposition};
use crate::application::issuer::ChargeIssuer;
use crate::domain::order::{Amount, Order, OrderId, OrderStatus, PaymentMethod};
use crate::domain::ports::{ChargeProvider, ChargeProviderArc, OrderStore, OrderStoreArc};
use crate::domain::psp::Presentation;
use crate::error::PaymentError;

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderStoreArc,
    pub issuer: Arc<ChargeIssuer>,
    pub confirmations: Arc<ConfirmationEngine>,
    pub providers: HashMap<PaymentMethod, ChargeProviderArc>,
}

pub fn provider_map(
    providers: impl IntoIterator<Item = ChargeProviderArc>,
) -> HashMap<PaymentMethod, ChargeProviderArc> {
    providers.into_iter().map(|p| (p.method(), p)).collect()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/charge", post(issue_charge))
        .route("/webhooks/{provider}", post(ingest_webhook))
        .with_state(state)
}

/// Error envelope for the API. Transient provider failures are flagged
/// retryable so the client can show a retry button; state-machine conflicts
/// stay operator-facing.
pub struct ApiError(PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PaymentError::InvalidAmount(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            PaymentError::OrderNotFound(_)
            | PaymentError::UnknownCharge(_)
            | PaymentError::CouponNotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::IllegalTransition { .. }
            | PaymentError::ConflictingConfirmation { .. } => StatusCode::CONFLICT,
            PaymentError::ProviderUnavailable(_) | PaymentError::ProviderRejected(_) => {
                StatusCode::BAD_GATEWAY
            }
            PaymentError::Io(_) | PaymentError::Serde(_) | PaymentError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!(err = %self.0, "request failed");
        }
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "retryable": self.0.is_retryable(),
        }));
        (status, body).into_response()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub amount: Decimal,
    pub description: String,
    pub coupon: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: OrderId,
}

/// Order submission shim for the form collaborator. Validation beyond
/// "amount > 0" happens upstream.
async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    let amount = Amount::new(payload.amount)?;
    let order = Order::new(amount, payload.description, payload.coupon, Utc::now());
    let order_id = order.id;
    state.orders.insert(order).await?;
    Ok((StatusCode::CREATED, Json(CreateOrderResponse { order_id })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderStatusResponse {
    fn from(order: &Order) -> Self {
        Self {
            status: order.status,
            transaction_ref: order.transaction_ref.as_ref().map(|t| t.to_string()),
            paid_at: order.paid_at,
            expires_at: order.expires_at(),
        }
    }
}

/// Read-only status projection, polled by the client. No side effects.
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order = state
        .orders
        .get(OrderId::from(id))
        .await?
        .ok_or(PaymentError::OrderNotFound(id))?;
    Ok(Json(OrderStatusResponse::from(&order)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueChargeRequest {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub description: String,
    pub discount: Option<Decimal>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueChargeResponse {
    pub charge_ref: String,
    pub expires_at: DateTime<Utc>,
    pub presentation: Presentation,
}

async fn issue_charge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<IssueChargeRequest>,
) -> Result<Json<IssueChargeResponse>, ApiError> {
    let issued = state
        .issuer
        .issue(
            OrderId::from(id),
            payload.amount,
            payload.method,
            &payload.description,
            payload.discount,
        )
        .await?;
    Ok(Json(IssueChargeResponse {
        charge_ref: issued.charge_ref.to_string(),
        expires_at: issued.expires_at,
        presentation: issued.presentation,
    }))
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub results: Vec<&'static str>,
}

fn disposition_label(disposition: Disposition) -> &'static str {
    match disposition {
        Disposition::Applied => "applied",
        Disposition::Duplicate => "duplicate",
        Disposition::FailureRecorded => "failure_recorded",
        Disposition::Ignored => "ignored",
        Disposition::UnknownCharge => "unknown_charge",
        Disposition::Unconfirmable => "unconfirmable",
    }
}

/// PSP ingress. Answers 200 for any payload that parses and evaluates —
/// including deliberately ignored events, duplicates, conflicts and unknown
/// charges — so the PSP only retries genuine delivery failures.
async fn ingest_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let method: PaymentMethod = provider.parse()?;
    let provider = state
        .providers
        .get(&method)
        .ok_or_else(|| PaymentError::ProviderUnavailable(format!("{method} not configured")))?;

    let notifications = provider.parse_webhook(&body)?;

    let mut results = Vec::with_capacity(notifications.len());
    for notification in notifications {
        match state.confirmations.handle(notification).await {
            Ok(disposition) => results.push(disposition_label(disposition)),
            // Already alerted by the engine; a PSP retry cannot fix it, so
            // acknowledge and keep the order as it is.
            Err(PaymentError::ConflictingConfirmation { .. }) => {
                results.push("conflict_acknowledged")
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(Json(WebhookAck { results }))
}
