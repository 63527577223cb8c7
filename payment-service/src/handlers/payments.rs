//! Checkout, status, and refund handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use platform_core::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::{
        Buyer, CheckoutRequest, CheckoutResult, NextAction, Payment, PaymentState,
        PaymentStatusSnapshot, PixPayload,
    },
    providers::ProviderError,
    services::{metrics, RefundOutcome},
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCheckoutRequest {
    /// Amount in minor units (cents). Anything that would corrupt money is
    /// fatal to the request, never defaulted.
    #[validate(range(min = 1, message = "amount must be a positive number of cents"))]
    pub amount_cents: i64,
    /// ISO 4217 code; falls back to the configured default currency.
    pub currency: Option<String>,
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(nested)]
    pub buyer: BuyerPayload,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[validate(url)]
    pub success_url: String,
    #[validate(url)]
    pub cancel_url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BuyerPayload {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub tax_id: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix: Option<PixPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Create a checkout with the active provider and record the pending
/// payment.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CreateCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    payload.validate()?;

    let currency = payload
        .currency
        .clone()
        .unwrap_or_else(|| state.config.default_currency.clone());

    let request = CheckoutRequest {
        amount_cents: payload.amount_cents,
        currency: currency.clone(),
        description: payload.description.clone(),
        buyer: Buyer {
            name: payload.buyer.name.clone(),
            email: payload.buyer.email.clone(),
            tax_id: payload.buyer.tax_id.clone(),
        },
        metadata: payload.metadata.clone(),
        success_url: payload.success_url.clone(),
        cancel_url: payload.cancel_url.clone(),
    };

    tracing::info!(
        provider = %state.provider.kind(),
        amount_cents = payload.amount_cents,
        currency = %currency,
        "Creating checkout"
    );

    let result = state
        .provider
        .create_checkout(&request)
        .await
        .map_err(map_provider_error)?;

    match result {
        CheckoutResult::Created {
            transaction_id,
            action,
        } => {
            let now = Utc::now();
            let payment = Payment {
                id: Uuid::new_v4(),
                transaction_id: Some(transaction_id.clone()),
                amount_cents: payload.amount_cents,
                currency,
                state: PaymentState::Pending,
                metadata: payload.metadata,
                created_at: now,
                updated_at: now,
            };
            state.store.insert(payment.clone()).await?;

            metrics::record_checkout(state.provider.kind().as_str(), "created");
            tracing::info!(
                payment_id = %payment.id,
                transaction_id = %transaction_id,
                "Checkout created"
            );

            let (checkout_url, pix) = match action {
                NextAction::Redirect { checkout_url } => (Some(checkout_url), None),
                NextAction::Pix { pix } => (None, Some(pix)),
            };

            Ok((
                StatusCode::CREATED,
                Json(CheckoutResponse {
                    success: true,
                    payment_id: Some(payment.id),
                    transaction_id: Some(transaction_id),
                    checkout_url,
                    pix,
                    error: None,
                }),
            ))
        }
        CheckoutResult::Rejected { message } => {
            metrics::record_checkout(state.provider.kind().as_str(), "rejected");
            Ok((
                StatusCode::OK,
                Json(CheckoutResponse {
                    success: false,
                    payment_id: None,
                    transaction_id: None,
                    checkout_url: None,
                    pix: None,
                    error: Some(message),
                }),
            ))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment_id: Uuid,
    pub state: PaymentState,
    pub amount_cents: i64,
    pub currency: String,
    pub metadata: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<PaymentStatusSnapshot>,
}

/// Current payment state, refreshed against the gateway.
///
/// The live snapshot runs through the same conditional-transition rules as
/// webhooks, so a payment whose notification was lost converges here.
pub async fn get_payment_status(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let payment = state
        .store
        .get(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    let snapshot = match &payment.transaction_id {
        Some(transaction_id) => Some(
            state
                .provider
                .get_payment_status(transaction_id)
                .await
                .map_err(map_provider_error)?,
        ),
        None => None,
    };

    if let Some(snapshot) = &snapshot {
        state.reconciler.apply_snapshot(payment.id, snapshot).await?;
    }

    let refreshed = state
        .store
        .get(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    Ok(Json(PaymentStatusResponse {
        payment_id: refreshed.id,
        state: refreshed.state,
        amount_cents: refreshed.amount_cents,
        currency: refreshed.currency,
        metadata: refreshed.metadata,
        gateway: snapshot,
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct RefundRequest {
    /// Minor units; omit for a full refund.
    pub amount_cents: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    payload: Option<Json<RefundRequest>>,
) -> Result<Json<RefundResponse>, AppError> {
    let amount_cents = payload.and_then(|Json(body)| body.amount_cents);

    let outcome = state.refunds.refund(payment_id, amount_cents).await?;
    match outcome {
        RefundOutcome::Refunded { refund_id } => Ok(Json(RefundResponse {
            success: true,
            refund_id: Some(refund_id),
            error: None,
        })),
        RefundOutcome::Rejected { message } => Ok(Json(RefundResponse {
            success: false,
            refund_id: None,
            error: Some(message),
        })),
    }
}

/// Transport faults answer 502 so callers retry with backoff instead of
/// treating the payment as failed.
fn map_provider_error(err: ProviderError) -> AppError {
    if err.is_retryable() {
        AppError::BadGateway(err.to_string())
    } else {
        AppError::InternalError(anyhow::anyhow!(err.to_string()))
    }
}
