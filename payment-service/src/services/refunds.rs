//! Refund orchestration.
//!
//! Validates refund preconditions locally before any network call: the
//! payment must be in a refundable state and a partial amount must not
//! exceed the captured amount. A gateway rejection leaves the entity
//! untouched and surfaces the gateway's message.

use crate::models::{PaymentState, RefundResult};
use crate::providers::PaymentProvider;
use crate::services::metrics;
use crate::services::repository::PaymentStore;
use anyhow::anyhow;
use platform_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded { refund_id: String },
    Rejected { message: String },
}

pub struct RefundOrchestrator {
    provider: Arc<dyn PaymentProvider>,
    store: Arc<dyn PaymentStore>,
}

impl RefundOrchestrator {
    pub fn new(provider: Arc<dyn PaymentProvider>, store: Arc<dyn PaymentStore>) -> Self {
        Self { provider, store }
    }

    pub async fn refund(
        &self,
        payment_id: Uuid,
        amount_cents: Option<i64>,
    ) -> Result<RefundOutcome, AppError> {
        let payment = self
            .store
            .get(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Payment not found")))?;

        if !payment.state.is_refundable() {
            return Err(AppError::Conflict(anyhow!(
                "Payment is not refundable in state {:?}",
                payment.state
            )));
        }

        if let Some(amount) = amount_cents {
            if amount <= 0 {
                return Err(AppError::BadRequest(anyhow!(
                    "Refund amount must be positive"
                )));
            }
            if amount > payment.amount_cents {
                return Err(AppError::BadRequest(anyhow!(
                    "Refund amount {} exceeds captured amount {}",
                    amount,
                    payment.amount_cents
                )));
            }
        }

        let transaction_id = payment
            .transaction_id
            .as_deref()
            .ok_or_else(|| AppError::Conflict(anyhow!("Payment has no gateway transaction")))?;

        let result = self
            .provider
            .refund_payment(transaction_id, amount_cents)
            .await
            .map_err(|e| {
                tracing::error!(payment_id = %payment_id, error = %e, "Refund call failed");
                AppError::BadGateway(e.to_string())
            })?;

        match result {
            RefundResult::Refunded { refund_id } => {
                self.store
                    .transition(payment_id, PaymentState::Refunded)
                    .await?;
                tracing::info!(
                    payment_id = %payment_id,
                    refund_id = %refund_id,
                    "Payment refunded"
                );
                metrics::record_refund(self.provider.kind().as_str(), "refunded");
                Ok(RefundOutcome::Refunded { refund_id })
            }
            RefundResult::Rejected { message } => {
                tracing::warn!(
                    payment_id = %payment_id,
                    message = %message,
                    "Gateway rejected refund"
                );
                metrics::record_refund(self.provider.kind().as_str(), "rejected");
                Ok(RefundOutcome::Rejected { message })
            }
        }
    }
}
