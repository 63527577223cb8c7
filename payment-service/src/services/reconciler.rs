//! Webhook reconciliation.
//!
//! Translates verified gateway notifications into conditional entity-state
//! updates. Must be safe under concurrent, duplicate, and out-of-order
//! deliveries: "succeeded" is idempotent and never downgraded by a late
//! failure notification.

use crate::models::{
    PaymentState, PaymentStatus, PaymentStatusSnapshot, WebhookEvent, WebhookEventKind,
    CORRELATION_KEYS,
};
use crate::providers::PaymentProvider;
use crate::services::dedup::WebhookDedup;
use crate::services::metrics;
use crate::services::repository::{PaymentStore, TransitionOutcome};
use anyhow::anyhow;
use platform_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Verification failed or the event type is irrelevant; acknowledge
    /// without touching any state.
    Ignored,
    /// Same event already applied inside the dedup retention window.
    Duplicate,
    /// Verified event for a transaction this platform does not know.
    Unmatched { transaction_id: String },
    /// Entity state changed.
    Applied {
        payment_id: Uuid,
        state: PaymentState,
    },
    /// Entity already terminal; duplicate or out-of-order delivery.
    NoOp {
        payment_id: Uuid,
        state: PaymentState,
    },
}

pub struct WebhookReconciler {
    provider: Arc<dyn PaymentProvider>,
    store: Arc<dyn PaymentStore>,
    dedup: Arc<WebhookDedup>,
}

impl WebhookReconciler {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: Arc<dyn PaymentStore>,
        dedup: Arc<WebhookDedup>,
    ) -> Self {
        Self {
            provider,
            store,
            dedup,
        }
    }

    /// Process one raw webhook delivery.
    ///
    /// Internal faults (store errors, enrichment transport failures) surface
    /// as errors so the endpoint answers 500 and the gateway retries; every
    /// other path acknowledges.
    pub async fn process(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ReconcileOutcome, AppError> {
        let Some(event) = self.provider.verify_webhook(payload, signature) else {
            metrics::record_webhook(self.provider.kind().as_str(), "ignored");
            return Ok(ReconcileOutcome::Ignored);
        };

        let provider_kind = self.provider.kind();
        if self
            .dedup
            .is_duplicate(provider_kind, &event.transaction_id, event.kind)
        {
            tracing::info!(
                transaction_id = %event.transaction_id,
                event = %event.kind.as_str(),
                "Duplicate webhook delivery suppressed"
            );
            metrics::record_webhook(provider_kind.as_str(), "duplicate");
            return Ok(ReconcileOutcome::Duplicate);
        }

        // Thin notifications carry no amount; the live snapshot is the truth
        // for both the amount and the final status.
        let event = match event.amount {
            Some(_) => event,
            None => match self.enrich(event).await? {
                Some(event) => event,
                None => {
                    metrics::record_webhook(provider_kind.as_str(), "ignored");
                    return Ok(ReconcileOutcome::Ignored);
                }
            },
        };

        let Some(payment) = self.locate(&event).await? else {
            tracing::warn!(
                transaction_id = %event.transaction_id,
                "Webhook for unknown transaction"
            );
            metrics::record_webhook(provider_kind.as_str(), "unmatched");
            return Ok(ReconcileOutcome::Unmatched {
                transaction_id: event.transaction_id,
            });
        };

        let target = match event.kind {
            WebhookEventKind::PaymentSucceeded => PaymentState::Succeeded,
            WebhookEventKind::PaymentFailed => PaymentState::Failed,
        };

        let outcome = match self.store.transition(payment.id, target).await? {
            TransitionOutcome::Applied => {
                tracing::info!(
                    payment_id = %payment.id,
                    transaction_id = %event.transaction_id,
                    state = ?target,
                    "Payment state updated from webhook"
                );
                metrics::record_webhook(provider_kind.as_str(), "applied");
                ReconcileOutcome::Applied {
                    payment_id: payment.id,
                    state: target,
                }
            }
            TransitionOutcome::AlreadyInState => {
                metrics::record_webhook(provider_kind.as_str(), "noop");
                ReconcileOutcome::NoOp {
                    payment_id: payment.id,
                    state: target,
                }
            }
            TransitionOutcome::Refused { current } => {
                tracing::info!(
                    payment_id = %payment.id,
                    current = ?current,
                    refused = ?target,
                    "Out-of-order webhook did not downgrade payment"
                );
                metrics::record_webhook(provider_kind.as_str(), "noop");
                ReconcileOutcome::NoOp {
                    payment_id: payment.id,
                    state: current,
                }
            }
        };

        self.dedup
            .record(provider_kind, &event.transaction_id, event.kind);
        Ok(outcome)
    }

    /// Apply a polled snapshot through the same conditional rules, so a
    /// payment whose webhook was lost converges when the platform polls.
    pub async fn apply_snapshot(
        &self,
        payment_id: Uuid,
        snapshot: &PaymentStatusSnapshot,
    ) -> Result<(), AppError> {
        if !snapshot.status.is_terminal() {
            return Ok(());
        }
        self.store
            .transition(payment_id, snapshot.status.into())
            .await?;
        Ok(())
    }

    /// Follow-up status fetch for thin notifications. Returns `None` when
    /// the remote payment is still pending (nothing to apply yet).
    async fn enrich(&self, event: WebhookEvent) -> Result<Option<WebhookEvent>, AppError> {
        let snapshot = self
            .provider
            .get_payment_status(&event.transaction_id)
            .await
            .map_err(|e| AppError::InternalError(anyhow!("status enrichment failed: {}", e)))?;

        let kind = match snapshot.status {
            PaymentStatus::Succeeded => WebhookEventKind::PaymentSucceeded,
            PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Expired => {
                WebhookEventKind::PaymentFailed
            }
            PaymentStatus::Pending => return Ok(None),
        };

        let mut metadata = event.metadata;
        metadata.extend(snapshot.metadata.clone());

        Ok(Some(WebhookEvent {
            kind,
            transaction_id: event.transaction_id,
            amount: Some(crate::models::EventAmount {
                amount_cents: snapshot.amount_cents,
                currency: snapshot.currency,
            }),
            metadata,
        }))
    }

    /// Find the owning payment by transaction id, falling back to the
    /// correlation references carried in the event metadata.
    async fn locate(
        &self,
        event: &WebhookEvent,
    ) -> Result<Option<crate::models::Payment>, AppError> {
        if let Some(payment) = self
            .store
            .find_by_transaction_id(&event.transaction_id)
            .await?
        {
            return Ok(Some(payment));
        }

        let candidates = CORRELATION_KEYS
            .iter()
            .copied()
            .chain(std::iter::once("referenceId"))
            .filter_map(|key| event.metadata.get(key));
        for reference in candidates {
            if let Some(payment) = self.store.find_by_reference(reference).await? {
                return Ok(Some(payment));
            }
        }

        Ok(None)
    }
}
