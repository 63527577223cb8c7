//! Payment store seam.
//!
//! The platform's document-store repository is an external collaborator;
//! the payment core only needs lookup by id / transaction id / correlation
//! reference plus a conditional state transition. `InMemoryPaymentStore`
//! backs the service and its tests.

use crate::models::{Payment, PaymentState, CORRELATION_KEYS};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

/// Result of a conditional state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Already in the requested state; duplicate deliveries land here.
    AlreadyInState,
    /// The rule set refused the transition (e.g. failure after success).
    Refused { current: PaymentState },
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: Payment) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Payment>>;

    async fn find_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Payment>>;

    /// Locate a payment whose correlation metadata carries `reference`.
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>>;

    /// Set the new state only if the rule set permits it from the current
    /// state. Never an unconditional overwrite.
    async fn transition(&self, id: Uuid, to: PaymentState) -> Result<TransitionOutcome>;
}

#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: DashMap<Uuid, Payment>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: Payment) -> Result<()> {
        self.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>> {
        Ok(self.payments.get(&id).map(|entry| entry.clone()))
    }

    async fn find_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .iter()
            .find(|entry| entry.transaction_id.as_deref() == Some(transaction_id))
            .map(|entry| entry.clone()))
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .iter()
            .find(|entry| {
                CORRELATION_KEYS
                    .iter()
                    .any(|key| entry.metadata.get(*key).map(String::as_str) == Some(reference))
            })
            .map(|entry| entry.clone()))
    }

    async fn transition(&self, id: Uuid, to: PaymentState) -> Result<TransitionOutcome> {
        let Some(mut entry) = self.payments.get_mut(&id) else {
            anyhow::bail!("payment {} not found", id);
        };

        if entry.state == to {
            return Ok(TransitionOutcome::AlreadyInState);
        }
        if !entry.state.can_transition_to(to) {
            return Ok(TransitionOutcome::Refused {
                current: entry.state,
            });
        }

        entry.state = to;
        entry.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn payment(state: PaymentState) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            transaction_id: Some("pi_1".to_string()),
            amount_cents: 1999,
            currency: "BRL".to_string(),
            state,
            metadata: HashMap::from([("orderId".to_string(), "ord_9".to_string())]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn transition_is_conditional() {
        let store = InMemoryPaymentStore::new();
        let p = payment(PaymentState::Pending);
        let id = p.id;
        store.insert(p).await.unwrap();

        assert_eq!(
            store.transition(id, PaymentState::Succeeded).await.unwrap(),
            TransitionOutcome::Applied
        );
        assert_eq!(
            store.transition(id, PaymentState::Succeeded).await.unwrap(),
            TransitionOutcome::AlreadyInState
        );
        assert_eq!(
            store.transition(id, PaymentState::Failed).await.unwrap(),
            TransitionOutcome::Refused {
                current: PaymentState::Succeeded
            }
        );
    }

    #[tokio::test]
    async fn lookup_by_transaction_id_and_reference() {
        let store = InMemoryPaymentStore::new();
        let p = payment(PaymentState::Pending);
        let id = p.id;
        store.insert(p).await.unwrap();

        let by_txn = store.find_by_transaction_id("pi_1").await.unwrap().unwrap();
        assert_eq!(by_txn.id, id);

        let by_ref = store.find_by_reference("ord_9").await.unwrap().unwrap();
        assert_eq!(by_ref.id, id);

        assert!(store.find_by_reference("missing").await.unwrap().is_none());
    }
}
