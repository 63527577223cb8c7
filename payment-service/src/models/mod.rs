//! Canonical payment model shared by every gateway provider.
//!
//! Amounts are integer minor units (cents) everywhere; providers convert
//! to and from gateway-specific decimal conventions at the wire boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Canonical status of a gateway transaction, as reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
    /// Terminal failure specific to PIX orders whose QR code lapsed.
    Expired,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// Lifecycle state of a stored payment entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Created,
    Pending,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
    Refunded,
}

impl PaymentState {
    /// Conditional-update rule set for webhook and polling reconciliation.
    ///
    /// `Succeeded` and `Refunded` never downgrade: a late failure
    /// notification for an already-succeeded payment is a no-op, while a
    /// success arriving after a premature failure upgrades the record.
    pub fn can_transition_to(&self, to: PaymentState) -> bool {
        use PaymentState::*;
        match to {
            Succeeded => matches!(self, Created | Pending | Failed | Cancelled | Expired),
            Failed | Cancelled | Expired => matches!(self, Created | Pending),
            Refunded => matches!(self, Succeeded),
            Pending => matches!(self, Created),
            Created => false,
        }
    }

    pub fn is_refundable(&self) -> bool {
        matches!(self, PaymentState::Succeeded)
    }
}

impl From<PaymentStatus> for PaymentState {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => PaymentState::Pending,
            PaymentStatus::Succeeded => PaymentState::Succeeded,
            PaymentStatus::Failed => PaymentState::Failed,
            PaymentStatus::Cancelled => PaymentState::Cancelled,
            PaymentStatus::Expired => PaymentState::Expired,
        }
    }
}

/// Stored payment entity owned by an order, donation, or raffle-ticket batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    /// Gateway-assigned transaction identifier. For Stripe this is the
    /// payment intent id, never the checkout session id.
    pub transaction_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub state: PaymentState,
    /// Correlation metadata echoed back by the gateway (orderId, donationId,
    /// raffleId).
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Buyer identity forwarded to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buyer {
    pub name: String,
    pub email: String,
    /// Tax document (CPF/CNPJ); punctuation is stripped at the provider
    /// boundary where the gateway requires digits only.
    pub tax_id: String,
}

/// Checkout creation request handed to a provider.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub buyer: Buyer,
    pub metadata: HashMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Correlation id for the owning entity, taken from the first known
    /// metadata key.
    pub fn reference_id(&self) -> Option<&str> {
        CORRELATION_KEYS
            .iter()
            .find_map(|key| self.metadata.get(*key).map(String::as_str))
    }
}

/// Metadata keys used to correlate a gateway transaction back to the owning
/// domain entity.
pub const CORRELATION_KEYS: &[&str] = &["orderId", "donationId", "raffleId"];

/// PIX payload returned by QR-code based gateways.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixPayload {
    /// Copy-paste PIX code.
    pub code: String,
    /// Link to the rendered QR image (image/png).
    pub qr_image_url: String,
    /// Link to the plain-text PIX code (text/plain).
    pub qr_text_url: String,
    pub expires_at: String,
}

/// What the buyer must do next to authorize the payment.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum NextAction {
    Redirect { checkout_url: String },
    Pix { pix: PixPayload },
}

/// Outcome of a checkout creation call.
///
/// Expected gateway rejections are data, not errors; only transport and
/// protocol faults surface as `ProviderError`.
#[derive(Debug, Clone)]
pub enum CheckoutResult {
    Created {
        transaction_id: String,
        action: NextAction,
    },
    Rejected {
        message: String,
    },
}

/// Result of polling a provider for the current state of a transaction.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusSnapshot {
    pub status: PaymentStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventKind {
    PaymentSucceeded,
    PaymentFailed,
}

impl WebhookEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventKind::PaymentSucceeded => "payment.succeeded",
            WebhookEventKind::PaymentFailed => "payment.failed",
        }
    }
}

/// Canonical event produced by a verified webhook notification.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub kind: WebhookEventKind,
    pub transaction_id: String,
    /// `None` for thin notifications that only reference the remote payment;
    /// the reconciler must fetch the live snapshot before applying the event.
    pub amount: Option<EventAmount>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct EventAmount {
    pub amount_cents: i64,
    pub currency: String,
}

/// Outcome of a refund call.
#[derive(Debug, Clone)]
pub enum RefundResult {
    Refunded { refund_id: String },
    Rejected { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeded_is_sticky() {
        assert!(!PaymentState::Succeeded.can_transition_to(PaymentState::Failed));
        assert!(!PaymentState::Succeeded.can_transition_to(PaymentState::Cancelled));
        assert!(!PaymentState::Refunded.can_transition_to(PaymentState::Succeeded));
        assert!(!PaymentState::Refunded.can_transition_to(PaymentState::Failed));
    }

    #[test]
    fn success_after_premature_failure_upgrades() {
        assert!(PaymentState::Failed.can_transition_to(PaymentState::Succeeded));
        assert!(PaymentState::Expired.can_transition_to(PaymentState::Succeeded));
    }

    #[test]
    fn only_succeeded_is_refundable() {
        assert!(PaymentState::Succeeded.is_refundable());
        assert!(!PaymentState::Pending.is_refundable());
        assert!(!PaymentState::Refunded.is_refundable());
        assert!(PaymentState::Succeeded.can_transition_to(PaymentState::Refunded));
        assert!(!PaymentState::Pending.can_transition_to(PaymentState::Refunded));
    }

    #[test]
    fn reference_id_prefers_known_correlation_keys() {
        let mut metadata = HashMap::new();
        metadata.insert("donationId".to_string(), "don_42".to_string());
        metadata.insert("campaign".to_string(), "winter".to_string());

        let request = CheckoutRequest {
            amount_cents: 1999,
            currency: "BRL".to_string(),
            description: "Donation".to_string(),
            buyer: Buyer {
                name: "Maria Souza".to_string(),
                email: "maria@example.com".to_string(),
                tax_id: "123.456.789-09".to_string(),
            },
            metadata,
            success_url: "https://example.org/ok".to_string(),
            cancel_url: "https://example.org/cancel".to_string(),
        };

        assert_eq!(request.reference_id(), Some("don_42"));
    }
}
