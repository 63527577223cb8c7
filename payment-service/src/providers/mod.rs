//! Gateway provider contract and selection.
//!
//! Every gateway lives behind [`PaymentProvider`]; the rest of the service
//! never sees gateway-specific request or response shapes. Exactly one
//! implementation is active per process, chosen from configuration at
//! startup.

pub mod mercado_pago;
pub mod pagbank;
pub mod stripe;

use crate::config::Config;
use crate::models::{CheckoutRequest, CheckoutResult, PaymentStatusSnapshot, RefundResult, WebhookEvent};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use mercado_pago::MercadoPagoProvider;
pub use pagbank::PagBankProvider;
pub use stripe::StripeProvider;

/// The three supported gateway families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Stripe,
    MercadoPago,
    PagBank,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Stripe => "stripe",
            ProviderKind::MercadoPago => "mercadopago",
            ProviderKind::PagBank => "pagbank",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stripe" => Ok(ProviderKind::Stripe),
            "mercadopago" | "mercado_pago" => Ok(ProviderKind::MercadoPago),
            "pagbank" => Ok(ProviderKind::PagBank),
            other => Err(format!("Unknown payment provider: {}", other)),
        }
    }
}

/// Transport and protocol faults. Expected gateway rejections never take this
/// path; they are carried inside [`CheckoutResult`] and [`RefundResult`].
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway transport error: {0}")]
    Transport(reqwest::Error),

    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transient faults the caller may retry with backoff. These must never
    /// be folded into a terminal "failed" payment status.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Timeout | ProviderError::Transport(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Transport(err)
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::InvalidResponse(err.to_string())
    }
}

/// Capability set every gateway implementation satisfies.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Header carrying the webhook signature for this gateway.
    fn signature_header(&self) -> &'static str;

    /// Create a hosted checkout (redirect flow) or a PIX order (QR flow).
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutResult, ProviderError>;

    /// Pull the current state of a transaction; the reconciliation fallback
    /// when webhooks are delayed or lost. A refused fetch is an error, never
    /// a failed status.
    async fn get_payment_status(
        &self,
        transaction_id: &str,
    ) -> Result<PaymentStatusSnapshot, ProviderError>;

    /// Verify and translate a raw webhook notification.
    ///
    /// Pure over the payload and the provider-held secret: no side effects,
    /// no network. `None` means reject silently (bad signature, irrelevant
    /// event type, or malformed payload).
    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Option<WebhookEvent>;

    /// Refund a captured payment. `None` amount means full refund.
    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount_cents: Option<i64>,
    ) -> Result<RefundResult, ProviderError>;
}

/// Instantiate the configured provider. Pure mapping from the configuration
/// enum; an unrecognized selector already failed in `Config::from_env`.
pub fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn PaymentProvider>> {
    let http = reqwest::Client::builder()
        .timeout(config.gateway_timeout)
        .build()?;

    let provider: Arc<dyn PaymentProvider> = match config.provider {
        ProviderKind::Stripe => Arc::new(StripeProvider::new(config.stripe.clone(), http)),
        ProviderKind::MercadoPago => {
            Arc::new(MercadoPagoProvider::new(config.mercado_pago.clone(), http))
        }
        ProviderKind::PagBank => Arc::new(PagBankProvider::new(config.pagbank.clone(), http)),
    };

    tracing::info!(provider = %provider.kind(), "Payment provider initialized");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_known_selectors() {
        assert_eq!("stripe".parse::<ProviderKind>(), Ok(ProviderKind::Stripe));
        assert_eq!(
            "MercadoPago".parse::<ProviderKind>(),
            Ok(ProviderKind::MercadoPago)
        );
        assert_eq!("pagbank".parse::<ProviderKind>(), Ok(ProviderKind::PagBank));
    }

    #[test]
    fn provider_kind_rejects_unknown_selector() {
        assert!("paypal".parse::<ProviderKind>().is_err());
    }
}
