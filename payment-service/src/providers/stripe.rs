//! Stripe card-checkout provider.
//!
//! Creates hosted checkout sessions, maps payment-intent statuses to the
//! canonical vocabulary, and verifies the `Stripe-Signature` webhook scheme
//! (timestamped HMAC-SHA256 with a freshness window).

use crate::config::StripeConfig;
use crate::models::{
    CheckoutRequest, CheckoutResult, EventAmount, NextAction, PaymentStatus,
    PaymentStatusSnapshot, RefundResult, WebhookEvent, WebhookEventKind,
};
use crate::providers::{PaymentProvider, ProviderError, ProviderKind};
use async_trait::async_trait;
use chrono::Utc;
use platform_core::signature::{constant_time_eq, hmac_sha256_hex};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::collections::HashMap;

/// Maximum accepted age of a signed webhook, in seconds. Defends against
/// replay of captured deliveries.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub struct StripeProvider {
    client: Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    url: Option<String>,
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Refund {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

/// `checkout.session.completed` payload slice.
#[derive(Debug, Deserialize)]
struct SessionObject {
    payment_intent: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl StripeProvider {
    pub fn new(config: StripeConfig, client: Client) -> Self {
        Self { client, config }
    }

    fn rejection_message(body: &str) -> String {
        match serde_json::from_str::<ApiError>(body) {
            Ok(err) => err
                .error
                .message
                .or(err.error.error_type)
                .unwrap_or_else(|| body.to_string()),
            Err(_) => body.to_string(),
        }
    }

    fn map_intent_status(status: &str) -> PaymentStatus {
        match status {
            "succeeded" => PaymentStatus::Succeeded,
            "processing" | "requires_payment_method" | "requires_confirmation"
            | "requires_action" => PaymentStatus::Pending,
            "canceled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Failed,
        }
    }

    /// Validate the `Stripe-Signature` header against the raw body.
    ///
    /// Header format: `t=<unix_ts>,v1=<hex>[,v1=<hex>...]`; the signed
    /// payload is `"{t}.{body}"`. Every `v1` candidate is compared in
    /// constant time, and the timestamp must fall inside the freshness
    /// window.
    fn verify_signature(&self, payload: &[u8], header: &str, now: i64) -> bool {
        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<&str> = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let Some(timestamp) = timestamp else {
            return false;
        };
        if candidates.is_empty() || (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            return false;
        }

        let mut signed_payload = Vec::with_capacity(payload.len() + 16);
        signed_payload.extend_from_slice(timestamp.to_string().as_bytes());
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(payload);

        let Ok(expected) =
            hmac_sha256_hex(self.config.webhook_secret.expose_secret(), &signed_payload)
        else {
            return false;
        };

        candidates
            .iter()
            .any(|candidate| constant_time_eq(expected.as_bytes(), candidate.as_bytes()))
    }

    fn translate_event(&self, event: Event) -> Option<WebhookEvent> {
        match event.event_type.as_str() {
            "checkout.session.completed" => {
                let session: SessionObject = serde_json::from_value(event.data.object).ok()?;
                let payment_intent = session.payment_intent?;
                // A completed session without its money fields is malformed,
                // not a zero-amount payment.
                let amount_total = session.amount_total?;
                let currency = session.currency?;
                Some(WebhookEvent {
                    kind: WebhookEventKind::PaymentSucceeded,
                    transaction_id: payment_intent,
                    amount: Some(EventAmount {
                        amount_cents: amount_total,
                        currency: currency.to_uppercase(),
                    }),
                    metadata: session.metadata,
                })
            }
            "payment_intent.succeeded" | "payment_intent.payment_failed" => {
                let intent: PaymentIntent = serde_json::from_value(event.data.object).ok()?;
                let kind = if event.event_type == "payment_intent.succeeded" {
                    WebhookEventKind::PaymentSucceeded
                } else {
                    WebhookEventKind::PaymentFailed
                };
                Some(WebhookEvent {
                    kind,
                    transaction_id: intent.id,
                    amount: Some(EventAmount {
                        amount_cents: intent.amount,
                        currency: intent.currency.to_uppercase(),
                    }),
                    metadata: intent.metadata,
                })
            }
            _ => None,
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    fn signature_header(&self) -> &'static str {
        "Stripe-Signature"
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutResult, ProviderError> {
        // The Checkout Sessions API is form-encoded.
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
            ("customer_email".into(), request.buyer.email.clone()),
            ("payment_method_types[0]".into(), "card".into()),
            (
                "line_items[0][price_data][currency]".into(),
                request.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                request.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                request.description.clone(),
            ),
            ("line_items[0][quantity]".into(), "1".into()),
        ];
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = %status, "Stripe create session response");

        if !status.is_success() {
            let message = Self::rejection_message(&body);
            tracing::warn!(status = %status, message = %message, "Stripe rejected checkout");
            return Ok(CheckoutResult::Rejected { message });
        }

        let session: CheckoutSession = serde_json::from_str(&body)?;
        let checkout_url = session
            .url
            .ok_or_else(|| ProviderError::InvalidResponse("session has no url".into()))?;
        // Persist the payment intent, not the session id: status and refund
        // calls operate on the intent.
        let payment_intent = session.payment_intent.ok_or_else(|| {
            ProviderError::InvalidResponse("session has no payment_intent".into())
        })?;

        tracing::info!(
            session_id = %session.id,
            payment_intent = %payment_intent,
            amount_cents = request.amount_cents,
            "Stripe checkout session created"
        );

        Ok(CheckoutResult::Created {
            transaction_id: payment_intent,
            action: NextAction::Redirect { checkout_url },
        })
    }

    async fn get_payment_status(
        &self,
        transaction_id: &str,
    ) -> Result<PaymentStatusSnapshot, ProviderError> {
        let url = format!(
            "{}/v1/payment_intents/{}",
            self.config.api_base_url, transaction_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Unknown, not failed: the caller retries later.
            tracing::warn!(status = %status, transaction_id, "Stripe status fetch refused");
            return Err(ProviderError::InvalidResponse(format!(
                "status fetch refused with {}",
                status
            )));
        }

        let intent: PaymentIntent = serde_json::from_str(&body)?;
        Ok(PaymentStatusSnapshot {
            status: Self::map_intent_status(&intent.status),
            amount_cents: intent.amount,
            currency: intent.currency.to_uppercase(),
            metadata: intent.metadata,
        })
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Option<WebhookEvent> {
        if !self.verify_signature(payload, signature, Utc::now().timestamp()) {
            tracing::warn!("Stripe webhook signature verification failed");
            return None;
        }

        let event: Event = serde_json::from_slice(payload).ok()?;
        self.translate_event(event)
    }

    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount_cents: Option<i64>,
    ) -> Result<RefundResult, ProviderError> {
        let mut form: Vec<(String, String)> =
            vec![("payment_intent".into(), transaction_id.to_string())];
        if let Some(amount) = amount_cents {
            form.push(("amount".into(), amount.to_string()));
        }

        let url = format!("{}/v1/refunds", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = Self::rejection_message(&body);
            tracing::warn!(status = %status, message = %message, "Stripe rejected refund");
            return Ok(RefundResult::Rejected { message });
        }

        let refund: Refund = serde_json::from_str(&body)?;
        tracing::info!(refund_id = %refund.id, transaction_id, "Stripe refund created");
        Ok(RefundResult::Refunded {
            refund_id: refund.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn test_provider() -> StripeProvider {
        StripeProvider::new(
            StripeConfig {
                secret_key: Secret::new("sk_test_123".to_string()),
                webhook_secret: Secret::new("whsec_test".to_string()),
                api_base_url: "https://api.stripe.com".to_string(),
            },
            Client::new(),
        )
    }

    fn sign(payload: &[u8], timestamp: i64) -> String {
        let mut signed = timestamp.to_string().into_bytes();
        signed.push(b'.');
        signed.extend_from_slice(payload);
        let signature = hmac_sha256_hex("whsec_test", &signed).unwrap();
        format!("t={},v1={}", timestamp, signature)
    }

    #[test]
    fn valid_signature_inside_window() {
        let provider = test_provider();
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let now = Utc::now().timestamp();
        let header = sign(payload, now);

        assert!(provider.verify_signature(payload, &header, now));
        // Deterministic: replaying the same pair verifies again.
        assert!(provider.verify_signature(payload, &header, now));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let provider = test_provider();
        let payload = b"{}";
        let now = Utc::now().timestamp();
        let header = sign(payload, now - SIGNATURE_TOLERANCE_SECS - 1);

        assert!(!provider.verify_signature(payload, &header, now));
    }

    #[test]
    fn mutated_payload_flips_verification() {
        let provider = test_provider();
        let payload = br#"{"type":"payment_intent.succeeded","id":"evt_1"}"#;
        let now = Utc::now().timestamp();
        let header = sign(payload, now);

        let mut tampered = payload.to_vec();
        tampered[12] ^= 1;
        assert!(!provider.verify_signature(&tampered, &header, now));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let provider = test_provider();
        assert!(!provider.verify_signature(b"{}", "not-a-signature", Utc::now().timestamp()));
        assert!(!provider.verify_signature(b"{}", "t=abc,v1=", Utc::now().timestamp()));
    }

    #[test]
    fn intent_statuses_collapse_to_canonical() {
        for fine_grained in [
            "processing",
            "requires_payment_method",
            "requires_confirmation",
            "requires_action",
        ] {
            assert_eq!(
                StripeProvider::map_intent_status(fine_grained),
                PaymentStatus::Pending
            );
        }
        assert_eq!(
            StripeProvider::map_intent_status("succeeded"),
            PaymentStatus::Succeeded
        );
        assert_eq!(
            StripeProvider::map_intent_status("canceled"),
            PaymentStatus::Cancelled
        );
        // Unknown tokens are never mapped to succeeded.
        assert_eq!(
            StripeProvider::map_intent_status("some_future_status"),
            PaymentStatus::Failed
        );
    }

    #[test]
    fn checkout_completed_event_translates_to_succeeded() {
        let provider = test_provider();
        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_1",
                "payment_intent": "pi_123",
                "amount_total": 1999,
                "currency": "brl",
                "metadata": { "orderId": "ord_7" }
            }}
        })
        .to_string();
        let now = Utc::now().timestamp();
        let header = sign(payload.as_bytes(), now);

        let event = provider.verify_webhook(payload.as_bytes(), &header).unwrap();
        assert_eq!(event.kind, WebhookEventKind::PaymentSucceeded);
        assert_eq!(event.transaction_id, "pi_123");
        let amount = event.amount.unwrap();
        assert_eq!(amount.amount_cents, 1999);
        assert_eq!(amount.currency, "BRL");
        assert_eq!(event.metadata.get("orderId").unwrap(), "ord_7");
    }

    #[test]
    fn session_event_with_missing_amount_is_malformed() {
        let provider = test_provider();
        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_1",
                "payment_intent": "pi_123",
                "currency": "brl",
                "metadata": {}
            }}
        })
        .to_string();
        let now = Utc::now().timestamp();
        let header = sign(payload.as_bytes(), now);

        assert!(provider.verify_webhook(payload.as_bytes(), &header).is_none());
    }

    #[test]
    fn irrelevant_event_type_is_ignored() {
        let provider = test_provider();
        let payload = serde_json::json!({
            "type": "invoice.paid",
            "data": { "object": {} }
        })
        .to_string();
        let now = Utc::now().timestamp();
        let header = sign(payload.as_bytes(), now);

        assert!(provider.verify_webhook(payload.as_bytes(), &header).is_none());
    }
}
