//! Mercado Pago wallet-preference provider.
//!
//! Creates checkout preferences and verifies hex HMAC-SHA256 webhook
//! signatures. Mercado Pago notifications are thin references; the produced
//! [`WebhookEvent`] carries no amount and the reconciler fills it in with a
//! follow-up status fetch.

use crate::config::MercadoPagoConfig;
use crate::models::{
    CheckoutRequest, CheckoutResult, NextAction, PaymentStatus, PaymentStatusSnapshot,
    RefundResult, WebhookEvent, WebhookEventKind,
};
use crate::providers::{PaymentProvider, ProviderError, ProviderKind};
use async_trait::async_trait;
use platform_core::signature::verify_hmac_sha256_hex;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub struct MercadoPagoProvider {
    client: Client,
    config: MercadoPagoConfig,
}

#[derive(Debug, Serialize)]
struct PreferenceRequest {
    items: Vec<PreferenceItem>,
    payer: PreferencePayer,
    back_urls: BackUrls,
    auto_return: String,
    external_reference: String,
    metadata: HashMap<String, String>,
    payment_methods: PaymentMethods,
}

#[derive(Debug, Serialize)]
struct PreferenceItem {
    title: String,
    quantity: u32,
    /// Decimal major units; converted from minor units at this boundary only.
    unit_price: f64,
    currency_id: String,
}

#[derive(Debug, Serialize)]
struct PreferencePayer {
    email: String,
}

#[derive(Debug, Serialize)]
struct BackUrls {
    success: String,
    failure: String,
    pending: String,
}

#[derive(Debug, Serialize)]
struct PaymentMethods {
    excluded_payment_types: Vec<String>,
    installments: u32,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResource {
    status: String,
    transaction_amount: f64,
    currency_id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "type")]
    notification_type: String,
    data: Option<NotificationData>,
}

#[derive(Debug, Deserialize)]
struct NotificationData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: serde_json::Number,
}

impl MercadoPagoProvider {
    pub fn new(config: MercadoPagoConfig, client: Client) -> Self {
        Self { client, config }
    }

    fn map_payment_status(status: &str) -> PaymentStatus {
        match status {
            "approved" => PaymentStatus::Succeeded,
            "pending" | "in_process" | "in_mediation" => PaymentStatus::Pending,
            "cancelled" | "rejected" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Failed,
        }
    }

    fn cents_to_decimal(amount_cents: i64) -> f64 {
        amount_cents as f64 / 100.0
    }

    fn decimal_to_cents(amount: f64) -> i64 {
        (amount * 100.0).round() as i64
    }
}

#[async_trait]
impl PaymentProvider for MercadoPagoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::MercadoPago
    }

    fn signature_header(&self) -> &'static str {
        "X-MercadoPago-Signature"
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutResult, ProviderError> {
        let preference = PreferenceRequest {
            items: vec![PreferenceItem {
                title: request.description.clone(),
                quantity: 1,
                unit_price: Self::cents_to_decimal(request.amount_cents),
                currency_id: request.currency.clone(),
            }],
            payer: PreferencePayer {
                email: request.buyer.email.clone(),
            },
            back_urls: BackUrls {
                success: request.success_url.clone(),
                failure: request.cancel_url.clone(),
                pending: request.success_url.clone(),
            },
            auto_return: "approved".to_string(),
            external_reference: request.reference_id().unwrap_or_default().to_string(),
            metadata: request.metadata.clone(),
            payment_methods: PaymentMethods {
                excluded_payment_types: Vec::new(),
                installments: 12,
            },
        };

        let url = format!("{}/checkout/preferences", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&preference)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = %status, "Mercado Pago create preference response");

        if !status.is_success() {
            tracing::warn!(status = %status, "Mercado Pago rejected checkout");
            return Ok(CheckoutResult::Rejected { message: body });
        }

        let preference: PreferenceResponse = serde_json::from_str(&body)?;
        tracing::info!(
            preference_id = %preference.id,
            amount_cents = request.amount_cents,
            "Mercado Pago preference created"
        );

        Ok(CheckoutResult::Created {
            transaction_id: preference.id,
            action: NextAction::Redirect {
                checkout_url: preference.init_point,
            },
        })
    }

    async fn get_payment_status(
        &self,
        transaction_id: &str,
    ) -> Result<PaymentStatusSnapshot, ProviderError> {
        let url = format!("{}/v1/payments/{}", self.config.api_base_url, transaction_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Unknown, not failed: the caller retries later.
            tracing::warn!(status = %status, transaction_id, "Mercado Pago status fetch refused");
            return Err(ProviderError::InvalidResponse(format!(
                "status fetch refused with {}",
                status
            )));
        }

        let payment: PaymentResource = serde_json::from_str(&body)?;
        Ok(PaymentStatusSnapshot {
            status: Self::map_payment_status(&payment.status),
            amount_cents: Self::decimal_to_cents(payment.transaction_amount),
            currency: payment.currency_id,
            metadata: payment.metadata,
        })
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Option<WebhookEvent> {
        let valid =
            verify_hmac_sha256_hex(self.config.webhook_secret.expose_secret(), payload, signature)
                .unwrap_or(false);
        if !valid {
            tracing::warn!("Mercado Pago webhook signature verification failed");
            return None;
        }

        let notification: Notification = serde_json::from_slice(payload).ok()?;
        if notification.notification_type != "payment" {
            tracing::debug!(
                notification_type = %notification.notification_type,
                "Ignoring Mercado Pago notification type"
            );
            return None;
        }

        let payment_id = notification.data?.id;
        // Thin reference: amount and currency come from the follow-up status
        // fetch performed by the reconciler.
        Some(WebhookEvent {
            kind: WebhookEventKind::PaymentSucceeded,
            transaction_id: payment_id,
            amount: None,
            metadata: HashMap::new(),
        })
    }

    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount_cents: Option<i64>,
    ) -> Result<RefundResult, ProviderError> {
        let body = match amount_cents {
            Some(amount) => {
                serde_json::json!({ "amount": Self::cents_to_decimal(amount) })
            }
            None => serde_json::json!({}),
        };

        let url = format!(
            "{}/v1/payments/{}/refunds",
            self.config.api_base_url, transaction_id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(status = %status, transaction_id, "Mercado Pago rejected refund");
            return Ok(RefundResult::Rejected { message: body });
        }

        let refund: RefundResponse = serde_json::from_str(&body)?;
        tracing::info!(refund_id = %refund.id, transaction_id, "Mercado Pago refund created");
        Ok(RefundResult::Refunded {
            refund_id: refund.id.to_string(),
        })
    }
}
