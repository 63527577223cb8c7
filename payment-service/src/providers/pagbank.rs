//! PagBank PIX-order provider.
//!
//! Creates Orders API orders with a QR-code request, maps the gateway's
//! uppercase status vocabulary, and verifies webhook notifications with a
//! dedicated HMAC-SHA256 secret. The QR expiration is rendered in the fixed
//! UTC-3 offset the gateway expects.

use crate::config::PagBankConfig;
use crate::models::{
    CheckoutRequest, CheckoutResult, EventAmount, NextAction, PaymentStatus,
    PaymentStatusSnapshot, PixPayload, RefundResult, WebhookEvent, WebhookEventKind,
};
use crate::providers::{PaymentProvider, ProviderError, ProviderKind};
use async_trait::async_trait;
use chrono::{Duration, FixedOffset, SecondsFormat, Utc};
use platform_core::signature::verify_hmac_sha256_hex;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

const QR_EXPIRATION_HOURS: i64 = 24;

pub struct PagBankProvider {
    client: Client,
    config: PagBankConfig,
}

#[derive(Debug, Serialize)]
struct OrderRequest {
    reference_id: String,
    customer: Customer,
    items: Vec<Item>,
    qr_codes: Vec<QrCodeRequest>,
}

#[derive(Debug, Serialize)]
struct Customer {
    name: String,
    email: String,
    /// CPF/CNPJ digits only; punctuation stripped before transmission.
    tax_id: String,
}

#[derive(Debug, Serialize)]
struct Item {
    reference_id: String,
    name: String,
    quantity: u32,
    unit_amount: i64,
}

#[derive(Debug, Serialize)]
struct QrCodeRequest {
    amount: Amount,
    expiration_date: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Amount {
    value: i64,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    reference_id: Option<String>,
    status: Option<String>,
    #[serde(default)]
    qr_codes: Vec<QrCodeResponse>,
    #[serde(default)]
    charges: Vec<ChargeResponse>,
}

#[derive(Debug, Deserialize)]
struct QrCodeResponse {
    text: Option<String>,
    expiration_date: Option<String>,
    amount: Option<Amount>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    id: String,
    status: Option<String>,
    amount: Option<Amount>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    media: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    id: String,
    reference_id: Option<String>,
    status: String,
    #[serde(default)]
    charges: Vec<ChargeResponse>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error_messages: Vec<ErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    code: String,
    description: String,
}

impl PagBankProvider {
    pub fn new(config: PagBankConfig, client: Client) -> Self {
        Self { client, config }
    }

    /// Uppercase gateway tokens mapped explicitly; unknown tokens default to
    /// pending, never to succeeded.
    fn map_order_status(status: &str) -> PaymentStatus {
        match status.to_uppercase().as_str() {
            "PAID" => PaymentStatus::Succeeded,
            "AUTHORIZED" | "WAITING" | "IN_ANALYSIS" => PaymentStatus::Pending,
            "CANCELED" | "DECLINED" => PaymentStatus::Failed,
            "EXPIRED" => PaymentStatus::Expired,
            _ => PaymentStatus::Pending,
        }
    }

    fn qr_expiration() -> String {
        let offset = FixedOffset::west_opt(3 * 3600).expect("valid UTC-3 offset");
        (Utc::now().with_timezone(&offset) + Duration::hours(QR_EXPIRATION_HOURS))
            .to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    fn rejection_message(body: &str) -> String {
        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(err) => err
                .error_messages
                .iter()
                .map(|m| format!("{}: {}", m.code, m.description))
                .collect::<Vec<_>>()
                .join("; "),
            Err(_) => body.to_string(),
        }
    }

    fn pix_payload(qr: &QrCodeResponse) -> PixPayload {
        let link_by_media = |media: &str| {
            qr.links
                .iter()
                .find(|link| link.media.as_deref() == Some(media))
                .map(|link| link.href.clone())
                .unwrap_or_default()
        };

        PixPayload {
            code: qr.text.clone().unwrap_or_default(),
            qr_image_url: link_by_media("image/png"),
            qr_text_url: link_by_media("text/plain"),
            expires_at: qr.expiration_date.clone().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl PaymentProvider for PagBankProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::PagBank
    }

    fn signature_header(&self) -> &'static str {
        "X-PagBank-Signature"
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutResult, ProviderError> {
        let reference_id = request
            .reference_id()
            .map(str::to_string)
            .unwrap_or_else(|| format!("PAY_{}", Uuid::new_v4().simple()));

        let order = OrderRequest {
            reference_id: reference_id.clone(),
            customer: Customer {
                name: request.buyer.name.clone(),
                email: request.buyer.email.clone(),
                tax_id: request
                    .buyer
                    .tax_id
                    .chars()
                    .filter(char::is_ascii_digit)
                    .collect(),
            },
            items: vec![Item {
                reference_id: format!("ITEM_{}", Uuid::new_v4().simple()),
                name: request.description.clone(),
                quantity: 1,
                unit_amount: request.amount_cents,
            }],
            qr_codes: vec![QrCodeRequest {
                amount: Amount {
                    value: request.amount_cents,
                },
                expiration_date: Self::qr_expiration(),
            }],
        };

        let url = format!("{}/orders", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.token.expose_secret())
            .json(&order)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = %status, "PagBank create order response");

        if !status.is_success() {
            let message = Self::rejection_message(&body);
            tracing::warn!(status = %status, message = %message, "PagBank rejected order");
            return Ok(CheckoutResult::Rejected { message });
        }

        let order: OrderResponse = serde_json::from_str(&body)?;
        let qr = order
            .qr_codes
            .first()
            .ok_or_else(|| ProviderError::InvalidResponse("order has no qr_codes".into()))?;

        tracing::info!(
            order_id = %order.id,
            reference_id = %reference_id,
            amount_cents = request.amount_cents,
            "PagBank PIX order created"
        );

        Ok(CheckoutResult::Created {
            transaction_id: order.id,
            action: NextAction::Pix {
                pix: Self::pix_payload(qr),
            },
        })
    }

    async fn get_payment_status(
        &self,
        transaction_id: &str,
    ) -> Result<PaymentStatusSnapshot, ProviderError> {
        let url = format!("{}/orders/{}", self.config.api_base_url, transaction_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Unknown, not failed: the caller retries later.
            tracing::warn!(status = %status, transaction_id, "PagBank status fetch refused");
            return Err(ProviderError::InvalidResponse(format!(
                "status fetch refused with {}",
                status
            )));
        }

        let order: OrderResponse = serde_json::from_str(&body)?;
        let order_status = order
            .status
            .as_deref()
            .or_else(|| {
                order
                    .charges
                    .first()
                    .and_then(|charge| charge.status.as_deref())
            })
            .unwrap_or("WAITING");
        let amount_cents = order
            .qr_codes
            .first()
            .and_then(|qr| qr.amount.as_ref())
            .or_else(|| order.charges.first().and_then(|c| c.amount.as_ref()))
            .map(|amount| amount.value)
            .unwrap_or(0);

        let mut metadata = HashMap::new();
        if let Some(reference_id) = order.reference_id {
            metadata.insert("referenceId".to_string(), reference_id);
        }

        Ok(PaymentStatusSnapshot {
            status: Self::map_order_status(order_status),
            amount_cents,
            currency: "BRL".to_string(),
            metadata,
        })
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Option<WebhookEvent> {
        // The upstream integration accepted PagBank webhooks unauthenticated;
        // here they carry the same HMAC scheme as the other gateways, over a
        // dedicated secret.
        let valid =
            verify_hmac_sha256_hex(self.config.webhook_secret.expose_secret(), payload, signature)
                .unwrap_or(false);
        if !valid {
            tracing::warn!("PagBank webhook signature verification failed");
            return None;
        }

        let notification: WebhookPayload = serde_json::from_slice(payload).ok()?;
        let kind = match Self::map_order_status(&notification.status) {
            PaymentStatus::Succeeded => WebhookEventKind::PaymentSucceeded,
            PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Expired => {
                WebhookEventKind::PaymentFailed
            }
            PaymentStatus::Pending => {
                tracing::debug!(
                    status = %notification.status,
                    "Ignoring transitional PagBank webhook status"
                );
                return None;
            }
        };

        let amount = notification
            .charges
            .first()
            .and_then(|charge| charge.amount.as_ref())
            .map(|amount| EventAmount {
                amount_cents: amount.value,
                currency: "BRL".to_string(),
            });

        let mut metadata = HashMap::new();
        if let Some(reference_id) = notification.reference_id {
            metadata.insert("referenceId".to_string(), reference_id);
        }

        Some(WebhookEvent {
            kind,
            transaction_id: notification.id,
            amount,
            metadata,
        })
    }

    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount_cents: Option<i64>,
    ) -> Result<RefundResult, ProviderError> {
        // Refunds operate on charges; resolve the order's charge first.
        let url = format!("{}/orders/{}", self.config.api_base_url, transaction_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Ok(RefundResult::Rejected {
                message: Self::rejection_message(&body),
            });
        }

        let order: OrderResponse = serde_json::from_str(&body)?;
        let charge = match order.charges.first() {
            Some(charge) => charge,
            None => {
                return Ok(RefundResult::Rejected {
                    message: "order has no captured charge to refund".to_string(),
                })
            }
        };

        let value = match amount_cents {
            Some(amount) => amount,
            None => charge.amount.as_ref().map(|a| a.value).unwrap_or(0),
        };

        let url = format!("{}/charges/{}/cancel", self.config.api_base_url, charge.id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.token.expose_secret())
            .json(&serde_json::json!({ "amount": { "value": value } }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = Self::rejection_message(&body);
            tracing::warn!(status = %status, transaction_id, message = %message, "PagBank rejected refund");
            return Ok(RefundResult::Rejected { message });
        }

        let cancelled: ChargeResponse = serde_json::from_str(&body)?;
        tracing::info!(refund_id = %cancelled.id, transaction_id, "PagBank charge cancelled");
        Ok(RefundResult::Refunded {
            refund_id: cancelled.id,
        })
    }
}
