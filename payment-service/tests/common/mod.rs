use payment_service::config::{
    Config, MercadoPagoConfig, PagBankConfig, ServerConfig, StripeConfig,
};
use payment_service::providers::ProviderKind;
use payment_service::Application;
use platform_core::signature::hmac_sha256_hex;
use secrecy::Secret;
use std::time::Duration;
use wiremock::MockServer;

pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test";
pub const MP_WEBHOOK_SECRET: &str = "mp_webhook_secret";
pub const PAGBANK_WEBHOOK_SECRET: &str = "pagbank_webhook_secret";

pub struct TestApp {
    pub address: String,
    /// Mocked gateway API; every provider base URL points here.
    pub gateway: MockServer,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn(provider: ProviderKind) -> Self {
        // A non-pooled server: dropping it actually closes the socket, which
        // the gateway-outage test relies on. Pooled servers (`start()`) keep
        // listening after drop and answer 404 instead.
        let gateway = MockServer::builder().start().await;

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Random port
            },
            provider,
            default_currency: "BRL".to_string(),
            gateway_timeout: Duration::from_secs(5),
            webhook_dedup_retention: Duration::from_secs(3600),
            stripe: StripeConfig {
                secret_key: Secret::new("sk_test_123".to_string()),
                webhook_secret: Secret::new(STRIPE_WEBHOOK_SECRET.to_string()),
                api_base_url: gateway.uri(),
            },
            mercado_pago: MercadoPagoConfig {
                access_token: Secret::new("TEST-token".to_string()),
                webhook_secret: Secret::new(MP_WEBHOOK_SECRET.to_string()),
                api_base_url: gateway.uri(),
            },
            pagbank: PagBankConfig {
                token: Secret::new("pagbank_token".to_string()),
                webhook_secret: Secret::new(PAGBANK_WEBHOOK_SECRET.to_string()),
                api_base_url: gateway.uri(),
            },
            service_name: "payment-service-test".to_string(),
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let address = format!("http://127.0.0.1:{}", app.port());

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        TestApp {
            address,
            gateway,
            client: reqwest::Client::new(),
        }
    }

    pub fn checkout_body() -> serde_json::Value {
        serde_json::json!({
            "amount_cents": 1999,
            "currency": "BRL",
            "description": "Donation",
            "buyer": {
                "name": "Maria Silva",
                "email": "maria@example.com",
                "tax_id": "123.456.789-09"
            },
            "metadata": { "donationId": "don_42" },
            "success_url": "https://example.com/success",
            "cancel_url": "https://example.com/cancel"
        })
    }

    pub async fn post_checkout(&self, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/payments/checkout", self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to execute checkout request")
    }

    pub async fn post_webhook(
        &self,
        header: &str,
        signature: &str,
        body: &str,
    ) -> reqwest::Response {
        self.client
            .post(format!("{}/webhooks/payments", self.address))
            .header(header, signature)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("Failed to execute webhook request")
    }

    pub async fn get_status(&self, payment_id: &str) -> reqwest::Response {
        self.client
            .get(format!("{}/payments/{}/status", self.address, payment_id))
            .send()
            .await
            .expect("Failed to execute status request")
    }
}

/// Build a `Stripe-Signature` header for the given payload, timestamped now.
pub fn stripe_signature(payload: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let mut signed = timestamp.to_string().into_bytes();
    signed.push(b'.');
    signed.extend_from_slice(payload.as_bytes());
    let signature = hmac_sha256_hex(STRIPE_WEBHOOK_SECRET, &signed).expect("hmac");
    format!("t={},v1={}", timestamp, signature)
}

pub fn hmac_signature(secret: &str, payload: &str) -> String {
    hmac_sha256_hex(secret, payload.as_bytes()).expect("hmac")
}
