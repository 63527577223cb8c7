use crate::providers::ProviderKind;
use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use secrecy::Secret;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderKind,
    pub default_currency: String,
    /// Bounded timeout applied to every outbound gateway call.
    pub gateway_timeout: Duration,
    /// Retention window for the inbound webhook dedup ledger.
    pub webhook_dedup_retention: Duration,
    pub stripe: StripeConfig,
    pub mercado_pago: MercadoPagoConfig,
    pub pagbank: PagBankConfig,
    pub service_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct MercadoPagoConfig {
    pub access_token: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct PagBankConfig {
    pub token: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("PAYMENT_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PAYMENT_SERVICE_PORT")
            .unwrap_or_else(|_| "3003".to_string())
            .parse()?;

        // Fail fast on an unrecognized selector instead of at first use.
        let provider: ProviderKind = env::var("PAYMENT_PROVIDER")
            .unwrap_or_else(|_| "stripe".to_string())
            .parse()
            .map_err(|e: String| anyhow!(e))?;

        let default_currency =
            env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "BRL".to_string());

        let gateway_timeout_secs: u64 = env::var("GATEWAY_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()?;

        let dedup_retention_secs: u64 = env::var("WEBHOOK_DEDUP_RETENTION_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()?;

        Ok(Self {
            server: ServerConfig { host, port },
            provider,
            default_currency,
            gateway_timeout: Duration::from_secs(gateway_timeout_secs),
            webhook_dedup_retention: Duration::from_secs(dedup_retention_secs),
            stripe: StripeConfig {
                secret_key: Secret::new(env::var("STRIPE_SECRET_KEY").unwrap_or_default()),
                webhook_secret: Secret::new(
                    env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
                ),
                api_base_url: env::var("STRIPE_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            },
            mercado_pago: MercadoPagoConfig {
                access_token: Secret::new(env::var("MP_ACCESS_TOKEN").unwrap_or_default()),
                webhook_secret: Secret::new(env::var("MP_WEBHOOK_SECRET").unwrap_or_default()),
                api_base_url: env::var("MP_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
            },
            pagbank: PagBankConfig {
                token: Secret::new(env::var("PAGBANK_TOKEN").unwrap_or_default()),
                webhook_secret: Secret::new(
                    env::var("PAGBANK_WEBHOOK_SECRET").unwrap_or_default(),
                ),
                api_base_url: env::var("PAGBANK_API_BASE_URL")
                    .unwrap_or_else(|_| "https://sandbox.api.pagseguro.com".to_string()),
            },
            service_name: "payment-service".to_string(),
        })
    }
}
