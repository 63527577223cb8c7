pub mod config;
pub mod handlers;
pub mod models;
pub mod providers;
pub mod services;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use platform_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use config::Config;
use providers::{build_provider, PaymentProvider};
use services::{
    InMemoryPaymentStore, PaymentStore, RefundOrchestrator, WebhookDedup, WebhookReconciler,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub provider: Arc<dyn PaymentProvider>,
    pub store: Arc<dyn PaymentStore>,
    pub reconciler: Arc<WebhookReconciler>,
    pub refunds: Arc<RefundOrchestrator>,
}

pub struct Application {
    listener: TcpListener,
    port: u16,
    router: Router,
}

impl Application {
    /// Wire the configured provider, stores, and router, and bind the
    /// listener. Binding here lets tests ask for port 0 and read the real
    /// port back before the server runs.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let provider = build_provider(&config)?;

        let store: Arc<dyn PaymentStore> = Arc::new(InMemoryPaymentStore::new());
        let dedup = Arc::new(WebhookDedup::new(config.webhook_dedup_retention));
        let reconciler = Arc::new(WebhookReconciler::new(
            provider.clone(),
            store.clone(),
            dedup,
        ));
        let refunds = Arc::new(RefundOrchestrator::new(provider.clone(), store.clone()));

        let state = AppState {
            config: Arc::new(config.clone()),
            provider,
            store,
            reconciler,
            refunds,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/metrics", get(handlers::metrics))
            .route("/payments/checkout", post(handlers::payments::create_checkout))
            .route(
                "/payments/:id/status",
                get(handlers::payments::get_payment_status),
            )
            .route(
                "/payments/:id/refund",
                post(handlers::payments::refund_payment),
            )
            .route("/webhooks/payments", post(handlers::webhooks::receive_webhook))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            listener,
            port,
            router,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("Listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
