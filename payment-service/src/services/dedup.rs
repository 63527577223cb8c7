//! Short-retention dedup ledger for inbound webhook deliveries.
//!
//! Gateways retry on anything other than a 2xx, so the same notification can
//! arrive many times. Entries are keyed by (provider, transaction id, event
//! kind) and expire after the configured retention window; expired entries
//! are swept opportunistically on record.

use crate::models::WebhookEventKind;
use crate::providers::ProviderKind;
use dashmap::DashMap;
use std::time::{Duration, Instant};

pub struct WebhookDedup {
    seen: DashMap<String, Instant>,
    retention: Duration,
}

impl WebhookDedup {
    pub fn new(retention: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            retention,
        }
    }

    fn key(
        provider: ProviderKind,
        transaction_id: &str,
        kind: WebhookEventKind,
    ) -> String {
        format!("{}:{}:{}", provider, transaction_id, kind.as_str())
    }

    /// Whether this event was already processed inside the retention window.
    pub fn is_duplicate(
        &self,
        provider: ProviderKind,
        transaction_id: &str,
        kind: WebhookEventKind,
    ) -> bool {
        match self.seen.get(&Self::key(provider, transaction_id, kind)) {
            Some(recorded) => recorded.elapsed() < self.retention,
            None => false,
        }
    }

    /// Record a processed event. Called only after the event was applied, so
    /// a delivery that failed mid-flight is still retried by the gateway.
    pub fn record(
        &self,
        provider: ProviderKind,
        transaction_id: &str,
        kind: WebhookEventKind,
    ) {
        let now = Instant::now();
        self.seen
            .retain(|_, recorded| now.duration_since(*recorded) < self.retention);
        self.seen
            .insert(Self::key(provider, transaction_id, kind), now);
    }
}
