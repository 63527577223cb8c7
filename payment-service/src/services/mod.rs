pub mod dedup;
pub mod metrics;
pub mod reconciler;
pub mod refunds;
pub mod repository;

pub use dedup::WebhookDedup;
pub use metrics::{get_metrics, init_metrics};
pub use reconciler::{ReconcileOutcome, WebhookReconciler};
pub use refunds::{RefundOrchestrator, RefundOutcome};
pub use repository::{InMemoryPaymentStore, PaymentStore, TransitionOutcome};
