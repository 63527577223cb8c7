//! platform-core: Shared infrastructure for platform services.
pub mod error;
pub mod middleware;
pub mod signature;

pub use axum;
pub use serde;
pub use serde_json;
pub use tracing;
pub use validator;
