//! Tracing setup for the appview process.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing from `RUST_LOG`, defaulting to info for this stack.
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skiff=info,skiff_appview=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
