//! Log subscriber setup for the host app.

use tracing_subscriber::EnvFilter;

/// Filter used when the host passes an empty or invalid one.
pub const DEFAULT_LOG_FILTER: &str = "info,paciente_core=debug,paciente_classifier=debug";

/// Install a fmt subscriber. Later calls are no-ops.
pub fn init(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
    {
        tracing::info!("paciente core v{}", env!("CARGO_PKG_VERSION"));
    }
}
