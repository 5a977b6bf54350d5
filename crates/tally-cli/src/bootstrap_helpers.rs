//! Process-level setup shared by every `tally` invocation.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Initializes compact stderr tracing, honoring `RUST_LOG` overrides
/// and defaulting to warnings.
pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
