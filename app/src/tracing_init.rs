use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING: OnceLock<()> = OnceLock::new();

/// Initialize tracing once, safe to call multiple times. `RUST_LOG` wins
/// over the CLI default; `SBP_TRACING_FORMAT=json` switches to JSON lines.
pub fn init_tracing_once(default_filter: &str) {
    let default_filter = default_filter.to_string();
    TRACING.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        let json = std::env::var("SBP_TRACING_FORMAT")
            .map(|v| v == "json")
            .unwrap_or(false);
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true);
        let _ = if json {
            builder.json().try_init()
        } else {
            builder.compact().try_init()
        };
    });
}
