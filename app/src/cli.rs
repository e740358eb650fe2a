use clap::Parser;

/// Proxy-node management panel: probing engine, subscription ingestion and
/// REST surface.
#[derive(Parser, Debug, Clone)]
#[command(name = "sbpanel", version, about)]
pub struct Cli {
    /// Listen address for the web API
    #[arg(long, env = "SBP_LISTEN", default_value = "0.0.0.0")]
    pub listen: String,

    /// Listen port
    #[arg(long, env = "SBP_PORT", default_value_t = 2095)]
    pub port: u16,

    /// SQLite database path
    #[arg(long, env = "SBP_DB", default_value = "sbpanel.db")]
    pub db: String,

    /// Log filter when RUST_LOG is unset
    #[arg(long, env = "SBP_LOG", default_value = "info")]
    pub log_level: String,

    /// Skip TLS verification when downloading subscriptions
    #[arg(long, env = "SBP_SUBS_INSECURE", default_value_t = false)]
    pub insecure_subs: bool,

    /// Disable the background subscription auto-updater
    #[arg(long, default_value_t = false)]
    pub no_auto_update: bool,
}
