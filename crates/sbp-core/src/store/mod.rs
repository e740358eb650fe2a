//! Outbound repository: the only way probe results reach persistent state.
//!
//! Probes address rows by tag and merge idempotently; a row deleted while
//! its probe was in flight makes the merge a silent no-op. Two
//! implementations ship: SQLite for the panel, in-memory for tests and
//! embedding.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use sbp_types::{Outbound, ProbeResult, Subscription, UpdateMode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("duplicate tag: {0}")]
    DuplicateTag(String),
    #[error("db: {0}")]
    Db(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait OutboundStore: Send + Sync {
    async fn get_by_tag(&self, tag: &str) -> StoreResult<Option<Outbound>>;

    async fn list_all(&self) -> StoreResult<Vec<Outbound>>;

    /// Rows eligible for probing: everything except the synthetic types.
    async fn list_probeable(&self) -> StoreResult<Vec<Outbound>>;

    /// Rows matching `tags`, synthetic types excluded. Missing tags are
    /// silently dropped; order is unspecified.
    async fn list_by_tags(&self, tags: &[String]) -> StoreResult<Vec<Outbound>>;

    /// Insert a new row; returns the assigned id.
    async fn insert(&self, ob: &Outbound) -> StoreResult<i64>;

    /// User edit of tag/type/options. Probe-derived fields are untouched.
    async fn update_config(
        &self,
        tag: &str,
        ob: &Outbound,
    ) -> StoreResult<()>;

    /// Returns whether a row was actually removed.
    async fn delete(&self, tag: &str) -> StoreResult<bool>;

    /// Merge a probe result into the row. Always refreshes
    /// `last_test_time`, `available` and both latencies; location, ISP,
    /// type and fraud score are written only when the probe discovered a
    /// landing IP, so a failed run never wipes the last known location.
    /// A concurrently deleted row is a no-op, not an error.
    async fn apply_probe_update(&self, tag: &str, result: &ProbeResult) -> StoreResult<()>;

    // -- subscriptions ----------------------------------------------------

    async fn list_subscriptions(&self) -> StoreResult<Vec<Subscription>>;

    async fn get_subscription(&self, id: i64) -> StoreResult<Option<Subscription>>;

    async fn add_subscription(&self, sub: &Subscription) -> StoreResult<i64>;

    async fn update_subscription(&self, sub: &Subscription) -> StoreResult<()>;

    /// Removes the subscription and every row imported from it.
    async fn delete_subscription(&self, id: i64) -> StoreResult<()>;

    /// Drop all rows imported from a subscription (`replace` refresh mode).
    async fn delete_by_subscription(&self, id: i64) -> StoreResult<()>;

    /// Stamp a finished refresh.
    async fn mark_subscription_updated(&self, id: i64, node_count: i64) -> StoreResult<()>;
}

pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub(crate) fn update_mode_str(mode: UpdateMode) -> &'static str {
    match mode {
        UpdateMode::Replace => "replace",
        UpdateMode::Incremental => "incremental",
    }
}

pub(crate) fn update_mode_from_str(s: &str) -> UpdateMode {
    match s {
        "incremental" => UpdateMode::Incremental,
        _ => UpdateMode::Replace,
    }
}

/// Shared merge rule used by both store implementations.
pub(crate) fn merge_probe_result(row: &mut Outbound, result: &ProbeResult) {
    row.last_test_time = unix_now();
    row.available = result.available;
    row.latency = result.latency;
    row.real_latency = result.real_latency;
    if !result.landing_ip.is_empty() {
        row.landing_ip = result.landing_ip.clone();
        row.country = result.country.clone();
        row.region = result.region.clone();
        row.city = result.city.clone();
        row.isp = result.isp.clone();
        row.ip_type = result.ip_type;
        row.fraud_score = result.fraud_score;
    }
}
