//! Subscription refresh: download, parse, import.
//!
//! `replace` mode drops the subscription's previous rows before importing;
//! `incremental` keeps existing tags and only adds new ones. Per-entry
//! failures are reported, never fatal.

use crate::state::AppState;
use anyhow::{Context, Result};
use sbp_types::{Outbound, Subscription, UpdateMode};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Default, Serialize)]
pub struct RefreshReport {
    pub success: i64,
    pub failed: i64,
    pub errors: Vec<String>,
}

pub async fn refresh_subscription(state: &AppState, sub: &Subscription) -> Result<RefreshReport> {
    let content = sbp_subscribe::fetch_subscription(&sub.url, state.insecure_subs)
        .await
        .context("failed to fetch subscription")?;
    let outcome = sbp_subscribe::parse_subscription(&content, &sub.name)
        .context("failed to parse subscription")?;

    if sub.update_mode == UpdateMode::Replace {
        state
            .store
            .delete_by_subscription(sub.id)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }

    let mut report = RefreshReport {
        failed: outcome.errors.len() as i64,
        errors: outcome.errors,
        ..Default::default()
    };

    for map in &outcome.outbounds {
        let mut ob = match Outbound::from_singbox(map) {
            Ok(ob) => ob,
            Err(e) => {
                report.failed += 1;
                report.errors.push(e);
                continue;
            }
        };
        ob.subscription_id = Some(sub.id);

        if sub.update_mode == UpdateMode::Incremental {
            match state.store.get_by_tag(&ob.tag).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(e.to_string());
                    continue;
                }
            }
        }

        match state.store.insert(&ob).await {
            Ok(_) => report.success += 1,
            Err(e) => {
                report.failed += 1;
                report.errors.push(format!("failed to create outbound: {e}"));
            }
        }
    }

    state
        .store
        .mark_subscription_updated(sub.id, report.success)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(
        subscription = %sub.name,
        imported = report.success,
        failed = report.failed,
        "subscription refreshed"
    );
    Ok(report)
}

/// Background ticker: refresh every enabled subscription whose interval
/// elapsed. Runs until the shutdown token trips.
pub fn spawn_auto_update(state: AppState, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let subs = match state.store.list_subscriptions().await {
                Ok(subs) => subs,
                Err(e) => {
                    warn!(error = %e, "auto-update: listing subscriptions failed");
                    continue;
                }
            };
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            for sub in subs {
                if !sub.enabled || sub.update_interval <= 0 {
                    continue;
                }
                if now - sub.last_update < sub.update_interval * 60 {
                    continue;
                }
                if let Err(e) = refresh_subscription(&state, &sub).await {
                    warn!(subscription = %sub.name, error = %e, "auto-update failed");
                }
            }
        }
    })
}
