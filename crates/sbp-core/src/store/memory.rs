//! In-memory store for tests and embedded use. Single lock, clone-on-read.

use super::{merge_probe_result, unix_now, OutboundStore, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use sbp_types::{Outbound, ProbeResult, Subscription};
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    outbounds: HashMap<String, Outbound>,
    subscriptions: HashMap<i64, Subscription>,
    next_outbound_id: i64,
    next_subscription_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed helper for tests.
    pub fn with_outbounds(rows: impl IntoIterator<Item = Outbound>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for mut ob in rows {
                inner.next_outbound_id += 1;
                if ob.id == 0 {
                    ob.id = inner.next_outbound_id;
                }
                inner.outbounds.insert(ob.tag.clone(), ob);
            }
        }
        store
    }
}

#[async_trait]
impl OutboundStore for MemoryStore {
    async fn get_by_tag(&self, tag: &str) -> StoreResult<Option<Outbound>> {
        Ok(self.inner.read().outbounds.get(tag).cloned())
    }

    async fn list_all(&self) -> StoreResult<Vec<Outbound>> {
        Ok(self.inner.read().outbounds.values().cloned().collect())
    }

    async fn list_probeable(&self) -> StoreResult<Vec<Outbound>> {
        Ok(self
            .inner
            .read()
            .outbounds
            .values()
            .filter(|ob| !ob.kind.is_synthetic())
            .cloned()
            .collect())
    }

    async fn list_by_tags(&self, tags: &[String]) -> StoreResult<Vec<Outbound>> {
        let inner = self.inner.read();
        Ok(tags
            .iter()
            .filter_map(|t| inner.outbounds.get(t))
            .filter(|ob| !ob.kind.is_synthetic())
            .cloned()
            .collect())
    }

    async fn insert(&self, ob: &Outbound) -> StoreResult<i64> {
        let mut inner = self.inner.write();
        if inner.outbounds.contains_key(&ob.tag) {
            return Err(StoreError::DuplicateTag(ob.tag.clone()));
        }
        inner.next_outbound_id += 1;
        let id = inner.next_outbound_id;
        let mut row = ob.clone();
        row.id = id;
        inner.outbounds.insert(row.tag.clone(), row);
        Ok(id)
    }

    async fn update_config(&self, tag: &str, ob: &Outbound) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let mut row = inner.outbounds.remove(tag).ok_or(StoreError::NotFound)?;
        if ob.tag != tag && inner.outbounds.contains_key(&ob.tag) {
            // put the row back before bailing
            inner.outbounds.insert(tag.to_string(), row);
            return Err(StoreError::DuplicateTag(ob.tag.clone()));
        }
        row.tag = ob.tag.clone();
        row.kind = ob.kind;
        row.options = ob.options.clone();
        inner.outbounds.insert(row.tag.clone(), row);
        Ok(())
    }

    async fn delete(&self, tag: &str) -> StoreResult<bool> {
        Ok(self.inner.write().outbounds.remove(tag).is_some())
    }

    async fn apply_probe_update(&self, tag: &str, result: &ProbeResult) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if let Some(row) = inner.outbounds.get_mut(tag) {
            merge_probe_result(row, result);
        }
        Ok(())
    }

    async fn list_subscriptions(&self) -> StoreResult<Vec<Subscription>> {
        Ok(self.inner.read().subscriptions.values().cloned().collect())
    }

    async fn get_subscription(&self, id: i64) -> StoreResult<Option<Subscription>> {
        Ok(self.inner.read().subscriptions.get(&id).cloned())
    }

    async fn add_subscription(&self, sub: &Subscription) -> StoreResult<i64> {
        let mut inner = self.inner.write();
        inner.next_subscription_id += 1;
        let id = inner.next_subscription_id;
        let mut row = sub.clone();
        row.id = id;
        inner.subscriptions.insert(id, row);
        Ok(id)
    }

    async fn update_subscription(&self, sub: &Subscription) -> StoreResult<()> {
        let mut inner = self.inner.write();
        match inner.subscriptions.get_mut(&sub.id) {
            Some(row) => {
                *row = sub.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete_subscription(&self, id: i64) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.subscriptions.remove(&id);
        inner.outbounds.retain(|_, ob| ob.subscription_id != Some(id));
        Ok(())
    }

    async fn delete_by_subscription(&self, id: i64) -> StoreResult<()> {
        self.inner
            .write()
            .outbounds
            .retain(|_, ob| ob.subscription_id != Some(id));
        Ok(())
    }

    async fn mark_subscription_updated(&self, id: i64, node_count: i64) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if let Some(sub) = inner.subscriptions.get_mut(&id) {
            sub.last_update = unix_now();
            sub.node_count = node_count;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbp_types::{IpType, OutboundType};
    use serde_json::json;

    fn probe_ok(tag: &str) -> ProbeResult {
        ProbeResult {
            tag: tag.into(),
            server: "1.2.3.4".into(),
            port: 443,
            latency: 42,
            real_latency: 180,
            available: true,
            landing_ip: "203.0.113.9".into(),
            country: "DE".into(),
            region: "BY".into(),
            city: "Nuremberg".into(),
            isp: "Hetzner".into(),
            ip_type: Some(IpType::Hosting),
            fraud_score: 12,
            error: None,
        }
    }

    #[tokio::test]
    async fn probeable_excludes_synthetic_types() {
        let store = MemoryStore::with_outbounds([
            Outbound::new("a", OutboundType::Vmess, json!({})),
            Outbound::new("sel", OutboundType::Selector, json!({})),
            Outbound::new("d", OutboundType::Direct, json!({})),
            Outbound::new("u", OutboundType::Urltest, json!({})),
            Outbound::new("b", OutboundType::Block, json!({})),
            Outbound::new("dns", OutboundType::Dns, json!({})),
        ]);
        let rows = store.list_probeable().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tag, "a");
    }

    #[tokio::test]
    async fn list_by_tags_drops_missing_silently() {
        let store = MemoryStore::with_outbounds([Outbound::new(
            "a",
            OutboundType::Vmess,
            json!({}),
        )]);
        let rows = store
            .list_by_tags(&["a".into(), "ghost".into()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn merge_writes_enrichment_only_with_landing_ip() {
        let store = MemoryStore::with_outbounds([Outbound::new(
            "a",
            OutboundType::Vmess,
            json!({}),
        )]);
        store.apply_probe_update("a", &probe_ok("a")).await.unwrap();
        let row = store.get_by_tag("a").await.unwrap().unwrap();
        assert_eq!(row.country, "DE");
        assert_eq!(row.fraud_score, 12);
        assert_eq!(row.latency, 42);
        assert!(row.available);
        assert!(row.last_test_time > 0);

        // a later failed probe keeps the location and the fraud score
        let failed = ProbeResult {
            tag: "a".into(),
            latency: -1,
            available: false,
            ..ProbeResult::new("a")
        };
        store.apply_probe_update("a", &failed).await.unwrap();
        let row = store.get_by_tag("a").await.unwrap().unwrap();
        assert!(!row.available);
        assert_eq!(row.latency, -1);
        assert_eq!(row.country, "DE");
        assert_eq!(row.landing_ip, "203.0.113.9");
        assert_eq!(row.fraud_score, 12);
    }

    #[tokio::test]
    async fn merge_on_deleted_row_is_noop() {
        let store = MemoryStore::new();
        assert!(store.apply_probe_update("gone", &probe_ok("gone")).await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_tags_rejected() {
        let store = MemoryStore::new();
        store
            .insert(&Outbound::new("a", OutboundType::Vmess, json!({})))
            .await
            .unwrap();
        assert!(matches!(
            store
                .insert(&Outbound::new("a", OutboundType::Vless, json!({})))
                .await,
            Err(StoreError::DuplicateTag(_))
        ));
    }

    #[tokio::test]
    async fn subscription_cascade_delete() {
        let store = MemoryStore::new();
        let sub_id = store
            .add_subscription(&Subscription {
                id: 0,
                name: "feed".into(),
                url: "https://example.com/sub".into(),
                enabled: true,
                update_interval: 60,
                update_mode: Default::default(),
                last_update: 0,
                node_count: 0,
            })
            .await
            .unwrap();
        let mut ob = Outbound::new("[feed] n1", OutboundType::Vmess, json!({}));
        ob.subscription_id = Some(sub_id);
        store.insert(&ob).await.unwrap();
        store.insert(&Outbound::new("manual", OutboundType::Vmess, json!({}))).await.unwrap();

        store.delete_subscription(sub_id).await.unwrap();
        assert!(store.get_by_tag("[feed] n1").await.unwrap().is_none());
        assert!(store.get_by_tag("manual").await.unwrap().is_some());
    }
}
