//! SQLite-backed store. Schema is bootstrapped on open; all queries are
//! plain prepared statements so the crate builds without a live database.

use super::{
    unix_now, update_mode_from_str, update_mode_str, OutboundStore, StoreError, StoreResult,
};
use async_trait::async_trait;
use sbp_types::{IpType, Outbound, OutboundType, ProbeResult, Subscription};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS outbounds(
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    tag             TEXT NOT NULL UNIQUE,
    type            TEXT NOT NULL,
    options         TEXT NOT NULL DEFAULT '{}',
    landing_ip      TEXT NOT NULL DEFAULT '',
    country         TEXT NOT NULL DEFAULT '',
    region          TEXT NOT NULL DEFAULT '',
    city            TEXT NOT NULL DEFAULT '',
    isp             TEXT NOT NULL DEFAULT '',
    ip_type         TEXT NOT NULL DEFAULT '',
    fraud_score     INTEGER NOT NULL DEFAULT 0,
    available       INTEGER NOT NULL DEFAULT 0,
    last_test_time  INTEGER NOT NULL DEFAULT 0,
    latency         INTEGER NOT NULL DEFAULT 0,
    real_latency    INTEGER NOT NULL DEFAULT 0,
    subscription_id INTEGER
);
CREATE TABLE IF NOT EXISTS subscriptions(
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    url             TEXT NOT NULL,
    enabled         INTEGER NOT NULL DEFAULT 1,
    update_interval INTEGER NOT NULL DEFAULT 0,
    update_mode     TEXT NOT NULL DEFAULT 'replace',
    last_update     INTEGER NOT NULL DEFAULT 0,
    node_count      INTEGER NOT NULL DEFAULT 0
);
"#;

const SYNTHETIC_FILTER: &str = "type NOT IN ('direct','block','selector','urltest','dns')";

const OUTBOUND_COLS: &str = "id, tag, type, options, landing_ip, country, region, city, isp, \
     ip_type, fraud_score, available, last_test_time, latency, real_latency, subscription_id";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the panel database and run the schema.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Db(e.to_string())
    }
}

fn outbound_from_row(row: &SqliteRow) -> StoreResult<Outbound> {
    let kind_s: String = row.try_get("type")?;
    let kind = OutboundType::from_str(&kind_s).map_err(StoreError::Db)?;
    let options_s: String = row.try_get("options")?;
    let options = serde_json::from_str(&options_s).unwrap_or(serde_json::Value::Null);
    let ip_type_s: String = row.try_get("ip_type")?;
    let fraud: i64 = row.try_get("fraud_score")?;
    Ok(Outbound {
        id: row.try_get("id")?,
        tag: row.try_get("tag")?,
        kind,
        options,
        landing_ip: row.try_get("landing_ip")?,
        country: row.try_get("country")?,
        region: row.try_get("region")?,
        city: row.try_get("city")?,
        isp: row.try_get("isp")?,
        ip_type: IpType::from_str(&ip_type_s).ok(),
        fraud_score: fraud.clamp(0, 100) as u8,
        available: row.try_get("available")?,
        last_test_time: row.try_get("last_test_time")?,
        latency: row.try_get("latency")?,
        real_latency: row.try_get("real_latency")?,
        subscription_id: row.try_get("subscription_id")?,
    })
}

fn subscription_from_row(row: &SqliteRow) -> StoreResult<Subscription> {
    let mode_s: String = row.try_get("update_mode")?;
    Ok(Subscription {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        enabled: row.try_get("enabled")?,
        update_interval: row.try_get("update_interval")?,
        update_mode: update_mode_from_str(&mode_s),
        last_update: row.try_get("last_update")?,
        node_count: row.try_get("node_count")?,
    })
}

#[async_trait]
impl OutboundStore for SqliteStore {
    async fn get_by_tag(&self, tag: &str) -> StoreResult<Option<Outbound>> {
        let row = sqlx::query(&format!(
            "SELECT {OUTBOUND_COLS} FROM outbounds WHERE tag = ?1"
        ))
        .bind(tag)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(outbound_from_row).transpose()
    }

    async fn list_all(&self) -> StoreResult<Vec<Outbound>> {
        let rows = sqlx::query(&format!("SELECT {OUTBOUND_COLS} FROM outbounds ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(outbound_from_row).collect()
    }

    async fn list_probeable(&self) -> StoreResult<Vec<Outbound>> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOUND_COLS} FROM outbounds WHERE {SYNTHETIC_FILTER} ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(outbound_from_row).collect()
    }

    async fn list_by_tags(&self, tags: &[String]) -> StoreResult<Vec<Outbound>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; tags.len()].join(",");
        let sql = format!(
            "SELECT {OUTBOUND_COLS} FROM outbounds WHERE tag IN ({placeholders}) AND {SYNTHETIC_FILTER}"
        );
        let mut query = sqlx::query(&sql);
        for tag in tags {
            query = query.bind(tag);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(outbound_from_row).collect()
    }

    async fn insert(&self, ob: &Outbound) -> StoreResult<i64> {
        let options = serde_json::to_string(&ob.options).unwrap_or_else(|_| "{}".into());
        let res = sqlx::query(
            "INSERT INTO outbounds(tag, type, options, subscription_id) VALUES(?1, ?2, ?3, ?4)",
        )
        .bind(&ob.tag)
        .bind(ob.kind.as_str())
        .bind(options)
        .bind(ob.subscription_id)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::DuplicateTag(ob.tag.clone())
            }
            other => other.into(),
        })?;
        Ok(res.last_insert_rowid())
    }

    async fn update_config(&self, tag: &str, ob: &Outbound) -> StoreResult<()> {
        let options = serde_json::to_string(&ob.options).unwrap_or_else(|_| "{}".into());
        let res = sqlx::query("UPDATE outbounds SET tag = ?1, type = ?2, options = ?3 WHERE tag = ?4")
            .bind(&ob.tag)
            .bind(ob.kind.as_str())
            .bind(options)
            .bind(tag)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    StoreError::DuplicateTag(ob.tag.clone())
                }
                other => other.into(),
            })?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, tag: &str) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM outbounds WHERE tag = ?1")
            .bind(tag)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn apply_probe_update(&self, tag: &str, result: &ProbeResult) -> StoreResult<()> {
        let now = unix_now();
        if result.landing_ip.is_empty() {
            sqlx::query(
                "UPDATE outbounds SET last_test_time = ?1, available = ?2, latency = ?3, \
                 real_latency = ?4 WHERE tag = ?5",
            )
            .bind(now)
            .bind(result.available)
            .bind(result.latency)
            .bind(result.real_latency)
            .bind(tag)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE outbounds SET last_test_time = ?1, available = ?2, latency = ?3, \
                 real_latency = ?4, landing_ip = ?5, country = ?6, region = ?7, city = ?8, \
                 isp = ?9, ip_type = ?10, fraud_score = ?11 WHERE tag = ?12",
            )
            .bind(now)
            .bind(result.available)
            .bind(result.latency)
            .bind(result.real_latency)
            .bind(&result.landing_ip)
            .bind(&result.country)
            .bind(&result.region)
            .bind(&result.city)
            .bind(&result.isp)
            .bind(result.ip_type.map(|t| t.to_string()).unwrap_or_default())
            .bind(result.fraud_score as i64)
            .bind(tag)
            .execute(&self.pool)
            .await?;
        }
        // rows_affected == 0 means the row vanished mid-probe: fine.
        Ok(())
    }

    async fn list_subscriptions(&self) -> StoreResult<Vec<Subscription>> {
        let rows = sqlx::query("SELECT * FROM subscriptions ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(subscription_from_row).collect()
    }

    async fn get_subscription(&self, id: i64) -> StoreResult<Option<Subscription>> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn add_subscription(&self, sub: &Subscription) -> StoreResult<i64> {
        let res = sqlx::query(
            "INSERT INTO subscriptions(name, url, enabled, update_interval, update_mode) \
             VALUES(?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&sub.name)
        .bind(&sub.url)
        .bind(sub.enabled)
        .bind(sub.update_interval)
        .bind(update_mode_str(sub.update_mode))
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    async fn update_subscription(&self, sub: &Subscription) -> StoreResult<()> {
        let res = sqlx::query(
            "UPDATE subscriptions SET name = ?1, url = ?2, enabled = ?3, update_interval = ?4, \
             update_mode = ?5 WHERE id = ?6",
        )
        .bind(&sub.name)
        .bind(&sub.url)
        .bind(sub.enabled)
        .bind(sub.update_interval)
        .bind(update_mode_str(sub.update_mode))
        .bind(sub.id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_subscription(&self, id: i64) -> StoreResult<()> {
        self.delete_by_subscription(id).await?;
        sqlx::query("DELETE FROM subscriptions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_subscription(&self, id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM outbounds WHERE subscription_id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_subscription_updated(&self, id: i64, node_count: i64) -> StoreResult<()> {
        sqlx::query("UPDATE subscriptions SET last_update = ?1, node_count = ?2 WHERE id = ?3")
            .bind(unix_now())
            .bind(node_count)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbp_types::OutboundType;
    use serde_json::json;

    #[tokio::test]
    async fn roundtrip_row() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let mut ob = Outbound::new(
            "n1",
            OutboundType::Vless,
            json!({"server": "a.example.com", "server_port": 443, "uuid": "x"}),
        );
        let id = store.insert(&ob).await.unwrap();
        ob.id = id;

        let got = store.get_by_tag("n1").await.unwrap().unwrap();
        assert_eq!(got.id, id);
        assert_eq!(got.kind, OutboundType::Vless);
        assert_eq!(got.server(), Some("a.example.com"));
        assert!(got.ip_type.is_none());
    }

    #[tokio::test]
    async fn probe_update_merges_and_survives_delete_race() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store
            .insert(&Outbound::new("n1", OutboundType::Vmess, json!({})))
            .await
            .unwrap();

        let mut result = ProbeResult::new("n1");
        result.available = true;
        result.latency = 37;
        result.landing_ip = "203.0.113.9".into();
        result.country = "DE".into();
        result.ip_type = Some(IpType::Hosting);
        result.fraud_score = 8;
        store.apply_probe_update("n1", &result).await.unwrap();

        let row = store.get_by_tag("n1").await.unwrap().unwrap();
        assert!(row.available);
        assert_eq!(row.latency, 37);
        assert_eq!(row.country, "DE");
        assert_eq!(row.ip_type, Some(IpType::Hosting));
        assert_eq!(row.fraud_score, 8);

        // deleted row: silent no-op
        assert!(store.delete("n1").await.unwrap());
        assert!(store.apply_probe_update("n1", &result).await.is_ok());
    }

    #[tokio::test]
    async fn failed_probe_preserves_location_columns() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store
            .insert(&Outbound::new("n1", OutboundType::Vmess, json!({})))
            .await
            .unwrap();

        let mut ok = ProbeResult::new("n1");
        ok.available = true;
        ok.latency = 10;
        ok.landing_ip = "203.0.113.9".into();
        ok.city = "Nuremberg".into();
        ok.fraud_score = 20;
        store.apply_probe_update("n1", &ok).await.unwrap();

        let mut failed = ProbeResult::new("n1");
        failed.available = false;
        failed.latency = -1;
        store.apply_probe_update("n1", &failed).await.unwrap();

        let row = store.get_by_tag("n1").await.unwrap().unwrap();
        assert!(!row.available);
        assert_eq!(row.latency, -1);
        assert_eq!(row.city, "Nuremberg");
        assert_eq!(row.landing_ip, "203.0.113.9");
        assert_eq!(row.fraud_score, 20);
    }

    #[tokio::test]
    async fn tag_filters_and_unique_violation() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store
            .insert(&Outbound::new("a", OutboundType::Vmess, json!({})))
            .await
            .unwrap();
        store
            .insert(&Outbound::new("sel", OutboundType::Selector, json!({})))
            .await
            .unwrap();

        assert!(matches!(
            store
                .insert(&Outbound::new("a", OutboundType::Vless, json!({})))
                .await,
            Err(StoreError::DuplicateTag(_))
        ));

        let rows = store.list_probeable().await.unwrap();
        assert_eq!(rows.len(), 1);
        let rows = store
            .list_by_tags(&["a".into(), "sel".into(), "nope".into()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tag, "a");
    }
}
