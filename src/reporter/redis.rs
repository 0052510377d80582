use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;

use super::Sink;
use crate::error::Result;
use crate::metrics::RegistrySnapshot;

/// Keeps the latest snapshot in Redis.
///
/// Each export replaces the hash `{namespace}:metrics` (metric name → JSON
/// reading) and sets `{namespace}:taken_at` to the RFC 3339 snapshot time, in a
/// single MULTI/EXEC so readers never see half a snapshot.
///
/// The connection is opened by the first export. A server that is down only
/// fails that export; the next one tries to connect again.
pub struct RedisSink {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    namespace: String,
}

impl RedisSink {
    /// Parses `url` without connecting.
    pub fn new(url: &str, namespace: String) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            conn: OnceCell::new(),
            namespace,
        })
    }

    /// Connects now instead of on the first export.
    pub async fn connect(url: &str, namespace: String) -> Result<Self> {
        let sink = Self::new(url, namespace)?;
        sink.connection().await?;
        Ok(sink)
    }

    /// The shared `ConnectionManager`, which reconnects on its own once
    /// established.
    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(conn.clone())
    }

    fn metrics_key(&self) -> String {
        format!("{}:metrics", self.namespace)
    }

    fn taken_at_key(&self) -> String {
        format!("{}:taken_at", self.namespace)
    }
}

/// Hash entries for one snapshot.
pub(crate) fn hash_fields(snapshot: &RegistrySnapshot) -> Result<Vec<(String, String)>> {
    snapshot
        .metrics
        .iter()
        .map(|(name, value)| -> Result<(String, String)> {
            Ok((name.clone(), serde_json::to_string(value)?))
        })
        .collect()
}

#[async_trait]
impl Sink for RedisSink {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn export(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        let fields = hash_fields(snapshot)?;
        let metrics_key = self.metrics_key();

        let mut pipe = redis::pipe();
        pipe.atomic().del(&metrics_key).ignore();
        if !fields.is_empty() {
            pipe.hset_multiple(&metrics_key, fields.as_slice()).ignore();
        }
        pipe.set(self.taken_at_key(), snapshot.taken_at.to_rfc3339())
            .ignore();

        let mut conn = self.connection().await?;
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}
