//! Network cache adapter.
//!
//! [`RemoteCacheClient`] is the byte-level capability of a memcached-style
//! server. [`RemoteCacheAdapter`] puts JSON encoding and TTL conversion on top
//! of it. Client errors pass through untouched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use strata_core::{CacheConfig, CacheError, StrataResult};

use super::traits::CacheAdapter;

/// Longest relative expiry a memcached server accepts, in seconds.
/// Anything longer is read as an absolute unix timestamp.
pub const MAX_RELATIVE_TTL_SECS: u64 = 60 * 60 * 24 * 30;

/// Byte-level client for an external cache server.
#[async_trait]
pub trait RemoteCacheClient: Send + Sync {
    async fn connect(&self) -> StrataResult<()>;

    async fn get(&self, key: &str) -> StrataResult<Option<Vec<u8>>>;

    /// `expiry` is in server units: `0` for none, seconds up to
    /// [`MAX_RELATIVE_TTL_SECS`], otherwise a unix timestamp.
    async fn set(&self, key: &str, value: Vec<u8>, expiry: u32) -> StrataResult<()>;

    async fn delete(&self, key: &str) -> StrataResult<()>;

    async fn disconnect(&self) -> StrataResult<()>;
}

/// Builds clients for a memcached cache configuration.
pub trait RemoteCacheConnector: Send + Sync {
    fn client(&self, config: &CacheConfig) -> StrataResult<Arc<dyn RemoteCacheClient>>;
}

/// Convert a TTL to the server's expiry encoding.
///
/// The server counts whole seconds, so a non-zero TTL is rounded up rather
/// than truncated into `0` (no expiry).
pub fn expiry_for(ttl: Duration, now_unix: u64) -> StrataResult<u32> {
    let mut secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs = secs.saturating_add(1);
    }
    let expiry = if secs > MAX_RELATIVE_TTL_SECS {
        now_unix.saturating_add(secs)
    } else {
        secs
    };
    u32::try_from(expiry).map_err(|_| {
        CacheError::Backend {
            reason: format!("ttl of {secs}s does not fit the server expiry range"),
        }
        .into()
    })
}

fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// [`CacheAdapter`] over a [`RemoteCacheClient`].
pub struct RemoteCacheAdapter {
    client: Arc<dyn RemoteCacheClient>,
}

impl RemoteCacheAdapter {
    pub fn new(client: Arc<dyn RemoteCacheClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn RemoteCacheClient> {
        &self.client
    }
}

#[async_trait]
impl CacheAdapter for RemoteCacheAdapter {
    async fn init(&self) -> StrataResult<()> {
        self.client.connect().await
    }

    async fn has(&self, key: &str) -> StrataResult<bool> {
        Ok(self.client.get(key).await?.is_some())
    }

    async fn get(&self, key: &str) -> StrataResult<Option<Value>> {
        let Some(bytes) = self.client.get(key).await? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> StrataResult<()> {
        let bytes = serde_json::to_vec(&value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let expiry = expiry_for(ttl, now_unix())?;
        self.client.set(key, bytes, expiry).await
    }

    async fn delete(&self, key: &str) -> StrataResult<()> {
        self.client.delete(key).await
    }

    async fn close(&self) -> StrataResult<()> {
        self.client.disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use strata_core::StrataError;

    #[derive(Default)]
    struct RecordingClient {
        entries: Mutex<HashMap<String, (Vec<u8>, u32)>>,
        failing: bool,
    }

    #[async_trait]
    impl RemoteCacheClient for RecordingClient {
        async fn connect(&self) -> StrataResult<()> {
            Ok(())
        }

        async fn get(&self, key: &str) -> StrataResult<Option<Vec<u8>>> {
            if self.failing {
                return Err(CacheError::Backend {
                    reason: "connection reset".to_string(),
                }
                .into());
            }
            Ok(self.entries.lock().unwrap().get(key).map(|(v, _)| v.clone()))
        }

        async fn set(&self, key: &str, value: Vec<u8>, expiry: u32) -> StrataResult<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value, expiry));
            Ok(())
        }

        async fn delete(&self, key: &str) -> StrataResult<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }

        async fn disconnect(&self) -> StrataResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_expiry_relative_and_absolute() {
        assert_eq!(expiry_for(Duration::ZERO, 1_000).unwrap(), 0);
        assert_eq!(expiry_for(Duration::from_secs(60), 1_000).unwrap(), 60);
        assert_eq!(
            expiry_for(Duration::from_secs(MAX_RELATIVE_TTL_SECS), 1_000).unwrap(),
            MAX_RELATIVE_TTL_SECS as u32
        );
        assert_eq!(
            expiry_for(Duration::from_secs(MAX_RELATIVE_TTL_SECS + 1), 1_000).unwrap(),
            (1_000 + MAX_RELATIVE_TTL_SECS + 1) as u32
        );
        assert!(expiry_for(Duration::from_secs(u64::MAX / 2), 1_000).is_err());
    }

    #[test]
    fn test_sub_second_ttl_rounds_up() {
        assert_eq!(expiry_for(Duration::from_millis(500), 1_000).unwrap(), 1);
        assert_eq!(expiry_for(Duration::from_nanos(1), 1_000).unwrap(), 1);
        assert_eq!(expiry_for(Duration::from_millis(1_500), 1_000).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fixed_sub_second_ttl_reaches_client_as_expiring() {
        use crate::cache::{Cache, TtlPolicy};

        let client = Arc::new(RecordingClient::default());
        let cache = Cache::new(
            Arc::new(RemoteCacheAdapter::new(client.clone())),
            "p",
            Duration::from_secs(60),
        );
        let memo = cache.memoize("X", "brief", TtlPolicy::Fixed(Duration::from_millis(500)));
        let _: u8 = memo.call(&[], || async { Ok(1) }).await.unwrap();

        let (_, expiry) = client
            .entries
            .lock()
            .unwrap()
            .get(&memo.key(&[]))
            .cloned()
            .unwrap();
        assert_eq!(expiry, 1);
    }

    #[tokio::test]
    async fn test_values_round_trip_as_json() {
        let client = Arc::new(RecordingClient::default());
        let adapter = RemoteCacheAdapter::new(client.clone());

        adapter
            .set("k", json!({"n": [1, 2]}), Duration::from_secs(30))
            .await
            .unwrap();
        assert!(adapter.has("k").await.unwrap());
        assert_eq!(adapter.get("k").await.unwrap(), Some(json!({"n": [1, 2]})));

        let (bytes, expiry) = client.entries.lock().unwrap().get("k").cloned().unwrap();
        assert_eq!(bytes, br#"{"n":[1,2]}"#.to_vec());
        assert_eq!(expiry, 30);

        adapter.delete("k").await.unwrap();
        assert_eq!(adapter.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_client_errors_propagate() {
        let adapter = RemoteCacheAdapter::new(Arc::new(RecordingClient {
            failing: true,
            ..Default::default()
        }));
        let err = adapter.get("k").await.unwrap_err();
        assert_eq!(
            err,
            StrataError::Cache(CacheError::Backend {
                reason: "connection reset".to_string()
            })
        );
        assert!(adapter.has("k").await.is_err());
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_a_serialization_error() {
        let client = Arc::new(RecordingClient::default());
        client
            .entries
            .lock()
            .unwrap()
            .insert("k".to_string(), (b"not json".to_vec(), 0));
        let adapter = RemoteCacheAdapter::new(client);
        assert!(matches!(
            adapter.get("k").await,
            Err(StrataError::Cache(CacheError::Serialization { .. }))
        ));
    }
}
