use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::RelayError;

/// Remote list of extra admin ids. Reads and writes always move the whole list.
#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u64>>;
    async fn replace(&self, ids: &[u64]) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    record: serde_json::Value,
}

/// JSONBin v3 backed store: `GET {base}/b/{bin}/latest`, `PUT {base}/b/{bin}`.
pub struct JsonBinStore {
    client: reqwest::Client,
    config: StoreConfig,
}

impl JsonBinStore {
    pub fn new(config: StoreConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for admin store")?;
        Ok(Self { client, config })
    }

    fn bin_url(&self) -> String {
        format!("{}/b/{}", self.config.base_url, self.config.bin_id)
    }
}

/// Ids may come back as numbers or numeric strings; anything else is skipped.
fn parse_record(record: &serde_json::Value) -> Vec<u64> {
    let Some(items) = record.as_array() else {
        if !record.is_null() {
            warn!("Admin store record is not an array; treating as empty");
        }
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl AdminStore for JsonBinStore {
    async fn fetch(&self) -> Result<Vec<u64>> {
        let url = format!("{}/latest", self.bin_url());
        debug!("Fetching admin list from {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-Master-Key", &self.config.api_key)
            .send()
            .await
            .context("Failed to reach admin store")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Admin store error ({}): {}", status, body);
        }

        let latest: LatestResponse = response
            .json()
            .await
            .context("Failed to parse admin store response")?;

        Ok(parse_record(&latest.record))
    }

    async fn replace(&self, ids: &[u64]) -> Result<()> {
        let url = self.bin_url();
        debug!("Writing {} admin id(s) to {}", ids.len(), url);

        let response = self
            .client
            .put(&url)
            .header("X-Master-Key", &self.config.api_key)
            .json(&ids)
            .send()
            .await
            .context("Failed to reach admin store")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Admin store error ({}): {}", status, body);
        }

        Ok(())
    }
}

/// How trustworthy the admin set returned by [`AdminRegistry::get_admins`] is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Read from the remote store just now.
    Fresh,
    /// No store configured; owner-only by configuration.
    Disabled,
    /// The store could not be read; owner-only for this decision.
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSnapshot {
    pub ids: BTreeSet<u64>,
    pub freshness: Freshness,
}

impl AdminSnapshot {
    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }
}

/// Owner plus the remotely persisted admins. Holds no cache: every call goes
/// to the store so that additions are visible on the next message.
pub struct AdminRegistry {
    owner_id: u64,
    store: Option<Arc<dyn AdminStore>>,
}

impl AdminRegistry {
    pub fn new(owner_id: u64, store: Option<Arc<dyn AdminStore>>) -> Self {
        Self { owner_id, store }
    }

    pub fn is_owner(&self, id: u64) -> bool {
        id == self.owner_id
    }

    /// `{owner} ∪ remote`. Never fails; a store error degrades to owner-only.
    pub async fn get_admins(&self) -> AdminSnapshot {
        let mut ids = BTreeSet::from([self.owner_id]);

        let Some(store) = &self.store else {
            return AdminSnapshot {
                ids,
                freshness: Freshness::Disabled,
            };
        };

        match store.fetch().await {
            Ok(remote) => {
                ids.extend(remote);
                AdminSnapshot {
                    ids,
                    freshness: Freshness::Fresh,
                }
            }
            Err(e) => {
                warn!("Admin store unavailable, routing owner-only: {:#}", e);
                AdminSnapshot {
                    ids,
                    freshness: Freshness::Unavailable(format!("{:#}", e)),
                }
            }
        }
    }

    pub async fn list_admins(&self, caller: u64) -> Result<AdminSnapshot, RelayError> {
        self.ensure_owner(caller)?;
        Ok(self.get_admins().await)
    }

    /// Returns the resulting admin set. Adding an existing id still writes.
    pub async fn add_admin(&self, caller: u64, id: u64) -> Result<BTreeSet<u64>, RelayError> {
        self.ensure_owner(caller)?;
        let (store, mut remote) = self.read_for_update().await?;

        if !self.is_owner(id) {
            remote.insert(id);
        }
        self.write(store, &remote).await?;

        info!("Admin {} added by owner", id);
        Ok(self.with_owner(remote))
    }

    pub async fn remove_admin(&self, caller: u64, id: u64) -> Result<BTreeSet<u64>, RelayError> {
        self.ensure_owner(caller)?;
        if self.is_owner(id) {
            return Err(RelayError::OwnerImmutable);
        }
        let (store, mut remote) = self.read_for_update().await?;

        let existed = remote.remove(&id);
        self.write(store, &remote).await?;

        if existed {
            info!("Admin {} removed by owner", id);
        } else {
            debug!("Admin {} was not in the set", id);
        }
        Ok(self.with_owner(remote))
    }

    fn ensure_owner(&self, caller: u64) -> Result<(), RelayError> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(RelayError::NotOwner)
        }
    }

    // A failed read aborts the edit instead of replacing the remote list with a partial one.
    async fn read_for_update(&self) -> Result<(&Arc<dyn AdminStore>, BTreeSet<u64>), RelayError> {
        let store = self.store.as_ref().ok_or(RelayError::PersistenceDisabled)?;
        let remote = store
            .fetch()
            .await
            .map_err(|e| RelayError::RemoteStoreUnavailable(format!("{:#}", e)))?;

        let remote = remote
            .into_iter()
            .filter(|id| !self.is_owner(*id))
            .collect();
        Ok((store, remote))
    }

    async fn write(
        &self,
        store: &Arc<dyn AdminStore>,
        remote: &BTreeSet<u64>,
    ) -> Result<(), RelayError> {
        let ids: Vec<u64> = remote.iter().copied().collect();
        store.replace(&ids).await.map_err(|e| {
            warn!("Failed to persist admin list: {:#}", e);
            RelayError::RemoteStoreWriteFailed(format!("{:#}", e))
        })
    }

    fn with_owner(&self, mut remote: BTreeSet<u64>) -> BTreeSet<u64> {
        remote.insert(self.owner_id);
        remote
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::memory::MemoryStore;
    use super::*;

    const OWNER: u64 = 1;

    fn registry(store: &Arc<MemoryStore>) -> AdminRegistry {
        AdminRegistry::new(OWNER, Some(store.clone() as Arc<dyn AdminStore>))
    }

    #[tokio::test]
    async fn test_owner_always_admin() {
        let store = Arc::new(MemoryStore::default());
        let snapshot = registry(&store).get_admins().await;
        assert_eq!(snapshot.ids, BTreeSet::from([OWNER]));
        assert_eq!(snapshot.freshness, Freshness::Fresh);

        store.fail_reads.store(true, Ordering::SeqCst);
        let snapshot = registry(&store).get_admins().await;
        assert!(snapshot.contains(OWNER));
        assert_eq!(snapshot.ids.len(), 1);
        assert!(matches!(snapshot.freshness, Freshness::Unavailable(_)));

        let snapshot = AdminRegistry::new(OWNER, None).get_admins().await;
        assert_eq!(snapshot.ids, BTreeSet::from([OWNER]));
        assert_eq!(snapshot.freshness, Freshness::Disabled);
    }

    #[tokio::test]
    async fn test_remote_ids_are_merged() {
        let store = Arc::new(MemoryStore::with_ids(&[5, 6]));
        let snapshot = registry(&store).get_admins().await;
        assert_eq!(snapshot.ids, BTreeSet::from([OWNER, 5, 6]));
    }

    #[tokio::test]
    async fn test_add_is_idempotent_but_still_writes() {
        let store = Arc::new(MemoryStore::with_ids(&[5]));
        let admins = registry(&store);

        let set = admins.add_admin(OWNER, 5).await.unwrap();
        assert_eq!(set, BTreeSet::from([OWNER, 5]));
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);

        let set = admins.add_admin(OWNER, 9).await.unwrap();
        assert_eq!(set, BTreeSet::from([OWNER, 5, 9]));
        assert_eq!(*store.ids.lock().unwrap(), vec![5, 9]);
        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_adding_owner_does_not_persist_owner() {
        let store = Arc::new(MemoryStore::default());
        let set = registry(&store).add_admin(OWNER, OWNER).await.unwrap();
        assert_eq!(set, BTreeSet::from([OWNER]));
        assert!(store.ids.lock().unwrap().is_empty());
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_owner_rejected() {
        let store = Arc::new(MemoryStore::with_ids(&[OWNER, 5]));
        let err = registry(&store).remove_admin(OWNER, OWNER).await.unwrap_err();
        assert_eq!(err, RelayError::OwnerImmutable);
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);

        let empty = Arc::new(MemoryStore::default());
        let err = registry(&empty).remove_admin(OWNER, OWNER).await.unwrap_err();
        assert_eq!(err, RelayError::OwnerImmutable);
    }

    #[tokio::test]
    async fn test_remove_admin() {
        let store = Arc::new(MemoryStore::with_ids(&[5, 6]));
        let set = registry(&store).remove_admin(OWNER, 5).await.unwrap();
        assert_eq!(set, BTreeSet::from([OWNER, 6]));
        assert_eq!(*store.ids.lock().unwrap(), vec![6]);
    }

    #[tokio::test]
    async fn test_management_is_owner_only() {
        let store = Arc::new(MemoryStore::with_ids(&[5]));
        let admins = registry(&store);
        assert_eq!(admins.add_admin(5, 7).await.unwrap_err(), RelayError::NotOwner);
        assert_eq!(admins.remove_admin(5, 5).await.unwrap_err(), RelayError::NotOwner);
        assert_eq!(admins.list_admins(5).await.unwrap_err(), RelayError::NotOwner);
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
        assert!(admins.list_admins(OWNER).await.unwrap().contains(5));
    }

    #[tokio::test]
    async fn test_failed_write_is_not_remembered() {
        let store = Arc::new(MemoryStore::default());
        store.fail_writes.store(true, Ordering::SeqCst);
        let admins = registry(&store);

        let err = admins.add_admin(OWNER, 99).await.unwrap_err();
        assert!(matches!(err, RelayError::RemoteStoreWriteFailed(_)));
        assert!(!admins.get_admins().await.contains(99));
    }

    #[tokio::test]
    async fn test_failed_read_aborts_edit() {
        let store = Arc::new(MemoryStore::with_ids(&[5]));
        store.fail_reads.store(true, Ordering::SeqCst);
        let err = registry(&store).add_admin(OWNER, 99).await.unwrap_err();
        assert!(matches!(err, RelayError::RemoteStoreUnavailable(_)));
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
        assert_eq!(*store.ids.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_edit_without_store() {
        let admins = AdminRegistry::new(OWNER, None);
        assert_eq!(
            admins.add_admin(OWNER, 2).await.unwrap_err(),
            RelayError::PersistenceDisabled
        );
    }

    #[test]
    fn test_parse_record() {
        assert_eq!(parse_record(&serde_json::json!([1, "2", " 3 ", "x", -4, null])), vec![1, 2, 3]);
        assert!(parse_record(&serde_json::json!({"admins": [1]})).is_empty());
        assert!(parse_record(&serde_json::Value::Null).is_empty());
    }

    fn bin_store(server: &mockito::Server) -> JsonBinStore {
        JsonBinStore::new(
            StoreConfig {
                bin_id: "bin123".to_string(),
                api_key: "secret".to_string(),
                base_url: server.url(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_jsonbin_fetch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/b/bin123/latest")
            .match_header("x-master-key", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::json!({ "record": [5, 6], "metadata": {} }).to_string())
            .create_async()
            .await;

        let ids = bin_store(&server).fetch().await.unwrap();
        assert_eq!(ids, vec![5, 6]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_jsonbin_fetch_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/b/bin123/latest")
            .with_status(401)
            .with_body("Invalid X-Master-Key")
            .create_async()
            .await;

        let err = bin_store(&server).fetch().await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_jsonbin_replace_sends_full_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/b/bin123")
            .match_header("x-master-key", "secret")
            .match_body(mockito::Matcher::Json(serde_json::json!([5, 99])))
            .with_status(200)
            .with_body(r#"{"record":[5,99]}"#)
            .create_async()
            .await;

        bin_store(&server).replace(&[5, 99]).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_jsonbin_write_failure_surfaces_to_owner() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", "/b/bin123/latest")
            .with_status(200)
            .with_body(r#"{"record":[]}"#)
            .expect_at_least(1)
            .create_async()
            .await;
        let _put = server
            .mock("PUT", "/b/bin123")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let admins = AdminRegistry::new(OWNER, Some(Arc::new(bin_store(&server))));
        let err = admins.add_admin(OWNER, 99).await.unwrap_err();
        assert!(matches!(err, RelayError::RemoteStoreWriteFailed(_)));
        assert!(!admins.get_admins().await.contains(99));
    }
}
