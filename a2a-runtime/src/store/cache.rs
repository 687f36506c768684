//! Task store backed by a distributed key/value cache.
//!
//! [`DistributedCache`] is a minimal byte-oriented contract (get/set/
//! remove) that external cache services implement. [`CacheTaskStore`]
//! serializes records to JSON on top of it. Because a plain cache cannot
//! enumerate its keys, the store maintains a per-tenant index entry
//! listing the task ids it has written, which is what `list` pages over.

use crate::errors::{A2AError, A2AResult};
use crate::store::{ListOptions, Page, StoreConfig, TaskRecord, TaskStore};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Byte-oriented contract for an external key/value cache service.
#[async_trait::async_trait]
pub trait DistributedCache: Send + Sync {
    /// Reads the value stored under `key`, if any.
    async fn get(&self, key: &str) -> A2AResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>) -> A2AResult<()>;

    /// Removes `key`, returning whether it existed.
    async fn remove(&self, key: &str) -> A2AResult<bool>;
}

/// An in-process [`DistributedCache`] used as the default cache backend
/// and in tests.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Vec<u8>>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DistributedCache for InMemoryCache {
    async fn get(&self, key: &str) -> A2AResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> A2AResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> A2AResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// Task store adapter over a [`DistributedCache`].
pub struct CacheTaskStore {
    cache: Arc<dyn DistributedCache>,
    config: StoreConfig,
    // Serializes index read-modify-write cycles so concurrent add/delete
    // calls cannot lose index entries.
    index_lock: Mutex<()>,
}

impl CacheTaskStore {
    /// Creates a store over the given cache with default configuration.
    #[must_use]
    pub fn new(cache: Arc<dyn DistributedCache>) -> Self {
        Self::with_config(cache, StoreConfig::default())
    }

    /// Creates a store over the given cache with explicit configuration.
    #[must_use]
    pub fn with_config(cache: Arc<dyn DistributedCache>, config: StoreConfig) -> Self {
        Self {
            cache,
            config,
            index_lock: Mutex::new(()),
        }
    }

    fn record_key(&self, tenant: Option<&str>, task_id: &str) -> String {
        self.config.task_key(tenant, task_id)
    }

    fn index_key(&self, tenant: Option<&str>) -> String {
        format!("{}_index", self.config.tenant_prefix(tenant))
    }

    async fn read_index(&self, tenant: Option<&str>) -> A2AResult<Vec<String>> {
        match self.cache.get(&self.index_key(tenant)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write_index(&self, tenant: Option<&str>, index: &[String]) -> A2AResult<()> {
        let bytes = serde_json::to_vec(index)?;
        self.cache.set(&self.index_key(tenant), bytes).await
    }

    async fn index_insert(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<()> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index(tenant).await?;
        if let Err(position) = index.binary_search_by(|id| id.as_str().cmp(task_id)) {
            index.insert(position, task_id.to_string());
            self.write_index(tenant, &index).await?;
        }
        Ok(())
    }

    async fn index_remove(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<()> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index(tenant).await?;
        if let Ok(position) = index.binary_search_by(|id| id.as_str().cmp(task_id)) {
            index.remove(position);
            self.write_index(tenant, &index).await?;
        }
        Ok(())
    }

    async fn write_record(&self, record: &TaskRecord) -> A2AResult<()> {
        let key = self.record_key(record.tenant.as_deref(), &record.task.id);
        let bytes = serde_json::to_vec(record)?;
        self.cache.set(&key, bytes).await
    }
}

#[async_trait::async_trait]
impl TaskStore for CacheTaskStore {
    async fn add(&self, record: TaskRecord) -> A2AResult<()> {
        self.write_record(&record).await?;
        self.index_insert(record.tenant.as_deref(), &record.task.id)
            .await
    }

    async fn get(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<Option<TaskRecord>> {
        let key = self.record_key(tenant, task_id);
        match self.cache.get(&key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| {
                A2AError::Serialization {
                    format: "json".to_string(),
                    reason: format!("corrupt task record for {task_id}: {e}"),
                }
            })?)),
            None => Ok(None),
        }
    }

    async fn update(&self, record: TaskRecord) -> A2AResult<()> {
        self.write_record(&record).await
    }

    async fn delete(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<bool> {
        let key = self.record_key(tenant, task_id);
        let removed = self.cache.remove(&key).await?;
        if removed {
            self.index_remove(tenant, task_id).await?;
        }
        Ok(removed)
    }

    async fn contains(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<bool> {
        let key = self.record_key(tenant, task_id);
        Ok(self.cache.get(&key).await?.is_some())
    }

    async fn list(
        &self,
        tenant: Option<&str>,
        options: &ListOptions,
    ) -> A2AResult<Page<TaskRecord>> {
        let page_size = self.config.effective_page_size(options.page_size);
        let index = self.read_index(tenant).await?;

        let start = match options.page_token.as_deref() {
            Some(token) => index.partition_point(|id| id.as_str() <= token),
            None => 0,
        };

        let remaining = &index[start.min(index.len())..];
        let mut items = Vec::new();
        for task_id in remaining.iter().take(page_size) {
            // Index entries can outlive records evicted by the cache.
            if let Some(record) = self.get(tenant, task_id).await? {
                items.push(record);
            }
        }

        let next_page_token = if remaining.len() > page_size {
            remaining.get(page_size - 1).cloned()
        } else {
            None
        };

        Ok(Page {
            items,
            next_page_token,
        })
    }
}
