//! Task persistence across pluggable backends.
//!
//! The [`TaskStore`] trait defines one uniform contract implemented by the
//! in-process map backend, the distributed key/value cache backend, and
//! the Redis backend. Keys are namespaced by an optional tenant and a
//! configurable prefix so multiple deployments can share one backend.
//!
//! # Concurrency
//!
//! `update` is last-writer-wins; the store does not implement optimistic
//! concurrency. The event broker is the sole writer while a task executes
//! and serializes updates per task id, so cross-writer races are avoided
//! structurally rather than resolved here. Concurrent readers during an
//! in-flight write observe either the pre- or post-update value, never a
//! partial one.

pub mod cache;
pub mod in_memory;
pub mod redis;

pub use cache::{CacheTaskStore, DistributedCache, InMemoryCache};
pub use in_memory::InMemoryTaskStore;
pub use redis::RedisTaskStore;

use crate::errors::{A2AError, A2AResult};
use a2a_types::{PushNotificationConfig, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default key prefix used on shared backends.
pub const DEFAULT_KEY_PREFIX: &str = "a2a:";
/// Default page size for `list`.
pub const DEFAULT_PAGE_SIZE: u32 = 25;
/// Hard upper bound on page size, store-enforced.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Tuning knobs shared by all store backends.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Prefix prepended to every key, e.g. `a2a:`.
    pub key_prefix: String,
    /// Page size used when the caller does not ask for one.
    pub default_page_size: u32,
    /// Maximum page size; larger requests are clamped.
    pub max_page_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl StoreConfig {
    /// Clamps a requested page size to the configured bounds.
    #[must_use]
    pub fn effective_page_size(&self, requested: Option<u32>) -> usize {
        let size = requested.unwrap_or(self.default_page_size);
        size.clamp(1, self.max_page_size) as usize
    }

    /// Builds the storage key for a task, namespaced by the optional tenant:
    /// `{prefix}{tenant:}{taskId}`.
    #[must_use]
    pub fn task_key(&self, tenant: Option<&str>, task_id: &str) -> String {
        match tenant {
            Some(tenant) => format!("{}{}:{}", self.key_prefix, tenant, task_id),
            None => format!("{}{}", self.key_prefix, task_id),
        }
    }

    /// The key prefix shared by every task belonging to a tenant.
    #[must_use]
    pub fn tenant_prefix(&self, tenant: Option<&str>) -> String {
        match tenant {
            Some(tenant) => format!("{}{}:", self.key_prefix, tenant),
            None => self.key_prefix.clone(),
        }
    }
}

/// The persisted projection of a [`Task`] plus store bookkeeping.
///
/// Owned exclusively by the task store: the protocol handler never mutates
/// a record directly, only through store operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    /// The task itself, including history and artifacts.
    pub task: Task,
    /// The tenant namespace this record belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    /// Webhook configurations registered for this task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub push_configs: Vec<PushNotificationConfig>,
    /// When the record was first persisted.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Creates a fresh record for a newly submitted task.
    #[must_use]
    pub fn new(task: Task, tenant: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            task,
            tenant,
            push_configs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Options for the paginated `list` operation.
#[derive(Debug, Default, Clone)]
pub struct ListOptions {
    /// Requested page size; clamped to the store's configured bounds.
    pub page_size: Option<u32>,
    /// Continuation cursor returned by a previous page.
    pub page_token: Option<String>,
}

/// One page of a paginated result set.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; `None` when the listing is exhausted.
    pub next_page_token: Option<String>,
}

/// Uniform persistence contract for task records.
///
/// All operations are scoped by an optional tenant; a record stored under
/// one tenant is invisible to every other.
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    /// Persists a new record. Upsert semantics: storing an id that already
    /// exists replaces the previous record.
    async fn add(&self, record: TaskRecord) -> A2AResult<()>;

    /// Retrieves a record by task id.
    async fn get(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<Option<TaskRecord>>;

    /// Replaces an existing record. Last-writer-wins.
    async fn update(&self, record: TaskRecord) -> A2AResult<()>;

    /// Removes a record, returning whether it existed.
    async fn delete(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<bool>;

    /// Reports whether a record exists.
    async fn contains(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<bool>;

    /// Lists records for a tenant with cursor pagination.
    async fn list(&self, tenant: Option<&str>, options: &ListOptions)
        -> A2AResult<Page<TaskRecord>>;

    // ------------------------------------------------------------------
    // Push notification configs, addressed by (taskId, configId).
    //
    // The default implementations go through `get`/`update`, so backends
    // only need the record operations above.
    // ------------------------------------------------------------------

    /// Stores or replaces a push notification config for a task.
    async fn set_push_config(
        &self,
        tenant: Option<&str>,
        task_id: &str,
        config: PushNotificationConfig,
    ) -> A2AResult<()> {
        let mut record = self
            .get(tenant, task_id)
            .await?
            .ok_or_else(|| A2AError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;

        match record
            .push_configs
            .iter_mut()
            .find(|existing| existing.id == config.id)
        {
            Some(existing) => *existing = config,
            None => record.push_configs.push(config),
        }
        record.updated_at = Utc::now();
        self.update(record).await
    }

    /// Retrieves one push notification config. With no `config_id` the
    /// first registered config is returned.
    async fn get_push_config(
        &self,
        tenant: Option<&str>,
        task_id: &str,
        config_id: Option<&str>,
    ) -> A2AResult<Option<PushNotificationConfig>> {
        let record = self
            .get(tenant, task_id)
            .await?
            .ok_or_else(|| A2AError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;

        Ok(match config_id {
            Some(config_id) => record
                .push_configs
                .into_iter()
                .find(|config| config.id.as_deref() == Some(config_id)),
            None => record.push_configs.into_iter().next(),
        })
    }

    /// Lists every push notification config registered for a task.
    async fn list_push_configs(
        &self,
        tenant: Option<&str>,
        task_id: &str,
    ) -> A2AResult<Vec<PushNotificationConfig>> {
        let record = self
            .get(tenant, task_id)
            .await?
            .ok_or_else(|| A2AError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
        Ok(record.push_configs)
    }

    /// Removes one push notification config, returning whether it existed.
    async fn delete_push_config(
        &self,
        tenant: Option<&str>,
        task_id: &str,
        config_id: &str,
    ) -> A2AResult<bool> {
        let mut record = self
            .get(tenant, task_id)
            .await?
            .ok_or_else(|| A2AError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;

        let before = record.push_configs.len();
        record
            .push_configs
            .retain(|config| config.id.as_deref() != Some(config_id));
        let removed = record.push_configs.len() != before;
        if removed {
            record.updated_at = Utc::now();
            self.update(record).await?;
        }
        Ok(removed)
    }
}
