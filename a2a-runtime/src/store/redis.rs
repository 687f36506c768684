//! Redis implementation of the [`TaskStore`] trait.
//!
//! Records are stored as JSON strings under `{prefix}{tenant:}{taskId}`
//! keys (prefix configurable, default `a2a:`). Each tenant additionally
//! keeps a sorted set of its task ids under `{prefix}{tenant:}_index`,
//! which `list` pages over with `ZRANGEBYLEX` so page sizes are exact
//! and the configured maximum is enforced. The continuation token is the
//! last task id of the previous page.

use crate::errors::{A2AError, A2AResult};
use crate::store::{ListOptions, Page, StoreConfig, TaskRecord, TaskStore};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Task store backed by a Redis server.
#[derive(Clone)]
pub struct RedisTaskStore {
    manager: ConnectionManager,
    config: StoreConfig,
}

impl RedisTaskStore {
    /// Connects to the given Redis endpoint with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` when the endpoint cannot be reached.
    pub async fn connect(url: &str) -> A2AResult<Self> {
        Self::connect_with_config(url, StoreConfig::default()).await
    }

    /// Connects with explicit store configuration.
    pub async fn connect_with_config(url: &str, config: StoreConfig) -> A2AResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::with_manager(manager, config))
    }

    /// Wraps an existing connection manager.
    #[must_use]
    pub fn with_manager(manager: ConnectionManager, config: StoreConfig) -> Self {
        Self { manager, config }
    }

    fn key(&self, tenant: Option<&str>, task_id: &str) -> String {
        self.config.task_key(tenant, task_id)
    }

    fn index_key(&self, tenant: Option<&str>) -> String {
        format!("{}_index", self.config.tenant_prefix(tenant))
    }

    async fn write(&self, record: &TaskRecord) -> A2AResult<()> {
        let key = self.key(record.tenant.as_deref(), &record.task.id);
        let json = serde_json::to_string(record)?;
        let mut conn = self.manager.clone();
        let _: () = conn.set(&key, json).await?;
        Ok(())
    }

    async fn read_key(&self, key: &str) -> A2AResult<Option<TaskRecord>> {
        let mut conn = self.manager.clone();
        let json: Option<String> = conn.get(key).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json).map_err(|e| {
                A2AError::Serialization {
                    format: "json".to_string(),
                    reason: format!("corrupt task record under {key}: {e}"),
                }
            })?)),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl TaskStore for RedisTaskStore {
    async fn add(&self, record: TaskRecord) -> A2AResult<()> {
        self.write(&record).await?;
        let index = self.index_key(record.tenant.as_deref());
        let mut conn = self.manager.clone();
        // All members score 0; ZRANGEBYLEX then orders lexicographically.
        let _: () = conn.zadd(&index, &record.task.id, 0).await?;
        Ok(())
    }

    async fn get(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<Option<TaskRecord>> {
        self.read_key(&self.key(tenant, task_id)).await
    }

    async fn update(&self, record: TaskRecord) -> A2AResult<()> {
        self.write(&record).await
    }

    async fn delete(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<bool> {
        let key = self.key(tenant, task_id);
        let mut conn = self.manager.clone();
        let removed: i64 = conn.del(&key).await?;
        if removed > 0 {
            let _: () = conn.zrem(&self.index_key(tenant), task_id).await?;
        }
        Ok(removed > 0)
    }

    async fn contains(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<bool> {
        let key = self.key(tenant, task_id);
        let mut conn = self.manager.clone();
        let exists: bool = conn.exists(&key).await?;
        Ok(exists)
    }

    async fn list(
        &self,
        tenant: Option<&str>,
        options: &ListOptions,
    ) -> A2AResult<Page<TaskRecord>> {
        let page_size = self.config.effective_page_size(options.page_size);
        let index = self.index_key(tenant);

        // One extra id tells us whether another page exists.
        let mut conn = self.manager.clone();
        let ids: Vec<String> = redis::cmd("ZRANGEBYLEX")
            .arg(&index)
            .arg(lex_range_start(options.page_token.as_deref()))
            .arg("+")
            .arg("LIMIT")
            .arg(0)
            .arg(page_size + 1)
            .query_async(&mut conn)
            .await?;

        let has_more = ids.len() > page_size;
        let page_ids = &ids[..ids.len().min(page_size)];

        let mut items = Vec::with_capacity(page_ids.len());
        for task_id in page_ids {
            // An index entry can outlive a record expired by Redis.
            if let Some(record) = self.read_key(&self.key(tenant, task_id)).await? {
                items.push(record);
            }
        }

        let next_page_token = if has_more {
            page_ids.last().cloned()
        } else {
            None
        };

        Ok(Page {
            items,
            next_page_token,
        })
    }
}

/// The exclusive ZRANGEBYLEX lower bound for a continuation token.
fn lex_range_start(token: Option<&str>) -> String {
    match token {
        Some(token) => format!("({token}"),
        None => "-".to_string(),
    }
}
