//! In-process implementation of the [`TaskStore`] trait.
//!
//! Backed by `DashMap` for concurrent access, suitable for the
//! multi-threaded `tokio` runtime. Listing sorts keys lexicographically
//! and uses the last returned key as the continuation cursor.

use crate::errors::A2AResult;
use crate::store::{ListOptions, Page, StoreConfig, TaskRecord, TaskStore};
use dashmap::DashMap;

/// An in-memory, thread-safe task store.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    records: DashMap<String, TaskRecord>,
    config: StoreConfig,
}

impl InMemoryTaskStore {
    /// Creates a store with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a store with explicit configuration.
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            records: DashMap::new(),
            config,
        }
    }

    fn key(&self, tenant: Option<&str>, task_id: &str) -> String {
        self.config.task_key(tenant, task_id)
    }
}

#[async_trait::async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn add(&self, record: TaskRecord) -> A2AResult<()> {
        let key = self.key(record.tenant.as_deref(), &record.task.id);
        self.records.insert(key, record);
        Ok(())
    }

    async fn get(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<Option<TaskRecord>> {
        let key = self.key(tenant, task_id);
        Ok(self.records.get(&key).map(|entry| entry.value().clone()))
    }

    async fn update(&self, record: TaskRecord) -> A2AResult<()> {
        let key = self.key(record.tenant.as_deref(), &record.task.id);
        self.records.insert(key, record);
        Ok(())
    }

    async fn delete(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<bool> {
        let key = self.key(tenant, task_id);
        Ok(self.records.remove(&key).is_some())
    }

    async fn contains(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<bool> {
        let key = self.key(tenant, task_id);
        Ok(self.records.contains_key(&key))
    }

    async fn list(
        &self,
        tenant: Option<&str>,
        options: &ListOptions,
    ) -> A2AResult<Page<TaskRecord>> {
        let prefix = self.config.tenant_prefix(tenant);
        let page_size = self.config.effective_page_size(options.page_size);

        // Prefix narrows the scan; the record's own tenant decides, since
        // the default namespace prefix is a prefix of every tenant key.
        let mut keys: Vec<String> = self
            .records
            .iter()
            .filter(|entry| {
                entry.key().starts_with(&prefix) && entry.value().tenant.as_deref() == tenant
            })
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort_unstable();

        // The cursor is the last key of the previous page.
        let start = match options.page_token.as_deref() {
            Some(token) => keys.partition_point(|key| key.as_str() <= token),
            None => 0,
        };

        let page_keys = &keys[start.min(keys.len())..];
        let items: Vec<TaskRecord> = page_keys
            .iter()
            .take(page_size)
            .filter_map(|key| self.records.get(key).map(|entry| entry.value().clone()))
            .collect();

        // Derived from the key window, not the re-read items, so a record
        // deleted mid-listing cannot shift the cursor.
        let next_page_token = if page_keys.len() > page_size {
            page_keys.get(page_size - 1).cloned()
        } else {
            None
        };

        Ok(Page {
            items,
            next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status;
    use a2a_types::{Task, TASK_KIND};

    fn record(tenant: Option<&str>, id: &str) -> TaskRecord {
        TaskRecord::new(
            Task {
                kind: TASK_KIND.to_string(),
                id: id.to_string(),
                session_id: None,
                status: status::submitted_status(),
                history: Vec::new(),
                artifacts: Vec::new(),
                metadata: None,
            },
            tenant.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let store = InMemoryTaskStore::new();
        let original = record(None, "task-1");
        store.add(original.clone()).await.unwrap();

        let loaded = store.get(None, "task-1").await.unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(store.contains(None, "task-1").await.unwrap());
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let store = InMemoryTaskStore::new();
        store.add(record(Some("acme"), "task-1")).await.unwrap();

        assert!(store.get(None, "task-1").await.unwrap().is_none());
        assert!(store.get(Some("other"), "task-1").await.unwrap().is_none());
        assert!(store.get(Some("acme"), "task-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_paginates_with_cursor() {
        let store = InMemoryTaskStore::new();
        for i in 0..7 {
            store.add(record(None, &format!("task-{i}"))).await.unwrap();
        }

        let first = store
            .list(
                None,
                &ListOptions {
                    page_size: Some(3),
                    page_token: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(first.items.len(), 3);
        let token = first.next_page_token.expect("more pages");

        let second = store
            .list(
                None,
                &ListOptions {
                    page_size: Some(3),
                    page_token: Some(token),
                },
            )
            .await
            .unwrap();
        assert_eq!(second.items.len(), 3);

        let third = store
            .list(
                None,
                &ListOptions {
                    page_size: Some(3),
                    page_token: second.next_page_token,
                },
            )
            .await
            .unwrap();
        assert_eq!(third.items.len(), 1);
        assert!(third.next_page_token.is_none());

        let all_ids: Vec<&str> = first
            .items
            .iter()
            .chain(&second.items)
            .chain(&third.items)
            .map(|r| r.task.id.as_str())
            .collect();
        assert_eq!(all_ids.len(), 7);
    }

    #[tokio::test]
    async fn cursor_is_the_last_key_of_the_page_window() {
        let store = InMemoryTaskStore::new();
        for i in 0..5 {
            store.add(record(None, &format!("task-{i}"))).await.unwrap();
        }

        let page = store
            .list(
                None,
                &ListOptions {
                    page_size: Some(2),
                    page_token: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("a2a:task-1"));
    }

    #[tokio::test]
    async fn default_namespace_listing_excludes_tenant_records() {
        let store = InMemoryTaskStore::new();
        store.add(record(None, "task-1")).await.unwrap();
        store.add(record(Some("acme"), "task-1")).await.unwrap();

        let page = store.list(None, &ListOptions::default()).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].tenant.is_none());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = InMemoryTaskStore::new();
        store.add(record(None, "task-1")).await.unwrap();

        assert!(store.delete(None, "task-1").await.unwrap());
        assert!(!store.delete(None, "task-1").await.unwrap());
        assert!(!store.contains(None, "task-1").await.unwrap());
    }
}
