//! Per-task event distribution.
//!
//! The broker is the single write path for task state during execution.
//! For each published event it, atomically with respect to that task's
//! ordering: applies the event to the task store, fans it out to every
//! live subscriber in publish order, and forwards it to the task's
//! registered push notification targets. A per-task async mutex
//! serializes publishes for one task; events for different tasks are
//! independent.
//!
//! A `final` status update tears the topic down: all subscriber streams
//! are closed and the topic entry is dropped from the map. Publishing to
//! a task that already settled is a logic error detected against the
//! stored state and reported, not dropped.

use crate::errors::{A2AError, A2AResult};
use crate::push::PushNotificationSender;
use crate::status;
use crate::store::TaskStore;
use a2a_types::{Artifact, Message, Task, TaskArtifactUpdateEvent, TaskEvent};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Receiver half of a task event subscription.
pub type TaskEventReceiver = UnboundedReceiver<TaskEvent>;

/// A task event subscription as a [`futures::Stream`], the shape handed
/// to transport layers.
pub type TaskEventStream = tokio_stream::wrappers::UnboundedReceiverStream<TaskEvent>;

#[derive(Default)]
struct TopicState {
    subscribers: Vec<UnboundedSender<TaskEvent>>,
    finalized: bool,
}

#[derive(Default)]
struct Topic {
    state: Mutex<TopicState>,
}

/// Fans task events out to subscribers, the store, and push targets.
pub struct EventBroker {
    store: Arc<dyn TaskStore>,
    push_sender: Arc<dyn PushNotificationSender>,
    /// Whether status-update messages are appended to task history
    /// (the agent's state-transition-history capability).
    record_status_messages: bool,
    topics: DashMap<String, Arc<Topic>>,
}

impl EventBroker {
    #[must_use]
    pub fn new(
        store: Arc<dyn TaskStore>,
        push_sender: Arc<dyn PushNotificationSender>,
        record_status_messages: bool,
    ) -> Self {
        Self {
            store,
            push_sender,
            record_status_messages,
            topics: DashMap::new(),
        }
    }

    fn topic(&self, tenant: Option<&str>, task_id: &str) -> Arc<Topic> {
        let key = topic_key(tenant, task_id);
        self.topics.entry(key).or_default().clone()
    }

    /// Registers a live listener for a task's forward events.
    ///
    /// No history is replayed. A task that already settled yields a
    /// closed receiver without creating a topic entry; subscribing ahead
    /// of task creation is allowed.
    pub async fn subscribe(&self, tenant: Option<&str>, task_id: &str) -> TaskEventReceiver {
        if let Ok(Some(record)) = self.store.get(tenant, task_id).await {
            if status::is_terminal_state(&record.task.status.state) {
                debug!(%task_id, "subscription to settled task yields a closed stream");
                let (_tx, rx) = mpsc::unbounded_channel();
                return rx;
            }
        }

        let topic = self.topic(tenant, task_id);
        let mut state = topic.state.lock().await;
        let (tx, rx) = mpsc::unbounded_channel();
        if state.finalized {
            // The final event slipped in between the store read and the
            // lock; dropping the sender closes the receiver immediately.
        } else {
            state.subscribers.push(tx);
        }
        rx
    }

    /// Appends a requester message to a task's history.
    ///
    /// Runs under the task's publish serialization so the read-modify-
    /// write cannot interleave with an executing task's store writes.
    /// Returns the updated task snapshot.
    pub async fn append_history(
        &self,
        tenant: Option<&str>,
        task_id: &str,
        message: Message,
    ) -> A2AResult<Task> {
        let topic = self.topic(tenant, task_id);
        let _serial = topic.state.lock().await;

        let mut record =
            self.store
                .get(tenant, task_id)
                .await?
                .ok_or_else(|| A2AError::TaskNotFound {
                    task_id: task_id.to_string(),
                })?;
        let state = record.task.status.state;
        if status::is_terminal_state(&state) {
            return Err(A2AError::InvalidState {
                operation: "message/send".to_string(),
                state: format!("{state:?}"),
            });
        }

        record.task.history.push(message);
        record.updated_at = chrono::Utc::now();
        self.store.update(record.clone()).await?;
        Ok(record.task)
    }

    /// Publishes one event: store first, then subscribers, then push
    /// targets, all in emission order for the task.
    ///
    /// # Errors
    ///
    /// Fails when the task's stream is already finalized, when the task is
    /// unknown, or when the store write fails.
    pub async fn publish(&self, tenant: Option<&str>, event: TaskEvent) -> A2AResult<()> {
        let task_id = event.task_id().to_string();
        let key = topic_key(tenant, &task_id);
        let topic = self.topics.entry(key.clone()).or_default().clone();
        let mut state = topic.state.lock().await;

        // A stale topic handle can outlive its map entry; the stored
        // state below catches publishes through a fresh one.
        if state.finalized {
            warn!(%task_id, "event published after final event");
            return Err(publish_after_final(&task_id));
        }

        self.apply_to_store(tenant, &event).await?;

        state
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());

        self.dispatch_push(tenant, &task_id, &event).await;

        if event.is_final() {
            state.finalized = true;
            // Dropping the senders closes every subscriber stream.
            state.subscribers.clear();
            drop(state);
            self.topics.remove(&key);
        }

        Ok(())
    }

    async fn apply_to_store(&self, tenant: Option<&str>, event: &TaskEvent) -> A2AResult<()> {
        let task_id = event.task_id();
        let mut record =
            self.store
                .get(tenant, task_id)
                .await?
                .ok_or_else(|| A2AError::TaskNotFound {
                    task_id: task_id.to_string(),
                })?;

        if status::is_terminal_state(&record.task.status.state) {
            warn!(%task_id, "event published after final event");
            return Err(publish_after_final(task_id));
        }

        match event {
            TaskEvent::StatusUpdate(update) => {
                if self.record_status_messages {
                    if let Some(message) = &update.status.message {
                        record.task.history.push(message.clone());
                    }
                }
                record.task.status = update.status.clone();
            }
            TaskEvent::ArtifactUpdate(update) => {
                merge_artifact(&mut record.task.artifacts, update);
            }
        }

        record.updated_at = chrono::Utc::now();
        self.store.update(record).await
    }

    /// Delivery is fire-and-forget relative to the state transition:
    /// failures are logged and never propagate.
    async fn dispatch_push(&self, tenant: Option<&str>, task_id: &str, event: &TaskEvent) {
        let configs = match self.store.list_push_configs(tenant, task_id).await {
            Ok(configs) => configs,
            Err(error) => {
                warn!(%task_id, %error, "failed to load push notification configs");
                return;
            }
        };

        for config in configs {
            if let Err(error) = self.push_sender.send(&config, event).await {
                warn!(
                    %task_id,
                    url = %config.url,
                    %error,
                    "push notification delivery failed"
                );
            }
        }
    }

    #[cfg(test)]
    fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

fn publish_after_final(task_id: &str) -> A2AError {
    A2AError::Internal {
        component: "event_broker".to_string(),
        reason: format!("event published after final event for task {task_id}"),
    }
}

/// Merges an artifact update into the artifact list, matching by id and
/// appending parts when the update carries `append=true`.
pub fn merge_artifact(artifacts: &mut Vec<Artifact>, update: &TaskArtifactUpdateEvent) {
    let incoming = &update.artifact;
    match artifacts
        .iter_mut()
        .find(|existing| existing.artifact_id == incoming.artifact_id)
    {
        Some(existing) if update.append == Some(true) => {
            existing.parts.extend(incoming.parts.iter().cloned());
            if incoming.name.is_some() {
                existing.name = incoming.name.clone();
            }
        }
        Some(existing) => *existing = incoming.clone(),
        None => artifacts.push(incoming.clone()),
    }
}

fn topic_key(tenant: Option<&str>, task_id: &str) -> String {
    match tenant {
        Some(tenant) => format!("{tenant}:{task_id}"),
        None => task_id.to_string(),
    }
}
