//! The protocol front door.
//!
//! [`ProtocolHandler`] implements the canonical operations a transport
//! layer maps requests onto: sending a message (creating, resuming, or
//! attaching to a task), querying a task, canceling it, subscribing to
//! its event stream, and managing its push notification configs. The
//! handler validates and routes; state transitions flow through the
//! event broker and executions through the task queue.

use crate::broker::{EventBroker, TaskEventReceiver, TaskEventStream};
use crate::config::HandlerConfig;
use crate::errors::{A2AError, A2AResult};
use crate::push::PushNotificationSender;
use crate::queue::TaskQueue;
use crate::runtime::AgentRuntime;
use crate::status;
use crate::store::{ListOptions, Page, TaskRecord, TaskStore};
use a2a_types::{
    AgentCapabilities, Message, MessageRole, PushNotificationConfig, Task, TaskEvent, TASK_KIND,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Per-call options for `send_message`.
#[derive(Debug, Default, Clone)]
pub struct MessageSendOptions {
    /// When set, the call does not return until the task reaches a
    /// terminal state or pauses for input.
    pub blocking: bool,
    /// Limits the history carried by the returned snapshot to the most
    /// recent N messages. `None` returns the full history.
    pub history_length: Option<u32>,
}

/// Dispatches protocol operations onto the store, queue, and broker.
pub struct ProtocolHandler {
    store: Arc<dyn TaskStore>,
    runtime: Arc<dyn AgentRuntime>,
    push_sender: Arc<dyn PushNotificationSender>,
    capabilities: AgentCapabilities,
    broker: Arc<EventBroker>,
    queue: TaskQueue,
}

impl ProtocolHandler {
    #[must_use]
    pub fn new(config: HandlerConfig) -> Self {
        let broker = Arc::new(EventBroker::new(
            config.store.clone(),
            config.push_sender.clone(),
            config.capabilities.state_transition_history,
        ));
        let queue = TaskQueue::new(config.runtime.clone(), broker.clone());
        Self {
            store: config.store,
            runtime: config.runtime,
            push_sender: config.push_sender,
            capabilities: config.capabilities,
            broker,
            queue,
        }
    }

    /// The capabilities this handler was assembled with.
    #[must_use]
    pub fn capabilities(&self) -> &AgentCapabilities {
        &self.capabilities
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Sends a message: creates a new task, resumes a paused one, or
    /// attaches to a running one, depending on the message's task id.
    ///
    /// Returns a snapshot of the task. With `options.blocking` the call
    /// waits until the task settles (terminal state or `input-required`)
    /// before snapshotting.
    #[instrument(skip(self, message, options), fields(message_id = %message.message_id))]
    pub async fn send_message(
        &self,
        tenant: Option<&str>,
        mut message: Message,
        options: &MessageSendOptions,
    ) -> A2AResult<Task> {
        validate_message(&message)?;

        let task_id = message
            .task_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        message.task_id = Some(task_id.clone());

        // Subscribe first so a fast execution cannot finish between
        // enqueue and the blocking drain below.
        let events = if options.blocking {
            Some(self.broker.subscribe(tenant, &task_id).await)
        } else {
            None
        };

        match self.store.get(tenant, &task_id).await? {
            Some(record) => self.dispatch_to_existing(tenant, record, message).await?,
            None => self.create_and_enqueue(tenant, &task_id, message).await?,
        }

        if let Some(mut events) = events {
            drain_until_settled(&mut events).await;
        }

        let mut record =
            self.store
                .get(tenant, &task_id)
                .await?
                .ok_or_else(|| A2AError::TaskNotFound {
                    task_id: task_id.clone(),
                })?;
        trim_history(&mut record.task, options.history_length);
        Ok(record.task)
    }

    /// Streaming variant of `send_message`: returns the submitted-time
    /// snapshot immediately plus a live event stream for the task.
    ///
    /// # Errors
    ///
    /// Fails with `CapabilityNotSupported` when streaming is disabled.
    #[instrument(skip(self, message), fields(message_id = %message.message_id))]
    pub async fn send_message_streaming(
        &self,
        tenant: Option<&str>,
        mut message: Message,
    ) -> A2AResult<(Task, TaskEventStream)> {
        self.require_capability(self.capabilities.streaming, "streaming")?;
        validate_message(&message)?;

        let task_id = message
            .task_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        message.task_id = Some(task_id.clone());

        let events = self.broker.subscribe(tenant, &task_id).await;

        match self.store.get(tenant, &task_id).await? {
            Some(record) => self.dispatch_to_existing(tenant, record, message).await?,
            None => self.create_and_enqueue(tenant, &task_id, message).await?,
        }

        let record =
            self.store
                .get(tenant, &task_id)
                .await?
                .ok_or_else(|| A2AError::TaskNotFound {
                    task_id: task_id.clone(),
                })?;
        Ok((record.task, TaskEventStream::new(events)))
    }

    /// Routes a message at a task the store already knows about.
    async fn dispatch_to_existing(
        &self,
        tenant: Option<&str>,
        record: TaskRecord,
        message: Message,
    ) -> A2AResult<()> {
        let state = record.task.status.state;
        if status::is_terminal_state(&state) {
            return Err(A2AError::InvalidState {
                operation: "message/send".to_string(),
                state: format!("{state:?}"),
            });
        }

        // The broker serializes this with the task's own store writes,
        // so an executing task cannot clobber the appended message.
        let task = self
            .broker
            .append_history(tenant, &record.task.id, message.clone())
            .await?;

        // Resume from pause or attach to a running execution; the queue
        // coalesces if one is already in flight.
        let started = self.queue.enqueue(tenant, task.clone(), message)?;
        if started {
            info!(task_id = %task.id, resumed = status::can_resume(&state), "execution started");
        } else {
            debug!(task_id = %task.id, "message attached to running execution");
        }
        Ok(())
    }

    /// Creates a fresh task in `submitted` and starts its execution.
    async fn create_and_enqueue(
        &self,
        tenant: Option<&str>,
        task_id: &str,
        message: Message,
    ) -> A2AResult<()> {
        let task = Task {
            kind: TASK_KIND.to_string(),
            id: task_id.to_string(),
            session_id: message.session_id.clone(),
            status: status::submitted_status(),
            history: vec![message.clone()],
            artifacts: Vec::new(),
            metadata: None,
        };
        self.store
            .add(TaskRecord::new(task.clone(), tenant.map(str::to_string)))
            .await?;

        self.queue.enqueue(tenant, task, message)?;
        info!(%task_id, "task created");
        Ok(())
    }

    // ========================================================================
    // Task queries and lifecycle
    // ========================================================================

    /// Returns a snapshot of a task.
    pub async fn get_task(
        &self,
        tenant: Option<&str>,
        task_id: &str,
        history_length: Option<u32>,
    ) -> A2AResult<Task> {
        let mut record =
            self.store
                .get(tenant, task_id)
                .await?
                .ok_or_else(|| A2AError::TaskNotFound {
                    task_id: task_id.to_string(),
                })?;
        trim_history(&mut record.task, history_length);
        Ok(record.task)
    }

    /// Lists tasks for a tenant with cursor pagination.
    pub async fn list_tasks(
        &self,
        tenant: Option<&str>,
        options: &ListOptions,
    ) -> A2AResult<Page<Task>> {
        let page = self.store.list(tenant, options).await?;
        Ok(Page {
            items: page.items.into_iter().map(|record| record.task).collect(),
            next_page_token: page.next_page_token,
        })
    }

    /// Requests cancellation of a task.
    ///
    /// Canceling a task that already reached a terminal state is a no-op
    /// returning the current snapshot. A running execution is signaled
    /// cooperatively and the terminal `canceled` event is published here.
    #[instrument(skip(self))]
    pub async fn cancel_task(&self, tenant: Option<&str>, task_id: &str) -> A2AResult<Task> {
        let record =
            self.store
                .get(tenant, task_id)
                .await?
                .ok_or_else(|| A2AError::TaskNotFound {
                    task_id: task_id.to_string(),
                })?;

        if status::is_terminal_state(&record.task.status.state) {
            debug!(%task_id, state = ?record.task.status.state, "cancel of settled task is a no-op");
            return Ok(record.task);
        }

        let was_running = self.queue.cancel(tenant, task_id);
        if was_running {
            if let Err(error) = self.runtime.cancel(&record.task).await {
                warn!(%task_id, %error, "runtime cancel hook failed");
            }
        }

        let event = TaskEvent::StatusUpdate(status::status_update_event(
            task_id,
            record.task.session_id.as_deref(),
            status::canceled_status(),
        ));
        if let Err(error) = self.broker.publish(tenant, event).await {
            // The execution settled between our snapshot and the publish.
            debug!(%task_id, %error, "task settled while canceling");
        } else {
            info!(%task_id, was_running, "task canceled");
        }

        self.get_task(tenant, task_id, None).await
    }

    /// Opens a live event stream for an existing task.
    ///
    /// A task that already settled yields a closed, empty stream rather
    /// than an error, so reconnecting clients terminate cleanly.
    pub async fn subscribe_to_task(
        &self,
        tenant: Option<&str>,
        task_id: &str,
    ) -> A2AResult<TaskEventStream> {
        self.require_capability(self.capabilities.streaming, "streaming")?;

        let record =
            self.store
                .get(tenant, task_id)
                .await?
                .ok_or_else(|| A2AError::TaskNotFound {
                    task_id: task_id.to_string(),
                })?;

        if status::is_terminal_state(&record.task.status.state) {
            // The store can outlive the broker topic (restart, shared
            // backend), so settle this here instead of relying on the
            // topic's finalized flag.
            let (_tx, rx) = mpsc::unbounded_channel();
            return Ok(TaskEventStream::new(rx));
        }

        Ok(TaskEventStream::new(
            self.broker.subscribe(tenant, task_id).await,
        ))
    }

    // ========================================================================
    // Push notification configs
    // ========================================================================

    /// Registers (or replaces) a push notification config after the
    /// webhook proves ownership of its URL.
    ///
    /// A config whose URL fails verification is never persisted.
    #[instrument(skip(self, config), fields(url = %config.url))]
    pub async fn set_push_notification_config(
        &self,
        tenant: Option<&str>,
        task_id: &str,
        mut config: PushNotificationConfig,
    ) -> A2AResult<PushNotificationConfig> {
        self.require_capability(self.capabilities.push_notifications, "pushNotifications")?;

        if config.url.trim().is_empty() {
            return Err(A2AError::validation(
                "pushNotificationConfig.url",
                "must not be empty",
            ));
        }
        if !self.store.contains(tenant, task_id).await? {
            return Err(A2AError::TaskNotFound {
                task_id: task_id.to_string(),
            });
        }

        if !self.push_sender.verify_url(&config.url).await {
            warn!(%task_id, url = %config.url, "push notification URL failed verification");
            return Err(A2AError::PushNotificationVerification {
                url: config.url.clone(),
            });
        }

        if config.id.is_none() {
            config.id = Some(uuid::Uuid::new_v4().to_string());
        }
        self.store
            .set_push_config(tenant, task_id, config.clone())
            .await?;
        info!(%task_id, config_id = ?config.id, "push notification config registered");
        Ok(config)
    }

    /// Fetches one push notification config; with no id, the first
    /// registered one.
    pub async fn get_push_notification_config(
        &self,
        tenant: Option<&str>,
        task_id: &str,
        config_id: Option<&str>,
    ) -> A2AResult<Option<PushNotificationConfig>> {
        self.require_capability(self.capabilities.push_notifications, "pushNotifications")?;
        self.store.get_push_config(tenant, task_id, config_id).await
    }

    /// Lists every push notification config registered for a task.
    pub async fn list_push_notification_configs(
        &self,
        tenant: Option<&str>,
        task_id: &str,
    ) -> A2AResult<Vec<PushNotificationConfig>> {
        self.require_capability(self.capabilities.push_notifications, "pushNotifications")?;
        self.store.list_push_configs(tenant, task_id).await
    }

    /// Removes one push notification config, reporting whether it existed.
    pub async fn delete_push_notification_config(
        &self,
        tenant: Option<&str>,
        task_id: &str,
        config_id: &str,
    ) -> A2AResult<bool> {
        self.require_capability(self.capabilities.push_notifications, "pushNotifications")?;
        self.store
            .delete_push_config(tenant, task_id, config_id)
            .await
    }

    fn require_capability(&self, enabled: bool, capability: &str) -> A2AResult<()> {
        if enabled {
            Ok(())
        } else {
            Err(A2AError::CapabilityNotSupported {
                capability: capability.to_string(),
            })
        }
    }
}

/// Rejects structurally invalid messages before any state is touched.
fn validate_message(message: &Message) -> A2AResult<()> {
    if message.parts.is_empty() {
        return Err(A2AError::validation("message.parts", "must not be empty"));
    }
    if message.role != MessageRole::Requester {
        return Err(A2AError::validation(
            "message.role",
            "inbound messages must carry the requester role",
        ));
    }
    Ok(())
}

/// Keeps only the most recent `history_length` messages on a snapshot.
fn trim_history(task: &mut Task, history_length: Option<u32>) {
    if let Some(limit) = history_length {
        let limit = limit as usize;
        if task.history.len() > limit {
            task.history.drain(..task.history.len() - limit);
        }
    }
}

/// Consumes events until the task settles: a final event, a pause for
/// input, or the stream closing because it settled elsewhere.
async fn drain_until_settled(events: &mut TaskEventReceiver) {
    while let Some(event) = events.recv().await {
        if event.is_final() {
            return;
        }
        if let TaskEvent::StatusUpdate(update) = &event {
            if update.status.state == a2a_types::TaskState::InputRequired {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTaskStore;
    use crate::test_support::{user_message, RecordingPushSender, ScriptedRuntime};
    use a2a_types::TaskState;

    fn handler_with(runtime: ScriptedRuntime, sender: RecordingPushSender) -> ProtocolHandler {
        let config = HandlerConfig::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(runtime),
        )
        .with_push_sender(Arc::new(sender));
        ProtocolHandler::new(config)
    }

    fn blocking() -> MessageSendOptions {
        MessageSendOptions {
            blocking: true,
            history_length: None,
        }
    }

    #[tokio::test]
    async fn empty_parts_are_rejected_before_any_state_changes() {
        let handler = handler_with(ScriptedRuntime::new(), RecordingPushSender::accepting());
        let mut message = user_message("hi");
        message.parts.clear();

        let error = handler
            .send_message(None, message, &MessageSendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, A2AError::Validation { .. }));
    }

    #[tokio::test]
    async fn agent_role_messages_are_rejected()  {
        let handler = handler_with(ScriptedRuntime::new(), RecordingPushSender::accepting());
        let mut message = user_message("hi");
        message.role = MessageRole::Agent;

        let error = handler
            .send_message(None, message, &MessageSendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, A2AError::Validation { .. }));
    }

    #[tokio::test]
    async fn blocking_send_returns_the_settled_task() {
        let handler = handler_with(
            ScriptedRuntime::completing_with("result"),
            RecordingPushSender::accepting(),
        );

        let task = handler
            .send_message(None, user_message("do it"), &blocking())
            .await
            .unwrap();

        assert_eq!(task.status.state, TaskState::Completed);
        assert_eq!(task.artifacts.len(), 1);
        assert_eq!(task.history[0].parts[0].as_text(), Some("do it"));
    }

    #[tokio::test]
    async fn attached_messages_survive_a_running_execution() {
        let handler = handler_with(ScriptedRuntime::hanging(), RecordingPushSender::accepting());
        let task = handler
            .send_message(None, user_message("start"), &MessageSendOptions::default())
            .await
            .unwrap();
        // Let the execution publish `working` before attaching.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut follow_up = user_message("while running");
        follow_up.task_id = Some(task.id.clone());
        let snapshot = handler
            .send_message(None, follow_up, &MessageSendOptions::default())
            .await
            .unwrap();

        let texts: Vec<_> = snapshot
            .history
            .iter()
            .filter_map(|m| m.parts[0].as_text())
            .collect();
        assert!(texts.contains(&"start"));
        assert!(texts.contains(&"while running"));

        handler.cancel_task(None, &task.id).await.unwrap();
    }

    #[tokio::test]
    async fn send_to_terminal_task_is_an_invalid_state_error() {
        let handler = handler_with(
            ScriptedRuntime::completing_with("result"),
            RecordingPushSender::accepting(),
        );

        let task = handler
            .send_message(None, user_message("do it"), &blocking())
            .await
            .unwrap();

        let mut follow_up = user_message("more");
        follow_up.task_id = Some(task.id.clone());
        let error = handler
            .send_message(None, follow_up, &blocking())
            .await
            .unwrap_err();
        assert!(matches!(error, A2AError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn history_length_trims_the_snapshot() {
        let handler = handler_with(
            ScriptedRuntime::completing_with("result"),
            RecordingPushSender::accepting(),
        );

        let options = MessageSendOptions {
            blocking: true,
            history_length: Some(0),
        };
        let task = handler
            .send_message(None, user_message("do it"), &options)
            .await
            .unwrap();
        assert!(task.history.is_empty());

        let full = handler.get_task(None, &task.id, None).await.unwrap();
        assert!(!full.history.is_empty());
    }

    #[tokio::test]
    async fn get_task_for_unknown_id_is_not_found() {
        let handler = handler_with(ScriptedRuntime::new(), RecordingPushSender::accepting());
        let error = handler.get_task(None, "missing", None).await.unwrap_err();
        assert!(matches!(error, A2AError::TaskNotFound { .. }));
    }

    #[tokio::test]
    async fn cancel_unknown_task_is_not_found() {
        let handler = handler_with(ScriptedRuntime::new(), RecordingPushSender::accepting());
        let error = handler.cancel_task(None, "missing").await.unwrap_err();
        assert!(matches!(error, A2AError::TaskNotFound { .. }));
    }

    #[tokio::test]
    async fn cancel_of_settled_task_is_a_no_op() {
        let handler = handler_with(
            ScriptedRuntime::completing_with("result"),
            RecordingPushSender::accepting(),
        );
        let task = handler
            .send_message(None, user_message("do it"), &blocking())
            .await
            .unwrap();

        let canceled = handler.cancel_task(None, &task.id).await.unwrap();
        // Still completed, not canceled.
        assert_eq!(canceled.status.state, TaskState::Completed);
    }

    #[tokio::test]
    async fn cancel_stops_a_running_execution() {
        let handler = handler_with(ScriptedRuntime::hanging(), RecordingPushSender::accepting());
        let task = handler
            .send_message(None, user_message("do it"), &MessageSendOptions::default())
            .await
            .unwrap();

        let canceled = handler.cancel_task(None, &task.id).await.unwrap();
        assert_eq!(canceled.status.state, TaskState::Canceled);
    }

    #[tokio::test]
    async fn streaming_capability_gates_subscriptions() {
        let config = HandlerConfig::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(ScriptedRuntime::new()),
        )
        .with_capabilities(AgentCapabilities {
            streaming: false,
            ..AgentCapabilities::default()
        });
        let handler = ProtocolHandler::new(config);

        let error = handler.subscribe_to_task(None, "any").await.unwrap_err();
        assert!(matches!(
            error,
            A2AError::CapabilityNotSupported { capability } if capability == "streaming"
        ));
    }

    #[tokio::test]
    async fn push_capability_gates_config_management() {
        let config = HandlerConfig::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(ScriptedRuntime::new()),
        )
        .with_capabilities(AgentCapabilities {
            push_notifications: false,
            ..AgentCapabilities::default()
        });
        let handler = ProtocolHandler::new(config);

        let error = handler
            .list_push_notification_configs(None, "any")
            .await
            .unwrap_err();
        assert!(matches!(error, A2AError::CapabilityNotSupported { .. }));
    }

    #[tokio::test]
    async fn failed_verification_does_not_persist_the_config() {
        let handler = handler_with(ScriptedRuntime::hanging(), RecordingPushSender::rejecting());
        let task = handler
            .send_message(None, user_message("do it"), &MessageSendOptions::default())
            .await
            .unwrap();

        let error = handler
            .set_push_notification_config(
                None,
                &task.id,
                PushNotificationConfig {
                    id: None,
                    url: "https://example.invalid/hook".into(),
                    token: None,
                    authentication: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, A2AError::PushNotificationVerification { .. }));

        let configs = handler
            .list_push_notification_configs(None, &task.id)
            .await
            .unwrap();
        assert!(configs.is_empty());
    }

    #[tokio::test]
    async fn verified_config_round_trips_with_assigned_id() {
        let handler = handler_with(ScriptedRuntime::hanging(), RecordingPushSender::accepting());
        let task = handler
            .send_message(None, user_message("do it"), &MessageSendOptions::default())
            .await
            .unwrap();

        let stored = handler
            .set_push_notification_config(
                None,
                &task.id,
                PushNotificationConfig {
                    id: None,
                    url: "https://example.invalid/hook".into(),
                    token: Some("secret".into()),
                    authentication: None,
                },
            )
            .await
            .unwrap();
        let config_id = stored.id.clone().expect("id assigned on insert");

        let fetched = handler
            .get_push_notification_config(None, &task.id, Some(&config_id))
            .await
            .unwrap()
            .expect("config stored");
        assert_eq!(fetched.url, "https://example.invalid/hook");

        assert!(handler
            .delete_push_notification_config(None, &task.id, &config_id)
            .await
            .unwrap());
        assert!(!handler
            .delete_push_notification_config(None, &task.id, &config_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn tenants_do_not_see_each_others_tasks() {
        let handler = handler_with(
            ScriptedRuntime::completing_with("result"),
            RecordingPushSender::accepting(),
        );
        let task = handler
            .send_message(Some("acme"), user_message("do it"), &blocking())
            .await
            .unwrap();

        let error = handler
            .get_task(Some("globex"), &task.id, None)
            .await
            .unwrap_err();
        assert!(matches!(error, A2AError::TaskNotFound { .. }));
    }
}
