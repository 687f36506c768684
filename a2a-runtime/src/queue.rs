//! Task scheduling with per-task single-flight execution.
//!
//! The queue guarantees at most one live execution per (tenant, task id):
//! a claim table maps execution keys to cancellation tokens, and a second
//! enqueue while a claim is held is coalesced into the running execution
//! rather than started. The claim is released when the execution reaches
//! a terminal state, pauses for input, or is canceled.
//!
//! Cancellation is cooperative. `cancel` fires the claimed token and
//! removes the claim; the running driver stops forwarding updates once
//! the token fires and the caller publishes the terminal `canceled`
//! event.

use crate::broker::EventBroker;
use crate::errors::A2AResult;
use crate::runtime::{AgentRuntime, AgentUpdate, ExecutionContext};
use crate::status;
use a2a_types::{Message, Task, TaskArtifactUpdateEvent, TaskEvent, TaskState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Claim table for running executions, keyed by `{tenant:}taskId`.
#[derive(Default)]
pub struct InFlightTasks {
    tasks: DashMap<String, CancellationToken>,
}

impl InFlightTasks {
    /// Claims the key for a new execution. Returns the execution's
    /// cancellation token, or `None` when an execution already holds it.
    fn try_claim(&self, key: &str) -> Option<CancellationToken> {
        match self.tasks.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let token = CancellationToken::new();
                vacant.insert(token.clone());
                Some(token)
            }
        }
    }

    /// Removes the claim, returning its token if one was held.
    fn take(&self, key: &str) -> Option<CancellationToken> {
        self.tasks.remove(key).map(|(_, token)| token)
    }

    fn release(&self, key: &str) {
        self.tasks.remove(key);
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }
}

/// How a driver run ended; decides which final event (if any) it owns.
enum RunOutcome {
    /// The stream ended without reaching a terminal state.
    Drained { last_state: TaskState },
    /// A terminal or pause event was already published.
    Settled,
    /// The cancellation token fired; the canceler publishes the final event.
    Canceled,
}

/// Schedules task executions and enforces single-flight per task.
pub struct TaskQueue {
    runtime: Arc<dyn AgentRuntime>,
    broker: Arc<EventBroker>,
    in_flight: Arc<InFlightTasks>,
}

impl TaskQueue {
    #[must_use]
    pub fn new(runtime: Arc<dyn AgentRuntime>, broker: Arc<EventBroker>) -> Self {
        Self {
            runtime,
            broker,
            in_flight: Arc::new(InFlightTasks::default()),
        }
    }

    /// Starts executing a task on a background worker.
    ///
    /// Returns `Ok(false)` when an execution for the same (tenant, task)
    /// is already running; the submission is coalesced into it.
    pub fn enqueue(&self, tenant: Option<&str>, task: Task, message: Message) -> A2AResult<bool> {
        let key = execution_key(tenant, &task.id);
        let Some(token) = self.in_flight.try_claim(&key) else {
            debug!(task_id = %task.id, "execution already in flight, coalescing");
            return Ok(false);
        };

        let runtime = self.runtime.clone();
        let broker = self.broker.clone();
        let in_flight = self.in_flight.clone();
        let tenant = tenant.map(str::to_string);

        tokio::spawn(async move {
            drive(runtime, broker, tenant, task, message, token).await;
            in_flight.release(&key);
        });

        Ok(true)
    }

    /// Signals cooperative cancellation of a running execution.
    ///
    /// Returns whether an execution was in flight. The claimed slot is
    /// released immediately; the caller owns publishing the terminal
    /// `canceled` event.
    pub fn cancel(&self, tenant: Option<&str>, task_id: &str) -> bool {
        let key = execution_key(tenant, task_id);
        match self.in_flight.take(&key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether an execution currently holds the claim for this task.
    #[must_use]
    pub fn is_in_flight(&self, tenant: Option<&str>, task_id: &str) -> bool {
        self.in_flight.contains(&execution_key(tenant, task_id))
    }
}

fn execution_key(tenant: Option<&str>, task_id: &str) -> String {
    match tenant {
        Some(tenant) => format!("{tenant}:{task_id}"),
        None => task_id.to_string(),
    }
}

/// Runs one execution to its end and publishes its events in order.
async fn drive(
    runtime: Arc<dyn AgentRuntime>,
    broker: Arc<EventBroker>,
    tenant: Option<String>,
    task: Task,
    message: Message,
    token: CancellationToken,
) {
    let task_id = task.id.clone();
    let session_id = task.session_id.clone();
    let tenant = tenant.as_deref();

    // The execution itself begins by moving the task to `working`,
    // whether this is a first run or a resume from `input-required`.
    let working = TaskEvent::StatusUpdate(status::status_update_event(
        &task_id,
        session_id.as_deref(),
        status::working_status(),
    ));
    if let Err(error) = broker.publish(tenant, working).await {
        warn!(%task_id, %error, "could not mark task working, aborting execution");
        return;
    }

    let context = ExecutionContext {
        task,
        latest_message: message,
        cancellation: token.clone(),
    };

    let mut stream = match runtime.execute(context).await {
        Ok(stream) => stream,
        Err(error) => {
            publish_failed(&broker, tenant, &task_id, session_id.as_deref(), &error.to_string())
                .await;
            return;
        }
    };

    let mut last_state = TaskState::Working;
    let outcome = loop {
        let update = tokio::select! {
            () = token.cancelled() => break RunOutcome::Canceled,
            update = stream.next() => update,
        };

        match update {
            None => break RunOutcome::Drained { last_state },
            Some(Ok(AgentUpdate::Status { state, message })) => {
                if !status::transition_allowed(&last_state, &state) {
                    warn!(
                        %task_id,
                        from = ?last_state,
                        to = ?state,
                        "runtime emitted an illegal state transition, dropping"
                    );
                    continue;
                }
                let event = TaskEvent::StatusUpdate(status::status_update_event(
                    &task_id,
                    session_id.as_deref(),
                    status::status(state, message),
                ));
                if let Err(error) = broker.publish(tenant, event).await {
                    debug!(%task_id, %error, "stopping execution, task already settled");
                    break RunOutcome::Canceled;
                }
                if status::is_terminal_state(&state) {
                    break RunOutcome::Settled;
                }
                if state == TaskState::InputRequired {
                    // Execution pauses here; a follow-up message starts a
                    // fresh execution, so the claim must be released.
                    break RunOutcome::Settled;
                }
                last_state = state;
            }
            Some(Ok(AgentUpdate::Artifact {
                artifact,
                append,
                last_chunk,
            })) => {
                let event = TaskEvent::ArtifactUpdate(TaskArtifactUpdateEvent {
                    task_id: task_id.clone(),
                    session_id: session_id.clone(),
                    artifact,
                    append: Some(append),
                    last_chunk: Some(last_chunk),
                    metadata: None,
                });
                if let Err(error) = broker.publish(tenant, event).await {
                    debug!(%task_id, %error, "stopping execution, task already settled");
                    break RunOutcome::Canceled;
                }
            }
            Some(Err(error)) => {
                publish_failed(
                    &broker,
                    tenant,
                    &task_id,
                    session_id.as_deref(),
                    &error.to_string(),
                )
                .await;
                break RunOutcome::Settled;
            }
        }
    };

    // A drained stream that never reached a terminal state means the
    // runtime considers the work done.
    if let RunOutcome::Drained { last_state } = outcome {
        if !status::is_terminal_state(&last_state) && last_state != TaskState::InputRequired {
            let completed = TaskEvent::StatusUpdate(status::status_update_event(
                &task_id,
                session_id.as_deref(),
                status::status(TaskState::Completed, None),
            ));
            if let Err(error) = broker.publish(tenant, completed).await {
                debug!(%task_id, %error, "task settled before implicit completion");
            }
        }
    }
}

async fn publish_failed(
    broker: &EventBroker,
    tenant: Option<&str>,
    task_id: &str,
    session_id: Option<&str>,
    reason: &str,
) {
    let detail = status::agent_text_message(task_id, reason);
    let event = TaskEvent::StatusUpdate(status::status_update_event(
        task_id,
        session_id,
        status::failed_status(Some(detail)),
    ));
    if let Err(error) = broker.publish(tenant, event).await {
        debug!(%task_id, %error, "task settled before failure could be recorded");
    }
}
