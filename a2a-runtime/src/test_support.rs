//! Test doubles for exercising the runtime without a real agent or
//! webhook endpoint. Used by the crate's own tests and available to
//! downstream integration tests.

use crate::errors::{A2AError, A2AResult};
use crate::push::PushNotificationSender;
use crate::runtime::{AgentRuntime, AgentUpdate, AgentUpdateStream, ExecutionContext};
use a2a_types::{
    Artifact, Message, MessageRole, Part, PushNotificationConfig, TaskEvent, TaskState,
    MESSAGE_KIND,
};
use async_stream::stream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Builds a requester message with a single text part.
#[must_use]
pub fn user_message(text: &str) -> Message {
    Message {
        kind: MESSAGE_KIND.to_string(),
        message_id: uuid::Uuid::new_v4().to_string(),
        role: MessageRole::Requester,
        parts: vec![Part::text(text)],
        task_id: None,
        session_id: None,
        metadata: None,
    }
}

/// Builds an agent message with a single text part.
#[must_use]
pub fn agent_message(text: &str) -> Message {
    Message {
        role: MessageRole::Agent,
        ..user_message(text)
    }
}

/// Builds a one-part text artifact.
#[must_use]
pub fn text_artifact(artifact_id: &str, text: &str) -> Artifact {
    Artifact {
        artifact_id: artifact_id.to_string(),
        name: None,
        description: None,
        parts: vec![Part::text(text)],
        metadata: None,
    }
}

/// One scripted step: either an update to yield or a failure message to
/// surface as a stream error.
pub type ScriptStep = Result<AgentUpdate, String>;

/// An [`AgentRuntime`] that replays pre-scripted update sequences.
///
/// Each call to `execute` consumes the next script in FIFO order and
/// counts the invocation, which is what single-execution tests assert on.
/// With `hang_until_canceled` set, an exhausted script parks the stream
/// until the execution's cancellation token fires.
#[derive(Default)]
pub struct ScriptedRuntime {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    executions: AtomicUsize,
    step_delay: Option<Duration>,
    hang_until_canceled: bool,
}

impl ScriptedRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime whose next execution produces one artifact and completes.
    #[must_use]
    pub fn completing_with(artifact_text: &str) -> Self {
        let runtime = Self::new();
        runtime.push_script(vec![
            Ok(AgentUpdate::Artifact {
                artifact: text_artifact("artifact-1", artifact_text),
                append: false,
                last_chunk: true,
            }),
            Ok(AgentUpdate::Status {
                state: TaskState::Completed,
                message: None,
            }),
        ]);
        runtime
    }

    /// A runtime whose next execution fails mid-stream.
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        let runtime = Self::new();
        runtime.push_script(vec![Err(reason.to_string())]);
        runtime
    }

    /// A runtime that emits nothing and parks until canceled.
    #[must_use]
    pub fn hanging() -> Self {
        Self {
            hang_until_canceled: true,
            ..Self::new()
        }
    }

    /// Inserts a fixed pause before each scripted step, so concurrent
    /// submissions overlap deterministically.
    #[must_use]
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Queues another script; consumed by the next `execute` call.
    pub fn push_script(&self, script: Vec<ScriptStep>) {
        self.scripts
            .lock()
            .expect("script queue poisoned")
            .push_back(script);
    }

    /// How many times `execute` has been invoked.
    #[must_use]
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn execute(&self, context: ExecutionContext) -> A2AResult<AgentUpdateStream> {
        self.executions.fetch_add(1, Ordering::SeqCst);

        let script = self
            .scripts
            .lock()
            .expect("script queue poisoned")
            .pop_front()
            .unwrap_or_default();
        let step_delay = self.step_delay;
        let hang = self.hang_until_canceled;
        let task_id = context.task.id.clone();
        let cancellation = context.cancellation.clone();

        let updates = stream! {
            for step in script {
                if let Some(delay) = step_delay {
                    tokio::time::sleep(delay).await;
                }
                if cancellation.is_cancelled() {
                    return;
                }
                match step {
                    Ok(update) => yield Ok(update),
                    Err(reason) => {
                        yield Err(A2AError::Execution {
                            task_id: task_id.clone(),
                            reason,
                        });
                        return;
                    }
                }
            }
            if hang {
                cancellation.cancelled().await;
            }
        };

        Ok(Box::pin(updates))
    }
}

/// A [`PushNotificationSender`] that records every call instead of
/// touching the network.
pub struct RecordingPushSender {
    verify_result: bool,
    verified_urls: Mutex<Vec<String>>,
    sent: Mutex<Vec<(PushNotificationConfig, TaskEvent)>>,
}

impl RecordingPushSender {
    /// A sender that passes every URL verification.
    #[must_use]
    pub fn accepting() -> Self {
        Self::with_verify_result(true)
    }

    /// A sender that fails every URL verification.
    #[must_use]
    pub fn rejecting() -> Self {
        Self::with_verify_result(false)
    }

    #[must_use]
    pub fn with_verify_result(verify_result: bool) -> Self {
        Self {
            verify_result,
            verified_urls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// URLs that have been challenged, in order.
    #[must_use]
    pub fn verified_urls(&self) -> Vec<String> {
        self.verified_urls
            .lock()
            .expect("verified list poisoned")
            .clone()
    }

    /// Events delivered so far, in order.
    #[must_use]
    pub fn sent_events(&self) -> Vec<TaskEvent> {
        self.sent
            .lock()
            .expect("sent list poisoned")
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl PushNotificationSender for RecordingPushSender {
    async fn verify_url(&self, url: &str) -> bool {
        self.verified_urls
            .lock()
            .expect("verified list poisoned")
            .push(url.to_string());
        self.verify_result
    }

    async fn send(&self, config: &PushNotificationConfig, event: &TaskEvent) -> A2AResult<()> {
        self.sent
            .lock()
            .expect("sent list poisoned")
            .push((config.clone(), event.clone()));
        Ok(())
    }
}
