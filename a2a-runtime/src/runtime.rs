//! The pluggable agent runtime boundary.
//!
//! The runtime is the external collaborator that actually computes a
//! task's result. The scheduler invokes [`AgentRuntime::execute`] once
//! per enqueue and forwards every update the returned stream yields to
//! the event broker. The runtime must honor the cancellation token in
//! its [`ExecutionContext`] and stop emitting updates promptly once it
//! fires; the scheduler does not block waiting for it to quiesce.

use crate::errors::A2AResult;
use a2a_types::{Artifact, Message, Task, TaskState};
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// Everything a runtime invocation needs: the task snapshot (including
/// history), the message that triggered this execution, and the
/// cooperative cancellation signal.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Snapshot of the task at enqueue time.
    pub task: Task,
    /// The message that triggered this execution (initial or resume input).
    pub latest_message: Message,
    /// Fires when the caller requests cancellation.
    pub cancellation: CancellationToken,
}

/// One update produced by an executing agent.
///
/// Finality is not expressed here: the scheduler derives it from the
/// state (only terminal states close the task's stream).
#[derive(Debug, Clone)]
pub enum AgentUpdate {
    /// The task moved to a new lifecycle state, optionally with an agent
    /// message describing it.
    Status {
        state: TaskState,
        message: Option<Message>,
    },
    /// An artifact (or an incremental chunk of one) was produced.
    Artifact {
        artifact: Artifact,
        append: bool,
        last_chunk: bool,
    },
}

/// Stream of updates produced by one runtime invocation.
pub type AgentUpdateStream = BoxStream<'static, A2AResult<AgentUpdate>>;

/// A pluggable computation backend for tasks.
#[async_trait::async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Starts (or resumes) execution of a task, returning a lazy stream
    /// of updates. Invoked at most once per enqueue.
    async fn execute(&self, context: ExecutionContext) -> A2AResult<AgentUpdateStream>;

    /// Notifies the runtime that a task was canceled. Optional hook; the
    /// cancellation token in the execution context is the primary signal.
    async fn cancel(&self, _task: &Task) -> A2AResult<()> {
        Ok(())
    }
}
