//! # A2A (Agent2Agent) Protocol Types
//!
//! Rust data structures for the Agent2Agent (A2A) task protocol: the
//! task lifecycle object, the messages and artifacts exchanged during
//! execution, the streaming update events, and the push notification
//! configuration. The types are designed for serialization and
//! deserialization with `serde` and carry the wire-level field names
//! (camelCase, `kind` discriminators) of the protocol schema.
//!
//! The runtime that drives these types lives in the `a2a-runtime`
//! crate; this crate is intentionally free of I/O and async code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Constants for `kind` discriminator values.
pub const TASK_KIND: &str = "task";
pub const MESSAGE_KIND: &str = "message";
pub const STATUS_UPDATE_KIND: &str = "status-update";
pub const ARTIFACT_UPDATE_KIND: &str = "artifact-update";

// ============================================================================
// Task Lifecycle Types
// ============================================================================

/// Defines the lifecycle states of a Task.
///
/// `Submitted` and `Working` are non-terminal. `InputRequired` is
/// non-terminal and round-trips back to `Working` when the caller
/// supplies the requested input. `Completed`, `Canceled` and `Failed`
/// are terminal; no operation transitions out of them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// The task has been submitted and is awaiting execution.
    Submitted,
    /// The agent is actively working on the task.
    Working,
    /// The task is paused and waiting for input from the caller.
    InputRequired,
    /// The task has been successfully completed.
    Completed,
    /// The task has been canceled by the caller.
    Canceled,
    /// The task failed due to an error during execution.
    Failed,
}

/// Represents the status of a task at a specific point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatus {
    /// The current state of the task's lifecycle.
    pub state: TaskState,
    /// An ISO 8601 datetime string indicating when this status was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// An optional agent message providing more details about the current
    /// status. When present it becomes part of the task's history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// Represents a single unit of requested work tracked through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// The type of this object, used as a discriminator. Always 'task'.
    #[serde(default = "default_task_kind")]
    pub kind: String,
    /// A unique identifier for the task. Immutable after creation.
    pub id: String,
    /// Groups related tasks and messages belonging to one conversation.
    #[serde(skip_serializing_if = "Option::is_none", rename = "sessionId")]
    pub session_id: Option<String>,
    /// The current status of the task.
    pub status: TaskStatus,
    /// Ordered, append-only sequence of messages exchanged during the task.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub history: Vec<Message>,
    /// Ordered sequence of artifacts produced during execution.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub artifacts: Vec<Artifact>,
    /// Optional metadata for extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

fn default_task_kind() -> String {
    TASK_KIND.to_string()
}

// ============================================================================
// Messages and Parts
// ============================================================================

/// Identifies the sender of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// For messages sent by the caller submitting the task.
    Requester,
    /// For messages sent by the agent.
    Agent,
}

/// Represents a single turn in the conversation between a requester and an
/// agent. Immutable once appended to a task's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// The type of this object, used as a discriminator. Always 'message'.
    #[serde(default = "default_message_kind")]
    pub kind: String,
    /// A unique identifier for the message, generated by the sender.
    #[serde(rename = "messageId")]
    pub message_id: String,
    /// Identifies the sender of the message.
    pub role: MessageRole,
    /// The ordered content parts that form the message body.
    pub parts: Vec<Part>,
    /// The identifier of the task this message is part of. May be omitted
    /// for the first message of a new task.
    #[serde(skip_serializing_if = "Option::is_none", rename = "taskId")]
    pub task_id: Option<String>,
    /// The session this message belongs to.
    #[serde(skip_serializing_if = "Option::is_none", rename = "sessionId")]
    pub session_id: Option<String>,
    /// Optional metadata for extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

fn default_message_kind() -> String {
    MESSAGE_KIND.to_string()
}

/// A discriminated union representing one part of a message or artifact.
///
/// Decoding dispatches on the required `kind` tag; an unrecognized tag is
/// a deserialization error surfaced by the runtime as a validation error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    /// Represents a text segment.
    Text {
        /// The string content of the text part.
        text: String,
        /// Optional metadata associated with this part.
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<HashMap<String, serde_json::Value>>,
    },
    /// Represents a structured data segment (e.g., JSON).
    Data {
        /// The structured data content.
        data: serde_json::Value,
        /// Optional metadata associated with this part.
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<HashMap<String, serde_json::Value>>,
    },
    /// Represents a file segment.
    File {
        /// The file content, either a URI or base64-encoded bytes.
        file: FileContent,
        /// Optional metadata associated with this part.
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<HashMap<String, serde_json::Value>>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text {
            text: text.into(),
            metadata: None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            Part::Data { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// Represents file content, provided either directly as bytes or as a URI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FileContent {
    WithBytes(FileWithBytes),
    WithUri(FileWithUri),
}

/// A file with its content provided directly as a base64-encoded string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileWithBytes {
    /// The base64-encoded content of the file.
    pub bytes: String,
    /// The MIME type of the file (e.g., "application/pdf").
    #[serde(skip_serializing_if = "Option::is_none", rename = "mimeType")]
    pub mime_type: Option<String>,
    /// An optional name for the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A file with its content located at a specific URI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileWithUri {
    /// A URL pointing to the file's content.
    pub uri: String,
    /// The MIME type of the file (e.g., "application/pdf").
    #[serde(skip_serializing_if = "Option::is_none", rename = "mimeType")]
    pub mime_type: Option<String>,
    /// An optional name for the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ============================================================================
// Artifacts
// ============================================================================

/// A named output object produced by task execution.
///
/// Artifacts may be streamed incrementally: several update events can carry
/// the same `artifactId`, and consumers merge them by id, appending parts
/// when the event's `append` flag is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    /// A unique identifier for the artifact within the scope of the task.
    #[serde(rename = "artifactId")]
    pub artifact_id: String,
    /// An optional, human-readable name for the artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// An optional, human-readable description of the artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The ordered content parts that make up the artifact.
    pub parts: Vec<Part>,
    /// Optional metadata for extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

// ============================================================================
// Streaming Event Types
// ============================================================================

/// An event notifying listeners of a change in a task's status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatusUpdateEvent {
    /// The ID of the task that was updated.
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// The session associated with the task.
    #[serde(skip_serializing_if = "Option::is_none", rename = "sessionId")]
    pub session_id: Option<String>,
    /// The new status of the task.
    pub status: TaskStatus,
    /// If true, this is the final event in the stream for this task. No
    /// further events may be delivered after a final event.
    #[serde(rename = "final")]
    pub is_final: bool,
    /// Optional metadata for extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// An event notifying listeners that an artifact has been generated or
/// updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskArtifactUpdateEvent {
    /// The ID of the task this artifact belongs to.
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// The session associated with the task.
    #[serde(skip_serializing_if = "Option::is_none", rename = "sessionId")]
    pub session_id: Option<String>,
    /// The artifact delta that was produced.
    pub artifact: Artifact,
    /// If true, the parts of this artifact are appended to a previously
    /// sent artifact with the same id rather than replacing it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append: Option<bool>,
    /// If true, this is the final chunk of the artifact.
    #[serde(skip_serializing_if = "Option::is_none", rename = "lastChunk")]
    pub last_chunk: Option<bool>,
    /// Optional metadata for extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// A discriminated union of the events emitted over a task's stream.
///
/// The `kind` tag selects the variant (`status-update` or
/// `artifact-update`); decoding an unrecognized tag fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum TaskEvent {
    #[serde(rename = "status-update")]
    StatusUpdate(TaskStatusUpdateEvent),
    #[serde(rename = "artifact-update")]
    ArtifactUpdate(TaskArtifactUpdateEvent),
}

impl TaskEvent {
    /// The id of the task this event belongs to.
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::StatusUpdate(update) => &update.task_id,
            TaskEvent::ArtifactUpdate(update) => &update.task_id,
        }
    }

    /// Whether this event terminates the task's stream.
    pub fn is_final(&self) -> bool {
        match self {
            TaskEvent::StatusUpdate(update) => update.is_final,
            TaskEvent::ArtifactUpdate(_) => false,
        }
    }
}

// ============================================================================
// Push Notifications
// ============================================================================

/// Configuration for out-of-band webhook delivery of task events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushNotificationConfig {
    /// A unique ID for this configuration within its task, set by the
    /// client or generated by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The callback URL where the server should send push notifications.
    pub url: String,
    /// A token attached to deliveries so the target can validate them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Optional authentication details for calling the notification URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<PushNotificationAuthenticationInfo>,
}

/// Authentication details for a push notification endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushNotificationAuthenticationInfo {
    /// The supported authentication schemes (e.g., 'Bearer').
    pub schemes: Vec<String>,
    /// Optional credentials required by the endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

// ============================================================================
// Capabilities
// ============================================================================

/// The capability flags from an agent's discovery document that drive the
/// protocol handler: unsupported features are rejected at the boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentCapabilities {
    /// Whether the agent supports live event subscriptions.
    pub streaming: bool,
    /// Whether the agent supports push notification webhooks.
    pub push_notifications: bool,
    /// Whether status transitions are recorded into task history.
    pub state_transition_history: bool,
}

impl Default for AgentCapabilities {
    fn default() -> Self {
        Self {
            streaming: true,
            push_notifications: true,
            state_transition_history: true,
        }
    }
}
