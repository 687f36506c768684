/// Main error type for the A2A task runtime.
///
/// Errors detected at the handler boundary (validation, not-found,
/// invalid-state, capability) are returned synchronously and never mutate
/// task state. Faults during asynchronous execution become a terminal
/// `failed` status update instead of crossing the enqueue boundary.
#[derive(Debug, thiserror::Error)]
pub enum A2AError {
    // === Request Validation Errors ===
    #[error("Validation error: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Invalid task state: cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },

    #[error("Capability not supported: {capability}")]
    CapabilityNotSupported { capability: String },

    // === Push Notification Errors ===
    #[error("Push notification URL verification failed: {url}")]
    PushNotificationVerification { url: String },

    // === Store Errors ===
    #[error("Store unavailable ({backend}): {reason}")]
    StoreUnavailable { backend: String, reason: String },

    // === Execution Errors ===
    #[error("Execution error for task {task_id}: {reason}")]
    Execution { task_id: String, reason: String },

    // === General System Errors ===
    #[error("Serialization error: {format}: {reason}")]
    Serialization { format: String, reason: String },

    #[error("Internal error: {component}: {reason}")]
    Internal { component: String, reason: String },
}

/// Convenience type alias.
pub type A2AResult<T> = std::result::Result<T, A2AError>;

impl A2AError {
    /// Shorthand for a validation failure on a named request field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Convert common std/ecosystem errors to `A2AError`.
impl From<serde_json::Error> for A2AError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            format: "json".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<std::io::Error> for A2AError {
    fn from(error: std::io::Error) -> Self {
        Self::Internal {
            component: "io".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for A2AError {
    fn from(error: reqwest::Error) -> Self {
        Self::Internal {
            component: "http_client".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<redis::RedisError> for A2AError {
    fn from(error: redis::RedisError) -> Self {
        Self::StoreUnavailable {
            backend: "redis".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for A2AError {
    fn from(error: tokio::task::JoinError) -> Self {
        let reason = if error.is_cancelled() {
            "task cancelled".to_string()
        } else if error.is_panic() {
            "task panicked".to_string()
        } else {
            error.to_string()
        };

        Self::Internal {
            component: "task".to_string(),
            reason,
        }
    }
}
