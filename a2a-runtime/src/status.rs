//! State machine helpers for task statuses.
//!
//! Centralizes the lifecycle rules (`submitted → working →
//! {input-required ⇄ working} → {completed | canceled | failed}`) and the
//! constructors for the status objects and events the runtime emits.
//! Keeping this logic isolated ensures a single source of truth for the
//! transition edges the rest of the crate enforces.

use a2a_types::{Message, MessageRole, Part, TaskState, TaskStatus, TaskStatusUpdateEvent};

/// Checks if a `TaskState` is terminal (cannot transition further).
///
/// `InputRequired` is NOT terminal; it transitions back to `Working`
/// when the caller supplies input.
#[must_use]
pub const fn is_terminal_state(state: &TaskState) -> bool {
    matches!(
        state,
        TaskState::Completed | TaskState::Canceled | TaskState::Failed
    )
}

/// Checks if a task can be resumed with new input.
#[must_use]
pub const fn can_resume(state: &TaskState) -> bool {
    matches!(state, TaskState::InputRequired)
}

/// Checks whether a transition between two states follows a lifecycle edge.
///
/// Self-transitions are allowed for non-terminal states (repeated
/// `working` updates while an agent streams progress are legal).
#[must_use]
pub const fn transition_allowed(from: &TaskState, to: &TaskState) -> bool {
    match from {
        TaskState::Submitted => !matches!(to, TaskState::InputRequired),
        // `submitted` is an entry state; nothing transitions back into it.
        TaskState::Working => !matches!(to, TaskState::Submitted),
        TaskState::InputRequired => matches!(
            to,
            TaskState::Working | TaskState::InputRequired | TaskState::Canceled | TaskState::Failed
        ),
        // Terminal states have no outgoing edges.
        TaskState::Completed | TaskState::Canceled | TaskState::Failed => false,
    }
}

/// Creates a `TaskStatus` for a freshly created task.
#[must_use]
pub fn submitted_status() -> TaskStatus {
    status(TaskState::Submitted, None)
}

/// Creates a `TaskStatus` representing the Working state, used when a task
/// begins execution or resumes from `input-required`.
#[must_use]
pub fn working_status() -> TaskStatus {
    status(TaskState::Working, None)
}

/// Creates a terminal `TaskStatus` for a canceled task.
#[must_use]
pub fn canceled_status() -> TaskStatus {
    status(TaskState::Canceled, None)
}

/// Creates a terminal `TaskStatus` for a failed task, attaching the failure
/// detail as the status message.
#[must_use]
pub fn failed_status(detail: Option<Message>) -> TaskStatus {
    status(TaskState::Failed, detail)
}

/// Creates a timestamped `TaskStatus` for the given state.
#[must_use]
pub fn status(state: TaskState, message: Option<Message>) -> TaskStatus {
    TaskStatus {
        state,
        timestamp: Some(now()),
        message,
    }
}

/// Creates the status update event emitted when a task's status changes.
/// Finality is derived from the state: only terminal states close the
/// task's event stream.
#[must_use]
pub fn status_update_event(
    task_id: &str,
    session_id: Option<&str>,
    status: TaskStatus,
) -> TaskStatusUpdateEvent {
    let is_final = is_terminal_state(&status.state);
    TaskStatusUpdateEvent {
        task_id: task_id.to_string(),
        session_id: session_id.map(str::to_string),
        status,
        is_final,
        metadata: None,
    }
}

/// Current UTC time in RFC 3339 format, the timestamp format the protocol
/// carries on statuses.
#[must_use]
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Builds an agent-authored message with a single text part, used for
/// status detail (failure reasons, input prompts).
#[must_use]
pub fn agent_text_message(task_id: &str, text: &str) -> Message {
    Message {
        kind: a2a_types::MESSAGE_KIND.to_string(),
        message_id: uuid::Uuid::new_v4().to_string(),
        role: MessageRole::Agent,
        parts: vec![Part::text(text)],
        task_id: Some(task_id.to_string()),
        session_id: None,
        metadata: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(is_terminal_state(&TaskState::Completed));
        assert!(is_terminal_state(&TaskState::Canceled));
        assert!(is_terminal_state(&TaskState::Failed));

        assert!(!is_terminal_state(&TaskState::Submitted));
        assert!(!is_terminal_state(&TaskState::Working));
        assert!(!is_terminal_state(&TaskState::InputRequired));
    }

    #[test]
    fn only_input_required_can_resume() {
        assert!(can_resume(&TaskState::InputRequired));
        assert!(!can_resume(&TaskState::Working));
        assert!(!can_resume(&TaskState::Completed));
    }

    #[test]
    fn no_edges_out_of_terminal_states() {
        for from in [TaskState::Completed, TaskState::Canceled, TaskState::Failed] {
            for to in [
                TaskState::Submitted,
                TaskState::Working,
                TaskState::InputRequired,
                TaskState::Completed,
                TaskState::Canceled,
                TaskState::Failed,
            ] {
                assert!(!transition_allowed(&from, &to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn nothing_transitions_back_into_submitted() {
        assert!(!transition_allowed(
            &TaskState::Working,
            &TaskState::Submitted
        ));
        assert!(!transition_allowed(
            &TaskState::InputRequired,
            &TaskState::Submitted
        ));
        // Repeated `working` progress updates stay legal.
        assert!(transition_allowed(&TaskState::Working, &TaskState::Working));
    }

    #[test]
    fn input_required_round_trips_to_working() {
        assert!(transition_allowed(
            &TaskState::InputRequired,
            &TaskState::Working
        ));
        assert!(transition_allowed(
            &TaskState::Working,
            &TaskState::InputRequired
        ));
        assert!(!transition_allowed(
            &TaskState::InputRequired,
            &TaskState::Completed
        ));
    }

    #[test]
    fn finality_derived_from_state() {
        let event = status_update_event("task-1", None, working_status());
        assert!(!event.is_final);

        let event = status_update_event("task-1", Some("s"), canceled_status());
        assert!(event.is_final);
        assert_eq!(event.session_id.as_deref(), Some("s"));
    }
}
