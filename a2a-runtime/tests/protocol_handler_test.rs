//! End-to-end tests of the protocol handler: full task lifecycles over
//! the in-memory store with a scripted agent runtime.

use a2a_runtime::config::HandlerConfig;
use a2a_runtime::handler::{MessageSendOptions, ProtocolHandler};
use a2a_runtime::runtime::AgentUpdate;
use a2a_runtime::store::InMemoryTaskStore;
use a2a_runtime::test_support::{user_message, RecordingPushSender, ScriptedRuntime};
use a2a_types::{PushNotificationConfig, TaskEvent, TaskState};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn blocking() -> MessageSendOptions {
    MessageSendOptions {
        blocking: true,
        history_length: None,
    }
}

fn handler_with(
    runtime: Arc<ScriptedRuntime>,
    sender: Arc<RecordingPushSender>,
) -> ProtocolHandler {
    let config = HandlerConfig::new(Arc::new(InMemoryTaskStore::new()), runtime)
        .with_push_sender(sender);
    ProtocolHandler::new(config)
}

#[tokio::test]
async fn full_lifecycle_streams_ordered_events_with_single_final() {
    init_tracing();
    let runtime = Arc::new(ScriptedRuntime::completing_with("the answer"));
    let handler = handler_with(runtime, Arc::new(RecordingPushSender::accepting()));

    let (task, mut events) = handler
        .send_message_streaming(None, user_message("compute"))
        .await
        .unwrap();
    assert!(matches!(
        task.status.state,
        TaskState::Submitted | TaskState::Working
    ));

    let mut finals = 0;
    let mut states = Vec::new();
    let mut artifacts = 0;
    while let Some(event) = events.next().await {
        if event.is_final() {
            finals += 1;
        }
        match event {
            TaskEvent::StatusUpdate(update) => states.push(update.status.state),
            TaskEvent::ArtifactUpdate(_) => artifacts += 1,
        }
    }

    assert_eq!(states, vec![TaskState::Working, TaskState::Completed]);
    assert_eq!(artifacts, 1);
    assert_eq!(finals, 1);

    let settled = handler.get_task(None, &task.id, None).await.unwrap();
    assert_eq!(settled.status.state, TaskState::Completed);
    assert_eq!(
        settled.artifacts[0].parts[0].as_text(),
        Some("the answer")
    );
}

#[tokio::test]
async fn multi_turn_task_pauses_and_resumes() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(vec![Ok(AgentUpdate::Status {
        state: TaskState::InputRequired,
        message: None,
    })]);
    runtime.push_script(vec![Ok(AgentUpdate::Status {
        state: TaskState::Completed,
        message: None,
    })]);
    let handler = handler_with(runtime.clone(), Arc::new(RecordingPushSender::accepting()));

    let paused = handler
        .send_message(None, user_message("start"), &blocking())
        .await
        .unwrap();
    assert_eq!(paused.status.state, TaskState::InputRequired);

    let mut follow_up = user_message("here is the input");
    follow_up.task_id = Some(paused.id.clone());
    let done = handler
        .send_message(None, follow_up, &blocking())
        .await
        .unwrap();

    assert_eq!(done.status.state, TaskState::Completed);
    assert_eq!(runtime.executions(), 2);
    // Both requester turns survive in history, in order.
    let turns: Vec<_> = done
        .history
        .iter()
        .filter_map(|m| m.parts[0].as_text())
        .collect();
    assert!(turns.contains(&"start"));
    assert!(turns.contains(&"here is the input"));
}

#[tokio::test]
async fn failing_execution_settles_the_task_as_failed() {
    let runtime = Arc::new(ScriptedRuntime::failing("model unavailable"));
    let handler = handler_with(runtime, Arc::new(RecordingPushSender::accepting()));

    let task = handler
        .send_message(None, user_message("compute"), &blocking())
        .await
        .unwrap();

    assert_eq!(task.status.state, TaskState::Failed);
    let detail = task.status.message.expect("failure detail attached");
    assert!(detail.parts[0]
        .as_text()
        .unwrap()
        .contains("model unavailable"));
}

#[tokio::test]
async fn rejected_webhook_is_never_persisted_and_never_notified() {
    let runtime = Arc::new(ScriptedRuntime::completing_with("done"));
    let sender = Arc::new(RecordingPushSender::rejecting());
    let handler = handler_with(runtime.clone(), sender.clone());

    let task = handler
        .send_message(None, user_message("compute"), &blocking())
        .await
        .unwrap();

    let result = handler
        .set_push_notification_config(
            None,
            &task.id,
            PushNotificationConfig {
                id: None,
                url: "https://webhook.invalid/cb".into(),
                token: None,
                authentication: None,
            },
        )
        .await;
    assert!(result.is_err());
    assert_eq!(sender.verified_urls(), vec!["https://webhook.invalid/cb"]);
    assert!(sender.sent_events().is_empty());
    assert!(handler
        .list_push_notification_configs(None, &task.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn verified_webhook_receives_every_event_for_its_task() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(vec![Ok(AgentUpdate::Status {
        state: TaskState::InputRequired,
        message: None,
    })]);
    runtime.push_script(vec![Ok(AgentUpdate::Status {
        state: TaskState::Completed,
        message: None,
    })]);
    let sender = Arc::new(RecordingPushSender::accepting());
    let handler = handler_with(runtime, sender.clone());

    let paused = handler
        .send_message(None, user_message("start"), &blocking())
        .await
        .unwrap();
    handler
        .set_push_notification_config(
            None,
            &paused.id,
            PushNotificationConfig {
                id: None,
                url: "https://webhook.invalid/cb".into(),
                token: None,
                authentication: None,
            },
        )
        .await
        .unwrap();

    let mut follow_up = user_message("go on");
    follow_up.task_id = Some(paused.id.clone());
    handler
        .send_message(None, follow_up, &blocking())
        .await
        .unwrap();

    // The resumed execution publishes working then completed, and the
    // webhook sees both in order.
    let sent = sender.sent_events();
    assert_eq!(sent.len(), 2);
    assert!(!sent[0].is_final());
    assert!(sent[1].is_final());
}

#[tokio::test]
async fn subscribing_to_a_settled_task_yields_a_closed_empty_stream() {
    let runtime = Arc::new(ScriptedRuntime::completing_with("done"));
    let handler = handler_with(runtime, Arc::new(RecordingPushSender::accepting()));

    let task = handler
        .send_message(None, user_message("compute"), &blocking())
        .await
        .unwrap();
    assert_eq!(task.status.state, TaskState::Completed);

    let mut events = handler.subscribe_to_task(None, &task.id).await.unwrap();
    assert!(events.next().await.is_none());
}

#[tokio::test]
async fn concurrent_sends_for_one_task_execute_once() {
    init_tracing();
    let runtime = Arc::new(
        ScriptedRuntime::completing_with("done").with_step_delay(Duration::from_millis(50)),
    );
    let handler = Arc::new(handler_with(
        runtime.clone(),
        Arc::new(RecordingPushSender::accepting()),
    ));

    let task_id = "race-task";
    let send = |text: &str| {
        let handler = handler.clone();
        let mut message = user_message(text);
        message.task_id = Some(task_id.to_string());
        async move {
            handler
                .send_message(None, message, &MessageSendOptions::default())
                .await
        }
    };

    let (a, b) = tokio::join!(send("first"), send("second"));
    a.unwrap();
    b.unwrap();

    // Wait for the single execution to settle.
    let mut state = TaskState::Submitted;
    for _ in 0..100 {
        state = handler
            .get_task(None, task_id, None)
            .await
            .unwrap()
            .status
            .state;
        if state == TaskState::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(state, TaskState::Completed);
    assert_eq!(runtime.executions(), 1);
}

#[tokio::test]
async fn cancellation_is_observed_by_streaming_subscribers() {
    let runtime = Arc::new(ScriptedRuntime::hanging());
    let handler = handler_with(runtime, Arc::new(RecordingPushSender::accepting()));

    let (task, mut events) = handler
        .send_message_streaming(None, user_message("long job"))
        .await
        .unwrap();

    // Let the execution reach `working` before pulling the plug.
    let first = events.next().await.unwrap();
    match first {
        TaskEvent::StatusUpdate(update) => {
            assert_eq!(update.status.state, TaskState::Working);
        }
        other => panic!("unexpected first event: {other:?}"),
    }

    let canceled = handler.cancel_task(None, &task.id).await.unwrap();
    assert_eq!(canceled.status.state, TaskState::Canceled);

    let last = events.next().await.unwrap();
    assert!(last.is_final());
    assert!(events.next().await.is_none());

    // Canceling again changes nothing.
    let again = handler.cancel_task(None, &task.id).await.unwrap();
    assert_eq!(again.status.state, TaskState::Canceled);
}
