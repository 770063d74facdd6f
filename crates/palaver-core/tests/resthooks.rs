use palaver_core::domain::asset_types::FlowReference;
use palaver_core::{Contact, ContactUuid, Run, SessionStatus, Trigger};
use palaver_test_utils::{test_engine_builder, AssetsBuilder, RecordingWebhookService};
use serde_json::json;
use std::sync::Arc;

const SUBSCRIBERS: [&str; 3] = [
    "http://a.example.com/hook",
    "http://b.example.com/hook",
    "http://c.example.com/hook",
];

fn resthook_flow() -> serde_json::Value {
    json!({
        "uuid": "f1",
        "name": "Registration",
        "nodes": [{
            "uuid": "n1",
            "actions": [
                {"uuid": "a1", "type": "call_resthook", "resthook": "new-registration", "result_name": "Hook"}
            ],
            "exits": [{"uuid": "e1"}]
        }]
    })
}

/// Run the registration flow against subscribers answering as scripted
async fn run_resthook(
    webhooks: RecordingWebhookService,
    subscribers: &[&str],
) -> (Run, Arc<RecordingWebhookService>) {
    let webhooks = Arc::new(webhooks);
    let engine = test_engine_builder()
        .with_webhook_service(webhooks.clone())
        .build()
        .unwrap();
    let assets = AssetsBuilder::new()
        .flow(resthook_flow())
        .resthook("new-registration", subscribers)
        .build()
        .unwrap();

    let mut session = Arc::new(engine).new_session(assets);
    session
        .start(
            Trigger::new(FlowReference::new("f1", "Registration"))
                .with_contact(Contact::new(ContactUuid::from("c1"), "Bob")),
        )
        .await
        .unwrap();
    assert_eq!(session.status(), SessionStatus::Completed);

    (session.runs()[0].clone(), webhooks)
}

fn webhook_events(run: &Run) -> usize {
    run.events()
        .iter()
        .filter(|e| e.event_type() == "webhook_called")
        .count()
}

#[tokio::test]
async fn test_one_success_among_failures_is_picked() {
    let webhooks = RecordingWebhookService::new()
        .respond(SUBSCRIBERS[0], Some(500), "")
        .respond(SUBSCRIBERS[1], Some(200), r#"{"id": 12}"#)
        .respond(SUBSCRIBERS[2], Some(410), "");

    let (run, webhooks) = run_resthook(webhooks, &SUBSCRIBERS).await;

    let result = run.result("Hook").unwrap();
    assert_eq!(result.value, "200");
    assert_eq!(result.category.as_deref(), Some("Success"));
    assert_eq!(result.extra, Some(json!({"id": 12})));

    assert_eq!(webhook_events(&run), 3);
    assert_eq!(webhooks.requests().len(), 3);
    let posted: serde_json::Value =
        serde_json::from_str(webhooks.requests()[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(posted["resthook"], "new-registration");
    assert_eq!(posted["contact"]["name"], "Bob");
}

#[tokio::test]
async fn test_all_failed_picks_last_failure() {
    let webhooks = RecordingWebhookService::new()
        .respond(SUBSCRIBERS[0], Some(500), "")
        .respond(SUBSCRIBERS[1], None, "")
        .respond(SUBSCRIBERS[2], Some(410), "");

    let (run, _) = run_resthook(webhooks, &SUBSCRIBERS).await;

    let result = run.result("Hook").unwrap();
    assert_eq!(result.value, "410");
    assert_eq!(result.category.as_deref(), Some("Failure"));
    assert_eq!(result.input.as_deref(), Some("POST http://c.example.com/hook"));
}

#[tokio::test]
async fn test_no_subscribers_saves_no_result() {
    let (run, webhooks) = run_resthook(RecordingWebhookService::new(), &[]).await;

    assert!(run.result("Hook").is_none());
    assert_eq!(webhook_events(&run), 0);
    assert!(webhooks.requests().is_empty());
}
