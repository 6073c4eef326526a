use crate::support::fast_policy;
use fitcoach_core::assistant::{AssistantApi, CoachChat, OpenAiAssistantsClient, RunStatus};
use fitcoach_core::AssistantError;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> OpenAiAssistantsClient {
    OpenAiAssistantsClient::new(format!("{}/v1/", server.uri()), "sk-test").expect("client")
}

#[tokio::test]
async fn chat_drives_the_assistants_endpoints() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/threads"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("openai-beta", "assistants=v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "thread_abc" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_abc/messages"))
        .and(body_json(json!({ "role": "user", "content": "oi" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg_user" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_abc/runs"))
        .and(body_json(json!({ "assistant_id": "asst_coach" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "run_1", "status": "queued" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_abc/runs/run_1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "run_1", "status": "in_progress" })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_abc/runs/run_1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "run_1", "status": "completed" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_abc/messages"))
        .and(query_param("limit", "1"))
        .and(query_param("order", "desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "msg_reply",
                "role": "assistant",
                "content": [{ "type": "text", "text": { "value": "Olá! Como posso ajudar?", "annotations": [] } }]
            }]
        })))
        .mount(&server)
        .await;

    let chat = CoachChat::new(Arc::new(client(&server)), "asst_coach", fast_policy());
    let reply = chat.chat("c1", "oi").await.expect("reply");

    assert_eq!(reply, "Olá! Como posso ajudar?");
    let received = server.received_requests().await.expect("requests");
    let status_checks = received
        .iter()
        .filter(|req| req.url.path() == "/v1/threads/thread_abc/runs/run_1")
        .count();
    assert_eq!(status_checks, 2);
}

#[tokio::test]
async fn api_error_message_is_propagated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_gone/messages"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "message": "No thread found with id 'thread_gone'.", "type": "invalid_request_error" }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .add_message("thread_gone", "oi")
        .await
        .unwrap_err();

    match err {
        AssistantError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "No thread found with id 'thread_gone'.");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn error_without_body_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client(&server).get_run("thread_1", "run_1").await.unwrap_err();

    assert!(matches!(err, AssistantError::Api { status: 502, ref message } if message.contains("502")));
}

#[tokio::test]
async fn decodes_run_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_1/runs/run_1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "run_1", "object": "thread.run", "status": "requires_action" })),
        )
        .mount(&server)
        .await;

    let run = client(&server).get_run("thread_1", "run_1").await.expect("run");

    assert_eq!(run.status, RunStatus::RequiresAction);
    assert!(!run.status.is_pending());
}
