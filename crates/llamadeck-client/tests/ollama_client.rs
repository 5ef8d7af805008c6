//! Tests for the streaming Ollama client against a mock server

use std::io::Write;
use std::time::{Duration, Instant};

use futures::StreamExt;
use llamadeck_client::{CancellationToken, ChatSession, OllamaClient};
use llamadeck_core::{
    ErrorKind, LlamaDeckConfig, LlamaDeckError, ModelDefinition, ModelDescriptor, PullEvent,
};
use mockito::Matcher;
use serde_json::json;

const UNREACHABLE_HOST: &str = "http://127.0.0.1:1";

fn client_for(server: &mockito::ServerGuard) -> OllamaClient {
    OllamaClient::with_host(&server.url()).unwrap()
}

fn configured_client(
    server: &mockito::ServerGuard,
    configure: impl FnOnce(&mut LlamaDeckConfig),
) -> OllamaClient {
    let mut config = LlamaDeckConfig::default().with_host(&server.url());
    configure(&mut config);
    OllamaClient::new(&config).unwrap()
}

fn ndjson(lines: &[serde_json::Value]) -> String {
    lines.iter().map(|l| format!("{}\n", l)).collect()
}

fn fractions(events: &[PullEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            PullEvent::Progress { fraction, .. } => Some(*fraction),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Model listing
// ============================================================================

#[tokio::test]
async fn test_list_models_maps_name_and_identifier() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/tags")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
            "models": [
                {"name": "phi3:latest", "model": "phi3:latest", "size": 2300000000},
                {"name": "mario:latest"}
            ]
        }"#,
        )
        .create_async()
        .await;

    let models = client_for(&server).list_models().await.unwrap();

    assert_eq!(
        models,
        vec![
            ModelDescriptor::new("phi3:latest", "phi3:latest"),
            ModelDescriptor::new("mario:latest", "mario:latest"),
        ]
    );
}

#[tokio::test]
async fn test_list_models_empty_registry() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/tags")
        .with_status(200)
        .with_body(r#"{"models": []}"#)
        .create_async()
        .await;

    let models = client_for(&server).list_models().await.unwrap();
    assert!(models.is_empty());
}

#[tokio::test]
async fn test_list_models_unreachable_is_transport_error() {
    let client = OllamaClient::with_host(UNREACHABLE_HOST).unwrap();
    let err = client.list_models().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

// ============================================================================
// Pull
// ============================================================================

#[tokio::test]
async fn test_pull_emits_fractions_then_success() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/pull")
        .match_body(Matcher::Json(json!({"name": "phi3"})))
        .with_status(200)
        .with_header("content-type", "application/x-ndjson")
        .with_body(ndjson(&[
            json!({"status": "pulling manifest"}),
            json!({"status": "pulling 3e38", "total": 200, "completed": 50}),
            json!({"status": "pulling 3e38", "total": 200, "completed": 200}),
            json!({"status": "success"}),
        ]))
        .create_async()
        .await;

    let events: Vec<PullEvent> = client_for(&server).pull_model("phi3").collect().await;

    // Status-only records repeat the last known fraction
    assert_eq!(fractions(&events), vec![0.0, 0.25, 1.0, 1.0]);
    assert!(fractions(&events).windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(events.last(), Some(&PullEvent::Success));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert_eq!(
        events[1],
        PullEvent::Progress {
            fraction: 0.25,
            status: Some("pulling 3e38".to_string())
        }
    );
}

#[tokio::test]
async fn test_pull_zero_total_yields_zero() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/pull")
        .with_status(200)
        .with_body(ndjson(&[json!({"total": 0, "completed": 0})]))
        .create_async()
        .await;

    let events: Vec<PullEvent> = client_for(&server).pull_model("tiny").collect().await;

    assert_eq!(fractions(&events), vec![0.0]);
    assert_eq!(events.last(), Some(&PullEvent::Success));
}

#[tokio::test]
async fn test_pull_error_record_is_terminal() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/pull")
        .with_status(200)
        .with_body(ndjson(&[
            json!({"status": "pulling 3e38", "total": 100, "completed": 10}),
            json!({"error": "max retries exceeded"}),
            json!({"status": "pulling 3e38", "total": 100, "completed": 20}),
        ]))
        .create_async()
        .await;

    let events: Vec<PullEvent> = client_for(&server).pull_model("llama3").collect().await;

    assert_eq!(events.len(), 2);
    assert_eq!(fractions(&events), vec![0.1]);
    assert_eq!(
        events[1],
        PullEvent::failed(LlamaDeckError::Server("max retries exceeded".to_string()))
    );
}

#[tokio::test]
async fn test_pull_unreachable_emits_single_failure() {
    let client = OllamaClient::with_host(UNREACHABLE_HOST).unwrap();
    let events: Vec<PullEvent> = client.pull_model("phi3").collect().await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        PullEvent::Failed { error } => assert_eq!(error.kind(), ErrorKind::Transport),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_pull_non_200_uses_server_message() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/pull")
        .with_status(500)
        .with_body(r#"{"error": "pull model manifest: file does not exist"}"#)
        .create_async()
        .await;

    let events: Vec<PullEvent> = client_for(&server).pull_model("nope").collect().await;

    assert_eq!(
        events,
        vec![PullEvent::failed(LlamaDeckError::UnexpectedStatus {
            status: 500,
            body: "pull model manifest: file does not exist".to_string(),
        })]
    );
}

#[tokio::test]
async fn test_pull_malformed_record_is_protocol_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/pull")
        .with_status(200)
        .with_body("{\"total\": 10, \"completed\": 5}\n<html>oops</html>\n")
        .create_async()
        .await;

    let events: Vec<PullEvent> = client_for(&server).pull_model("phi3").collect().await;

    assert_eq!(events.len(), 2);
    match &events[1] {
        PullEvent::Failed { error } => assert_eq!(error.kind(), ErrorKind::Protocol),
        other => panic!("expected failure, got {:?}", other),
    }
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_ok_on_200() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("DELETE", "/api/delete")
        .match_body(Matcher::Json(json!({"name": "phi3"})))
        .with_status(200)
        .create_async()
        .await;

    client_for(&server).delete_model("phi3").await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_delete_not_found() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("DELETE", "/api/delete")
        .with_status(404)
        .with_body(r#"{"error": "model 'ghost' not found"}"#)
        .create_async()
        .await;

    let err = client_for(&server).delete_model("ghost").await.unwrap_err();
    assert_eq!(
        err,
        LlamaDeckError::UnexpectedStatus {
            status: 404,
            body: "model 'ghost' not found".to_string()
        }
    );
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_sends_modelfile_and_succeeds() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/create")
        .match_body(Matcher::Json(json!({
            "name": "mario",
            "modelfile": "FROM phi3\nSYSTEM you are Mario from Super Mario"
        })))
        .with_status(200)
        .with_body(ndjson(&[
            json!({"status": "reading model metadata"}),
            json!({"status": "writing manifest"}),
            json!({"status": "success"}),
        ]))
        .create_async()
        .await;

    client_for(&server)
        .create_custom_model("phi3", "mario", "you are Mario from Super Mario")
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_create_without_success_status_fails() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/create")
        .with_status(200)
        .with_body(ndjson(&[json!({"status": "reading model metadata"})]))
        .create_async()
        .await;

    let err = client_for(&server)
        .create_custom_model("phi3", "mario", "be Mario")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[tokio::test]
async fn test_create_non_200_fails() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/create")
        .with_status(400)
        .with_body(r#"{"error": "invalid model name"}"#)
        .create_async()
        .await;

    let err = client_for(&server)
        .create_custom_model("phi3", "bad name", "be Mario")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

// ============================================================================
// Generate
// ============================================================================

#[tokio::test]
async fn test_generate_streams_fragments_and_appends_context() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::Json(json!({"model": "phi3", "prompt": "hi", "context": []})))
        .with_status(200)
        .with_body(ndjson(&[
            json!({"response": "Hel", "done": false}),
            json!({"response": "lo", "done": false}),
            json!({"response": "", "done": true, "context": [1, 2, 3]}),
        ]))
        .create_async()
        .await;
    let second = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::Json(json!({"model": "phi3", "prompt": "again", "context": [1, 2, 3]})))
        .with_status(200)
        .with_body(ndjson(&[json!({"response": "!", "done": true, "context": [4]})]))
        .create_async()
        .await;

    let client = client_for(&server);
    let session = ChatSession::new();

    let chunks: Vec<String> = client
        .generate(&session, "phi3", "hi")
        .map(|c| c.unwrap())
        .collect()
        .await;
    assert_eq!(chunks, vec!["Hel", "lo", ""]);
    assert_eq!(chunks.concat(), "Hello");
    assert_eq!(session.context().await.tokens(), &[1, 2, 3]);

    let chunks: Vec<String> = client
        .generate(&session, "phi3", "again")
        .map(|c| c.unwrap())
        .collect()
        .await;
    assert_eq!(chunks, vec!["!"]);
    assert_eq!(session.context().await.tokens(), &[1, 2, 3, 4]);

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_generate_error_record_is_raised_verbatim() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(ndjson(&[
            json!({"response": "Par", "done": false}),
            json!({"error": "llama runner process has terminated"}),
            json!({"response": "ignored", "done": false}),
        ]))
        .create_async()
        .await;

    let session = ChatSession::new();
    let items: Vec<_> = client_for(&server).generate(&session, "phi3", "hi").collect().await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok("Par".to_string()));
    let err = items[1].clone().unwrap_err();
    assert_eq!(err.to_string(), "llama runner process has terminated");
    assert_eq!(err.kind(), ErrorKind::ServerReported);
    assert!(session.context().await.is_empty());
}

#[tokio::test]
async fn test_generate_truncated_stream_is_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(ndjson(&[json!({"response": "Hal", "done": false})]))
        .create_async()
        .await;

    let session = ChatSession::new();
    let items: Vec<_> = client_for(&server).generate(&session, "phi3", "hi").collect().await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[1].clone().unwrap_err().kind(), ErrorKind::Protocol);
    assert!(session.context().await.is_empty());
}

#[tokio::test]
async fn test_generate_unreachable_is_raised() {
    let client = OllamaClient::with_host(UNREACHABLE_HOST).unwrap();
    let session = ChatSession::new();
    let items: Vec<_> = client.generate(&session, "phi3", "hi").collect().await;

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].clone().unwrap_err().kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_dropped_generation_releases_session() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(ndjson(&[
            json!({"response": "a", "done": false}),
            json!({"response": "b", "done": false}),
            json!({"response": "", "done": true, "context": [5]}),
        ]))
        .create_async()
        .await;

    let session = ChatSession::new();
    let stream = client_for(&server).generate(&session, "phi3", "hi");
    assert!(!stream.is_cancelled());
    drop(stream);

    let context = tokio::time::timeout(Duration::from_secs(5), session.context())
        .await
        .expect("session lock should be released after the consumer goes away");
    assert!(context.len() <= 1);
}

#[tokio::test]
async fn test_generations_on_one_session_are_serialized() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(ndjson(&[
            json!({"response": "x", "done": false}),
            json!({"response": "", "done": true, "context": [7, 8]}),
        ]))
        .expect(2)
        .create_async()
        .await;

    let client = client_for(&server);
    let session = ChatSession::new();

    let first = client.generate(&session, "phi3", "one");
    let second = client.generate(&session.clone(), "phi3", "two");
    let (a, b): (Vec<_>, Vec<_>) = futures::join!(first.collect(), second.collect());

    assert!(a.iter().chain(b.iter()).all(|r| r.is_ok()));
    assert_eq!(session.context().await.tokens(), &[7, 8, 7, 8]);
}

// ============================================================================
// Cancellation and timeouts
// ============================================================================

#[tokio::test]
async fn test_pull_multi_layer_fractions_never_decrease() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/pull")
        .with_status(200)
        .with_body(ndjson(&[
            json!({"status": "pulling 3e38", "total": 100, "completed": 100}),
            json!({"status": "pulling 4fa5", "total": 50, "completed": 10}),
            json!({"status": "pulling 4fa5", "total": 50, "completed": 50}),
        ]))
        .create_async()
        .await;

    let events: Vec<PullEvent> = client_for(&server).pull_model("phi3").collect().await;

    assert_eq!(fractions(&events), vec![1.0, 1.0, 1.0]);
    assert_eq!(events.last(), Some(&PullEvent::Success));
}

#[tokio::test]
async fn test_pull_cancel_with_full_buffer_ends_in_one_terminal() {
    let mut server = mockito::Server::new_async().await;
    let records: Vec<_> = (1..=200)
        .map(|i| json!({"status": "pulling 3e38", "total": 200, "completed": i}))
        .collect();
    let _mock = server
        .mock("POST", "/api/pull")
        .with_status(200)
        .with_body(ndjson(&records))
        .create_async()
        .await;

    let client = configured_client(&server, |c| c.defaults.stream_buffer = 4);
    let stream = client.pull_model("phi3");

    // Let the producer fill the buffer and block on the slow consumer
    tokio::time::sleep(Duration::from_millis(300)).await;
    stream.cancel();

    let events: Vec<PullEvent> = tokio::time::timeout(Duration::from_secs(5), stream.collect())
        .await
        .expect("cancelled pull should end");

    assert!(events.len() < records.len());
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert_eq!(events.last(), Some(&PullEvent::Cancelled));
}

#[tokio::test]
async fn test_create_cancelled_through_token() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/create")
        .with_status(200)
        .with_chunked_body(|w| {
            w.write_all(b"{\"status\":\"reading model metadata\"}\n")?;
            std::thread::sleep(Duration::from_secs(3));
            w.write_all(b"{\"status\":\"success\"}\n")
        })
        .create_async()
        .await;

    let client = client_for(&server);
    let definition = ModelDefinition::new("phi3", "you are Mario");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = client.create_model("mario", &definition, &cancel).await;

    assert_eq!(result, Err(LlamaDeckError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_generate_idle_timeout_is_transport_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_chunked_body(|w| {
            w.write_all(b"{\"response\":\"Hel\",\"done\":false}\n")?;
            std::thread::sleep(Duration::from_secs(3));
            w.write_all(b"{\"response\":\"\",\"done\":true,\"context\":[1]}\n")
        })
        .create_async()
        .await;

    let client = configured_client(&server, |c| c.ollama.stream_idle_timeout_secs = 1);
    let session = ChatSession::new();
    let items: Vec<_> = client.generate(&session, "phi3", "hi").collect().await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok("Hel".to_string()));
    let err = items[1].clone().unwrap_err();
    assert!(matches!(err, LlamaDeckError::Timeout(_)));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(session.context().await.is_empty());
}
