//! HTTP tests for the web chat server.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use docchat::config::{Config, ServerConfig};
use docchat::error::Result;
use docchat::memory::InMemoryIndex;
use docchat::models::{ChatMessage, IndexRecord, Role};
use docchat::query::QueryEngine;
use docchat::schema::IndexSchema;
use docchat::server::{run_server, AppState};
use docchat::traits::{Embedder, Generator, VectorIndex};

struct ConstantEmbedder;

#[async_trait]
impl Embedder for ConstantEmbedder {
    fn model_name(&self) -> &str {
        "constant"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

/// Replies with how many earlier turns it was shown.
struct TurnCounter;

#[async_trait]
impl Generator for TurnCounter {
    fn model_name(&self) -> &str {
        "turns"
    }
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let prior = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .count()
            - 1;
        Ok(format!("seen {} earlier messages", prior))
    }
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn start_server() -> u16 {
    let mut server = ServerConfig::default();
    server.title = "Test <Chat>".to_string();
    start_server_with(server).await
}

async fn start_server_with(server: ServerConfig) -> u16 {
    let config = Config::default();
    let index = Arc::new(InMemoryIndex::new("client-manual-index"));
    index
        .ensure_index(&IndexSchema::chunk_index("client-manual-index", 2))
        .await
        .unwrap();
    index
        .upsert(&[IndexRecord {
            doc_id: "r1".to_string(),
            content: "The wire cutoff is 5pm.".to_string(),
            embedding: vec![1.0, 0.0],
            metadata: r#"{"file_name":"wires.pdf","page_label":"4","chunk_index":0}"#.to_string(),
        }])
        .await
        .unwrap();

    let engine = QueryEngine::new(
        Arc::new(ConstantEmbedder),
        index,
        Arc::new(TurnCounter),
        &config.retrieval,
        &config.generation,
    );
    let state = AppState::from_config(Arc::new(engine), &server);

    let port = find_free_port();
    let bind = format!("127.0.0.1:{}", port);
    tokio::spawn(async move {
        run_server(&bind, state).await.ok();
    });
    wait_for_server(port).await;
    port
}

#[tokio::test]
async fn test_health_and_index_page() {
    let port = start_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://127.0.0.1:{}/health", port))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let resp = client
        .get(format!("http://127.0.0.1:{}/", port))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let page = resp.text().await.unwrap();
    assert!(page.contains("<title>Test &lt;Chat&gt;</title>"));
    assert!(!page.contains("{{title}}"));
}

#[tokio::test]
async fn test_chat_session_flow() {
    let port = start_server().await;
    let client = reqwest::Client::new();
    let chat_url = format!("http://127.0.0.1:{}/api/chat", port);

    let first: Value = client
        .post(&chat_url)
        .json(&json!({ "message": "When is the wire cutoff?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = first["session_id"].as_str().unwrap().to_string();
    assert!(!session_id.is_empty());
    assert_eq!(first["answer"], "seen 0 earlier messages");
    assert_eq!(first["sources"][0]["label"], "wires.pdf p.4");
    assert_eq!(first["history"].as_array().unwrap().len(), 2);

    let second: Value = client
        .post(&chat_url)
        .json(&json!({ "session_id": session_id, "message": "And on Fridays?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["session_id"], session_id.as_str());
    assert_eq!(second["answer"], "seen 2 earlier messages");

    let session_url = format!("http://127.0.0.1:{}/api/sessions/{}", port, session_id);
    let session: Value = client
        .get(&session_url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let history = session["history"].as_array().unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0]["role"], "user");
    assert_eq!(history[3]["role"], "assistant");

    let resp = client.delete(&session_url).send().await.unwrap();
    assert_eq!(resp.status(), 204);
    let resp = client.get(&session_url).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_empty_message_is_bad_request() {
    let port = start_server().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{}/api/chat", port))
        .json(&json!({ "message": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "message must not be empty");
}

#[tokio::test]
async fn test_oldest_session_dropped_at_capacity() {
    let mut server = ServerConfig::default();
    server.max_sessions = 1;
    let port = start_server_with(server).await;
    let client = reqwest::Client::new();
    let chat_url = format!("http://127.0.0.1:{}/api/chat", port);

    let mut ids = Vec::new();
    for message in ["First?", "Second?"] {
        let body: Value = client
            .post(&chat_url)
            .json(&json!({ "message": message }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        ids.push(body["session_id"].as_str().unwrap().to_string());
    }

    let first = client
        .get(format!("http://127.0.0.1:{}/api/sessions/{}", port, ids[0]))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 404);
    let second = client
        .get(format!("http://127.0.0.1:{}/api/sessions/{}", port, ids[1]))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
}
