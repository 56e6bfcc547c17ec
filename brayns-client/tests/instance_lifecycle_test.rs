//! Instance lifecycle integration tests
//!
//! Connection, disconnection, engine shutdown and scoped release.

mod common;

use brayns_client::Instance;
use brayns_core::Error;
use common::{reply, MockEngine};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

fn version_engine() -> impl Fn(common::Received) -> std::future::Ready<Vec<Message>> + Send + Sync {
    |request| {
        let answers = match request.method() {
            "get-version" => vec![reply(
                request.id().clone(),
                json!({"major": 3, "minor": 2, "patch": 0, "revision": "abc123"}),
            )],
            "quit" => vec![Message::Close(None)],
            _ => Vec::new(),
        };
        std::future::ready(answers)
    }
}

#[tokio::test]
async fn test_connect_without_scheme() {
    let engine = MockEngine::silent().await;

    let instance = Instance::connect(engine.host()).await.unwrap();
    assert!(instance.is_connected());
    assert_eq!(instance.uri(), engine.url());
    assert_eq!(instance.pending_count(), 0);

    instance.disconnect().await.unwrap();
    engine.shutdown().await;
}

#[tokio::test]
async fn test_connect_refused() {
    let result = Instance::connect("127.0.0.1:1").await;
    assert!(matches!(result, Err(Error::Connection(_))));
}

#[tokio::test]
async fn test_get_version() {
    let mut engine = MockEngine::with_handler(version_engine()).await;
    let instance = Instance::connect(engine.url()).await.unwrap();

    let version = instance.get_version().await.unwrap();
    assert_eq!((version.major, version.minor, version.patch), (3, 2, 0));
    assert_eq!(version.revision, "abc123");

    let request = engine.next_request().await.unwrap();
    assert_eq!(
        request.json,
        json!({"jsonrpc": "2.0", "id": 0, "method": "get-version"})
    );
    assert_eq!(instance.pending_count(), 0);

    instance.disconnect().await.unwrap();
    engine.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let engine = MockEngine::silent().await;
    let instance = Instance::connect(engine.url()).await.unwrap();
    let pending = instance.task("snapshot", json!({})).await.unwrap();

    instance.disconnect().await.unwrap();
    instance.disconnect().await.unwrap();

    assert!(!instance.is_connected());
    assert!(matches!(pending.wait().await, Err(Error::ConnectionClosed)));

    let result = instance.get_version().await;
    assert!(matches!(result, Err(Error::ConnectionClosed)));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_engine_close_fails_pending() {
    let engine = MockEngine::with_handler(|request| async move {
        match request.method() {
            "exit-later" => vec![Message::Close(None)],
            _ => Vec::new(),
        }
    })
    .await;
    let instance = Instance::connect(engine.url()).await.unwrap();

    let snapshot = instance.task("snapshot", json!({})).await.unwrap();
    let exit = instance.task("exit-later", ()).await.unwrap();

    assert!(matches!(snapshot.wait().await, Err(Error::ConnectionClosed)));
    assert!(matches!(exit.wait().await, Err(Error::ConnectionClosed)));
    assert!(!instance.is_connected());
    assert_eq!(instance.pending_count(), 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_stop_sends_quit() {
    let mut engine = MockEngine::with_handler(version_engine()).await;
    let instance = Instance::connect(engine.url()).await.unwrap();

    instance.stop().await.unwrap();

    let request = engine.next_request().await.unwrap();
    assert_eq!(request.method(), "quit");
    assert!(!instance.is_connected());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_drop_releases_pending_requests() {
    let engine = MockEngine::silent().await;

    let pending = {
        let instance = Instance::connect(engine.url()).await.unwrap();
        instance.task("snapshot", json!({})).await.unwrap()
    };

    assert!(matches!(pending.wait().await, Err(Error::ConnectionClosed)));
    engine.shutdown().await;
}

#[tokio::test]
async fn test_early_return_releases_instance() {
    async fn render(url: String) -> brayns_core::Result<()> {
        let instance = Instance::connect(url).await?;
        instance.task("snapshot", json!({})).await?;
        Err(Error::Internal("scene not ready".to_string()))
    }

    let mut engine = MockEngine::silent().await;
    let result = render(engine.url()).await;
    assert!(matches!(result, Err(Error::Internal(_))));

    let request = engine.next_request().await.unwrap();
    assert_eq!(request.method(), "snapshot");
    engine.shutdown().await;
}
