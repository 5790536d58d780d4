//! `HttpModelRepository` against a minimal local HTTP server.

use futures_util::StreamExt;
use llmchat_core::EngineIdentifier;
use llmchat_download::{HttpModelRepository, ModelRepository, StorageError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve one canned response per connection, forever.
async fn serve(response: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn fetch_writes_artifact_and_ends_at_one() {
    let base = serve(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\n0123456789").await;
    let dir = tempfile::tempdir().unwrap();
    let repo = HttpModelRepository::new(dir.path().join("models"), base);
    let id = EngineIdentifier::new("tiny_model");

    assert!(!repo.exists(&id).await.unwrap());

    let progress: Vec<f64> = repo.fetch(&id).map(Result::unwrap).collect().await;
    assert_eq!(progress.first(), Some(&0.0));
    assert_eq!(progress.last(), Some(&1.0));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    assert!(repo.exists(&id).await.unwrap());
    let contents = std::fs::read(repo.artifact_path(&id)).unwrap();
    assert_eq!(contents, b"0123456789");
    assert!(!dir.path().join("models/tiny_model.part").exists());
}

#[tokio::test]
async fn missing_artifact_is_not_found() {
    let base = serve(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
    let dir = tempfile::tempdir().unwrap();
    let repo = HttpModelRepository::new(dir.path(), base);
    let id = EngineIdentifier::new("missing");

    let items: Vec<_> = repo.fetch(&id).collect().await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(StorageError::NotFound(_))));
    assert!(!repo.exists(&id).await.unwrap());
}

#[tokio::test]
async fn server_error_carries_status_code() {
    let base = serve(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
    let dir = tempfile::tempdir().unwrap();
    let repo = HttpModelRepository::new(dir.path(), base);

    let items: Vec<_> = repo.fetch(&EngineIdentifier::new("m")).collect().await;
    match &items[..] {
        [Err(StorageError::Network { status_code, .. })] => assert_eq!(*status_code, Some(503)),
        other => panic!("Expected a single network error, got {other:?}"),
    }
}

#[tokio::test]
async fn truncated_body_fails_and_leaves_no_file() {
    let base = serve(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\nshort").await;
    let dir = tempfile::tempdir().unwrap();
    let repo = HttpModelRepository::new(dir.path(), base);
    let id = EngineIdentifier::new("truncated");

    let items: Vec<_> = repo.fetch(&id).collect().await;
    assert!(matches!(items.last(), Some(Err(_))));
    assert!(!repo.exists(&id).await.unwrap());
    assert!(!dir.path().join("truncated.part").exists());
}

#[tokio::test]
async fn remove_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let repo = HttpModelRepository::new(dir.path(), "http://127.0.0.1:9");
    let id = EngineIdentifier::new("stored");
    std::fs::write(repo.artifact_path(&id), b"weights").unwrap();

    assert!(repo.exists(&id).await.unwrap());
    repo.remove(&id).await.unwrap();
    assert!(!repo.exists(&id).await.unwrap());
    repo.remove(&id).await.unwrap();
}
