//! HTTP client pool against a throwaway local server

use poolkeeper::{HttpClientOptions, HttpClientPool, PoolConfig};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answers every connection with a fixed status line and body, chosen by
/// request path: `/fail` gets a 500, everything else a 200 echoing the method.
async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let mut parts = request.split_whitespace();
                let method = parts.next().unwrap_or("").to_string();
                let path = parts.next().unwrap_or("").to_string();

                let (status, body) = if path == "/fail" {
                    ("500 Internal Server Error", "boom".to_string())
                } else {
                    ("200 OK", format!("{{\"method\":\"{method}\"}}"))
                };
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

/// Read the head and any `Content-Length` body of one request
async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        data.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&data).to_string();
        let Some(head_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let body_len = text[..head_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if data.len() >= head_end + 4 + body_len {
            return Some(text);
        }
    }
}

fn pool(base_url: String) -> HttpClientPool {
    let options = HttpClientOptions::default().with_base_url(base_url);
    let config = PoolConfig::new()
        .with_min(1)
        .with_max(2)
        .with_acquire_timeout(Duration::from_secs(5))
        .without_eviction();
    HttpClientPool::new("local", options, config).unwrap()
}

#[tokio::test]
async fn requests_go_through_pooled_clients() {
    let pool = pool(spawn_server().await);
    pool.pool().initialize().await.unwrap();

    let response = pool.get("/status").await.unwrap();
    assert!(response.is_success());
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["method"], "GET");

    let response = pool.post("/items", serde_json::json!({"name": "a"})).await.unwrap();
    assert_eq!(response.json::<serde_json::Value>().unwrap()["method"], "POST");
    assert_eq!(pool.put("/items/1", serde_json::json!({})).await.unwrap().status, 200);
    assert_eq!(pool.delete("/items/1").await.unwrap().status, 200);

    let stats = pool.pool().get_stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.borrowed, 4);
    assert_eq!(stats.returned, 4);
    assert_eq!(stats.idle, 1);
}

#[tokio::test]
async fn server_errors_recycle_the_client() {
    let pool = pool(spawn_server().await);

    let response = pool.get("/fail").await.unwrap();
    assert_eq!(response.status, 500);
    assert_eq!(response.text(), "boom");

    // one request, one error: above the 50% error rate
    let stats = pool.pool().get_stats();
    assert_eq!(stats.failed_returns, 1);
    assert_eq!(stats.destroyed, 1);

    let response = pool.get("/ok").await.unwrap();
    assert!(response.is_success());
    assert_eq!(pool.pool().get_stats().created, 2);
}
