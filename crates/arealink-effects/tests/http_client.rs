//! HttpAreaClient against a canned local HTTP responder.

#![allow(clippy::unwrap_used)]

use arealink_core::{ApiResponse, AreaClient, AreaCode, NetworkError, RefreshToken};
use arealink_effects::HttpAreaClient;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve one request with a fixed response, returning the raw request text.
async fn serve_once(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/api", listener.local_addr().unwrap());
    let response = format!(
        "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request_complete(&request) {
                break;
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&request).into_owned()
    });

    (endpoint, handle)
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some((head, body)) = text.split_once("\r\n\r\n") else {
        return false;
    };
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    body.len() >= length
}

fn client(endpoint: &str) -> HttpAreaClient {
    HttpAreaClient::new(endpoint, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn refresh_posts_token_and_decodes_grant() {
    let (endpoint, server) = serve_once(
        "200 OK",
        r#"{"access_token":"fresh","expires_at":1700000000000}"#,
    )
    .await;

    let response = client(&endpoint)
        .refresh_credentials(&RefreshToken::new("r-123"))
        .await
        .unwrap();

    let ApiResponse::Ok(grant) = response else {
        panic!("expected a grant, got {response:?}");
    };
    assert_eq!(grant.access_token.expose(), "fresh");
    assert!(grant.refresh_token.is_none());
    assert_eq!(grant.expires_at.ts_ms, 1_700_000_000_000);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/sessions/refresh "));
    assert!(request.contains(r#""refresh_token":"r-123""#));
}

#[tokio::test]
async fn forbidden_and_no_content_are_tagged() {
    let (endpoint, server) = serve_once("403 Forbidden", "").await;
    let response = client(&endpoint)
        .get_entry_form_fields(&AreaCode::new("north"))
        .await
        .unwrap();
    assert_eq!(response, ApiResponse::Forbidden);
    assert!(server
        .await
        .unwrap()
        .starts_with("GET /api/areas/north/entry-form "));

    let (endpoint, _server) = serve_once("204 No Content", "").await;
    let response = client(&endpoint)
        .check_for_entry_verdict("app-1")
        .await
        .unwrap();
    assert_eq!(response, ApiResponse::NoContent);
}

#[tokio::test]
async fn unauthenticated_status_is_undocumented_401() {
    let (endpoint, _server) = serve_once("401 Unauthorized", r#"{"error":"expired"}"#).await;
    let response = client(&endpoint)
        .refresh_credentials(&RefreshToken::new("stale"))
        .await
        .unwrap();
    assert!(response.is_unauthenticated());
}

#[tokio::test]
async fn undecodable_success_body_is_unexpected_response() {
    let (endpoint, _server) = serve_once("200 OK", "not json").await;
    let result = client(&endpoint)
        .refresh_credentials(&RefreshToken::new("r"))
        .await;
    assert!(matches!(
        result,
        Err(NetworkError::UnexpectedResponse { status: 200, .. })
    ));
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/api", listener.local_addr().unwrap());
    drop(listener);

    let result = client(&endpoint)
        .get_entry_form_fields(&AreaCode::new("north"))
        .await;
    assert!(matches!(result, Err(NetworkError::Unreachable { .. })));
}
