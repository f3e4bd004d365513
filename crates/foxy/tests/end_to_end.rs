//! End-to-end scenarios driven through the real `Listener` + `tunnel::dispatch`
//! path, against a bare-TCP fake origin server. One test per scenario in the
//! testable-properties table this crate was built against.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use foxy::{Listener, ListenerOptions, SessionOptions};

async fn spawn_proxy() -> (std::net::SocketAddr, foxy::ListenerShutdown, tokio::task::JoinHandle<()>) {
    let opts = ListenerOptions {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        session_opts: SessionOptions::default(),
        origin_opts: SessionOptions::default(),
    };
    let (listener, shutdown) = Listener::bind(opts).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        listener.async_accept().await.unwrap();
    });
    (addr, shutdown, task)
}

/// A one-shot fake origin: accepts a single connection, reads everything the
/// peer sends until it stops sending for a moment, then writes `response`.
async fn fake_origin(response: &'static [u8]) -> (std::net::SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut chunk = [0u8; 4096];
        // Give the client a moment to finish writing its request, then read
        // whatever arrived without blocking forever on a half-open socket.
        loop {
            match tokio::time::timeout(Duration::from_millis(200), stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => received.extend_from_slice(&chunk[..n]),
                Ok(Err(_)) => break,
            }
        }
        stream.write_all(response).await.unwrap();
        received
    });
    (addr, task)
}

async fn read_all_available(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match tokio::time::timeout(Duration::from_millis(200), stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => out.extend_from_slice(&chunk[..n]),
            Ok(Err(_)) => break,
        }
    }
    out
}

// S1 - plain one-shot relay.
#[tokio::test]
async fn s1_plain_one_shot_relay() {
    let (origin_addr, origin_task) = fake_origin(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await;
    let (proxy_addr, shutdown, proxy_task) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!("GET http://127.0.0.1:{}/ HTTP/1.1\r\nHost: X\r\n\r\n", origin_addr.port());
    client.write_all(request.as_bytes()).await.unwrap();

    let response = read_all_available(&mut client).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.contains("Via: 1.1 foxy"));
    assert!(text.ends_with("hello"));

    let upstream_bytes = origin_task.await.unwrap();
    let upstream_text = String::from_utf8_lossy(&upstream_bytes);
    assert!(upstream_text.starts_with("GET / HTTP/1.1\r\n"));
    assert!(upstream_text.contains("Via: 1.1 foxy"));

    shutdown.shutdown().await;
    proxy_task.await.unwrap();
}

// S2 - client requests close; a hop-by-hop Connection-nominated field is stripped.
#[tokio::test]
async fn s2_client_requests_close_strips_nominated_field() {
    let (origin_addr, origin_task) = fake_origin(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
    let (proxy_addr, shutdown, proxy_task) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!(
        "GET http://127.0.0.1:{}/ HTTP/1.1\r\nHost: X\r\nConnection: close, foo\r\nfoo: bar\r\n\r\n",
        origin_addr.port()
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let response = read_all_available(&mut client).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.contains("Connection: close"));

    let upstream_bytes = origin_task.await.unwrap();
    let upstream_text = String::from_utf8_lossy(&upstream_bytes);
    assert!(upstream_text.contains("Connection: close"));
    assert!(!upstream_text.to_ascii_lowercase().contains("foo: bar"));

    shutdown.shutdown().await;
    proxy_task.await.unwrap();
}

// S3 - chunked transfer, request and response bodies both re-chunked after
// hop-by-hop stripping.
#[tokio::test]
async fn s3_chunked_transfer_request_and_response() {
    let response_body = "reply-data";
    let response = format!(
        "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{}\r\n0\r\n\r\n",
        response_body.len(),
        response_body
    );
    let (origin_addr, origin_task) = fake_origin(Box::leak(response.into_bytes().into_boxed_slice())).await;
    let (proxy_addr, shutdown, proxy_task) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let body = "some request body data\n";
    let request = format!(
        "POST http://127.0.0.1:{}/x HTTP/1.1\r\nHost: X\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{}\r\n0\r\n\r\n",
        origin_addr.port(),
        body.len(),
        body
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let response = read_all_available(&mut client).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.contains("Transfer-Encoding: chunked"));
    assert!(text.contains("Via: 1.1 foxy"));
    assert!(text.trim_end().ends_with("0\r\n\r\n"));
    assert!(text.contains(response_body));

    let upstream_bytes = origin_task.await.unwrap();
    let upstream_text = String::from_utf8_lossy(&upstream_bytes);
    assert!(upstream_text.contains("Transfer-Encoding: chunked"));
    assert!(upstream_text.contains("Via: 1.1 foxy"));
    assert!(upstream_text.contains(body));
    assert!(upstream_text.trim_end().ends_with("0\r\n\r\n"));

    shutdown.shutdown().await;
    proxy_task.await.unwrap();
}

// S4 - loop detection: an already-proxied request is never forwarded.
#[tokio::test]
async fn s4_loop_detection_on_request() {
    let (origin_addr, origin_task) = fake_origin(b"").await;
    let (proxy_addr, shutdown, proxy_task) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!(
        "GET http://127.0.0.1:{}/ HTTP/1.1\r\nHost: X\r\nVia: 1.1 foxy\r\n\r\n",
        origin_addr.port()
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let response = read_all_available(&mut client).await;
    assert!(response.is_empty(), "no response should be written back to the client on a detected loop");

    let upstream_bytes = origin_task.await.unwrap();
    assert!(upstream_bytes.is_empty(), "no bytes should reach the origin on a detected loop");

    shutdown.shutdown().await;
    proxy_task.await.unwrap();
}

// S5 - malformed request target: neither CONNECT-authority nor absolute-URI.
#[tokio::test]
async fn s5_malformed_request_target() {
    let (proxy_addr, shutdown, proxy_task) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client
        .write_all(b"GET lol-some-garbage-target HTTP/1.1\r\nHost: X\r\n\r\n")
        .await
        .unwrap();

    let response = read_all_available(&mut client).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 400"));
    assert!(text.contains("Malformed client request. Use either CONNECT <authority-uri> or <verb> <absolute-uri>"));

    shutdown.shutdown().await;
    proxy_task.await.unwrap();
}

// S6 - CONNECT rejected when the client asks for a non-persistent connection.
#[tokio::test]
async fn s6_connect_rejected_on_non_persistent() {
    let (proxy_addr, shutdown, proxy_task) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client
        .write_all(b"CONNECT host:443 HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let response = read_all_available(&mut client).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 400"));
    assert!(text.contains("CONNECT semantics require a persistent connection"));

    shutdown.shutdown().await;
    proxy_task.await.unwrap();
}

// S7 - a dial to an unreachable/unresponsive origin is bounded by the
// session timeout rather than hanging the connection forever.
#[tokio::test]
async fn s7_connect_to_unreachable_origin_times_out() {
    // Reserve a port, then drop the listener so nothing answers on it:
    // connection attempts to it will hang (not immediately refuse) on most
    // platforms, which is the behavior the timeout needs to bound.
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let unreachable_addr = probe.local_addr().unwrap();
    drop(probe);

    let opts = ListenerOptions {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        session_opts: SessionOptions::default(),
        origin_opts: SessionOptions {
            timeout: Duration::from_millis(250),
            ..SessionOptions::default()
        },
    };
    let (listener, shutdown) = Listener::bind(opts).await.unwrap();
    let proxy_addr = listener.local_addr().unwrap();
    let proxy_task = tokio::spawn(async move { listener.async_accept().await.unwrap() });

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!("GET http://{}/ HTTP/1.1\r\nHost: X\r\n\r\n", unreachable_addr);

    let started = tokio::time::Instant::now();
    client.write_all(request.as_bytes()).await.unwrap();
    let response = read_all_available(&mut client).await;
    let elapsed = started.elapsed();

    // Either the proxy answers with a 502 inside the timeout window, or it
    // simply closes the connection; either way it must not hang past the
    // timeout plus generous scheduling slack.
    assert!(elapsed < Duration::from_secs(2), "dial to unreachable origin did not bound by timeout: {:?}", elapsed);
    if !response.is_empty() {
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 502") || text.starts_with("HTTP/1.1 400"));
    }

    shutdown.shutdown().await;
    proxy_task.await.unwrap();
}
