//! Minimal in-process HTTP server for integration tests. Each accepted
//! connection gets the next scripted reply; the raw request is handed back
//! to the test. No mocks.

#![allow(dead_code)]

use std::sync::mpsc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// One scripted response. Written without Content-Length; the body ends when
/// the connection closes.
pub struct Reply {
    pub status: &'static str,
    pub content_type: &'static str,
    pub chunks: Vec<String>,
    /// Keep the connection open this long after the last chunk.
    pub hold: Duration,
}

impl Reply {
    pub fn html(body: &str) -> Self {
        Self {
            status: "200 OK",
            content_type: "text/html",
            chunks: vec![body.to_string()],
            hold: Duration::ZERO,
        }
    }

    pub fn status(status: &'static str) -> Self {
        Self {
            status,
            content_type: "text/html",
            chunks: Vec::new(),
            hold: Duration::ZERO,
        }
    }

    /// An event stream with one `data:` event per payload, each written separately.
    pub fn events(payloads: &[&str]) -> Self {
        Self::raw_events(payloads.iter().map(|p| format!("data: {}\n\n", p)).collect())
    }

    /// An event stream written as the given raw chunks.
    pub fn raw_events(chunks: Vec<String>) -> Self {
        Self {
            status: "200 OK",
            content_type: "text/event-stream",
            chunks,
            hold: Duration::ZERO,
        }
    }

    pub fn hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }
}

pub struct TestServer {
    pub base_url: String,
    pub port: u16,
    requests: mpsc::Receiver<String>,
}

impl TestServer {
    /// Bind a free port and serve `replies`, one connection each, in order.
    pub fn start(replies: Vec<Reply>) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                for reply in replies {
                    let (mut tcp, _) = listener.accept().await.unwrap();
                    let request = read_request(&mut tcp).await;
                    let _ = tx.send(request);
                    write_reply(&mut tcp, reply).await;
                }
            });
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            port,
            requests: rx,
        }
    }

    /// The next raw request (head and body) the server received.
    pub fn next_request(&self) -> String {
        self.requests
            .recv_timeout(Duration::from_secs(5))
            .expect("server should have received a request")
    }
}

/// A port with nothing listening on it.
pub fn dead_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

async fn read_request(tcp: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut body_end = None;
    loop {
        if let Some(end) = body_end {
            if buf.len() >= end {
                break;
            }
        } else if let Some(head_end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
            if head.contains("transfer-encoding: chunked") {
                if buf.ends_with(b"0\r\n\r\n") {
                    break;
                }
            } else {
                body_end = Some(head_end + 4 + content_length(&head));
                continue;
            }
        }
        let n = tcp.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn write_reply(tcp: &mut TcpStream, reply: Reply) {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
        reply.status, reply.content_type
    );
    if tcp.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    for chunk in reply.chunks {
        if tcp.write_all(chunk.as_bytes()).await.is_err() {
            return;
        }
        let _ = tcp.flush().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(reply.hold).await;
    let _ = tcp.shutdown().await;
}
