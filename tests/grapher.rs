mod common;

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;

use owid_cy::domain::{EntityKey, Slug, Stage};
use owid_cy::error::OwidError;
use owid_cy::fetch::{fetch_citations, fetch_table};
use owid_cy::grapher::{GrapherClient, GrapherHttpClient, RetryPolicy};
use owid_cy::table::Value;

use common::descriptor;

struct Reply {
    status: u16,
    headers: Vec<(&'static str, &'static str)>,
    body: Vec<u8>,
}

impl Reply {
    fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }
}

/// Answers the n-th connection with the n-th reply, repeating the last one afterwards.
struct StubServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
}

impl StubServer {
    fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                read_request(&mut stream);
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let reply = &replies[index.min(replies.len() - 1)];
                let mut head = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Length: {}\r\nConnection: close\r\n",
                    reply.status,
                    reply.body.len()
                );
                for (name, value) in &reply.headers {
                    head.push_str(&format!("{name}: {value}\r\n"));
                }
                head.push_str("\r\n");
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&reply.body);
                let _ = stream.flush();
            }
        });
        Self { base_url, hits }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn client(&self) -> GrapherHttpClient {
        let retry = RetryPolicy {
            backoff_factor: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        GrapherHttpClient::with_settings(&self.base_url, retry, Duration::from_secs(5)).unwrap()
    }
}

fn read_request(stream: &mut std::net::TcpStream) {
    let mut request = Vec::new();
    let mut buffer = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        match stream.read(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(read) => request.extend_from_slice(&buffer[..read]),
        }
    }
}

fn slug() -> Slug {
    "x".parse().unwrap()
}

#[test]
fn gateway_errors_exhaust_five_retries() {
    let server = StubServer::start(vec![Reply::status(502)]);
    let err = server.client().fetch_csv(&slug()).unwrap_err();
    assert_matches!(
        err,
        OwidError::Status { ref slug, status: 502, stage: Stage::Fetch, .. } if slug == "x"
    );
    assert_eq!(server.hits(), 6);
}

#[test]
fn server_error_is_not_retried() {
    let server = StubServer::start(vec![Reply::status(500), Reply::ok("Code,Year\n")]);
    let err = server.client().fetch_csv(&slug()).unwrap_err();
    assert_matches!(err, OwidError::Status { status: 500, .. });
    assert_eq!(server.hits(), 1);
}

#[test]
fn not_found_is_not_retried() {
    let server = StubServer::start(vec![Reply::status(404)]);
    let err = server.client().fetch_metadata(&slug()).unwrap_err();
    assert_matches!(err, OwidError::Status { status: 404, stage: Stage::Metadata, .. });
    assert_eq!(server.hits(), 1);
}

#[test]
fn recovers_after_unavailable() {
    let server = StubServer::start(vec![
        Reply::status(503).with_header("Retry-After", "0"),
        Reply::status(504),
        Reply::ok("Code,Year,a\nUSA,2020,5\n"),
    ]);
    let table = fetch_table(&server.client(), &descriptor("x", &[("a", "b")])).unwrap();
    assert_eq!(
        table.get(&EntityKey::new("USA", 2020), "b"),
        Some(&Value::number(5.0))
    );
    assert_eq!(server.hits(), 3);
}

#[test]
fn invalid_utf8_body_is_parse_error() {
    let server = StubServer::start(vec![Reply::ok(b"Code,Year,a\nUSA,2020,caf\xe9\n".to_vec())]);
    let err = fetch_table(&server.client(), &descriptor("x", &[("a", "b")])).unwrap_err();
    assert_matches!(err, OwidError::Parse { ref slug, stage: Stage::Parse, .. } if slug == "x");
}

#[test]
fn invalid_utf8_metadata_is_parse_error() {
    let server = StubServer::start(vec![Reply::ok(
        b"{\"columns\": {\"a\": {\"citationLong\": \"caf\xe9\"}}}".to_vec(),
    )]);
    let err = fetch_citations(&server.client(), &descriptor("x", &[("a", "b")])).unwrap_err();
    assert_matches!(err, OwidError::Parse { stage: Stage::Metadata, .. });
}

#[test]
fn metadata_round_trip_over_http() {
    let server = StubServer::start(vec![Reply::ok(
        r#"{"columns": {"a": {"citationLong": "Bleek (2017)"}}}"#,
    )]);
    let citations = fetch_citations(&server.client(), &descriptor("x", &[("a", "b")])).unwrap();
    assert_eq!(citations, vec!["Bleek (2017)"]);
    assert_eq!(server.hits(), 1);
}
