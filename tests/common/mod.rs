// tests/common/mod.rs
//
// Common test utilities: scripted backends for session tests and a canned
// HTTP responder for exercising the real API clients.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use logshare::clock::{Clock, FixedClock};
use logshare::sink::MemorySink;
use logshare::{
    ApiError, Backends, Count, Credentials, FetchConfig, LogFetcher, LogSink, Meta,
    ObjectStorage, SharedSink, StorageError, StorageDestination, ZoneLookup,
};

/// Print test header with formatting
pub fn print_test_header(test_name: &str) {
    println!("\n{}", "=".repeat(60));
    println!("TEST: {}", test_name);
    println!("{}", "=".repeat(60));
}

/// Ordered record of every call made into the mock backends.
pub type Events = Arc<Mutex<Vec<String>>>;

pub fn events_of(events: &Events) -> Vec<String> {
    events.lock().unwrap().clone()
}

/// A valid single-shot configuration with an explicit zone id.
pub fn base_config() -> FetchConfig {
    FetchConfig {
        credentials: Credentials {
            api_key: "k".into(),
            api_email: "e".into(),
        },
        zone_id: "z1".into(),
        start_time: 1000,
        end_time: 2000,
        count: Count::Limit(5),
        ..Default::default()
    }
}

pub fn with_bucket(mut config: FetchConfig) -> FetchConfig {
    config.storage = StorageDestination {
        bucket: "logs".into(),
        project_id: "proj".into(),
    };
    config
}

// -- Backends

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketOutcome {
    Created,
    AlreadyExists,
    Denied,
}

/// Outcome of one scripted fetch. An exhausted script answers `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Ok,
    Status(u16),
}

pub const RECORD: &[u8] = b"{\"RayID\":\"3a7f\"}\n";

pub struct MockBackends {
    pub events: Events,
    /// `None` makes the name lookup fail.
    pub zone_answer: Option<String>,
    pub bucket: BucketOutcome,
    pub fetches: Arc<Mutex<VecDeque<FetchOutcome>>>,
    /// Every writer handed out by `open_writer`.
    pub writers: Arc<Mutex<Vec<MemorySink>>>,
    pub clock: FixedClock,
    /// Stall each successful fetch this long halfway through its record.
    pub body_delay: Option<Duration>,
}

impl MockBackends {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            zone_answer: None,
            bucket: BucketOutcome::Created,
            fetches: Arc::new(Mutex::new(VecDeque::new())),
            writers: Arc::new(Mutex::new(Vec::new())),
            clock: FixedClock(1_700_000_000),
            body_delay: None,
        }
    }

    pub fn with_body_delay(mut self, delay: Duration) -> Self {
        self.body_delay = Some(delay);
        self
    }

    pub fn with_zone(mut self, id: &str) -> Self {
        self.zone_answer = Some(id.to_string());
        self
    }

    pub fn with_bucket(mut self, outcome: BucketOutcome) -> Self {
        self.bucket = outcome;
        self
    }

    pub fn with_fetches(self, outcomes: &[FetchOutcome]) -> Self {
        self.fetches.lock().unwrap().extend(outcomes.iter().copied());
        self
    }

    pub fn events(&self) -> Vec<String> {
        events_of(&self.events)
    }

    pub fn writers(&self) -> Vec<MemorySink> {
        self.writers.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backends for MockBackends {
    fn zone_lookup(&self, _credentials: &Credentials) -> Result<Box<dyn ZoneLookup>> {
        Ok(Box::new(MockLookup {
            events: self.events.clone(),
            answer: self.zone_answer.clone(),
        }))
    }

    async fn object_storage(&self) -> Result<Box<dyn ObjectStorage>> {
        Ok(Box::new(MockStorage {
            events: self.events.clone(),
            outcome: self.bucket,
            writers: self.writers.clone(),
        }))
    }

    fn log_client(&self, _config: &FetchConfig, sink: Option<SharedSink>) -> Result<Box<dyn LogFetcher>> {
        self.events.lock().unwrap().push(format!(
            "client:{}",
            if sink.is_some() { "object" } else { "stdout" }
        ));
        Ok(Box::new(MockFetcher {
            events: self.events.clone(),
            script: self.fetches.clone(),
            sink,
            body_delay: self.body_delay,
        }))
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }
}

struct MockLookup {
    events: Events,
    answer: Option<String>,
}

#[async_trait]
impl ZoneLookup for MockLookup {
    async fn zone_id_by_name(&self, zone_name: &str) -> Result<String, ApiError> {
        self.events.lock().unwrap().push(format!("lookup:{}", zone_name));
        self.answer
            .clone()
            .ok_or_else(|| ApiError::ZoneNotFound(zone_name.to_string()))
    }
}

struct MockStorage {
    events: Events,
    outcome: BucketOutcome,
    writers: Arc<Mutex<Vec<MemorySink>>>,
}

#[async_trait]
impl ObjectStorage for MockStorage {
    async fn create_bucket(&self, project_id: &str, bucket: &str) -> Result<(), StorageError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("create_bucket:{}/{}", project_id, bucket));
        match self.outcome {
            BucketOutcome::Created => Ok(()),
            BucketOutcome::AlreadyExists => Err(StorageError::AlreadyExists(bucket.to_string())),
            BucketOutcome::Denied => Err(anyhow::anyhow!("403 Forbidden").into()),
        }
    }

    async fn open_writer(&self, bucket: &str, object: &str) -> Result<Box<dyn LogSink>> {
        self.events
            .lock()
            .unwrap()
            .push(format!("open_writer:{}/{}", bucket, object));
        let sink = MemorySink::new();
        self.writers.lock().unwrap().push(sink.clone());
        Ok(Box::new(sink))
    }
}

struct MockFetcher {
    events: Events,
    script: Arc<Mutex<VecDeque<FetchOutcome>>>,
    sink: Option<SharedSink>,
    body_delay: Option<Duration>,
}

impl MockFetcher {
    async fn respond(&self, url: &str) -> Result<Meta, ApiError> {
        let outcome = self.script.lock().unwrap().pop_front().unwrap_or(FetchOutcome::Ok);
        match outcome {
            FetchOutcome::Status(status) => Err(ApiError::Status {
                status,
                url: url.to_string(),
                body: "scripted failure".into(),
            }),
            FetchOutcome::Ok => {
                if let Some(sink) = &self.sink {
                    let mut sink = sink.lock().await;
                    let (head, tail) = RECORD.split_at(RECORD.len() / 2);
                    sink.write_chunk(head).await.map_err(ApiError::Output)?;
                    if let Some(delay) = self.body_delay {
                        tokio::time::sleep(delay).await;
                    }
                    sink.write_chunk(tail).await.map_err(ApiError::Output)?;
                }
                Ok(Meta {
                    status_code: 200,
                    duration_ms: 1,
                    url: url.to_string(),
                    count: 1,
                })
            }
        }
    }
}

#[async_trait]
impl LogFetcher for MockFetcher {
    async fn fetch_field_names(&self, zone_id: &str) -> Result<Meta, ApiError> {
        self.events.lock().unwrap().push(format!("fields:{}", zone_id));
        self.respond("fields").await
    }

    async fn get_from_timestamp(
        &self,
        zone_id: &str,
        start: i64,
        end: i64,
        count: Count,
    ) -> Result<Meta, ApiError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("range:{}:{}:{}:{}", zone_id, start, end, count));
        self.respond("range").await
    }
}

// -- Canned HTTP responder

/// One canned response.
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Canned {
    pub fn ok(content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self { status: 200, content_type, body: body.into() }
    }

    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, content_type: "application/json", body: body.into() }
    }
}

/// The head of a request received by [`CannedServer`].
#[derive(Debug, Clone)]
pub struct SeenRequest {
    /// e.g. `GET /client/v4/zones?name=example.com HTTP/1.1`
    pub request_line: String,
    /// Header lines, lowercased names.
    pub headers: Vec<(String, String)>,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == &name.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }

    pub fn target(&self) -> &str {
        self.request_line.split(' ').nth(1).unwrap_or("")
    }
}

/// Minimal HTTP/1.1 server answering every request with the same response.
pub struct CannedServer {
    pub base_url: String,
    pub seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl CannedServer {
    pub async fn start(response: Canned) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_task = seen.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let head = read_head(&mut socket).await;
                seen_by_task.lock().unwrap().push(parse_head(&head));

                let reason = match response.status {
                    200 => "OK",
                    403 => "Forbidden",
                    404 => "Not Found",
                    _ => "Error",
                };
                let mut reply = format!(
                    "HTTP/1.1 {} {}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    response.status,
                    reason,
                    response.content_type,
                    response.body.len()
                )
                .into_bytes();
                reply.extend_from_slice(&response.body);
                let _ = socket.write_all(&reply).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base_url: format!("http://{}/client/v4", addr),
            seen,
        }
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&byte[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn parse_head(head: &str) -> SeenRequest {
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers = lines
        .take_while(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    SeenRequest { request_line, headers }
}
