//! Fakes shared by unit tests across the crate.

use crate::ingest::fetcher::Sleeper;
use crate::ingest::provider::MarketDataClient;
use crate::ingest::types::{Payload, PriceBar, UpstreamError};
use crate::llm::{Provider, TextGenerator};
use crate::notify::{NotificationChannel, NotificationError, OutgoingReport};
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub fn fundamentals(v: serde_json::Value) -> Payload {
    match v {
        serde_json::Value::Object(map) => Payload::Fundamentals(map),
        other => panic!("fundamentals fixture must be an object, got {other}"),
    }
}

pub fn history(closes: &[f64]) -> Payload {
    let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    Payload::History(
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| PriceBar {
                date: start + chrono::Duration::days(i as i64),
                close: Some(*c),
            })
            .collect(),
    )
}

/// Upstream client that replays a per-ticker script of responses.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<Result<Payload, UpstreamError>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, ticker: &str, responses: Vec<Result<Payload, UpstreamError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(ticker.to_string(), responses.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, ticker: &str) -> usize {
        self.calls().iter().filter(|t| t.as_str() == ticker).count()
    }
}

#[async_trait::async_trait]
impl MarketDataClient for ScriptedClient {
    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    async fn get(&self, ticker: &str) -> Result<Payload, UpstreamError> {
        self.calls.lock().unwrap().push(ticker.to_string());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(ticker)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Err(UpstreamError::Other(format!("unscripted ticker {ticker}"))))
    }
}

/// Sleeper that advances a virtual clock and records every requested delay.
pub struct VirtualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for VirtualClock {
    async fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }

    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock().unwrap()
    }
}

/// Text generator returning a canned answer (or error) and recording prompts.
pub struct CannedGenerator {
    answer: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl CannedGenerator {
    pub fn ok(text: &str) -> Self {
        Self {
            answer: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            answer: Err(msg.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TextGenerator for CannedGenerator {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answer.clone().map_err(anyhow::Error::msg)
    }
}

/// Notification channel that stores what it was asked to send.
pub struct RecordingChannel {
    name: &'static str,
    fail: bool,
    sent: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fail: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        self.name
    }

    async fn send(&self, report: &OutgoingReport<'_>) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError::Transport(format!("{} is down", self.name)));
        }
        self.sent.lock().unwrap().push(report.report.body.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationChannel for Arc<RecordingChannel> {
    fn name(&self) -> &str {
        self.name
    }

    async fn send(&self, report: &OutgoingReport<'_>) -> Result<(), NotificationError> {
        self.as_ref().send(report).await
    }
}

/// What the local HTTP fake does with one request.
pub enum Reply {
    Respond {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: String,
    },
    /// Holds the connection open without answering.
    Hang,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Reply::Respond {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Reply::Respond {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }
}

/// Minimal HTTP/1.1 server on localhost. `respond` gets the request target and
/// how many requests (any path) came before it.
pub struct FakeServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeServer {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&str, usize) -> Reply + Send + Sync + 'static,
    {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        let respond = Arc::new(respond);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let seen = seen.clone();
                let respond = respond.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf).to_string();
                    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let index = {
                        let mut seen = seen.lock().unwrap();
                        seen.push(target.clone());
                        seen.len() - 1
                    };

                    match respond(&target, index) {
                        Reply::Hang => {
                            tokio::time::sleep(Duration::from_secs(3600)).await;
                        }
                        Reply::Respond {
                            status,
                            headers,
                            body,
                        } => {
                            let mut out = format!(
                                "HTTP/1.1 {status} Fake\r\ncontent-length: {}\r\nconnection: close\r\n",
                                body.len()
                            );
                            for (name, value) in headers {
                                out.push_str(&format!("{name}: {value}\r\n"));
                            }
                            out.push_str("\r\n");
                            out.push_str(&body);
                            let _ = stream.write_all(out.as_bytes()).await;
                            let _ = stream.shutdown().await;
                        }
                    }
                });
            }
        });

        Self { base_url, requests }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self, path_prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|t| t.starts_with(path_prefix))
            .count()
    }
}
