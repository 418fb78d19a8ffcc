//! 请求日志与后台任务队列：请求路径之外的日志写入与统计更新。
//!
//! # Request Logging
//!
//! Every request (success, cache hit, or failure) produces one
//! [`RequestLog`]. Logs are never written on the request path: the gateway
//! hands them to a [`BackgroundQueue`], whose worker runs each job in its own
//! task so one slow sink cannot delay the others or the response.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`LogSink`] | Destination for request logs |
//! | [`TracingLogSink`] | Emits each log as a structured `tracing` event |
//! | [`MemoryLogSink`] | Keeps logs in memory, for tests |
//! | [`BackgroundQueue`] | Fire-and-forget job runner |

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use crate::drivers::ProviderId;
use crate::types::Usage;
use crate::Result;

/// One request outcome, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLog {
    pub id: String,
    pub identity: String,
    pub model: String,
    pub provider: Option<ProviderId>,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cache_hit: bool,
    pub failover_used: bool,
    pub original_provider: Option<ProviderId>,
    pub status_code: u16,
    pub error_message: Option<String>,
    pub streamed: bool,
    pub created: i64,
}

impl RequestLog {
    pub fn new(identity: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            identity: identity.into(),
            model: model.into(),
            provider: None,
            cost_usd: 0.0,
            latency_ms: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cache_hit: false,
            failover_used: false,
            original_provider: None,
            status_code: 200,
            error_message: None,
            streamed: false,
            created: crate::types::response::unix_now(),
        }
    }

    pub fn with_usage(mut self, usage: &Usage) -> Self {
        self.prompt_tokens = usage.prompt_tokens;
        self.completion_tokens = usage.completion_tokens;
        self.total_tokens = usage.total_tokens;
        self
    }

    pub fn with_error(mut self, status_code: u16, message: impl Into<String>) -> Self {
        self.status_code = status_code;
        self.error_message = Some(message.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}

#[async_trait]
pub trait LogSink: Send + Sync + std::fmt::Debug {
    async fn record(&self, log: RequestLog) -> Result<()>;
}

/// Writes logs to the `llm_gateway::requests` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn record(&self, log: RequestLog) -> Result<()> {
        tracing::info!(
            target: "llm_gateway::requests",
            id = %log.id,
            identity = %log.identity,
            model = %log.model,
            provider = log.provider.map(|p| p.as_str()).unwrap_or("-"),
            status = log.status_code,
            cost_usd = log.cost_usd,
            latency_ms = log.latency_ms,
            prompt_tokens = log.prompt_tokens,
            completion_tokens = log.completion_tokens,
            cache_hit = log.cache_hit,
            failover_used = log.failover_used,
            streamed = log.streamed,
            error = log.error_message.as_deref().unwrap_or(""),
            "request completed"
        );
        Ok(())
    }
}

/// In-memory sink for testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogSink {
    logs: Arc<Mutex<Vec<RequestLog>>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> Vec<RequestLog> {
        self.logs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.logs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn record(&self, log: RequestLog) -> Result<()> {
        self.logs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(log);
        Ok(())
    }
}

type Job = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

enum Message {
    Job { name: &'static str, job: Job },
    Flush(oneshot::Sender<()>),
}

/// Handle for submitting background jobs.
///
/// Clones share one worker. The worker exits once every handle is dropped
/// and all in-flight jobs have finished.
#[derive(Debug, Clone)]
pub struct BackgroundQueue {
    tx: mpsc::UnboundedSender<Message>,
}

impl BackgroundQueue {
    /// Starts the worker on the current runtime.
    pub fn start() -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(rx));
        (Self { tx }, worker)
    }

    /// Schedules `job`; failures are logged by the worker, never returned.
    pub fn submit<F>(&self, name: &'static str, job: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        if self
            .tx
            .send(Message::Job {
                name,
                job: Box::pin(job),
            })
            .is_err()
        {
            tracing::warn!(job = name, "background queue closed, job dropped");
        }
    }

    /// Waits until every job submitted before this call has finished.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Message::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Job { name, .. } => f.debug_struct("Job").field("name", name).finish(),
            Message::Flush(_) => f.write_str("Flush"),
        }
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<Message>) {
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(Message::Job { name, job }) => {
                    tasks.spawn(async move {
                        if let Err(e) = job.await {
                            tracing::warn!(job = name, error = %e, "background job failed");
                        }
                    });
                }
                Some(Message::Flush(done)) => {
                    while let Some(res) = tasks.join_next().await {
                        log_join_error(res);
                    }
                    let _ = done.send(());
                }
                None => break,
            },
            Some(res) = tasks.join_next(), if !tasks.is_empty() => log_join_error(res),
        }
    }
    while let Some(res) = tasks.join_next().await {
        log_join_error(res);
    }
    tracing::debug!("background queue drained");
}

fn log_join_error(res: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        tracing::warn!(error = %e, "background job panicked");
    }
}
