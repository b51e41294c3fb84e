//! Request log records and sinks.
//!
//! Every completed or failed request produces one [`RequestLog`]. The default
//! durable sink appends JSON lines to `~/.llmux/logs/requests.jsonl`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use llmux_core::types::CanonicalResponse;
use llmux_core::utils::truncate_string;
use llmux_core::Result;

/// Prompts longer than this are truncated in log records.
const MAX_LOGGED_PROMPT_CHARS: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub cost: f64,
    pub duration_ms: u64,
    pub status: RequestStatus,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestLog {
    fn base(provider: &str, model: &str, prompt: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            provider: provider.to_string(),
            model: model.to_string(),
            prompt: truncate_string(prompt, MAX_LOGGED_PROMPT_CHARS),
            input_tokens: 0,
            output_tokens: 0,
            cached_tokens: 0,
            cost: 0.0,
            duration_ms: 0,
            status: RequestStatus::Success,
            cached: false,
            error: None,
        }
    }

    /// Record for a request that produced a response (possibly error-bearing).
    pub fn from_response(provider: &str, model: &str, prompt: &str, response: &CanonicalResponse) -> Self {
        Self {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            cached_tokens: response.usage.cached_tokens,
            cost: response.cost,
            duration_ms: response.response_time_ms,
            status: if response.is_error() {
                RequestStatus::Error
            } else {
                RequestStatus::Success
            },
            cached: response.cached,
            error: response.error.clone(),
            ..Self::base(provider, model, prompt)
        }
    }

    /// Record for a request that failed with an error.
    pub fn failure(provider: &str, model: &str, prompt: &str, duration_ms: u64, error: &str) -> Self {
        Self {
            duration_ms,
            status: RequestStatus::Error,
            error: Some(error.to_string()),
            ..Self::base(provider, model, prompt)
        }
    }
}

/// Destination for request records.
pub trait LogSink: Send + Sync {
    fn record(&self, log: &RequestLog) -> Result<()>;
}

/// Discards every record.
#[derive(Debug, Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn record(&self, _log: &RequestLog) -> Result<()> {
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<RequestLog>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<RequestLog> {
        self.entries.lock().clone()
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, log: &RequestLog) -> Result<()> {
        self.entries.lock().push(log.clone());
        Ok(())
    }
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct JsonlLogSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back (skipping unparseable lines).
    pub fn read_all(&self) -> Result<Vec<RequestLog>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

impl LogSink for JsonlLogSink {
    fn record(&self, log: &RequestLog) -> Result<()> {
        let line = serde_json::to_string(log)?;
        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        debug!(id = %log.id, path = %self.path.display(), "request logged");
        Ok(())
    }
}
