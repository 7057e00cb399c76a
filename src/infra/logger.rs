// src/infra/logger.rs — Structured logging with tracing
//
// `LogContext` is created once at startup and handed to whatever needs to
// write log artifacts. Nothing here keeps global directory state.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::integrations::types::TokenUsage;

pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// One line of `llm-usage-YYYY-MM-DD.jsonl`.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord<'a> {
    pub at: String,
    pub user_id: i64,
    pub op: &'a str,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Explicit handle for file-backed log artifacts.
#[derive(Clone, Default)]
pub struct LogContext {
    dir: Option<PathBuf>,
    // Serializes appends from concurrent background tasks.
    write_lock: Arc<Mutex<()>>,
}

impl LogContext {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// A context that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn dir(&self) -> Option<&PathBuf> {
        self.dir.as_ref()
    }

    /// Append an LLM usage record. Failures are logged and swallowed.
    pub fn record_usage(&self, user_id: i64, op: &str, usage: &TokenUsage) {
        let Some(dir) = &self.dir else {
            return;
        };
        let now = Utc::now();
        let record = UsageRecord {
            at: now.to_rfc3339(),
            user_id,
            op,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        };
        let path = dir.join(format!("llm-usage-{}.jsonl", now.format("%Y-%m-%d")));

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let result = (|| -> std::io::Result<()> {
            std::fs::create_dir_all(dir)?;
            let line = serde_json::to_string(&record).map_err(std::io::Error::other)?;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            writeln!(file, "{line}")
        })();
        if let Err(e) = result {
            tracing::warn!("Failed to write usage record to {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_context_writes_nothing() {
        let ctx = LogContext::disabled();
        assert!(ctx.dir().is_none());
        ctx.record_usage(1, "analyze", &TokenUsage::default());
    }

    #[test]
    fn test_usage_appends_jsonl() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = LogContext::new(Some(tmp.path().to_path_buf()));
        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        };
        ctx.record_usage(7, "analyze", &usage);
        ctx.record_usage(7, "select_category", &usage);

        let file = std::fs::read_dir(tmp.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let content = std::fs::read_to_string(file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"op\":\"analyze\""));
        assert!(lines[1].contains("\"user_id\":7"));
    }
}
