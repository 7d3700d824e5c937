//! Append-only audit trail for tool calls and security events.
//!
//! Events are written as JSON Lines to one file per local calendar day
//! (`audit-YYYY-MM-DD.jsonl`). Writing never fails the caller: I/O errors are
//! reported through `tracing` and dropped.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::AuditConfig;
use crate::context::RequestContext;

pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "key",
    "credential",
    "auth",
    "authorization",
];

const MAX_PARAM_CHARS: usize = 500;
const MAX_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// One audit record body; the timestamp is added when it is written.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    ToolCall {
        tool: String,
        params: Map<String, Value>,
        user_id: Option<String>,
        channel: Option<String>,
        session_key: Option<String>,
        success: bool,
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result_preview: Option<String>,
    },
    AccessDenied {
        user_id: String,
        channel: String,
        reason: String,
    },
    RateLimited {
        user_id: String,
        channel: String,
        limit_type: String,
    },
    SecurityEvent {
        event_type: String,
        severity: Severity,
        details: Value,
    },
}

#[derive(Serialize)]
struct AuditRecord<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// Outcome of a tool call, as recorded in the trail.
#[derive(Debug, Clone, Copy)]
pub struct ToolCallOutcome<'a> {
    pub success: bool,
    pub error: Option<&'a str>,
    pub result_preview: Option<&'a str>,
}

impl<'a> ToolCallOutcome<'a> {
    #[must_use]
    pub fn success(result: &'a str) -> Self {
        Self {
            success: true,
            error: None,
            result_preview: Some(result),
        }
    }

    #[must_use]
    pub fn failure(error: &'a str) -> Self {
        Self {
            success: false,
            error: Some(error),
            result_preview: None,
        }
    }
}

#[derive(Debug)]
struct DailyFile {
    date: String,
    path: PathBuf,
    file: Option<File>,
}

#[derive(Debug)]
pub struct AuditLogger {
    dir: PathBuf,
    current: Mutex<Option<DailyFile>>,
}

impl AuditLogger {
    /// Create a logger writing into `dir`, creating it if needed.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::error!("failed to create audit directory {}: {e}", dir.display());
        }
        Self {
            dir,
            current: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn from_config(config: &AuditConfig) -> Self {
        Self::new(config.resolved_dir())
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of today's log file.
    #[must_use]
    pub fn current_path(&self) -> PathBuf {
        self.dir.join(file_name(&today()))
    }

    /// Record a tool invocation. Parameters are redacted before writing.
    pub fn log_tool_call(
        &self,
        tool: &str,
        params: &Map<String, Value>,
        context: &RequestContext,
        outcome: ToolCallOutcome<'_>,
    ) {
        let result_preview = outcome
            .result_preview
            .filter(|r| !r.is_empty())
            .map(|r| r.chars().take(MAX_PREVIEW_CHARS).collect());

        self.log(&AuditEvent::ToolCall {
            tool: tool.to_owned(),
            params: redact_params(params),
            user_id: context.user_id.clone(),
            channel: context.channel.clone(),
            session_key: context.session_key.clone(),
            success: outcome.success,
            error: outcome.error.map(str::to_owned),
            result_preview,
        });
    }

    pub fn log_access_denied(&self, user_id: &str, channel: &str, reason: &str) {
        self.log(&AuditEvent::AccessDenied {
            user_id: user_id.to_owned(),
            channel: channel.to_owned(),
            reason: reason.to_owned(),
        });
        tracing::warn!("AUDIT: access denied for {user_id} on {channel}: {reason}");
    }

    pub fn log_rate_limited(&self, user_id: &str, channel: &str, limit_type: &str) {
        self.log(&AuditEvent::RateLimited {
            user_id: user_id.to_owned(),
            channel: channel.to_owned(),
            limit_type: limit_type.to_owned(),
        });
    }

    /// Record a security event. `details` is written as given, so callers
    /// must keep secrets out of it.
    pub fn log_security_event(&self, event_type: &str, details: Value, severity: Severity) {
        match severity {
            Severity::Info => {
                tracing::info!("AUDIT: security event [{event_type}]: {details}");
            }
            Severity::Warning => {
                tracing::warn!("AUDIT: security event [{event_type}]: {details}");
            }
            Severity::Error | Severity::Critical => {
                tracing::error!("AUDIT: security event [{event_type}]: {details}");
            }
        }
        self.log(&AuditEvent::SecurityEvent {
            event_type: event_type.to_owned(),
            severity,
            details,
        });
    }

    pub fn log_integrity_alert(&self, file: &str, expected_hash: &str, actual_hash: &str) {
        self.log_security_event(
            "integrity_violation",
            serde_json::json!({
                "file": file,
                "expected_hash": expected_hash,
                "actual_hash": actual_hash,
            }),
            Severity::Error,
        );
    }

    /// Append one event to today's file.
    pub fn log(&self, event: &AuditEvent) {
        let record = AuditRecord {
            timestamp: timestamp(),
            event,
        };
        let line = match serde_json::to_string(&record) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                tracing::error!("failed to serialize audit event: {e}");
                return;
            }
        };

        let mut current = self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let today = today();
        if current.as_ref().is_none_or(|d| d.date != today) {
            *current = Some(DailyFile {
                path: self.dir.join(file_name(&today)),
                date: today,
                file: None,
            });
        }
        let Some(daily) = current.as_mut() else {
            return;
        };

        if daily.file.is_none() {
            match OpenOptions::new().create(true).append(true).open(&daily.path) {
                Ok(file) => daily.file = Some(file),
                Err(e) => {
                    tracing::error!("failed to write audit log: {e}");
                    return;
                }
            }
        }

        if let Some(file) = daily.file.as_mut()
            && let Err(e) = file.write_all(line.as_bytes())
        {
            tracing::error!("failed to write audit log: {e}");
            daily.file = None;
        }
    }

    /// The last `limit` events from today's file, oldest first.
    ///
    /// Earlier days are not consulted. An unreadable or corrupt file yields
    /// an empty list.
    #[must_use]
    pub fn recent_events(&self, limit: usize) -> Vec<Value> {
        let path = self.current_path();
        if !path.exists() {
            return Vec::new();
        }

        match read_events(&path) {
            Ok(events) => {
                let skip = events.len().saturating_sub(limit);
                events.into_iter().skip(skip).collect()
            }
            Err(e) => {
                tracing::error!("failed to read audit log: {e}");
                Vec::new()
            }
        }
    }
}

fn read_events(path: &Path) -> anyhow::Result<Vec<Value>> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            events.push(serde_json::from_str(line)?);
        }
    }
    Ok(events)
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

fn file_name(date: &str) -> String {
    format!("audit-{date}.jsonl")
}

/// Redact secret-looking keys and truncate long strings, recursing into objects.
#[must_use]
pub fn redact_params(params: &Map<String, Value>) -> Map<String, Value> {
    params
        .iter()
        .map(|(key, value)| {
            let lower = key.to_lowercase();
            let redacted = if SENSITIVE_KEYS.iter().any(|s| lower.contains(s)) {
                Value::String(REDACTED.to_owned())
            } else {
                match value {
                    Value::String(s) if s.chars().count() > MAX_PARAM_CHARS => {
                        let head: String = s.chars().take(MAX_PARAM_CHARS).collect();
                        Value::String(format!("{head}...[truncated]"))
                    }
                    Value::Object(nested) => Value::Object(redact_params(nested)),
                    other => other.clone(),
                }
            };
            (key.clone(), redacted)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext {
            user_id: Some("u1".into()),
            channel: Some("cli".into()),
            session_key: None,
        }
    }

    #[test]
    fn redacts_sensitive_keys() {
        let out = redact_params(&obj(json!({
            "api_key": "sk-123",
            "Authorization": "Bearer x",
            "password": "hunter2",
            "query": "weather",
        })));
        assert_eq!(out["api_key"], json!(REDACTED));
        assert_eq!(out["Authorization"], json!(REDACTED));
        assert_eq!(out["password"], json!(REDACTED));
        assert_eq!(out["query"], json!("weather"));
    }

    #[test]
    fn redacts_at_any_depth() {
        let out = redact_params(&obj(json!({
            "outer": {"inner": {"db_token": "abc", "host": "localhost"}}
        })));
        assert_eq!(out["outer"]["inner"]["db_token"], json!(REDACTED));
        assert_eq!(out["outer"]["inner"]["host"], json!("localhost"));
    }

    #[test]
    fn sensitive_key_redacts_whole_subtree() {
        let out = redact_params(&obj(json!({"credentials": {"user": "a", "pass": "b"}})));
        assert_eq!(out["credentials"], json!(REDACTED));
    }

    #[test]
    fn truncates_long_strings() {
        let long = "x".repeat(600);
        let out = redact_params(&obj(json!({"content": long})));
        let value = out["content"].as_str().unwrap();
        assert!(value.ends_with("...[truncated]"));
        assert_eq!(value.len(), 500 + "...[truncated]".len());
    }

    #[test]
    fn other_values_pass_through() {
        let input = obj(json!({"count": 3, "flags": [1, 2], "on": true, "none": null}));
        assert_eq!(redact_params(&input), input);
    }

    #[test]
    fn tool_call_written_as_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(dir.path());
        logger.log_tool_call(
            "exec",
            &obj(json!({"command": "ls", "token": "t"})),
            &ctx(),
            ToolCallOutcome::success("file.txt"),
        );

        let events = logger.recent_events(10);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event["event"], "tool_call");
        assert_eq!(event["tool"], "exec");
        assert_eq!(event["params"]["token"], REDACTED);
        assert_eq!(event["user_id"], "u1");
        assert_eq!(event["session_key"], Value::Null);
        assert_eq!(event["success"], true);
        assert_eq!(event["result_preview"], "file.txt");
        assert!(event["timestamp"].as_str().is_some());
    }

    #[test]
    fn failed_call_has_error_and_no_preview() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(dir.path());
        logger.log_tool_call(
            "missing",
            &Map::new(),
            &RequestContext::default(),
            ToolCallOutcome::failure("Tool not found"),
        );
        let event = &logger.recent_events(1)[0];
        assert_eq!(event["success"], false);
        assert_eq!(event["error"], "Tool not found");
        assert!(event.get("result_preview").is_none());
    }

    #[test]
    fn result_preview_capped() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(dir.path());
        let result = "r".repeat(1000);
        logger.log_tool_call(
            "exec",
            &Map::new(),
            &ctx(),
            ToolCallOutcome::success(&result),
        );
        let event = &logger.recent_events(1)[0];
        assert_eq!(event["result_preview"].as_str().unwrap().len(), 200);
    }

    #[test]
    fn file_is_date_partitioned() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(dir.path());
        logger.log_rate_limited("u", "telegram", "message_rate");
        let expected = dir.path().join(format!("audit-{}.jsonl", today()));
        assert_eq!(logger.current_path(), expected);
        assert!(expected.exists());
    }

    #[test]
    fn other_event_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(dir.path());
        logger.log_access_denied("stranger", "discord", "not_in_allowlist");
        logger.log_rate_limited("spammer", "telegram", "message_rate");
        logger.log_integrity_alert("SOUL.md", "aaa", "bbb");

        let events = logger.recent_events(10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["event"], "access_denied");
        assert_eq!(events[0]["reason"], "not_in_allowlist");
        assert_eq!(events[1]["event"], "rate_limited");
        assert_eq!(events[1]["limit_type"], "message_rate");
        assert_eq!(events[2]["event"], "security_event");
        assert_eq!(events[2]["event_type"], "integrity_violation");
        assert_eq!(events[2]["severity"], "error");
        assert_eq!(events[2]["details"]["expected_hash"], "aaa");
    }

    #[test]
    fn recent_events_returns_tail() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(dir.path());
        for i in 0..5 {
            logger.log_rate_limited(&format!("u{i}"), "cli", "message_rate");
        }
        let events = logger.recent_events(2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["user_id"], "u3");
        assert_eq!(events[1]["user_id"], "u4");
    }

    #[test]
    fn recent_events_empty_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(dir.path());
        assert!(logger.recent_events(10).is_empty());
    }

    #[test]
    fn corrupt_file_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(dir.path());
        std::fs::write(logger.current_path(), "{not json}\n").unwrap();
        assert!(logger.recent_events(10).is_empty());
    }

    #[test]
    fn write_failure_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let logger = AuditLogger::new(&blocker);
        logger.log_rate_limited("u", "cli", "message_rate");
        assert!(logger.recent_events(10).is_empty());
    }
}
