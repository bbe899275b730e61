use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Everything a design session records in `events.jsonl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ProjectOpened,
    StyleApplied,
    StyleFailed,
    ChatUserTurn,
    ChatAnswer,
    EditApplied,
    EditFailed,
    ProjectReset,
    SessionFinished,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        Self::ProjectOpened,
        Self::StyleApplied,
        Self::StyleFailed,
        Self::ChatUserTurn,
        Self::ChatAnswer,
        Self::EditApplied,
        Self::EditFailed,
        Self::ProjectReset,
        Self::SessionFinished,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProjectOpened => "project_opened",
            Self::StyleApplied => "style_applied",
            Self::StyleFailed => "style_failed",
            Self::ChatUserTurn => "chat_user_turn",
            Self::ChatAnswer => "chat_answer",
            Self::EditApplied => "edit_applied",
            Self::EditFailed => "edit_failed",
            Self::ProjectReset => "project_reset",
            Self::SessionFinished => "session_finished",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw.trim())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only log of one design session.
///
/// Each line carries `type`, `session_id` and an RFC 3339 `ts`, followed by the
/// payload fields (which win on key clashes). Images are referenced by
/// fingerprint only. Clones share one file lock so a background render and
/// the chat loop never interleave partial lines.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<SessionLog>,
}

#[derive(Debug)]
struct SessionLog {
    path: PathBuf,
    session_id: String,
    append: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(SessionLog {
                path: path.into(),
                session_id: session_id.into(),
                append: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> Result<Value> {
        let mut record = Map::new();
        record.insert("type".to_string(), Value::from(kind.as_str()));
        record.insert(
            "session_id".to_string(),
            Value::from(self.shared.session_id.as_str()),
        );
        record.insert(
            "ts".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        record.extend(payload);
        let record = Value::Object(record);
        self.append_line(&record)?;
        Ok(record)
    }

    /// Same as [`emit`](Self::emit) for a `json!` object literal.
    pub fn emit_json(&self, kind: EventKind, payload: Value) -> Result<Value> {
        match payload {
            Value::Object(map) => self.emit(kind, map),
            Value::Null => self.emit(kind, EventPayload::new()),
            other => bail!("{kind} payload must be a JSON object, got {other}"),
        }
    }

    fn append_line(&self, record: &Value) -> Result<()> {
        let path = &self.shared.path;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _append = self
            .shared
            .append
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("failed to append to {}", path.display()))
    }
}
