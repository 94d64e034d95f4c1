use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// Everything the pipeline reports to the session log. Serialized with the
/// variant name as `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    GenerationStarted {
        model: String,
        images: usize,
    },
    SlotStarted {
        slot_id: String,
        kind: String,
    },
    SlotRetry {
        slot_id: String,
        /// One-based number of the attempt that failed.
        attempt: u32,
        max_retries: u32,
        delay_ms: u64,
        error: String,
        message: String,
    },
    SlotSucceeded {
        slot_id: String,
        kind: String,
    },
    SlotFailed {
        slot_id: String,
        kind: String,
        error: String,
        message: String,
    },
    PacingWait {
        slot_id: String,
        delay_ms: u64,
    },
    GenerationCancelled {
        attempted: usize,
    },
    GenerationFinished {
        succeeded: usize,
        failed: usize,
        cancelled: bool,
    },
    RegenerateStarted {
        slot_id: String,
        kind: String,
    },
    RegenerateFinished {
        slot_id: String,
        succeeded: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Append-only `events.jsonl` for one session: one compact object per line,
/// each carrying `type`, `session_id` and `ts` next to the event fields.
///
/// Clones share the file handle, so the worker thread and the CLI append
/// whole lines without interleaving.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventLog>,
}

#[derive(Debug)]
struct EventLog {
    path: PathBuf,
    session_id: String,
    file: Mutex<Option<File>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventLog {
                path: path.into(),
                session_id: session_id.into(),
                file: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Appends `event` and returns the JSON object that was written.
    pub fn record(&self, event: &PipelineEvent) -> anyhow::Result<Value> {
        let mut row = serde_json::to_value(event)?;
        let Some(fields) = row.as_object_mut() else {
            return Err(anyhow!("event did not serialize to an object"));
        };
        fields.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        fields.insert("ts".to_string(), Value::String(now_utc_iso()));

        let mut line = serde_json::to_vec(&row)?;
        line.push(b'\n');

        let mut file = self
            .inner
            .file
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        if file.is_none() {
            *file = Some(self.inner.open()?);
        }
        if let Some(handle) = file.as_mut() {
            handle
                .write_all(&line)
                .with_context(|| format!("failed to append to {}", self.inner.path.display()))?;
        }
        Ok(row)
    }
}

impl EventLog {
    fn open(&self) -> anyhow::Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open event log {}", self.path.display()))
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::{EventWriter, PipelineEvent};

    fn read_rows(path: &std::path::Path) -> anyhow::Result<Vec<Value>> {
        let content = fs::read_to_string(path)?;
        content
            .lines()
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }

    #[test]
    fn record_writes_one_tagged_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let written = writer.record(&PipelineEvent::SlotRetry {
            slot_id: "1".to_string(),
            attempt: 1,
            max_retries: 5,
            delay_ms: 4000,
            error: "rate_limited".to_string(),
            message: "HTTP 429".to_string(),
        })?;

        let rows = read_rows(&path)?;
        assert_eq!(rows, vec![written]);
        let row = &rows[0];
        assert_eq!(row["type"], json!("slot_retry"));
        assert_eq!(row["session_id"], json!("session-123"));
        assert_eq!(row["delay_ms"], json!(4000));
        assert_eq!(row["attempt"], json!(1));
        DateTime::parse_from_rfc3339(row["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn records_append_in_order_across_clones() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");
        let clone = writer.clone();

        writer.record(&PipelineEvent::GenerationStarted {
            model: "dryrun".to_string(),
            images: 2,
        })?;
        clone.record(&PipelineEvent::GenerationFinished {
            succeeded: 5,
            failed: 0,
            cancelled: false,
        })?;

        let types: Vec<Value> = read_rows(&path)?
            .into_iter()
            .map(|row| row["type"].clone())
            .collect();
        assert_eq!(
            types,
            vec![json!("generation_started"), json!("generation_finished")]
        );
        Ok(())
    }

    #[test]
    fn absent_regenerate_details_are_omitted() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "s");
        let row = writer.record(&PipelineEvent::RegenerateFinished {
            slot_id: "4".to_string(),
            succeeded: true,
            error: None,
            message: None,
        })?;
        assert_eq!(row["succeeded"], json!(true));
        assert!(row.get("error").is_none());
        assert!(row.get("message").is_none());
        Ok(())
    }

    #[test]
    fn unopenable_log_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        fs::create_dir_all(&path)?;
        let writer = EventWriter::new(&path, "s");
        let result = writer.record(&PipelineEvent::GenerationCancelled { attempted: 1 });
        assert!(result.is_err());
        Ok(())
    }
}
