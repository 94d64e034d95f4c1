use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::now_utc_iso;
use crate::tasks::{SlotStatus, TaskSlot};

/// Final state of one slot as reported in `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub error: Option<String>,
    /// Where the image was saved, if the slot produced one.
    pub path: Option<String>,
}

impl SlotSummary {
    pub fn from_slot(slot: &TaskSlot, path: Option<&Path>) -> Self {
        Self {
            id: slot.id.clone(),
            kind: slot.kind.label().to_string(),
            status: slot.status().as_str().to_string(),
            error: slot.error.clone(),
            path: path.map(|path| path.to_string_lossy().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub session_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub slots: Vec<SlotSummary>,
}

impl RunSummary {
    fn count(&self, status: SlotStatus) -> u64 {
        self.slots
            .iter()
            .filter(|slot| slot.status == status.as_str())
            .count() as u64
    }

    pub fn succeeded(&self) -> u64 {
        self.count(SlotStatus::Ready)
    }

    pub fn failed(&self) -> u64 {
        self.count(SlotStatus::Failed)
    }

    pub fn all_succeeded(&self) -> bool {
        !self.slots.is_empty() && self.succeeded() == self.slots.len() as u64
    }
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    #[serde(flatten)]
    summary: &'a RunSummary,
    total_slots: usize,
    succeeded: u64,
    failed: u64,
    ts: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Writes `summary.json` with derived totals. `extra` keys are added at the
/// top level.
pub fn write_summary(
    path: &Path,
    summary: &RunSummary,
    extra: Option<&Map<String, Value>>,
) -> anyhow::Result<()> {
    let document = SummaryDocument {
        summary,
        total_slots: summary.slots.len(),
        succeeded: summary.succeeded(),
        failed: summary.failed(),
        ts: now_utc_iso(),
        extra: extra.cloned().unwrap_or_default(),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(&document)?;
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
