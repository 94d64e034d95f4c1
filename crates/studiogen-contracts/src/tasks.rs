use serde::{Deserialize, Serialize};

/// The five fixed renderings, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    WhiteBackground,
    SizeGuide,
    DetailCloseup,
    WearingPhoto,
    LifestyleScene,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        TaskKind::WhiteBackground,
        TaskKind::SizeGuide,
        TaskKind::DetailCloseup,
        TaskKind::WearingPhoto,
        TaskKind::LifestyleScene,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::WhiteBackground => "White Background",
            Self::SizeGuide => "Size Guide",
            Self::DetailCloseup => "Detail Close-up",
            Self::WearingPhoto => "Wearing Photo",
            Self::LifestyleScene => "Lifestyle Scene",
        }
    }

    /// File-name friendly label, e.g. `detail-close-up`.
    pub fn slug(self) -> String {
        self.label()
            .to_ascii_lowercase()
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
            .collect()
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Observable state of one rendering job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSlot {
    pub id: String,
    pub kind: TaskKind,
    pub url: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
    pub timestamp: u64,
}

impl TaskSlot {
    pub fn new(id: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: id.into(),
            kind,
            url: None,
            loading: false,
            error: None,
            timestamp: 0,
        }
    }

    pub fn status(&self) -> SlotStatus {
        if self.loading {
            SlotStatus::Loading
        } else if self.error.is_some() {
            SlotStatus::Failed
        } else if self.url.is_some() {
            SlotStatus::Ready
        } else {
            SlotStatus::Idle
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Idle,
    Loading,
    Ready,
    Failed,
}

impl SlotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Slots `"1"`..`"5"` bound to [`TaskKind::ALL`] in order.
pub fn default_slots() -> Vec<TaskSlot> {
    TaskKind::ALL
        .iter()
        .enumerate()
        .map(|(idx, kind)| TaskSlot::new((idx + 1).to_string(), *kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{default_slots, SlotStatus, TaskKind, TaskSlot};

    #[test]
    fn default_slots_bind_ids_to_kinds_in_order() {
        let slots = default_slots();
        let pairs: Vec<(String, &str)> = slots
            .iter()
            .map(|slot| (slot.id.clone(), slot.kind.label()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("1".to_string(), "White Background"),
                ("2".to_string(), "Size Guide"),
                ("3".to_string(), "Detail Close-up"),
                ("4".to_string(), "Wearing Photo"),
                ("5".to_string(), "Lifestyle Scene"),
            ]
        );
        assert!(slots
            .iter()
            .all(|slot| !slot.loading && slot.url.is_none() && slot.error.is_none()));
    }

    #[test]
    fn slug_is_file_name_safe() {
        assert_eq!(TaskKind::DetailCloseup.slug(), "detail-close-up");
        assert_eq!(TaskKind::WhiteBackground.slug(), "white-background");
    }

    #[test]
    fn status_prefers_loading_then_error() {
        let mut slot = TaskSlot::new("1", TaskKind::SizeGuide);
        assert_eq!(slot.status(), SlotStatus::Idle);
        slot.url = Some("data:image/png;base64,AAAA".to_string());
        assert_eq!(slot.status(), SlotStatus::Ready);
        slot.error = Some("Retry failed.".to_string());
        assert_eq!(slot.status(), SlotStatus::Failed);
        slot.loading = true;
        assert_eq!(slot.status(), SlotStatus::Loading);
    }
}
