use std::sync::{mpsc, Arc, Mutex, MutexGuard};

use studiogen_contracts::tasks::{default_slots, TaskKind, TaskSlot};

/// Immutable view of the slot table at one transition.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardSnapshot {
    pub slots: Arc<[TaskSlot]>,
    pub is_generating: bool,
    pub version: u64,
}

impl BoardSnapshot {
    pub fn slot(&self, id: &str) -> Option<&TaskSlot> {
        self.slots.iter().find(|slot| slot.id == id)
    }
}

/// Owner of the five slots and the generating flag.
///
/// Every mutation builds a fresh slot vector and swaps it in whole, so a
/// reader holding a [`BoardSnapshot`] never sees a half-applied transition.
/// Subscribers receive each new snapshot in transition order.
pub struct SlotBoard {
    state: Mutex<BoardSnapshot>,
    subscribers: Mutex<Vec<mpsc::Sender<BoardSnapshot>>>,
}

impl Default for SlotBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotBoard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BoardSnapshot {
                slots: default_slots().into(),
                is_generating: false,
                version: 0,
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.lock_state().clone()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<BoardSnapshot> {
        let (tx, rx) = mpsc::channel();
        self.lock_subscribers().push(tx);
        rx
    }

    pub fn is_generating(&self) -> bool {
        self.lock_state().is_generating
    }

    pub fn kind_of(&self, id: &str) -> Option<TaskKind> {
        self.lock_state().slot(id).map(|slot| slot.kind)
    }

    pub fn slot_ids(&self) -> Vec<String> {
        self.lock_state()
            .slots
            .iter()
            .map(|slot| slot.id.clone())
            .collect()
    }

    pub fn set_generating(&self, is_generating: bool) {
        self.transition(|current| {
            Some((current.slots.to_vec(), is_generating))
        });
    }

    /// Enters loading on every slot in one transition.
    pub fn mark_all_loading(&self) {
        self.transition(|current| {
            let slots = current
                .slots
                .iter()
                .map(|slot| TaskSlot {
                    loading: true,
                    error: None,
                    ..slot.clone()
                })
                .collect();
            Some((slots, current.is_generating))
        });
    }

    pub fn mark_loading(&self, id: &str) -> bool {
        self.update_slot(id, |slot| TaskSlot {
            loading: true,
            error: None,
            ..slot.clone()
        })
    }

    /// Stores a finished image. The timestamp is strictly greater than the
    /// slot's previous one even if the wall clock did not move.
    pub fn complete(&self, id: &str, url: String) -> bool {
        let now = now_millis();
        self.update_slot(id, |slot| TaskSlot {
            url: Some(url.clone()),
            loading: false,
            error: None,
            timestamp: now.max(slot.timestamp.saturating_add(1)),
            ..slot.clone()
        })
    }

    /// Surfaces a failure; any previous image stays in place.
    pub fn fail(&self, id: &str, message: &str) -> bool {
        self.update_slot(id, |slot| TaskSlot {
            loading: false,
            error: Some(message.to_string()),
            ..slot.clone()
        })
    }

    fn update_slot(&self, id: &str, apply: impl Fn(&TaskSlot) -> TaskSlot) -> bool {
        self.transition(|current| {
            current.slot(id)?;
            let slots = current
                .slots
                .iter()
                .map(|slot| {
                    if slot.id == id {
                        apply(slot)
                    } else {
                        slot.clone()
                    }
                })
                .collect();
            Some((slots, current.is_generating))
        })
    }

    fn transition(
        &self,
        next: impl FnOnce(&BoardSnapshot) -> Option<(Vec<TaskSlot>, bool)>,
    ) -> bool {
        let mut state = self.lock_state();
        let Some((slots, is_generating)) = next(&state) else {
            return false;
        };
        let snapshot = BoardSnapshot {
            slots: slots.into(),
            is_generating,
            version: state.version + 1,
        };
        *state = snapshot.clone();
        // Published under the state lock so subscribers see transitions in order.
        self.lock_subscribers()
            .retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, BoardSnapshot> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<mpsc::Sender<BoardSnapshot>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::SlotBoard;

    #[test]
    fn board_starts_with_five_idle_slots() {
        let board = SlotBoard::new();
        let snapshot = board.snapshot();
        assert_eq!(snapshot.slots.len(), 5);
        assert_eq!(snapshot.version, 0);
        assert!(!snapshot.is_generating);
        assert_eq!(board.slot_ids(), vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn mark_all_loading_is_a_single_transition() {
        let board = SlotBoard::new();
        board.fail("2", "Retry failed.");
        let updates = board.subscribe();

        board.mark_all_loading();
        let seen: Vec<_> = updates.try_iter().collect();
        assert_eq!(seen.len(), 1);
        assert!(seen[0]
            .slots
            .iter()
            .all(|slot| slot.loading && slot.error.is_none()));
    }

    #[test]
    fn loading_and_error_are_exclusive() {
        let board = SlotBoard::new();
        board.mark_loading("1");
        board.fail("1", "Generation failed. Rate limit likely exceeded.");
        let slot = board.snapshot().slot("1").cloned().unwrap_or_else(|| panic!("slot 1"));
        assert!(!slot.loading);
        assert!(slot.error.is_some());

        board.mark_loading("1");
        let slot = board.snapshot().slot("1").cloned().unwrap_or_else(|| panic!("slot 1"));
        assert!(slot.loading);
        assert!(slot.error.is_none());
    }

    #[test]
    fn complete_strictly_increases_timestamp() {
        let board = SlotBoard::new();
        board.complete("4", "data:image/png;base64,AAAA".to_string());
        let first = board.snapshot().slot("4").map(|slot| slot.timestamp).unwrap_or(0);
        board.complete("4", "data:image/png;base64,BBBB".to_string());
        let second = board.snapshot().slot("4").cloned().unwrap_or_else(|| panic!("slot 4"));
        assert!(first > 0);
        assert!(second.timestamp > first);
        assert_eq!(second.url.as_deref(), Some("data:image/png;base64,BBBB"));
    }

    #[test]
    fn failure_keeps_previous_image() {
        let board = SlotBoard::new();
        board.complete("3", "data:image/png;base64,AAAA".to_string());
        board.fail("3", "Retry failed.");
        let slot = board.snapshot().slot("3").cloned().unwrap_or_else(|| panic!("slot 3"));
        assert_eq!(slot.url.as_deref(), Some("data:image/png;base64,AAAA"));
        assert_eq!(slot.error.as_deref(), Some("Retry failed."));
    }

    #[test]
    fn slot_update_never_touches_siblings() {
        let board = SlotBoard::new();
        board.complete("1", "data:image/png;base64,ONE".to_string());
        let before = board.snapshot();
        board.mark_loading("2");
        board.complete("2", "data:image/png;base64,TWO".to_string());
        let after = board.snapshot();
        for id in ["1", "3", "4", "5"] {
            assert_eq!(before.slot(id), after.slot(id));
        }
    }

    #[test]
    fn snapshots_are_not_mutated_by_later_transitions() {
        let board = SlotBoard::new();
        let before = board.snapshot();
        board.mark_all_loading();
        assert!(before.slots.iter().all(|slot| !slot.loading));
        assert!(!Arc::ptr_eq(&before.slots, &board.snapshot().slots));
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let board = SlotBoard::new();
        assert!(!board.mark_loading("9"));
        assert!(!board.complete("9", "x".to_string()));
        assert_eq!(board.snapshot().version, 0);
        assert_eq!(board.kind_of("9"), None);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let board = SlotBoard::new();
        let kept = board.subscribe();
        drop(board.subscribe());
        board.set_generating(true);
        board.set_generating(false);
        let versions: Vec<u64> = kept.try_iter().map(|snapshot| snapshot.version).collect();
        assert_eq!(versions, vec![1, 2]);
    }
}
