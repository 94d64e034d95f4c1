use std::sync::Arc;
use std::time::Duration;

use studiogen_contracts::events::{EventWriter, PipelineEvent};
use studiogen_contracts::product::{ProductAttributes, ReferenceImage};
use studiogen_contracts::prompts::build_prompt;
use studiogen_contracts::tasks::TaskKind;

use crate::board::SlotBoard;
use crate::config::EngineConfig;
use crate::encoder::encode_all;
use crate::error::{GenerationError, PipelineError};
use crate::model::ImageModel;
use crate::retry::{generate_with_retry, CancelFlag, Pause, RetryPolicy, ThreadPause};

pub const GENERATE_ALL_FAILURE: &str = "Generation failed. Rate limit likely exceeded.";
pub const REGENERATE_FAILURE: &str = "Retry failed.";
pub const CANCELLED_MESSAGE: &str = "Generation cancelled.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    Skipped,
    Succeeded,
    Failed,
}

/// Drives the five renderings against the model, one at a time, and records
/// every state change on the shared [`SlotBoard`].
pub struct Pipeline {
    model: Arc<dyn ImageModel>,
    board: Arc<SlotBoard>,
    retry: RetryPolicy,
    pacing: Duration,
    pause: Arc<dyn Pause>,
    cancel: CancelFlag,
    events: Option<EventWriter>,
}

impl Pipeline {
    pub fn new(model: Arc<dyn ImageModel>, config: &EngineConfig) -> Self {
        Self {
            model,
            board: Arc::new(SlotBoard::new()),
            retry: config.retry,
            pacing: config.pacing,
            pause: Arc::new(ThreadPause),
            cancel: CancelFlag::new(),
            events: None,
        }
    }

    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn board(&self) -> Arc<SlotBoard> {
        Arc::clone(&self.board)
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Renders every slot in declared order.
    ///
    /// A slot's failure never stops the run. After each slot, successful or
    /// not, the pipeline waits the pacing delay before starting the next one,
    /// including after the last slot. With no reference images this is a
    /// no-op.
    ///
    /// A cancel raised before the run starts still applies: every slot is
    /// marked cancelled without calling the model. The flag is cleared when
    /// the run ends.
    pub fn generate_all(
        &self,
        images: &[ReferenceImage],
        attributes: &ProductAttributes,
    ) -> RunReport {
        let mut report = RunReport::default();
        if images.is_empty() {
            return report;
        }

        self.board.set_generating(true);
        self.emit(PipelineEvent::GenerationStarted {
            model: self.model.name().to_string(),
            images: images.len(),
        });
        self.board.mark_all_loading();

        let order: Vec<(String, TaskKind)> = self
            .board
            .snapshot()
            .slots
            .iter()
            .map(|slot| (slot.id.clone(), slot.kind))
            .collect();

        for (idx, (id, kind)) in order.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.abandon(&order[idx..]);
                report.cancelled = true;
                break;
            }

            report.attempted += 1;
            self.emit(PipelineEvent::SlotStarted {
                slot_id: id.clone(),
                kind: kind.label().to_string(),
            });
            match self.render_slot(id, *kind, images, attributes, &self.cancel) {
                Ok(url) => {
                    self.board.complete(id, url);
                    report.succeeded += 1;
                    self.emit(PipelineEvent::SlotSucceeded {
                        slot_id: id.clone(),
                        kind: kind.label().to_string(),
                    });
                }
                Err(GenerationError::Cancelled) => {
                    self.board.fail(id, CANCELLED_MESSAGE);
                    self.abandon(&order[idx + 1..]);
                    report.cancelled = true;
                    break;
                }
                Err(err) => {
                    self.board.fail(id, GENERATE_ALL_FAILURE);
                    report.failed += 1;
                    self.emit(PipelineEvent::SlotFailed {
                        slot_id: id.clone(),
                        kind: kind.label().to_string(),
                        error: err.kind().to_string(),
                        message: err.to_string(),
                    });
                }
            }

            if self.cancel.is_cancelled() {
                self.abandon(&order[idx + 1..]);
                report.cancelled = true;
                break;
            }
            self.emit(PipelineEvent::PacingWait {
                slot_id: id.clone(),
                delay_ms: millis(self.pacing),
            });
            self.pause.pause(self.pacing);
        }

        self.board.set_generating(false);
        self.cancel.reset();
        if report.cancelled {
            self.emit(PipelineEvent::GenerationCancelled {
                attempted: report.attempted,
            });
        }
        self.emit(PipelineEvent::GenerationFinished {
            succeeded: report.succeeded,
            failed: report.failed,
            cancelled: report.cancelled,
        });
        report
    }

    /// Renders a single slot again. Sibling slots and the generating flag are
    /// left alone and no pacing delay is applied.
    pub fn regenerate(
        &self,
        id: &str,
        images: &[ReferenceImage],
        attributes: &ProductAttributes,
    ) -> Result<SlotOutcome, PipelineError> {
        let Some(kind) = self.board.kind_of(id) else {
            return Err(PipelineError::UnknownSlot(id.to_string()));
        };
        if images.is_empty() {
            return Ok(SlotOutcome::Skipped);
        }

        self.board.mark_loading(id);
        self.emit(PipelineEvent::RegenerateStarted {
            slot_id: id.to_string(),
            kind: kind.label().to_string(),
        });
        // Independent of any generate_all cancellation.
        let cancel = CancelFlag::new();
        let outcome = match self.render_slot(id, kind, images, attributes, &cancel) {
            Ok(url) => {
                self.board.complete(id, url);
                self.emit(PipelineEvent::RegenerateFinished {
                    slot_id: id.to_string(),
                    succeeded: true,
                    error: None,
                    message: None,
                });
                SlotOutcome::Succeeded
            }
            Err(err) => {
                self.board.fail(id, REGENERATE_FAILURE);
                self.emit(PipelineEvent::RegenerateFinished {
                    slot_id: id.to_string(),
                    succeeded: false,
                    error: Some(err.kind().to_string()),
                    message: Some(err.to_string()),
                });
                SlotOutcome::Failed
            }
        };
        Ok(outcome)
    }

    fn render_slot(
        &self,
        id: &str,
        kind: TaskKind,
        images: &[ReferenceImage],
        attributes: &ProductAttributes,
        cancel: &CancelFlag,
    ) -> Result<String, GenerationError> {
        let parts = encode_all(images)?;
        let prompt = build_prompt(kind, attributes);
        generate_with_retry(
            self.model.as_ref(),
            &parts,
            &prompt,
            &self.retry,
            self.pause.as_ref(),
            cancel,
            |notice| {
                self.emit(PipelineEvent::SlotRetry {
                    slot_id: id.to_string(),
                    attempt: notice.attempt + 1,
                    max_retries: notice.max_retries,
                    delay_ms: millis(notice.delay),
                    error: notice.error.kind().to_string(),
                    message: notice.error.to_string(),
                });
            },
        )
    }

    fn abandon(&self, remaining: &[(String, TaskKind)]) {
        for (id, _) in remaining {
            self.board.fail(id, CANCELLED_MESSAGE);
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            // The event log is best effort; slot state is the source of truth.
            let _ = events.record(&event);
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
