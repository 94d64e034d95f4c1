use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{anyhow, Context, Result};
use studiogen_contracts::product::{ProductAttributes, ReferenceImage};

use crate::board::{BoardSnapshot, SlotBoard};
use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::retry::CancelFlag;

/// Inputs captured at submit time.
#[derive(Debug, Clone)]
pub struct SessionJob {
    pub images: Vec<ReferenceImage>,
    pub attributes: ProductAttributes,
}

impl SessionJob {
    fn new(images: &[ReferenceImage], attributes: &ProductAttributes) -> Self {
        Self {
            images: images.to_vec(),
            attributes: attributes.clone(),
        }
    }
}

pub enum SessionCommand {
    GenerateAll(SessionJob),
    Regenerate { id: String, job: SessionJob },
    Stop,
}

/// Front door to a [`Pipeline`] running on its own worker thread.
///
/// Commands are processed one at a time in submission order, so a
/// regenerate queued behind a full run starts only after the run ends.
pub struct PipelineSession {
    board: Arc<SlotBoard>,
    cancel: CancelFlag,
    model_name: String,
    generate_pending: Arc<AtomicBool>,
    sender: Option<mpsc::Sender<SessionCommand>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PipelineSession {
    pub fn start(pipeline: Pipeline) -> Result<Self> {
        let board = pipeline.board();
        let cancel = pipeline.cancel_flag();
        let model_name = pipeline.model_name().to_string();
        let generate_pending = Arc::new(AtomicBool::new(false));

        let (tx, rx) = mpsc::channel();
        let worker = PipelineWorker {
            pipeline,
            generate_pending: Arc::clone(&generate_pending),
        };
        let handle = thread::Builder::new()
            .name("studiogen-pipeline".to_string())
            .spawn(move || worker.run(rx))
            .context("pipeline thread spawn failed")?;

        Ok(Self {
            board,
            cancel,
            model_name,
            generate_pending,
            sender: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn board(&self) -> Arc<SlotBoard> {
        Arc::clone(&self.board)
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.board.snapshot()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<BoardSnapshot> {
        self.board.subscribe()
    }

    /// True from an accepted `submit_generate_all` until that run finishes.
    pub fn is_busy(&self) -> bool {
        self.generate_pending.load(Ordering::SeqCst) || self.board.is_generating()
    }

    /// Queues a full run. Returns `Ok(false)` without queueing when there are
    /// no images or a run is already queued or in progress.
    pub fn submit_generate_all(
        &self,
        images: &[ReferenceImage],
        attributes: &ProductAttributes,
    ) -> Result<bool> {
        if images.is_empty() || self.board.is_generating() {
            return Ok(false);
        }
        if self.generate_pending.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        // Stale cancels must not reach the new run; cancels raised from here
        // on while it is queued do.
        self.cancel.reset();
        let sent = self.send(SessionCommand::GenerateAll(SessionJob::new(images, attributes)));
        if sent.is_err() {
            self.generate_pending.store(false, Ordering::SeqCst);
        }
        sent.map(|()| true)
    }

    /// Queues a single-slot run. Returns `Ok(false)` when there are no images
    /// or the slot is loading; an unknown id is an error.
    pub fn submit_regenerate(
        &self,
        id: &str,
        images: &[ReferenceImage],
        attributes: &ProductAttributes,
    ) -> Result<bool> {
        let snapshot = self.board.snapshot();
        let Some(slot) = snapshot.slot(id) else {
            return Err(PipelineError::UnknownSlot(id.to_string()).into());
        };
        if images.is_empty() || slot.loading {
            return Ok(false);
        }
        self.send(SessionCommand::Regenerate {
            id: id.to_string(),
            job: SessionJob::new(images, attributes),
        })?;
        Ok(true)
    }

    /// Asks the queued or running full run to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Lets queued commands finish, then joins the worker.
    pub fn stop(&mut self) {
        if let Some(tx) = self.sender.take() {
            let _ = tx.send(SessionCommand::Stop);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        let Some(tx) = self.sender.as_ref() else {
            return Err(anyhow!("Pipeline session is stopped."));
        };
        tx.send(command)
            .map_err(|_| anyhow!("Pipeline session is not running."))
    }
}

impl Drop for PipelineSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.stop();
    }
}

struct PipelineWorker {
    pipeline: Pipeline,
    generate_pending: Arc<AtomicBool>,
}

impl PipelineWorker {
    fn run(self, rx: mpsc::Receiver<SessionCommand>) {
        while let Ok(command) = rx.recv() {
            match command {
                SessionCommand::GenerateAll(job) => {
                    self.pipeline.generate_all(&job.images, &job.attributes);
                    self.generate_pending.store(false, Ordering::SeqCst);
                }
                SessionCommand::Regenerate { id, job } => {
                    // Ids are checked at submit time and slots never go away.
                    let _ = self.pipeline.regenerate(&id, &job.images, &job.attributes);
                }
                SessionCommand::Stop => break,
            }
        }
    }
}
