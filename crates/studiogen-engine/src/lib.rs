pub mod board;
pub mod config;
pub mod encoder;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod retry;
pub mod session;

pub use board::{BoardSnapshot, SlotBoard};
pub use config::EngineConfig;
pub use error::{GenerationError, PipelineError, RemoteFailure};
pub use model::{DryrunModel, GeminiModel, ImageModel};
pub use pipeline::{Pipeline, RunReport, SlotOutcome};
pub use retry::{CancelFlag, Pause, RetryPolicy, ThreadPause};
pub use session::PipelineSession;
