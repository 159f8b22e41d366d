//! Article generation pipeline
//!
//! 1記事分のステージ実行（`orchestrator`）と複数記事の並行処理（`queue`）

pub mod orchestrator;
pub mod queue;

pub use orchestrator::{GenerationOutcome, GenerationRequest, PipelineBuilder, PipelineOrchestrator};
pub use queue::{GenerationQueue, JobHandle};
