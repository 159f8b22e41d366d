//! # article-forge
//!
//! Multi-stage marketing article generation pipeline.
//!
//! An idea goes through draft generation, heuristic validation, humanization, internal-link
//! insertion, monetization-slot insertion, quality scoring with bounded auto-fix and risk
//! classification. The result is an [`Article`] record carrying its reasoning log, ready for an
//! external persistence or publishing layer.

pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod html;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod providers;
pub mod reasoning;
pub mod retry;
pub mod rules;
pub mod types;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::{
    GenerationOutcome, GenerationQueue, GenerationRequest, PipelineBuilder, PipelineOrchestrator,
};
pub use reasoning::ReasoningLog;
pub use types::{Article, ArticleStatus, ContentIdea, ContentType, GenerationOptions, RiskLevel};
