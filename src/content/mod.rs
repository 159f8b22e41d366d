//! Content stages
//!
//! 記事本文に対する各ステージ（生成・検証・リライト・リンク・収益化・採点・修正・リスク判定）

pub mod autofix;
pub mod draft;
pub mod humanizer;
pub mod linker;
pub mod monetization;
pub mod quality;
pub mod risk;
pub mod validator;

pub use autofix::{AutoFixLoop, AutoFixOutcome, AutoFixTermination};
pub use draft::{DraftGenerator, DraftOutcome, DraftState};
pub use humanizer::{
    CircuitBreaker, HumanizeOptions, HumanizeOutcome, Humanizer, HumanizerConfig, ScorePolarity,
};
pub use linker::{InternalLinker, LinkerConfig, LinkingOutcome};
pub use monetization::{
    CategoryMatch, MonetizationConfig, MonetizationContext, MonetizationEngine, MonetizationPlan,
    SponsorshipTaxonomy,
};
pub use quality::{QualityScorer, QualityThresholds};
pub use risk::{AuthorStatus, AutoPublishGate, RiskAssessor, RiskThresholds};
pub use validator::{CheckSet, ContentValidator, ValidationOptions};
