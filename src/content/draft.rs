//! Draft Generator
//!
//! ドラフト生成プロバイダーを呼び出し、ブロッキング検証（途中切れ・プレースホルダー）を行う。
//! ブロックされた場合は目標語数を増やして1回だけ再生成する。

use super::validator::{ContentValidator, ValidationOptions};
use crate::error::{Error, Result};
use crate::providers::{DraftContext, DraftProvider, DraftRequest};
use crate::retry::CallPolicy;
use crate::rules::RulesConfig;
use crate::types::{ArticleDraft, ContentIdea, GenerationOptions, ValidationIssue, ValidationResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 再生成時に追加する目標語数
pub const RETRY_WORD_BUMP: usize = 200;

/// ドラフト生成の状態
#[derive(Debug, Clone)]
pub enum DraftState {
    /// 生成待ち
    Pending { attempt: u32, target_word_count: usize },
    /// 検証を通過
    Success {
        draft: ArticleDraft,
        attempt: u32,
        validation: ValidationResult,
    },
    /// 検証でブロック
    Blocked {
        attempt: u32,
        target_word_count: usize,
        issues: Vec<ValidationIssue>,
    },
    /// 再試行を使い切った
    ExhaustedRetries { issues: Vec<ValidationIssue> },
}

/// ドラフト生成結果
#[derive(Debug, Clone)]
pub struct DraftOutcome {
    pub draft: ArticleDraft,
    /// 成功までの試行回数
    pub attempts: u32,
    /// 通過したブロッキング検証の結果
    pub validation: ValidationResult,
}

/// ドラフト生成器
pub struct DraftGenerator {
    provider: Arc<dyn DraftProvider>,
    validator: Arc<ContentValidator>,
    policy: CallPolicy,
    max_attempts: u32,
}

impl DraftGenerator {
    pub fn new(
        provider: Arc<dyn DraftProvider>,
        validator: Arc<ContentValidator>,
        policy: CallPolicy,
    ) -> Self {
        Self {
            provider,
            validator,
            policy,
            max_attempts: 2,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// ドラフトを生成
    ///
    /// 再生成後もブロックされた場合は `Error::DraftValidationFailed`。
    pub async fn generate(
        &self,
        idea: &ContentIdea,
        options: &GenerationOptions,
        context: &DraftContext,
        rules: Arc<RulesConfig>,
    ) -> Result<DraftOutcome> {
        let mut state = DraftState::Pending {
            attempt: 1,
            target_word_count: options.target_word_count,
        };

        loop {
            state = match state {
                DraftState::Pending {
                    attempt,
                    target_word_count,
                } => {
                    info!(
                        "Generating draft for \"{}\" (attempt {}, target {} words)",
                        idea.title, attempt, target_word_count
                    );
                    let request = DraftRequest {
                        idea: idea.clone(),
                        content_type: options.content_type,
                        target_word_count,
                        context: context.clone(),
                        attempt,
                    };
                    let draft = self
                        .policy
                        .call(self.provider.name(), || self.provider.generate_draft(&request))
                        .await?;
                    let draft = normalize_draft(draft, idea);

                    let validation = self
                        .validator
                        .validate(
                            &draft.content,
                            &ValidationOptions::blocking(&draft.faqs, Arc::clone(&rules)),
                        )
                        .await;

                    if validation.is_blocked {
                        DraftState::Blocked {
                            attempt,
                            target_word_count,
                            issues: validation.blocking_issues,
                        }
                    } else {
                        DraftState::Success {
                            draft,
                            attempt,
                            validation,
                        }
                    }
                }
                DraftState::Blocked {
                    attempt,
                    target_word_count,
                    issues,
                } => {
                    let kinds: Vec<&str> = issues.iter().map(|i| i.issue_type.as_str()).collect();
                    if attempt < self.max_attempts {
                        warn!(
                            "Draft attempt {} blocked ({:?}), regenerating with {} more words",
                            attempt, kinds, RETRY_WORD_BUMP
                        );
                        DraftState::Pending {
                            attempt: attempt + 1,
                            target_word_count: target_word_count.saturating_add(RETRY_WORD_BUMP),
                        }
                    } else {
                        warn!("Draft attempt {} blocked ({:?}), giving up", attempt, kinds);
                        DraftState::ExhaustedRetries { issues }
                    }
                }
                DraftState::Success {
                    draft,
                    attempt,
                    validation,
                } => {
                    debug!(
                        "Draft accepted after {} attempt(s), {} words",
                        attempt, validation.metrics.word_count
                    );
                    return Ok(DraftOutcome {
                        draft,
                        attempts: attempt,
                        validation,
                    });
                }
                DraftState::ExhaustedRetries { issues } => {
                    return Err(Error::DraftValidationFailed { issues });
                }
            };
        }
    }
}

/// 欠けているメタ情報をアイデアから補う
fn normalize_draft(mut draft: ArticleDraft, idea: &ContentIdea) -> ArticleDraft {
    if draft.title.trim().is_empty() {
        draft.title = idea.title.clone();
    }
    if draft.meta_title.trim().is_empty() {
        draft.meta_title = draft.title.clone();
    }
    if draft.focus_keyword.trim().is_empty() {
        draft.focus_keyword = idea.primary_keyword();
    }
    draft.content = draft.content.trim().to_string();
    draft
}
