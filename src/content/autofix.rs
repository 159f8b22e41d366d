//! Auto-Fix Loop
//!
//! 品質スコアの問題を修正プロバイダーで反復修正する。試行回数は有限で、
//! スコアが改善しなければ修正前の内容を保持して終了する。

use super::quality::QualityScorer;
use crate::error::Result;
use crate::providers::RepairProvider;
use crate::retry::CallPolicy;
use crate::types::{Faq, QualityMetrics};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 自動修正の終了状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoFixTermination {
    /// 問題がすべて解消した
    Resolved,
    /// 修正してもスコアが上がらなかった
    NotImproving,
    /// 試行回数の上限に達した
    ExhaustedAttempts,
}

/// 自動修正の結果
#[derive(Debug, Clone)]
pub struct AutoFixOutcome {
    /// 最終的に採用した本文
    pub content: String,
    /// 採用した本文の品質メトリクス
    pub metrics: QualityMetrics,
    /// 修正プロバイダーの呼び出し回数
    pub attempts: u32,
    /// 修正前の初期スコア
    pub initial_score: u8,
    pub termination: AutoFixTermination,
    /// 未解消の問題種別（解消時は空）
    pub risk_flags: Vec<String>,
}

impl AutoFixOutcome {
    pub fn improved(&self) -> bool {
        self.metrics.score > self.initial_score
    }
}

/// 自動修正ループ
pub struct AutoFixLoop {
    repair: Arc<dyn RepairProvider>,
    scorer: QualityScorer,
    policy: CallPolicy,
}

impl AutoFixLoop {
    pub fn new(repair: Arc<dyn RepairProvider>, scorer: QualityScorer, policy: CallPolicy) -> Self {
        Self {
            repair,
            scorer,
            policy,
        }
    }

    pub fn scorer(&self) -> &QualityScorer {
        &self.scorer
    }

    /// 採点だけ行う（修正しない）
    pub fn score_only(&self, content: &str, faqs: &[Faq]) -> AutoFixOutcome {
        let metrics = self.scorer.score(content, faqs);
        let risk_flags = metrics.issue_types();
        AutoFixOutcome {
            content: content.to_string(),
            initial_score: metrics.score,
            termination: if metrics.issues.is_empty() {
                AutoFixTermination::Resolved
            } else {
                AutoFixTermination::ExhaustedAttempts
            },
            metrics,
            attempts: 0,
            risk_flags,
        }
    }

    /// 修正ループを実行
    ///
    /// 修正プロバイダーのエラーはそのまま返す。
    pub async fn run(
        &self,
        content: String,
        faqs: &[Faq],
        max_attempts: u32,
    ) -> Result<AutoFixOutcome> {
        let mut current = content;
        let mut metrics = self.scorer.score(&current, faqs);
        let initial_score = metrics.score;
        let mut attempts = 0u32;

        let termination = loop {
            if metrics.issues.is_empty() {
                break AutoFixTermination::Resolved;
            }
            if attempts >= max_attempts {
                break AutoFixTermination::ExhaustedAttempts;
            }
            attempts += 1;

            debug!(
                "Auto-fix attempt {}/{}: score {}, issues {:?}",
                attempts,
                max_attempts,
                metrics.score,
                metrics.issue_types()
            );

            let issues = metrics.issues.clone();
            let source = current.as_str();
            let repaired = self
                .policy
                .call(self.repair.name(), || self.repair.fix(source, &issues))
                .await?;
            let repaired_metrics = self.scorer.score(&repaired, faqs);

            if repaired_metrics.score <= metrics.score {
                warn!(
                    "Auto-fix attempt {} did not improve score ({} -> {}), keeping previous content",
                    attempts, metrics.score, repaired_metrics.score
                );
                break AutoFixTermination::NotImproving;
            }

            info!(
                "Auto-fix attempt {} improved score {} -> {}",
                attempts, metrics.score, repaired_metrics.score
            );
            current = repaired;
            metrics = repaired_metrics;
        };

        let risk_flags = match termination {
            AutoFixTermination::Resolved => Vec::new(),
            _ => metrics.issue_types(),
        };

        Ok(AutoFixOutcome {
            content: current,
            metrics,
            attempts,
            initial_score,
            termination,
            risk_flags,
        })
    }
}
