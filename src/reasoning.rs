//! Reasoning Log
//!
//! パイプラインの各ステージで下した判断の監査ログ（1回の実行中は追記のみ）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ステージごとの判断記録
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDecision {
    /// ステージ名
    pub stage: String,
    /// 判断内容
    pub decision: String,
    /// 判断に使った入力
    pub inputs: Value,
    /// 根拠
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
}

/// 判断ログ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningLog {
    stages: Vec<StageDecision>,
    warnings: Vec<String>,
    data_sources: Vec<String>,
}

impl ReasoningLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// ステージの判断を記録
    pub fn record(
        &mut self,
        stage: impl Into<String>,
        decision: impl Into<String>,
        inputs: Value,
        rationale: impl Into<String>,
    ) {
        self.stages.push(StageDecision {
            stage: stage.into(),
            decision: decision.into(),
            inputs,
            rationale: rationale.into(),
            timestamp: Utc::now(),
        });
    }

    /// 警告を追加
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// データソースを追加（重複は無視）
    pub fn add_source(&mut self, source: impl Into<String>) {
        let source = source.into();
        if !self.data_sources.contains(&source) {
            self.data_sources.push(source);
        }
    }

    /// 指定ステージの最新の判断
    pub fn get(&self, stage: &str) -> Option<&StageDecision> {
        self.stages.iter().rev().find(|entry| entry.stage == stage)
    }

    pub fn stages(&self) -> &[StageDecision] {
        &self.stages
    }

    /// 記録順のステージ名
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|entry| entry.stage.as_str()).collect()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }
}
