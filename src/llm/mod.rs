//! Large Language Model Integration
//!
//! ドラフト生成・リライト・修正プロバイダーが共通で使うチャットLLMクライアント

pub mod openai;

pub use openai::OpenAiClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// LLMレスポンス
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// 生成されたテキスト
    pub content: String,
    /// 使用トークン数
    pub tokens_used: usize,
    /// レスポンス時間（ミリ秒）
    pub response_time_ms: u64,
    /// モデル名
    pub model: String,
    /// 完了理由
    pub finish_reason: Option<String>,
}

impl LlmResponse {
    /// 出力上限で打ち切られたか
    pub fn was_cut_off(&self) -> bool {
        matches!(self.finish_reason.as_deref(), Some("length") | Some("max_tokens"))
    }
}

/// リクエストごとの生成パラメータ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    pub max_tokens: usize,
    /// 温度パラメータ（0.0-2.0）
    pub temperature: f32,
    /// JSONオブジェクト出力を要求
    pub json_output: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
            json_output: false,
        }
    }
}

impl ChatOptions {
    pub fn json(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            temperature: 0.7,
            json_output: true,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }
}

/// チャットLLMクライアント
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<LlmResponse>;

    /// 出力トークン数の見積もりに使うモデルの上限
    fn limits(&self) -> ModelLimits;
}

/// チャットメッセージ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// 役割（system, user, assistant）
    pub role: String,
    /// メッセージ内容
    pub content: String,
}

impl ChatMessage {
    /// システムメッセージ作成
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// ユーザーメッセージ作成
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// モデルのトークン上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    pub context_window: usize,
    pub max_output_tokens: usize,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            context_window: 8192,
            max_output_tokens: 4096,
        }
    }
}

impl ModelLimits {
    /// 語数からおおよその出力トークン数を見積もる（HTMLタグ込み）
    ///
    /// モデルの出力上限を超えない。
    pub fn output_budget(&self, words: usize) -> usize {
        words
            .saturating_mul(2)
            .saturating_add(1500)
            .clamp(2000, 16_000)
            .min(self.max_output_tokens)
    }
}

/// LLM出力からJSONオブジェクト部分を取り出す（コードフェンス・前置きを除去）
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

/// LLM出力からHTML本文を取り出す（```html フェンスを除去）
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_budget_respects_model_limit() {
        let small = ModelLimits::default();
        assert_eq!(small.output_budget(100), 2000);
        assert_eq!(small.output_budget(1800), 4096);

        let large = ModelLimits {
            context_window: 128_000,
            max_output_tokens: 16_384,
        };
        assert_eq!(large.output_budget(1800), 5100);
        assert_eq!(large.output_budget(20_000), 16_000);
        assert_eq!(large.output_budget(usize::MAX), 16_000);
    }

    #[test]
    fn test_chat_options_temperature_bounds() {
        let options = ChatOptions::default().with_temperature(3.5);
        assert_eq!(options.temperature, 2.0);
        assert!(ChatOptions::json(1000).json_output);
    }

    #[test]
    fn test_extract_json_object() {
        let raw = "Here you go:\n```json\n{\"title\": \"MBA\"}\n```";
        assert_eq!(extract_json_object(raw), Some("{\"title\": \"MBA\"}"));
        assert_eq!(extract_json_object("no json"), None);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```html\n<p>Hi.</p>\n```"), "<p>Hi.</p>");
        assert_eq!(strip_code_fence("  <p>Hi.</p> "), "<p>Hi.</p>");
    }

    #[test]
    fn test_cut_off_detection() {
        let response = LlmResponse {
            content: String::new(),
            tokens_used: 10,
            response_time_ms: 5,
            model: "gpt-4o".to_string(),
            finish_reason: Some("length".to_string()),
        };
        assert!(response.was_cut_off());
    }
}
