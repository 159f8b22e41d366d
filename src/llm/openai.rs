//! OpenAI API Integration
//!
//! OpenAI互換のチャット完了APIクライアント

use super::{ChatMessage, ChatOptions, LlmClient, LlmResponse, ModelLimits};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// OpenAI APIクライアント
#[derive(Debug)]
pub struct OpenAiClient {
    /// APIキー
    api_key: SecretString,
    /// モデル名
    model: String,
    /// HTTPクライアント
    client: Client,
    /// APIベースURL
    base_url: String,
}

impl OpenAiClient {
    /// 新しいOpenAIクライアントを作成
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(api_key, model, Duration::from_secs(120))
    }

    /// HTTPタイムアウトを指定して作成
    pub fn with_timeout(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            api_key: SecretString::from(api_key.into()),
            model: model.into(),
            client,
            base_url: "https://api.openai.com/v1".to_string(),
        })
    }

    /// ビルダーパターン: カスタムベースURL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, messages: &[ChatMessage], options: &ChatOptions) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            max_tokens: Some(options.max_tokens),
            temperature: Some(options.temperature),
            n: Some(1),
            response_format: options.json_output.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<LlmResponse> {
        let start_time = Instant::now();
        let request = self.build_request(messages, options);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                "openai",
                format!("API error ({}): {}", status, error_text),
            ));
        }

        let api_response: ChatCompletionResponse = response.json().await?;
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::provider("openai", "No choices in response"))?;

        Ok(LlmResponse {
            content: choice.message.content,
            tokens_used: api_response.usage.map(|u| u.total_tokens).unwrap_or(0),
            response_time_ms: start_time.elapsed().as_millis() as u64,
            model: api_response.model,
            finish_reason: choice.finish_reason,
        })
    }

    fn limits(&self) -> ModelLimits {
        let model = self.model.as_str();
        if model.starts_with("gpt-4o") || model.starts_with("gpt-4.1") {
            ModelLimits {
                context_window: 128_000,
                max_output_tokens: 16_384,
            }
        } else if model.starts_with("gpt-4-turbo") {
            ModelLimits {
                context_window: 128_000,
                max_output_tokens: 4096,
            }
        } else {
            ModelLimits::default()
        }
    }
}

/// チャット完了リクエスト
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

/// チャット完了レスポンス
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

/// 選択肢
#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

/// トークン使用量
#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: usize,
}
