//! HTTP rewrite API
//!
//! チャンク単位でリライトし、AI検出スコアを返す外部APIのクライアント。
//! レスポンスの `howLikelyToBeDetected` は名前に反して実測では「高いほど人間らしい」
//! スコアとして振る舞うため、既定の `ScorePolarity::HigherIsHuman` のまま生値を渡す。
//! 契約が字義どおりと確認できた場合のみ `HigherIsDetectable` を設定する。

use super::{RewriteMode, RewriteOptions, RewriteProvider, RewriteResult};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "rewrite-api";

/// リライトAPIクライアント
#[derive(Debug)]
pub struct HttpRewriteProvider {
    client: Client,
    base_url: String,
    api_key: SecretString,
    /// 読みやすさの指定（例: "University"）
    readability: String,
}

impl HttpRewriteProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, api_key, Duration::from_secs(60))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key.into()),
            readability: "University".to_string(),
        })
    }

    pub fn with_readability(mut self, readability: impl Into<String>) -> Self {
        self.readability = readability.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request<'a>(&'a self, text: &'a str, options: &'a RewriteOptions) -> RewriteRequest<'a> {
        RewriteRequest {
            content: text,
            readability: &self.readability,
            tone: options.tone.as_deref(),
            title: options.title.as_deref(),
        }
    }
}

#[async_trait]
impl RewriteProvider for HttpRewriteProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn mode(&self) -> RewriteMode {
        RewriteMode::Chunked
    }

    async fn humanize(&self, text: &str, options: &RewriteOptions) -> Result<RewriteResult> {
        let response = self
            .client
            .post(format!("{}/rewrite", self.base_url))
            .header("apikey", self.api_key.expose_secret())
            .json(&self.build_request(text, options))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                PROVIDER,
                format!("API error ({}): {}", status, body),
            ));
        }

        let body: RewriteResponse = response.json().await?;
        body.into_result()
    }
}

#[derive(Debug, Serialize)]
struct RewriteRequest<'a> {
    content: &'a str,
    readability: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RewriteResponse {
    result: Option<String>,
    #[serde(rename = "howLikelyToBeDetected")]
    how_likely_to_be_detected: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

impl RewriteResponse {
    fn into_result(self) -> Result<RewriteResult> {
        if let Some(error) = self.error {
            return Err(Error::provider(PROVIDER, error));
        }
        let text = self
            .result
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| Error::provider(PROVIDER, "response had no rewritten text"))?;
        debug!(
            "Rewrite API returned {} chars, detection {:?}",
            text.len(),
            self.how_likely_to_be_detected
        );
        Ok(RewriteResult {
            text,
            naturalness_score: self.how_likely_to_be_detected,
        })
    }
}
