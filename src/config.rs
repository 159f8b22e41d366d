//! パイプライン設定
//!
//! デフォルト値 → 設定ファイル → 環境変数 の順に重ねて読み込む。
//!
//! 設定ファイルは `article-forge.toml` または `config/article-forge.toml`。
//! 環境変数は `FORGE_` 接頭辞で、階層は `__` で区切る
//! (例: `FORGE_HUMANIZER__TARGET_SCORE=90`, `FORGE_OPENAI__API_KEY=...`)。

use crate::content::humanizer::HumanizerConfig;
use crate::content::linker::LinkerConfig;
use crate::content::monetization::MonetizationConfig;
use crate::content::risk::{AutoPublishGate, RiskThresholds};
use crate::error::{Error, Result};
use crate::logging::LogConfig;
use crate::retry::CallPolicy;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const CONFIG_FILES: [&str; 2] = ["article-forge", "config/article-forge"];

/// サイト設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// 内部リンク判定に使うドメイン
    pub domain: String,
    /// ルール設定に追加する構造パス接頭辞
    pub structural_link_prefixes: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            domain: "example.edu".to_string(),
            structural_link_prefixes: Vec::new(),
        }
    }
}

/// キャッシュ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// ルール設定・教育機関リストのTTL（秒）
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 300 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// 生成キュー設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// ワーカー数
    pub workers: usize,
    /// 1分あたりのジョブ開始数の上限
    pub jobs_per_minute: u32,
    /// 待機できるジョブ数
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            jobs_per_minute: 30,
            capacity: 64,
        }
    }
}

/// OpenAI互換APIの設定
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiSettings {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

impl fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// リライトAPIの設定
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteApiSettings {
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub readability: Option<String>,
}

impl fmt::Debug for RewriteApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewriteApiSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("readability", &self.readability)
            .finish()
    }
}

/// パイプライン全体の設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub site: SiteConfig,
    pub humanizer: HumanizerConfig,
    pub linker: LinkerConfig,
    pub monetization: MonetizationConfig,
    /// 外部プロバイダー呼び出しのタイムアウト・リトライ
    pub provider_calls: CallPolicy,
    pub auto_publish: AutoPublishGate,
    pub risk: RiskThresholds,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub logging: LogConfig,
    pub openai: Option<OpenAiSettings>,
    pub rewrite_api: Option<RewriteApiSettings>,
}

impl PipelineConfig {
    /// 設定を読み込む
    ///
    /// 読み込みや検証に失敗した場合は警告を出してデフォルト設定を使う。
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load configuration, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// 標準の場所の設定ファイルと環境変数から読み込む
    pub fn try_load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        for path in CONFIG_FILES {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix("FORGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        info!("Configuration loaded (site {})", config.site.domain);
        Ok(config)
    }

    /// 指定ファイルから読み込む（環境変数は使わない）
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 値の整合性を検証
    pub fn validate(&self) -> Result<()> {
        fn invalid(message: impl Into<String>) -> Result<()> {
            Err(Error::InvalidConfiguration(message.into()))
        }

        if self.site.domain.trim().is_empty() {
            return invalid("site.domain must not be empty");
        }

        let h = &self.humanizer;
        if h.min_chunk_words == 0 || h.min_chunk_words > h.max_chunk_words {
            return invalid(format!(
                "humanizer chunk bounds are inconsistent ({}..{})",
                h.min_chunk_words, h.max_chunk_words
            ));
        }
        if h.max_iterations == 0 {
            return invalid("humanizer.max_iterations must be at least 1");
        }
        if h.target_score > 100 {
            return invalid("humanizer.target_score must be within 0-100");
        }

        if self.linker.jitter < 0.0 || !self.linker.jitter.is_finite() {
            return invalid("linker.jitter must be a non-negative number");
        }

        if self.monetization.programs_per_slot == 0 {
            return invalid("monetization.programs_per_slot must be at least 1");
        }

        let calls = &self.provider_calls;
        if calls.timeout_seconds == 0 {
            return invalid("provider_calls.timeout_seconds must be at least 1");
        }
        if calls.max_attempts == 0 {
            return invalid("provider_calls.max_attempts must be at least 1");
        }
        if calls.multiplier < 1.0 {
            return invalid("provider_calls.multiplier must be >= 1.0");
        }

        if self.risk.medium_risk_score >= self.risk.high_risk_score {
            return invalid("risk.medium_risk_score must be below risk.high_risk_score");
        }
        if self.risk.quality_high_risk_below > self.risk.quality_medium_risk_below {
            return invalid(
                "risk.quality_high_risk_below must not exceed risk.quality_medium_risk_below",
            );
        }

        if self.auto_publish.min_quality_score > 100 || self.auto_publish.delay_hours < 0 {
            return invalid("auto_publish gate values are out of range");
        }

        if self.cache.ttl_seconds == 0 {
            return invalid("cache.ttl_seconds must be at least 1");
        }

        if self.queue.workers == 0 || self.queue.jobs_per_minute == 0 || self.queue.capacity == 0
        {
            return invalid("queue.workers, queue.jobs_per_minute and queue.capacity must be positive");
        }

        if let Some(openai) = &self.openai {
            if openai.api_key.trim().is_empty() {
                return invalid("openai.api_key must not be empty");
            }
        }
        if let Some(api) = &self.rewrite_api {
            if url::Url::parse(&api.base_url).is_err() {
                return invalid(format!("rewrite_api.base_url is not a URL: {}", api.base_url));
            }
        }

        Ok(())
    }

    /// サンプル設定ファイルの内容を生成
    pub fn sample_config() -> Result<String> {
        let sample = Self {
            site: SiteConfig {
                domain: "your-site.edu".to_string(),
                structural_link_prefixes: vec!["/programs/".to_string()],
            },
            openai: Some(OpenAiSettings {
                api_key: "sk-your-api-key".to_string(),
                model: default_model(),
                base_url: None,
                timeout_seconds: default_llm_timeout(),
            }),
            rewrite_api: Some(RewriteApiSettings {
                base_url: "https://rewrite.example.com/api".to_string(),
                api_key: "your-rewrite-api-key".to_string(),
                readability: Some("University".to_string()),
            }),
            ..Self::default()
        };

        let body = toml::to_string_pretty(&sample)
            .map_err(|e| Error::Config(format!("failed to render sample config: {}", e)))?;

        Ok(format!(
            r#"# article-forge configuration
#
# article-forge.toml として保存する
# 環境変数での上書きも可能 (例: FORGE_HUMANIZER__TARGET_SCORE=90)
#
# [humanizer] score_polarity:
#   higher_is_human      = スコアが高いほど人間らしい（既定）
#   higher_is_detectable = スコアが高いほどAI生成と判定されやすい

{}"#,
            body
        ))
    }

    /// サンプル設定ファイルを書き出す
    pub fn generate_sample_config(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, Self::sample_config()?)?;
        info!("Sample configuration written to {}", path.display());
        Ok(())
    }
}
