//! ログ初期化
//!
//! tracing-subscriber（EnvFilter）でコンソール・ファイル出力を構成する。
//! ファイル出力は tracing-appender のローテーション付きノンブロッキングライターを使い、
//! 返される `WorkerGuard` は呼び出し側が保持する。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// ログファイル名の接頭辞
const LOG_FILE_PREFIX: &str = "article-forge.log";

/// ログ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// ログレベルまたはフィルター式 (例: "info", "article_forge=debug")
    pub level: String,
    /// 出力形式
    pub format: LogFormat,
    /// コンソール出力有効
    pub console_enabled: bool,
    /// ファイル出力有効
    pub file_enabled: bool,
    /// ログディレクトリ
    pub log_dir: PathBuf,
    /// ファイルローテーション設定
    pub rotation: LogRotation,
    /// ログ保持ポリシー
    pub retention: LogRetention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// 人間向けテキスト
    #[default]
    Text,
    /// 構造化JSON
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    /// 日次ローテーション
    #[default]
    Daily,
    /// 時間毎ローテーション
    Hourly,
    /// ローテーションなし
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRetention {
    /// アプリケーションは削除しない（OS/ログ管理ツール任せ）
    #[default]
    External,
    /// 指定日数後に自動削除
    Days(u32),
    /// 最大ファイル数を保持
    Count(u32),
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            console_enabled: true,
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            rotation: LogRotation::Daily,
            retention: LogRetention::External,
        }
    }
}

impl LogConfig {
    /// カスタムログディレクトリを設定（ファイル出力も有効にする）
    pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = dir.into();
        self.file_enabled = true;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_retention(mut self, retention: LogRetention) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }

    /// `RUST_LOG` があればそれを優先したフィルター
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// ログシステムを初期化
///
/// ファイル出力が有効な場合はフラッシュ用のガードを返す。ガードを破棄すると
/// ファイルへの書き込みが止まる。
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let (file_writer, guard) = if config.file_enabled {
        ensure_log_dir(&config.log_dir)?;
        let appender = match config.rotation {
            LogRotation::Daily => rolling::daily(&config.log_dir, LOG_FILE_PREFIX),
            LogRotation::Hourly => rolling::hourly(&config.log_dir, LOG_FILE_PREFIX),
            LogRotation::Never => rolling::never(&config.log_dir, LOG_FILE_PREFIX),
        };
        let (writer, guard) = non_blocking(appender);
        (Some(writer), Some(guard))
    } else {
        (None, None)
    };

    let json = config.format == LogFormat::Json;

    let console_layer = config.console_enabled.then(|| {
        let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
        if json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    });

    let file_layer = file_writer.map(|writer| {
        let layer = fmt::layer().with_writer(writer).with_ansi(false);
        if json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    });

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("global tracing subscriber already set")?;

    tracing::info!(
        "Logging initialized (level {}, format {:?}, file {})",
        config.level,
        config.format,
        if config.file_enabled {
            config.log_dir.display().to_string()
        } else {
            "disabled".to_string()
        }
    );

    if config.file_enabled {
        if let Err(e) = apply_retention_policy(config) {
            tracing::warn!("Failed to apply log retention policy: {}", e);
        }
    }

    Ok(guard)
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    }
    Ok(())
}

/// ログ保持ポリシーを適用
pub fn apply_retention_policy(config: &LogConfig) -> Result<usize> {
    match config.retention {
        LogRetention::External => Ok(0),
        LogRetention::Days(days) => cleanup_old_logs_by_age(&config.log_dir, days),
        LogRetention::Count(max_count) => cleanup_old_logs_by_count(&config.log_dir, max_count),
    }
}

/// 日数ベースでログファイルを削除
fn cleanup_old_logs_by_age(log_dir: &Path, max_days: u32) -> Result<usize> {
    use std::time::{Duration, SystemTime};

    let cutoff = SystemTime::now() - Duration::from_secs(max_days as u64 * 24 * 60 * 60);
    let mut removed = 0;

    for (path, modified) in log_files(log_dir)? {
        if modified < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!("Removed old log file {}", path.display());
                }
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
    Ok(removed)
}

/// ファイル数ベースでログファイルを削除（新しいものから残す）
fn cleanup_old_logs_by_count(log_dir: &Path, max_count: u32) -> Result<usize> {
    let mut files = log_files(log_dir)?;
    files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in files.into_iter().skip(max_count as usize) {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

fn log_files(log_dir: &Path) -> Result<Vec<(PathBuf, std::time::SystemTime)>> {
    let mut files = Vec::new();
    if !log_dir.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !is_log_file(&path) {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            files.push((path, modified));
        }
    }
    Ok(files)
}

fn is_log_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX))
}

/// ログ統計情報
#[derive(Debug, Default)]
pub struct LogStats {
    pub file_count: usize,
    pub total_size: u64,
    pub last_modified: Option<std::time::SystemTime>,
}

/// ログ統計情報を取得
pub fn get_log_stats(log_dir: &Path) -> Result<LogStats> {
    let mut stats = LogStats::default();
    for (path, modified) in log_files(log_dir)? {
        stats.file_count += 1;
        stats.total_size += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if stats.last_modified.map_or(true, |t| modified > t) {
            stats.last_modified = Some(modified);
        }
    }
    Ok(stats)
}
