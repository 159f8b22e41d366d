//! Provider Call Policy
//!
//! 外部プロバイダー呼び出しのタイムアウトと有限回リトライ（指数バックオフ）

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

/// 呼び出しポリシー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallPolicy {
    /// 1回あたりのタイムアウト（秒）
    pub timeout_seconds: u64,
    /// 最大試行回数（1 = リトライなし）
    pub max_attempts: u32,
    /// 初回バックオフ（ミリ秒）
    pub initial_backoff_ms: u64,
    /// 最大バックオフ（ミリ秒）
    pub max_backoff_ms: u64,
    /// バックオフ倍率
    pub multiplier: f64,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout_seconds: 120,
            max_attempts: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl CallPolicy {
    /// リトライなしのポリシー
    pub fn single_attempt(timeout_seconds: u64) -> Self {
        Self {
            timeout_seconds,
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.initial_backoff_ms = initial_ms;
        self.max_backoff_ms = max_ms;
        self
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// リトライ可能な呼び出しを実行
    pub async fn call<F, Fut, T>(&self, provider: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = Duration::from_millis(self.initial_backoff_ms);
        let max_delay = Duration::from_millis(self.max_backoff_ms);

        for attempt in 1..=max_attempts {
            let outcome = match timeout(self.timeout(), operation()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    provider: provider.to_string(),
                    seconds: self.timeout_seconds,
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    warn!(
                        "{} call failed (attempt {}/{}): {}",
                        provider, attempt, max_attempts, e
                    );
                    info!("Retrying {} after {:?}", provider, delay);
                    sleep(delay).await;
                    delay = Duration::from_millis(
                        ((delay.as_millis() as f64) * self.multiplier) as u64,
                    )
                    .min(max_delay);
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Internal(format!(
            "{}: all retry attempts failed",
            provider
        )))
    }
}
