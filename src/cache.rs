//! TTL Snapshot Cache
//!
//! 読み取り中心の共有データ（コンテンツルール設定・既知の教育機関リスト）用キャッシュ。
//! 更新はスナップショット全体の差し替えで行い、読み手が更新途中の状態を見ることはない。

use crate::error::Result;
use crate::providers::{InstitutionLookup, RulesConfigStore};
use crate::rules::RulesConfig;
use crate::types::KnownInstitution;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// デフォルトTTL（5分）
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// キャッシュされた値とその有効期限
#[derive(Debug)]
pub struct Snapshot<T> {
    pub value: Arc<T>,
    pub loaded_at: Instant,
    pub expires_at: Instant,
}

impl<T> Snapshot<T> {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// TTL付きスナップショットキャッシュ
#[derive(Debug)]
pub struct TtlCache<T> {
    current: RwLock<Option<Arc<Snapshot<T>>>>,
    ttl: Duration,
}

impl<T> TtlCache<T> {
    /// 新規キャッシュを作成
    pub fn new(ttl: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 現在のスナップショット（期限切れでも返す）
    pub async fn snapshot(&self) -> Option<Arc<Snapshot<T>>> {
        self.current.read().await.clone()
    }

    /// 期限内の値があれば返す
    pub async fn get(&self) -> Option<Arc<T>> {
        let guard = self.current.read().await;
        guard
            .as_ref()
            .filter(|snapshot| !snapshot.is_expired())
            .map(|snapshot| Arc::clone(&snapshot.value))
    }

    /// 値を差し替える
    pub async fn store(&self, value: T) -> Arc<T> {
        let now = Instant::now();
        let value = Arc::new(value);
        let snapshot = Arc::new(Snapshot {
            value: Arc::clone(&value),
            loaded_at: now,
            expires_at: now + self.ttl,
        });
        *self.current.write().await = Some(snapshot);
        value
    }

    /// ローダーを実行して値を差し替える
    pub async fn refresh<F, Fut>(&self, loader: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let value = loader().await?;
        Ok(self.store(value).await)
    }

    /// 期限内ならキャッシュ値、期限切れならロードして差し替え
    pub async fn get_or_refresh<F, Fut>(&self, loader: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get().await {
            return Ok(value);
        }
        self.refresh(loader).await
    }

    /// キャッシュを無効化
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }
}

/// 既知の教育機関リスト（TTLキャッシュ付き）
pub struct InstitutionDirectory {
    lookup: Arc<dyn InstitutionLookup>,
    cache: TtlCache<Vec<KnownInstitution>>,
}

impl InstitutionDirectory {
    pub fn new(lookup: Arc<dyn InstitutionLookup>, ttl: Duration) -> Self {
        Self {
            lookup,
            cache: TtlCache::new(ttl),
        }
    }

    /// 既知の教育機関を取得
    ///
    /// 取得に失敗した場合、古いスナップショットがあればそれを使う。
    pub async fn known(&self) -> Result<Arc<Vec<KnownInstitution>>> {
        if let Some(value) = self.cache.get().await {
            return Ok(value);
        }
        match self.lookup.known().await {
            Ok(list) => {
                debug!("Loaded {} known institutions", list.len());
                Ok(self.cache.store(list).await)
            }
            Err(e) => match self.cache.snapshot().await {
                Some(stale) => {
                    warn!("Institution lookup failed, using stale list: {}", e);
                    Ok(Arc::clone(&stale.value))
                }
                None => Err(e),
            },
        }
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }
}

/// コンテンツルール設定（TTLキャッシュ付き）
pub struct RulesCache {
    store: Arc<dyn RulesConfigStore>,
    cache: TtlCache<RulesConfig>,
}

impl RulesCache {
    pub fn new(store: Arc<dyn RulesConfigStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(ttl),
        }
    }

    /// 有効なルール設定を取得
    ///
    /// ストアが空、または読み込みに失敗した場合はデフォルト設定を使う（非致命的）。
    pub async fn active(&self) -> Arc<RulesConfig> {
        if let Some(value) = self.cache.get().await {
            return value;
        }
        let rules = match self.store.active().await {
            Ok(Some(rules)) => {
                debug!("Loaded rules config version {}", rules.version);
                rules
            }
            Ok(None) => {
                debug!("No active rules config, using defaults");
                RulesConfig::default()
            }
            Err(e) => {
                warn!("Failed to load rules config, falling back to defaults: {}", e);
                if let Some(stale) = self.cache.snapshot().await {
                    return Arc::clone(&stale.value);
                }
                RulesConfig::default()
            }
        };
        self.cache.store(rules).await
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }
}
