//! External Collaborator Interfaces
//!
//! パイプラインが利用する外部サービスの抽象。生成系（ドラフト・リライト・修正）と
//! 参照系（カタログ・教育機関・ルール・執筆者）に分かれる。

pub mod llm;
pub mod memory;
pub mod rewrite_api;

pub use llm::{LlmDraftProvider, LlmRepairProvider, LlmRewriteProvider};
pub use memory::{
    InMemoryCatalog, KeywordContributorAssigner, PhraseAnchorSuggester, StaticInstitutions,
    StaticRulesStore,
};
pub use rewrite_api::HttpRewriteProvider;

use crate::error::Result;
use crate::rules::RulesConfig;
use crate::types::{
    ArticleDraft, CatalogEntry, ContentIdea, ContentType, ContributorProfile, KnownInstitution,
    ValidationIssue,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// ドラフト生成に渡す文脈情報
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftContext {
    /// 検証済みの学費・価格情報
    pub pricing_facts: Option<String>,
    /// 執筆者の文体プロフィール
    pub author_voice: Option<String>,
    /// ルール上の制約
    pub rule_constraints: Vec<String>,
    /// 割り当て済み執筆者
    pub contributor: Option<ContributorProfile>,
}

/// ドラフト生成リクエスト
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRequest {
    pub idea: ContentIdea,
    pub content_type: ContentType,
    pub target_word_count: usize,
    pub context: DraftContext,
    /// 何回目の試行か（1始まり）
    pub attempt: u32,
}

/// ドラフト生成プロバイダー
#[async_trait]
pub trait DraftProvider: Send + Sync {
    fn name(&self) -> &str;

    /// 構造化ドラフトを生成
    async fn generate_draft(&self, request: &DraftRequest) -> Result<ArticleDraft>;
}

/// リライト方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteMode {
    /// チャンク単位で反復リライト
    Chunked,
    /// 文書全体を1回でリライト
    WholeDocument,
}

/// リライトオプション
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewriteOptions {
    /// トーン（例: "College", "Standard"）
    pub tone: Option<String>,
    /// 執筆者の文体・トーン文脈
    pub voice: Option<String>,
    /// 記事タイトル
    pub title: Option<String>,
    /// 目標とする自然さスコア
    pub target_score: u8,
}

/// リライト結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteResult {
    pub text: String,
    /// プロバイダーが返す生スコア（極性は設定で解釈する）
    pub naturalness_score: Option<f64>,
}

/// リライト（ヒューマナイズ）プロバイダー
#[async_trait]
pub trait RewriteProvider: Send + Sync {
    fn name(&self) -> &str;

    fn mode(&self) -> RewriteMode;

    async fn humanize(&self, text: &str, options: &RewriteOptions) -> Result<RewriteResult>;
}

/// 品質問題の修正プロバイダー
#[async_trait]
pub trait RepairProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fix(&self, content: &str, issues: &[ValidationIssue]) -> Result<String>;
}

/// 内部リンク対象となる既存記事カタログ
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// 関連しそうな記事を返す
    async fn relevant(
        &self,
        title: &str,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<CatalogEntry>>;

    /// URLまたはパスから記事を解決
    async fn resolve(&self, url: &str) -> Result<Option<CatalogEntry>>;
}

/// 既知の教育機関
#[async_trait]
pub trait InstitutionLookup: Send + Sync {
    async fn known(&self) -> Result<Vec<KnownInstitution>>;
}

/// 版管理されたルール設定ストア
#[async_trait]
pub trait RulesConfigStore: Send + Sync {
    async fn active(&self) -> Result<Option<RulesConfig>>;
}

/// 執筆者割り当て
#[async_trait]
pub trait ContributorAssigner: Send + Sync {
    async fn assign(
        &self,
        idea: &ContentIdea,
        content_type: ContentType,
    ) -> Result<Option<ContributorProfile>>;
}

/// アンカー挿入の提案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkProposal {
    /// 本文中に既に存在するフレーズ
    pub anchor_text: String,
    pub url: String,
}

/// 候補記事に対してアンカーテキストを提案する
#[async_trait]
pub trait AnchorSuggester: Send + Sync {
    async fn suggest(&self, html: &str, candidates: &[CatalogEntry]) -> Result<Vec<LinkProposal>>;
}
