//! 記事生成パイプラインのデータモデル
//!
//! アイデア入力から最終的な記事レコードまで、各ステージ間で受け渡される型

use crate::reasoning::ReasoningLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// コンテンツアイデア（上流で作成される不変の入力）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentIdea {
    /// タイトル
    pub title: String,
    /// 説明
    #[serde(default)]
    pub description: String,
    /// キーワード
    #[serde(default)]
    pub keywords: Vec<String>,
    /// シードトピック
    #[serde(default)]
    pub seed_topics: Vec<String>,
}

impl ContentIdea {
    /// 新規アイデアを作成
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// 説明を設定
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// キーワードを設定
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// シードトピックを設定
    pub fn with_seed_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// 主キーワード（最初のキーワード、なければタイトル）
    pub fn primary_keyword(&self) -> String {
        self.keywords
            .first()
            .cloned()
            .unwrap_or_else(|| self.title.to_lowercase())
    }
}

/// コンテンツ種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// ランキング記事
    Ranking,
    /// キャリアガイド
    CareerGuide,
    /// リスト記事
    Listicle,
    /// ガイド
    #[default]
    Guide,
    /// FAQ記事
    Faq,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Ranking => "ranking",
            ContentType::CareerGuide => "career_guide",
            ContentType::Listicle => "listicle",
            ContentType::Guide => "guide",
            ContentType::Faq => "faq",
        }
    }
}

/// 生成オプション
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// コンテンツ種別
    pub content_type: ContentType,
    /// 目標語数
    pub target_word_count: usize,
    /// 執筆者の自動割り当て
    pub auto_assign_contributor: bool,
    /// 内部リンクの追加
    pub add_internal_links: bool,
    /// 品質問題の自動修正
    pub auto_fix: bool,
    /// 自動修正の最大試行回数
    pub max_fix_attempts: u32,
    /// ヒューマナイズの実行
    pub humanize: bool,
    /// 収益化スロットの挿入
    pub add_monetization: bool,
    /// 学位レベル（未指定時はタイトルから推定）
    pub degree_level: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            content_type: ContentType::Guide,
            target_word_count: 1500,
            auto_assign_contributor: true,
            add_internal_links: true,
            auto_fix: true,
            max_fix_attempts: 3,
            humanize: true,
            add_monetization: true,
            degree_level: None,
        }
    }
}

impl GenerationOptions {
    /// 種別と目標語数からオプションを作成
    pub fn new(content_type: ContentType, target_word_count: usize) -> Self {
        Self {
            content_type,
            target_word_count,
            ..Self::default()
        }
    }

    /// 自動修正の最大試行回数を設定
    pub fn with_max_fix_attempts(mut self, attempts: u32) -> Self {
        self.max_fix_attempts = attempts;
        self
    }

    /// 学位レベルを設定
    pub fn with_degree_level(mut self, level: impl Into<String>) -> Self {
        self.degree_level = Some(level.into());
        self
    }
}

/// FAQ項目
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

impl Faq {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// 記事ドラフト（各ステージで順に書き換えられる）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleDraft {
    pub title: String,
    /// HTML本文
    pub content: String,
    pub excerpt: String,
    pub faqs: Vec<Faq>,
    pub meta_title: String,
    pub meta_description: String,
    pub focus_keyword: String,
}

/// 検証問題の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Truncation,
    PlaceholderContent,
    UnverifiedStatistic,
    UnverifiedLegislation,
    UnknownInstitution,
    InvalidInternalLink,
    InsufficientInternalLinks,
    WordCountLow,
    WordCountHigh,
    MissingInternalLinks,
    MissingExternalLinks,
    MissingFaqs,
    WeakHeadings,
    PoorReadability,
    UnapprovedAuthor,
    MissingContributor,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Truncation => "truncation",
            IssueType::PlaceholderContent => "placeholder_content",
            IssueType::UnverifiedStatistic => "unverified_statistic",
            IssueType::UnverifiedLegislation => "unverified_legislation",
            IssueType::UnknownInstitution => "unknown_institution",
            IssueType::InvalidInternalLink => "invalid_internal_link",
            IssueType::InsufficientInternalLinks => "insufficient_internal_links",
            IssueType::WordCountLow => "word_count_low",
            IssueType::WordCountHigh => "word_count_high",
            IssueType::MissingInternalLinks => "missing_internal_links",
            IssueType::MissingExternalLinks => "missing_external_links",
            IssueType::MissingFaqs => "missing_faqs",
            IssueType::WeakHeadings => "weak_headings",
            IssueType::PoorReadability => "poor_readability",
            IssueType::UnapprovedAuthor => "unapproved_author",
            IssueType::MissingContributor => "missing_contributor",
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 重要度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Warning,
    Major,
    Critical,
}

/// リスクレベル（順序付き：Low < Medium < High < Critical）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 検証で見つかった問題
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl ValidationIssue {
    /// 新規問題を作成
    pub fn new(issue_type: IssueType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity,
            message: message.into(),
            evidence: Vec::new(),
        }
    }

    /// 根拠を設定
    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }
}

/// 検証時の計測値
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub word_count: usize,
    pub internal_link_count: usize,
    pub invalid_link_count: usize,
}

/// 検証結果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_blocked: bool,
    pub requires_review: bool,
    pub risk_level: RiskLevel,
    pub blocking_issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub metrics: ValidationMetrics,
}

impl ValidationResult {
    /// 指定種別の問題を含むか
    pub fn has_issue(&self, issue_type: IssueType) -> bool {
        self.blocking_issues
            .iter()
            .chain(self.warnings.iter())
            .any(|issue| issue.issue_type == issue_type)
    }

    /// 全問題（ブロッキング→警告の順）
    pub fn all_issues(&self) -> Vec<ValidationIssue> {
        self.blocking_issues
            .iter()
            .chain(self.warnings.iter())
            .cloned()
            .collect()
    }
}

/// 品質メトリクス
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// スコア (0-100)
    pub score: u8,
    pub word_count: usize,
    pub issues: Vec<ValidationIssue>,
    pub heading_count: usize,
    pub internal_link_count: usize,
    pub external_link_count: usize,
    pub faq_count: usize,
    pub avg_sentence_length: f64,
}

impl QualityMetrics {
    /// 問題種別の一覧（重複なし、出現順）
    pub fn issue_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for issue in &self.issues {
            let name = issue.issue_type.as_str().to_string();
            if !types.contains(&name) {
                types.push(name);
            }
        }
        types
    }
}

/// リスク評価
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    pub blocking_issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub can_auto_publish: bool,
    pub requires_review: bool,
    pub summary: String,
}

/// 執筆者プロフィール
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributorProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub expertise_areas: Vec<String>,
    /// 文体・トーンの説明
    #[serde(default)]
    pub voice_profile: Option<String>,
}

/// 内部リンク候補となる既存記事
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub excerpt: String,
}

/// 既知の教育機関
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnownInstitution {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl KnownInstitution {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }
}

/// 収益化スロットの挿入位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPosition {
    AfterIntro,
    MidContent,
    PreConclusion,
}

impl SlotPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotPosition::AfterIntro => "after_intro",
            SlotPosition::MidContent => "mid_content",
            SlotPosition::PreConclusion => "pre_conclusion",
        }
    }
}

/// 収益化スロット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonetizationSlot {
    pub position: SlotPosition,
    /// ショートコード
    pub shortcode: String,
    pub program_count: u32,
    pub sponsored: bool,
}

/// 記事ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    /// レビュー待ち
    #[default]
    ReadyForReview,
    /// 自動公開予約済み
    Scheduled,
    /// 手動での完成が必要（生成失敗時のスタブ）
    NeedsManualCompletion,
}

/// パイプラインの最終出力
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub faqs: Vec<Faq>,
    pub meta_title: String,
    pub meta_description: String,
    pub focus_keyword: String,
    pub content_type: ContentType,
    pub word_count: usize,
    pub quality_score: u8,
    pub risk_level: RiskLevel,
    pub risk_flags: Vec<String>,
    pub validation_flags: Vec<ValidationIssue>,
    pub requires_human_review: bool,
    pub review_reasons: Vec<String>,
    pub contributor_id: Option<String>,
    pub contributor_name: Option<String>,
    pub monetization_slots: Vec<MonetizationSlot>,
    pub status: ArticleStatus,
    pub auto_publish_at: Option<DateTime<Utc>>,
    pub generated_at: DateTime<Utc>,
    pub reasoning: ReasoningLog,
}

impl Article {
    /// 生成に失敗したアイデアを失わないためのスタブ記事
    pub fn stub(
        idea: &ContentIdea,
        options: &GenerationOptions,
        reason: impl Into<String>,
        reasoning: ReasoningLog,
    ) -> Self {
        let reason = reason.into();
        let description = if idea.description.trim().is_empty() {
            idea.title.clone()
        } else {
            idea.description.clone()
        };
        let content = format!("<p>{}</p>", crate::html::escape_text(&description));

        Self {
            id: Uuid::new_v4(),
            title: idea.title.clone(),
            word_count: crate::html::word_count(&content),
            content,
            excerpt: description,
            faqs: Vec::new(),
            meta_title: idea.title.clone(),
            meta_description: String::new(),
            focus_keyword: idea.primary_keyword(),
            content_type: options.content_type,
            quality_score: 0,
            risk_level: RiskLevel::High,
            risk_flags: Vec::new(),
            validation_flags: Vec::new(),
            requires_human_review: true,
            review_reasons: vec![format!("Generation failed: {}", reason)],
            contributor_id: None,
            contributor_name: None,
            monetization_slots: Vec::new(),
            status: ArticleStatus::NeedsManualCompletion,
            auto_publish_at: None,
            generated_at: Utc::now(),
            reasoning,
        }
    }
}
