//! Quality Scorer
//!
//! 構造的な指標（語数・見出し・リンク・FAQ・読みやすさ）から0-100の品質スコアを算出

use crate::html;
use crate::types::{Faq, IssueType, QualityMetrics, Severity, ValidationIssue};
use serde::{Deserialize, Serialize};

/// 品質しきい値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub min_word_count: usize,
    pub max_word_count: usize,
    /// h2/h3 の最低数
    pub min_headings: usize,
    pub min_internal_links: usize,
    pub min_external_links: usize,
    pub min_faqs: usize,
    /// 平均文長の上限（語）
    pub max_avg_sentence_length: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_word_count: 1000,
            max_word_count: 4000,
            min_headings: 4,
            min_internal_links: 3,
            min_external_links: 1,
            min_faqs: 3,
            max_avg_sentence_length: 25.0,
        }
    }
}

impl QualityThresholds {
    /// 目標語数に合わせて語数の上下限を調整する
    ///
    /// 下限は目標の半分（設定値を超えない）、上限は目標の2倍。
    pub fn scaled_to_target(&self, target_word_count: usize) -> Self {
        if target_word_count == 0 {
            return self.clone();
        }
        let mut scaled = self.clone();
        scaled.min_word_count = (target_word_count / 2).max(1).min(self.min_word_count.max(1));
        scaled.max_word_count = target_word_count
            .saturating_mul(2)
            .max(scaled.min_word_count.saturating_add(1));
        scaled
    }
}

/// 問題種別ごとの減点
fn deduction(issue_type: IssueType) -> u32 {
    match issue_type {
        IssueType::WordCountLow => 25,
        IssueType::WordCountHigh => 5,
        IssueType::WeakHeadings => 15,
        IssueType::MissingInternalLinks => 15,
        IssueType::MissingExternalLinks => 10,
        IssueType::MissingFaqs => 10,
        IssueType::PoorReadability => 10,
        _ => 0,
    }
}

/// 品質スコアラー
#[derive(Debug, Clone)]
pub struct QualityScorer {
    thresholds: QualityThresholds,
    site_domain: String,
}

impl QualityScorer {
    /// 新規スコアラーを作成
    pub fn new(thresholds: QualityThresholds, site_domain: impl Into<String>) -> Self {
        Self {
            thresholds,
            site_domain: site_domain.into(),
        }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// 記事を採点
    pub fn score(&self, content: &str, faqs: &[Faq]) -> QualityMetrics {
        let t = &self.thresholds;
        let word_count = html::word_count(content);
        let heading_count = html::extract_headings(content)
            .iter()
            .filter(|h| h.level == 2 || h.level == 3)
            .count();
        let links = html::extract_links(content);
        let internal_link_count = links
            .iter()
            .filter(|l| html::is_internal_href(&l.href, &self.site_domain))
            .count();
        let external_link_count = links
            .iter()
            .filter(|l| html::is_external_href(&l.href, &self.site_domain))
            .count();
        let faq_count = faqs
            .iter()
            .filter(|f| !f.question.trim().is_empty() && !f.answer.trim().is_empty())
            .count();
        let avg_sentence_length = html::avg_sentence_length(content);

        let mut issues = Vec::new();

        if word_count < t.min_word_count {
            issues.push(ValidationIssue::new(
                IssueType::WordCountLow,
                Severity::Major,
                format!(
                    "Content has {} words; at least {} required",
                    word_count, t.min_word_count
                ),
            ));
        } else if word_count > t.max_word_count {
            issues.push(ValidationIssue::new(
                IssueType::WordCountHigh,
                Severity::Minor,
                format!(
                    "Content has {} words; at most {} recommended",
                    word_count, t.max_word_count
                ),
            ));
        }

        if heading_count < t.min_headings {
            issues.push(ValidationIssue::new(
                IssueType::WeakHeadings,
                Severity::Warning,
                format!(
                    "Only {} H2/H3 headings; at least {} required",
                    heading_count, t.min_headings
                ),
            ));
        }

        if internal_link_count < t.min_internal_links {
            issues.push(ValidationIssue::new(
                IssueType::MissingInternalLinks,
                Severity::Warning,
                format!(
                    "Only {} internal links; at least {} required",
                    internal_link_count, t.min_internal_links
                ),
            ));
        }

        if external_link_count < t.min_external_links {
            issues.push(ValidationIssue::new(
                IssueType::MissingExternalLinks,
                Severity::Minor,
                format!(
                    "Only {} external links; at least {} required",
                    external_link_count, t.min_external_links
                ),
            ));
        }

        if faq_count < t.min_faqs {
            issues.push(ValidationIssue::new(
                IssueType::MissingFaqs,
                Severity::Warning,
                format!("Only {} FAQs; at least {} required", faq_count, t.min_faqs),
            ));
        }

        if avg_sentence_length > t.max_avg_sentence_length {
            issues.push(ValidationIssue::new(
                IssueType::PoorReadability,
                Severity::Minor,
                format!(
                    "Average sentence length {:.1} words exceeds {:.1}",
                    avg_sentence_length, t.max_avg_sentence_length
                ),
            ));
        }

        let penalty: u32 = issues.iter().map(|i| deduction(i.issue_type)).sum();
        let score = 100u32.saturating_sub(penalty) as u8;

        QualityMetrics {
            score,
            word_count,
            issues,
            heading_count,
            internal_link_count,
            external_link_count,
            faq_count,
            avg_sentence_length,
        }
    }
}
