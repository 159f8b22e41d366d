//! Risk Assessor
//!
//! 品質問題・検証結果・執筆者の承認状況から4段階のリスクを判定し、自動公開の可否を決める。

use crate::rules::RulesConfig;
use crate::types::{
    ContributorProfile, IssueType, QualityMetrics, RiskAssessment, RiskLevel, Severity,
    ValidationIssue, ValidationResult,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// リスク判定のしきい値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// このスコア以上で HIGH
    pub high_risk_score: u32,
    /// このスコア以上で MEDIUM
    pub medium_risk_score: u32,
    /// 品質スコアがこれ未満で HIGH
    pub quality_high_risk_below: u8,
    /// 品質スコアがこれ未満で MEDIUM
    pub quality_medium_risk_below: u8,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            high_risk_score: 50,
            medium_risk_score: 20,
            quality_high_risk_below: 60,
            quality_medium_risk_below: 75,
        }
    }
}

/// 重要度ごとのリスク加点
pub fn severity_weight(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 40,
        Severity::Major => 15,
        Severity::Warning => 8,
        Severity::Minor => 3,
    }
}

/// 執筆者の承認状況
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorStatus {
    Approved { id: String },
    Unapproved { id: String },
    Missing,
}

impl AuthorStatus {
    /// ルール設定の承認リストと照合
    pub fn evaluate(contributor: Option<&ContributorProfile>, rules: &RulesConfig) -> Self {
        match contributor {
            Some(c) if rules.is_author_approved(&c.id) => AuthorStatus::Approved { id: c.id.clone() },
            Some(c) => AuthorStatus::Unapproved { id: c.id.clone() },
            None => AuthorStatus::Missing,
        }
    }
}

/// リスク評価器
#[derive(Debug, Clone, Default)]
pub struct RiskAssessor {
    thresholds: RiskThresholds,
}

impl RiskAssessor {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// リスクを評価
    pub fn assess(
        &self,
        quality: &QualityMetrics,
        validation: &ValidationResult,
        author: &AuthorStatus,
    ) -> RiskAssessment {
        let mut blocking_issues = validation.blocking_issues.clone();
        let mut warnings = validation.warnings.clone();
        warnings.extend(quality.issues.iter().cloned());

        match author {
            AuthorStatus::Unapproved { id } => blocking_issues.push(
                ValidationIssue::new(
                    IssueType::UnapprovedAuthor,
                    Severity::Critical,
                    "Assigned contributor is not on the approved author list",
                )
                .with_evidence(vec![id.clone()]),
            ),
            AuthorStatus::Missing => warnings.push(ValidationIssue::new(
                IssueType::MissingContributor,
                Severity::Minor,
                "No contributor assigned",
            )),
            AuthorStatus::Approved { .. } => {}
        }

        let risk_score: u32 = blocking_issues
            .iter()
            .chain(warnings.iter())
            .map(|issue| severity_weight(issue.severity))
            .sum();

        let t = &self.thresholds;
        let blocked = !blocking_issues.is_empty();
        let risk_level = if blocked {
            RiskLevel::Critical
        } else if risk_score >= t.high_risk_score || quality.score < t.quality_high_risk_below {
            RiskLevel::High
        } else if risk_score >= t.medium_risk_score
            || quality.score < t.quality_medium_risk_below
        {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let can_auto_publish = !blocked && risk_level <= RiskLevel::Medium;
        let requires_review = blocked
            || risk_level >= RiskLevel::High
            || warnings.iter().any(|w| w.severity >= Severity::Major);

        let summary = format!(
            "Risk {} (score {}): {} blocking issue(s), {} warning(s), quality {}",
            risk_level,
            risk_score,
            blocking_issues.len(),
            warnings.len(),
            quality.score
        );

        RiskAssessment {
            risk_level,
            risk_score,
            blocking_issues,
            warnings,
            can_auto_publish,
            requires_review,
            summary,
        }
    }
}

/// 自動公開ゲート
///
/// 公開そのものは外部スケジューラが行う。ここでは公開予定時刻を決めるだけ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoPublishGate {
    pub enabled: bool,
    /// 自動公開に必要な最低品質スコア
    pub min_quality_score: u8,
    /// 生成から公開までの猶予（時間）
    pub delay_hours: i64,
}

impl Default for AutoPublishGate {
    fn default() -> Self {
        Self {
            enabled: false,
            min_quality_score: 80,
            delay_hours: 24,
        }
    }
}

impl AutoPublishGate {
    /// 公開予定時刻（自動公開不可なら None）
    pub fn publish_at(
        &self,
        assessment: &RiskAssessment,
        quality_score: u8,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if !self.enabled || !assessment.can_auto_publish || quality_score < self.min_quality_score
        {
            return None;
        }
        Some(now + Duration::hours(self.delay_hours.max(0)))
    }

    /// 公開までの残り時間（過ぎていれば0）
    pub fn time_remaining(publish_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (publish_at - now).max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quality(score: u8) -> QualityMetrics {
        QualityMetrics {
            score,
            ..QualityMetrics::default()
        }
    }

    fn approved() -> AuthorStatus {
        AuthorStatus::Approved {
            id: "c-1".to_string(),
        }
    }

    #[test]
    fn test_clean_article_is_low_risk() {
        let assessment =
            RiskAssessor::default().assess(&quality(95), &ValidationResult::default(), &approved());
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert_eq!(assessment.risk_score, 0);
        assert!(assessment.can_auto_publish);
        assert!(!assessment.requires_review);
    }

    #[test]
    fn test_blocking_issue_is_critical_regardless_of_score() {
        let validation = ValidationResult {
            is_blocked: true,
            blocking_issues: vec![ValidationIssue::new(
                IssueType::Truncation,
                Severity::Critical,
                "cut off",
            )],
            ..ValidationResult::default()
        };
        let assessment = RiskAssessor::default().assess(&quality(100), &validation, &approved());
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert!(!assessment.can_auto_publish);
        assert!(assessment.requires_review);
    }

    #[test]
    fn test_unapproved_author_blocks() {
        let rules = RulesConfig {
            approved_authors: vec!["c-1".to_string()],
            ..RulesConfig::default()
        };
        let contributor = ContributorProfile {
            id: "c-9".to_string(),
            name: "Guest".to_string(),
            ..ContributorProfile::default()
        };
        let status = AuthorStatus::evaluate(Some(&contributor), &rules);
        assert_eq!(
            status,
            AuthorStatus::Unapproved {
                id: "c-9".to_string()
            }
        );

        let assessment =
            RiskAssessor::default().assess(&quality(95), &ValidationResult::default(), &status);
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert_eq!(
            assessment.blocking_issues[0].issue_type,
            IssueType::UnapprovedAuthor
        );
    }

    #[test]
    fn test_score_and_quality_thresholds() {
        let assessor = RiskAssessor::default();

        // 8 + 8 + 3(執筆者なし) = 19 → quality だけで判定
        let validation = ValidationResult {
            warnings: vec![
                ValidationIssue::new(IssueType::UnverifiedStatistic, Severity::Warning, "s"),
                ValidationIssue::new(IssueType::UnverifiedLegislation, Severity::Warning, "l"),
            ],
            ..ValidationResult::default()
        };
        let low = assessor.assess(&quality(90), &validation, &AuthorStatus::Missing);
        assert_eq!(low.risk_score, 19);
        assert_eq!(low.risk_level, RiskLevel::Low);

        let medium = assessor.assess(&quality(70), &validation, &AuthorStatus::Missing);
        assert_eq!(medium.risk_level, RiskLevel::Medium);
        assert!(medium.can_auto_publish);

        let high = assessor.assess(&quality(55), &validation, &AuthorStatus::Missing);
        assert_eq!(high.risk_level, RiskLevel::High);
        assert!(!high.can_auto_publish);
    }

    #[test]
    fn test_major_warnings_accumulate_to_high() {
        let validation = ValidationResult {
            warnings: vec![
                ValidationIssue::new(IssueType::UnknownInstitution, Severity::Major, "u"),
                ValidationIssue::new(IssueType::InvalidInternalLink, Severity::Major, "i"),
                ValidationIssue::new(IssueType::UnverifiedStatistic, Severity::Warning, "s"),
                ValidationIssue::new(IssueType::UnverifiedLegislation, Severity::Warning, "l"),
            ],
            ..ValidationResult::default()
        };
        let assessment = RiskAssessor::default().assess(&quality(90), &validation, &approved());
        assert_eq!(assessment.risk_score, 46);
        assert_eq!(assessment.risk_level, RiskLevel::Medium);

        let mut more = validation.clone();
        more.warnings.push(ValidationIssue::new(
            IssueType::InsufficientInternalLinks,
            Severity::Minor,
            "m",
        ));
        let mut q = quality(90);
        q.issues.push(ValidationIssue::new(
            IssueType::MissingFaqs,
            Severity::Warning,
            "f",
        ));
        let assessment = RiskAssessor::default().assess(&q, &more, &approved());
        assert_eq!(assessment.risk_score, 57);
        assert_eq!(assessment.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_auto_publish_gate() {
        let now = Utc::now();
        let assessment =
            RiskAssessor::default().assess(&quality(90), &ValidationResult::default(), &approved());

        let disabled = AutoPublishGate::default();
        assert!(disabled.publish_at(&assessment, 90, now).is_none());

        let gate = AutoPublishGate {
            enabled: true,
            ..AutoPublishGate::default()
        };
        let publish_at = gate.publish_at(&assessment, 90, now).unwrap();
        assert_eq!(publish_at - now, Duration::hours(24));
        assert!(gate.publish_at(&assessment, 70, now).is_none());

        assert_eq!(
            AutoPublishGate::time_remaining(publish_at, now + Duration::hours(20)),
            Duration::hours(4)
        );
        assert_eq!(
            AutoPublishGate::time_remaining(publish_at, now + Duration::hours(30)),
            Duration::zero()
        );
    }
}
