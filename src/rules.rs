//! Content Rules Configuration
//!
//! 外部ストアで版管理されるコンテンツルール。存在しない場合は組み込みデフォルトを使う。

use crate::content::quality::QualityThresholds;
use crate::content::risk::RiskThresholds;
use serde::{Deserialize, Serialize};

/// コンテンツルール設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 設定バージョン（0 は組み込みデフォルト）
    pub version: u32,
    /// 品質しきい値
    pub quality: QualityThresholds,
    /// リスクしきい値
    pub risk: RiskThresholds,
    /// 統計・法令の出典とみなすマーカー（大文字小文字を区別しない）
    pub citation_markers: Vec<String>,
    /// 法令参照の検証マーカー
    pub legislation_markers: Vec<String>,
    /// カタログ照合なしで有効とみなすサイト内パス接頭辞
    pub structural_link_prefixes: Vec<String>,
    /// 必要な有効内部リンク数
    pub min_valid_internal_links: usize,
    /// ドラフト生成プロンプトに渡す制約
    pub rule_constraints: Vec<String>,
    /// 承認済み執筆者ID
    pub approved_authors: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            version: 0,
            quality: QualityThresholds::default(),
            risk: RiskThresholds::default(),
            citation_markers: [
                "BLS",
                "Bureau of Labor Statistics",
                "bls.gov",
                "NCES",
                "National Center for Education Statistics",
                "nces.ed.gov",
                "IPEDS",
                "College Scorecard",
                "collegescorecard.ed.gov",
                "Census",
                "census.gov",
                "ed.gov",
                "according to",
                "source:",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            legislation_markers: [
                "congress.gov",
                "govinfo.gov",
                "federalregister.gov",
                "whitehouse.gov",
                "legislature",
                "signed into law",
                "according to",
                "source:",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            structural_link_prefixes: [
                "/rankings/",
                "/degrees/",
                "/careers/",
                "/resources/",
                "/category/",
                "/about",
                "/contact",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            min_valid_internal_links: 3,
            rule_constraints: vec![
                "Never invent institution names, statistics, or legislation.".to_string(),
                "Cite BLS or NCES for every salary or enrollment figure.".to_string(),
                "End every section with a complete sentence.".to_string(),
            ],
            approved_authors: Vec::new(),
        }
    }
}

impl RulesConfig {
    /// 組み込みデフォルトかどうか
    pub fn is_builtin(&self) -> bool {
        self.version == 0
    }

    /// 執筆者が承認済みか（リストが空なら制限なし）
    pub fn is_author_approved(&self, contributor_id: &str) -> bool {
        self.approved_authors.is_empty()
            || self
                .approved_authors
                .iter()
                .any(|approved| approved == contributor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let rules = RulesConfig::default();
        assert!(rules.is_builtin());
        assert_eq!(rules.min_valid_internal_links, 3);
        assert!(rules.citation_markers.iter().any(|m| m == "BLS"));
        assert!(rules.is_author_approved("anyone"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let rules: RulesConfig = toml::from_str(
            r#"
version = 4
approved_authors = ["c-1"]
"#,
        )
        .unwrap();
        assert_eq!(rules.version, 4);
        assert!(rules.is_author_approved("c-1"));
        assert!(!rules.is_author_approved("c-2"));
        assert_eq!(rules.min_valid_internal_links, 3);
    }
}
