//! In-memory collaborators
//!
//! カタログ・教育機関・ルール・執筆者をメモリ上のデータで提供する実装。
//! 組み込み用途やテストで使う。

use super::{
    AnchorSuggester, CatalogLookup, ContributorAssigner, InstitutionLookup, LinkProposal,
    RulesConfigStore,
};
use crate::error::{Error, Result};
use crate::html;
use crate::rules::RulesConfig;
use crate::types::{CatalogEntry, ContentIdea, ContentType, ContributorProfile, KnownInstitution};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "in", "on", "for", "and", "or", "with", "by", "at", "is",
    "are", "how", "what", "best", "top", "your", "guide", "vs",
];

fn words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2 && !FILLER_WORDS.contains(w))
        .map(String::from)
        .collect()
}

fn path_key(url: &str) -> String {
    html::link_path(url)
        .map(|p| html::normalize_path(&p))
        .unwrap_or_else(|| url.trim().to_lowercase())
}

/// メモリ上の記事カタログ
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    entries: Vec<CatalogEntry>,
}

impl InMemoryCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn relevant(
        &self,
        title: &str,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<CatalogEntry>> {
        let mut query = words(title);
        for keyword in keywords {
            query.extend(words(keyword));
        }

        let mut matches: Vec<(usize, &CatalogEntry)> = self
            .entries
            .iter()
            .map(|entry| {
                let mut entry_words = words(&entry.title);
                for topic in &entry.topics {
                    entry_words.extend(words(topic));
                }
                entry_words.extend(words(&entry.category));
                (query.intersection(&entry_words).count(), entry)
            })
            .filter(|(overlap, _)| *overlap > 0)
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(matches
            .into_iter()
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn resolve(&self, url: &str) -> Result<Option<CatalogEntry>> {
        let key = path_key(url);
        Ok(self
            .entries
            .iter()
            .find(|entry| path_key(&entry.url) == key)
            .cloned())
    }
}

/// 固定の教育機関リスト
#[derive(Debug, Clone, Default)]
pub struct StaticInstitutions {
    institutions: Vec<KnownInstitution>,
}

impl StaticInstitutions {
    pub fn new(institutions: Vec<KnownInstitution>) -> Self {
        Self { institutions }
    }
}

#[async_trait]
impl InstitutionLookup for StaticInstitutions {
    async fn known(&self) -> Result<Vec<KnownInstitution>> {
        Ok(self.institutions.clone())
    }
}

/// 固定のルール設定ストア
#[derive(Debug, Clone, Default)]
pub struct StaticRulesStore {
    rules: Option<RulesConfig>,
}

impl StaticRulesStore {
    pub fn new(rules: RulesConfig) -> Self {
        Self { rules: Some(rules) }
    }

    /// 有効な設定がないストア（デフォルト設定が使われる）
    pub fn empty() -> Self {
        Self { rules: None }
    }

    /// TOMLファイルから読み込む
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let rules: RulesConfig = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded rules version {} from {}", rules.version, path.display());
        Ok(Self::new(rules))
    }
}

#[async_trait]
impl RulesConfigStore for StaticRulesStore {
    async fn active(&self) -> Result<Option<RulesConfig>> {
        Ok(self.rules.clone())
    }
}

/// 専門分野とキーワードの一致で執筆者を割り当てる
#[derive(Debug, Clone, Default)]
pub struct KeywordContributorAssigner {
    contributors: Vec<ContributorProfile>,
}

impl KeywordContributorAssigner {
    pub fn new(contributors: Vec<ContributorProfile>) -> Self {
        Self { contributors }
    }
}

#[async_trait]
impl ContributorAssigner for KeywordContributorAssigner {
    async fn assign(
        &self,
        idea: &ContentIdea,
        _content_type: ContentType,
    ) -> Result<Option<ContributorProfile>> {
        let haystack = format!(
            "{} {} {}",
            idea.title,
            idea.keywords.join(" "),
            idea.seed_topics.join(" ")
        )
        .to_lowercase();

        let best = self
            .contributors
            .iter()
            .map(|c| {
                let hits = c
                    .expertise_areas
                    .iter()
                    .filter(|area| haystack.contains(&area.to_lowercase()))
                    .count();
                (hits, c)
            })
            .filter(|(hits, _)| *hits > 0)
            // 同点なら先に登録された執筆者
            .fold(None::<(usize, &ContributorProfile)>, |best, current| match best {
                Some(b) if b.0 >= current.0 => Some(b),
                _ => Some(current),
            });

        Ok(best.map(|(_, c)| c.clone()))
    }
}

/// 候補記事のトピック・タイトルの語句を本文から探してアンカーを提案する
#[derive(Debug, Clone, Default)]
pub struct PhraseAnchorSuggester;

impl PhraseAnchorSuggester {
    pub fn new() -> Self {
        Self
    }

    /// 候補ごとの探索フレーズ（優先順）
    fn phrases(entry: &CatalogEntry) -> Vec<String> {
        let mut phrases: Vec<String> = entry.topics.clone();
        phrases.push(entry.title.clone());

        let title_words: Vec<&str> = entry.title.split_whitespace().collect();
        for size in [3, 2] {
            for window in title_words.windows(size) {
                let meaningful = window
                    .iter()
                    .filter(|w| !FILLER_WORDS.contains(&w.to_lowercase().as_str()))
                    .count();
                if meaningful == size {
                    phrases.push(window.join(" "));
                }
            }
        }
        phrases
    }
}

#[async_trait]
impl AnchorSuggester for PhraseAnchorSuggester {
    async fn suggest(&self, html: &str, candidates: &[CatalogEntry]) -> Result<Vec<LinkProposal>> {
        let mut proposals = Vec::new();
        for entry in candidates {
            let found = Self::phrases(entry).into_iter().find_map(|phrase| {
                html::find_in_text(html, phrase.trim(), true).map(|range| html[range].to_string())
            });
            if let Some(anchor_text) = found {
                proposals.push(LinkProposal {
                    anchor_text,
                    url: entry.url.clone(),
                });
            }
        }
        Ok(proposals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(vec![
            CatalogEntry {
                title: "Cheapest Online MBA Programs".to_string(),
                url: "https://example.edu/online-mba/cheapest/".to_string(),
                topics: vec!["online mba".to_string()],
                category: "business".to_string(),
                excerpt: String::new(),
            },
            CatalogEntry {
                title: "Nursing Careers".to_string(),
                url: "https://example.edu/careers/nursing/".to_string(),
                topics: vec!["nursing".to_string()],
                category: "health".to_string(),
                excerpt: String::new(),
            },
        ])
    }

    #[tokio::test]
    async fn test_catalog_relevance_and_resolve() {
        let catalog = catalog();
        let relevant = catalog
            .relevant("Best Online MBA Programs", &["online mba".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(relevant.len(), 1);
        assert_eq!(relevant[0].title, "Cheapest Online MBA Programs");

        assert!(catalog.resolve("/online-mba/cheapest").await.unwrap().is_some());
        assert!(catalog
            .resolve("https://www.example.edu/Careers/Nursing/?ref=x")
            .await
            .unwrap()
            .is_some());
        assert!(catalog.resolve("/nope/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contributor_assignment() {
        let assigner = KeywordContributorAssigner::new(vec![
            ContributorProfile {
                id: "c-1".to_string(),
                name: "Nurse Writer".to_string(),
                expertise_areas: vec!["nursing".to_string()],
                voice_profile: None,
            },
            ContributorProfile {
                id: "c-2".to_string(),
                name: "Business Writer".to_string(),
                expertise_areas: vec!["mba".to_string(), "business".to_string()],
                voice_profile: Some("Direct and practical".to_string()),
            },
        ]);

        let idea = ContentIdea::new("Best Online MBA Programs").with_keywords(["business school"]);
        let assigned = assigner.assign(&idea, ContentType::Ranking).await.unwrap();
        assert_eq!(assigned.unwrap().id, "c-2");

        let none = assigner
            .assign(&ContentIdea::new("Culinary Arts Degrees"), ContentType::Guide)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_phrase_suggester_uses_text_casing() {
        let html = "<h2>Cheapest Online MBA Programs</h2><p>An Online MBA is flexible.</p>";
        let proposals = PhraseAnchorSuggester::new()
            .suggest(html, catalog().entries())
            .await
            .unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].anchor_text, "Online MBA");
    }

    #[tokio::test]
    async fn test_rules_store_from_toml_file() {
        use std::io::Write;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "version = 7\nmin_valid_internal_links = 2").unwrap();

        let store = StaticRulesStore::from_toml_file(file.path()).unwrap();
        let rules = store.active().await.unwrap().unwrap();
        assert_eq!(rules.version, 7);
        assert_eq!(rules.min_valid_internal_links, 2);

        assert!(StaticRulesStore::empty().active().await.unwrap().is_none());
    }
}
