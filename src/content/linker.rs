//! Internal Linker
//!
//! カタログから関連記事を重み付きスコアで選び、本文中の既存テキストにアンカーを挿入する。

use crate::error::Result;
use crate::html;
use crate::providers::{AnchorSuggester, CatalogLookup, LinkProposal};
use crate::types::CatalogEntry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const TITLE_WEIGHT: f64 = 10.0;
const TOPIC_WEIGHT: f64 = 5.0;
const CATEGORY_WEIGHT: f64 = 3.0;
const EXCERPT_WEIGHT: f64 = 2.0;

/// トピック一致の加点上限（件数）
const MAX_TOPIC_MATCHES: usize = 3;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "in", "on", "for", "and", "or", "with", "by", "at", "is",
    "are", "how", "what", "best", "top", "your", "guide", "vs",
];

/// リンカー設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// 挿入する最大リンク数
    pub max_links: usize,
    /// カタログから取得する候補数
    pub candidate_pool: usize,
    /// スコアに加えるランダム値の上限（同点時の偏りを避ける）
    pub jitter: f64,
    /// 挿入リンク間の最小距離（バイト）
    pub min_gap_chars: usize,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            max_links: 5,
            candidate_pool: 20,
            jitter: 0.5,
            min_gap_chars: 300,
        }
    }
}

/// スコア付き候補
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub entry: CatalogEntry,
    pub score: f64,
}

/// 挿入したリンク
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertedLink {
    pub anchor_text: String,
    pub url: String,
}

/// 挿入しなかった提案と理由
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedProposal {
    pub anchor_text: String,
    pub url: String,
    pub reason: String,
}

/// リンク挿入結果
#[derive(Debug, Clone, Default)]
pub struct LinkingOutcome {
    pub content: String,
    pub inserted: Vec<InsertedLink>,
    pub skipped: Vec<SkippedProposal>,
    pub candidates_considered: usize,
}

/// 内部リンカー
pub struct InternalLinker {
    catalog: Arc<dyn CatalogLookup>,
    suggester: Arc<dyn AnchorSuggester>,
    config: LinkerConfig,
    rng: Mutex<StdRng>,
}

impl InternalLinker {
    pub fn new(
        catalog: Arc<dyn CatalogLookup>,
        suggester: Arc<dyn AnchorSuggester>,
        config: LinkerConfig,
    ) -> Self {
        Self {
            catalog,
            suggester,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// 乱数シードを固定（テスト用）
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    fn jitter(&self) -> f64 {
        if self.config.jitter <= 0.0 {
            return 0.0;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0.0..self.config.jitter),
            Err(_) => 0.0,
        }
    }

    /// 候補記事をスコア順に選ぶ
    pub async fn select_candidates(
        &self,
        title: &str,
        keywords: &[String],
    ) -> Result<Vec<ScoredCandidate>> {
        let entries = self
            .catalog
            .relevant(title, keywords, self.config.candidate_pool)
            .await?;

        let mut scored: Vec<ScoredCandidate> = entries
            .into_iter()
            .map(|entry| {
                let score = score_candidate(&entry, title, keywords) + self.jitter();
                ScoredCandidate { entry, score }
            })
            .filter(|c| c.score >= 1.0)
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scored)
    }

    /// 本文に内部リンクを挿入
    pub async fn link(
        &self,
        content: &str,
        title: &str,
        keywords: &[String],
    ) -> Result<LinkingOutcome> {
        let existing: HashSet<String> = html::extract_links(content)
            .iter()
            .map(|l| link_key(&l.href))
            .collect();

        let candidates: Vec<CatalogEntry> = self
            .select_candidates(title, keywords)
            .await?
            .into_iter()
            .filter(|c| !existing.contains(&link_key(&c.entry.url)))
            .take(self.config.max_links.saturating_mul(2))
            .map(|c| c.entry)
            .collect();

        if candidates.is_empty() {
            debug!("No internal link candidates for \"{}\"", title);
            return Ok(LinkingOutcome {
                content: content.to_string(),
                ..LinkingOutcome::default()
            });
        }

        let proposals = self.suggester.suggest(content, &candidates).await?;
        let mut outcome = insert_links(
            content,
            &proposals,
            self.config.max_links,
            self.config.min_gap_chars,
        );
        outcome.candidates_considered = candidates.len();

        info!(
            "Inserted {} internal link(s) from {} candidate(s)",
            outcome.inserted.len(),
            outcome.candidates_considered
        );
        Ok(outcome)
    }
}

/// 候補の関連度（乱数なし）
pub fn score_candidate(entry: &CatalogEntry, title: &str, keywords: &[String]) -> f64 {
    let title_words = significant_words(title);
    let entry_title = entry.title.to_lowercase();
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

    let mut score = 0.0;

    if !title_words.is_empty() {
        let entry_words = significant_words(&entry.title);
        let shared = title_words.intersection(&entry_words).count();
        score += TITLE_WEIGHT * shared as f64 / title_words.len() as f64;
    }

    let topic_matches = entry
        .topics
        .iter()
        .map(|t| t.to_lowercase())
        .filter(|topic| {
            keywords
                .iter()
                .any(|k| k.contains(topic.as_str()) || topic.contains(k.as_str()))
                || title_words.contains(topic.as_str())
        })
        .count()
        .min(MAX_TOPIC_MATCHES);
    score += TOPIC_WEIGHT * topic_matches as f64;

    let category = entry.category.to_lowercase().replace(['-', '_'], " ");
    if !category.trim().is_empty() {
        let lowered_title = title.to_lowercase();
        if lowered_title.contains(category.trim())
            || keywords.iter().any(|k| k.contains(category.trim()))
        {
            score += CATEGORY_WEIGHT;
        }
    }

    let excerpt = entry.excerpt.to_lowercase();
    if !excerpt.is_empty() && keywords.iter().any(|k| excerpt.contains(k.as_str())) {
        score += EXCERPT_WEIGHT;
    }

    // 自分自身と同じタイトルの記事は候補にしない
    if entry_title.trim() == title.to_lowercase().trim() {
        return 0.0;
    }
    score
}

/// アンカー提案を本文に挿入
///
/// 同じURLへのリンクは1つまで。既存のアンカー・見出し・タグの内側には挿入せず、
/// 本文に存在しないテキストやURLそのもののアンカーは除外する。
pub fn insert_links(
    content: &str,
    proposals: &[LinkProposal],
    max_links: usize,
    min_gap_chars: usize,
) -> LinkingOutcome {
    let mut out = content.to_string();
    let mut linked: HashSet<String> = html::extract_links(content)
        .iter()
        .map(|l| link_key(&l.href))
        .collect();
    let mut positions: Vec<usize> = Vec::new();
    let mut inserted = Vec::new();
    let mut skipped = Vec::new();

    let mut skip = |proposal: &LinkProposal, reason: &str| {
        skipped.push(SkippedProposal {
            anchor_text: proposal.anchor_text.clone(),
            url: proposal.url.clone(),
            reason: reason.to_string(),
        });
    };

    for proposal in proposals {
        if inserted.len() >= max_links {
            skip(proposal, "link limit reached");
            continue;
        }
        let key = link_key(&proposal.url);
        if linked.contains(&key) {
            skip(proposal, "target already linked");
            continue;
        }
        let anchor = proposal.anchor_text.trim();
        if anchor.is_empty() || looks_like_url(anchor) {
            skip(proposal, "anchor is empty or a bare URL");
            continue;
        }

        let occurrences = html::find_all_in_text(&out, anchor, true);
        if occurrences.is_empty() {
            skip(proposal, "anchor text not found in content");
            continue;
        }
        let Some(range) = occurrences
            .into_iter()
            .find(|r| positions.iter().all(|&p| r.start.abs_diff(p) >= min_gap_chars))
        else {
            skip(proposal, "too close to another inserted link");
            continue;
        };

        let found_text = out[range.clone()].to_string();
        let markup = format!(
            "<a href=\"{}\">{}</a>",
            html::escape_text(&proposal.url),
            found_text
        );
        let delta = markup.len() - found_text.len();
        for p in positions.iter_mut() {
            if *p > range.start {
                *p += delta;
            }
        }
        out.replace_range(range.clone(), &markup);
        positions.push(range.start);
        linked.insert(key);
        inserted.push(InsertedLink {
            anchor_text: found_text,
            url: proposal.url.clone(),
        });
    }

    LinkingOutcome {
        content: out,
        inserted,
        skipped,
        candidates_considered: 0,
    }
}

/// 重複判定用のリンクキー（パス優先）
fn link_key(href: &str) -> String {
    html::link_path(href)
        .map(|p| html::normalize_path(&p))
        .unwrap_or_else(|| href.trim().to_lowercase())
}

fn looks_like_url(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("://")
        || lowered.starts_with("www.")
        || lowered.starts_with('/')
        || [".com", ".edu", ".org", ".gov", ".net"]
            .iter()
            .any(|tld| lowered.contains(tld))
}

fn significant_words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2 && !STOPWORDS.contains(w))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::{InMemoryCatalog, PhraseAnchorSuggester};

    fn entry(title: &str, url: &str, topics: &[&str], category: &str) -> CatalogEntry {
        CatalogEntry {
            title: title.to_string(),
            url: url.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            category: category.to_string(),
            excerpt: String::new(),
        }
    }

    fn proposal(anchor: &str, url: &str) -> LinkProposal {
        LinkProposal {
            anchor_text: anchor.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_score_weights() {
        let keywords = vec!["online mba".to_string()];
        let strong = entry(
            "Cheapest Online MBA Programs",
            "/online-mba/cheapest/",
            &["online mba"],
            "business",
        );
        let weak = entry("Nursing Careers", "/careers/nursing/", &["nursing"], "health");

        let strong_score = score_candidate(&strong, "Best Online MBA Programs", &keywords);
        // タイトル一致 3/3 → 10、トピック一致 5
        assert!((strong_score - 15.0).abs() < 1e-9);
        assert_eq!(score_candidate(&weak, "Best Online MBA Programs", &keywords), 0.0);
    }

    #[test]
    fn test_insert_respects_constraints() {
        let html = r#"<h2>Online MBA costs</h2><p>An online MBA can be affordable. See <a href="/rankings/">rankings</a> for more on rankings.</p>"#;
        let proposals = vec![
            proposal("online MBA", "/online-mba/"),
            proposal("online MBA", "/online-mba/"),
            proposal("rankings", "/rankings/"),
            proposal("https://example.edu/x", "/x/"),
            proposal("accredited schools", "/accredited/"),
        ];
        let outcome = insert_links(html, &proposals, 5, 0);

        assert_eq!(outcome.inserted.len(), 1);
        assert_eq!(outcome.inserted[0].anchor_text, "online MBA");
        // 見出し内ではなく本文に挿入
        assert!(outcome
            .content
            .contains(r#"<h2>Online MBA costs</h2><p>An <a href="/online-mba/">online MBA</a> can"#));
        let reasons: Vec<&str> = outcome.skipped.iter().map(|s| s.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec![
                "target already linked",
                "target already linked",
                "anchor is empty or a bare URL",
                "anchor text not found in content",
            ]
        );
    }

    #[test]
    fn test_min_gap_spreads_links() {
        let filler = "word ".repeat(100);
        let html = format!(
            "<p>Alpha beta gamma. {}</p><p>Delta epsilon.</p>",
            filler
        );
        let proposals = vec![
            proposal("Alpha", "/a/"),
            proposal("beta", "/b/"),
            proposal("Delta", "/d/"),
        ];
        let outcome = insert_links(&html, &proposals, 5, 200);
        let urls: Vec<&str> = outcome.inserted.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["/a/", "/d/"]);
        assert_eq!(outcome.skipped[0].reason, "too close to another inserted link");
    }

    #[test]
    fn test_link_limit() {
        let html = "<p>one two three four</p>";
        let proposals = vec![
            proposal("one", "/1/"),
            proposal("two", "/2/"),
            proposal("three", "/3/"),
        ];
        let outcome = insert_links(html, &proposals, 2, 0);
        assert_eq!(outcome.inserted.len(), 2);
        assert_eq!(outcome.skipped[0].reason, "link limit reached");
    }

    #[tokio::test]
    async fn test_link_end_to_end_with_catalog() {
        let catalog = Arc::new(InMemoryCatalog::new(vec![
            entry(
                "Cheapest Online MBA Programs",
                "https://example.edu/online-mba/cheapest/",
                &["online mba", "tuition"],
                "business",
            ),
            entry(
                "MBA Salary Guide",
                "https://example.edu/careers/mba-salary/",
                &["mba salary"],
                "business",
            ),
            entry("Nursing Careers", "https://example.edu/careers/nursing/", &["nursing"], "health"),
        ]));
        let linker = InternalLinker::new(
            catalog,
            Arc::new(PhraseAnchorSuggester::new()),
            LinkerConfig {
                min_gap_chars: 0,
                ..LinkerConfig::default()
            },
        )
        .with_seed(7);

        let html = "<h2>Overview</h2><p>Tuition for an online MBA varies widely. Graduates often see a higher MBA salary after finishing.</p>";
        let keywords = vec!["online mba".to_string(), "mba salary".to_string()];
        let outcome = linker
            .link(html, "Best Online MBA Programs", &keywords)
            .await
            .unwrap();

        let urls: HashSet<&str> = outcome.inserted.iter().map(|l| l.url.as_str()).collect();
        assert!(urls.contains("https://example.edu/online-mba/cheapest/"));
        assert!(urls.contains("https://example.edu/careers/mba-salary/"));
        assert!(!urls.contains("https://example.edu/careers/nursing/"));
        assert_eq!(html::extract_links(&outcome.content).len(), outcome.inserted.len());
        assert!(outcome.content.starts_with("<h2>Overview</h2>"));
    }
}
