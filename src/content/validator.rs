//! Content Validator
//!
//! 生成記事のヒューリスティック検証。
//!
//! - 途中切れ（ブロッキング）
//! - プレースホルダー・捏造コンテンツ（ブロッキング）
//! - 出典のない統計（警告）
//! - 検証されていない法令参照（警告）
//! - 未知の教育機関名（警告）
//! - 内部リンクの有効性（警告）
//!
//! 途中切れ判定は誤検知を避けるため保守的に行う。

use crate::cache::InstitutionDirectory;
use crate::html;
use crate::providers::CatalogLookup;
use crate::rules::RulesConfig;
use crate::types::{
    Faq, IssueType, KnownInstitution, RiskLevel, Severity, ValidationIssue, ValidationMetrics,
    ValidationResult,
};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// 文末の機能語（これで終わり、句読点がなければ途中切れとみなす）
const DANGLING_WORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "in", "on", "at", "by", "for", "and", "or", "but", "nor", "as",
    "is", "are", "was", "if", "so", "its", "our", "via", "per", "yet",
];

/// FAQ回答の最小長（これ未満かつ句読点なしで途中切れ）
const MIN_FAQ_ANSWER_CHARS: usize = 20;

/// 出典判定の近傍幅（文字数）
const CITATION_WINDOW: usize = 50;

static BLOCK_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</(?:p|li|ul|ol|h[1-6]|div|section|article|table|tbody|thead|tr|td|th|blockquote|figure|figcaption|details|summary|dl|dd|dt|aside|pre)\s*>$",
    )
    .expect("block close regex")
});

static ENTITY_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#?[A-Za-z0-9]{0,10}$").expect("entity regex"));

/// University A, College B
static LETTER_INSTITUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:University|College|School|Institute|Institution|Academy)\s+([A-Z])\b")
        .expect("letter institution regex")
});

/// 伏せ字の直後に来てよい接続語
const PLACEHOLDER_CONNECTIVES: &[&str] = &["and", "or", "nor", "vs", "versus"];

static PLACEHOLDER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // [School Name], [Link Here]
        r"\[[A-Z][A-Za-z ]{0,40}(?:Name|NAME|Here|HERE)\]",
        r"(?i)\[(?:todo|tbd|tba|citation needed|source needed|insert[^\]\n]{0,40}|placeholder[^\]\n]{0,40})\]",
        r"(?i)\blorem\s+ipsum\b",
        r"\{\{\s*[A-Za-z_][A-Za-z0-9_ .]*\}\}",
        r"\b(?:XYZ|ABC|Example|Sample|Generic)\s+(?:University|College|School|Institute)\b",
        r"\b(?:TODO|TBD|FIXME):",
        r"\$X[X,]*\b",
        r"\bX{2,}%",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("placeholder regex"))
    .collect()
});

static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{1,3}(?:\.\d+)?\s?(?:%|percent\b)").expect("percent regex")
});

static STUDY_CLAIM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:survey|study|report|poll|research|analysis)\s+(?:found|finds|shows?|showed|revealed|reveals|indicates?|suggests?)\b",
    )
    .expect("study claim regex")
});

static LEGISLATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(?:HB|SB|AB|HR|H\.R\.|H\.B\.|S\.B\.)\s?\d{1,5}\b",
        r"(?i)\bexecutive\s+order\s+(?:no\.\s*)?\d{4,6}\b",
        r"(?i)\bpublic\s+law\s+\d{2,3}-\d{1,4}\b",
        r"\b(?:[A-Z][A-Za-z'-]+\s+){1,6}Act(?:\s+of\s+\d{4})?\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("legislation regex"))
    .collect()
});

static INSTITUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:[A-Z][A-Za-z&'.-]*\s+){0,5}(?:University|College|Institute)(?:\s+of(?:\s+(?:the\s+)?[A-Z][A-Za-z&'.-]*){1,4})?",
    )
    .expect("institution regex")
});

/// 機関名の先頭から取り除く語（文頭語・一般的な修飾語）
const LEADING_NOISE: &[&str] = &[
    "The", "A", "An", "In", "At", "From", "For", "Many", "Some", "Most", "Each", "Every", "Our",
    "Your", "This", "That", "These", "Those", "Why", "How", "What", "When", "While", "If", "Top",
    "Best", "Online", "Affordable", "Accredited", "Private", "Public", "Community", "Local",
    "Nonprofit", "For-Profit",
];

/// 実施する検証の組み合わせ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckSet {
    pub truncation: bool,
    pub placeholders: bool,
    pub statistics: bool,
    pub legislation: bool,
    pub institutions: bool,
    pub internal_links: bool,
}

impl CheckSet {
    /// 全検証
    pub fn all() -> Self {
        Self {
            truncation: true,
            placeholders: true,
            statistics: true,
            legislation: true,
            institutions: true,
            internal_links: true,
        }
    }

    /// ブロッキング検証（途中切れ・プレースホルダー）のみ
    pub fn blocking_only() -> Self {
        Self {
            truncation: true,
            placeholders: true,
            statistics: false,
            legislation: false,
            institutions: false,
            internal_links: false,
        }
    }
}

impl Default for CheckSet {
    fn default() -> Self {
        Self::all()
    }
}

/// 検証オプション
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub checks: CheckSet,
    /// FAQ（回答の途中切れ判定に使う）
    pub faqs: Vec<Faq>,
    /// 適用するルール設定
    pub rules: Arc<RulesConfig>,
}

impl ValidationOptions {
    /// 全検証
    pub fn full(faqs: &[Faq], rules: Arc<RulesConfig>) -> Self {
        Self {
            checks: CheckSet::all(),
            faqs: faqs.to_vec(),
            rules,
        }
    }

    /// ブロッキング検証のみ
    pub fn blocking(faqs: &[Faq], rules: Arc<RulesConfig>) -> Self {
        Self {
            checks: CheckSet::blocking_only(),
            faqs: faqs.to_vec(),
            rules,
        }
    }
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            checks: CheckSet::all(),
            faqs: Vec::new(),
            rules: Arc::new(RulesConfig::default()),
        }
    }
}

/// 途中切れ判定結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TruncationCheck {
    pub is_truncated: bool,
    pub reasons: Vec<String>,
}

/// プレースホルダー検出結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceholderCheck {
    pub has_placeholders: bool,
    /// 検出したテキスト（出現順・重複なし）
    pub matches: Vec<String>,
}

/// 内部リンク検証結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkCheck {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

/// コンテンツバリデーター
pub struct ContentValidator {
    site_domain: String,
    institutions: Option<Arc<InstitutionDirectory>>,
    catalog: Option<Arc<dyn CatalogLookup>>,
}

impl ContentValidator {
    /// 新規バリデーターを作成
    pub fn new(site_domain: impl Into<String>) -> Self {
        Self {
            site_domain: site_domain.into(),
            institutions: None,
            catalog: None,
        }
    }

    /// 既知の教育機関ディレクトリを設定
    pub fn with_institutions(mut self, directory: Arc<InstitutionDirectory>) -> Self {
        self.institutions = Some(directory);
        self
    }

    /// リンク解決用カタログを設定
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogLookup>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn site_domain(&self) -> &str {
        &self.site_domain
    }

    /// コンテンツを検証
    pub async fn validate(&self, content: &str, options: &ValidationOptions) -> ValidationResult {
        let checks = options.checks;
        let rules = &options.rules;
        let mut blocking_issues = Vec::new();
        let mut warnings = Vec::new();

        if checks.truncation {
            let truncation = check_truncation(content, &options.faqs);
            if truncation.is_truncated {
                blocking_issues.push(
                    ValidationIssue::new(
                        IssueType::Truncation,
                        Severity::Critical,
                        "Content appears to be truncated",
                    )
                    .with_evidence(truncation.reasons),
                );
            }
        }

        if checks.placeholders {
            let placeholders = detect_placeholders(content);
            if placeholders.has_placeholders {
                blocking_issues.push(
                    ValidationIssue::new(
                        IssueType::PlaceholderContent,
                        Severity::Critical,
                        format!(
                            "Found {} placeholder or fabricated reference(s)",
                            placeholders.matches.len()
                        ),
                    )
                    .with_evidence(placeholders.matches),
                );
            }
        }

        if checks.statistics {
            let claims = find_unverified_statistics(content, &rules.citation_markers);
            if !claims.is_empty() {
                warnings.push(
                    ValidationIssue::new(
                        IssueType::UnverifiedStatistic,
                        Severity::Warning,
                        format!("{} statistic(s) without a nearby citation", claims.len()),
                    )
                    .with_evidence(claims),
                );
            }
        }

        if checks.legislation {
            let references = find_unverified_legislation(content, &rules.legislation_markers);
            if !references.is_empty() {
                warnings.push(
                    ValidationIssue::new(
                        IssueType::UnverifiedLegislation,
                        Severity::Warning,
                        format!(
                            "{} legislation reference(s) need verification",
                            references.len()
                        ),
                    )
                    .with_evidence(references),
                );
            }
        }

        if checks.institutions {
            if let Some(issue) = self.check_institutions(content).await {
                warnings.push(issue);
            }
        }

        let mut metrics = ValidationMetrics {
            word_count: html::word_count(content),
            internal_link_count: 0,
            invalid_link_count: 0,
        };

        if checks.internal_links {
            let links = self.check_internal_links(content, rules).await;
            metrics.internal_link_count = links.valid.len() + links.invalid.len();
            metrics.invalid_link_count = links.invalid.len();

            if !links.invalid.is_empty() {
                warnings.push(
                    ValidationIssue::new(
                        IssueType::InvalidInternalLink,
                        Severity::Major,
                        format!(
                            "{} internal link(s) do not resolve to a known page",
                            links.invalid.len()
                        ),
                    )
                    .with_evidence(links.invalid.clone()),
                );
            }
            if links.valid.len() < rules.min_valid_internal_links {
                warnings.push(ValidationIssue::new(
                    IssueType::InsufficientInternalLinks,
                    Severity::Minor,
                    format!(
                        "Only {} valid internal links; at least {} expected",
                        links.valid.len(),
                        rules.min_valid_internal_links
                    ),
                ));
            }
        }

        let risk_level = rollup_risk(&blocking_issues, &warnings);
        let is_blocked = !blocking_issues.is_empty();
        debug!(
            "Validation finished: blocked={}, warnings={}, risk={}",
            is_blocked,
            warnings.len(),
            risk_level
        );

        ValidationResult {
            is_blocked,
            requires_review: is_blocked || !warnings.is_empty(),
            risk_level,
            blocking_issues,
            warnings,
            metrics,
        }
    }

    /// 未知の教育機関名を検出
    async fn check_institutions(&self, content: &str) -> Option<ValidationIssue> {
        let directory = match &self.institutions {
            Some(directory) => directory,
            None => {
                debug!("No institution directory configured, skipping institution check");
                return None;
            }
        };

        let names = extract_institution_names(content);
        if names.is_empty() {
            return None;
        }

        let known = match directory.known().await {
            Ok(known) => known,
            Err(e) => {
                warn!("Institution list unavailable, skipping check: {}", e);
                return None;
            }
        };

        let unknown: Vec<String> = names
            .into_iter()
            .filter(|name| !institution_is_known(name, &known))
            .collect();

        if unknown.is_empty() {
            None
        } else {
            Some(
                ValidationIssue::new(
                    IssueType::UnknownInstitution,
                    Severity::Major,
                    format!("{} institution name(s) could not be verified", unknown.len()),
                )
                .with_evidence(unknown),
            )
        }
    }

    /// サイト内リンクを検証
    pub async fn check_internal_links(&self, content: &str, rules: &RulesConfig) -> LinkCheck {
        let mut result = LinkCheck::default();
        let prefixes: Vec<String> = rules
            .structural_link_prefixes
            .iter()
            .map(|p| html::normalize_path(p))
            .collect();

        for link in html::extract_links(content) {
            if !html::is_internal_href(&link.href, &self.site_domain) {
                continue;
            }
            let path = match html::link_path(&link.href) {
                Some(path) => html::normalize_path(&path),
                None => {
                    result.invalid.push(link.href);
                    continue;
                }
            };

            let structural = prefixes
                .iter()
                .any(|prefix| path == *prefix || path.starts_with(&format!("{}/", prefix)));
            if structural {
                result.valid.push(link.href);
                continue;
            }

            match &self.catalog {
                Some(catalog) => match catalog.resolve(&link.href).await {
                    Ok(Some(_)) => result.valid.push(link.href),
                    Ok(None) => result.invalid.push(link.href),
                    Err(e) => {
                        // 照合できないリンクは無効扱いにしない
                        warn!("Catalog lookup failed for {}: {}", link.href, e);
                        result.valid.push(link.href);
                    }
                },
                None => result.invalid.push(link.href),
            }
        }

        result
    }
}

/// 途中切れを判定
pub fn check_truncation(content: &str, faqs: &[Faq]) -> TruncationCheck {
    let mut reasons = Vec::new();
    let trimmed = content.trim_end();

    if html::strip_tags(trimmed).is_empty() {
        reasons.push("Content is empty".to_string());
    } else if let Some(reason) = content_truncation(trimmed) {
        reasons.push(reason);
    }

    for faq in faqs {
        let answer = faq.answer.trim();
        if !answer.is_empty()
            && answer.chars().count() < MIN_FAQ_ANSWER_CHARS
            && !ends_with_terminal(answer)
        {
            reasons.push(format!(
                "FAQ answer for \"{}\" appears cut off: \"{}\"",
                faq.question.trim(),
                answer
            ));
        }
    }

    TruncationCheck {
        is_truncated: !reasons.is_empty(),
        reasons,
    }
}

fn content_truncation(trimmed: &str) -> Option<String> {
    if let Some(lt) = trimmed.rfind('<') {
        if !trimmed[lt..].contains('>') {
            return Some("Content ends inside an HTML tag".to_string());
        }
    }

    if BLOCK_CLOSE_RE.is_match(trimmed) {
        return None;
    }

    if ENTITY_TAIL_RE.is_match(trimmed) {
        return Some("Content ends inside an HTML entity".to_string());
    }

    let text = html::strip_tags(trimmed);
    if ends_with_terminal(&text) {
        return None;
    }

    let last_word = text
        .split_whitespace()
        .last()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .unwrap_or_default();

    if !last_word.is_empty()
        && last_word.chars().count() <= 3
        && DANGLING_WORDS.contains(&last_word.as_str())
    {
        return Some(format!(
            "Content ends on dangling word \"{}\" without punctuation",
            last_word
        ));
    }

    None
}

fn ends_with_terminal(text: &str) -> bool {
    let stripped = text
        .trim_end()
        .trim_end_matches(['"', '\'', '\u{201d}', '\u{2019}', ')', ']']);
    stripped.ends_with(['.', '!', '?'])
}

/// プレースホルダー・捏造された参照を検出
pub fn detect_placeholders(content: &str) -> PlaceholderCheck {
    let text = html::strip_tags(content);
    let mut matches: Vec<(usize, String)> = Vec::new();
    let mut seen = HashSet::new();

    for caps in LETTER_INSTITUTION_RE.captures_iter(&text) {
        let (Some(m), Some(letter)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !is_letter_placeholder(letter.as_str(), &text[m.end()..]) {
            continue;
        }
        let found = m.as_str().to_string();
        if seen.insert(found.clone()) {
            matches.push((m.start(), found));
        }
    }

    for pattern in PLACEHOLDER_PATTERNS.iter() {
        for m in pattern.find_iter(&text) {
            let found = m.as_str().to_string();
            if seen.insert(found.clone()) {
                matches.push((m.start(), found));
            }
        }
    }

    matches.sort_by_key(|(start, _)| *start);
    let matches: Vec<String> = matches.into_iter().map(|(_, m)| m).collect();

    PlaceholderCheck {
        has_placeholders: !matches.is_empty(),
        matches,
    }
}

/// "University A" 形式の一致が伏せ字かどうか
///
/// 伏せ字とみなすのは、文字の後が文末・句読点・接続語（and, or など）の場合のみ。
/// 代名詞の "I"、"U.S." のような略語、"A to Z" のような語句は除外する。
fn is_letter_placeholder(letter: &str, rest: &str) -> bool {
    if letter == "I" {
        return false;
    }

    let mut rest_chars = rest.chars();
    if rest_chars.next() == Some('.') && rest_chars.next().is_some_and(|c| c.is_ascii_alphabetic())
    {
        return false;
    }

    let rest = rest.trim_start_matches([' ', '\t']);
    let Some(first) = rest.chars().next() else {
        return true;
    };
    if first == '\n' || first.is_ascii_punctuation() {
        return true;
    }

    let next_word: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    PLACEHOLDER_CONNECTIVES.contains(&next_word.as_str())
}

/// 出典のない統計的主張を検出
pub fn find_unverified_statistics(content: &str, markers: &[String]) -> Vec<String> {
    let text = html::text_with_hrefs(content);
    let lowered_markers = lowercase_all(markers);
    let mut flagged = Vec::new();

    let mut claims: Vec<(usize, usize)> = PERCENT_RE
        .find_iter(&text)
        .chain(STUDY_CLAIM_RE.find_iter(&text))
        .map(|m| (m.start(), m.end()))
        .collect();
    claims.sort_unstable();

    for (start, end) in merge_claim_ranges(claims, CITATION_WINDOW) {
        let window = window_around(&text, start, end, CITATION_WINDOW);
        if has_marker(window, &lowered_markers) {
            continue;
        }
        let evidence = window.trim().to_string();
        if !flagged.contains(&evidence) {
            flagged.push(evidence);
        }
    }

    flagged
}

/// 近傍ウィンドウが重なる主張の範囲を1つにまとめる（開始位置でソート済みの入力）
fn merge_claim_ranges(claims: Vec<(usize, usize)>, radius: usize) -> Vec<(usize, usize)> {
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(claims.len());
    for (start, end) in claims {
        match merged.last_mut() {
            Some(last) if start <= last.1.saturating_add(radius.saturating_mul(2)) => {
                last.1 = last.1.max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// 検証されていない法令参照を検出
pub fn find_unverified_legislation(content: &str, markers: &[String]) -> Vec<String> {
    let text = html::text_with_hrefs(content);
    let lowered_markers = lowercase_all(markers);
    let mut flagged = Vec::new();

    for pattern in LEGISLATION_PATTERNS.iter() {
        for m in pattern.find_iter(&text) {
            let reference = strip_leading_noise(m.as_str());
            // "The Act" のような一般名詞は除外
            if reference.is_empty() || reference == "Act" {
                continue;
            }
            let window = window_around(&text, m.start(), m.end(), CITATION_WINDOW);
            if has_marker(window, &lowered_markers) {
                continue;
            }
            if !flagged.contains(&reference) {
                flagged.push(reference);
            }
        }
    }

    flagged
}

/// 本文中の教育機関名を抽出（出現順・重複なし）
pub fn extract_institution_names(content: &str) -> Vec<String> {
    let text = html::strip_tags(content);
    let mut names: Vec<String> = Vec::new();

    for m in INSTITUTION_RE.find_iter(&text) {
        let name = strip_leading_noise(m.as_str().trim());
        if matches!(name.as_str(), "University" | "College" | "Institute" | "") {
            continue;
        }
        if !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            names.push(name);
        }
    }

    names
}

/// 既知リストに一致するか（大文字小文字無視・語の重なりによるあいまい一致）
pub fn institution_is_known(name: &str, known: &[KnownInstitution]) -> bool {
    let normalized = normalize_name(name);
    let candidate_words = significant_words(name);

    known.iter().any(|institution| {
        std::iter::once(&institution.name)
            .chain(institution.aliases.iter())
            .any(|known_name| {
                let known_normalized = normalize_name(known_name);
                if known_normalized == normalized {
                    return true;
                }
                let known_words = significant_words(known_name);
                if known_words.is_empty() || candidate_words.is_empty() {
                    return false;
                }
                // 既知名の語がすべて含まれる、または候補の語の8割以上が既知名に含まれる
                let shared = candidate_words.intersection(&known_words).count();
                known_words.is_subset(&candidate_words)
                    || (shared as f64 / candidate_words.len() as f64) >= 0.8
            })
    })
}

/// 検証結果からリスクレベルを集約
pub fn rollup_risk(blocking: &[ValidationIssue], warnings: &[ValidationIssue]) -> RiskLevel {
    if !blocking.is_empty() {
        return RiskLevel::Critical;
    }

    let has_statistics = warnings
        .iter()
        .any(|w| w.issue_type == IssueType::UnverifiedStatistic);
    let has_legislation = warnings
        .iter()
        .any(|w| w.issue_type == IssueType::UnverifiedLegislation);

    if warnings.iter().any(|w| w.severity >= Severity::Major) || (has_statistics && has_legislation)
    {
        RiskLevel::High
    } else if warnings.len() >= 2 || has_statistics || has_legislation {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn strip_leading_noise(phrase: &str) -> String {
    let mut words: Vec<&str> = phrase.split_whitespace().collect();
    while words.len() > 1 && LEADING_NOISE.contains(&words[0]) {
        words.remove(0);
    }
    words.join(" ")
}

fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '&' { c } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let words = match words.first() {
        Some(&"the") => &words[1..],
        _ => &words[..],
    };
    words.join(" ")
}

fn significant_words(name: &str) -> HashSet<String> {
    const GENERIC: &[&str] = &[
        "university", "college", "institute", "of", "the", "and", "at", "in", "for",
    ];
    normalize_name(name)
        .split_whitespace()
        .filter(|w| w.len() >= 2 && !GENERIC.contains(w))
        .map(String::from)
        .collect()
}

fn lowercase_all(markers: &[String]) -> Vec<String> {
    markers.iter().map(|m| m.to_lowercase()).collect()
}

fn has_marker(window: &str, lowered_markers: &[String]) -> bool {
    let lowered = window.to_lowercase();
    lowered_markers.iter().any(|m| lowered.contains(m.as_str()))
}

/// `[start, end)` の前後 `radius` バイトを文字境界に合わせて切り出す
fn window_around(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let mut from = start.saturating_sub(radius);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + radius).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    &text[from..to]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::{InMemoryCatalog, StaticInstitutions};
    use crate::types::CatalogEntry;
    use std::time::Duration;

    fn markers() -> Vec<String> {
        RulesConfig::default().citation_markers
    }

    #[test]
    fn test_well_formed_endings_are_not_truncated() {
        for html in [
            "<p>Online MBA programs continue to grow.</p>",
            "<ul><li>Flexible schedule</li>",
            "<h2>Conclusion</h2>",
            "<p>Is it worth it?</p>\n",
            "<p>Apply today!</p>",
        ] {
            let check = check_truncation(html, &[]);
            assert!(!check.is_truncated, "{} flagged: {:?}", html, check.reasons);
        }
    }

    #[test]
    fn test_truncation_patterns_are_detected() {
        assert!(check_truncation("<p>The program costs less than the", &[]).is_truncated);
        assert!(check_truncation("<p>Tuition details are <a href=\"/x", &[]).is_truncated);
        assert!(check_truncation("<p>Tuition &amp", &[]).is_truncated);
        assert!(check_truncation("   ", &[]).is_truncated);
    }

    #[test]
    fn test_unpunctuated_non_function_word_is_not_flagged() {
        // 保守的判定：機能語以外で終わる場合は途中切れとしない
        assert!(!check_truncation("<p>Tuition starts at $500 per credit hour", &[]).is_truncated);
    }

    #[test]
    fn test_short_faq_answer_without_punctuation_is_truncated() {
        let faqs = vec![
            Faq::new("How long is the program?", "Most students fin"),
            Faq::new("Is it accredited?", "Yes."),
        ];
        let check = check_truncation("<p>Complete article.</p>", &faqs);
        assert!(check.is_truncated);
        assert_eq!(check.reasons.len(), 1);
        assert!(check.reasons[0].contains("Most students fin"));
    }

    #[test]
    fn test_placeholder_detection_captures_all_matches() {
        let html = "<p>...the ranking methodology used by University A and University B...</p>";
        let check = detect_placeholders(html);
        assert!(check.has_placeholders);
        assert_eq!(check.matches, vec!["University A", "University B"]);
    }

    #[test]
    fn test_placeholder_variants() {
        let html = "<p>Contact [School Name] about [TODO] items. Lorem ipsum dolor. {{ program_name }} costs $XX,XXX at XYZ University.</p>";
        let check = detect_placeholders(html);
        assert!(check.matches.contains(&"[School Name]".to_string()));
        assert!(check.matches.contains(&"[TODO]".to_string()));
        assert!(check.matches.contains(&"Lorem ipsum".to_string()));
        assert!(check.matches.contains(&"{{ program_name }}".to_string()));
        assert!(check.matches.contains(&"XYZ University".to_string()));
        assert!(check.matches.iter().any(|m| m.starts_with("$XX")));
    }

    #[test]
    fn test_real_names_are_not_placeholders() {
        let html = "<p>Arizona State University and the University of Florida offer online MBAs.</p>";
        assert!(!detect_placeholders(html).has_placeholders);

        let pronoun = "<p>At Boston College I learned how to manage a team.</p>";
        assert!(!detect_placeholders(pronoun).has_placeholders);

        let phrase = "<h2>Online College A to Z</h2><p>Everything you need to know.</p>";
        assert!(!detect_placeholders(phrase).has_placeholders);

        let abbreviation = "<p>Rankings from School U.S. News are updated yearly.</p>";
        assert!(!detect_placeholders(abbreviation).has_placeholders);
    }

    #[test]
    fn test_letter_placeholders_before_punctuation_or_conjunction() {
        let html = "<p>Tuition at College C, which is online, beats Institute D. Compare School E or School F.</p>";
        let check = detect_placeholders(html);
        assert_eq!(
            check.matches,
            vec!["College C", "Institute D", "School E", "School F"]
        );
    }

    #[test]
    fn test_statistics_need_nearby_citation() {
        let cited = "<p>Employment is projected to grow 8% through 2032, according to the BLS.</p>";
        assert!(find_unverified_statistics(cited, &markers()).is_empty());

        let linked = r#"<p>Enrollment rose 12% (<a href="https://nces.ed.gov/fastfacts/">data</a>).</p>"#;
        assert!(find_unverified_statistics(linked, &markers()).is_empty());

        let uncited = "<p>A recent survey found that 73% of graduates earned a promotion within a year of finishing their degree.</p>";
        let flagged = find_unverified_statistics(uncited, &markers());
        assert_eq!(flagged.len(), 1);
        assert!(flagged[0].contains("survey found"));
        assert!(flagged[0].contains("73%"));
    }

    #[test]
    fn test_distant_claims_are_flagged_separately() {
        let filler = "Students balance coursework with full-time jobs and family. ".repeat(4);
        let html = format!(
            "<p>Roughly 40% of learners study part time. {}Another 25% finish within two years.</p>",
            filler
        );
        let flagged = find_unverified_statistics(&html, &markers());
        assert_eq!(flagged.len(), 2);
        assert!(flagged[0].contains("40%"));
        assert!(flagged[1].contains("25%"));
    }

    #[test]
    fn test_merge_claim_ranges() {
        let merged = merge_claim_ranges(vec![(0, 12), (20, 23), (300, 305)], 50);
        assert_eq!(merged, vec![(0, 23), (300, 305)]);
    }

    #[test]
    fn test_legislation_references() {
        let html = "<p>Under HB 1234 and Executive Order 14110, schools must disclose outcomes. The Higher Education Act of 1965 also applies.</p>";
        let flagged = find_unverified_legislation(html, &RulesConfig::default().legislation_markers);
        assert!(flagged.contains(&"HB 1234".to_string()));
        assert!(flagged.contains(&"Executive Order 14110".to_string()));
        assert!(flagged.contains(&"Higher Education Act of 1965".to_string()));

        let verified = r#"<p>HB 1234 was signed into law in 2023.</p>"#;
        assert!(
            find_unverified_legislation(verified, &RulesConfig::default().legislation_markers)
                .is_empty()
        );
    }

    #[test]
    fn test_extract_institution_names() {
        let html = "<p>The University of Florida, Arizona State University and Massachusetts Institute of Technology lead. Many online College options exist.</p>";
        let names = extract_institution_names(html);
        assert_eq!(
            names,
            vec![
                "University of Florida",
                "Arizona State University",
                "Massachusetts Institute of Technology"
            ]
        );
    }

    #[test]
    fn test_institution_fuzzy_matching() {
        let known = vec![
            KnownInstitution::new("Arizona State University").with_aliases(["ASU"]),
            KnownInstitution::new("Purdue University Global"),
        ];
        assert!(institution_is_known("arizona state university", &known));
        assert!(institution_is_known("The Arizona State University", &known));
        assert!(institution_is_known("Purdue Global University", &known));
        assert!(institution_is_known("Choose Arizona State University", &known));
        assert!(!institution_is_known("Westbrook Valley University", &known));
    }

    #[test]
    fn test_rollup_rules() {
        let stat = ValidationIssue::new(IssueType::UnverifiedStatistic, Severity::Warning, "s");
        let law = ValidationIssue::new(IssueType::UnverifiedLegislation, Severity::Warning, "l");
        let minor = ValidationIssue::new(IssueType::InsufficientInternalLinks, Severity::Minor, "m");
        let major = ValidationIssue::new(IssueType::UnknownInstitution, Severity::Major, "u");
        let block = ValidationIssue::new(IssueType::Truncation, Severity::Critical, "t");

        assert_eq!(rollup_risk(&[], &[]), RiskLevel::Low);
        assert_eq!(rollup_risk(&[], &[minor.clone()]), RiskLevel::Low);
        assert_eq!(rollup_risk(&[], &[stat.clone()]), RiskLevel::Medium);
        assert_eq!(rollup_risk(&[], &[minor.clone(), minor.clone()]), RiskLevel::Medium);
        assert_eq!(rollup_risk(&[], &[stat, law]), RiskLevel::High);
        assert_eq!(rollup_risk(&[], &[major]), RiskLevel::High);
        assert_eq!(rollup_risk(&[block], &[]), RiskLevel::Critical);
    }

    #[tokio::test]
    async fn test_blocking_issue_always_critical() {
        let validator = ContentValidator::new("example.edu");
        let html = "<h2>Overview</h2><p>Clean prose with an 8% figure from BLS data. Rankings by University A are";
        let result = validator.validate(html, &ValidationOptions::default()).await;

        assert!(result.is_blocked);
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert!(result.has_issue(IssueType::Truncation));
        assert!(result.has_issue(IssueType::PlaceholderContent));
    }

    #[tokio::test]
    async fn test_internal_link_validation() {
        let catalog = Arc::new(InMemoryCatalog::new(vec![CatalogEntry {
            title: "Cheapest Online MBA Programs".to_string(),
            url: "https://example.edu/online-mba/cheapest/".to_string(),
            ..CatalogEntry::default()
        }]));
        let validator = ContentValidator::new("example.edu").with_catalog(catalog);
        let html = r#"<p>See <a href="/online-mba/cheapest">cheap MBAs</a>, <a href="/rankings/mba/">rankings</a>, <a href="/made-up-page/">this</a> and <a href="https://bls.gov">BLS</a>.</p>"#;

        let links = validator
            .check_internal_links(html, &RulesConfig::default())
            .await;
        assert_eq!(links.valid.len(), 2);
        assert_eq!(links.invalid, vec!["/made-up-page/".to_string()]);

        let result = validator.validate(html, &ValidationOptions::default()).await;
        assert_eq!(result.metrics.internal_link_count, 3);
        assert_eq!(result.metrics.invalid_link_count, 1);
        assert!(result.has_issue(IssueType::InvalidInternalLink));
        assert!(result.has_issue(IssueType::InsufficientInternalLinks));
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!(!result.is_blocked);
    }

    #[tokio::test]
    async fn test_unknown_institutions_are_warned() {
        let lookup = Arc::new(StaticInstitutions::new(vec![KnownInstitution::new(
            "Arizona State University",
        )]));
        let directory = Arc::new(InstitutionDirectory::new(lookup, Duration::from_secs(300)));
        let validator = ContentValidator::new("example.edu").with_institutions(directory);

        let html = "<p>Arizona State University and Northfield Crest University both offer programs.</p>";
        let options = ValidationOptions {
            checks: CheckSet {
                institutions: true,
                ..CheckSet::blocking_only()
            },
            ..ValidationOptions::default()
        };
        let result = validator.validate(html, &options).await;

        let issue = result
            .warnings
            .iter()
            .find(|w| w.issue_type == IssueType::UnknownInstitution)
            .expect("unknown institution warning");
        assert_eq!(issue.evidence, vec!["Northfield Crest University".to_string()]);
    }
}
