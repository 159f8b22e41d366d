//! HTML text utilities
//!
//! 記事HTMLを扱う軽量ヘルパー（完全なパーサーではなく、生成記事の整形済みマークアップ前提）

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;
use url::Url;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h([1-6])(\s[^>]*)?>(.*?)</h[1-6]\s*>").expect("heading regex")
});

static ID_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bid\s*=\s*["']([^"']*)["']"#).expect("id regex"));

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#)
        .expect("link regex")
});

static ANCHOR_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>"#).expect("anchor regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// 見出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub id: Option<String>,
    /// タグを除いたテキスト
    pub text: String,
    /// 元のマークアップ
    pub raw: String,
    pub start: usize,
    pub end: usize,
}

/// アンカーリンク
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub text: String,
    pub raw: String,
    pub start: usize,
    pub end: usize,
}

/// タグを除去してプレーンテキストにする
pub fn strip_tags(html: &str) -> String {
    let without_tags = TAG_RE.replace_all(html, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}

/// リンク先URLを本文中に残したままタグを除去する
///
/// 出典判定でhref（例: bls.gov）を近傍テキストとして扱うため。
pub fn text_with_hrefs(html: &str) -> String {
    let inlined = ANCHOR_OPEN_RE.replace_all(html, " $1 ");
    strip_tags(&inlined)
}

/// よく使われるHTMLエンティティをデコード
pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&rsquo;", "'")
        .replace("&lsquo;", "'")
        .replace("&rdquo;", "\"")
        .replace("&ldquo;", "\"")
        .replace("&mdash;", "-")
        .replace("&ndash;", "-")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// テキストをHTMLエスケープ
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// 語数
pub fn word_count(html: &str) -> usize {
    strip_tags(html).split_whitespace().count()
}

/// 文に分割
pub fn sentences(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = match chars.peek() {
                None => true,
                Some(next) => next.is_whitespace(),
            };
            if at_boundary {
                let sentence = current.trim();
                if !sentence.is_empty() {
                    result.push(sentence.to_string());
                }
                current.clear();
            }
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        result.push(tail.to_string());
    }
    result
}

/// 平均文長（語数）
pub fn avg_sentence_length(html: &str) -> f64 {
    let text = strip_tags(html);
    let sentences = sentences(&text);
    if sentences.is_empty() {
        return 0.0;
    }
    let words: usize = sentences
        .iter()
        .map(|s| s.split_whitespace().count())
        .sum();
    words as f64 / sentences.len() as f64
}

/// 見出しを抽出
pub fn extract_headings(html: &str) -> Vec<Heading> {
    HEADING_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let level = caps.get(1)?.as_str().parse::<u8>().ok()?;
            let id = caps
                .get(2)
                .and_then(|attrs| ID_ATTR_RE.captures(attrs.as_str()))
                .and_then(|id_caps| id_caps.get(1))
                .map(|m| m.as_str().to_string());
            let inner = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            Some(Heading {
                level,
                id,
                text: strip_tags(inner),
                raw: whole.as_str().to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// アンカーリンクを抽出
pub fn extract_links(html: &str) -> Vec<Link> {
    LINK_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Link {
                href: caps.get(1)?.as_str().trim().to_string(),
                text: strip_tags(caps.get(2).map(|m| m.as_str()).unwrap_or("")),
                raw: whole.as_str().to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// アンカー要素が占めるバイト範囲
pub fn anchor_ranges(html: &str) -> Vec<Range<usize>> {
    extract_links(html).into_iter().map(|l| l.start..l.end).collect()
}

/// 見出し要素が占めるバイト範囲
pub fn heading_ranges(html: &str) -> Vec<Range<usize>> {
    extract_headings(html)
        .into_iter()
        .map(|h| h.start..h.end)
        .collect()
}

/// タグ自体（`<...>`）が占めるバイト範囲
pub fn tag_ranges(html: &str) -> Vec<Range<usize>> {
    TAG_RE.find_iter(html).map(|m| m.range()).collect()
}

/// 範囲 `span` がいずれかの保護範囲と重なるか
pub fn overlaps_any(span: &Range<usize>, protected: &[Range<usize>]) -> bool {
    protected
        .iter()
        .any(|r| span.start < r.end && r.start < span.end)
}

/// 見出しテキストからid用のスラッグを作る
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

/// id属性のないh2〜h4にスラッグidを付与する（既存idは変更しない）
pub fn ensure_heading_ids(html: &str) -> String {
    let headings = extract_headings(html);
    let mut used: Vec<String> = headings.iter().filter_map(|h| h.id.clone()).collect();
    let mut out = String::with_capacity(html.len() + headings.len() * 16);
    let mut cursor = 0;

    for heading in &headings {
        if heading.id.is_some() || !(2..=4).contains(&heading.level) {
            continue;
        }
        let base = slugify(&heading.text);
        let mut candidate = base.clone();
        let mut suffix = 2;
        while used.contains(&candidate) {
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        used.push(candidate.clone());

        // "<hN" の直後に属性を差し込む
        let insert_at = heading.start + 3;
        out.push_str(&html[cursor..insert_at]);
        out.push_str(&format!(" id=\"{}\"", candidate));
        cursor = insert_at;
    }
    out.push_str(&html[cursor..]);
    out
}

/// サイト内リンクか
pub fn is_internal_href(href: &str, site_domain: &str) -> bool {
    let href = href.trim();
    if href.starts_with('#') || href.starts_with("mailto:") || href.starts_with("tel:") {
        return false;
    }
    if href.starts_with('/') && !href.starts_with("//") {
        return true;
    }
    host_of(href)
        .map(|host| host_matches(&host, site_domain))
        .unwrap_or(false)
}

/// 外部サイトへのリンクか
pub fn is_external_href(href: &str, site_domain: &str) -> bool {
    match host_of(href) {
        Some(host) => !host_matches(&host, site_domain),
        None => false,
    }
}

/// リンクのパス部分（クエリ・フラグメントなし）
pub fn link_path(href: &str) -> Option<String> {
    let href = href.trim();
    if href.starts_with('/') && !href.starts_with("//") {
        let end = href.find(['?', '#']).unwrap_or(href.len());
        return Some(href[..end].to_string());
    }
    let normalized = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    Url::parse(&normalized).ok().map(|url| url.path().to_string())
}

/// 比較用にパスを正規化（末尾スラッシュ除去・小文字化）
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/').to_lowercase();
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed
    }
}

/// アンカー・見出し・タグの外側にある `needle` の最初の出現範囲（語境界で一致）
pub fn find_in_text(html: &str, needle: &str, ignore_case: bool) -> Option<Range<usize>> {
    find_all_in_text(html, needle, ignore_case).into_iter().next()
}

/// アンカー・見出し・タグの外側にある `needle` の全出現範囲
pub fn find_all_in_text(html: &str, needle: &str, ignore_case: bool) -> Vec<Range<usize>> {
    if needle.trim().is_empty() {
        return Vec::new();
    }
    let mut protected = anchor_ranges(html);
    protected.extend(heading_ranges(html));
    protected.extend(tag_ranges(html));

    // ASCII小文字化はバイト位置を変えない
    let (haystack, pattern) = if ignore_case {
        (html.to_ascii_lowercase(), needle.to_ascii_lowercase())
    } else {
        (html.to_string(), needle.to_string())
    };

    haystack
        .match_indices(pattern.as_str())
        .map(|(start, m)| start..start + m.len())
        .filter(|range| !overlaps_any(range, &protected) && on_word_boundary(html, range))
        .collect()
}

fn on_word_boundary(text: &str, range: &Range<usize>) -> bool {
    let before = text[..range.start].chars().next_back();
    let after = text[range.end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

/// アンカー要素の内側のHTML
pub fn anchor_inner(raw: &str) -> &str {
    let open_end = raw.find('>').map(|i| i + 1).unwrap_or(0);
    let close_start = raw
        .to_ascii_lowercase()
        .rfind("</a")
        .unwrap_or(raw.len());
    if close_start < open_end {
        return "";
    }
    &raw[open_end..close_start]
}

fn host_of(href: &str) -> Option<String> {
    let normalized = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    let url = Url::parse(&normalized).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str().map(|h| h.to_lowercase())
}

fn host_matches(host: &str, site_domain: &str) -> bool {
    let domain = site_domain.trim().trim_start_matches("www.").to_lowercase();
    if domain.is_empty() {
        return false;
    }
    let host = host.trim_start_matches("www.");
    host == domain || host.ends_with(&format!(".{}", domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags_and_word_count() {
        let html = "<h2>Intro</h2><p>Online MBA programs &amp; costs.</p>";
        assert_eq!(strip_tags(html), "Intro Online MBA programs & costs.");
        assert_eq!(word_count(html), 6);
    }

    #[test]
    fn test_text_with_hrefs_keeps_link_targets() {
        let html = r#"<p>Wages grew 5% (<a href="https://www.bls.gov/ooh/">source</a>).</p>"#;
        let text = text_with_hrefs(html);
        assert!(text.contains("https://www.bls.gov/ooh/"));
        assert!(text.contains("5%"));
    }

    #[test]
    fn test_sentences_and_average_length() {
        let html = "<p>One two three. Four five!</p><p>Six seven eight nine?</p>";
        let text = strip_tags(html);
        assert_eq!(sentences(&text).len(), 3);
        assert!((avg_sentence_length(html) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_extract_headings_with_ids() {
        let html = r#"<h2 id="costs">Program <em>Costs</em></h2><p>x</p><h3>Faq</h3>"#;
        let headings = extract_headings(html);
        assert_eq!(headings.len(), 2);
        assert_eq!(headings[0].id.as_deref(), Some("costs"));
        assert_eq!(headings[0].text, "Program Costs");
        assert_eq!(headings[1].level, 3);
        assert!(headings[1].id.is_none());
    }

    #[test]
    fn test_extract_links() {
        let html = r#"<p>See <a href="/rankings/mba/">our MBA rankings</a> and <a class="x" href='https://nces.ed.gov'>NCES</a>.</p>"#;
        let links = extract_links(html);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].href, "/rankings/mba/");
        assert_eq!(links[0].text, "our MBA rankings");
        assert_eq!(links[1].href, "https://nces.ed.gov");
        assert_eq!(&html[links[0].start..links[0].end], links[0].raw);
    }

    #[test]
    fn test_ensure_heading_ids_adds_unique_slugs() {
        let html = r#"<h2>Costs</h2><p>a</p><h2 id="keep">Kept</h2><h3>Costs</h3>"#;
        let fixed = ensure_heading_ids(html);
        assert!(fixed.contains(r#"<h2 id="costs">Costs</h2>"#));
        assert!(fixed.contains(r#"<h2 id="keep">Kept</h2>"#));
        assert!(fixed.contains(r#"<h3 id="costs-2">Costs</h3>"#));
    }

    #[test]
    fn test_internal_and_external_classification() {
        assert!(is_internal_href("/degrees/mba/", "example.edu"));
        assert!(is_internal_href("https://www.example.edu/a", "example.edu"));
        assert!(!is_internal_href("https://bls.gov", "example.edu"));
        assert!(!is_internal_href("#faq", "example.edu"));
        assert!(is_external_href("https://bls.gov", "example.edu"));
        assert!(!is_external_href("/a", "example.edu"));
    }

    #[test]
    fn test_link_path_normalization() {
        assert_eq!(link_path("/rankings/mba/?ref=1").as_deref(), Some("/rankings/mba/"));
        assert_eq!(
            link_path("https://example.edu/careers/nurse#pay").as_deref(),
            Some("/careers/nurse")
        );
        assert_eq!(normalize_path("/Rankings/MBA/"), "/rankings/mba");
    }

    #[test]
    fn test_find_in_text_skips_protected_ranges() {
        let html = r#"<h2>Online MBA</h2><p>An <a href="/x">online MBA</a> or an online MBA degree.</p>"#;
        let range = find_in_text(html, "online mba", true).unwrap();
        assert_eq!(&html[range.clone()], "online MBA");
        assert!(range.start > html.find("</a>").unwrap());
        assert!(find_in_text("<p>MBAs abound.</p>", "MBA", false).is_none());
    }

    #[test]
    fn test_anchor_inner() {
        assert_eq!(anchor_inner(r#"<a href="/x">our <em>MBA</em> list</a>"#), "our <em>MBA</em> list");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("What Is an MBA?"), "what-is-an-mba");
        assert_eq!(slugify("???"), "section");
    }
}
