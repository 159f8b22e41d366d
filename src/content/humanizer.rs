//! Humanizer
//!
//! リライトプロバイダーの戦略リストで記事を書き直す。
//!
//! - `Chunked`: 見出し境界で150〜200語程度のチャンクに分け、見出しは送らずに本文だけを
//!   最大3回まで反復リライトする。最良スコアの候補を採用する。
//! - `WholeDocument`: 文書全体を1回でリライトする（フォールバック）。
//!
//! どちらの経路でも最後に書式修復（見出しの再設定・リンクの復元/除去）を行う。
//! 失敗したプロバイダーはその実行中はサーキットブレーカーで除外される。

use crate::error::{Error, Result};
use crate::html;
use crate::llm::strip_code_fence;
use crate::providers::{RewriteMode, RewriteOptions, RewriteProvider};
use crate::retry::CallPolicy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<(/?)(p|ul|ol|table|blockquote|div|section|figure|pre|details|dl|h[1-6])\b[^>]*>",
    )
    .expect("block tag regex")
});

static HEADING_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*<h[1-6]\b").expect("heading block regex"));

/// 検出スコアの極性
///
/// プロバイダーごとにスコアの意味が異なるため設定で指定する。内部では常に
/// 「高いほど人間らしい」（0-100）に正規化して扱う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorePolarity {
    /// 高いほど人間らしい
    #[default]
    HigherIsHuman,
    /// 高いほどAI生成と判定されやすい
    HigherIsDetectable,
}

impl ScorePolarity {
    /// 生スコアを「高いほど人間らしい」に正規化
    pub fn normalize(&self, raw: f64) -> f64 {
        let clamped = raw.clamp(0.0, 100.0);
        match self {
            ScorePolarity::HigherIsHuman => clamped,
            ScorePolarity::HigherIsDetectable => 100.0 - clamped,
        }
    }
}

/// ヒューマナイザー設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanizerConfig {
    /// チャンクの最小語数
    pub min_chunk_words: usize,
    /// チャンクの最大語数
    pub max_chunk_words: usize,
    /// チャンクあたりの最大リライト回数
    pub max_iterations: u32,
    /// 目標スコア（正規化後）
    pub target_score: u8,
    pub score_polarity: ScorePolarity,
    /// チャンク間の待機（ミリ秒）
    pub chunk_delay_ms: u64,
    /// トーン指定
    pub tone: Option<String>,
}

impl Default for HumanizerConfig {
    fn default() -> Self {
        Self {
            min_chunk_words: 150,
            max_chunk_words: 200,
            max_iterations: 3,
            target_score: 85,
            score_polarity: ScorePolarity::HigherIsHuman,
            chunk_delay_ms: 500,
            tone: Some("College".to_string()),
        }
    }
}

/// 記事ごとのリライト文脈
#[derive(Debug, Clone, Default)]
pub struct HumanizeOptions {
    pub title: Option<String>,
    /// 執筆者の文体
    pub voice: Option<String>,
}

/// 実行単位のサーキットブレーカー
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    tripped: HashMap<String, String>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, provider: &str) -> bool {
        self.tripped.contains_key(provider)
    }

    pub fn trip(&mut self, provider: &str, reason: impl Into<String>) {
        self.tripped.insert(provider.to_string(), reason.into());
    }

    /// 除外されたプロバイダー名（ソート済み）
    pub fn tripped(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tripped.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn reason(&self, provider: &str) -> Option<&str> {
        self.tripped.get(provider).map(String::as_str)
    }
}

/// 文書の構成要素
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// 見出し（そのまま保持）
    Heading(String),
    /// リライト対象の本文
    Body(String),
}

impl Segment {
    fn as_str(&self) -> &str {
        match self {
            Segment::Heading(s) | Segment::Body(s) => s,
        }
    }
}

/// チャンクごとの結果
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub index: usize,
    pub words: usize,
    /// 実行したリライト回数
    pub iterations: u32,
    /// 採用候補の正規化スコア
    pub best_score: Option<f64>,
    /// 元の本文を保持したか
    pub kept_original: bool,
}

/// ヒューマナイズ結果
#[derive(Debug, Clone)]
pub struct HumanizeOutcome {
    pub content: String,
    pub provider: String,
    pub mode: RewriteMode,
    pub chunks: Vec<ChunkReport>,
}

impl HumanizeOutcome {
    /// スコアが得られたチャンクの平均
    pub fn average_score(&self) -> Option<f64> {
        let scores: Vec<f64> = self.chunks.iter().filter_map(|c| c.best_score).collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

/// ヒューマナイザー
pub struct Humanizer {
    providers: Vec<Arc<dyn RewriteProvider>>,
    config: HumanizerConfig,
    policy: CallPolicy,
}

impl Humanizer {
    /// 優先順のプロバイダーリストから作成
    pub fn new(
        providers: Vec<Arc<dyn RewriteProvider>>,
        config: HumanizerConfig,
        policy: CallPolicy,
    ) -> Self {
        Self {
            providers,
            config,
            policy,
        }
    }

    pub fn config(&self) -> &HumanizerConfig {
        &self.config
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// 記事をリライト
    ///
    /// 全プロバイダーが失敗またはブレーカーで除外された場合はエラー。
    pub async fn humanize(
        &self,
        content: &str,
        options: &HumanizeOptions,
        breaker: &mut CircuitBreaker,
    ) -> Result<HumanizeOutcome> {
        for provider in &self.providers {
            let name = provider.name();
            if breaker.is_open(name) {
                debug!("Skipping rewrite provider {} (circuit open)", name);
                continue;
            }

            let mode = provider.mode();
            info!("Humanizing with {} ({:?})", name, mode);
            let result = match mode {
                RewriteMode::Chunked => self.humanize_chunked(provider.as_ref(), content, options).await,
                RewriteMode::WholeDocument => {
                    self.humanize_whole(provider.as_ref(), content, options).await
                }
            };

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    warn!("Rewrite provider {} failed, trying next: {}", name, e);
                    breaker.trip(name, e.to_string());
                }
            }
        }

        Err(Error::provider(
            "humanizer",
            format!(
                "no rewrite provider succeeded (tripped: {:?})",
                breaker.tripped()
            ),
        ))
    }

    fn rewrite_options(&self, options: &HumanizeOptions) -> RewriteOptions {
        RewriteOptions {
            tone: self.config.tone.clone(),
            voice: options.voice.clone(),
            title: options.title.clone(),
            target_score: self.config.target_score,
        }
    }

    async fn humanize_chunked(
        &self,
        provider: &dyn RewriteProvider,
        content: &str,
        options: &HumanizeOptions,
    ) -> Result<HumanizeOutcome> {
        let segments = chunk_segments(
            content,
            self.config.min_chunk_words,
            self.config.max_chunk_words,
        );
        let body_total = segments
            .iter()
            .filter(|s| matches!(s, Segment::Body(_)))
            .count();
        let rewrite_options = self.rewrite_options(options);

        let mut output = String::with_capacity(content.len());
        let mut chunks = Vec::new();

        for segment in &segments {
            let body = match segment {
                Segment::Heading(heading) => {
                    output.push_str(heading);
                    continue;
                }
                Segment::Body(body) => body,
            };

            let index = chunks.len();
            if index > 0 && self.config.chunk_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.chunk_delay_ms)).await;
            }

            let (text, report) = self
                .rewrite_chunk(provider, index, body, &rewrite_options)
                .await?;
            debug!(
                "Chunk {}/{}: {} words, {} iteration(s), score {:?}",
                index + 1,
                body_total,
                report.words,
                report.iterations,
                report.best_score
            );
            output.push_str(&text);
            chunks.push(report);
        }

        let content = repair_formatting(content, &output)?;
        Ok(HumanizeOutcome {
            content,
            provider: provider.name().to_string(),
            mode: RewriteMode::Chunked,
            chunks,
        })
    }

    /// 1チャンクを反復リライトし、最良の候補を返す
    async fn rewrite_chunk(
        &self,
        provider: &dyn RewriteProvider,
        index: usize,
        body: &str,
        options: &RewriteOptions,
    ) -> Result<(String, ChunkReport)> {
        let polarity = self.config.score_polarity;
        let target = f64::from(self.config.target_score);
        let mut best: Option<(String, Option<f64>)> = None;
        let mut input = body.to_string();
        let mut iterations = 0;
        let heading_count = html::extract_headings(body).len();

        for _ in 0..self.config.max_iterations.max(1) {
            iterations += 1;
            let source = input.as_str();
            let result = self
                .policy
                .call(provider.name(), || provider.humanize(source, options))
                .await?;

            // リンクを失った候補、見出しが増減した候補は採用しない
            let candidate = match restore_links(body, strip_code_fence(&result.text)) {
                Ok(candidate) => candidate,
                Err(e) => {
                    debug!("Rejected chunk {} candidate: {}", index, e);
                    continue;
                }
            };
            let candidate_headings = html::extract_headings(&candidate).len();
            if candidate_headings != heading_count {
                debug!(
                    "Rejected chunk {} candidate: heading count changed ({} -> {})",
                    index, heading_count, candidate_headings
                );
                continue;
            }

            let score = result.naturalness_score.map(|raw| polarity.normalize(raw));
            let better = match (&best, score) {
                (None, _) => true,
                (Some((_, Some(best_score))), Some(score)) => score > *best_score,
                (Some((_, None)), Some(_)) => true,
                (Some(_), None) => false,
            };
            if better {
                input = candidate.clone();
                best = Some((candidate, score));
            }

            match score {
                Some(score) if score >= target => break,
                // スコアを返さないプロバイダーは1回で確定
                None => break,
                _ => {}
            }
        }

        let words = html::word_count(body);
        Ok(match best {
            Some((text, score)) => (
                text,
                ChunkReport {
                    index,
                    words,
                    iterations,
                    best_score: score,
                    kept_original: false,
                },
            ),
            None => {
                warn!("No usable rewrite for chunk {}, keeping original", index);
                (
                    body.to_string(),
                    ChunkReport {
                        index,
                        words,
                        iterations,
                        best_score: None,
                        kept_original: true,
                    },
                )
            }
        })
    }

    async fn humanize_whole(
        &self,
        provider: &dyn RewriteProvider,
        content: &str,
        options: &HumanizeOptions,
    ) -> Result<HumanizeOutcome> {
        let rewrite_options = self.rewrite_options(options);
        let result = self
            .policy
            .call(provider.name(), || provider.humanize(content, &rewrite_options))
            .await?;
        let repaired = repair_formatting(content, strip_code_fence(&result.text))?;

        Ok(HumanizeOutcome {
            content: repaired,
            provider: provider.name().to_string(),
            mode: RewriteMode::WholeDocument,
            chunks: vec![ChunkReport {
                index: 0,
                words: html::word_count(content),
                iterations: 1,
                best_score: result
                    .naturalness_score
                    .map(|raw| self.config.score_polarity.normalize(raw)),
                kept_original: false,
            }],
        })
    }
}

/// トップレベルのブロック要素に分割（入れ子のブロックは分割しない）
pub fn split_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for caps in BLOCK_TAG_RE.captures_iter(content) {
        let Some(tag) = caps.get(0) else { continue };
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        if !closing {
            depth += 1;
            continue;
        }
        depth = depth.saturating_sub(1);
        if depth == 0 {
            blocks.push(content[start..tag.end()].to_string());
            start = tag.end();
        }
    }

    let tail = &content[start..];
    if !tail.trim().is_empty() {
        blocks.push(tail.to_string());
    } else if let Some(last) = blocks.last_mut() {
        last.push_str(tail);
    }
    blocks
}

/// 見出しと本文チャンクの列に分割
///
/// 見出しは常に新しいチャンクを開始する。本文は `min_words` 以上になった時点で、
/// 次のブロックを加えると `max_words` を超える場合に区切る。
pub fn chunk_segments(content: &str, min_words: usize, max_words: usize) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut words = 0;

    let flush = |segments: &mut Vec<Segment>, current: &mut String, words: &mut usize| {
        if !current.is_empty() {
            segments.push(Segment::Body(std::mem::take(current)));
        }
        *words = 0;
    };

    for block in split_blocks(content) {
        if HEADING_BLOCK_RE.is_match(&block) {
            flush(&mut segments, &mut current, &mut words);
            segments.push(Segment::Heading(block));
            continue;
        }
        let block_words = html::word_count(&block);
        if words >= min_words && words + block_words > max_words {
            flush(&mut segments, &mut current, &mut words);
        }
        current.push_str(&block);
        words += block_words;
    }
    flush(&mut segments, &mut current, &mut words);

    segments
}

/// 分割した構成要素を元の順に結合
pub fn join_segments(segments: &[Segment]) -> String {
    segments.iter().map(Segment::as_str).collect()
}

/// リライト後の書式を修復する
///
/// 見出し数が変わった場合、または失われたリンクを復元できない場合はエラー。
pub fn repair_formatting(original: &str, rewritten: &str) -> Result<String> {
    let restored = restore_headings(original, rewritten)?;
    restore_links(original, &restored)
}

/// 見出しを元のマークアップ（id含む）で置き換える
pub fn restore_headings(original: &str, rewritten: &str) -> Result<String> {
    let expected = html::extract_headings(original);
    let actual = html::extract_headings(rewritten);
    if expected.len() != actual.len() {
        return Err(Error::Parse(format!(
            "heading count changed from {} to {}",
            expected.len(),
            actual.len()
        )));
    }

    let mut out = rewritten.to_string();
    for (original_heading, rewritten_heading) in expected.iter().zip(actual.iter()).rev() {
        out.replace_range(
            rewritten_heading.start..rewritten_heading.end,
            &original_heading.raw,
        );
    }
    Ok(out)
}

/// 失われたリンクを復元し、追加されたリンクを除去する
pub fn restore_links(original: &str, rewritten: &str) -> Result<String> {
    let expected = html::extract_links(original);
    let allowed: HashSet<&str> = expected.iter().map(|l| l.href.as_str()).collect();
    let mut out = rewritten.to_string();

    // 元にないリンクはアンカーを外してテキストだけ残す
    let invented: Vec<html::Link> = html::extract_links(&out)
        .into_iter()
        .filter(|l| !allowed.contains(l.href.as_str()))
        .collect();
    for link in invented.iter().rev() {
        let inner = html::anchor_inner(&link.raw).to_string();
        out.replace_range(link.start..link.end, &inner);
    }
    if !invented.is_empty() {
        debug!("Unwrapped {} invented link(s)", invented.len());
    }

    let mut remaining: HashMap<String, usize> = HashMap::new();
    for link in html::extract_links(&out) {
        *remaining.entry(link.href).or_insert(0) += 1;
    }

    for link in &expected {
        if let Some(count) = remaining.get_mut(&link.href) {
            if *count > 0 {
                *count -= 1;
                continue;
            }
        }
        let range = html::find_in_text(&out, &link.text, false).ok_or_else(|| {
            Error::Parse(format!(
                "link to {} was dropped and its anchor text \"{}\" is gone",
                link.href, link.text
            ))
        })?;
        out.replace_range(range, &link.raw);
        debug!("Re-wrapped dropped link to {}", link.href);
    }

    Ok(out)
}
