//! LLM-backed providers
//!
//! チャットLLMを使ったドラフト生成・全文リライト・品質修正の実装

use super::{
    DraftProvider, DraftRequest, RepairProvider, RewriteMode, RewriteOptions, RewriteProvider,
    RewriteResult,
};
use crate::error::{Error, Result};
use crate::llm::{extract_json_object, strip_code_fence, ChatMessage, ChatOptions, LlmClient};
use crate::types::{ArticleDraft, ContentType, ValidationIssue};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

fn content_type_guidance(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Ranking => {
            "A ranked list of real, accredited programs with a short methodology section and one H2 per ranked group."
        }
        ContentType::CareerGuide => {
            "A career guide covering duties, education paths, salary outlook and licensing."
        }
        ContentType::Listicle => "A scannable list article with one H2 per list item.",
        ContentType::Guide => "An explanatory guide with logically ordered H2 sections.",
        ContentType::Faq => "A question-led article where each H2 is a common question.",
    }
}

/// LLMでドラフトを生成するプロバイダー
pub struct LlmDraftProvider {
    client: Arc<dyn LlmClient>,
    temperature: f32,
}

impl LlmDraftProvider {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_messages(&self, request: &DraftRequest) -> Vec<ChatMessage> {
        let system = "You are a senior higher-education editor. Write accurate, complete HTML \
articles. Use only <h2>, <h3>, <p>, <ul>, <ol>, <li>, <strong>, <em> and <a> tags. Never invent \
institutions, statistics or laws, and never leave placeholders. Respond with a single JSON object.";

        let idea = &request.idea;
        let mut prompt = String::new();
        let _ = writeln!(prompt, "Title: {}", idea.title);
        if !idea.description.is_empty() {
            let _ = writeln!(prompt, "Brief: {}", idea.description);
        }
        if !idea.keywords.is_empty() {
            let _ = writeln!(prompt, "Keywords: {}", idea.keywords.join(", "));
        }
        if !idea.seed_topics.is_empty() {
            let _ = writeln!(prompt, "Cover these topics: {}", idea.seed_topics.join(", "));
        }
        let _ = writeln!(
            prompt,
            "Format: {} ({})",
            request.content_type.as_str(),
            content_type_guidance(request.content_type)
        );
        let _ = writeln!(
            prompt,
            "Length: about {} words of body text.",
            request.target_word_count
        );

        let context = &request.context;
        if let Some(facts) = &context.pricing_facts {
            let _ = writeln!(prompt, "Verified pricing facts (use only these figures):\n{}", facts);
        }
        if let Some(voice) = &context.author_voice {
            let _ = writeln!(prompt, "Author voice: {}", voice);
        }
        if let Some(contributor) = &context.contributor {
            let _ = writeln!(prompt, "Byline: {}", contributor.name);
        }
        if !context.rule_constraints.is_empty() {
            let _ = writeln!(prompt, "Rules:");
            for rule in &context.rule_constraints {
                let _ = writeln!(prompt, "- {}", rule);
            }
        }
        if request.attempt > 1 {
            let _ = writeln!(
                prompt,
                "The previous draft was cut off or contained placeholders. Finish every sentence \
and use real names only."
            );
        }
        let _ = writeln!(
            prompt,
            "Return JSON with keys: title, content (HTML), excerpt, faqs (array of {{question, answer}}), \
meta_title, meta_description, focus_keyword."
        );

        vec![ChatMessage::system(system), ChatMessage::user(prompt)]
    }
}

#[async_trait]
impl DraftProvider for LlmDraftProvider {
    fn name(&self) -> &str {
        "llm-draft"
    }

    async fn generate_draft(&self, request: &DraftRequest) -> Result<ArticleDraft> {
        // 再試行時は温度を下げる
        let temperature = if request.attempt > 1 {
            self.temperature - 0.2
        } else {
            self.temperature
        };
        let options = ChatOptions::json(self.client.limits().output_budget(request.target_word_count))
            .with_temperature(temperature);

        let response = self
            .client
            .chat(&self.build_messages(request), &options)
            .await?;
        debug!(
            "Draft response: {} tokens in {}ms",
            response.tokens_used, response.response_time_ms
        );
        if response.was_cut_off() {
            return Err(Error::provider(
                self.name(),
                "response hit the output token limit",
            ));
        }

        let json = extract_json_object(&response.content)
            .ok_or_else(|| Error::Parse("draft response contained no JSON object".to_string()))?;
        let draft: ArticleDraft = serde_json::from_str(json)?;
        if draft.content.trim().is_empty() {
            return Err(Error::provider(self.name(), "draft content was empty"));
        }
        Ok(draft)
    }
}

/// LLMで文書全体をリライトするプロバイダー（フォールバック用）
pub struct LlmRewriteProvider {
    client: Arc<dyn LlmClient>,
}

impl LlmRewriteProvider {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RewriteProvider for LlmRewriteProvider {
    fn name(&self) -> &str {
        "llm-rewrite"
    }

    fn mode(&self) -> RewriteMode {
        RewriteMode::WholeDocument
    }

    async fn humanize(&self, text: &str, options: &RewriteOptions) -> Result<RewriteResult> {
        let mut instructions = String::from(
            "Rewrite the article so it reads naturally, with varied sentence length and a \
conversational but expert tone. Keep every HTML tag, every heading exactly as written, and every \
link with its href and anchor text. Do not add links, facts or headings. Return only the HTML.",
        );
        if let Some(tone) = &options.tone {
            let _ = write!(instructions, "\nTone: {}.", tone);
        }
        if let Some(voice) = &options.voice {
            let _ = write!(instructions, "\nAuthor voice: {}.", voice);
        }
        if let Some(title) = &options.title {
            let _ = write!(instructions, "\nArticle title: {}.", title);
        }

        let words = crate::html::word_count(text);
        let response = self
            .client
            .chat(
                &[ChatMessage::system(instructions), ChatMessage::user(text)],
                &ChatOptions {
                    max_tokens: self.client.limits().output_budget(words),
                    temperature: 0.9,
                    json_output: false,
                },
            )
            .await?;

        let rewritten = strip_code_fence(&response.content);
        if rewritten.is_empty() || response.was_cut_off() {
            return Err(Error::provider(self.name(), "rewrite was empty or cut off"));
        }
        Ok(RewriteResult {
            text: rewritten.to_string(),
            naturalness_score: None,
        })
    }
}

/// LLMで品質問題を修正するプロバイダー
pub struct LlmRepairProvider {
    client: Arc<dyn LlmClient>,
}

impl LlmRepairProvider {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RepairProvider for LlmRepairProvider {
    fn name(&self) -> &str {
        "llm-repair"
    }

    async fn fix(&self, content: &str, issues: &[ValidationIssue]) -> Result<String> {
        let mut prompt = String::from("Fix these problems in the article:\n");
        for issue in issues {
            let _ = writeln!(prompt, "- [{}] {}", issue.issue_type, issue.message);
        }
        let _ = write!(
            prompt,
            "\nKeep existing headings, ids and links unless a problem requires adding new ones. \
Return only the corrected HTML.\n\n{}",
            content
        );

        let response = self
            .client
            .chat(
                &[
                    ChatMessage::system("You are a meticulous copy editor for HTML articles."),
                    ChatMessage::user(prompt),
                ],
                &ChatOptions {
                    max_tokens: self
                        .client
                        .limits()
                        .output_budget(crate::html::word_count(content)),
                    temperature: 0.4,
                    json_output: false,
                },
            )
            .await?;

        let fixed = strip_code_fence(&response.content);
        if fixed.is_empty() || response.was_cut_off() {
            return Err(Error::provider(self.name(), "repair output was empty or cut off"));
        }
        Ok(fixed.to_string())
    }
}
