//! Pipeline Orchestrator
//!
//! アイデアから記事レコードまでの各ステージを順番に実行する。
//!
//! ステージ順:
//! rules → contributor → draft → humanize → links → monetization → gate → autofix →
//! validate → risk → schedule
//!
//! - ステージ間でキャンセルを確認する（呼び出し中には中断しない）。
//! - ブロッキング検証で止まった場合は直前に検証を通った本文へ戻す。戻しても
//!   ブロックされる場合は `Error::ContentBlocked`。
//! - 検証・キャンセル以外の致命的エラーではスタブ記事を返してアイデアを失わない。

use crate::cache::{InstitutionDirectory, RulesCache};
use crate::config::PipelineConfig;
use crate::content::autofix::AutoFixLoop;
use crate::content::draft::DraftGenerator;
use crate::content::humanizer::{CircuitBreaker, HumanizeOptions, Humanizer};
use crate::content::linker::InternalLinker;
use crate::content::monetization::{insert_slots, MonetizationContext, MonetizationEngine};
use crate::content::quality::{QualityScorer, QualityThresholds};
use crate::content::risk::{AuthorStatus, AutoPublishGate, RiskAssessor};
use crate::content::validator::{ContentValidator, ValidationOptions};
use crate::error::{Error, Result};
use crate::html;
use crate::llm::{LlmClient, OpenAiClient};
use crate::providers::{
    AnchorSuggester, CatalogLookup, ContributorAssigner, DraftContext, DraftProvider,
    HttpRewriteProvider, InstitutionLookup, LlmDraftProvider, LlmRepairProvider,
    LlmRewriteProvider, PhraseAnchorSuggester, RepairProvider, RewriteProvider, RulesConfigStore,
};
use crate::reasoning::ReasoningLog;
use crate::retry::CallPolicy;
use crate::rules::RulesConfig;
use crate::types::{
    Article, ArticleDraft, ArticleStatus, ContentIdea, ContributorProfile, GenerationOptions,
    IssueType, MonetizationSlot, QualityMetrics, Severity, ValidationIssue,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 生成リクエスト
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub idea: ContentIdea,
    #[serde(default)]
    pub options: GenerationOptions,
    /// 検証済みの学費・価格情報
    #[serde(default)]
    pub pricing_facts: Option<String>,
}

impl GenerationRequest {
    pub fn new(idea: ContentIdea, options: GenerationOptions) -> Self {
        Self {
            idea,
            options,
            pricing_facts: None,
        }
    }

    pub fn with_pricing_facts(mut self, facts: impl Into<String>) -> Self {
        self.pricing_facts = Some(facts.into());
        self
    }
}

/// 生成結果
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    /// 全ステージ完了
    Completed(Box<Article>),
    /// 致命的エラーのため手動完成用のスタブを作成
    Stub { article: Box<Article>, error: String },
}

impl GenerationOutcome {
    pub fn article(&self) -> &Article {
        match self {
            GenerationOutcome::Completed(article) => article,
            GenerationOutcome::Stub { article, .. } => article,
        }
    }

    pub fn into_article(self) -> Article {
        match self {
            GenerationOutcome::Completed(article) => *article,
            GenerationOutcome::Stub { article, .. } => *article,
        }
    }

    pub fn is_stub(&self) -> bool {
        matches!(self, GenerationOutcome::Stub { .. })
    }
}

/// 内部リンク・収益化を適用した本文
struct Enriched {
    content: String,
    slots: Vec<MonetizationSlot>,
}

/// 品質採点・自動修正の結果
struct Scored {
    content: String,
    metrics: QualityMetrics,
    risk_flags: Vec<String>,
}

/// パイプラインオーケストレーター
pub struct PipelineOrchestrator {
    rules: Arc<RulesCache>,
    validator: Arc<ContentValidator>,
    drafts: DraftGenerator,
    humanizer: Option<Humanizer>,
    linker: Option<InternalLinker>,
    monetization: MonetizationEngine,
    repair: Option<Arc<dyn RepairProvider>>,
    contributors: Option<Arc<dyn ContributorAssigner>>,
    policy: CallPolicy,
    risk: RiskAssessor,
    auto_publish: AutoPublishGate,
    site_domain: String,
    structural_link_prefixes: Vec<String>,
}

impl PipelineOrchestrator {
    /// ビルダーを作成
    pub fn builder(
        draft_provider: Arc<dyn DraftProvider>,
        rules_store: Arc<dyn RulesConfigStore>,
    ) -> PipelineBuilder {
        PipelineBuilder::new(draft_provider, rules_store)
    }

    /// 設定のLLM・リライトAPIからプロバイダーを組み立てたビルダー
    ///
    /// `openai` セクションが必須。`rewrite_api` があれば優先のリライトプロバイダーになり、
    /// LLMリライトはそのフォールバックになる。
    pub fn from_config(
        config: PipelineConfig,
        rules_store: Arc<dyn RulesConfigStore>,
    ) -> Result<PipelineBuilder> {
        let openai = config.openai.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration("[openai] section is required".to_string())
        })?;

        let mut client = OpenAiClient::with_timeout(
            openai.api_key.clone(),
            openai.model.clone(),
            std::time::Duration::from_secs(openai.timeout_seconds),
        )?;
        if let Some(base_url) = &openai.base_url {
            client = client.with_base_url(base_url.clone());
        }
        let client: Arc<dyn LlmClient> = Arc::new(client);

        let mut rewriters: Vec<Arc<dyn RewriteProvider>> = Vec::new();
        if let Some(api) = &config.rewrite_api {
            let mut provider = HttpRewriteProvider::new(api.base_url.clone(), api.api_key.clone())?;
            if let Some(readability) = &api.readability {
                provider = provider.with_readability(readability.clone());
            }
            rewriters.push(Arc::new(provider));
        }
        rewriters.push(Arc::new(LlmRewriteProvider::new(Arc::clone(&client))));

        let mut builder = PipelineBuilder::new(
            Arc::new(LlmDraftProvider::new(Arc::clone(&client))),
            rules_store,
        )
        .repair_provider(Arc::new(LlmRepairProvider::new(client)))
        .config(config);
        for rewriter in rewriters {
            builder = builder.rewrite_provider(rewriter);
        }
        Ok(builder)
    }

    pub fn rules_cache(&self) -> &Arc<RulesCache> {
        &self.rules
    }

    pub fn validator(&self) -> &Arc<ContentValidator> {
        &self.validator
    }

    /// 記事を生成
    ///
    /// ブロッキング検証の失敗とキャンセルはエラーとして返す。それ以外の致命的エラーは
    /// `GenerationOutcome::Stub` になる。
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome> {
        let mut reasoning = ReasoningLog::new();
        info!("Starting generation for \"{}\"", request.idea.title);

        match self.run(request, cancel, &mut reasoning).await {
            Ok(article) => {
                info!(
                    "Generated \"{}\": {} words, quality {}, risk {}",
                    article.title, article.word_count, article.quality_score, article.risk_level
                );
                Ok(GenerationOutcome::Completed(Box::new(article)))
            }
            Err(e) if e.is_blocking_validation() || matches!(e, Error::Cancelled { .. }) => {
                warn!("Generation for \"{}\" stopped: {}", request.idea.title, e);
                Err(e)
            }
            Err(e) => {
                error!(
                    "Generation for \"{}\" failed, creating stub: {}",
                    request.idea.title, e
                );
                let message = e.to_string();
                reasoning.warn(format!("Generation failed: {}", message));
                let article =
                    Article::stub(&request.idea, &request.options, &message, reasoning);
                Ok(GenerationOutcome::Stub {
                    article: Box::new(article),
                    error: message,
                })
            }
        }
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        reasoning: &mut ReasoningLog,
    ) -> Result<Article> {
        let idea = &request.idea;
        let options = &request.options;
        if idea.title.trim().is_empty() {
            return Err(Error::InvalidInput("idea title is empty".to_string()));
        }

        checkpoint(cancel, "rules")?;
        let rules = self.effective_rules().await;
        if rules.is_builtin() {
            reasoning.add_source("rules:builtin");
        } else {
            reasoning.add_source(format!("rules:v{}", rules.version));
        }
        reasoning.record(
            "rules",
            format!("using rules version {}", rules.version),
            json!({
                "version": rules.version,
                "approved_authors": rules.approved_authors.len(),
                "constraints": rules.rule_constraints.len(),
            }),
            if rules.is_builtin() {
                "no active rules config, built-in defaults apply"
            } else {
                "active rules config loaded from store"
            },
        );

        checkpoint(cancel, "contributor")?;
        let contributor = self.assign_contributor(idea, options, reasoning).await;

        checkpoint(cancel, "draft")?;
        let context = DraftContext {
            pricing_facts: request.pricing_facts.clone(),
            author_voice: contributor.as_ref().and_then(|c| c.voice_profile.clone()),
            rule_constraints: rules.rule_constraints.clone(),
            contributor: contributor.clone(),
        };
        if context.pricing_facts.is_some() {
            reasoning.add_source("pricing_facts");
        }
        let outcome = self
            .drafts
            .generate(idea, options, &context, Arc::clone(&rules))
            .await?;
        reasoning.add_source(format!("draft:{}", self.drafts.provider_name()));
        reasoning.record(
            "draft",
            format!("accepted after {} attempt(s)", outcome.attempts),
            json!({
                "target_word_count": options.target_word_count,
                "content_type": options.content_type.as_str(),
                "attempts": outcome.attempts,
                "word_count": outcome.validation.metrics.word_count,
            }),
            "truncation and placeholder checks passed",
        );
        let mut draft = outcome.draft;
        draft.content = html::ensure_heading_ids(&draft.content);
        let gated_draft = draft.content.clone();

        checkpoint(cancel, "humanize")?;
        let humanized = self
            .humanize(&draft, contributor.as_ref(), options, reasoning)
            .await;

        checkpoint(cancel, "links")?;
        let enriched = self
            .enrich(
                humanized.as_deref().unwrap_or(&gated_draft),
                &draft,
                idea,
                options,
                reasoning,
            )
            .await;

        checkpoint(cancel, "gate")?;
        let enriched = self
            .gate(
                enriched,
                humanized.is_some(),
                &gated_draft,
                &draft,
                idea,
                options,
                &rules,
                reasoning,
            )
            .await?;
        draft.content = enriched.content;
        let slots = enriched.slots;

        checkpoint(cancel, "autofix")?;
        let scored = self
            .score_and_fix(&draft, options, &rules, reasoning)
            .await?;
        draft.content = scored.content;

        checkpoint(cancel, "validate")?;
        let validation = self
            .validator
            .validate(
                &draft.content,
                &ValidationOptions::full(&draft.faqs, Arc::clone(&rules)),
            )
            .await;
        if validation.is_blocked {
            return Err(Error::ContentBlocked {
                stage: "validate".to_string(),
                issues: validation.blocking_issues,
            });
        }
        reasoning.record(
            "validate",
            format!("risk {}", validation.risk_level),
            json!({
                "warnings": validation.warnings.len(),
                "internal_links": validation.metrics.internal_link_count,
                "invalid_links": validation.metrics.invalid_link_count,
            }),
            "full heuristic validation",
        );

        checkpoint(cancel, "risk")?;
        let author = AuthorStatus::evaluate(contributor.as_ref(), &rules);
        let assessor = if rules.is_builtin() {
            self.risk.clone()
        } else {
            RiskAssessor::new(rules.risk.clone())
        };
        let assessment = assessor.assess(&scored.metrics, &validation, &author);
        reasoning.record(
            "risk",
            format!("{} (score {})", assessment.risk_level, assessment.risk_score),
            json!({
                "quality_score": scored.metrics.score,
                "blocking": assessment.blocking_issues.len(),
                "warnings": assessment.warnings.len(),
                "author": format!("{:?}", author),
            }),
            assessment.summary.clone(),
        );

        checkpoint(cancel, "schedule")?;
        let now = Utc::now();
        let auto_publish_at = self
            .auto_publish
            .publish_at(&assessment, scored.metrics.score, now);
        let status = if auto_publish_at.is_some() {
            ArticleStatus::Scheduled
        } else {
            ArticleStatus::ReadyForReview
        };
        reasoning.record(
            "schedule",
            match auto_publish_at {
                Some(at) => format!("auto-publish at {}", at.to_rfc3339()),
                None => "manual review".to_string(),
            },
            json!({
                "enabled": self.auto_publish.enabled,
                "can_auto_publish": assessment.can_auto_publish,
                "min_quality_score": self.auto_publish.min_quality_score,
            }),
            "auto-publish gate",
        );

        let mut validation_flags = validation.all_issues();
        validation_flags.extend(
            assessment
                .blocking_issues
                .iter()
                .chain(assessment.warnings.iter())
                .filter(|issue| {
                    matches!(
                        issue.issue_type,
                        IssueType::UnapprovedAuthor | IssueType::MissingContributor
                    )
                })
                .cloned(),
        );

        let review_reasons = review_reasons(
            &scored.risk_flags,
            &assessment.blocking_issues,
            &assessment.warnings,
            &assessment,
        );
        let requires_human_review = assessment.requires_review || !scored.risk_flags.is_empty();

        Ok(Article {
            id: Uuid::new_v4(),
            word_count: html::word_count(&draft.content),
            title: draft.title,
            content: draft.content,
            excerpt: draft.excerpt,
            faqs: draft.faqs,
            meta_title: draft.meta_title,
            meta_description: draft.meta_description,
            focus_keyword: draft.focus_keyword,
            content_type: options.content_type,
            quality_score: scored.metrics.score,
            risk_level: assessment.risk_level,
            risk_flags: scored.risk_flags,
            validation_flags,
            requires_human_review,
            review_reasons,
            contributor_id: contributor.as_ref().map(|c| c.id.clone()),
            contributor_name: contributor.as_ref().map(|c| c.name.clone()),
            monetization_slots: slots,
            status,
            auto_publish_at,
            generated_at: now,
            reasoning: reasoning.clone(),
        })
    }

    /// サイト設定の構造パスを反映したルール
    async fn effective_rules(&self) -> Arc<RulesConfig> {
        let rules = self.rules.active().await;
        let missing: Vec<&String> = self
            .structural_link_prefixes
            .iter()
            .filter(|p| !rules.structural_link_prefixes.contains(p))
            .collect();
        if missing.is_empty() {
            return rules;
        }
        let mut merged = (*rules).clone();
        merged
            .structural_link_prefixes
            .extend(missing.into_iter().cloned());
        Arc::new(merged)
    }

    async fn assign_contributor(
        &self,
        idea: &ContentIdea,
        options: &GenerationOptions,
        reasoning: &mut ReasoningLog,
    ) -> Option<ContributorProfile> {
        let assigner = match (&self.contributors, options.auto_assign_contributor) {
            (Some(assigner), true) => assigner,
            (None, true) => {
                reasoning.record("contributor", "skipped", json!({}), "no contributor assigner");
                return None;
            }
            (_, false) => {
                reasoning.record("contributor", "skipped", json!({}), "auto-assign disabled");
                return None;
            }
        };

        let content_type = options.content_type;
        match self
            .policy
            .call("contributor", || assigner.assign(idea, content_type))
            .await
        {
            Ok(Some(contributor)) => {
                reasoning.record(
                    "contributor",
                    format!("assigned {}", contributor.name),
                    json!({ "id": contributor.id, "expertise": contributor.expertise_areas }),
                    "best expertise match",
                );
                Some(contributor)
            }
            Ok(None) => {
                reasoning.record("contributor", "none", json!({}), "no matching contributor");
                None
            }
            Err(e) => {
                warn!("Contributor assignment failed, continuing without: {}", e);
                reasoning.warn(format!("contributor assignment failed: {}", e));
                reasoning.record("contributor", "failed", json!({}), e.to_string());
                None
            }
        }
    }

    /// リライトに成功した場合のみ本文を返す
    async fn humanize(
        &self,
        draft: &ArticleDraft,
        contributor: Option<&ContributorProfile>,
        options: &GenerationOptions,
        reasoning: &mut ReasoningLog,
    ) -> Option<String> {
        let humanizer = match (&self.humanizer, options.humanize) {
            (Some(humanizer), true) => humanizer,
            (None, true) => {
                reasoning.record(
                    "humanize",
                    "skipped",
                    json!({}),
                    "no rewrite provider configured",
                );
                return None;
            }
            (_, false) => {
                reasoning.record("humanize", "skipped", json!({}), "humanization disabled");
                return None;
            }
        };

        let humanize_options = HumanizeOptions {
            title: Some(draft.title.clone()),
            voice: contributor.and_then(|c| c.voice_profile.clone()),
        };
        let mut breaker = CircuitBreaker::new();
        match humanizer
            .humanize(&draft.content, &humanize_options, &mut breaker)
            .await
        {
            Ok(outcome) => {
                reasoning.add_source(format!("rewrite:{}", outcome.provider));
                let kept = outcome.chunks.iter().filter(|c| c.kept_original).count();
                reasoning.record(
                    "humanize",
                    format!("rewritten by {}", outcome.provider),
                    json!({
                        "mode": outcome.mode,
                        "chunks": outcome.chunks.len(),
                        "kept_original": kept,
                        "average_score": outcome.average_score(),
                        "tripped": breaker.tripped(),
                    }),
                    "formatting repaired after rewrite",
                );
                Some(outcome.content)
            }
            Err(e) => {
                warn!("Humanization failed, keeping draft content: {}", e);
                reasoning.warn(format!("humanization failed: {}", e));
                reasoning.record(
                    "humanize",
                    "failed",
                    json!({ "tripped": breaker.tripped() }),
                    e.to_string(),
                );
                None
            }
        }
    }

    /// 内部リンクと収益化スロットを適用
    async fn enrich(
        &self,
        content: &str,
        draft: &ArticleDraft,
        idea: &ContentIdea,
        options: &GenerationOptions,
        reasoning: &mut ReasoningLog,
    ) -> Enriched {
        let mut content = content.to_string();

        match (&self.linker, options.add_internal_links) {
            (Some(linker), true) => match linker.link(&content, &draft.title, &idea.keywords).await {
                Ok(outcome) => {
                    reasoning.add_source("catalog");
                    reasoning.record(
                        "links",
                        format!("inserted {} link(s)", outcome.inserted.len()),
                        json!({
                            "candidates": outcome.candidates_considered,
                            "inserted": outcome.inserted,
                            "skipped": outcome.skipped.len(),
                        }),
                        "weighted catalog relevance",
                    );
                    content = outcome.content;
                }
                Err(e) => {
                    warn!("Internal linking failed, continuing without links: {}", e);
                    reasoning.warn(format!("internal linking failed: {}", e));
                    reasoning.record("links", "failed", json!({}), e.to_string());
                }
            },
            (None, true) => {
                reasoning.record("links", "skipped", json!({}), "no catalog configured");
            }
            (_, false) => {
                reasoning.record("links", "skipped", json!({}), "internal links disabled");
            }
        }

        let mut slots = Vec::new();
        if options.add_monetization {
            let plan = self.monetization.generate_monetization(&MonetizationContext {
                title: &draft.title,
                degree_level: options.degree_level.as_deref(),
                content: &content,
            });
            match &plan.category {
                Some(category) => {
                    reasoning.add_source("sponsorship_taxonomy");
                    reasoning.record(
                        "monetization",
                        format!("{} slot(s) for {}", plan.slots.len(), category.category_id),
                        json!({
                            "category": category.category_id,
                            "concentration": category.concentration_id,
                            "level": category.degree_level,
                            "confidence": category.confidence,
                            "programs": plan.total_programs_selected,
                        }),
                        "title matched sponsorship taxonomy",
                    );
                    content = insert_slots(&content, &plan.slots);
                    slots = plan.slots;
                }
                None => {
                    reasoning.warn(format!("no sponsorship category for \"{}\"", draft.title));
                    reasoning.record("monetization", "skipped", json!({}), "no category match");
                }
            }
        } else {
            reasoning.record("monetization", "skipped", json!({}), "monetization disabled");
        }

        Enriched { content, slots }
    }

    /// 付加後の本文をブロッキング検証
    ///
    /// ブロックされたらヒューマナイズ前の本文に付加をやり直し、それでもだめなら
    /// ドラフト段階で検証を通った本文そのものに戻す。
    #[allow(clippy::too_many_arguments)]
    async fn gate(
        &self,
        enriched: Enriched,
        humanized: bool,
        gated_draft: &str,
        draft: &ArticleDraft,
        idea: &ContentIdea,
        options: &GenerationOptions,
        rules: &Arc<RulesConfig>,
        reasoning: &mut ReasoningLog,
    ) -> Result<Enriched> {
        let blocking = ValidationOptions::blocking(&draft.faqs, Arc::clone(rules));
        let result = self.validator.validate(&enriched.content, &blocking).await;
        if !result.is_blocked {
            reasoning.record("gate", "passed", json!({}), "no blocking issues after enrichment");
            return Ok(enriched);
        }

        let kinds: Vec<&str> = result
            .blocking_issues
            .iter()
            .map(|i| i.issue_type.as_str())
            .collect();
        warn!("Enriched content blocked ({:?}), reverting", kinds);
        reasoning.warn(format!("enriched content blocked: {:?}", kinds));

        if humanized {
            let retry = self.enrich(gated_draft, draft, idea, options, reasoning).await;
            let retried = self.validator.validate(&retry.content, &blocking).await;
            if !retried.is_blocked {
                reasoning.record(
                    "gate",
                    "reverted to pre-humanize content",
                    json!({ "blocked_by": kinds }),
                    "humanized content introduced blocking issues",
                );
                return Ok(retry);
            }
        }

        let fallback = self.validator.validate(gated_draft, &blocking).await;
        if fallback.is_blocked {
            return Err(Error::ContentBlocked {
                stage: "gate".to_string(),
                issues: fallback.blocking_issues,
            });
        }
        reasoning.record(
            "gate",
            "reverted to gated draft",
            json!({ "blocked_by": kinds }),
            "enrichment introduced blocking issues",
        );
        Ok(Enriched {
            content: gated_draft.to_string(),
            slots: Vec::new(),
        })
    }

    /// 品質採点と自動修正。修正後にブロックされたら修正前に戻す
    async fn score_and_fix(
        &self,
        draft: &ArticleDraft,
        options: &GenerationOptions,
        rules: &Arc<RulesConfig>,
        reasoning: &mut ReasoningLog,
    ) -> Result<Scored> {
        let thresholds: QualityThresholds =
            rules.quality.scaled_to_target(options.target_word_count);
        let scorer = QualityScorer::new(thresholds, self.site_domain.clone());

        let repair = match (&self.repair, options.auto_fix && options.max_fix_attempts > 0) {
            (Some(repair), true) => Arc::clone(repair),
            _ => {
                let metrics = scorer.score(&draft.content, &draft.faqs);
                let risk_flags = metrics.issue_types();
                reasoning.record(
                    "autofix",
                    "skipped",
                    json!({ "score": metrics.score, "issues": risk_flags }),
                    if options.auto_fix {
                        "no repair provider configured"
                    } else {
                        "auto-fix disabled"
                    },
                );
                return Ok(Scored {
                    content: draft.content.clone(),
                    metrics,
                    risk_flags,
                });
            }
        };

        let fixer = AutoFixLoop::new(repair, scorer, self.policy.clone());
        let outcome = fixer
            .run(draft.content.clone(), &draft.faqs, options.max_fix_attempts)
            .await?;
        reasoning.record(
            "autofix",
            format!("{:?}", outcome.termination),
            json!({
                "initial_score": outcome.initial_score,
                "final_score": outcome.metrics.score,
                "attempts": outcome.attempts,
                "risk_flags": outcome.risk_flags,
            }),
            "bounded repair loop",
        );

        if outcome.attempts > 0 && outcome.content != draft.content {
            let gate = self
                .validator
                .validate(
                    &outcome.content,
                    &ValidationOptions::blocking(&draft.faqs, Arc::clone(rules)),
                )
                .await;
            if gate.is_blocked {
                warn!("Repaired content is blocked, keeping pre-repair content");
                reasoning.warn("repaired content blocked, reverted");
                let metrics = fixer.scorer().score(&draft.content, &draft.faqs);
                let risk_flags = metrics.issue_types();
                reasoning.record(
                    "autofix",
                    "reverted to pre-repair content",
                    json!({
                        "blocked_by": gate
                            .blocking_issues
                            .iter()
                            .map(|i| i.issue_type.as_str())
                            .collect::<Vec<_>>(),
                    }),
                    "repair introduced blocking issues",
                );
                return Ok(Scored {
                    content: draft.content.clone(),
                    metrics,
                    risk_flags,
                });
            }
        }

        debug!(
            "Auto-fix finished with score {} ({:?})",
            outcome.metrics.score, outcome.termination
        );
        Ok(Scored {
            content: outcome.content,
            metrics: outcome.metrics,
            risk_flags: outcome.risk_flags,
        })
    }
}

fn checkpoint(cancel: &CancellationToken, stage: &str) -> Result<()> {
    if cancel.is_cancelled() {
        info!("Pipeline cancelled before {}", stage);
        return Err(Error::Cancelled {
            stage: stage.to_string(),
        });
    }
    Ok(())
}

fn review_reasons(
    risk_flags: &[String],
    blocking: &[ValidationIssue],
    warnings: &[ValidationIssue],
    assessment: &crate::types::RiskAssessment,
) -> Vec<String> {
    let mut reasons = Vec::new();
    if !risk_flags.is_empty() {
        reasons.push(format!(
            "Unresolved quality issues: {}",
            risk_flags.join(", ")
        ));
    }
    for issue in blocking
        .iter()
        .chain(warnings.iter())
        .filter(|issue| issue.severity >= Severity::Major)
    {
        reasons.push(format!("{}: {}", issue.issue_type, issue.message));
    }
    if assessment.requires_review && reasons.is_empty() {
        reasons.push(format!("Risk level {}", assessment.risk_level));
    }
    reasons
}

/// オーケストレーターのビルダー
pub struct PipelineBuilder {
    draft_provider: Arc<dyn DraftProvider>,
    rules_store: Arc<dyn RulesConfigStore>,
    rewrite_providers: Vec<Arc<dyn RewriteProvider>>,
    repair_provider: Option<Arc<dyn RepairProvider>>,
    catalog: Option<Arc<dyn CatalogLookup>>,
    anchor_suggester: Option<Arc<dyn AnchorSuggester>>,
    institutions: Option<Arc<dyn InstitutionLookup>>,
    contributors: Option<Arc<dyn ContributorAssigner>>,
    config: PipelineConfig,
    linker_seed: Option<u64>,
}

impl PipelineBuilder {
    pub fn new(
        draft_provider: Arc<dyn DraftProvider>,
        rules_store: Arc<dyn RulesConfigStore>,
    ) -> Self {
        Self {
            draft_provider,
            rules_store,
            rewrite_providers: Vec::new(),
            repair_provider: None,
            catalog: None,
            anchor_suggester: None,
            institutions: None,
            contributors: None,
            config: PipelineConfig::default(),
            linker_seed: None,
        }
    }

    /// リライトプロバイダーを優先順に追加
    pub fn rewrite_provider(mut self, provider: Arc<dyn RewriteProvider>) -> Self {
        self.rewrite_providers.push(provider);
        self
    }

    pub fn repair_provider(mut self, provider: Arc<dyn RepairProvider>) -> Self {
        self.repair_provider = Some(provider);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn CatalogLookup>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// 未指定なら `PhraseAnchorSuggester`
    pub fn anchor_suggester(mut self, suggester: Arc<dyn AnchorSuggester>) -> Self {
        self.anchor_suggester = Some(suggester);
        self
    }

    pub fn institutions(mut self, lookup: Arc<dyn InstitutionLookup>) -> Self {
        self.institutions = Some(lookup);
        self
    }

    pub fn contributors(mut self, assigner: Arc<dyn ContributorAssigner>) -> Self {
        self.contributors = Some(assigner);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// リンク候補の乱数シードを固定
    pub fn linker_seed(mut self, seed: u64) -> Self {
        self.linker_seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<PipelineOrchestrator> {
        self.config.validate()?;
        let config = self.config;
        let ttl = config.cache.ttl();

        let mut validator = ContentValidator::new(config.site.domain.clone());
        if let Some(lookup) = self.institutions {
            validator =
                validator.with_institutions(Arc::new(InstitutionDirectory::new(lookup, ttl)));
        }
        if let Some(catalog) = &self.catalog {
            validator = validator.with_catalog(Arc::clone(catalog));
        }
        let validator = Arc::new(validator);

        let linker = self.catalog.map(|catalog| {
            let suggester = self
                .anchor_suggester
                .unwrap_or_else(|| Arc::new(PhraseAnchorSuggester::new()));
            let linker = InternalLinker::new(catalog, suggester, config.linker.clone());
            match self.linker_seed {
                Some(seed) => linker.with_seed(seed),
                None => linker,
            }
        });

        let humanizer = if self.rewrite_providers.is_empty() {
            None
        } else {
            Some(Humanizer::new(
                self.rewrite_providers,
                config.humanizer.clone(),
                config.provider_calls.clone(),
            ))
        };

        info!(
            "Pipeline ready (site {}, humanizer: {}, linker: {}, auto-fix: {})",
            config.site.domain,
            humanizer.is_some(),
            linker.is_some(),
            self.repair_provider.is_some()
        );

        Ok(PipelineOrchestrator {
            rules: Arc::new(RulesCache::new(self.rules_store, ttl)),
            drafts: DraftGenerator::new(
                self.draft_provider,
                Arc::clone(&validator),
                config.provider_calls.clone(),
            ),
            validator,
            humanizer,
            linker,
            monetization: MonetizationEngine::new(config.monetization.clone()),
            repair: self.repair_provider,
            contributors: self.contributors,
            policy: config.provider_calls.clone(),
            risk: RiskAssessor::new(config.risk.clone()),
            auto_publish: config.auto_publish.clone(),
            site_domain: config.site.domain.clone(),
            structural_link_prefixes: config.site.structural_link_prefixes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StaticRulesStore;
    use crate::types::{ArticleDraft, ContentType};
    use async_trait::async_trait;

    struct FixedDraft(String);

    #[async_trait]
    impl DraftProvider for FixedDraft {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate_draft(
            &self,
            _request: &crate::providers::DraftRequest,
        ) -> Result<ArticleDraft> {
            Ok(ArticleDraft {
                content: self.0.clone(),
                ..ArticleDraft::default()
            })
        }
    }

    fn orchestrator(content: &str) -> PipelineOrchestrator {
        PipelineOrchestrator::builder(
            Arc::new(FixedDraft(content.to_string())),
            Arc::new(StaticRulesStore::empty()),
        )
        .build()
        .unwrap()
    }

    #[test]
    fn test_review_reasons() {
        let assessment = crate::types::RiskAssessment {
            requires_review: true,
            risk_level: crate::types::RiskLevel::High,
            ..Default::default()
        };
        let reasons = review_reasons(&[], &[], &[], &assessment);
        assert_eq!(reasons, vec!["Risk level HIGH".to_string()]);

        let warning = ValidationIssue::new(
            IssueType::UnknownInstitution,
            Severity::Major,
            "Unknown institution",
        );
        let reasons = review_reasons(
            &["missing_faqs".to_string()],
            &[],
            &[warning],
            &assessment,
        );
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].contains("missing_faqs"));
        assert!(reasons[1].starts_with("unknown_institution"));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_stage() {
        let pipeline = orchestrator("<p>Complete sentence.</p>");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let request = GenerationRequest::new(
            ContentIdea::new("Best Online MBA Programs"),
            GenerationOptions::new(ContentType::Ranking, 1800),
        );
        let err = pipeline.generate(&request, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { ref stage } if stage == "rules"));
    }

    #[tokio::test]
    async fn test_empty_title_produces_stub() {
        let pipeline = orchestrator("<p>Complete sentence.</p>");
        let request = GenerationRequest::new(ContentIdea::new("  "), GenerationOptions::default());
        let outcome = pipeline
            .generate(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.is_stub());
        assert_eq!(outcome.article().status, ArticleStatus::NeedsManualCompletion);
    }

    #[tokio::test]
    async fn test_site_prefixes_merge_into_rules() {
        let mut config = PipelineConfig::default();
        config.site.structural_link_prefixes = vec!["/programs/".to_string()];
        let pipeline = PipelineOrchestrator::builder(
            Arc::new(FixedDraft(String::new())),
            Arc::new(StaticRulesStore::empty()),
        )
        .config(config)
        .build()
        .unwrap();

        let rules = pipeline.effective_rules().await;
        assert!(rules.structural_link_prefixes.contains(&"/programs/".to_string()));
        assert!(rules.structural_link_prefixes.contains(&"/rankings/".to_string()));
    }

    #[test]
    fn test_from_config_requires_openai() {
        let result = PipelineOrchestrator::from_config(
            PipelineConfig::default(),
            Arc::new(StaticRulesStore::empty()),
        );
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }
}
