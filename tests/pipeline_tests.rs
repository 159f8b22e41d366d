//! End-to-end pipeline tests with in-memory collaborators.

use article_forge::content::monetization::slot_locations;
use article_forge::providers::{
    DraftProvider, DraftRequest, InMemoryCatalog, KeywordContributorAssigner, RepairProvider,
    RewriteMode, RewriteOptions, RewriteProvider, RewriteResult, StaticRulesStore,
};
use article_forge::retry::CallPolicy;
use article_forge::rules::RulesConfig;
use article_forge::types::{
    ArticleDraft, CatalogEntry, ContributorProfile, Faq, IssueType, ValidationIssue,
};
use article_forge::{
    ArticleStatus, ContentIdea, ContentType, Error, GenerationOptions, GenerationRequest,
    PipelineConfig, PipelineOrchestrator, Result, RiskLevel,
};
use async_trait::async_trait;
use chrono::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const PARAGRAPHS: &[&str] = &[
    "An online MBA lets working professionals keep their jobs while they study. Most programs run on flexible schedules with recorded lectures. Students still complete group projects and case studies with classmates. Many graduates say the degree helped them move into leadership roles within a few years.",
    "Tuition varies widely between programs, so affordable options deserve a close look. Public schools often charge lower rates for residents of their state. Some programs also offer a flat rate for distance learners. Always compare the total cost rather than the price per credit hour.",
    "Financial aid can cover a large share of the cost for many students. Federal loans, employer tuition benefits, and scholarships are the most common sources. Students should file the FAFSA early each year. Program advisors can explain which aid options apply to graduate study.",
    "Accreditation matters when you compare business schools. Look for programs accredited by AACSB, ACBSP, or IACBE. Employers recognize these agencies and often prefer graduates from accredited programs. Accreditation also affects whether credits transfer between schools.",
    "Many students pair the MBA with a concentration such as business analytics or finance. A concentration lets you build deeper skills in one area of management. Some students also hold an accounting degree before they enroll. Others use electives to explore new fields before choosing a path.",
    "Career outcomes are a key reason to earn the degree. According to the BLS, employment in management occupations is projected to grow over the next decade. Median pay for these roles is well above the national median for all workers. Networking during the program can open doors to new employers.",
];

const SECTIONS: &[&str] = &[
    "Why Earn an Online MBA",
    "How We Ranked These Programs",
    "Affordable Online MBA Options",
    "Paying for Your Degree",
    "Accreditation and Quality",
    "Popular Concentrations",
    "Career Outcomes and Salary",
    "Choosing the Right Format",
];

fn mba_article() -> String {
    let mut html = String::from(
        "<p>Choosing among the best online MBA programs takes research. This guide ranks affordable programs by cost, flexibility, and career support. Each section below explains one factor that shaped our list. Use it to build a shortlist before you contact admissions teams.</p>\
         <p>We reviewed tuition data, accreditation status, and graduate outcomes. Salary figures come from the <a href=\"https://www.bls.gov/ooh/management/\">Bureau of Labor Statistics</a>. Program details were checked against each school's published catalog. Rankings are updated every year as programs change.</p>",
    );
    for (index, title) in SECTIONS.iter().enumerate() {
        html.push_str(&format!(
            "<h2 id=\"section-{}\">{}</h2>",
            index + 1,
            title
        ));
        for offset in 0..3 {
            html.push_str("<p>");
            html.push_str(PARAGRAPHS[(index + offset) % PARAGRAPHS.len()]);
            html.push_str("</p>");
        }
    }
    html.push_str(
        "<h2 id=\"final-thoughts\">Final Thoughts</h2>\
         <p>The right online MBA depends on your budget, schedule, and career goals. Start with accredited programs that fit your finances. Then compare concentrations and support services. Browse our <a href=\"/rankings/business/\">business rankings</a> for more options.</p>",
    );
    html
}

fn mba_faqs() -> Vec<Faq> {
    vec![
        Faq::new(
            "How long does an online MBA take?",
            "Most full-time students finish in about two years, while part-time students often take three.",
        ),
        Faq::new(
            "Is an online MBA respected by employers?",
            "Yes. Employers generally treat accredited online degrees the same as campus degrees.",
        ),
        Faq::new(
            "Can I work while earning an online MBA?",
            "Yes. Most online programs are designed for students who keep working full time.",
        ),
    ]
}

/// 用意した本文を返すドラフトプロバイダー
struct ScriptedDraft {
    content: String,
    faqs: Vec<Faq>,
    requests: Mutex<Vec<(u32, usize)>>,
    cancel_on_call: Option<CancellationToken>,
}

impl ScriptedDraft {
    fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            faqs: mba_faqs(),
            requests: Mutex::new(Vec::new()),
            cancel_on_call: None,
        }
    }

    fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_call = Some(token);
        self
    }

    fn requests(&self) -> Vec<(u32, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DraftProvider for ScriptedDraft {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_draft(&self, request: &DraftRequest) -> Result<ArticleDraft> {
        self.requests
            .lock()
            .unwrap()
            .push((request.attempt, request.target_word_count));
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        Ok(ArticleDraft {
            title: request.idea.title.clone(),
            content: self.content.clone(),
            excerpt: "A ranked look at affordable online MBA programs.".to_string(),
            faqs: self.faqs.clone(),
            meta_title: String::new(),
            meta_description: "Compare affordable online MBA programs.".to_string(),
            focus_keyword: String::new(),
        })
    }
}

struct FailingDraft;

#[async_trait]
impl DraftProvider for FailingDraft {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate_draft(&self, _request: &DraftRequest) -> Result<ArticleDraft> {
        Err(Error::provider("failing", "upstream returned 503"))
    }
}

/// 入力をそのまま返すリライトプロバイダー
struct EchoRewriter {
    name: &'static str,
    mode: RewriteMode,
    calls: AtomicUsize,
    suffix: &'static str,
}

impl EchoRewriter {
    fn new(name: &'static str, mode: RewriteMode) -> Self {
        Self {
            name,
            mode,
            calls: AtomicUsize::new(0),
            suffix: "",
        }
    }

    fn appending(mut self, suffix: &'static str) -> Self {
        self.suffix = suffix;
        self
    }
}

#[async_trait]
impl RewriteProvider for EchoRewriter {
    fn name(&self) -> &str {
        self.name
    }

    fn mode(&self) -> RewriteMode {
        self.mode
    }

    async fn humanize(&self, text: &str, _options: &RewriteOptions) -> Result<RewriteResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RewriteResult {
            text: format!("{}{}", text, self.suffix),
            naturalness_score: Some(92.0),
        })
    }
}

struct FailingRewriter {
    calls: AtomicUsize,
}

#[async_trait]
impl RewriteProvider for FailingRewriter {
    fn name(&self) -> &str {
        "rewrite-api"
    }

    fn mode(&self) -> RewriteMode {
        RewriteMode::Chunked
    }

    async fn humanize(&self, _text: &str, _options: &RewriteOptions) -> Result<RewriteResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::provider("rewrite-api", "service unavailable"))
    }
}

/// 外部リンクを1つ足す修正プロバイダー
struct CitingRepair {
    calls: AtomicUsize,
}

#[async_trait]
impl RepairProvider for CitingRepair {
    fn name(&self) -> &str {
        "citing"
    }

    async fn fix(&self, content: &str, _issues: &[ValidationIssue]) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call > 0 {
            return Ok(content.to_string());
        }
        Ok(format!(
            "{}<p>Enrollment trends are published by <a href=\"https://nces.ed.gov/\">NCES</a>.</p>",
            content
        ))
    }
}

fn catalog() -> InMemoryCatalog {
    let entry = |title: &str, url: &str, topic: &str| CatalogEntry {
        title: title.to_string(),
        url: url.to_string(),
        topics: vec![topic.to_string()],
        category: "online programs".to_string(),
        excerpt: String::new(),
    };
    InMemoryCatalog::new(vec![
        entry(
            "Cheapest Online MBA Programs",
            "https://example.edu/online-mba/cheapest/",
            "online mba",
        ),
        entry(
            "Business Analytics Degrees Online",
            "https://example.edu/business-analytics-degrees/",
            "business analytics",
        ),
        entry(
            "Accounting Degree Guide",
            "https://example.edu/accounting-degree-guide/",
            "accounting degree",
        ),
        entry(
            "Financial Aid for Online Programs",
            "https://example.edu/financial-aid-online/",
            "financial aid",
        ),
    ])
}

fn contributors() -> KeywordContributorAssigner {
    KeywordContributorAssigner::new(vec![ContributorProfile {
        id: "c-101".to_string(),
        name: "Jordan Ellis".to_string(),
        expertise_areas: vec!["mba".to_string(), "business".to_string()],
        voice_profile: Some("Plainspoken and practical".to_string()),
    }])
}

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.humanizer.chunk_delay_ms = 0;
    config.provider_calls = CallPolicy::single_attempt(5);
    config
}

fn mba_request() -> GenerationRequest {
    GenerationRequest::new(
        ContentIdea::new("Best Online MBA Programs").with_keywords(["online mba", "affordable"]),
        GenerationOptions::new(ContentType::Ranking, 1800),
    )
}

#[tokio::test]
async fn test_ranking_article_end_to_end() {
    let draft = Arc::new(ScriptedDraft::new(mba_article()));
    let rewriter = Arc::new(EchoRewriter::new("rewrite-api", RewriteMode::Chunked));
    let pipeline = PipelineOrchestrator::builder(
        Arc::clone(&draft) as Arc<dyn DraftProvider>,
        Arc::new(StaticRulesStore::empty()),
    )
    .rewrite_provider(Arc::clone(&rewriter) as Arc<dyn RewriteProvider>)
    .catalog(Arc::new(catalog()))
    .contributors(Arc::new(contributors()))
    .config(test_config())
    .linker_seed(7)
    .build()
    .unwrap();

    let outcome =
        tokio_test::assert_ok!(pipeline.generate(&mba_request(), &CancellationToken::new()).await);
    assert!(!outcome.is_stub());
    let article = outcome.into_article();

    assert_eq!(article.title, "Best Online MBA Programs");
    assert!(
        (900..=1800).contains(&article.word_count),
        "word count {}",
        article.word_count
    );
    assert!(!article.validation_flags.iter().any(|issue| matches!(
        issue.issue_type,
        IssueType::Truncation | IssueType::PlaceholderContent
    )));
    assert_ne!(article.risk_level, RiskLevel::Critical);
    assert_eq!(article.contributor_id.as_deref(), Some("c-101"));
    assert_eq!(article.status, ArticleStatus::ReadyForReview);
    assert!(article.auto_publish_at.is_none());
    assert!(article.content.trim_end().ends_with("</p>"));

    // 見出しはリライト後も元のidを保持する
    assert!(article.content.contains("<h2 id=\"section-1\">Why Earn an Online MBA</h2>"));
    assert!(rewriter.calls.load(Ordering::SeqCst) > 0);

    assert_eq!(article.monetization_slots.len(), 3);
    assert!(article.content.contains("data-position=\"after_intro\""));
    assert!(article.content.contains("category=\"business\""));
    assert!(article.content.contains("level=\"masters\""));
    assert_eq!(slot_locations(&article.content).len(), 3);

    assert!(article.content.contains("https://example.edu/online-mba/cheapest/"));

    let stages = article.reasoning.stage_names();
    for stage in [
        "rules",
        "contributor",
        "draft",
        "humanize",
        "links",
        "monetization",
        "gate",
        "autofix",
        "validate",
        "risk",
        "schedule",
    ] {
        assert!(stages.contains(&stage), "missing stage {}", stage);
    }
    let sources = article.reasoning.data_sources();
    assert!(sources.contains(&"draft:scripted".to_string()));
    assert!(sources.contains(&"rewrite:rewrite-api".to_string()));
    assert!(sources.contains(&"catalog".to_string()));
    assert_eq!(draft.requests(), vec![(1, 1800)]);
}

#[tokio::test]
async fn test_humanizer_falls_back_to_next_provider() {
    let failing = Arc::new(FailingRewriter {
        calls: AtomicUsize::new(0),
    });
    let fallback = Arc::new(EchoRewriter::new("llm-rewrite", RewriteMode::WholeDocument));
    let pipeline = PipelineOrchestrator::builder(
        Arc::new(ScriptedDraft::new(mba_article())),
        Arc::new(StaticRulesStore::empty()),
    )
    .rewrite_provider(Arc::clone(&failing) as Arc<dyn RewriteProvider>)
    .rewrite_provider(Arc::clone(&fallback) as Arc<dyn RewriteProvider>)
    .config(test_config())
    .build()
    .unwrap();

    let outcome = pipeline
        .generate(&mba_request(), &CancellationToken::new())
        .await
        .unwrap();
    let article = outcome.article();

    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    let humanize = article.reasoning.get("humanize").unwrap();
    assert_eq!(humanize.decision, "rewritten by llm-rewrite");
    assert_eq!(humanize.inputs["tripped"][0], "rewrite-api");
    assert!(article
        .reasoning
        .data_sources()
        .contains(&"rewrite:llm-rewrite".to_string()));
}

#[tokio::test]
async fn test_blocked_rewrite_reverts_to_pre_humanize_content() {
    let rewriter = EchoRewriter::new("llm-rewrite", RewriteMode::WholeDocument)
        .appending("<p>Compare tuition at University X and University Y before you apply.</p>");
    let pipeline = PipelineOrchestrator::builder(
        Arc::new(ScriptedDraft::new(mba_article())),
        Arc::new(StaticRulesStore::empty()),
    )
    .rewrite_provider(Arc::new(rewriter))
    .config(test_config())
    .build()
    .unwrap();

    let outcome = pipeline
        .generate(&mba_request(), &CancellationToken::new())
        .await
        .unwrap();
    let article = outcome.article();

    assert!(!article.content.contains("University X"));
    assert_eq!(
        article.reasoning.get("gate").unwrap().decision,
        "reverted to pre-humanize content"
    );
    // 付加をやり直すので収益化スロットは残る
    assert_eq!(article.monetization_slots.len(), 3);
}

#[tokio::test]
async fn test_draft_provider_failure_produces_stub() {
    let pipeline = PipelineOrchestrator::builder(
        Arc::new(FailingDraft),
        Arc::new(StaticRulesStore::empty()),
    )
    .config(test_config())
    .build()
    .unwrap();

    let request = GenerationRequest::new(
        ContentIdea::new("Best Online MBA Programs")
            .with_description("Rank affordable online MBA programs for working adults."),
        GenerationOptions::new(ContentType::Ranking, 1800),
    );
    let outcome = pipeline
        .generate(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.is_stub());
    let article = outcome.article();
    assert_eq!(article.status, ArticleStatus::NeedsManualCompletion);
    assert!(article.requires_human_review);
    assert!(article.content.contains("working adults"));
    assert!(article
        .reasoning
        .warnings()
        .iter()
        .any(|w| w.contains("503")));
}

#[tokio::test]
async fn test_truncated_draft_fails_after_retry() {
    let draft = Arc::new(ScriptedDraft::new(
        "<h2>Overview</h2><p>Online programs are a strong fit for working adults and the",
    ));
    let pipeline = PipelineOrchestrator::builder(
        Arc::clone(&draft) as Arc<dyn DraftProvider>,
        Arc::new(StaticRulesStore::empty()),
    )
    .config(test_config())
    .build()
    .unwrap();

    let err = tokio_test::assert_err!(
        pipeline
            .generate(&mba_request(), &CancellationToken::new())
            .await
    );
    assert!(matches!(err, Error::DraftValidationFailed { .. }));
    assert_eq!(err.blocking_issues()[0].issue_type, IssueType::Truncation);
    assert_eq!(draft.requests(), vec![(1, 1800), (2, 2000)]);
}

#[tokio::test]
async fn test_cancellation_stops_at_next_stage_boundary() {
    let cancel = CancellationToken::new();
    let rewriter = Arc::new(EchoRewriter::new("rewrite-api", RewriteMode::Chunked));
    let pipeline = PipelineOrchestrator::builder(
        Arc::new(ScriptedDraft::new(mba_article()).cancelling(cancel.clone())),
        Arc::new(StaticRulesStore::empty()),
    )
    .rewrite_provider(Arc::clone(&rewriter) as Arc<dyn RewriteProvider>)
    .config(test_config())
    .build()
    .unwrap();

    let err = pipeline
        .generate(&mba_request(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled { ref stage } if stage == "humanize"));
    assert_eq!(rewriter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unapproved_author_is_critical() {
    let rules = RulesConfig {
        version: 3,
        approved_authors: vec!["c-900".to_string()],
        ..RulesConfig::default()
    };
    let pipeline = PipelineOrchestrator::builder(
        Arc::new(ScriptedDraft::new(mba_article())),
        Arc::new(StaticRulesStore::new(rules)),
    )
    .contributors(Arc::new(contributors()))
    .config(test_config())
    .build()
    .unwrap();

    let outcome = pipeline
        .generate(&mba_request(), &CancellationToken::new())
        .await
        .unwrap();
    let article = outcome.article();

    assert_eq!(article.risk_level, RiskLevel::Critical);
    assert!(article.requires_human_review);
    assert_eq!(article.status, ArticleStatus::ReadyForReview);
    assert!(article
        .validation_flags
        .iter()
        .any(|issue| issue.issue_type == IssueType::UnapprovedAuthor));
    assert!(article
        .reasoning
        .data_sources()
        .contains(&"rules:v3".to_string()));
}

#[tokio::test]
async fn test_low_risk_article_is_scheduled() {
    let mut config = test_config();
    config.auto_publish.enabled = true;
    config.auto_publish.min_quality_score = 0;
    config.auto_publish.delay_hours = 12;
    config.risk.high_risk_score = 1_000;
    config.risk.medium_risk_score = 1_000;
    config.risk.quality_high_risk_below = 0;
    config.risk.quality_medium_risk_below = 0;

    let pipeline = PipelineOrchestrator::builder(
        Arc::new(ScriptedDraft::new(mba_article())),
        Arc::new(StaticRulesStore::empty()),
    )
    .contributors(Arc::new(contributors()))
    .config(config)
    .build()
    .unwrap();

    let article = pipeline
        .generate(&mba_request(), &CancellationToken::new())
        .await
        .unwrap()
        .into_article();

    assert_eq!(article.risk_level, RiskLevel::Low);
    assert_eq!(article.status, ArticleStatus::Scheduled);
    assert_eq!(
        article.auto_publish_at,
        Some(article.generated_at + Duration::hours(12))
    );
}

#[tokio::test]
async fn test_auto_fix_repairs_missing_external_link() {
    let content = mba_article().replace(
        "<a href=\"https://www.bls.gov/ooh/management/\">Bureau of Labor Statistics</a>",
        "Bureau of Labor Statistics",
    );
    let repair = Arc::new(CitingRepair {
        calls: AtomicUsize::new(0),
    });
    let pipeline = PipelineOrchestrator::builder(
        Arc::new(ScriptedDraft::new(content)),
        Arc::new(StaticRulesStore::empty()),
    )
    .repair_provider(Arc::clone(&repair) as Arc<dyn RepairProvider>)
    .config(test_config())
    .build()
    .unwrap();

    let mut request = mba_request();
    request.options.humanize = false;
    let article = pipeline
        .generate(&request, &CancellationToken::new())
        .await
        .unwrap()
        .into_article();

    assert!(article.content.contains("https://nces.ed.gov/"));
    assert!(!article
        .risk_flags
        .contains(&"missing_external_links".to_string()));
    let autofix = article.reasoning.get("autofix").unwrap();
    assert!(
        autofix.inputs["final_score"].as_u64().unwrap()
            > autofix.inputs["initial_score"].as_u64().unwrap()
    );
    assert!(repair.calls.load(Ordering::SeqCst) >= 1);
}
