use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::citation::{self, CachedAuthority, CitationRanker, StaticAuthorityTable};
use crate::config::Config;
use crate::provider::{ContentSource, KeywordMetric, ResearchBundle, SourceError};
use crate::quality::{QualityScorer, ScoringContext};
use crate::router::Router;
use crate::sanitize;

use super::config::{GenerationMode, PipelineSettings};
use super::context::{
    normalize_keywords, normalize_topic, CompetitorSummary, ContentRequest, GeneratedContent,
    IntentAnalysis, KeywordPlan, PipelineContext, SearchIntent,
};
use super::error::{PipelineError, PipelineWarning, StageError};
use super::progress::{ProgressReporter, StageProgress};
use super::prompts;
use super::stage::Stage;

const MAX_SECONDARY_KEYWORDS: usize = 8;
const MAX_RELATED_TERMS: usize = 12;
const MAX_COMMON_HEADINGS: usize = 10;
const AUTHORITY_CACHE_CAPACITY: u64 = 10_000;
const META_MAX_CHARS: usize = 155;

/// Cancellation and deadline for one run.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// What a stage reports when it finishes.
struct StageOutcome {
    message: String,
    metadata: Map<String, Value>,
}

impl StageOutcome {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            metadata: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

pub struct Pipeline {
    settings: Arc<PipelineSettings>,
    content_source: Arc<dyn ContentSource>,
    ranker: CitationRanker,
    scorer: QualityScorer,
}

impl Pipeline {
    pub fn new(
        settings: Arc<PipelineSettings>,
        content_source: Arc<dyn ContentSource>,
        ranker: CitationRanker,
        scorer: QualityScorer,
    ) -> Self {
        Self {
            settings,
            content_source,
            ranker,
            scorer,
        }
    }

    /// Production constructor: built-in authority table behind a TTL cache.
    pub fn from_config(config: &Config, content_source: Arc<dyn ContentSource>) -> Self {
        let lookup = CachedAuthority::new(
            StaticAuthorityTable::default(),
            Duration::from_secs(config.citations.authority_cache_ttl_secs),
            AUTHORITY_CACHE_CAPACITY,
        );
        Self::new(
            Arc::new(PipelineSettings::from_config(config)),
            content_source,
            CitationRanker::new(Arc::new(lookup)),
            QualityScorer::new(config.quality.clone()),
        )
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn new_context(&self, job_id: &str, request: &ContentRequest) -> PipelineContext {
        PipelineContext::new(job_id, request, self.settings.default_mode)
    }

    /// Runs every stage in order over `ctx`.
    /// Returns the result together with the context, which on failure holds
    /// everything produced up to the failing stage.
    pub async fn run(
        &self,
        mut ctx: PipelineContext,
        router: &Router,
        progress: &dyn ProgressReporter,
        control: &RunControl,
    ) -> (Result<GeneratedContent, PipelineError>, PipelineContext) {
        let span = info_span!("pipeline",
            job_id = %ctx.job_id,
            topic = %sanitize::summarize(&ctx.topic, 80),
            mode = ctx.mode.as_str(),
            providers = router.snapshot().version(),
        );
        let result = self
            .run_stages(&mut ctx, router, progress, control)
            .instrument(span)
            .await;
        (result, ctx)
    }

    async fn run_stages(
        &self,
        ctx: &mut PipelineContext,
        router: &Router,
        progress: &dyn ProgressReporter,
        control: &RunControl,
    ) -> Result<GeneratedContent, PipelineError> {
        for stage in Stage::ALL {
            if control.is_cancelled() {
                info!(stage = %stage, "Cancellation observed at stage boundary");
                return Err(PipelineError::Cancelled { stage });
            }
            if control.deadline_passed() {
                warn!(stage = %stage, "Job deadline passed at stage boundary");
                return Err(PipelineError::TimedOut { stage });
            }

            progress.stage_started(stage);
            ctx.reset_stage(stage);

            if ctx.mode == GenerationMode::Quick && !stage.is_mandatory() {
                debug!(stage = %stage, "Skipping optional stage in quick mode");
                let mut metadata = Map::new();
                metadata.insert("skipped".to_string(), Value::Bool(true));
                ctx.metadata.insert(stage, metadata.clone());
                progress.report(
                    StageProgress::new(stage, 1.0, format!("Skipped {} (quick mode)", stage))
                        .with_metadata(metadata),
                );
                continue;
            }

            let started = Instant::now();
            let outcome = self
                .execute(stage, ctx, router, control)
                .instrument(info_span!("stage", stage = stage.as_str()))
                .await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(outcome) => {
                    let mut metadata = outcome.metadata;
                    metadata.insert("duration_ms".to_string(), duration_ms.into());
                    if let Some(cost) = ctx.stage_costs.get(&stage) {
                        metadata.insert("tokens".to_string(), cost.total_tokens().into());
                        metadata.insert("cost_usd".to_string(), cost.cost_usd.into());
                    }
                    debug!(stage = %stage, duration_ms, "Stage completed");
                    ctx.completed_stages.push(stage);
                    ctx.metadata.insert(stage, metadata.clone());
                    progress.report(
                        StageProgress::new(stage, 1.0, outcome.message).with_metadata(metadata),
                    );
                }
                Err(error) if error.is_deadline() => {
                    warn!(stage = %stage, "Job deadline passed during stage");
                    return Err(PipelineError::TimedOut { stage });
                }
                Err(error) if stage.is_mandatory() => {
                    warn!(stage = %stage, error = %error, "Mandatory stage failed");
                    return Err(PipelineError::StageFailed {
                        stage,
                        source: error,
                    });
                }
                Err(error) => {
                    warn!(stage = %stage, error = %error, "Optional stage degraded");
                    let mut metadata = Map::new();
                    metadata.insert("degraded".to_string(), Value::Bool(true));
                    metadata.insert("reason".to_string(), error.to_string().into());
                    metadata.insert("duration_ms".to_string(), duration_ms.into());
                    ctx.warnings.push(degrade_warning(stage, &error));
                    ctx.metadata.insert(stage, metadata.clone());
                    progress.report(
                        StageProgress::new(stage, 1.0, format!("{} degraded: {}", stage, error))
                            .with_metadata(metadata),
                    );
                }
            }
        }

        assemble(ctx)
    }

    async fn execute(
        &self,
        stage: Stage,
        ctx: &mut PipelineContext,
        router: &Router,
        control: &RunControl,
    ) -> Result<StageOutcome, StageError> {
        match stage {
            Stage::Initialization => self.step_initialization(ctx),
            Stage::KeywordAnalysis => self.step_keyword_analysis(ctx, control).await,
            Stage::CompetitorAnalysis => self.step_competitor_analysis(ctx),
            Stage::IntentAnalysis => self.step_intent_analysis(ctx, router).await,
            Stage::LengthTargeting => self.step_length_targeting(ctx),
            Stage::ResearchOutline => self.step_research_outline(ctx, router).await,
            Stage::DraftGeneration => self.step_draft_generation(ctx, router).await,
            Stage::Enhancement => self.step_enhancement(ctx, router).await,
            Stage::SeoPolish => self.step_seo_polish(ctx, router).await,
            Stage::SemanticIntegration => self.step_semantic_integration(ctx, router).await,
            Stage::CitationGeneration => self.step_citation_generation(ctx),
            Stage::QualityScoring => self.step_quality_scoring(ctx),
            Stage::Finalization => self.step_finalization(ctx),
        }
    }

    fn step_initialization(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        ctx.topic = normalize_topic(&ctx.topic);
        if ctx.topic.is_empty() {
            return Err(StageError::MissingInput("topic".to_string()));
        }
        ctx.keywords = normalize_keywords(&ctx.keywords);

        Ok(StageOutcome::new(format!(
            "Initialized '{}'",
            sanitize::summarize(&ctx.topic, 60)
        ))
        .with("keywords", ctx.keywords.len())
        .with("mode", ctx.mode.as_str()))
    }

    async fn step_keyword_analysis(
        &self,
        ctx: &mut PipelineContext,
        control: &RunControl,
    ) -> Result<StageOutcome, StageError> {
        let bundle = self.fetch_research(ctx, control).await?;
        let plan = build_keyword_plan(&ctx.topic, &ctx.keywords, &bundle);

        let outcome = StageOutcome::new(format!(
            "Planned {} keywords and {} related terms",
            1 + plan.secondary.len(),
            plan.related_terms.len()
        ))
        .with("primary_keyword", plan.primary.clone())
        .with("competitors", bundle.competitors.len())
        .with("citation_candidates", bundle.citation_candidates.len());

        ctx.research = Some(bundle);
        ctx.keyword_plan = Some(plan);
        Ok(outcome)
    }

    /// Bounded by the source call timeout and by the job deadline,
    /// whichever comes first.
    async fn fetch_research(
        &self,
        ctx: &PipelineContext,
        control: &RunControl,
    ) -> Result<ResearchBundle, StageError> {
        let mut limit = self.settings.source_timeout;
        let mut deadline_bound = false;
        if let Some(deadline) = control.deadline() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(StageError::DeadlineExceeded);
            }
            if remaining <= limit {
                limit = remaining;
                deadline_bound = true;
            }
        }

        let fetch = self.content_source.fetch_research(&ctx.topic, &ctx.keywords);
        match tokio::time::timeout(limit, fetch).await {
            Ok(result) => Ok(result?),
            Err(_) if deadline_bound => Err(StageError::DeadlineExceeded),
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "Content source call timed out");
                Err(SourceError::Unavailable(format!(
                    "no response within {} ms",
                    limit.as_millis()
                ))
                .into())
            }
        }
    }

    fn step_competitor_analysis(
        &self,
        ctx: &mut PipelineContext,
    ) -> Result<StageOutcome, StageError> {
        let competitors = ctx
            .research
            .as_ref()
            .map(|r| r.competitors.as_slice())
            .unwrap_or(&[]);
        if competitors.is_empty() {
            return Err(StageError::MissingInput(
                "no competitor pages in research".to_string(),
            ));
        }

        let total_words: u64 = competitors.iter().map(|c| u64::from(c.word_count)).sum();
        let average_word_count = (total_words / competitors.len() as u64) as u32;

        // lowercased heading -> (pages using it, first spelling seen)
        let mut counts: HashMap<String, (usize, String)> = HashMap::new();
        for page in competitors {
            let mut on_page = HashSet::new();
            for heading in &page.headings {
                let display = normalize_topic(heading);
                let key = display.to_lowercase();
                if key.is_empty() || !on_page.insert(key.clone()) {
                    continue;
                }
                counts.entry(key).or_insert((0, display)).0 += 1;
            }
        }
        let mut common: Vec<(String, usize, String)> = counts
            .into_iter()
            .filter(|(_, (n, _))| *n >= 2)
            .map(|(key, (n, display))| (key, n, display))
            .collect();
        common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let summary = CompetitorSummary {
            pages: competitors.len(),
            average_word_count,
            common_headings: common
                .into_iter()
                .take(MAX_COMMON_HEADINGS)
                .map(|(_, _, display)| display)
                .collect(),
        };
        let outcome = StageOutcome::new(format!(
            "Analyzed {} competitor pages (avg {} words)",
            summary.pages, summary.average_word_count
        ))
        .with("common_headings", summary.common_headings.len());

        ctx.competitor_summary = Some(summary);
        Ok(outcome)
    }

    async fn step_intent_analysis(
        &self,
        ctx: &mut PipelineContext,
        router: &Router,
    ) -> Result<StageOutcome, StageError> {
        let routed = router.generate(&prompts::intent(ctx)).await?;
        ctx.record_usage(Stage::IntentAnalysis, &routed);

        let intent = parse_intent(&routed.text);
        ctx.intent = Some(IntentAnalysis {
            intent,
            rationale: routed.text.trim().to_string(),
        });
        Ok(
            StageOutcome::new(format!("Search intent: {}", intent.as_str()))
                .with("provider", routed.provider_id),
        )
    }

    fn step_length_targeting(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        let (base, basis) = match (ctx.requested_word_count, &ctx.competitor_summary) {
            (Some(requested), _) => (requested, "requested"),
            (None, Some(summary)) if summary.average_word_count > 0 => {
                // Slightly longer than the average competitor, in hundreds.
                let words = (f64::from(summary.average_word_count) * 1.1 / 100.0).round() * 100.0;
                (words as u32, "competitors")
            }
            _ => (self.settings.default_target_words, "default"),
        };

        let adjusted = match (basis, ctx.intent.as_ref().map(|i| i.intent)) {
            ("requested", _) => base,
            (_, Some(SearchIntent::Transactional)) | (_, Some(SearchIntent::Navigational)) => {
                (f64::from(base) * 0.8).round() as u32
            }
            _ => base,
        };
        let target = self.settings.clamp_target(adjusted);
        ctx.target_word_count = Some(target);

        Ok(StageOutcome::new(format!("Targeting {} words", target)).with("basis", basis))
    }

    async fn step_research_outline(
        &self,
        ctx: &mut PipelineContext,
        router: &Router,
    ) -> Result<StageOutcome, StageError> {
        let notes = research_notes(ctx);
        let routed = router.generate(&prompts::outline(ctx, &notes)).await?;
        ctx.record_usage(Stage::ResearchOutline, &routed);

        let outline = non_empty(routed.text, Stage::ResearchOutline)?;
        let sections = outline
            .lines()
            .filter(|l| l.trim_start().starts_with("## "))
            .count();
        ctx.research_notes = Some(notes);
        ctx.outline = Some(outline);

        Ok(StageOutcome::new(format!("Outlined {} sections", sections))
            .with("provider", routed.provider_id))
    }

    async fn step_draft_generation(
        &self,
        ctx: &mut PipelineContext,
        router: &Router,
    ) -> Result<StageOutcome, StageError> {
        let request = prompts::draft(ctx);
        let routed = if self.settings.consensus_drafting {
            router.generate_consensus(&request).await?
        } else {
            router.generate(&request).await?
        };
        ctx.record_usage(Stage::DraftGeneration, &routed);

        let mut outcome = StageOutcome::new("Draft written")
            .with("provider", routed.provider_id.clone())
            .with("attempts", routed.attempts);
        let consensus = routed.consensus.clone();
        let text = non_empty(routed.text, Stage::DraftGeneration)?;

        if let Some(summary) = consensus {
            outcome = outcome.with(
                "consensus",
                serde_json::to_value(&summary).unwrap_or(Value::Null),
            );
            if !summary.synthesized {
                ctx.warnings.push(PipelineWarning::ConsensusDegraded {
                    stage: Stage::DraftGeneration,
                    note: summary
                        .note
                        .unwrap_or_else(|| "consensus produced a single answer".to_string()),
                });
            }
        }

        outcome.message = format!("Draft written ({} words)", word_count(&text));
        ctx.draft_text = Some(text);
        Ok(outcome)
    }

    async fn step_enhancement(
        &self,
        ctx: &mut PipelineContext,
        router: &Router,
    ) -> Result<StageOutcome, StageError> {
        let input = current_text(ctx, "draft text")?;
        let routed = router.generate(&prompts::enhancement(ctx, &input)).await?;
        ctx.record_usage(Stage::Enhancement, &routed);

        let text = non_empty(routed.text, Stage::Enhancement)?;
        let message = format!("Enhanced draft ({} words)", word_count(&text));
        ctx.enhanced_text = Some(text);
        Ok(StageOutcome::new(message).with("provider", routed.provider_id))
    }

    async fn step_seo_polish(
        &self,
        ctx: &mut PipelineContext,
        router: &Router,
    ) -> Result<StageOutcome, StageError> {
        let input = current_text(ctx, "article text")?;
        let routed = router.generate(&prompts::seo_polish(ctx, &input)).await?;
        ctx.record_usage(Stage::SeoPolish, &routed);

        let text = non_empty(routed.text, Stage::SeoPolish)?;
        let title = derive_title(&text, &ctx.topic);
        let meta = derive_meta_description(&text);

        let outcome = StageOutcome::new(format!("Polished for '{}'", ctx.primary_keyword()))
            .with("provider", routed.provider_id)
            .with("title_chars", title.chars().count())
            .with("meta_chars", meta.chars().count());
        ctx.polished_text = Some(text);
        ctx.title = Some(title);
        ctx.meta_description = Some(meta);
        Ok(outcome)
    }

    async fn step_semantic_integration(
        &self,
        ctx: &mut PipelineContext,
        router: &Router,
    ) -> Result<StageOutcome, StageError> {
        let terms = ctx.related_terms().to_vec();
        if terms.is_empty() {
            return Err(StageError::MissingInput(
                "no related terms to integrate".to_string(),
            ));
        }
        let input = current_text(ctx, "article text")?;
        let routed = router
            .generate(&prompts::semantic_integration(ctx, &input, &terms))
            .await?;
        ctx.record_usage(Stage::SemanticIntegration, &routed);

        let text = non_empty(routed.text, Stage::SemanticIntegration)?;
        let lower = text.to_lowercase();
        let used = terms
            .iter()
            .filter(|t| lower.contains(&t.to_lowercase()))
            .count();
        ctx.integrated_text = Some(text);

        Ok(
            StageOutcome::new(format!("Integrated {} of {} related terms", used, terms.len()))
                .with("provider", routed.provider_id),
        )
    }

    fn step_citation_generation(
        &self,
        ctx: &mut PipelineContext,
    ) -> Result<StageOutcome, StageError> {
        let citations = match &ctx.research {
            Some(research) if !research.citation_candidates.is_empty() => self
                .ranker
                .rank_and_filter(&research.citation_candidates, &self.settings.ranking),
            _ => {
                return Err(StageError::Source(SourceError::Unavailable(
                    "research returned no citation candidates".to_string(),
                )))
            }
        };
        let input = current_text(ctx, "article text")?;
        let cited = citation::integrate(&input, &citations);

        let inline = citations
            .iter()
            .filter(|c| cited.matches(&format!("[{}]", c.marker)).count() > 1)
            .count();
        let outcome = StageOutcome::new(format!(
            "Cited {} sources ({} inline)",
            citations.len(),
            inline
        ))
        .with("citations", citations.len());

        ctx.citations = citations;
        ctx.cited_text = Some(cited);
        Ok(outcome)
    }

    fn step_quality_scoring(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        let report = {
            let text = ctx
                .latest_text()
                .ok_or_else(|| StageError::MissingInput("article text".to_string()))?;
            // Score with the title and meta description the result will ship.
            let (title, meta) = title_and_meta(ctx, text);
            let scoring = ScoringContext {
                title: Some(&title),
                meta_description: Some(&meta),
                ..ctx.scoring_context()
            };
            self.scorer.score(text, &scoring)
        };

        let outcome = StageOutcome::new(format!(
            "Composite quality {:.2} ({})",
            report.composite_score,
            if report.passed_threshold {
                "passed"
            } else {
                "below threshold"
            }
        ))
        .with("composite_score", report.composite_score)
        .with("passed_threshold", report.passed_threshold)
        .with("critical_issues", report.critical_issues.len());

        ctx.quality = Some(report);
        Ok(outcome)
    }

    fn step_finalization(&self, ctx: &mut PipelineContext) -> Result<StageOutcome, StageError> {
        if ctx.quality.is_none() {
            return Err(StageError::MissingInput("quality report".to_string()));
        }
        let text = current_text(ctx, "article text")?.trim().to_string();
        if text.is_empty() {
            return Err(StageError::EmptyOutput(Stage::Finalization));
        }

        let message = format!("Finalized {} words", word_count(&text));
        ctx.final_text = Some(text);
        Ok(StageOutcome::new(message))
    }
}

/// Builds the run result from a context whose mandatory stages all ran.
fn assemble(ctx: &PipelineContext) -> Result<GeneratedContent, PipelineError> {
    let missing = |what: &str| PipelineError::StageFailed {
        stage: Stage::Finalization,
        source: StageError::MissingInput(what.to_string()),
    };
    let final_text = ctx.final_text.clone().ok_or_else(|| missing("final text"))?;
    let quality = ctx.quality.clone().ok_or_else(|| missing("quality report"))?;

    let (title, meta_description) = title_and_meta(ctx, &final_text);

    Ok(GeneratedContent {
        title,
        meta_description,
        word_count: word_count(&final_text),
        final_text,
        mode: ctx.mode,
        target_word_count: ctx.target_word_count.unwrap_or_default(),
        citations: ctx.citations.clone(),
        quality,
        stage_costs: ctx.stage_costs.values().cloned().collect(),
        total_tokens: ctx.total_tokens(),
        total_cost_usd: ctx.total_cost(),
        warnings: ctx.warnings.clone(),
    })
}

/// Title and meta description from SEO polish, derived from `text` when
/// that stage was skipped or degraded.
fn title_and_meta(ctx: &PipelineContext, text: &str) -> (String, String) {
    let title = ctx
        .title
        .clone()
        .unwrap_or_else(|| derive_title(text, &ctx.topic));
    let meta = ctx
        .meta_description
        .clone()
        .unwrap_or_else(|| derive_meta_description(text));
    (title, meta)
}

fn degrade_warning(stage: Stage, error: &StageError) -> PipelineWarning {
    match (stage, error) {
        (Stage::CitationGeneration, StageError::Source(_)) => {
            PipelineWarning::CitationSourceUnavailable {
                reason: error.to_string(),
            }
        }
        _ => PipelineWarning::StageDegraded {
            stage,
            reason: error.to_string(),
        },
    }
}

fn build_keyword_plan(topic: &str, keywords: &[String], bundle: &ResearchBundle) -> KeywordPlan {
    let mut metrics: Vec<&KeywordMetric> = bundle.keywords.iter().collect();
    metrics.sort_by(|a, b| {
        b.search_volume
            .cmp(&a.search_volume)
            .then(a.difficulty.cmp(&b.difficulty))
            .then_with(|| a.term.cmp(&b.term))
    });

    let primary = keywords
        .first()
        .cloned()
        .or_else(|| metrics.first().map(|m| normalize_topic(&m.term)))
        .unwrap_or_else(|| topic.to_string());

    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(primary.to_lowercase());

    let secondary: Vec<String> = keywords
        .iter()
        .skip(1)
        .cloned()
        .chain(metrics.iter().map(|m| normalize_topic(&m.term)))
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .take(MAX_SECONDARY_KEYWORDS)
        .collect();

    let related_terms: Vec<String> = normalize_keywords(&bundle.related_terms)
        .into_iter()
        .filter(|t| !seen.contains(&t.to_lowercase()))
        .take(MAX_RELATED_TERMS)
        .collect();

    KeywordPlan {
        primary,
        secondary,
        related_terms,
        questions: bundle.questions.iter().take(8).cloned().collect(),
    }
}

fn research_notes(ctx: &PipelineContext) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(plan) = &ctx.keyword_plan {
        if !plan.questions.is_empty() {
            sections.push(bullets("Questions readers ask", &plan.questions));
        }
        if !plan.related_terms.is_empty() {
            sections.push(bullets("Related terms", &plan.related_terms));
        }
    }
    if let Some(summary) = &ctx.competitor_summary {
        sections.push(format!(
            "Competing pages average {} words.",
            summary.average_word_count
        ));
        if !summary.common_headings.is_empty() {
            sections.push(bullets("Headings competitors share", &summary.common_headings));
        }
    }
    if let Some(research) = &ctx.research {
        let snippets: Vec<String> = research
            .citation_candidates
            .iter()
            .filter(|c| !c.snippet.trim().is_empty())
            .take(5)
            .map(|c| format!("{}: {}", c.title.trim(), sanitize::summarize(&c.snippet, 200)))
            .collect();
        if !snippets.is_empty() {
            sections.push(bullets("Source snippets", &snippets));
        }
    }

    sections.join("\n\n")
}

fn bullets(title: &str, items: &[String]) -> String {
    let mut out = format!("{}:", title);
    for item in items {
        out.push_str("\n- ");
        out.push_str(item);
    }
    out
}

/// First intent label mentioned in the reply; informational when none is.
fn parse_intent(text: &str) -> SearchIntent {
    let lower = text.to_lowercase();
    [
        SearchIntent::Informational,
        SearchIntent::Commercial,
        SearchIntent::Transactional,
        SearchIntent::Navigational,
    ]
    .into_iter()
    .filter_map(|intent| lower.find(intent.as_str()).map(|pos| (pos, intent)))
    .min_by_key(|(pos, _)| *pos)
    .map(|(_, intent)| intent)
    .unwrap_or(SearchIntent::Informational)
}

fn non_empty(text: String, stage: Stage) -> Result<String, StageError> {
    if text.trim().is_empty() {
        Err(StageError::EmptyOutput(stage))
    } else {
        Ok(text.trim().to_string())
    }
}

fn current_text(ctx: &PipelineContext, what: &str) -> Result<String, StageError> {
    ctx.latest_text()
        .map(str::to_string)
        .ok_or_else(|| StageError::MissingInput(what.to_string()))
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn derive_title(text: &str, topic: &str) -> String {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("{}: A Practical Guide", topic))
}

/// First prose paragraph, cut at a word boundary.
fn derive_meta_description(text: &str) -> String {
    let paragraph = text
        .split("\n\n")
        .map(str::trim)
        .find(|block| {
            !block.is_empty()
                && !block.starts_with('#')
                && !block.starts_with("- ")
                && !block.starts_with("* ")
        })
        .unwrap_or("");
    let flat = normalize_topic(paragraph);
    if flat.chars().count() <= META_MAX_CHARS {
        return flat;
    }

    let mut cut = String::new();
    for word in flat.split(' ') {
        if cut.chars().count() + word.chars().count() + 1 > META_MAX_CHARS - 3 {
            break;
        }
        if !cut.is_empty() {
            cut.push(' ');
        }
        cut.push_str(word);
    }
    cut.push_str("...");
    cut
}
