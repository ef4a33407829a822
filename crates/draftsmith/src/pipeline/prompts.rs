//! Generation requests issued by the pipeline stages.

use std::fmt::Write;

use super::context::PipelineContext;
use super::stage::Stage;
use crate::provider::GenerationRequest;

const WRITER_SYSTEM: &str = "You are an experienced long-form writer. Write in clear markdown with \
one H1 title, H2 sections and H3 subsections where useful. Prefer short paragraphs, concrete \
examples and plain words. Never invent statistics or sources.";

const EDITOR_SYSTEM: &str = "You are a careful editor. Return the complete revised article in \
markdown and nothing else. Keep every heading and fact unless told otherwise.";

const ANALYST_SYSTEM: &str = "You are a search analyst. Answer tersely.";

/// Output budget for a body-text call.
fn body_tokens(ctx: &PipelineContext) -> u32 {
    let words = ctx.target_word_count.unwrap_or(1500);
    words.saturating_mul(2).clamp(1024, 16_000)
}

fn audience_line(ctx: &PipelineContext, prompt: &mut String) {
    if let Some(audience) = &ctx.audience {
        let _ = writeln!(prompt, "Audience: {}", audience);
    }
    if let Some(tone) = &ctx.tone {
        let _ = writeln!(prompt, "Tone: {}", tone);
    }
}

pub fn intent(ctx: &PipelineContext) -> GenerationRequest {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Topic: {}", ctx.topic);
    let _ = writeln!(prompt, "Primary keyword: {}", ctx.primary_keyword());
    prompt.push_str(
        "Classify the dominant search intent as one of: informational, commercial, \
         transactional, navigational. Reply with the label first, then one sentence explaining it.",
    );
    GenerationRequest::new(Stage::IntentAnalysis.as_str(), prompt)
        .with_system(ANALYST_SYSTEM)
        .with_max_tokens(200)
        .with_temperature(0.0)
}

pub fn outline(ctx: &PipelineContext, notes: &str) -> GenerationRequest {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Topic: {}", ctx.topic);
    let _ = writeln!(prompt, "Primary keyword: {}", ctx.primary_keyword());
    let secondary = ctx.secondary_keywords();
    if !secondary.is_empty() {
        let _ = writeln!(prompt, "Secondary keywords: {}", secondary.join(", "));
    }
    if let Some(intent) = &ctx.intent {
        let _ = writeln!(prompt, "Search intent: {}", intent.intent.as_str());
    }
    if let Some(words) = ctx.target_word_count {
        let _ = writeln!(prompt, "Target length: about {} words", words);
    }
    audience_line(ctx, &mut prompt);
    if !notes.is_empty() {
        let _ = writeln!(prompt, "\nResearch notes:\n{}", notes);
    }
    prompt.push_str(
        "\nProduce a markdown outline: an H1 title, 4 to 8 H2 sections with H3 points where \
         useful, and one line per section saying what it must cover.",
    );
    GenerationRequest::new(Stage::ResearchOutline.as_str(), prompt)
        .with_system(WRITER_SYSTEM)
        .with_max_tokens(1500)
        .with_temperature(0.4)
}

pub fn draft(ctx: &PipelineContext) -> GenerationRequest {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Topic: {}", ctx.topic);
    let _ = writeln!(prompt, "Primary keyword: {}", ctx.primary_keyword());
    if let Some(words) = ctx.target_word_count {
        let _ = writeln!(prompt, "Length: about {} words", words);
    }
    audience_line(ctx, &mut prompt);
    if let Some(outline) = &ctx.outline {
        let _ = writeln!(prompt, "\nFollow this outline:\n{}", outline);
    }
    prompt.push_str(
        "\nWrite the full article. Use the primary keyword in the title, the first paragraph \
         and at least one heading. Ask the reader a question or two and end with a clear \
         next step.",
    );
    GenerationRequest::new(Stage::DraftGeneration.as_str(), prompt)
        .with_system(WRITER_SYSTEM)
        .with_max_tokens(body_tokens(ctx))
}

pub fn enhancement(ctx: &PipelineContext, text: &str) -> GenerationRequest {
    let mut prompt = String::from(
        "Improve this article. Add concrete examples, practical first-hand observations and \
         short lists where they help. Remove filler phrases and vague claims.\n",
    );
    audience_line(ctx, &mut prompt);
    let _ = write!(prompt, "\nArticle:\n{}", text);
    GenerationRequest::new(Stage::Enhancement.as_str(), prompt)
        .with_system(EDITOR_SYSTEM)
        .with_max_tokens(body_tokens(ctx))
        .with_temperature(0.5)
}

pub fn seo_polish(ctx: &PipelineContext, text: &str) -> GenerationRequest {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Polish this article for search. Primary keyword: {}.",
        ctx.primary_keyword()
    );
    let secondary = ctx.secondary_keywords();
    if !secondary.is_empty() {
        let _ = writeln!(prompt, "Work in naturally: {}.", secondary.join(", "));
    }
    prompt.push_str(
        "Keep the keyword density between 0.5% and 2.5%. Make the H1 title 30 to 65 characters \
         and make sure the keyword appears in it, in the first paragraph and in one H2.\n",
    );
    let _ = write!(prompt, "\nArticle:\n{}", text);
    GenerationRequest::new(Stage::SeoPolish.as_str(), prompt)
        .with_system(EDITOR_SYSTEM)
        .with_max_tokens(body_tokens(ctx))
        .with_temperature(0.3)
}

pub fn semantic_integration(
    ctx: &PipelineContext,
    text: &str,
    terms: &[String],
) -> GenerationRequest {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Weave these related terms into the article where they fit naturally: {}.",
        terms.join(", ")
    );
    prompt.push_str("Do not add sections just to fit a term. Do not stuff keywords.\n");
    let _ = write!(prompt, "\nArticle:\n{}", text);
    GenerationRequest::new(Stage::SemanticIntegration.as_str(), prompt)
        .with_system(EDITOR_SYSTEM)
        .with_max_tokens(body_tokens(ctx))
        .with_temperature(0.3)
}
