//! Transcription entry points.
//!
//! | Function | Recognition | Async |
//! |----------|-------------|-------|
//! | [`transcribe_recognized`] | already done by the caller | no |
//! | [`transcribe`] | a [`PageRecognizer`] | yes |
//! | [`transcribe_with_vlm`] | a vision LLM, prompted with the rule set | yes |
//! | [`transcribe_batch`] / [`transcribe_vlm_batch`] | many pages, bounded concurrency | yes |
//!
//! Every call validates in the same order: page image, marked regions, rule
//! set. Nothing is recognised or sent anywhere until all three pass, and a
//! failed call never returns partial Markdown.

use crate::config::VlmConfig;
use crate::error::Page2MdError;
use crate::layout::{validate_regions, MarkedRegion, PageImage, Recognition};
use crate::output::{PageOutcome, TranscriptionResult};
use crate::pipeline::{encode, llm, omit, order, postprocess, render};
use crate::progress::ProgressCallback;
use crate::recognize::PageRecognizer;
use crate::rules::TranscriptionRuleSet;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// One page of a batch: the image and its marked regions.
#[derive(Debug, Clone)]
pub struct PageInput {
    pub page: PageImage,
    pub regions: Vec<MarkedRegion>,
}

impl PageInput {
    pub fn new(page: PageImage, regions: Vec<MarkedRegion>) -> Self {
        Self { page, regions }
    }
}

/// Transcribe one page: recognise it, then apply the rule set.
///
/// # Errors
/// - [`Page2MdError::InvalidInput`] — multi-page or empty image, bad region
///   identifiers, or the recogniser detected more than one page
/// - [`Page2MdError::InvalidConfiguration`] — inconsistent rule set
/// - [`Page2MdError::RecognitionFailed`] — the recogniser failed
pub async fn transcribe(
    recognizer: &dyn PageRecognizer,
    page: &PageImage,
    regions: &[MarkedRegion],
    rules: &TranscriptionRuleSet,
) -> Result<TranscriptionResult, Page2MdError> {
    validate(page, regions, rules)?;

    let start = Instant::now();
    let recognition = recognizer
        .recognize(page, regions)
        .await
        .map_err(|e| Page2MdError::RecognitionFailed {
            detail: e.to_string(),
        })?;
    debug!(
        "Recognised {} blocks in {:?}",
        recognition.blocks.len(),
        start.elapsed()
    );

    run_engine(page, &recognition, regions, rules)
}

/// Apply the rule set to a recognition the caller already has.
///
/// Pure and synchronous: the same inputs always give the same output.
pub fn transcribe_recognized(
    page: &PageImage,
    recognition: &Recognition,
    regions: &[MarkedRegion],
    rules: &TranscriptionRuleSet,
) -> Result<TranscriptionResult, Page2MdError> {
    validate(page, regions, rules)?;
    run_engine(page, recognition, regions, rules)
}

/// Blocking wrapper around [`transcribe`].
///
/// Creates a temporary tokio runtime internally; do not call it from inside
/// an async context.
pub fn transcribe_sync(
    recognizer: &dyn PageRecognizer,
    page: &PageImage,
    regions: &[MarkedRegion],
    rules: &TranscriptionRuleSet,
) -> Result<TranscriptionResult, Page2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Page2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(transcribe(recognizer, page, regions, rules))
}

/// Transcribe one page by prompting a vision LLM with the rule set's
/// framing bundles, then enforcing the rules on its reply.
///
/// # Errors
/// Same validation errors as [`transcribe`], plus
/// [`Page2MdError::ImageEncodingFailed`] and [`Page2MdError::LlmFailed`]
/// once every retry is used up.
pub async fn transcribe_with_vlm(
    provider: &Arc<dyn LLMProvider>,
    page: &PageImage,
    regions: &[MarkedRegion],
    rules: &TranscriptionRuleSet,
    config: &VlmConfig,
) -> Result<TranscriptionResult, Page2MdError> {
    validate(page, regions, rules)?;
    vlm_page(provider, "Page", page, regions, rules, config).await
}

/// Transcribe many pages with one recogniser, at most `concurrency` at a
/// time. Outcomes come back in input order; one failed page does not stop
/// the others.
pub async fn transcribe_batch(
    recognizer: &dyn PageRecognizer,
    pages: &[PageInput],
    rules: &TranscriptionRuleSet,
    concurrency: usize,
    progress: Option<ProgressCallback>,
) -> Vec<PageOutcome> {
    run_batch(pages, concurrency, progress, |_, input| {
        transcribe(recognizer, &input.page, &input.regions, rules)
    })
    .await
}

/// Transcribe many pages through a vision LLM.
///
/// The provider is resolved once up front (see [`resolve_provider`]); a
/// missing provider is fatal, individual page failures are not.
pub async fn transcribe_vlm_batch(
    pages: &[PageInput],
    rules: &TranscriptionRuleSet,
    config: &VlmConfig,
) -> Result<Vec<PageOutcome>, Page2MdError> {
    rules.validate()?;
    let provider = resolve_provider(config).await?;
    info!(
        "Transcribing {} pages via VLM (model {}, concurrency {})",
        pages.len(),
        config.model.as_deref().unwrap_or("provider default"),
        config.concurrency
    );

    let provider = &provider;
    Ok(run_batch(
        pages,
        config.concurrency,
        config.progress_callback.clone(),
        |idx, input| async move {
            validate(&input.page, &input.regions, rules)?;
            let label = format!("Page {}", idx + 1);
            vlm_page(provider, &label, &input.page, &input.regions, rules, config).await
        },
    )
    .await)
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — used as-is.
/// 2. **Named provider + model** (`config.provider_name`) — created through
///    [`ProviderFactory::create_llm_provider`], which reads the provider's
///    API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub async fn resolve_provider(config: &VlmConfig) -> Result<Arc<dyn LLMProvider>, Page2MdError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Page2MdError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

// ── Internal helpers ─────────────────────────────────────────────────────

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Page2MdError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Page2MdError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn validate(
    page: &PageImage,
    regions: &[MarkedRegion],
    rules: &TranscriptionRuleSet,
) -> Result<(), Page2MdError> {
    page.validate()?;
    validate_regions(regions)?;
    rules.validate()
}

/// Merge, omit, render. Inputs are already validated.
fn run_engine(
    page: &PageImage,
    recognition: &Recognition,
    regions: &[MarkedRegion],
    rules: &TranscriptionRuleSet,
) -> Result<TranscriptionResult, Page2MdError> {
    if recognition.page_count > 1 {
        return Err(Page2MdError::InvalidInput {
            reason: format!(
                "recognition found {} pages in one image",
                recognition.page_count
            ),
        });
    }

    let (width, height) = (page.width() as f32, page.height() as f32);
    let merged = order::merge(&recognition.blocks, regions, width, height);
    let (items, omitted) = omit::apply(merged.items, &rules.omission, height);
    let rendered = render::render(&items, rules);

    if rendered.placeholders != regions.len() {
        return Err(Page2MdError::Internal(format!(
            "{} placeholders rendered for {} regions",
            rendered.placeholders,
            regions.len()
        )));
    }

    info!(
        "Transcribed page: {} blocks, {} regions, {} omitted, {} bytes",
        recognition.blocks.len(),
        regions.len(),
        omitted,
        rendered.markdown.len()
    );

    Ok(TranscriptionResult {
        markdown: rendered.markdown,
        placeholders: rendered.placeholders,
        omitted,
        language: recognition.language.clone(),
        warnings: merged.warnings,
    })
}

async fn vlm_page(
    provider: &Arc<dyn LLMProvider>,
    label: &str,
    page: &PageImage,
    regions: &[MarkedRegion],
    rules: &TranscriptionRuleSet,
    config: &VlmConfig,
) -> Result<TranscriptionResult, Page2MdError> {
    let image = encode::encode_page(page, regions)?;
    let messages = llm::build_messages(rules, regions, image);
    let raw = llm::transcribe_page(provider, label, &messages, config).await?;
    let cleaned = postprocess::clean_markdown(&raw, regions, &rules.regions);

    let placeholders = regions
        .iter()
        .filter(|r| {
            cleaned
                .markdown
                .contains(&rules.regions.placeholder_for(&r.identifier))
        })
        .count();

    info!(
        "{}: {} regions, {} bytes after post-processing",
        label,
        regions.len(),
        cleaned.markdown.len()
    );

    Ok(TranscriptionResult {
        markdown: cleaned.markdown,
        placeholders,
        omitted: 0,
        language: None,
        warnings: cleaned.warnings,
    })
}

/// Drive `work` over every page with bounded concurrency, reporting
/// progress, and return outcomes sorted by page index.
async fn run_batch<'a, F, Fut>(
    pages: &'a [PageInput],
    concurrency: usize,
    progress: Option<ProgressCallback>,
    work: F,
) -> Vec<PageOutcome>
where
    F: Fn(usize, &'a PageInput) -> Fut,
    Fut: Future<Output = Result<TranscriptionResult, Page2MdError>>,
{
    let total = pages.len();
    if let Some(ref cb) = progress {
        cb.on_batch_start(total);
    }

    let progress_ref = progress.as_ref();
    let work = &work;
    let mut outcomes: Vec<PageOutcome> = stream::iter(pages.iter().enumerate())
        .map(|(index, input)| async move {
            let page_num = index + 1;
            if let Some(cb) = progress_ref {
                cb.on_page_start(page_num, total);
            }
            let result = work(index, input).await;
            if let Some(cb) = progress_ref {
                match &result {
                    Ok(r) => cb.on_page_complete(page_num, total, r.markdown.len()),
                    Err(e) => cb.on_page_error(page_num, total, &e.to_string()),
                }
            }
            PageOutcome { index, result }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    outcomes.sort_by_key(|o| o.index);

    let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
    info!("Batch complete: {}/{} pages", succeeded, total);
    if let Some(ref cb) = progress {
        cb.on_batch_complete(total, succeeded);
    }
    outcomes
}
