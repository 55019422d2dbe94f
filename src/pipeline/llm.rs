//! VLM interaction: build the prompted messages and call the provider.
//!
//! All prompt text comes from the rule set's [`crate::rules::FramingPolicy`]
//! so this module only deals with message layout, retries and errors.
//!
//! ## Retry Strategy
//!
//! Exponential backoff (`retry_backoff_ms * 2^(attempt-1)`): with a 500 ms
//! base and 3 retries the waits are 500 ms → 1 s → 2 s. A single wait never
//! exceeds [`MAX_BACKOFF_MS`]. When every attempt fails the whole page
//! fails; a partial reply is never returned.

use crate::config::VlmConfig;
use crate::error::Page2MdError;
use crate::layout::MarkedRegion;
use crate::prompts::{region_prompt, render_prompt};
use crate::rules::TranscriptionRuleSet;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Upper bound on one retry wait.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Build the request messages for one page.
///
/// ## Message Layout
///
/// 1. **System** — framing (role) prompt
/// 2. **System** — general transcription rules
/// 3. **System** — marked-region rules listing the identifiers *(only when
///    the page has regions)*
/// 4. **User** — the page PNG as an image attachment, with a one-line
///    instruction
pub fn build_messages(
    rules: &TranscriptionRuleSet,
    regions: &[MarkedRegion],
    image: ImageData,
) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage::system(render_prompt(&rules.framing.role, rules).as_str()),
        ChatMessage::system(render_prompt(&rules.framing.general, rules).as_str()),
    ];
    if let Some(prompt) = region_prompt(rules, regions) {
        messages.push(ChatMessage::system(prompt.as_str()));
    }
    messages.push(ChatMessage::user_with_images(
        "Transcribe this page.",
        vec![image],
    ));
    messages
}

/// Send one page to the VLM and return its raw reply.
pub async fn transcribe_page(
    provider: &Arc<dyn LLMProvider>,
    page_label: &str,
    messages: &[ChatMessage],
    config: &VlmConfig,
) -> Result<String, Page2MdError> {
    let start = Instant::now();
    let options = build_options(config);
    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                page_label, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match provider.chat(messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    page_label,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(response.content);
            }
            Err(e) => {
                let err_msg = e.to_string();
                warn!("{}: attempt {} failed: {}", page_label, attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    Err(Page2MdError::LlmFailed {
        retries: config.max_retries,
        detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Wait before retry number `attempt` (1-based), saturating at
/// [`MAX_BACKOFF_MS`].
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

fn build_options(config: &VlmConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
