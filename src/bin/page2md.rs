//! CLI binary for edgequake-page2md.
//!
//! A thin shim over the library crate: reads page images, their marked
//! regions and an optional rule set, transcribes every page and prints the
//! Markdown.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_page2md::{
    transcribe_recognized, transcribe_vlm_batch, MarkedRegion, Page2MdError, PageImage,
    PageInput, PageOutcome, PrecomputedRecognizer, ProgressCallback, TranscriptionProgress,
    TranscriptionResult, TranscriptionRuleSet, VlmConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────

/// Live progress bar plus one log line per finished page. Pages may finish
/// out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        bar.set_prefix("Transcribing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&page_num)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl TranscriptionProgress for CliProgressCallback {
    fn on_batch_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, markdown_len: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{markdown_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total_pages: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transcribe one page with a vision model (stdout)
  page2md page_0.png

  # Two marked regions, placed before block 0 and block 3
  page2md page_0.png --region page_0_1.png@0 --region page_0_2.png@3

  # Several pages, regions from page_N.regions.json sidecars, to a file
  page2md page_*.png -o book.md

  # Offline: apply the rules to page_0.layout.json from an OCR run
  page2md --layout page_0.png

  # Custom rule set, JSON output
  page2md --rules rules.json --json page_0.png

SIDECAR FILES (next to each image):
  <stem>.regions.json   [{"identifier": "page_0_1.png", "ordinal_position": 0,
                          "bounding_area": {"x0": 0, "y0": 0, "x1": 100, "y1": 80}}]
  <stem>.layout.json    recognised blocks, read by --layout

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

/// Transcribe rendered page images to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "page2md",
    version,
    about = "Transcribe rendered page images to Markdown, substituting marked regions",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Page images (PNG or JPEG), one page each.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// JSON rule set. Default: the built-in standard rules.
    #[arg(long, env = "PAGE2MD_RULES")]
    rules: Option<PathBuf>,

    /// Marked region as ID or ID@N (N = recognised blocks before it).
    /// Repeatable; only valid with a single image.
    #[arg(long = "region", value_name = "ID[@N]")]
    regions: Vec<String>,

    /// Read <stem>.layout.json and apply the rules offline (no LLM call).
    #[arg(long)]
    layout: bool,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "PAGE2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Number of concurrent VLM API calls.
    #[arg(short, long, env = "PAGE2MD_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PAGE2MD_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PAGE2MD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on LLM failure.
    #[arg(long, env = "PAGE2MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Output structured JSON instead of Markdown.
    #[arg(long, env = "PAGE2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAGE2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAGE2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAGE2MD_QUIET")]
    quiet: bool,
}

#[derive(Serialize)]
struct PageJson<'a> {
    image: String,
    #[serde(flatten)]
    result: &'a TranscriptionResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.layout;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Rule set (fatal before any page is touched) ──────────────────────
    let rules = match cli.rules {
        Some(ref path) => TranscriptionRuleSet::from_json_file(path)
            .with_context(|| format!("Invalid rule set {}", path.display()))?,
        None => TranscriptionRuleSet::standard(),
    };

    if !cli.regions.is_empty() && cli.images.len() != 1 {
        bail!("--region can only be used with a single image; use <stem>.regions.json sidecars");
    }

    // ── Load pages ───────────────────────────────────────────────────────
    let mut pages = Vec::with_capacity(cli.images.len());
    for path in &cli.images {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let page = PageImage::decode(&bytes)
            .with_context(|| format!("Failed to decode {}", path.display()))?;
        let regions = if cli.regions.is_empty() {
            load_sidecar_regions(path).await?
        } else {
            parse_region_flags(&cli.regions)?
        };
        pages.push(PageInput::new(page, regions));
    }

    // ── Transcribe ───────────────────────────────────────────────────────
    let start = Instant::now();
    let outcomes = if cli.layout {
        transcribe_layouts(&cli.images, &pages, &rules)
    } else {
        let progress: Option<ProgressCallback> = if show_progress {
            Some(CliProgressCallback::new() as Arc<dyn TranscriptionProgress>)
        } else {
            None
        };
        let config = build_config(&cli, progress)?;
        transcribe_vlm_batch(&pages, &rules, &config)
            .await
            .context("Transcription failed")?
    };

    // No partial documents: any failed page fails the run.
    let mut results = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        let image = cli.images[outcome.index].display().to_string();
        match outcome.result {
            Ok(result) => results.push((image, result)),
            Err(e) => failures.push(format!("{image}: {e}")),
        }
    }
    if !failures.is_empty() {
        for f in &failures {
            eprintln!("{} {}", red("✗"), f);
        }
        bail!("{} of {} pages failed", failures.len(), cli.images.len());
    }

    for (image, result) in &results {
        for warning in &result.warnings {
            if !cli.quiet {
                eprintln!("{} {}: {}", bold("warning:"), image, warning);
            }
        }
    }

    // ── Emit ─────────────────────────────────────────────────────────────
    let rendered = if cli.json {
        let json: Vec<PageJson<'_>> = results
            .iter()
            .map(|(image, result)| PageJson {
                image: image.clone(),
                result,
            })
            .collect();
        serde_json::to_string_pretty(&json).context("Failed to serialise output")?
    } else {
        results
            .iter()
            .map(|(_, r)| r.markdown.as_str())
            .filter(|md| !md.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    match cli.output {
        Some(ref path) => write_atomic(path, &rendered).await?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        let placeholders: usize = results.iter().map(|(_, r)| r.placeholders).sum();
        eprintln!(
            "{}  {} pages  {} placeholders  {}ms{}",
            green("✔"),
            results.len(),
            placeholders,
            start.elapsed().as_millis(),
            cli.output
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
    }

    Ok(())
}

/// Offline mode: each image's `<stem>.layout.json` is its recognition.
fn transcribe_layouts(
    images: &[PathBuf],
    pages: &[PageInput],
    rules: &TranscriptionRuleSet,
) -> Vec<PageOutcome> {
    images
        .iter()
        .zip(pages)
        .enumerate()
        .map(|(index, (path, input))| {
            let layout = path.with_extension("layout.json");
            let result = PrecomputedRecognizer::from_json_file(&layout)
                .map_err(|e| Page2MdError::RecognitionFailed {
                    detail: e.to_string(),
                })
                .and_then(|rec| {
                    transcribe_recognized(&input.page, rec.recognition(), &input.regions, rules)
                });
            PageOutcome { index, result }
        })
        .collect()
}

/// Map CLI args to `VlmConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<VlmConfig> {
    let mut builder = VlmConfig::builder()
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--region ID[@N]` flags in the order given.
fn parse_region_flags(flags: &[String]) -> Result<Vec<MarkedRegion>> {
    flags
        .iter()
        .map(|flag| match flag.rsplit_once('@') {
            Some((id, n)) => {
                let ordinal: usize = n
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid ordinal in --region '{flag}'"))?;
                Ok(MarkedRegion::new(id.trim(), ordinal))
            }
            None => Ok(MarkedRegion::new(flag.trim(), 0)),
        })
        .collect()
}

/// Read `<stem>.regions.json` next to the image, or no regions if absent.
async fn load_sidecar_regions(image: &Path) -> Result<Vec<MarkedRegion>> {
    let sidecar = image.with_extension("regions.json");
    if !tokio::fs::try_exists(&sidecar).await.unwrap_or(false) {
        return Ok(Vec::new());
    }
    let json = tokio::fs::read_to_string(&sidecar)
        .await
        .with_context(|| format!("Failed to read {}", sidecar.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid regions in {}", sidecar.display()))
}

/// Write via a temp file + rename so a failed run never leaves half a file.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("md.tmp");
    tokio::fs::write(&tmp, format!("{contents}\n"))
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
