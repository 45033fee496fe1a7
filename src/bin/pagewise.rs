//! CLI binary for pagewise.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs one job to completion and prints the artifact.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pagewise::{
    CheckpointStore, DiskResultCache, GoogleTranslateTransform, JobId, LlmTransform, PageHeader,
    Pipeline, PipelineConfig, PipelineProgressCallback, ProgressCallback, ResultCache,
    Submission, TextDocument, Transform,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per page.
///
/// On resume the bar starts at the pages already done.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-page wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading checkpoint…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize, already_done: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_position(already_done as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Translating");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        let elapsed_ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        elapsed_ms as f64 / 1000.0
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_job_start(&self, _job_id: &str, total_pages: usize, resume_from: usize) {
        self.activate_bar(total_pages, resume_from.saturating_sub(1));
        let line = if resume_from > 1 {
            format!("Resuming at page {resume_from} of {total_pages}…")
        } else {
            format!("Starting translation of {total_pages} pages…")
        };
        self.bar.println(format!("{} {}", cyan("◆"), bold(&line)));
    }

    fn on_page_start(&self, _job_id: &str, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, _job_id: &str, page_num: usize, total: usize, output_len: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{output_len:>5} bytes")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, _job_id: &str, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(error),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.abandon();
    }

    fn on_job_complete(&self, _job_id: &str, total_pages: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages translated",
            green("✔"),
            bold(&total_pages.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Translate with the default LLM provider (stdout)
  pagewise book.txt

  # Write the result to a file
  pagewise book.txt -o book.hinglish.txt

  # Free Google Translate endpoint, English → Hinglish (romanized Hindi)
  pagewise --backend google --source-lang en --target-lang hi book.txt

  # Same, but keep the Devanagari script
  pagewise --backend google --source-lang en --no-romanize book.txt

  # Plain text without form feeds: 40 lines per page
  pagewise --lines-per-page 40 notes.txt

  # Re-run after a failure: resumes after the last completed page
  pagewise book.txt -o book.hinglish.txt

  # Inspect a job's progress
  pagewise --status 3f1c…e9

  # Drop every cached translation
  pagewise --clear-cache

PAGES:
  Input is read as UTF-8. Pages are separated by form feeds (\f), as written
  by `pdftotext`, unless --lines-per-page is given.

STATE:
  Checkpoints, artifacts and the translation cache live under --state-dir
  (default ./pagewise-state). Keep it between runs to resume.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum BackendArg {
    /// Chat LLM via edgequake-llm
    Llm,
    /// Public Google Translate endpoint
    Google,
}

/// Translate long text documents page by page, resumably.
#[derive(Parser, Debug)]
#[command(
    name = "pagewise",
    version,
    about = "Translate long documents page by page with checkpoints and resume",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// UTF-8 text file to translate.
    #[arg(required_unless_present_any = ["status", "clear_cache"])]
    input: Option<PathBuf>,

    /// Write the translation to this file instead of stdout.
    #[arg(short, long, env = "PAGEWISE_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory for checkpoints, artifacts and the cache.
    #[arg(long, env = "PAGEWISE_STATE_DIR", default_value = "pagewise-state")]
    state_dir: PathBuf,

    /// Translation backend.
    #[arg(long, env = "PAGEWISE_BACKEND", value_enum, default_value = "llm")]
    backend: BackendArg,

    /// Source language code for the Google backend.
    #[arg(long, env = "PAGEWISE_SOURCE_LANG", default_value = "auto")]
    source_lang: String,

    /// Target language code for the Google backend.
    #[arg(long, env = "PAGEWISE_TARGET_LANG", default_value = "hi")]
    target_lang: String,

    /// Keep Devanagari output from the Google backend instead of romanizing
    /// it (romanization applies when --target-lang is hi).
    #[arg(long, env = "PAGEWISE_NO_ROMANIZE")]
    no_romanize: bool,

    /// Target language described for the LLM backend.
    #[arg(long, env = "PAGEWISE_TARGET_LANGUAGE")]
    target_language: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PAGEWISE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per chunk.
    #[arg(long, env = "PAGEWISE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PAGEWISE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PAGEWISE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Attempts per chunk before the job fails.
    #[arg(long, env = "PAGEWISE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Delay before the first retry, in milliseconds (doubles each retry).
    #[arg(long, env = "PAGEWISE_RETRY_BACKOFF_MS", default_value_t = 1000)]
    retry_backoff_ms: u64,

    /// Ceiling for a single retry delay, in milliseconds.
    #[arg(long, env = "PAGEWISE_MAX_BACKOFF_MS", default_value_t = 30_000)]
    max_backoff_ms: u64,

    /// Attempts to save a page's checkpoint before the job fails.
    #[arg(long, env = "PAGEWISE_CHECKPOINT_WRITE_ATTEMPTS", default_value_t = 3)]
    checkpoint_write_attempts: u32,

    /// Largest chunk sent to the backend, in bytes.
    #[arg(long, env = "PAGEWISE_MAX_CHUNK_BYTES", default_value_t = 4000)]
    max_chunk_bytes: usize,

    /// Chunks of one page translated concurrently.
    #[arg(long, env = "PAGEWISE_CHUNK_CONCURRENCY", default_value_t = 1)]
    chunk_concurrency: usize,

    /// Split pages every N lines instead of on form feeds.
    #[arg(long, env = "PAGEWISE_LINES_PER_PAGE")]
    lines_per_page: Option<usize>,

    /// Page heading: dashed, none, or a template containing {page}.
    #[arg(long, env = "PAGEWISE_HEADER", default_value = "dashed")]
    header: String,

    /// Print the progress of a job as JSON and exit.
    #[arg(long, value_name = "JOB_ID")]
    status: Option<String>,

    /// Delete every cached translation and exit.
    #[arg(long)]
    clear_cache: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAGEWISE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAGEWISE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAGEWISE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && cli.status.is_none() && !cli.clear_cache;
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

    // ── Maintenance modes ────────────────────────────────────────────────
    if let Some(ref raw) = cli.status {
        let job_id = JobId::parse(raw.trim())
            .with_context(|| format!("'{raw}' is not a job id (expected 64 hex characters)"))?;
        let config = build_config(&cli, None).await?;
        let store = CheckpointStore::new(config.checkpoint_dir(), config.artifact_dir());
        let progress = store
            .query_progress(&job_id)
            .await
            .context("Failed to read job progress")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&progress).context("Failed to serialise progress")?
        );
        return Ok(());
    }

    if cli.clear_cache {
        let config = build_config(&cli, None).await?;
        DiskResultCache::new(config.cache_dir())
            .clear()
            .await
            .context("Failed to clear cache")?;
        if !cli.quiet {
            eprintln!("{} cache cleared", green("✔"));
        }
        return Ok(());
    }

    // ── Load document ────────────────────────────────────────────────────
    let input = cli.input.clone().context("No input file given")?;
    let raw = tokio::fs::read(&input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let text = String::from_utf8(raw.clone())
        .with_context(|| format!("{} is not valid UTF-8", input.display()))?;
    let document = match cli.lines_per_page {
        Some(n) => TextDocument::from_lines(&text, n),
        None => TextDocument::from_form_feeds(&text),
    };
    let logical_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());

    // ── Build pipeline ───────────────────────────────────────────────────
    let progress_cb = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress_cb
            .as_ref()
            .map(|cb| Arc::clone(cb) as Arc<dyn PipelineProgressCallback>),
    )
    .await?;

    let transform: Arc<dyn Transform> = match cli.backend {
        BackendArg::Google => Arc::new(
            GoogleTranslateTransform::new(cli.source_lang.clone(), cli.target_lang.clone())
                .with_romanization(cli.target_lang == "hi" && !cli.no_romanize),
        ),
        BackendArg::Llm => Arc::new(
            LlmTransform::from_config(&config).context("Failed to initialise LLM provider")?,
        ),
    };
    let pipeline = Pipeline::new(config, transform);

    // ── Run job ──────────────────────────────────────────────────────────
    let submission = pipeline
        .submit_named(&logical_name, &raw, Arc::new(document))
        .await
        .context("Failed to submit document")?;
    let job_id = submission.job_id().clone();

    match submission {
        Submission::AlreadyCompleted(_) => {
            if let Some(ref cb) = progress_cb {
                cb.bar.finish_and_clear();
            }
            if !cli.quiet {
                eprintln!(
                    "{} already translated {}",
                    green("✔"),
                    dim(&format!("(job {job_id})"))
                );
            }
        }
        Submission::Started { handle, .. } => {
            if let Err(e) = handle.wait().await {
                let progress = pipeline.query_progress(&job_id).await.ok();
                if let Some(p) = progress {
                    eprintln!(
                        "{} {}/{} pages done; re-run the same command to resume {}",
                        cyan("⚠"),
                        p.completed,
                        p.total,
                        dim(&format!("(job {job_id})"))
                    );
                }
                return Err(e).context("Translation failed");
            }
        }
        Submission::Attached(_) => {
            pipeline
                .wait_for_terminal(&job_id, Duration::from_millis(500))
                .await
                .context("Failed to follow running job")?;
        }
    }

    // ── Emit artifact ────────────────────────────────────────────────────
    let artifact = pipeline
        .artifact(&job_id)
        .await
        .context("Failed to read translation")?;

    if let Some(ref output_path) = cli.output {
        tokio::fs::write(output_path, artifact.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&output_path.display().to_string()));
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(artifact.as_bytes())
            .context("Failed to write to stdout")?;
        if !artifact.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .state_dir(&cli.state_dir)
        .max_attempts(cli.max_attempts)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .max_backoff_ms(cli.max_backoff_ms)
        .checkpoint_write_attempts(cli.checkpoint_write_attempts)
        .max_chunk_bytes(cli.max_chunk_bytes)
        .chunk_concurrency(cli.chunk_concurrency)
        .page_header(parse_header(&cli.header))
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref lang) = cli.target_language {
        builder = builder.target_language(lang.clone());
    }
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

/// Parse `--header` into a `PageHeader`.
fn parse_header(s: &str) -> PageHeader {
    match s.to_lowercase().as_str() {
        "dashed" => PageHeader::Dashed,
        "none" => PageHeader::None,
        _ => PageHeader::Custom(s.replace("\\n", "\n")),
    }
}
