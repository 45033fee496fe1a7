//! Configuration types for the resumable translation pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. One struct holds every knob so a config can
//! be shared across worker tasks and logged as a unit.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default language the LLM backend translates into.
pub const DEFAULT_TARGET_LANGUAGE: &str = "Hinglish (Hindi written in Roman script)";

/// Configuration for a [`crate::executor::Pipeline`].
///
/// # Example
/// ```rust
/// use pagewise::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .state_dir("/var/lib/pagewise")
///     .max_attempts(5)
///     .max_chunk_bytes(2000)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Root directory for checkpoints, artifacts and the result cache.
    /// Default: `./pagewise-state`.
    ///
    /// All three must survive a process restart, so this should point at
    /// durable storage, not a tmpfs.
    pub state_dir: PathBuf,

    /// Attempts per chunk before the page is declared failed. Default: 3.
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds. Default: 1000.
    ///
    /// Doubles after each further attempt: 1 s → 2 s → 4 s, capped at
    /// `max_backoff_ms`.
    pub retry_backoff_ms: u64,

    /// Upper bound for a single backoff delay. Default: 30 000.
    pub max_backoff_ms: u64,

    /// Largest chunk handed to the transform, in bytes. Default: 4000.
    ///
    /// The public Google endpoint rejects requests much above 5 000
    /// characters; 4 000 bytes leaves room for URL encoding.
    pub max_chunk_bytes: usize,

    /// Chunks of one page transformed concurrently. Default: 1.
    ///
    /// Pages themselves are always processed one at a time, in order. Raise
    /// this only if the provider tolerates parallel calls.
    pub chunk_concurrency: usize,

    /// Attempts for each checkpoint write before the job is aborted. Default: 3.
    pub checkpoint_write_attempts: u32,

    /// Heading written before each page section of the artifact.
    pub page_header: PageHeader,

    /// Receives per-page events from background workers.
    pub progress_callback: Option<ProgressCallback>,

    // ── LLM backend ─────────────────────────────────────────────────────
    /// LLM model identifier, e.g. "gpt-4.1-nano". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Language the LLM backend translates into.
    pub target_language: String,

    /// Custom system prompt. If None, built from `target_language`.
    pub system_prompt: Option<String>,

    /// Sampling temperature for the LLM completion. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per chunk. Default: 4096.
    pub max_tokens: usize,

    /// Per-call timeout in seconds for the LLM backend. Default: 60.
    pub api_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("pagewise-state"),
            max_attempts: 3,
            retry_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            max_chunk_bytes: 4000,
            chunk_concurrency: 1,
            checkpoint_write_attempts: 3,
            page_header: PageHeader::default(),
            progress_callback: None,
            model: None,
            provider_name: None,
            provider: None,
            target_language: DEFAULT_TARGET_LANGUAGE.to_string(),
            system_prompt: None,
            temperature: 0.1,
            max_tokens: 4096,
            api_timeout_secs: 60,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("state_dir", &self.state_dir)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("max_chunk_bytes", &self.max_chunk_bytes)
            .field("chunk_concurrency", &self.chunk_concurrency)
            .field("checkpoint_write_attempts", &self.checkpoint_write_attempts)
            .field("page_header", &self.page_header)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("target_language", &self.target_language)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.state_dir.join("checkpoints")
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.state_dir.join("artifacts")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.state_dir.join("cache")
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn state_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.state_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn max_chunk_bytes(mut self, n: usize) -> Self {
        self.config.max_chunk_bytes = n;
        self
    }

    pub fn chunk_concurrency(mut self, n: usize) -> Self {
        self.config.chunk_concurrency = n.max(1);
        self
    }

    pub fn checkpoint_write_attempts(mut self, n: u32) -> Self {
        self.config.checkpoint_write_attempts = n.max(1);
        self
    }

    pub fn page_header(mut self, header: PageHeader) -> Self {
        self.config.page_header = header;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn target_language(mut self, language: impl Into<String>) -> Self {
        self.config.target_language = language.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.max_chunk_bytes < 16 {
            return Err(PipelineError::InvalidConfig(format!(
                "max_chunk_bytes must be ≥ 16, got {}",
                c.max_chunk_bytes
            )));
        }
        if c.max_backoff_ms < c.retry_backoff_ms {
            return Err(PipelineError::InvalidConfig(format!(
                "max_backoff_ms ({}) must be ≥ retry_backoff_ms ({})",
                c.max_backoff_ms, c.retry_backoff_ms
            )));
        }
        if c.state_dir.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "state_dir must not be empty".into(),
            ));
        }
        if c.target_language.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "target_language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Heading written before each page's section in the artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageHeader {
    /// `"\n--- Page N ---\n"` (default).
    #[default]
    Dashed,
    /// No heading; sections are written back to back.
    None,
    /// Custom template; `{page}` is replaced with the 1-indexed page number.
    Custom(String),
}

impl PageHeader {
    /// Render the heading for the given page number (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageHeader::Dashed => format!("\n--- Page {} ---\n", page_num),
            PageHeader::None => String::new(),
            PageHeader::Custom(t) => t.replace("{page}", &page_num.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documentation() {
        let c = PipelineConfig::default();
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.retry_backoff_ms, 1000);
        assert_eq!(c.max_chunk_bytes, 4000);
        assert_eq!(c.chunk_concurrency, 1);
        assert_eq!(c.page_header, PageHeader::Dashed);
    }

    #[test]
    fn builder_clamps_attempts() {
        let c = PipelineConfig::builder().max_attempts(0).build().unwrap();
        assert_eq!(c.max_attempts, 1);
    }

    #[test]
    fn builder_rejects_tiny_chunks() {
        let err = PipelineConfig::builder().max_chunk_bytes(4).build().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_inverted_backoff() {
        let err = PipelineConfig::builder()
            .retry_backoff_ms(5000)
            .max_backoff_ms(100)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_backoff_ms"));
    }

    #[test]
    fn state_subdirectories() {
        let c = PipelineConfig::builder().state_dir("/srv/pw").build().unwrap();
        assert_eq!(c.checkpoint_dir(), PathBuf::from("/srv/pw/checkpoints"));
        assert_eq!(c.artifact_dir(), PathBuf::from("/srv/pw/artifacts"));
        assert_eq!(c.cache_dir(), PathBuf::from("/srv/pw/cache"));
    }

    #[test]
    fn page_header_render() {
        assert_eq!(PageHeader::Dashed.render(3), "\n--- Page 3 ---\n");
        assert_eq!(PageHeader::None.render(3), "");
        assert_eq!(
            PageHeader::Custom("## Page {page}\n".into()).render(7),
            "## Page 7\n"
        );
    }

    #[test]
    fn debug_hides_provider() {
        let c = PipelineConfig::default();
        let s = format!("{c:?}");
        assert!(s.contains("PipelineConfig"));
        assert!(s.contains("max_chunk_bytes"));
    }
}
