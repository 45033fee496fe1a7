//! The external transform: text in, translated text out, may fail.
//!
//! The pipeline only sees the [`Transform`] trait. Two network backends ship
//! with the crate:
//!
//! * [`LlmTransform`] — any chat provider supported by `edgequake-llm`
//!   (OpenAI, Anthropic, Gemini, Ollama, …), prompted to translate into
//!   [`crate::config::PipelineConfig::target_language`].
//! * [`GoogleTranslateTransform`] — the public `translate_a/single` endpoint.
//!
//! [`FnTransform`] adapts an async closure, which is what tests and
//! embedders with their own client usually want.
//!
//! Backends report every failure as a [`TransformError`]; retrying is the
//! job of [`crate::pipeline::retry::RetryingTransform`], not of the backend.

use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, TransformError};
use crate::pipeline::{postprocess, romanize};
use crate::prompts::translation_system_prompt;

/// A fallible text-to-text transformation.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn apply(&self, text: &str) -> Result<String, TransformError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "transform"
    }
}

// ── Closure adapter ──────────────────────────────────────────────────────

/// Wrap an async closure `Fn(String) -> Future<Output = Result<String, TransformError>>`.
pub struct FnTransform<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnTransform<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, TransformError>> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> Transform for FnTransform<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, TransformError>> + Send,
{
    async fn apply(&self, text: &str) -> Result<String, TransformError> {
        (self.f)(text.to_string()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ── LLM backend ──────────────────────────────────────────────────────────

/// Translate through an `edgequake-llm` chat provider.
pub struct LlmTransform {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmTransform {
    /// Wrap an already-constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| translation_system_prompt(&config.target_language));
        Self {
            provider,
            system_prompt,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs.max(1)),
        }
    }

    /// Resolve a provider from the config and environment.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Transform for LlmTransform {
    async fn apply(&self, text: &str) -> Result<String, TransformError> {
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(text),
        ];
        let options = self.build_options();

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| TransformError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| classify_failure(&e.to_string()))?;

        debug!(
            "LLM translated {} bytes ({} in / {} out tokens)",
            text.len(),
            response.prompt_tokens,
            response.completion_tokens
        );
        Ok(postprocess::clean_translation(&response.content))
    }

    fn name(&self) -> &str {
        "llm"
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`).
/// 2. **Named provider + model** (`config.provider_name`).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI key present** (`OPENAI_API_KEY`).
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ProviderNotConfigured {
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

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PipelineError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Map a provider error message onto a [`TransformError`] variant.
fn classify_failure(message: &str) -> TransformError {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    {
        TransformError::RateLimited {
            detail: message.to_string(),
        }
    } else {
        TransformError::failed(message)
    }
}

// ── Google Translate backend ─────────────────────────────────────────────

/// Endpoint used by the browser extension clients; no API key required.
pub const GOOGLE_TRANSLATE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Translate through the public Google Translate endpoint (`client=gtx`).
///
/// With romanization on, Devanagari output is rewritten in Roman script, so
/// `en` → `hi` yields Hinglish ("aap kaise ho?") instead of "आप कैसे हो?".
#[derive(Debug, Clone)]
pub struct GoogleTranslateTransform {
    client: reqwest::Client,
    endpoint: String,
    source_lang: String,
    target_lang: String,
    timeout: Duration,
    romanize: bool,
}

impl GoogleTranslateTransform {
    /// `source_lang`/`target_lang` are ISO codes, e.g. `"en"` → `"hi"`.
    pub fn new(source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: GOOGLE_TRANSLATE_ENDPOINT.to_string(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            timeout: Duration::from_secs(15),
            romanize: false,
        }
    }

    /// English to Hindi, romanized.
    pub fn hinglish() -> Self {
        Self::new("en", "hi").with_romanization(true)
    }

    pub fn with_romanization(mut self, romanize: bool) -> Self {
        self.romanize = romanize;
        self
    }

    pub fn romanizes(&self) -> bool {
        self.romanize
    }

    /// Point at a different endpoint (proxies, test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Transform for GoogleTranslateTransform {
    async fn apply(&self, text: &str) -> Result<String, TransformError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", self.source_lang.as_str()),
                ("tl", self.target_lang.as_str()),
                ("dt", "t"),
                ("q", text),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransformError::Timeout {
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    TransformError::failed(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TransformError::RateLimited {
                detail: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(TransformError::failed(format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransformError::failed(format!("reading response body: {e}")))?;
        let translated = parse_gtx_response(&body)?;
        Ok(self.finish(translated))
    }

    fn name(&self) -> &str {
        "google"
    }
}

impl GoogleTranslateTransform {
    fn finish(&self, translated: String) -> String {
        if self.romanize && romanize::has_devanagari(&translated) {
            romanize::romanize(&translated)
        } else {
            translated
        }
    }
}

/// Extract the translation from a `translate_a/single?dt=t` response.
///
/// The body is a nested array whose first element lists
/// `[translated, original, …]` segments; the translation is the
/// concatenation of every segment's first string.
pub fn parse_gtx_response(body: &str) -> Result<String, TransformError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| TransformError::failed(format!("malformed response: {e}")))?;

    let segments = value
        .get(0)
        .and_then(|v| v.as_array())
        .ok_or_else(|| TransformError::failed("response has no translation segments"))?;

    Ok(segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(|s| s.as_str()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_transform_calls_closure() {
        let t = FnTransform::new("upper", |s: String| async move { Ok(s.to_uppercase()) });
        assert_eq!(t.apply("hello").await.unwrap(), "HELLO");
        assert_eq!(t.name(), "upper");
    }

    #[tokio::test]
    async fn fn_transform_propagates_errors() {
        let t = FnTransform::new("broken", |_s: String| async move {
            Err::<String, _>(TransformError::failed("boom"))
        });
        assert_eq!(t.apply("x").await, Err(TransformError::failed("boom")));
    }

    #[test]
    fn parse_gtx_joins_segments() {
        let body = r#"[[["namaste ","hello ",null,null,10],["duniya","world",null,null,10]],null,"en"]"#;
        assert_eq!(parse_gtx_response(body).unwrap(), "namaste duniya");
    }

    #[test]
    fn parse_gtx_skips_null_segments() {
        let body = r#"[[["ek",null],[null,"x"],["do",null]]]"#;
        assert_eq!(parse_gtx_response(body).unwrap(), "ekdo");
    }

    #[test]
    fn parse_gtx_rejects_garbage() {
        assert!(parse_gtx_response("<html>blocked</html>").is_err());
        assert!(parse_gtx_response("{}").is_err());
    }

    #[test]
    fn hinglish_romanizes_devanagari_output() {
        let t = GoogleTranslateTransform::hinglish();
        assert!(t.romanizes());
        let body = r#"[[["आप कैसे हो?","How are you?",null,null,10]],null,"en"]"#;
        let translated = parse_gtx_response(body).unwrap();
        assert_eq!(t.finish(translated), "aap kaise ho?");
    }

    #[test]
    fn plain_google_keeps_script() {
        let t = GoogleTranslateTransform::new("en", "hi");
        assert!(!t.romanizes());
        assert_eq!(t.finish("आप कैसे हो?".into()), "आप कैसे हो?");
    }

    #[test]
    fn classify_rate_limit() {
        assert!(matches!(
            classify_failure("HTTP 429 Too Many Requests"),
            TransformError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_failure("invalid api key"),
            TransformError::Failed { .. }
        ));
    }
}
