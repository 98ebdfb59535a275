// Gemini API client and model fallback resolver.
//
// Sends a composed prompt to the Generative Language REST API
// (`models/{model}:generateContent`, non-streaming) and walks an ordered
// list of candidate model identifiers until one succeeds. Exhaustion is a
// structured outcome, not an error: the orchestrator converts it into a
// persisted, user-visible diagnostic.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CredentialsConfig;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Per-attempt request timeout. The upstream service sets no default and a
/// hung connection would otherwise block the session forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Shortest string accepted as a plausible API key. Anything shorter is
/// treated the same as no key at all.
pub const MIN_API_KEY_LEN: usize = 8;

/// Environment variable consulted when no key is configured in
/// credentials.toml.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no Gemini API key configured")]
    MissingCredential,

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("response contained no text")]
    EmptyResponse,
}

impl LlmError {
    /// Whether this error indicates a rejected or expired API key rather
    /// than a generic transport/quota failure. Detection is by substring
    /// match on the service's error message.
    pub fn is_credential_invalid(&self) -> bool {
        match self {
            LlmError::Api { message, .. } => {
                message.contains("API_KEY_INVALID")
                    || message.contains("API key not valid")
                    || message.to_ascii_lowercase().contains("expired")
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// TextGenerator trait
// ---------------------------------------------------------------------------

/// The backend boundary: one logical `generate` operation plus the model
/// listing used by the availability probe. The orchestrator and resolver
/// only see this trait, so tests substitute a scripted implementation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt` against one model. The API key is
    /// passed per call; it is resolved fresh for every exchange and never
    /// stored on the client.
    async fn generate(&self, api_key: &str, model: &str, prompt: &str)
        -> Result<String, LlmError>;

    /// List the model identifiers the service currently reports available.
    async fn list_models(&self, api_key: &str) -> Result<Vec<String>, LlmError>;
}

// ---------------------------------------------------------------------------
// GeminiClient
// ---------------------------------------------------------------------------

/// HTTP client for the Generative Language API.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new() -> Self {
        Self::with_base_url(GEMINI_API_BASE.to_string())
    }

    /// Create a client pointed at a non-default endpoint (used by tests to
    /// target a local mock server).
    pub fn with_base_url(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http, base_url }
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        debug!(model, "sending generate request");
        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_api_error(&body);
            warn!(model, status = status.as_u16(), "generate request rejected");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let value: Value = response.json().await?;
        extract_candidate_text(&value).ok_or(LlmError::EmptyResponse)
    }

    async fn list_models(&self, api_key: &str) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/models?key={}", self.base_url, api_key);
        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: extract_api_error(&body),
            });
        }

        let value: Value = response.json().await?;
        Ok(extract_model_names(&value))
    }
}

// ---------------------------------------------------------------------------
// JSON parsing helpers
// ---------------------------------------------------------------------------

/// Extract the generated text from a `generateContent` response.
///
/// Expected shape:
/// `{ "candidates": [{ "content": { "parts": [{ "text": "..." }] } }] }`.
/// Multiple parts are concatenated. Returns `None` when no text is present.
pub(crate) fn extract_candidate_text(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let mut text = String::new();
    for part in parts {
        if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
            text.push_str(t);
        }
    }

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Extract a human-readable message from an error response body.
///
/// Expected shape: `{ "error": { "message": "..." } }`; falls back to the
/// raw body (truncated) when it doesn't parse.
pub(crate) fn extract_api_error(body: &str) -> String {
    let parsed: Option<String> = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(|s| s.to_string())
        });

    match parsed {
        Some(message) => message,
        None => {
            let mut raw = body.trim().to_string();
            raw.truncate(200);
            if raw.is_empty() {
                "no error detail provided".to_string()
            } else {
                raw
            }
        }
    }
}

/// Extract model identifiers from a `models` listing, stripping the
/// `models/` prefix the API uses.
pub(crate) fn extract_model_names(value: &Value) -> Vec<String> {
    value
        .get("models")
        .and_then(|m| m.as_array())
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
                .map(|name| name.strip_prefix("models/").unwrap_or(name).to_string())
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Credential resolution
// ---------------------------------------------------------------------------

/// Resolve the API key for one exchange, in priority order: explicit
/// per-session override, configured credential (credentials.toml), then the
/// `GEMINI_API_KEY` environment variable. Keys shorter than
/// `MIN_API_KEY_LEN` are treated as absent. There is deliberately no
/// embedded fallback key.
pub fn resolve_api_key(
    session_override: Option<&str>,
    credentials: &CredentialsConfig,
) -> Result<String, LlmError> {
    let plausible = |key: &str| key.len() >= MIN_API_KEY_LEN;

    if let Some(key) = session_override.filter(|k| plausible(k)) {
        return Ok(key.to_string());
    }

    if let Some(key) = credentials.gemini_api_key.as_deref().filter(|k| plausible(k)) {
        return Ok(key.to_string());
    }

    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if plausible(&key) {
            return Ok(key);
        }
    }

    Err(LlmError::MissingCredential)
}

// ---------------------------------------------------------------------------
// Model fallback resolver
// ---------------------------------------------------------------------------

/// Result of walking the candidate list.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A candidate produced text.
    Success { model: String, text: String },
    /// Every candidate failed. Carries the last observed error so the
    /// orchestrator can surface it as a diagnostic.
    Exhausted {
        last_error: String,
        credential_invalid: bool,
    },
}

/// Decide the order in which candidates are attempted.
///
/// Without the probe this is just the configured priority list. With the
/// probe, the service's live model listing is consulted and the first
/// configured candidate it reports is promoted to the front; probe failures
/// are swallowed and the static order is used.
pub async fn candidate_order(
    generator: &dyn TextGenerator,
    api_key: &str,
    candidates: &[String],
    probe: bool,
) -> Vec<String> {
    if !probe {
        return candidates.to_vec();
    }

    match generator.list_models(api_key).await {
        Ok(available) => {
            let preferred = candidates.iter().find(|c| available.contains(c));
            match preferred {
                Some(preferred) => {
                    debug!(model = %preferred, "availability probe selected preferred model");
                    let mut order = vec![preferred.clone()];
                    order.extend(candidates.iter().filter(|c| *c != preferred).cloned());
                    order
                }
                None => candidates.to_vec(),
            }
        }
        Err(e) => {
            // Probe failures are non-fatal; fall back to the static order.
            warn!(error = %e, "model availability probe failed");
            candidates.to_vec()
        }
    }
}

/// Try each candidate model in order, one attempt each, stopping at the
/// first success. Never errors: total exhaustion is reported as
/// `Outcome::Exhausted` with the last error message.
pub async fn generate_with_fallback(
    generator: &dyn TextGenerator,
    api_key: &str,
    candidates: &[String],
    prompt: &str,
) -> Outcome {
    let mut last_error = "no candidate models configured".to_string();
    let mut credential_invalid = false;

    for model in candidates {
        match generator.generate(api_key, model, prompt).await {
            Ok(text) => {
                debug!(model = %model, "generate succeeded");
                return Outcome::Success {
                    model: model.clone(),
                    text,
                };
            }
            Err(e) => {
                warn!(model = %model, error = %e, "candidate model failed, trying next");
                credential_invalid = e.is_credential_invalid();
                last_error = e.to_string();
            }
        }
    }

    Outcome::Exhausted {
        last_error,
        credential_invalid,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

/// Serializes tests that read or write the `GEMINI_API_KEY` environment
/// variable, which is process-global.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}
