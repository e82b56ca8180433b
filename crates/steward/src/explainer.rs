//! Text explanation handler backed by Gemini.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ExplainerConfig;
use crate::envelope::{Envelope, Task};
use crate::error::GatewayError;
use crate::registry::{Handler, HandlerInfo};

/// Routing name of the explanation handler.
pub const EXPLAINER_NAME: &str = "GoogleExplainer";

/// Default Gemini API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROMPT_PREFIX: &str = "Explain the following text in simple, beginner-friendly language:\n\n";
const MOCK_PREVIEW_CHARS: usize = 50;

/// Something that can explain a piece of text.
#[async_trait]
pub trait ExplanationBackend: Send + Sync {
    /// Produce an explanation of `text`.
    async fn explain(&self, text: &str) -> Result<String, GatewayError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Gemini `generateContent` client.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiBackend {
    /// Create a client for `model` using `api_key`.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GatewayError::Upstream(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build a backend from config, or `None` when no API key is set.
    pub fn from_config(config: &ExplainerConfig) -> Result<Option<Self>, GatewayError> {
        let Some(api_key) = config.api_key() else {
            return Ok(None);
        };
        let mut backend = Self::new(api_key, config.model.clone())?;
        if let Some(base_url) = &config.base_url {
            backend = backend.with_base_url(base_url.clone());
        }
        Ok(Some(backend))
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ExplanationBackend for GeminiBackend {
    async fn explain(&self, text: &str) -> Result<String, GatewayError> {
        let prompt = format!("{PROMPT_PREFIX}{text}");
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: &prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Upstream(format!(
                "Gemini returned {status}: {detail}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("Failed to parse Gemini response: {e}")))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| GatewayError::Upstream("Gemini returned no candidates".to_string()))
    }
}

/// Handler that explains text, or answers in mock mode without a backend.
pub struct ExplainerHandler {
    info: HandlerInfo,
    backend: Option<Arc<dyn ExplanationBackend>>,
}

impl std::fmt::Debug for ExplainerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplainerHandler")
            .field("info", &self.info)
            .field("mock", &self.backend.is_none())
            .finish()
    }
}

impl ExplainerHandler {
    /// Create the handler. With no backend it runs in mock mode.
    pub fn new(backend: Option<Arc<dyn ExplanationBackend>>) -> Self {
        if backend.is_none() {
            tracing::warn!(handler = EXPLAINER_NAME, "no explanation backend, running in mock mode");
        }
        Self {
            info: HandlerInfo::new(EXPLAINER_NAME, "Explains text using Gemini"),
            backend,
        }
    }

    /// Build from config, in mock mode when the API key is absent.
    pub fn from_config(config: &ExplainerConfig) -> Result<Self, GatewayError> {
        let backend = GeminiBackend::from_config(config)?
            .map(|b| Arc::new(b) as Arc<dyn ExplanationBackend>);
        Ok(Self::new(backend))
    }

    /// Returns true when no backend is configured.
    pub fn is_mock(&self) -> bool {
        self.backend.is_none()
    }
}

#[async_trait]
impl Handler for ExplainerHandler {
    fn info(&self) -> &HandlerInfo {
        &self.info
    }

    async fn execute(&self, task: Task) -> anyhow::Result<Envelope> {
        let action = task.str_field("action").unwrap_or_default();
        if action != "explain" {
            return Ok(Envelope::error(format!("Unknown action: {action}")));
        }

        let text = task.str_field("text").unwrap_or_default();
        if text.is_empty() {
            return Ok(Envelope::error("No text provided"));
        }

        let Some(backend) = &self.backend else {
            let preview: String = text.chars().take(MOCK_PREVIEW_CHARS).collect();
            return Ok(Envelope::success(json!({
                "explanation": format!("[MOCK] Gemini is offline. Selected text: {preview}...")
            })));
        };

        match backend.explain(text).await {
            Ok(explanation) => Ok(Envelope::success(json!({ "explanation": explanation }))),
            Err(e) => {
                tracing::warn!(handler = EXPLAINER_NAME, error = %e, "explanation failed");
                Ok(Envelope::error(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Canned(Result<&'static str, &'static str>);

    #[async_trait]
    impl ExplanationBackend for Canned {
        async fn explain(&self, text: &str) -> Result<String, GatewayError> {
            match self.0 {
                Ok(reply) => Ok(format!("{reply}: {text}")),
                Err(message) => Err(GatewayError::Upstream(message.to_string())),
            }
        }
    }

    fn explain_task(text: &str) -> Task {
        Task::new(EXPLAINER_NAME)
            .with_field("action", "explain")
            .with_field("text", text)
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let handler = ExplainerHandler::new(None);
        let task = Task::new(EXPLAINER_NAME).with_field("action", "summarize");
        let envelope = handler.execute(task).await.unwrap();
        assert_eq!(envelope, Envelope::error("Unknown action: summarize"));
    }

    #[tokio::test]
    async fn test_empty_text() {
        let handler = ExplainerHandler::new(None);
        let envelope = handler.execute(explain_task("")).await.unwrap();
        assert_eq!(envelope, Envelope::error("No text provided"));
    }

    #[tokio::test]
    async fn test_mock_mode_previews_fifty_chars() {
        let handler = ExplainerHandler::new(None);
        assert!(handler.is_mock());
        let text = "x".repeat(80);
        let envelope = handler.execute(explain_task(&text)).await.unwrap();
        let explanation = envelope.payload().unwrap()["explanation"].as_str().unwrap();
        assert_eq!(
            explanation,
            format!("[MOCK] Gemini is offline. Selected text: {}...", "x".repeat(50))
        );
    }

    #[tokio::test]
    async fn test_backend_success() {
        let handler = ExplainerHandler::new(Some(Arc::new(Canned(Ok("simple")))));
        let envelope = handler.execute(explain_task("monads")).await.unwrap();
        assert_eq!(envelope.payload().unwrap()["explanation"], "simple: monads");
    }

    #[tokio::test]
    async fn test_backend_failure_is_error_envelope() {
        let handler = ExplainerHandler::new(Some(Arc::new(Canned(Err("quota exceeded")))));
        let envelope = handler.execute(explain_task("monads")).await.unwrap();
        assert_eq!(envelope, Envelope::error("quota exceeded"));
    }

    #[test]
    fn test_endpoint_uses_model_and_trimmed_base() {
        let backend = GeminiBackend::new("key", "gemini-2.0-flash")
            .unwrap()
            .with_base_url("http://127.0.0.1:9/v1beta/");
        assert_eq!(
            backend.endpoint(),
            "http://127.0.0.1:9/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
