//! OpenAI-compatible inference backend implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use paperdex_core::{defaults, EmbeddingBackend, Error, GenerationBackend, Result, Vector};

/// Default inference service endpoint.
pub const DEFAULT_INFERENCE_URL: &str = defaults::INFERENCE_URL;

/// Default embedding model.
pub const DEFAULT_EMBED_MODEL: &str = defaults::EMBED_MODEL;

/// Default generation model.
pub const DEFAULT_GEN_MODEL: &str = defaults::GEN_MODEL;

/// Default embedding dimension for all-MiniLM-L6-v2.
pub const DEFAULT_DIMENSION: usize = defaults::EMBED_DIMENSION;

/// Backend for an OpenAI-compatible inference service.
///
/// Speaks `/chat/completions` for generation and `/embeddings` for
/// embeddings, with optional bearer authentication.
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    embed_model: String,
    gen_model: String,
    dimension: usize,
    embed_timeout_secs: u64,
    gen_timeout_secs: u64,
}

impl OpenAiBackend {
    /// Create a new backend with default settings.
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_INFERENCE_URL.to_string(),
            DEFAULT_EMBED_MODEL.to_string(),
            DEFAULT_GEN_MODEL.to_string(),
            DEFAULT_DIMENSION,
        )
    }

    /// Create a new backend with custom configuration.
    pub fn with_config(
        base_url: String,
        embed_model: String,
        gen_model: String,
        dimension: usize,
    ) -> Self {
        let gen_timeout = std::env::var("PAPERDEX_GEN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::GEN_TIMEOUT_SECS);

        let embed_timeout = std::env::var("PAPERDEX_EMBED_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::EMBED_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(gen_timeout))
            .build()
            .expect("Failed to create HTTP client");

        info!(
            "Initializing inference backend: url={}, embed={}, gen={}",
            base_url, embed_model, gen_model
        );

        Self {
            client,
            base_url,
            api_key: None,
            embed_model,
            gen_model,
            dimension,
            embed_timeout_secs: embed_timeout,
            gen_timeout_secs: gen_timeout,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        let base_url = std::env::var("PAPERDEX_INFERENCE_URL")
            .unwrap_or_else(|_| DEFAULT_INFERENCE_URL.to_string());
        let embed_model = std::env::var("PAPERDEX_EMBED_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string());
        let gen_model =
            std::env::var("PAPERDEX_GEN_MODEL").unwrap_or_else(|_| DEFAULT_GEN_MODEL.to_string());
        let dimension = std::env::var("PAPERDEX_EMBED_DIM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DIMENSION);

        let mut backend = Self::with_config(base_url, embed_model, gen_model, dimension);
        backend.api_key = std::env::var("PAPERDEX_API_KEY").ok();
        backend
    }

    /// Set the bearer token sent with each request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Probe the service. `Ok(false)` means reachable-but-unhealthy.
    pub async fn health_check(&self) -> Result<bool> {
        let mut request = self
            .client
            .get(format!("{}/models", self.base_url))
            .timeout(Duration::from_secs(5));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(resp) => {
                if resp.status().is_success() {
                    info!("Inference health check passed");
                    Ok(true)
                } else {
                    warn!("Inference health check failed: {}", resp.status());
                    Ok(false)
                }
            }
            Err(e) => {
                warn!("Inference health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Internal generation method shared by all generate variants.
    async fn generate_internal(
        &self,
        prompt: &str,
        response_format: Option<ResponseFormat>,
    ) -> Result<String> {
        let start = Instant::now();

        debug!(
            json_format = response_format.is_some(),
            "Starting generation via chat completions"
        );

        let request = ChatRequest {
            model: self.gen_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            response_format,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(Duration::from_secs(self.gen_timeout_secs))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Request(format!("Generation request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Request(format!(
                "Inference service returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::MalformedExtraction(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::MalformedExtraction("response carried no choices".to_string()))?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = content.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > 30000 {
            warn!(
                duration_ms = elapsed,
                prompt_len = prompt.len(),
                slow = true,
                "Slow generation operation"
            );
        }
        Ok(content)
    }
}

impl Default for OpenAiBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Response format constraint for `/chat/completions`.
#[derive(Serialize, Clone)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

impl ResponseFormat {
    fn json_object() -> Self {
        Self {
            format_type: "json_object".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    #[instrument(skip(self, texts), fields(subsystem = "inference", component = "openai", op = "embed_texts", model = %self.embed_model, input_count = texts.len()))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let start = Instant::now();

        let request = EmbeddingRequest {
            model: self.embed_model.clone(),
            input: texts.to_vec(),
        };

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .timeout(Duration::from_secs(self.embed_timeout_secs))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Inference service returned {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        // The service may reorder; restore input order by index.
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        if data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }

        let vectors: Vec<Vector> = data.into_iter().map(|d| Vector::from(d.embedding)).collect();
        let elapsed = start.elapsed().as_millis() as u64;

        debug!(
            result_count = vectors.len(),
            duration_ms = elapsed,
            "Embedding complete"
        );
        if elapsed > 5000 {
            warn!(
                duration_ms = elapsed,
                input_count = texts.len(),
                slow = true,
                "Slow embedding operation"
            );
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.embed_model
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    #[instrument(skip(self, prompt), fields(subsystem = "inference", component = "openai", op = "generate", model = %self.gen_model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_internal(prompt, None).await
    }

    #[instrument(skip(self, prompt), fields(subsystem = "inference", component = "openai", op = "generate_json", model = %self.gen_model, prompt_len = prompt.len()))]
    async fn generate_json(&self, prompt: &str) -> Result<String> {
        self.generate_internal(prompt, Some(ResponseFormat::json_object()))
            .await
    }

    fn model_name(&self) -> &str {
        &self.gen_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_EMBED_MODEL, "all-MiniLM-L6-v2");
        assert_eq!(DEFAULT_GEN_MODEL, "glm-4-flash");
        assert_eq!(DEFAULT_DIMENSION, 384);
    }

    #[test]
    fn test_custom_config() {
        let backend = OpenAiBackend::with_config(
            "http://custom:1234/v1".to_string(),
            "custom-embed".to_string(),
            "custom-gen".to_string(),
            512,
        );
        assert_eq!(backend.base_url, "http://custom:1234/v1");
        assert_eq!(backend.embed_model, "custom-embed");
        assert_eq!(backend.gen_model, "custom-gen");
        assert_eq!(backend.dimension, 512);
        assert!(backend.api_key.is_none());
    }

    #[test]
    fn test_with_api_key() {
        let backend = OpenAiBackend::new().with_api_key("secret");
        assert_eq!(backend.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_model_name_accessors() {
        let backend = OpenAiBackend::with_config(
            "http://test".to_string(),
            "my-embed-model".to_string(),
            "my-gen-model".to_string(),
            384,
        );
        assert_eq!(EmbeddingBackend::model_name(&backend), "my-embed-model");
        assert_eq!(GenerationBackend::model_name(&backend), "my-gen-model");
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            model: "glm-4-flash".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "Hello".to_string(),
            }],
            stream: false,
            response_format: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("glm-4-flash"));
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("response_format"));
    }

    #[test]
    fn test_chat_request_with_json_format() {
        let request = ChatRequest {
            model: "glm-4-flash".to_string(),
            messages: vec![],
            stream: false,
            response_format: Some(ResponseFormat::json_object()),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"response_format\":{\"type\":\"json_object\"}"));
    }

    #[test]
    fn test_embedding_response_deserialization() {
        let json = r#"{"data": [
            {"index": 1, "embedding": [0.4, 0.5]},
            {"index": 0, "embedding": [0.1, 0.2]}
        ]}"#;
        let response: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[0].index, 1);
    }

    #[tokio::test]
    async fn test_embed_texts_restores_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [1.0, 1.0]},
                    {"index": 0, "embedding": [0.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::with_config(
            server.uri(),
            "test-embed".to_string(),
            "test-gen".to_string(),
            2,
        );

        let vectors = backend
            .embed_texts(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].as_slice(), &[0.0, 0.0]);
        assert_eq!(vectors[1].as_slice(), &[1.0, 1.0]);
    }

    #[tokio::test]
    async fn test_embed_texts_count_mismatch_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [0.1]}]
            })))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::with_config(
            server.uri(),
            "test-embed".to_string(),
            "test-gen".to_string(),
            1,
        );

        let err = backend
            .embed_texts(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[tokio::test]
    async fn test_embed_texts_empty_input_skips_request() {
        // No mock server at all: an empty input must never hit the network.
        let backend = OpenAiBackend::with_config(
            "http://127.0.0.1:1".to_string(),
            "test-embed".to_string(),
            "test-gen".to_string(),
            2,
        );
        let vectors = backend.embed_texts(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn test_generate_json_sets_response_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"title\": \"x\"}"}}]
            })))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::with_config(
            server.uri(),
            "test-embed".to_string(),
            "test-gen".to_string(),
            2,
        );

        let body = backend.generate_json("extract").await.unwrap();
        assert_eq!(body, "{\"title\": \"x\"}");
    }

    #[tokio::test]
    async fn test_generate_surfaces_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::with_config(
            server.uri(),
            "test-embed".to_string(),
            "test-gen".to_string(),
            2,
        );

        let err = backend.generate("prompt").await.unwrap_err();
        match err {
            Error::Request(msg) => assert!(msg.contains("500")),
            other => panic!("expected Request error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_empty_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let backend = OpenAiBackend::with_config(
            server.uri(),
            "test-embed".to_string(),
            "test-gen".to_string(),
            2,
        );

        let err = backend.generate("prompt").await.unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)));
    }
}
