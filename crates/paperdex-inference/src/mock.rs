//! Mock inference backend for deterministic testing.
//!
//! Implements both backend traits in-process: embeddings are a deterministic
//! function of the input text, generation replays configured responses. Tests
//! can assert on the exact inputs the pipeline handed to inference.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use paperdex_core::{defaults, EmbeddingBackend, Error, GenerationBackend, Result, Vector};

/// In-process inference backend for tests.
#[derive(Clone)]
pub struct MockInference {
    inner: Arc<Mutex<MockState>>,
    dimension: usize,
}

struct MockState {
    generation_response: String,
    fail_generation: bool,
    fail_embedding: bool,
    embedded_inputs: Vec<String>,
    generate_calls: usize,
}

impl MockInference {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                generation_response: "{}".to_string(),
                fail_generation: false,
                fail_embedding: false,
                embedded_inputs: Vec::new(),
                generate_calls: 0,
            })),
            dimension: defaults::EMBED_DIMENSION,
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Set the body every generation call returns.
    pub fn with_generation_response(self, response: impl Into<String>) -> Self {
        self.inner.lock().unwrap().generation_response = response.into();
        self
    }

    /// Make generation calls fail.
    pub fn with_generation_failure(self) -> Self {
        self.inner.lock().unwrap().fail_generation = true;
        self
    }

    /// Make embedding calls fail.
    pub fn with_embedding_failure(self) -> Self {
        self.inner.lock().unwrap().fail_embedding = true;
        self
    }

    /// Every text passed to `embed_texts`, in call order.
    pub fn embedded_inputs(&self) -> Vec<String> {
        self.inner.lock().unwrap().embedded_inputs.clone()
    }

    /// Number of texts embedded so far.
    pub fn embed_call_count(&self) -> usize {
        self.inner.lock().unwrap().embedded_inputs.len()
    }

    /// Number of generation calls so far.
    pub fn generate_call_count(&self) -> usize {
        self.inner.lock().unwrap().generate_calls
    }

    /// Deterministic embedding for a text: seeded by its hash, so equal texts
    /// always map to equal vectors and distinct texts almost never collide.
    pub fn embedding_for(text: &str, dimension: usize) -> Vector {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut seed = hasher.finish();

        let mut values = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            // xorshift64
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            values.push((seed % 2000) as f32 / 1000.0 - 1.0);
        }
        Vector::from(values)
    }
}

impl Default for MockInference {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockInference {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_embedding {
            return Err(Error::Embedding("simulated failure".to_string()));
        }
        state.embedded_inputs.extend(texts.iter().cloned());
        Ok(texts
            .iter()
            .map(|t| Self::embedding_for(t, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl GenerationBackend for MockInference {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_generation {
            return Err(Error::Request("simulated failure".to_string()));
        }
        state.generate_calls += 1;
        Ok(state.generation_response.clone())
    }

    async fn generate_json(&self, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}
