//! # paperdex-inference
//!
//! Inference backends for paperdex: text embedding and structured metadata
//! extraction over an OpenAI-compatible HTTP service.
//!
//! The [`OpenAiBackend`] implements both [`paperdex_core::EmbeddingBackend`]
//! and [`paperdex_core::GenerationBackend`] against `/embeddings` and
//! `/chat/completions`. The [`StructuredExtractor`] layers the extraction
//! prompt and response validation on top of any generation backend.
//!
//! [`mock::MockInference`] provides a deterministic in-process backend for
//! tests.

pub mod extractor;
pub mod mock;
pub mod openai;

pub use extractor::{embedding_input, extraction_prompt, StructuredExtractor};
pub use mock::MockInference;
pub use openai::OpenAiBackend;
