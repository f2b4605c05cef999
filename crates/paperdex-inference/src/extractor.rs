//! Structured metadata extraction over a generation backend.
//!
//! The prompt fixes the output contract: a single JSON object with the eight
//! metadata keys, empty string or list for anything the document does not
//! state. Validation of the response shape lives in
//! [`ExtractedMetadata::from_llm_json`]; this module owns the prompt and the
//! embedding input convention.

use std::sync::Arc;

use tracing::{debug, instrument};

use paperdex_core::{
    EmbeddingBackend, Error, ExtractedMetadata, GenerationBackend, Result, Vector,
};

/// Build the extraction prompt for one document excerpt.
pub fn extraction_prompt(paper_text: &str) -> String {
    format!(
        r#"You are an expert research assistant. Your task is to read the provided text from an academic paper and extract key information. The text may be truncated.

<document_text>
{paper_text}
</document_text>

Your response MUST be a single, valid JSON object. Do not include any text, explanations, or markdown formatting (like ```json) before or after the JSON object.

The JSON object must have the following keys: "title", "abstract", "contribution", "tasks", "methods", "datasets", "code_links", and "results".

- For "title" and "abstract", extract the exact title and abstract from the document.
- For "contribution", provide a one-sentence summary of the paper's main contribution.
- For "tasks", "methods", "datasets", and "code_links", provide a list of strings.
- For "results", provide a list of objects, where each object has "metric", "value", and "task" keys.
- If no information is found for a key, return an empty string "" or an empty list [].

Example output format:
{{
  "title": "The Title of the Paper Extracted from the Document",
  "abstract": "The full abstract text extracted directly from the document.",
  "contribution": "This paper introduces a novel attention mechanism that improves performance on translation tasks.",
  "tasks": ["Machine Translation", "GLUE Benchmark"],
  "methods": ["Novel Attention Mechanism", "Transformer"],
  "datasets": ["WMT 2014", "SQuAD"],
  "code_links": ["https://github.com/user/repo"],
  "results": [
    {{
      "metric": "BLEU Score",
      "value": "29.3",
      "task": "WMT 2014 En-De"
    }}
  ]
}}
"#
    )
}

/// Canonical embedding input for a paper: `"{title}. {abstract}"`.
///
/// The same convention must be applied at both index and query time or the
/// distances stop meaning anything. Degenerate input (both fields empty) is
/// refused rather than embedded.
pub fn embedding_input(title: &str, abstract_text: &str) -> Result<String> {
    let title = title.trim();
    let abstract_text = abstract_text.trim();
    if title.is_empty() && abstract_text.is_empty() {
        return Err(Error::Embedding(
            "both title and abstract are empty".to_string(),
        ));
    }
    Ok(format!("{}. {}", title, abstract_text))
}

/// Extraction pipeline stage: prompt construction, generation, validation,
/// and embedding of the extracted record.
#[derive(Clone)]
pub struct StructuredExtractor {
    generation: Arc<dyn GenerationBackend>,
    embedding: Arc<dyn EmbeddingBackend>,
}

impl StructuredExtractor {
    pub fn new(
        generation: Arc<dyn GenerationBackend>,
        embedding: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            generation,
            embedding,
        }
    }

    /// Run the extraction model over a document excerpt and validate the
    /// structured output.
    #[instrument(skip(self, excerpt), fields(subsystem = "inference", component = "extractor", op = "extract", excerpt_len = excerpt.len()))]
    pub async fn extract(&self, excerpt: &str) -> Result<ExtractedMetadata> {
        let prompt = extraction_prompt(excerpt);
        let body = self.generation.generate_json(&prompt).await?;
        let meta = ExtractedMetadata::from_llm_json(&body)?;

        debug!(
            title_len = meta.title.len(),
            result_count = meta.results.len(),
            has_code = meta.has_code(),
            "Extraction validated"
        );
        Ok(meta)
    }

    /// Embed the canonical representation of an extracted record.
    #[instrument(skip(self, meta), fields(subsystem = "inference", component = "extractor", op = "embed_metadata"))]
    pub async fn embed_metadata(&self, meta: &ExtractedMetadata) -> Result<Vector> {
        let input = embedding_input(&meta.title, &meta.abstract_text)?;
        let mut vectors = self.embedding.embed_texts(&[input]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("backend returned no vectors".to_string()))
    }
}
