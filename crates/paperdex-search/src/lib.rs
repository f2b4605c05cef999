//! # paperdex-search
//!
//! Read-path engines for paperdex.
//!
//! This crate provides:
//! - Hybrid keyword+semantic search: semantic candidate retrieval from the
//!   vector index, lexical re-scoring against the relational fields
//! - Nearest-neighbor recommendations with self-exclusion
//!
//! ## Example
//!
//! ```rust,ignore
//! use paperdex_search::{HybridQueryPlanner, SearchRequest};
//!
//! let planner = HybridQueryPlanner::new(papers, vectors, embedder);
//! let page = planner
//!     .search(SearchRequest::new().with_query("vision transformers"))
//!     .await?;
//! ```

pub mod planner;
pub mod recommend;

// Re-export core types
pub use paperdex_core::*;

pub use planner::{HybridQueryPlanner, SearchRequest};
pub use recommend::RecommendationResolver;
