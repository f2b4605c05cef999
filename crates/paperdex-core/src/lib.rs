//! # paperdex-core
//!
//! Core types, traits, and abstractions for the paperdex pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other paperdex crates depend on: the paper data model and its
//! processing-state machine, the LLM extraction schema, and the seams
//! (repositories, backends, document source) behind which the concrete
//! store and service implementations live.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;

/// Re-export of the pgvector vector type used across store and inference seams.
pub use pgvector::Vector;
