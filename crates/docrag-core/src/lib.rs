//! docrag-core - Core types and traits for docrag
//!
//! This crate provides the foundational types, traits, configuration and
//! error handling shared by the ingestion and retrieval components.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{RagError, Result};
pub use traits::*;
pub use types::*;
