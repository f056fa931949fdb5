// src/extractors/mod.rs
pub mod columns;
pub mod document;
pub mod models;
pub mod reconcile;
pub mod rows;
pub mod section;

// Re-export key extraction types for convenience
pub use document::{DocumentExtractor, SchemaCache};
