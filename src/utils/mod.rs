// src/utils/mod.rs
pub mod error;
pub mod logging;
pub mod text_debug;

pub use error::AppError; // Re-export the top-level error for main
