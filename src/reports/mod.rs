// src/reports/mod.rs
pub mod models;
pub mod text;

pub use models::{list_report_files, ReportDocument};
pub use text::{FileTextSource, TextSource};
