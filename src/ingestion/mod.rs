//! Document ingestion.
//!
//! Binary documents (PDF, DOCX, ...) are converted to plain text by an
//! external parsing service before the pipeline ever sees them. This module
//! holds the client for that service.

pub mod docfile;

pub use docfile::{DocfileClient, ExtractionError};
