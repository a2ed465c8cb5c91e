//! Line based simulation input files with `keyword: value` fields.
//!
//! A template is parsed once and then cloned for every run of a batch. Output
//! file names are built from name formats containing `%keyword%` placeholders,
//! which are filled from the field values of the document.

pub mod document;
pub mod line;

#[cfg(test)]
mod document_test;

pub use document::{ConfigDocument, NameFormats};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("No EXE-FILE specified in template header")]
    MissingExecutable,
    #[error("Output file {0} is not defined in the template")]
    UndefinedOutput(String),
    #[error("Invalid placeholder pattern")]
    Pattern(#[from] regex::Error),
    #[error("Failed to access {path:?}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}
