use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ListerError {
    #[error("missing required setting: {0}")]
    #[diagnostic(help("pass it on the command line, via the environment, or in harbor-lister.json"))]
    MissingField(&'static str),

    #[error("invalid Harbor URL: {0}")]
    InvalidUrl(String),

    #[error("invalid setting {name}: {message}")]
    InvalidSetting { name: &'static str, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("Harbor request failed: {0}")]
    HarborHttp(String),

    #[error("Harbor returned status {status}: {message}")]
    HarborStatus { status: u16, message: String },

    #[error("failed to decode Harbor response: {0}")]
    Decode(String),

    #[error("unable to parse Harbor version: {0}")]
    InvalidVersion(String),

    #[error("Harbor 2.0 or newer is required, server reports {0}")]
    UnsupportedVersion(String),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("worker pool failed: {0}")]
    Worker(String),

    #[error("aborted")]
    Aborted,
}

impl From<rust_xlsxwriter::XlsxError> for ListerError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ListerError::Spreadsheet(err.to_string())
    }
}
