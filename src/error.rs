use std::time::Duration;
use thiserror::Error;

/// Structured text could not be pulled out of a model response.
#[derive(Error, Debug)]
#[error("invalid JSON in model response ({source}); payload starts: {snippet}")]
pub struct ParseError {
    #[source]
    pub source: serde_json::Error,
    pub snippet: String,
}

impl ParseError {
    pub(crate) fn new(source: serde_json::Error, payload: &str) -> Self {
        Self {
            source,
            snippet: payload.chars().take(200).collect(),
        }
    }
}

/// Anything that goes wrong while talking to a generation backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend error: {0}")]
    Api(String),

    #[error("backend response carried no {0}")]
    MissingOutput(String),

    #[error("video generation still running after {waited:?}")]
    Timeout { waited: Duration },

    #[error("inline payload decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("media command failed: {0}")]
    Command(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("expected {requested} scenes, backend returned {received}")]
    CountMismatch { requested: usize, received: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("scene {index}: response is missing {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
