use reqwest::StatusCode;
use thiserror::Error;

/// Failures surfaced by the hub and jobs clients
#[derive(Error, Debug)]
pub enum HfJobsError {
    #[error("Not authenticated: {0}")]
    Authentication(String),

    #[error("Job submission rejected ({status}): {body}")]
    Submission { status: StatusCode, body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Repository {0} already exists")]
    AlreadyExists(String),

    #[error("Hub API error ({status}){}: {body}", status_hint(.status))]
    Api { status: StatusCode, body: String },

    #[error("{message} ({code})")]
    JobFailed { message: String, code: String },

    #[error("Gave up waiting for job {0}: still running after the configured deadline")]
    MonitorTimeout(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HfJobsError>;

/// Hints for the status codes users tend to hit
fn status_hint(status: &StatusCode) -> &'static str {
    match status.as_u16() {
        401 | 403 => " (check your token)",
        429 => " (rate limited, try again later)",
        500..=599 => " (server error, try again later)",
        _ => "",
    }
}
