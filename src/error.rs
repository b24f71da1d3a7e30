//! The job error taxonomy.
//!
//! Every stage of a job (request parsing, normalization, engine dispatch,
//! output resolution) reports failures as a [`JobError`]. The job driver is
//! the only place that turns one into the error-shaped payload; nothing
//! below it decides how failures are presented.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    /// Missing or ambiguous image source, or a malformed request field.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Image fetch failed: {0}")]
    Fetch(String),
    #[error("Image decode failed: {0}")]
    Decode(String),
    #[error("Image encode failed: {0}")]
    Encode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The local engine could not be started or exited non-zero. The message
    /// carries the engine's own output, which is the only diagnostic it gives.
    #[error("{0}")]
    EngineFailure(String),
    #[error("Engine did not finish within {}s and was killed:\n{output}", .limit.as_secs_f64())]
    EngineTimedOut { limit: Duration, output: String },
    #[error("No output produced by the engine in {}", .0.display())]
    NoOutputProduced(PathBuf),
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error("Status poll failed: {0}")]
    Poll(String),
    #[error("Download failed: {0}")]
    Download(String),
    /// The remote job never reported ready. The handle is kept so the result
    /// can still be fetched out-of-band.
    #[error(
        "Remote job {handle} not ready after {}ms{}",
        .waited.as_millis(),
        poll_error_suffix(.last_error)
    )]
    Timeout {
        handle: String,
        waited: Duration,
        last_error: Option<String>,
    },
    /// A panic caught at the job boundary.
    #[error("Job panicked: {0}")]
    Panicked(String),
}

fn poll_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last poll error: {e})"),
        None => String::new(),
    }
}

impl JobError {
    /// Stable tag for the variant, used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::InvalidInput(_) => "invalid_input",
            JobError::Fetch(_) => "fetch",
            JobError::Decode(_) => "decode",
            JobError::Encode(_) => "encode",
            JobError::Io(_) => "io",
            JobError::EngineFailure(_) => "engine_failure",
            JobError::EngineTimedOut { .. } => "engine_timed_out",
            JobError::NoOutputProduced(_) => "no_output_produced",
            JobError::Upload(_) => "upload",
            JobError::Poll(_) => "poll",
            JobError::Download(_) => "download",
            JobError::Timeout { .. } => "timeout",
            JobError::Panicked(_) => "panicked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_failure_message_is_the_engine_output() {
        let err = JobError::EngineFailure("engine exited with status 1:\nboom".into());
        assert!(err.to_string().contains("boom"));
        assert_eq!(err.kind(), "engine_failure");
    }

    #[test]
    fn timeout_message_names_the_handle() {
        let err = JobError::Timeout {
            handle: "abc".into(),
            waited: Duration::from_millis(1500),
            last_error: None,
        };
        assert_eq!(err.to_string(), "Remote job abc not ready after 1500ms");
    }

    #[test]
    fn timeout_message_includes_last_poll_error() {
        let err = JobError::Timeout {
            handle: "abc".into(),
            waited: Duration::from_millis(10),
            last_error: Some("HTTP 502".into()),
        };
        assert!(err.to_string().ends_with("(last poll error: HTTP 502)"));
    }

    #[test]
    fn encode_and_panic_have_their_own_tags() {
        let encode = JobError::Encode("writer closed".into());
        assert_eq!(encode.kind(), "encode");
        assert_eq!(encode.to_string(), "Image encode failed: writer closed");

        let panicked = JobError::Panicked("index out of bounds".into());
        assert_eq!(panicked.kind(), "panicked");
        assert_eq!(panicked.to_string(), "Job panicked: index out of bounds");
    }

    #[test]
    fn io_errors_convert() {
        let err: JobError = std::io::Error::other("disk full").into();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("disk full"));
    }
}
