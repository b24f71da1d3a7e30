//! Engine strategies.
//!
//! The anonymization engine is a black box reachable two ways, and the
//! [`Engine`] trait hides which one a job uses:
//!
//! | Strategy | Contract | Module |
//! |---|---|---|
//! | Local | `<bin> -d <dir> --mode <m> --format <f>`, output somewhere under `<dir>` | [`local`] |
//! | Remote | `POST /Upload` → id, `GET /query/{id}` until `READY`, `GET /download/{id}` | [`remote`] |
//!
//! Both take normalized PNG bytes and hand back the engine's output bytes,
//! so the job driver never touches the filesystem or HTTP itself.

pub mod local;
pub mod remote;

use crate::error::JobError;
use crate::types::{Mode, OutputFormat};

pub use local::{LocalEngine, LocalRunner};
pub use remote::{HttpRemote, JobHandle, PollPolicy, RemoteApi, RemoteEngine};

/// What an engine produced for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

/// A way of running the engine on one image.
pub trait Engine: Sync {
    /// Short label for logs (`"local"`, `"remote"`).
    fn name(&self) -> &'static str;

    /// Run the engine once on `image` (normalized PNG bytes).
    fn anonymize(
        &self,
        image: &[u8],
        mode: Mode,
        format: OutputFormat,
    ) -> Result<EngineOutput, JobError>;
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn anonymize(
        &self,
        image: &[u8],
        mode: Mode,
        format: OutputFormat,
    ) -> Result<EngineOutput, JobError> {
        (**self).anonymize(image, mode, format)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock engine that records calls and replays scripted outcomes.
    /// Uses Mutex (not RefCell) so it is Sync like the real strategies.
    pub struct MockEngine {
        pub outcomes: Mutex<Vec<Result<EngineOutput, JobError>>>,
        pub calls: Mutex<Vec<RecordedCall>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedCall {
        pub image_len: usize,
        pub mode: Mode,
        pub format: OutputFormat,
    }

    impl MockEngine {
        /// Outcomes are consumed front to back.
        pub fn with_outcomes(mut outcomes: Vec<Result<EngineOutput, JobError>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn returning(bytes: &[u8], format: OutputFormat) -> Self {
            Self::with_outcomes(vec![Ok(EngineOutput {
                bytes: bytes.to_vec(),
                format,
            })])
        }

        pub fn get_calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Engine for MockEngine {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn anonymize(
            &self,
            image: &[u8],
            mode: Mode,
            format: OutputFormat,
        ) -> Result<EngineOutput, JobError> {
            self.calls.lock().unwrap().push(RecordedCall {
                image_len: image.len(),
                mode,
                format,
            });
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(JobError::EngineFailure("no scripted outcome".into())))
        }
    }

    #[test]
    fn mock_records_calls() {
        let engine = MockEngine::returning(b"out", OutputFormat::Jpg);
        let out = engine.anonymize(b"input", Mode::High, OutputFormat::Jpg).unwrap();
        assert_eq!(out.bytes, b"out");
        assert_eq!(
            engine.get_calls(),
            vec![RecordedCall {
                image_len: 5,
                mode: Mode::High,
                format: OutputFormat::Jpg
            }]
        );
    }

    #[test]
    fn boxed_engine_delegates() {
        let engine: Box<dyn Engine> = Box::new(MockEngine::returning(b"x", OutputFormat::Png));
        assert_eq!(engine.name(), "mock");
        assert!(engine.anonymize(b"", Mode::Low, OutputFormat::Png).is_ok());
    }
}
