//! The job driver: one request in, one well-formed result out.
//!
//! ```text
//! JSON input ─► JobRequest ─► params + source ─► Normalizer ─► Engine ─► base64 ─► JobResult
//! ```
//!
//! Every failure at every stage, panics included, is turned into a
//! [`JobResult::Failure`] here. Nothing a job does can take the process down,
//! and `processing_ms` is always filled in.

use crate::engine::{Engine, EngineOutput};
use crate::error::JobError;
use crate::imaging::Normalizer;
use crate::types::{JobParams, JobRequest, JobResult};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// Runs jobs against one engine strategy.
pub struct JobRunner<E> {
    normalizer: Normalizer,
    engine: E,
    default_max_edge: u32,
}

impl<E: Engine> JobRunner<E> {
    pub fn new(normalizer: Normalizer, engine: E, default_max_edge: u32) -> Self {
        Self {
            normalizer,
            engine,
            default_max_edge,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run one job to completion. Never fails; errors become the payload.
    pub fn run(&self, input: &Value) -> JobResult {
        let span = tracing::info_span!("job", strategy = self.engine.name());
        let _enter = span.enter();
        let started = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(input)))
            .unwrap_or_else(|payload| {
                Err(JobError::Panicked(
                    panic_message(payload.as_ref()).to_string(),
                ))
            });
        let processing_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok((params, output)) => {
                tracing::info!(
                    mode = params.mode.as_str(),
                    format = output.format.as_str(),
                    bytes = output.bytes.len(),
                    processing_ms,
                    "job finished"
                );
                JobResult::Success {
                    image_b64: BASE64.encode(&output.bytes),
                    format: output.format,
                    processing_ms,
                    mode: params.mode,
                }
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, processing_ms, "job failed");
                JobResult::Failure {
                    error: e.to_string(),
                    processing_ms,
                }
            }
        }
    }

    fn execute(&self, input: &Value) -> Result<(JobParams, EngineOutput), JobError> {
        let request = JobRequest::from_value(input)?;
        let source = request.source()?;
        let params = request.params(self.default_max_edge)?;
        tracing::info!(
            mode = params.mode.as_str(),
            format = params.format.as_str(),
            max_edge = params.max_edge,
            "job started"
        );

        let image = self.normalizer.normalize(&source, params.max_edge)?;
        tracing::debug!(
            width = image.width,
            height = image.height,
            bytes = image.bytes.len(),
            "normalized input"
        );

        let output = self
            .engine
            .anonymize(&image.bytes, params.mode, params.format)?;
        Ok((params, output))
    }
}

/// Unwrap a hosting-platform envelope `{ "input": { … } }` if present;
/// anything else is taken to be the job input itself.
pub fn job_input(payload: Value) -> Value {
    match payload {
        Value::Object(mut map) if map.len() == 1 && map.get("input").is_some_and(Value::is_object) => {
            map.remove("input").unwrap_or_default()
        }
        other => other,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
