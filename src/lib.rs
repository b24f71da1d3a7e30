//! # Cloakjob
//!
//! A job shim around an external face-anonymization engine. One job takes
//! one input image, normalizes it, hands it to the engine through one of two
//! interchangeable strategies, picks out the engine's result and returns it
//! as a JSON payload. The anonymization itself happens entirely inside the
//! engine; this crate never looks at faces.
//!
//! # Data Flow
//!
//! ```text
//! request ─► normalize ─► engine ─► resolve ─► encode ─► JobResult
//!            (imaging)    (local:  workspace + subprocess + resolve)
//!                         (remote: upload + poll + download)
//! ```
//!
//! Data only moves forward. The workspace and the output resolver exist for
//! the local strategy only; the remote strategy gets bytes back directly.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | Request parsing with lenient mode/format handling, the result payload |
//! | [`error`] | [`JobError`](error::JobError), the failure taxonomy every stage reports in |
//! | [`config`] | Layered configuration: defaults → TOML file → `CLOAKJOB_*` environment |
//! | [`imaging`] | Fetch or decode the input, then canonicalize to a bounded RGB PNG |
//! | [`workspace`] | Uniquely named per-job directories for the local engine |
//! | [`resolve`] | Picks the one output file among everything the engine wrote |
//! | [`engine`] | The [`Engine`](engine::Engine) trait with its local and remote strategies |
//! | [`job`] | The job driver; turns every failure into an error payload |
//! | [`output`] | CLI rendering: result JSON, stderr summary, config listing |
//!
//! # Design Decisions
//!
//! ## Lenient Parameters
//!
//! Unknown `mode` and `format` values silently become `low` and `png`. Callers
//! of the hosting platform often send loosely typed payloads, and a job that
//! runs with defaults is more useful to them than one that refuses to run.
//! Missing or ambiguous image sources are still rejected.
//!
//! ## Always a Payload
//!
//! [`job::JobRunner::run`] returns a [`JobResult`](types::JobResult), not a
//! `Result`. Errors (and panics) become `{ "error", "processing_ms" }`, so the
//! host always receives well-formed JSON with timing filled in.
//!
//! ## Newest, Then Largest
//!
//! The engine doesn't say which file it wrote, and in some modes it also
//! leaves crops behind. [`resolve`] ranks every image file in the workspace
//! by modification time and then size, which reliably lands on the full
//! output. The staged input ranks alongside everything else, so an engine
//! that rewrites it in place is handled too; `workspace.exclude_input`
//! takes it out of the running.
//!
//! ## No Shared State
//!
//! Concurrent jobs share nothing but the workspace root. Workspaces are named
//! with random UUIDs and created exclusively, so two jobs can never collide.

pub mod config;
pub mod engine;
pub mod error;
pub mod imaging;
pub mod job;
pub mod output;
pub mod resolve;
pub mod types;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_helpers;
