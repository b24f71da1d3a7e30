//! Remote strategy: upload, poll until ready, download.
//!
//! ```text
//! submit ──► SUBMITTED ──poll──► READY ──fetch──► FETCHED
//!                 │
//!                 └── budget exhausted ──► Timeout { handle, .. }
//! ```
//!
//! [`RemoteApi`] is the three-call contract; [`HttpRemote`] speaks it over
//! HTTP and [`RemoteEngine`] drives it with a [`PollPolicy`]. Individual
//! calls never retry. The polling loop is the only place a failed call is
//! tried again, and only until the budget runs out.

use super::{Engine, EngineOutput};
use crate::config::{ConfigError, RemoteEngineConfig};
use crate::error::JobError;
use crate::types::{Mode, OutputFormat};
use reqwest::Url;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderName, HeaderValue};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Opaque identifier the remote service hands out at upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The remote service contract.
pub trait RemoteApi: Sync {
    /// Upload image bytes, returning the service's handle for the job.
    fn submit(&self, image: &[u8]) -> Result<JobHandle, JobError>;

    /// `true` once the job's output can be fetched. The call should give up
    /// after `within`, the time left in the polling budget.
    fn poll(&self, handle: &JobHandle, within: Duration) -> Result<bool, JobError>;

    /// Download the finished output.
    fn fetch(&self, handle: &JobHandle) -> Result<Vec<u8>, JobError>;
}

impl<A: RemoteApi + ?Sized> RemoteApi for &A {
    fn submit(&self, image: &[u8]) -> Result<JobHandle, JobError> {
        (**self).submit(image)
    }

    fn poll(&self, handle: &JobHandle, within: Duration) -> Result<bool, JobError> {
        (**self).poll(handle, within)
    }

    fn fetch(&self, handle: &JobHandle) -> Result<Vec<u8>, JobError> {
        (**self).fetch(handle)
    }
}

// =============================================================================
// HTTP client
// =============================================================================

/// Status body that marks a job as finished (compared case-insensitively).
const READY_STATUS: &str = "READY";

/// [`RemoteApi`] over HTTP:
///
/// | Call | Request | Response |
/// |---|---|---|
/// | submit | `POST /Upload`, multipart field `file` | plaintext id |
/// | poll | `GET /query/{id}` | plaintext status |
/// | fetch | `GET /download/{id}` | raw bytes |
pub struct HttpRemote {
    http: Client,
    base: Url,
    token: Option<(HeaderName, HeaderValue)>,
    request_timeout: Duration,
}

impl HttpRemote {
    pub fn from_config(config: &RemoteEngineConfig) -> Result<Self, ConfigError> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            ConfigError::Validation(format!("engine.remote.base_url is not a URL: {e}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(ConfigError::Validation(format!(
                "engine.remote.base_url cannot carry a path: {base}"
            )));
        }

        let token = if config.token.is_empty() {
            None
        } else {
            let name = HeaderName::from_bytes(config.token_header.as_bytes()).map_err(|e| {
                ConfigError::Validation(format!("engine.remote.token_header: {e}"))
            })?;
            let mut value = HeaderValue::from_str(&config.token)
                .map_err(|e| ConfigError::Validation(format!("engine.remote.token: {e}")))?;
            value.set_sensitive(true);
            Some((name, value))
        };

        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base,
            token,
            request_timeout: config.request_timeout(),
        })
    }

    /// `base` with `segments` appended as escaped path segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Only fails for cannot-be-a-base URLs, which from_config rejects.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some((name, value)) => request.header(name.clone(), value.clone()),
            None => request,
        }
    }
}

impl RemoteApi for HttpRemote {
    fn submit(&self, image: &[u8]) -> Result<JobHandle, JobError> {
        let url = self.endpoint(&["Upload"]);
        let part = Part::bytes(image.to_vec())
            .file_name("input.png")
            .mime_str("image/png")
            .map_err(|e| JobError::Upload(e.to_string()))?;
        let response = self
            .authorize(self.http.post(url.clone()))
            .multipart(Form::new().part("file", part))
            .send()
            .map_err(|e| JobError::Upload(format!("{url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(JobError::Upload(format!("{url}: HTTP {status}")));
        }
        let body = response
            .text()
            .map_err(|e| JobError::Upload(format!("{url}: reading body: {e}")))?;
        let id = body.trim();
        if id.is_empty() {
            return Err(JobError::Upload(format!("{url}: empty job id")));
        }
        Ok(JobHandle::new(id))
    }

    fn poll(&self, handle: &JobHandle, within: Duration) -> Result<bool, JobError> {
        let url = self.endpoint(&["query", handle.as_str()]);
        let response = self
            .authorize(self.http.get(url.clone()))
            .timeout(within.min(self.request_timeout))
            .send()
            .map_err(|e| JobError::Poll(format!("{url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(JobError::Poll(format!("{url}: HTTP {status}")));
        }
        let body = response
            .text()
            .map_err(|e| JobError::Poll(format!("{url}: reading body: {e}")))?;
        Ok(body.trim().eq_ignore_ascii_case(READY_STATUS))
    }

    fn fetch(&self, handle: &JobHandle) -> Result<Vec<u8>, JobError> {
        let url = self.endpoint(&["download", handle.as_str()]);
        let response = self
            .authorize(self.http.get(url.clone()))
            .send()
            .map_err(|e| JobError::Download(format!("{url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(JobError::Download(format!("{url}: HTTP {status}")));
        }
        let bytes = response
            .bytes()
            .map_err(|e| JobError::Download(format!("{url}: reading body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

// =============================================================================
// Polling driver
// =============================================================================

/// Shortest time a status call is given, even when the budget is spent.
const MIN_POLL_WINDOW: Duration = Duration::from_millis(10);

/// How long and how often to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn from_config(config: &RemoteEngineConfig) -> Self {
        Self {
            timeout: config.poll_timeout(),
            interval: config.poll_interval(),
        }
    }
}

/// Poll `handle` until it is ready, returning how many polls it took.
///
/// A failed poll is logged and counts as not ready. Neither a status call
/// nor the sleep between polls extends past the budget, so a job that never
/// becomes ready fails with [`JobError::Timeout`] shortly after `timeout`.
pub fn wait_until_ready<A: RemoteApi + ?Sized>(
    api: &A,
    handle: &JobHandle,
    policy: PollPolicy,
) -> Result<u32, JobError> {
    let started = Instant::now();
    let mut polls = 0u32;
    let mut last_error = None;
    loop {
        polls += 1;
        let remaining = policy
            .timeout
            .saturating_sub(started.elapsed())
            .max(MIN_POLL_WINDOW);
        match api.poll(handle, remaining) {
            Ok(true) => {
                tracing::debug!(%handle, polls, "remote job ready");
                return Ok(polls);
            }
            Ok(false) => tracing::debug!(%handle, polls, "remote job not ready"),
            Err(e) => {
                tracing::warn!(%handle, polls, error = %e, "poll failed");
                last_error = Some(e.to_string());
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Err(JobError::Timeout {
                handle: handle.to_string(),
                waited: elapsed,
                last_error,
            });
        }
        thread::sleep(policy.interval.min(policy.timeout - elapsed));
    }
}

/// The remote strategy: submit, wait, fetch.
pub struct RemoteEngine<A> {
    api: A,
    policy: PollPolicy,
}

impl<A: RemoteApi> RemoteEngine<A> {
    pub fn new(api: A, policy: PollPolicy) -> Self {
        Self { api, policy }
    }
}

impl RemoteEngine<HttpRemote> {
    pub fn from_config(config: &RemoteEngineConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            HttpRemote::from_config(config)?,
            PollPolicy::from_config(config),
        ))
    }
}

impl<A: RemoteApi> Engine for RemoteEngine<A> {
    fn name(&self) -> &'static str {
        "remote"
    }

    /// The remote contract has no mode or format parameters, so the output
    /// is labelled with the requested format.
    fn anonymize(
        &self,
        image: &[u8],
        mode: Mode,
        format: OutputFormat,
    ) -> Result<EngineOutput, JobError> {
        let handle = self.api.submit(image)?;
        tracing::info!(%handle, mode = mode.as_str(), "submitted remote job");
        let polls = wait_until_ready(&self.api, &handle, self.policy)?;
        let bytes = self.api.fetch(&handle)?;
        tracing::info!(%handle, polls, bytes = bytes.len(), "fetched remote output");
        Ok(EngineOutput { bytes, format })
    }
}
