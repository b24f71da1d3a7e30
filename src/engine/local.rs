//! Local strategy: run the engine binary against a per-job workspace.
//!
//! The engine reads the images sitting directly in the directory it is
//! given and writes its output somewhere under that directory. This module
//! only checks that the process exited successfully; which file is the
//! result is decided by [`resolve`](crate::resolve).
//!
//! The only diagnostic the engine offers is its console output, so both
//! streams are captured and attached to the error when it fails.

use super::{Engine, EngineOutput};
use crate::config::{Config, LocalEngineConfig};
use crate::error::JobError;
use crate::resolve::resolve;
use crate::types::{Mode, OutputFormat};
use crate::workspace::{INPUT_FILENAME, Workspace};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Keep at most this much engine output (the tail) in error messages.
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// How often to check on a child running under a deadline.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long a killed engine's pipes get to close before output is taken as is.
const KILL_GRACE: Duration = Duration::from_millis(200);

/// Runs the engine binary once per call.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    binary: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl LocalRunner {
    pub fn from_config(config: &LocalEngineConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            args: config.args.clone(),
            timeout: config.timeout(),
        }
    }

    /// Override the execution limit. `None` waits for the engine indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the engine on `dir` and wait for it to exit.
    pub fn run(&self, dir: &Path, mode: Mode, format: OutputFormat) -> Result<(), JobError> {
        let mut command = Command::new(&self.binary);
        command
            .args(&self.args)
            .arg("-d")
            .arg(dir)
            .args(["--mode", mode.as_str(), "--format", format.as_str()])
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Under a deadline the engine leads its own process group, so the
        // whole tree (wrapper scripts, interpreters) can be killed at once.
        #[cfg(unix)]
        if self.timeout.is_some() {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        tracing::debug!(?command, "starting engine");

        let started = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            JobError::EngineFailure(format!("Failed to start engine {:?}: {e}", self.binary))
        })?;
        let stdout = Capture::drain(child.stdout.take());
        let stderr = Capture::drain(child.stderr.take());

        let status = match self.timeout {
            None => child.wait()?,
            Some(limit) => match wait_with_deadline(&mut child, limit)? {
                Some(status) => status,
                None => {
                    // A descendant that escaped the group may still hold the
                    // pipes open, so the drain threads are never joined here.
                    stdout.settle(KILL_GRACE);
                    stderr.settle(KILL_GRACE);
                    let output = combine_output(&stdout.snapshot(), &stderr.snapshot());
                    tracing::warn!(limit_ms = limit.as_millis() as u64, "engine killed at deadline");
                    return Err(JobError::EngineTimedOut { limit, output });
                }
            },
        };
        let output = combine_output(&stdout.finish(), &stderr.finish());
        tracing::debug!(
            %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "engine exited"
        );

        if status.success() {
            Ok(())
        } else {
            Err(JobError::EngineFailure(format!(
                "Engine failed ({status}):\n{output}"
            )))
        }
    }
}

/// One child pipe, read on a helper thread into a shared buffer so a chatty
/// engine can't block on a full pipe while we wait for it, and so whatever
/// arrived can be read back without waiting for end-of-file.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl Capture {
    fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let reader = thread::spawn(move || {
            let Some(mut pipe) = pipe else { return };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = sink.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        });
        Self { buf, reader }
    }

    /// Everything read so far.
    fn snapshot(&self) -> Vec<u8> {
        self.buf.lock().map(|buf| buf.clone()).unwrap_or_default()
    }

    /// Give the reader up to `grace` to hit end-of-file.
    fn settle(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        while !self.reader.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Wait for end-of-file and return the full stream.
    fn finish(self) -> Vec<u8> {
        let Self { buf, reader } = self;
        let _ = reader.join();
        buf.lock().map(|buf| buf.clone()).unwrap_or_default()
    }
}

/// Stdout followed by stderr, lossy UTF-8, trimmed, tail-truncated.
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = stdout.to_vec();
    combined.extend_from_slice(stderr);
    let text = String::from_utf8_lossy(&combined);
    truncate_tail(text.trim(), MAX_DIAGNOSTIC_BYTES)
}

fn truncate_tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!(
        "[truncated: showing last {}/{} bytes]\n{}",
        text.len() - start,
        text.len(),
        &text[start..]
    )
}

/// Wait for `child` until `limit` elapses. On expiry the child's process
/// group is killed, the child is reaped, and `None` is returned.
fn wait_with_deadline(child: &mut Child, limit: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            kill_tree(child);
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(WAIT_POLL_INTERVAL.min(deadline - now));
    }
}

/// SIGKILL the process group the child leads, then the child itself.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) takes plain integers; a negative pid addresses the
        // group created at spawn, which only holds the engine's processes.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    // Already-exited children make kill() fail; the caller's wait still reaps.
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// The local strategy: workspace, engine run, output resolution.
#[derive(Debug, Clone)]
pub struct LocalEngine {
    root: PathBuf,
    runner: LocalRunner,
    cleanup: bool,
    exclude_input: bool,
}

impl LocalEngine {
    pub fn new(root: PathBuf, runner: LocalRunner, cleanup: bool) -> Self {
        Self {
            root,
            runner,
            cleanup,
            exclude_input: false,
        }
    }

    /// Keep the staged input out of output resolution, so an engine that
    /// writes nothing fails with [`JobError::NoOutputProduced`] instead of
    /// returning its own input.
    pub fn with_input_excluded(mut self, exclude: bool) -> Self {
        self.exclude_input = exclude;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.workspace.root.clone(),
            LocalRunner::from_config(&config.engine.local),
            config.workspace.cleanup,
        )
        .with_input_excluded(config.workspace.exclude_input)
    }

    fn process_in(
        &self,
        workspace: &Workspace,
        image: &[u8],
        mode: Mode,
        format: OutputFormat,
    ) -> Result<EngineOutput, JobError> {
        let input = workspace.stage(INPUT_FILENAME, image)?;
        workspace.reset()?;
        self.runner.run(workspace.path(), mode, format)?;

        let staged = [input.as_path()];
        let excluded: &[&Path] = if self.exclude_input { &staged } else { &[] };
        let output = resolve(workspace.path(), excluded)?;
        tracing::info!(output = %output.display(), "resolved engine output");
        let bytes = std::fs::read(&output)?;
        let format = output
            .extension()
            .and_then(|e| e.to_str())
            .and_then(OutputFormat::from_extension)
            .unwrap_or(format);
        Ok(EngineOutput { bytes, format })
    }
}

impl Engine for LocalEngine {
    fn name(&self) -> &'static str {
        "local"
    }

    fn anonymize(
        &self,
        image: &[u8],
        mode: Mode,
        format: OutputFormat,
    ) -> Result<EngineOutput, JobError> {
        let workspace = Workspace::allocate(&self.root)?;
        let span = tracing::debug_span!("workspace", id = %workspace.id());
        let _enter = span.enter();

        let result = self.process_in(&workspace, image, mode, format);
        if self.cleanup {
            let path = workspace.path().to_path_buf();
            if let Err(e) = workspace.remove() {
                tracing::warn!(workspace = %path.display(), error = %e, "workspace cleanup failed");
            }
        }
        result
    }
}
