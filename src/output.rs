//! CLI output formatting.
//!
//! stdout carries exactly one thing: the job result JSON. Everything meant
//! for a human (the one-line job summary, the effective configuration from
//! `check`) is formatted here as lines and written to stderr or stdout by
//! the `print_*` wrappers.
//!
//! # Output Format
//!
//! ## Run (stderr summary)
//!
//! ```text
//! ok: mode=high format=jpg 48213 bytes in 812ms
//! failed in 3ms: Invalid input: Provide image_url or image_b64
//! ```
//!
//! ## Check
//!
//! ```text
//! Workspace
//!     Root: /tmp/cloakjob
//!     Cleanup: no
//!     Exclude input: no
//! Input
//!     Max edge: 2048px
//!     Fetch timeout: 30s
//! Engine: local
//!     Binary: fawkes
//!     Args: (none)
//!     Timeout: none
//! Remote
//!     URL: http://127.0.0.1:8000
//!     Token: (unset)
//!     Poll: every 2000ms for up to 300s
//!     Request timeout: 60s
//! ```

use crate::config::Config;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use crate::types::JobResult;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Keep the summary to a single line.
fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// The result payload as JSON.
pub fn render_result(result: &JobResult, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(result)
    } else {
        serde_json::to_string(result)
    }
}

/// One human-readable line describing a finished job.
pub fn format_result_summary(result: &JobResult) -> String {
    match result {
        JobResult::Success {
            image_b64,
            format,
            processing_ms,
            mode,
        } => {
            let size = match BASE64.decode(image_b64) {
                Ok(bytes) => format!("{} bytes", bytes.len()),
                Err(_) => "unknown size".to_string(),
            };
            format!(
                "ok: mode={} format={} {size} in {processing_ms}ms",
                mode.as_str(),
                format.as_str()
            )
        }
        JobResult::Failure {
            error,
            processing_ms,
        } => format!("failed in {processing_ms}ms: {}", first_line(error)),
    }
}

pub fn print_result_summary(result: &JobResult) {
    eprintln!("{}", format_result_summary(result));
}

/// The effective configuration, grouped by section.
pub fn format_config_summary(config: &Config) -> Vec<String> {
    let mut lines = Vec::new();
    let i1 = indent(1);

    lines.push("Workspace".to_string());
    lines.push(format!("{i1}Root: {}", config.workspace.root.display()));
    lines.push(format!(
        "{i1}Cleanup: {}",
        if config.workspace.cleanup { "yes" } else { "no" }
    ));
    lines.push(format!(
        "{i1}Exclude input: {}",
        if config.workspace.exclude_input { "yes" } else { "no" }
    ));

    lines.push("Input".to_string());
    lines.push(format!("{i1}Max edge: {}px", config.input.max_edge));
    lines.push(format!(
        "{i1}Fetch timeout: {}s",
        config.input.fetch_timeout_secs
    ));

    let local = &config.engine.local;
    lines.push(format!("Engine: {}", config.engine.strategy.as_str()));
    lines.push(format!("{i1}Binary: {}", local.binary));
    lines.push(format!(
        "{i1}Args: {}",
        if local.args.is_empty() {
            "(none)".to_string()
        } else {
            local.args.join(" ")
        }
    ));
    lines.push(format!(
        "{i1}Timeout: {}",
        local
            .timeout_secs
            .map_or_else(|| "none".to_string(), |s| format!("{s}s"))
    ));

    let remote = &config.engine.remote;
    lines.push("Remote".to_string());
    lines.push(format!("{i1}URL: {}", remote.base_url));
    lines.push(if remote.token.is_empty() {
        format!("{i1}Token: (unset)")
    } else {
        format!("{i1}Token: (set, sent as {})", remote.token_header)
    });
    lines.push(format!(
        "{i1}Poll: every {}ms for up to {}s",
        remote.poll_interval_ms, remote.poll_timeout_secs
    ));
    lines.push(format!(
        "{i1}Request timeout: {}s",
        remote.request_timeout_secs
    ));

    lines
}

pub fn print_config_summary(config: &Config) {
    for line in format_config_summary(config) {
        println!("{}", line);
    }
}
