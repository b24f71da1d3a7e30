//! Request and result shapes for a single job.
//!
//! The request side is deliberately lenient: unknown `mode`/`format` values
//! fall back to their defaults instead of failing the job, and fields with
//! the wrong JSON type are treated as absent. The result side is a closed
//! union of the success and error payloads, both carrying `processing_ms`.

use crate::error::JobError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Engine protection strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Low,
    Mid,
    High,
}

impl Mode {
    /// Parse a requested mode, falling back to [`Mode::Low`] for anything
    /// outside the enumerated set.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("mid") => Mode::Mid,
            Some("high") => Mode::High,
            _ => Mode::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Low => "low",
            Mode::Mid => "mid",
            Mode::High => "high",
        }
    }
}

/// Output image format requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpg,
}

impl OutputFormat {
    /// Parse a requested format; `jpeg` is an alias of `jpg`, anything
    /// else falls back to [`OutputFormat::Png`].
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("jpg") | Some("jpeg") => OutputFormat::Jpg,
            _ => OutputFormat::Png,
        }
    }

    /// Map a file extension to a format label, if it is one we report.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("png") {
            Some(OutputFormat::Png)
        } else if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") {
            Some(OutputFormat::Jpg)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
        }
    }
}

/// Where the input image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Fetched over HTTP.
    Url(String),
    /// Base64 text embedded in the request.
    Inline(String),
}

/// A job request as received, before any defaults are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub image_b64: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub format: Option<String>,
    #[serde(default)]
    pub max_edge: Option<Value>,
}

/// Parameters after clamping to the enumerated sets and applying defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobParams {
    pub mode: Mode,
    pub format: OutputFormat,
    pub max_edge: u32,
}

/// Accept any JSON value; only non-empty strings survive.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

impl JobRequest {
    /// Parse a request from the job's input object.
    pub fn from_value(input: &Value) -> Result<Self, JobError> {
        if !input.is_object() {
            return Err(JobError::InvalidInput(
                "job input must be a JSON object".into(),
            ));
        }
        serde_json::from_value(input.clone()).map_err(|e| JobError::InvalidInput(e.to_string()))
    }

    /// Exactly one image source must be present.
    pub fn source(&self) -> Result<ImageSource, JobError> {
        match (&self.image_url, &self.image_b64) {
            (Some(url), None) => Ok(ImageSource::Url(url.clone())),
            (None, Some(b64)) => Ok(ImageSource::Inline(b64.clone())),
            (None, None) => Err(JobError::InvalidInput(
                "Provide image_url or image_b64".into(),
            )),
            (Some(_), Some(_)) => Err(JobError::InvalidInput(
                "Provide only one of image_url or image_b64".into(),
            )),
        }
    }

    /// Resolve mode, format and max edge. Mode and format never fail;
    /// `max_edge` of `0`, `null` or absent means `default_max_edge`.
    pub fn params(&self, default_max_edge: u32) -> Result<JobParams, JobError> {
        Ok(JobParams {
            mode: Mode::parse_lenient(self.mode.as_deref()),
            format: OutputFormat::parse_lenient(self.format.as_deref()),
            max_edge: parse_max_edge(self.max_edge.as_ref(), default_max_edge)?,
        })
    }
}

fn parse_max_edge(value: Option<&Value>, default: u32) -> Result<u32, JobError> {
    let invalid = || JobError::InvalidInput("max_edge must be a positive integer".into());
    let raw = match value {
        None | Some(Value::Null) => return Ok(default),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(invalid)?,
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(default),
        Some(Value::String(s)) => s.trim().parse::<u64>().map_err(|_| invalid())?,
        Some(_) => return Err(invalid()),
    };
    if raw == 0 {
        return Ok(default);
    }
    u32::try_from(raw).map_err(|_| invalid())
}

/// The payload every job produces, success or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    Success {
        image_b64: String,
        format: OutputFormat,
        processing_ms: u64,
        mode: Mode,
    },
    Failure {
        error: String,
        processing_ms: u64,
    },
}

impl JobResult {
    pub fn processing_ms(&self) -> u64 {
        match self {
            JobResult::Success { processing_ms, .. } | JobResult::Failure { processing_ms, .. } => {
                *processing_ms
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mode_defaults_to_low_for_unknown_values() {
        for raw in ["", "extreme", "LOWEST", "0", "mid-high"] {
            assert_eq!(Mode::parse_lenient(Some(raw)), Mode::Low, "input {raw:?}");
        }
        assert_eq!(Mode::parse_lenient(None), Mode::Low);
    }

    #[test]
    fn mode_is_case_insensitive() {
        assert_eq!(Mode::parse_lenient(Some("MID")), Mode::Mid);
        assert_eq!(Mode::parse_lenient(Some(" High ")), Mode::High);
    }

    #[test]
    fn format_defaults_to_png() {
        assert_eq!(OutputFormat::parse_lenient(Some("gif")), OutputFormat::Png);
        assert_eq!(OutputFormat::parse_lenient(None), OutputFormat::Png);
        assert_eq!(OutputFormat::parse_lenient(Some("JPG")), OutputFormat::Jpg);
        assert_eq!(OutputFormat::parse_lenient(Some("jpeg")), OutputFormat::Jpg);
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(OutputFormat::from_extension("JPEG"), Some(OutputFormat::Jpg));
        assert_eq!(OutputFormat::from_extension("png"), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::from_extension("webp"), None);
    }

    #[test]
    fn non_string_fields_are_treated_as_absent() {
        let req = JobRequest::from_value(&json!({
            "image_b64": "abc",
            "mode": 5,
            "format": ["jpg"],
        }))
        .unwrap();
        assert_eq!(req.mode, None);
        assert_eq!(req.format, None);
        let params = req.params(2048).unwrap();
        assert_eq!(params.mode, Mode::Low);
        assert_eq!(params.format, OutputFormat::Png);
    }

    #[test]
    fn non_object_input_is_invalid() {
        let err = JobRequest::from_value(&json!("just a string")).unwrap_err();
        assert!(matches!(err, JobError::InvalidInput(_)));
    }

    #[test]
    fn source_requires_exactly_one_field() {
        let none = JobRequest::default();
        let err = none.source().unwrap_err();
        assert!(err.to_string().contains("Provide image_url or image_b64"));

        let both = JobRequest {
            image_url: Some("http://x/a.png".into()),
            image_b64: Some("AAAA".into()),
            ..Default::default()
        };
        assert!(matches!(both.source(), Err(JobError::InvalidInput(_))));

        let url = JobRequest {
            image_url: Some("http://x/a.png".into()),
            ..Default::default()
        };
        assert_eq!(
            url.source().unwrap(),
            ImageSource::Url("http://x/a.png".into())
        );
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let req = JobRequest::from_value(&json!({"image_url": "", "image_b64": "AAAA"})).unwrap();
        assert_eq!(req.source().unwrap(), ImageSource::Inline("AAAA".into()));
    }

    #[test]
    fn max_edge_parsing() {
        let edge = |v: Value| {
            JobRequest::from_value(&json!({ "max_edge": v }))
                .unwrap()
                .params(2048)
                .map(|p| p.max_edge)
        };
        assert_eq!(edge(json!(512)).unwrap(), 512);
        assert_eq!(edge(json!("1024")).unwrap(), 1024);
        assert_eq!(edge(json!(0)).unwrap(), 2048);
        assert_eq!(edge(Value::Null).unwrap(), 2048);
        assert!(edge(json!(-5)).is_err());
        assert!(edge(json!(1.5)).is_err());
        assert!(edge(json!("big")).is_err());
        assert!(edge(json!(u64::MAX)).is_err());
    }

    #[test]
    fn success_result_serializes_to_documented_shape() {
        let result = JobResult::Success {
            image_b64: "AAAA".into(),
            format: OutputFormat::Jpg,
            processing_ms: 12,
            mode: Mode::Mid,
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"image_b64": "AAAA", "format": "jpg", "processing_ms": 12, "mode": "mid"})
        );
    }

    #[test]
    fn failure_result_roundtrips() {
        let json = json!({"error": "boom", "processing_ms": 3});
        let result: JobResult = serde_json::from_value(json).unwrap();
        assert_eq!(
            result,
            JobResult::Failure {
                error: "boom".into(),
                processing_ms: 3
            }
        );
        assert!(!result.is_success());
        assert_eq!(result.processing_ms(), 3);
    }
}
