//! Loading raw image bytes from a request's image source.

use crate::error::JobError;
use crate::types::ImageSource;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::blocking::Client;
use std::time::Duration;

/// Fetches `image_url` sources and decodes `image_b64` ones.
pub struct SourceLoader {
    http: Client,
}

impl SourceLoader {
    /// Build a loader whose URL fetches give up after `fetch_timeout`.
    pub fn new(fetch_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self { http })
    }

    /// Return the raw (still encoded) image bytes for `source`.
    pub fn load(&self, source: &ImageSource) -> Result<Vec<u8>, JobError> {
        match source {
            ImageSource::Url(url) => self.fetch(url),
            ImageSource::Inline(text) => decode_inline(text),
        }
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, JobError> {
        tracing::debug!(url, "fetching input image");
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| JobError::Fetch(format!("{url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(JobError::Fetch(format!("{url}: HTTP {status}")));
        }
        let bytes = response
            .bytes()
            .map_err(|e| JobError::Fetch(format!("{url}: reading body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Decode base64 image text.
///
/// Accepts an optional `data:<mime>;base64,` prefix and ignores ASCII
/// whitespace (line-wrapped payloads are common).
pub fn decode_inline(text: &str) -> Result<Vec<u8>, JobError> {
    let payload = match text.trim_start().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| JobError::Decode("data URL has no payload".into()))?,
        None => text,
    };
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| JobError::Decode(format!("image_b64 is not valid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{StubResponse, StubServer};

    #[test]
    fn decode_plain_base64() {
        assert_eq!(decode_inline("WFla").unwrap(), b"XYZ");
    }

    #[test]
    fn decode_ignores_whitespace() {
        assert_eq!(decode_inline(" WF\nla \r\n").unwrap(), b"XYZ");
    }

    #[test]
    fn decode_strips_data_url_prefix() {
        assert_eq!(decode_inline("data:image/png;base64,WFla").unwrap(), b"XYZ");
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_inline("not base64 !!").unwrap_err();
        assert!(matches!(err, JobError::Decode(_)));
    }

    #[test]
    fn decode_rejects_data_url_without_payload() {
        assert!(matches!(
            decode_inline("data:image/png;base64"),
            Err(JobError::Decode(_))
        ));
    }

    #[test]
    fn fetch_returns_body_bytes() {
        let server = StubServer::start(|req| {
            assert_eq!(req.method, "GET");
            assert_eq!(req.path, "/cat.png");
            StubResponse::ok(b"pixels".to_vec())
        });
        let loader = SourceLoader::new(Duration::from_secs(5)).unwrap();
        let bytes = loader
            .load(&ImageSource::Url(server.url("/cat.png")))
            .unwrap();
        assert_eq!(bytes, b"pixels");
    }

    #[test]
    fn fetch_non_success_status_is_fetch_error() {
        let server = StubServer::start(|_| StubResponse::status(404, "missing"));
        let loader = SourceLoader::new(Duration::from_secs(5)).unwrap();
        let err = loader
            .load(&ImageSource::Url(server.url("/gone.png")))
            .unwrap_err();
        assert!(matches!(err, JobError::Fetch(ref msg) if msg.contains("404")));
    }

    #[test]
    fn fetch_unreachable_host_is_fetch_error() {
        let loader = SourceLoader::new(Duration::from_secs(2)).unwrap();
        let err = loader
            .load(&ImageSource::Url("http://127.0.0.1:1/x.png".into()))
            .unwrap_err();
        assert!(matches!(err, JobError::Fetch(_)));
    }
}
