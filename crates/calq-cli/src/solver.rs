//! Client for the remote problem-solving service.
//!
//! One blocking POST per request, never retried. Any failure becomes
//! [`CalcError::Service`] and is shown to the user once.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use calq_core::{CalcError, CalcResult};

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
/// Transcribing an image needs less room than solving a prompt.
pub const IMAGE_ONLY_MAX_TOKENS: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
}

impl ImageKind {
    /// Sniff the format from the file's magic bytes.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }
}

/// Validate an uploaded image and encode it for `imageBase64`.
pub fn encode_image(bytes: &[u8]) -> CalcResult<String> {
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(CalcError::Service(format!(
            "image is {} bytes, the limit is {MAX_IMAGE_BYTES}",
            bytes.len()
        )));
    }
    let kind = ImageKind::detect(bytes).ok_or_else(|| {
        CalcError::Service("unsupported image format (expected JPEG, PNG or WebP)".into())
    })?;
    debug!(mime = kind.mime(), bytes = bytes.len(), "image accepted");
    Ok(STANDARD.encode(bytes))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl SolveRequest {
    /// Build a request. At least one of `prompt` and `image_base64` must be
    /// present; `max_tokens` defaults by request kind.
    pub fn new(
        prompt: Option<String>,
        image_base64: Option<String>,
        max_tokens: Option<u32>,
    ) -> CalcResult<Self> {
        let prompt = prompt.filter(|p| !p.trim().is_empty());
        if prompt.is_none() && image_base64.is_none() {
            return Err(CalcError::Service("a prompt or an image is required".into()));
        }
        let default = if prompt.is_none() {
            IMAGE_ONLY_MAX_TOKENS
        } else {
            DEFAULT_MAX_TOKENS
        };
        Ok(Self {
            prompt: prompt.unwrap_or_default(),
            image_base64,
            max_tokens: Some(max_tokens.unwrap_or(default)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SolveResponse {
    #[serde(alias = "result")]
    pub text: String,
    #[serde(default)]
    pub usage: Option<Usage>,
}

pub struct SolverClient {
    endpoint: String,
    timeout: Duration,
}

impl SolverClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn solve(&self, request: &SolveRequest) -> CalcResult<SolveResponse> {
        debug!(endpoint = %self.endpoint, image = request.image_base64.is_some(), "solve request");
        let response = ureq::post(&self.endpoint)
            .set("Content-Type", "application/json")
            .timeout(self.timeout)
            .send_json(request);

        match response {
            Ok(resp) => resp
                .into_json::<SolveResponse>()
                .map_err(|e| CalcError::Service(format!("invalid response: {e}"))),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                let detail = serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|j| j["error"].as_str().map(str::to_string))
                    .unwrap_or(body);
                Err(CalcError::Service(format!("HTTP {code}: {detail}")))
            }
            Err(e) => Err(CalcError::Service(format!("request failed: {e}"))),
        }
    }
}
