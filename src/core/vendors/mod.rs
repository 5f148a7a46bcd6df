pub mod pica;
pub mod tavus;

use serde::Deserialize;
use std::fmt;

/// Third-party services the tool talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Tavus,
    Pica,
    OpenAi,
    ElevenLabs,
}

impl Vendor {
    pub fn name(self) -> &'static str {
        match self {
            Vendor::Tavus => "Tavus",
            Vendor::Pica => "Pica",
            Vendor::OpenAi => "OpenAI",
            Vendor::ElevenLabs => "ElevenLabs",
        }
    }

    /// Environment variable (and vault key) holding the API key.
    pub fn key_env(self) -> &'static str {
        match self {
            Vendor::Tavus => "TAVUS_API_KEY",
            Vendor::Pica => "PICA_SECRET_KEY",
            Vendor::OpenAi => "OPENAI_API_KEY",
            Vendor::ElevenLabs => "ELEVENLABS_API_KEY",
        }
    }

    /// Largest upload the vendor accepts, in MiB.
    pub fn max_upload_mb(self) -> u64 {
        match self {
            Vendor::OpenAi => 25,
            Vendor::ElevenLabs => 100,
            Vendor::Tavus | Vendor::Pica => 50,
        }
    }

    pub fn all() -> [Vendor; 4] {
        [Vendor::Tavus, Vendor::Pica, Vendor::OpenAi, Vendor::ElevenLabs]
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    #[error("{0} API key not configured")]
    NotConfigured(Vendor),

    #[error("{vendor} request failed: {source}")]
    Transport {
        vendor: Vendor,
        #[source]
        source: reqwest::Error,
    },

    #[error("{vendor} API error ({status}): {message}")]
    Status {
        vendor: Vendor,
        status: u16,
        message: String,
    },

    #[error("{vendor} returned an unexpected payload: {message}")]
    Decode { vendor: Vendor, message: String },

    #[error("{0}")]
    Invalid(String),
}

impl VendorError {
    pub fn transport(vendor: Vendor) -> impl FnOnce(reqwest::Error) -> VendorError {
        move |source| VendorError::Transport { vendor, source }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            VendorError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Actionable message for the person at the keyboard. Rate limits,
    /// credential problems and payload rejections each get their own text.
    pub fn user_message(&self) -> String {
        match self {
            VendorError::NotConfigured(vendor) => format!(
                "{} API key not configured. Set {} or run `creatorflow vault set {}`.",
                vendor,
                vendor.key_env(),
                vendor.key_env()
            ),
            VendorError::Transport { vendor, .. } => format!(
                "Could not reach the {} API. Check your network connection and try again.",
                vendor
            ),
            VendorError::Status {
                vendor,
                status,
                message,
            } => status_message(*vendor, *status, message),
            VendorError::Decode { vendor, .. } => format!(
                "{} returned a response creatorflow does not understand. Please try again later.",
                vendor
            ),
            VendorError::Invalid(message) => message.clone(),
        }
    }
}

fn status_message(vendor: Vendor, status: u16, message: &str) -> String {
    match (vendor, status) {
        (Vendor::OpenAi, 429) => "OpenAI API quota exceeded. Please check your plan and billing details at https://platform.openai.com/account/billing".to_string(),
        (_, 429) => format!(
            "{} API rate limit exceeded. Please wait a moment and try again.",
            vendor
        ),
        (_, 401) | (_, 403) => format!(
            "{} API authentication failed. Please check your API key configuration ({}).",
            vendor,
            vendor.key_env()
        ),
        (Vendor::OpenAi | Vendor::ElevenLabs, 400) => {
            "Invalid audio format or request. Please try a different audio file.".to_string()
        }
        (_, 400) => format!("{} rejected the request: {}", vendor, message),
        (_, 413) => format!(
            "Upload too large for {}. Maximum size is {}MB.",
            vendor,
            vendor.max_upload_mb()
        ),
        (Vendor::OpenAi, _) => format!("OpenAI API error ({}): {}", status, message),
        (Vendor::ElevenLabs, _) => {
            "Failed to transcribe audio with ElevenLabs. Please try again.".to_string()
        }
        (_, _) => format!("{} API error ({}). Please try again later.", vendor, status),
    }
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

fn describe(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

/// Turn a non-2xx response into `VendorError::Status`, pulling the most
/// specific message the vendor put in the body.
pub async fn check_response(
    vendor: Vendor,
    response: reqwest::Response,
) -> Result<reqwest::Response, VendorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reason = status.canonical_reason().unwrap_or("").to_string();
    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
    let message = parsed
        .detail
        .as_ref()
        .map(describe)
        .or(parsed.message)
        .or_else(|| parsed.error.as_ref().map(describe))
        .unwrap_or(reason);

    Err(VendorError::Status {
        vendor,
        status: status.as_u16(),
        message,
    })
}

/// Decode a JSON body, reporting shape mismatches as `Decode` rather than
/// transport failures.
pub async fn decode_json<T: serde::de::DeserializeOwned>(
    vendor: Vendor,
    response: reqwest::Response,
) -> Result<T, VendorError> {
    let body = response
        .text()
        .await
        .map_err(VendorError::transport(vendor))?;
    serde_json::from_str(&body).map_err(|e| VendorError::Decode {
        vendor,
        message: e.to_string(),
    })
}

pub(crate) fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
