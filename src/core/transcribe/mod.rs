//! Speech-to-text for recorded audio: OpenAI Whisper or ElevenLabs, behind
//! one [`Transcriber`] trait.

mod elevenlabs;
mod whisper;

pub use elevenlabs::{ElevenLabsTranscriber, MODELS as ELEVENLABS_MODELS};
pub use whisper::WhisperTranscriber;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::core::config::TranscriptionConfig;
use crate::core::vendors::{Vendor, VendorError};

/// Captured chunks smaller than this are treated as silence.
pub const MIN_CHUNK_BYTES: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Whisper,
    ElevenLabs,
}

impl Engine {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "whisper" | "openai" => Some(Engine::Whisper),
            "elevenlabs" | "eleven" => Some(Engine::ElevenLabs),
            _ => None,
        }
    }

    pub fn vendor(self) -> Vendor {
        match self {
            Engine::Whisper => Vendor::OpenAi,
            Engine::ElevenLabs => Vendor::ElevenLabs,
        }
    }

    pub fn max_file_size(self) -> u64 {
        self.vendor().max_upload_mb() * 1024 * 1024
    }

    /// Published list price in USD per audio minute.
    pub fn cost_per_minute(self) -> f64 {
        match self {
            Engine::Whisper => 0.006,
            Engine::ElevenLabs => 0.003,
        }
    }

    pub fn estimate_cost(self, minutes: f64) -> f64 {
        minutes.max(0.0) * self.cost_per_minute()
    }

    pub fn languages(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Engine::Whisper => WHISPER_LANGUAGES,
            Engine::ElevenLabs => ELEVENLABS_LANGUAGES,
        }
    }

    pub fn supports_language(self, code: &str) -> bool {
        self.languages()
            .iter()
            .any(|(c, _)| c.eq_ignore_ascii_case(code))
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Whisper => write!(f, "whisper"),
            Engine::ElevenLabs => write!(f, "elevenlabs"),
        }
    }
}

const WHISPER_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("zh", "Chinese"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("nl", "Dutch"),
    ("sv", "Swedish"),
    ("no", "Norwegian"),
    ("da", "Danish"),
    ("fi", "Finnish"),
    ("pl", "Polish"),
    ("tr", "Turkish"),
];

const ELEVENLABS_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("pl", "Polish"),
    ("tr", "Turkish"),
    ("ru", "Russian"),
    ("nl", "Dutch"),
    ("cs", "Czech"),
    ("ar", "Arabic"),
    ("zh", "Chinese (Mandarin)"),
    ("ja", "Japanese"),
    ("hu", "Hungarian"),
    ("ko", "Korean"),
    ("hi", "Hindi"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    #[default]
    User,
    Ai,
}

impl Speaker {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "user" | "me" => Some(Speaker::User),
            "ai" | "replica" => Some(Speaker::Ai),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub speaker: Speaker,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Body shared by both vendors' JSON responses.
#[derive(Debug, Deserialize)]
pub(crate) struct SpeechResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl SpeechResponse {
    /// `None` when the vendor heard nothing.
    pub(crate) fn into_transcript(
        self,
        speaker: Speaker,
        fallback_language: Option<&str>,
    ) -> Option<Transcript> {
        let text = self.text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Transcript {
            text: text.to_string(),
            speaker,
            timestamp: Utc::now(),
            confidence: self.confidence,
            language: self.language.or_else(|| fallback_language.map(str::to_string)),
            duration: self.duration,
        })
    }
}

/// Recorded audio ready for upload.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub file_name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl AudioClip {
    pub fn new(file_name: &str, bytes: impl Into<Bytes>) -> Self {
        let mime = mime_guess::from_path(file_name)
            .first_raw()
            .unwrap_or("audio/webm")
            .to_string();
        Self {
            file_name: file_name.to_string(),
            mime,
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, TranscriptionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TranscriptionError::Capture(CaptureError::from_io(&e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.webm".to_string());
        Ok(Self::new(&file_name, bytes))
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Why audio could not be captured, named after the recorder's error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    NotAllowed,
    NotFound,
    NotReadable,
    Other(String),
}

impl CaptureError {
    pub fn from_name(name: &str) -> Self {
        match name {
            "NotAllowedError" => CaptureError::NotAllowed,
            "NotFoundError" => CaptureError::NotFound,
            "NotReadableError" => CaptureError::NotReadable,
            other => CaptureError::Other(other.to_string()),
        }
    }

    pub fn from_io(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => CaptureError::NotAllowed,
            io::ErrorKind::NotFound => CaptureError::NotFound,
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof | io::ErrorKind::IsADirectory => {
                CaptureError::NotReadable
            }
            _ => CaptureError::Other(error.to_string()),
        }
    }

    pub fn guidance(&self) -> String {
        match self {
            CaptureError::NotAllowed => {
                "Access to the audio source was denied. Please allow access and try again.".to_string()
            }
            CaptureError::NotFound => {
                "No audio source found. Please check the device or file path.".to_string()
            }
            CaptureError::NotReadable => {
                "The audio source is in use or unreadable. Close other applications using it and try again.".to_string()
            }
            CaptureError::Other(detail) => format!("Failed to capture audio: {}", detail),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error(transparent)]
    Vendor(#[from] VendorError),

    #[error("File size exceeds {limit_mb}MB limit for {engine}")]
    TooLarge { engine: Engine, limit_mb: u64 },

    #[error("{}", .0.guidance())]
    Capture(CaptureError),
}

impl TranscriptionError {
    pub fn user_message(&self) -> String {
        match self {
            TranscriptionError::Vendor(e) => e.user_message(),
            TranscriptionError::TooLarge { limit_mb, .. } => {
                format!("Audio file too large. Maximum size is {}MB.", limit_mb)
            }
            TranscriptionError::Capture(e) => e.guidance(),
        }
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    fn engine(&self) -> Engine;

    fn max_file_size(&self) -> u64 {
        self.engine().max_file_size()
    }

    /// Uploads one clip. `Ok(None)` when the vendor returns no speech.
    async fn transcribe(
        &self,
        clip: &AudioClip,
        speaker: Speaker,
    ) -> Result<Option<Transcript>, TranscriptionError>;

    /// Cheap authenticated call proving the key works.
    async fn check_status(&self) -> Result<(), VendorError>;
}

pub(crate) fn ensure_fits(engine: Engine, clip: &AudioClip) -> Result<(), TranscriptionError> {
    if clip.len() > engine.max_file_size() {
        return Err(TranscriptionError::TooLarge {
            engine,
            limit_mb: engine.vendor().max_upload_mb(),
        });
    }
    Ok(())
}

/// Transcribes one captured chunk, skipping chunks too small to hold speech.
pub async fn transcribe_chunk(
    transcriber: &dyn Transcriber,
    clip: &AudioClip,
    speaker: Speaker,
) -> Result<Option<Transcript>, TranscriptionError> {
    if clip.len() < MIN_CHUNK_BYTES {
        debug!("Skipping {} byte chunk as silence", clip.len());
        return Ok(None);
    }
    transcriber.transcribe(clip, speaker).await
}

pub fn build(
    engine: Engine,
    api_key: String,
    config: &TranscriptionConfig,
) -> Box<dyn Transcriber> {
    let language = Some(config.language.clone()).filter(|l| !l.trim().is_empty());
    match engine {
        Engine::Whisper => Box::new(WhisperTranscriber::new(
            &config.whisper_base_url,
            api_key,
            language,
            config.prompt.clone(),
        )),
        Engine::ElevenLabs => Box::new(ElevenLabsTranscriber::new(
            &config.elevenlabs_base_url,
            api_key,
            &config.elevenlabs_model,
            language,
        )),
    }
}
