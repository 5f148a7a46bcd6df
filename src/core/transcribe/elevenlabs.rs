use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use super::{
    AudioClip, Engine, SpeechResponse, Speaker, Transcriber, Transcript, TranscriptionError,
    ensure_fits,
};
use crate::core::vendors::{Vendor, VendorError, check_response, decode_json, trim_base};

const STREAMING_LATENCY: &str = "3";

pub const MODELS: &[(&str, &str)] = &[
    ("whisper-1", "Fast and accurate speech recognition"),
    ("whisper-large", "Higher accuracy, slower processing"),
];

pub struct ElevenLabsTranscriber {
    base_url: String,
    api_key: String,
    model: String,
    language: Option<String>,
    client: Client,
}

impl ElevenLabsTranscriber {
    pub fn new(base_url: &str, api_key: String, model: &str, language: Option<String>) -> Self {
        Self {
            base_url: trim_base(base_url),
            api_key,
            model: model.to_string(),
            language,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Transcriber for ElevenLabsTranscriber {
    fn engine(&self) -> Engine {
        Engine::ElevenLabs
    }

    async fn transcribe(
        &self,
        clip: &AudioClip,
        speaker: Speaker,
    ) -> Result<Option<Transcript>, TranscriptionError> {
        ensure_fits(Engine::ElevenLabs, clip)?;
        let audio = Part::bytes(clip.bytes.to_vec())
            .file_name(clip.file_name.clone())
            .mime_str(&clip.mime)
            .map_err(|e| VendorError::Invalid(format!("Unsupported audio type: {}", e)))?;
        let mut form = Form::new()
            .part("audio", audio)
            .text("model", self.model.clone())
            .text("optimize_streaming_latency", STREAMING_LATENCY);
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        debug!(
            "Uploading {} ({} bytes) to ElevenLabs",
            clip.file_name,
            clip.len()
        );
        let res = self
            .client
            .post(format!("{}/speech-to-text", self.base_url))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(VendorError::transport(Vendor::ElevenLabs))?;
        let res = check_response(Vendor::ElevenLabs, res).await?;
        let body: SpeechResponse = decode_json(Vendor::ElevenLabs, res).await?;
        Ok(body.into_transcript(speaker, self.language.as_deref()))
    }

    async fn check_status(&self) -> Result<(), VendorError> {
        let res = self
            .client
            .get(format!("{}/user", self.base_url))
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(VendorError::transport(Vendor::ElevenLabs))?;
        check_response(Vendor::ElevenLabs, res).await?;
        Ok(())
    }
}
