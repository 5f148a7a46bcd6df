use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use super::{
    AudioClip, Engine, SpeechResponse, Speaker, Transcriber, Transcript, TranscriptionError,
    ensure_fits,
};
use crate::core::vendors::{Vendor, VendorError, check_response, decode_json, trim_base};

const MODEL: &str = "whisper-1";
const TEMPERATURE: &str = "0.2";

pub struct WhisperTranscriber {
    base_url: String,
    api_key: String,
    language: Option<String>,
    prompt: Option<String>,
    client: Client,
}

impl WhisperTranscriber {
    pub fn new(
        base_url: &str,
        api_key: String,
        language: Option<String>,
        prompt: Option<String>,
    ) -> Self {
        Self {
            base_url: trim_base(base_url),
            api_key,
            language,
            prompt,
            client: Client::new(),
        }
    }

    fn form(&self, clip: &AudioClip) -> Result<Form, VendorError> {
        let file = Part::bytes(clip.bytes.to_vec())
            .file_name(clip.file_name.clone())
            .mime_str(&clip.mime)
            .map_err(|e| VendorError::Invalid(format!("Unsupported audio type: {}", e)))?;
        let mut form = Form::new()
            .part("file", file)
            .text("model", MODEL)
            .text("response_format", "verbose_json")
            .text("temperature", TEMPERATURE);
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }
        if let Some(prompt) = &self.prompt {
            form = form.text("prompt", prompt.clone());
        }
        Ok(form)
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn engine(&self) -> Engine {
        Engine::Whisper
    }

    async fn transcribe(
        &self,
        clip: &AudioClip,
        speaker: Speaker,
    ) -> Result<Option<Transcript>, TranscriptionError> {
        ensure_fits(Engine::Whisper, clip)?;
        debug!("Uploading {} ({} bytes) to Whisper", clip.file_name, clip.len());
        let res = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(self.form(clip)?)
            .send()
            .await
            .map_err(VendorError::transport(Vendor::OpenAi))?;
        let res = check_response(Vendor::OpenAi, res).await?;
        let body: SpeechResponse = decode_json(Vendor::OpenAi, res).await?;
        Ok(body.into_transcript(speaker, None))
    }

    async fn check_status(&self) -> Result<(), VendorError> {
        let res = self
            .client
            .get(format!("{}/models/{}", self.base_url, MODEL))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(VendorError::transport(Vendor::OpenAi))?;
        check_response(Vendor::OpenAi, res).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://127.0.0.1:{}/v1", port)
    }

    fn clip() -> AudioClip {
        AudioClip::new("take.webm", vec![7u8; 2048])
    }

    #[tokio::test]
    async fn uploads_multipart_with_whisper_fields() {
        let app = Router::new().route(
            "/v1/audio/transcriptions",
            post(|headers: HeaderMap, body: Bytes| async move {
                assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-test");
                let body = String::from_utf8_lossy(&body).to_string();
                assert!(body.contains("name=\"file\"; filename=\"take.webm\""));
                assert!(body.contains("whisper-1"));
                assert!(body.contains("verbose_json"));
                assert!(body.contains("0.2"));
                assert!(body.contains("name=\"language\""));
                assert!(body.contains("brand names"));
                Json(json!({"text": " Hi there ", "language": "english", "duration": 2.5}))
            }),
        );
        let t = WhisperTranscriber::new(
            &serve(app).await,
            "sk-test".to_string(),
            Some("en".to_string()),
            Some("brand names".to_string()),
        );
        let out = t.transcribe(&clip(), Speaker::User).await.unwrap().unwrap();
        assert_eq!(out.text, "Hi there");
        assert_eq!(out.language.as_deref(), Some("english"));
        assert_eq!(out.duration, Some(2.5));
    }

    #[tokio::test]
    async fn silence_yields_none() {
        let app = Router::new().route(
            "/v1/audio/transcriptions",
            post(|| async { Json(json!({"text": ""})) }),
        );
        let t = WhisperTranscriber::new(&serve(app).await, "k".to_string(), None, None);
        assert!(t.transcribe(&clip(), Speaker::Ai).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn quota_error_points_at_billing() {
        let app = Router::new().route(
            "/v1/audio/transcriptions",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({"error": {"message": "quota"}})),
                )
            }),
        );
        let t = WhisperTranscriber::new(&serve(app).await, "k".to_string(), None, None);
        let err = t.transcribe(&clip(), Speaker::User).await.unwrap_err();
        assert!(err.user_message().contains("billing"));
    }

    #[tokio::test]
    async fn status_check_hits_model_endpoint() {
        let app = Router::new().route(
            "/v1/models/whisper-1",
            get(|| async { Json(json!({"id": "whisper-1"})) }),
        );
        let t = WhisperTranscriber::new(&serve(app).await, "k".to_string(), None, None);
        t.check_status().await.unwrap();
    }
}
