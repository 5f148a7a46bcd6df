use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Vendor, VendorError, check_response, decode_json, trim_base};

// ── Video generation ──

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateVideoRequest {
    pub replica_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

/// Vendor view of a video. `status` is kept as the raw vendor string and
/// mapped onto `JobStatus` by the job layer.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct VideoResponse {
    pub video_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub hosted_url: Option<String>,
}

/// The slice of the video API the job layer depends on.
#[async_trait]
pub trait VideoApi: Send + Sync {
    async fn create_video(&self, request: &CreateVideoRequest)
    -> Result<VideoResponse, VendorError>;

    async fn get_video(&self, video_id: &str) -> Result<VideoResponse, VendorError>;
}

// ── Conversations ──

#[derive(Debug, Clone, Serialize, Default)]
pub struct CreateConversationRequest {
    pub persona_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_greeting: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversational_context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub conversation_url: String,
    pub status: ConversationStatus,
}

// ── Client ──

pub struct TavusClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl TavusClient {
    pub fn new(base_url: &str, api_key: String) -> Self {
        Self {
            base_url: trim_base(base_url),
            api_key,
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<Conversation, VendorError> {
        if request.persona_id.trim().is_empty() {
            return Err(VendorError::Invalid(
                "A persona id is required to start a conversation.".to_string(),
            ));
        }
        let res = self
            .client
            .post(self.url("/conversations"))
            .header("x-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(VendorError::transport(Vendor::Tavus))?;
        let res = check_response(Vendor::Tavus, res).await?;
        decode_json(Vendor::Tavus, res).await
    }

    pub async fn end_conversation(&self, conversation_id: &str) -> Result<(), VendorError> {
        let res = self
            .client
            .post(self.url(&format!(
                "/conversations/{}/end",
                urlencoding::encode(conversation_id)
            )))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(VendorError::transport(Vendor::Tavus))?;
        check_response(Vendor::Tavus, res).await?;
        Ok(())
    }
}

#[async_trait]
impl VideoApi for TavusClient {
    async fn create_video(
        &self,
        request: &CreateVideoRequest,
    ) -> Result<VideoResponse, VendorError> {
        debug!("POST /videos replica={}", request.replica_id);
        let res = self
            .client
            .post(self.url("/videos"))
            .header("x-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(VendorError::transport(Vendor::Tavus))?;
        let res = check_response(Vendor::Tavus, res).await?;
        decode_json(Vendor::Tavus, res).await
    }

    async fn get_video(&self, video_id: &str) -> Result<VideoResponse, VendorError> {
        let res = self
            .client
            .get(self.url(&format!("/videos/{}", urlencoding::encode(video_id))))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(VendorError::transport(Vendor::Tavus))?;
        let res = check_response(Vendor::Tavus, res).await?;
        decode_json(Vendor::Tavus, res).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://127.0.0.1:{}/v2", port)
    }

    #[test]
    fn create_request_omits_absent_source() {
        let req = CreateVideoRequest {
            replica_id: "r1".to_string(),
            script: Some("hello".to_string()),
            audio_url: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({"replica_id": "r1", "script": "hello"}));
    }

    #[tokio::test]
    async fn create_video_sends_key_and_body() {
        let app = Router::new().route(
            "/v2/videos",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers.get("x-api-key").unwrap(), "k-123");
                assert_eq!(body["replica_id"], "r1");
                Json(json!({"video_id": "v1", "status": "queued"}))
            }),
        );
        let base = serve(app).await;
        let client = TavusClient::new(&base, "k-123".to_string());
        let video = client
            .create_video(&CreateVideoRequest {
                replica_id: "r1".to_string(),
                script: Some("hello".to_string()),
                audio_url: None,
            })
            .await
            .unwrap();
        assert_eq!(video.video_id, "v1");
        assert_eq!(video.status.as_deref(), Some("queued"));
    }

    #[tokio::test]
    async fn get_video_reports_status_errors() {
        let app = Router::new().route(
            "/v2/videos/{id}",
            get(|Path(id): Path<String>| async move {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({"message": format!("slow down on {}", id)})),
                )
            }),
        );
        let base = serve(app).await;
        let client = TavusClient::new(&base, "k".to_string());
        let err = client.get_video("v9").await.unwrap_err();
        assert_eq!(err.status_code(), Some(429));
        assert!(err.to_string().contains("slow down on v9"));
    }

    #[tokio::test]
    async fn conversation_lifecycle() {
        let app = Router::new()
            .route(
                "/v2/conversations",
                post(|| async {
                    Json(json!({
                        "conversation_id": "c1",
                        "conversation_url": "https://tavus.daily.co/c1",
                        "status": "active"
                    }))
                }),
            )
            .route(
                "/v2/conversations/{id}/end",
                post(|| async { StatusCode::OK }),
            );
        let base = serve(app).await;
        let client = TavusClient::new(&base, "k".to_string());
        let convo = client
            .create_conversation(&CreateConversationRequest {
                persona_id: "p1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(convo.status, ConversationStatus::Active);
        client.end_conversation(&convo.conversation_id).await.unwrap();
    }

    #[tokio::test]
    async fn conversation_requires_persona() {
        let client = TavusClient::new("http://127.0.0.1:9", "k".to_string());
        let err = client
            .create_conversation(&CreateConversationRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VendorError::Invalid(_)));
    }
}
