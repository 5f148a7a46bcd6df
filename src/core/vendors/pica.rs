use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Vendor, VendorError, check_response, decode_json, trim_base};
use crate::core::connectors::Connector;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlRequest {
    pub connector: String,
    pub user_id: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrl {
    pub auth_url: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    Video,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub prompt: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRequest {
    pub content: String,
    pub platforms: Vec<String>,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResult {
    pub success: bool,
    #[serde(default)]
    pub post_id: String,
    pub platform: String,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SystemPromptResponse {
    system_prompt: String,
}

/// Social platforms the connector service can link.
#[derive(Debug, Clone, Copy)]
pub struct SupportedPlatform {
    pub id: &'static str,
    pub name: &'static str,
    pub features: &'static [&'static str],
}

pub const SUPPORTED_PLATFORMS: &[SupportedPlatform] = &[
    SupportedPlatform {
        id: "instagram",
        name: "Instagram",
        features: &["Posts", "Stories", "Reels"],
    },
    SupportedPlatform {
        id: "youtube",
        name: "YouTube",
        features: &["Videos", "Shorts", "Community Posts"],
    },
    SupportedPlatform {
        id: "twitter",
        name: "Twitter/X",
        features: &["Tweets", "Threads", "Spaces"],
    },
    SupportedPlatform {
        id: "linkedin",
        name: "LinkedIn",
        features: &["Posts", "Articles", "Stories"],
    },
    SupportedPlatform {
        id: "facebook",
        name: "Facebook",
        features: &["Posts", "Stories", "Reels"],
    },
    SupportedPlatform {
        id: "tiktok",
        name: "TikTok",
        features: &["Videos", "Live Streams"],
    },
];

pub fn find_platform(id: &str) -> Option<&'static SupportedPlatform> {
    SUPPORTED_PLATFORMS
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
}

/// Remote side of the connector registry and the posting endpoints.
#[async_trait]
pub trait ConnectorApi: Send + Sync {
    async fn auth_url(&self, request: &AuthUrlRequest) -> Result<AuthUrl, VendorError>;

    async fn list_connectors(&self, user_id: &str) -> Result<Vec<Connector>, VendorError>;

    async fn disconnect(&self, connector_id: &str) -> Result<(), VendorError>;

    async fn execute_agent(&self, request: &AgentRequest) -> Result<Vec<PostResult>, VendorError>;

    async fn post_content(&self, request: &PostRequest) -> Result<Vec<PostResult>, VendorError>;

    async fn system_prompt(&self) -> Result<String, VendorError>;
}

pub struct PicaClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl PicaClient {
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

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

#[async_trait]
impl ConnectorApi for PicaClient {
    async fn auth_url(&self, request: &AuthUrlRequest) -> Result<AuthUrl, VendorError> {
        debug!("POST /connectors/auth connector={}", request.connector);
        let res = self
            .client
            .post(self.url("/connectors/auth"))
            .header("Authorization", self.bearer())
            .json(request)
            .send()
            .await
            .map_err(VendorError::transport(Vendor::Pica))?;
        let res = check_response(Vendor::Pica, res).await?;
        decode_json(Vendor::Pica, res).await
    }

    async fn list_connectors(&self, user_id: &str) -> Result<Vec<Connector>, VendorError> {
        let res = self
            .client
            .get(self.url("/connectors"))
            .query(&[("userId", user_id)])
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(VendorError::transport(Vendor::Pica))?;
        let res = check_response(Vendor::Pica, res).await?;
        decode_json(Vendor::Pica, res).await
    }

    async fn disconnect(&self, connector_id: &str) -> Result<(), VendorError> {
        let res = self
            .client
            .delete(self.url(&format!(
                "/connectors/{}",
                urlencoding::encode(connector_id)
            )))
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(VendorError::transport(Vendor::Pica))?;
        check_response(Vendor::Pica, res).await?;
        Ok(())
    }

    async fn execute_agent(&self, request: &AgentRequest) -> Result<Vec<PostResult>, VendorError> {
        let res = self
            .client
            .post(self.url("/agent/execute"))
            .header("Authorization", self.bearer())
            .json(request)
            .send()
            .await
            .map_err(VendorError::transport(Vendor::Pica))?;
        let res = check_response(Vendor::Pica, res).await?;
        decode_json(Vendor::Pica, res).await
    }

    async fn post_content(&self, request: &PostRequest) -> Result<Vec<PostResult>, VendorError> {
        let res = self
            .client
            .post(self.url("/posts"))
            .header("Authorization", self.bearer())
            .json(request)
            .send()
            .await
            .map_err(VendorError::transport(Vendor::Pica))?;
        let res = check_response(Vendor::Pica, res).await?;
        decode_json(Vendor::Pica, res).await
    }

    async fn system_prompt(&self) -> Result<String, VendorError> {
        let res = self
            .client
            .get(self.url("/agent/system-prompt"))
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(VendorError::transport(Vendor::Pica))?;
        let res = check_response(Vendor::Pica, res).await?;
        let parsed: SystemPromptResponse = decode_json(Vendor::Pica, res).await?;
        Ok(parsed.system_prompt)
    }
}
