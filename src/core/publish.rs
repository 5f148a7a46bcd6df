use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::session::Session;
use crate::core::vendors::pica::{
    AgentRequest, ConnectorApi, ContentType, PostRequest, PostResult, find_platform,
};

/// A single post destined for one or more linked platforms.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub content: String,
    pub platforms: Vec<String>,
    pub media_url: Option<String>,
    pub schedule_time: Option<DateTime<Utc>>,
}

/// Publishing through the connector service on behalf of the signed-in user.
pub struct Publisher {
    session: Session,
    api: Arc<dyn ConnectorApi>,
}

impl Publisher {
    pub fn new(session: Session, api: Arc<dyn ConnectorApi>) -> Self {
        Self { session, api }
    }

    pub async fn post(&self, draft: Draft) -> Result<Vec<PostResult>> {
        let content = draft.content.trim();
        if content.is_empty() {
            return Err(anyhow!("Post content cannot be empty"));
        }
        let platforms: Vec<String> = draft
            .platforms
            .iter()
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if platforms.is_empty() {
            return Err(anyhow!("Choose at least one platform to post to"));
        }
        for platform in &platforms {
            if find_platform(platform).is_none() {
                warn!("Posting to unlisted platform {}", platform);
            }
        }
        if let Some(at) = draft.schedule_time
            && at <= Utc::now()
        {
            return Err(anyhow!("Schedule time {} is in the past", at.to_rfc3339()));
        }

        let request = PostRequest {
            content: content.to_string(),
            platforms,
            user_id: self.session.user_id.clone(),
            media_url: draft.media_url.filter(|u| !u.trim().is_empty()),
            schedule_time: draft.schedule_time,
        };
        let results = self
            .api
            .post_content(&request)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;
        log_results(&results);
        Ok(results)
    }

    /// Lets the connector service's agent decide what to post where.
    pub async fn post_with_agent(
        &self,
        prompt: &str,
        media_url: Option<String>,
        content_type: Option<ContentType>,
    ) -> Result<Vec<PostResult>> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(anyhow!("Describe what the agent should post"));
        }
        let request = AgentRequest {
            prompt: prompt.to_string(),
            user_id: self.session.user_id.clone(),
            media_url,
            content_type,
        };
        let results = self
            .api
            .execute_agent(&request)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;
        log_results(&results);
        Ok(results)
    }

    pub async fn system_prompt(&self) -> Result<String> {
        self.api
            .system_prompt()
            .await
            .map_err(|e| anyhow!(e.user_message()))
    }
}

fn log_results(results: &[PostResult]) {
    for result in results {
        if result.success {
            info!("Posted to {} ({})", result.platform, result.post_id);
        } else {
            warn!(
                "Posting to {} failed: {}",
                result.platform,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}
