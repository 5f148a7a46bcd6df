mod local;

pub use local::LocalConnectorStore;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::oauth::{AuthSuccess, HandshakeDriver, HandshakeOutcome};
use crate::core::session::Session;
use crate::core::vault::{SecretsVault, connector_token_key};
use crate::core::vendors::pica::{AuthUrlRequest, ConnectorApi, find_platform};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorStatus {
    #[default]
    Active,
    Error,
    Expired,
}

/// A social account linked through the connector service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub id: String,
    pub platform: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_connected: bool,
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ConnectorStatus,
}

impl Connector {
    pub fn from_handshake(success: &AuthSuccess) -> Self {
        Self {
            id: success.connector_id.clone(),
            platform: success.platform.to_ascii_lowercase(),
            username: success.username.clone(),
            is_connected: true,
            connected_at: Some(Utc::now()),
            status: ConnectorStatus::Active,
        }
    }

    fn assessed_status(&self) -> ConnectorStatus {
        if self.id.is_empty() || self.platform.is_empty() {
            ConnectorStatus::Error
        } else if self.is_connected {
            ConnectorStatus::Active
        } else {
            ConnectorStatus::Expired
        }
    }
}

/// Assigns each record its status, then keeps one record per platform:
/// connected beats disconnected, later `connected_at` beats earlier.
/// Surviving records keep the position of their platform's first record.
pub fn reconcile(accounts: Vec<Connector>) -> Vec<Connector> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, Connector> = HashMap::new();
    for mut account in accounts {
        account.status = account.assessed_status();
        let platform = account.platform.to_ascii_lowercase();
        match best.get(&platform) {
            None => {
                order.push(platform.clone());
                best.insert(platform, account);
            }
            Some(current) => {
                let rank = |c: &Connector| (c.is_connected, c.connected_at);
                if rank(&account) > rank(current) {
                    debug!(
                        "Replacing duplicate {} account {} with {}",
                        platform, current.id, account.id
                    );
                    best.insert(platform, account);
                }
            }
        }
    }
    order
        .into_iter()
        .filter_map(|platform| best.remove(&platform))
        .collect()
}

/// The signed-in user's linked accounts. The connector service is the
/// source of truth when reachable; the local store covers the rest.
pub struct ConnectorRegistry {
    session: Option<Session>,
    api: Option<Arc<dyn ConnectorApi>>,
    local: LocalConnectorStore,
    vault: Option<Arc<SecretsVault>>,
    accounts: Vec<Connector>,
    last_error: Option<String>,
}

impl ConnectorRegistry {
    pub fn new(
        session: Option<Session>,
        api: Option<Arc<dyn ConnectorApi>>,
        local: LocalConnectorStore,
        vault: Option<Arc<SecretsVault>>,
    ) -> Self {
        Self {
            session,
            api,
            local,
            vault,
            accounts: Vec::new(),
            last_error: None,
        }
    }

    pub fn accounts(&self) -> &[Connector] {
        &self.accounts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_connected(&self, platform: &str) -> bool {
        self.get_account(platform).is_some_and(|c| c.is_connected)
    }

    pub fn get_account(&self, platform: &str) -> Option<&Connector> {
        self.accounts
            .iter()
            .find(|c| c.platform.eq_ignore_ascii_case(platform))
    }

    pub async fn load(&mut self) -> &[Connector] {
        let Some(session) = self.session.clone() else {
            self.accounts.clear();
            return &self.accounts;
        };
        self.accounts = match self.api.clone() {
            Some(api) => match api.list_connectors(&session.user_id).await {
                Ok(list) => {
                    self.last_error = None;
                    self.without_disconnected(&session.user_id, api.as_ref(), list)
                        .await
                }
                Err(e) => {
                    warn!("Falling back to local connector list: {}", e);
                    self.last_error = Some("Failed to load connected accounts".to_string());
                    self.local.load(&session.user_id).await
                }
            },
            None => self.local.load(&session.user_id).await,
        };
        debug!("Loaded {} connected accounts", self.accounts.len());
        &self.accounts
    }

    /// Drops records the user disconnected while the remote revoke failed.
    /// The revoke is retried for each one; an id is forgotten once the
    /// service stops listing it.
    async fn without_disconnected(
        &self,
        user_id: &str,
        api: &dyn ConnectorApi,
        mut list: Vec<Connector>,
    ) -> Vec<Connector> {
        let disconnected = self.local.disconnected(user_id).await;
        if disconnected.is_empty() {
            return list;
        }
        let still_listed: Vec<String> = disconnected
            .iter()
            .filter(|id| list.iter().any(|c| &c.id == *id))
            .cloned()
            .collect();
        for id in &still_listed {
            if let Err(e) = api.disconnect(id).await {
                debug!("Retrying remote disconnect of {} failed: {}", id, e);
            }
        }
        if still_listed.len() != disconnected.len()
            && let Err(e) = self.local.set_disconnected(user_id, &still_listed).await
        {
            warn!("Could not update the disconnect list: {}", e);
        }
        list.retain(|c| !still_listed.contains(&c.id));
        list
    }

    /// Runs one link attempt for `platform`. `Ok(None)` means the user closed
    /// the consent window; nothing is recorded in that case.
    pub async fn connect(
        &mut self,
        platform: &str,
        driver: &mut dyn HandshakeDriver,
    ) -> Result<Option<Connector>> {
        let (Some(session), Some(api)) = (self.session.clone(), self.api.clone()) else {
            let message = "User not authenticated or Pica not configured";
            self.last_error = Some(message.to_string());
            return Err(anyhow!(message));
        };
        let platform = platform.trim().to_ascii_lowercase();
        if platform.is_empty() {
            return Err(anyhow!("Choose a platform to connect"));
        }
        if find_platform(&platform).is_none() {
            warn!("Connecting unlisted platform {}", platform);
        }

        let request = AuthUrlRequest {
            connector: platform.clone(),
            user_id: session.user_id.clone(),
            callback_url: driver.callback_url(),
        };
        let auth = match api.auth_url(&request).await {
            Ok(auth) => auth,
            Err(e) => {
                self.last_error = Some(e.user_message());
                return Err(anyhow!("Failed to connect to {}: {}", platform, e.user_message()));
            }
        };

        match driver.run(&auth.auth_url, auth.state.as_deref()).await? {
            HandshakeOutcome::Succeeded(success) => {
                if success.user_id != session.user_id {
                    warn!(
                        "Handshake reported user {} but {} is signed in; recording for the signed-in user",
                        success.user_id, session.user_id
                    );
                }
                let connector = self.complete_handshake(&success).await?;
                Ok(Some(connector))
            }
            HandshakeOutcome::Cancelled => {
                info!("Linking {} was cancelled", platform);
                Ok(None)
            }
            HandshakeOutcome::Errored(message) => {
                self.last_error = Some(message.clone());
                Err(anyhow!("Connection failed: {}", message))
            }
        }
    }

    /// Records a successful link locally, keeps its access token in the
    /// vault and reloads the account list.
    pub async fn complete_handshake(&mut self, success: &AuthSuccess) -> Result<Connector> {
        let session = self
            .session
            .clone()
            .ok_or_else(|| anyhow!("User not authenticated"))?;
        let connector = Connector::from_handshake(success);
        self.local
            .upsert(&session.user_id, connector.clone())
            .await?;
        self.local
            .clear_disconnected(&session.user_id, &connector.id)
            .await?;
        if let Some(vault) = &self.vault {
            vault
                .set_secret(
                    &connector_token_key(&session.user_id, &connector.id),
                    &success.access_token,
                )
                .await?;
        }
        info!("Linked {} account {}", connector.platform, connector.id);
        self.load().await;
        Ok(connector)
    }

    /// Best-effort remote disconnect followed by unconditional local
    /// removal. A remote failure lands in `last_error`, and the id is kept
    /// out of later loads until the service stops listing it.
    pub async fn disconnect(&mut self, connector_id: &str) -> Result<()> {
        let Some(session) = self.session.clone() else {
            return Ok(());
        };
        if let Some(api) = &self.api
            && let Err(e) = api.disconnect(connector_id).await
        {
            warn!("Remote disconnect of {} failed: {}", connector_id, e);
            self.last_error = Some(e.user_message());
            self.local
                .mark_disconnected(&session.user_id, connector_id)
                .await?;
        }
        self.local.remove(&session.user_id, connector_id).await?;
        if let Some(vault) = &self.vault {
            vault
                .remove_secret(&connector_token_key(&session.user_id, connector_id))
                .await?;
        }
        self.accounts.retain(|c| c.id != connector_id);
        info!("Disconnected account {}", connector_id);
        Ok(())
    }

    /// Reloads, assigns statuses and collapses duplicate platforms.
    pub async fn refresh(&mut self) -> &[Connector] {
        self.load().await;
        let accounts = std::mem::take(&mut self.accounts);
        self.accounts = reconcile(accounts);
        &self.accounts
    }
}

/// Refreshes the registry every `interval` until `token` is cancelled. The
/// first refresh happens one interval after the call.
pub fn spawn_auto_refresh(
    registry: Arc<Mutex<ConnectorRegistry>>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let mut registry = registry.lock().await;
                    let count = registry.refresh().await.len();
                    debug!("Auto-refresh found {} accounts", count);
                }
            }
        }
        debug!("Connector auto-refresh stopped");
    })
}
