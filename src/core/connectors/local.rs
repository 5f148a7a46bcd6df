use anyhow::Result;
use tracing::warn;

use super::Connector;
use crate::core::store::LocalStore;

pub fn storage_key(user_id: &str) -> String {
    format!("pica_connectors_{}", user_id)
}

/// Ids the user disconnected while the connector service may still list
/// them.
pub fn disconnected_key(user_id: &str) -> String {
    format!("pica_disconnected_{}", user_id)
}

/// Per-user list of linked accounts kept on this machine. Used when the
/// connector service is unreachable or not configured.
#[derive(Clone)]
pub struct LocalConnectorStore {
    store: LocalStore,
}

impl LocalConnectorStore {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// A missing or unreadable list reads as empty.
    pub async fn load(&self, user_id: &str) -> Vec<Connector> {
        match self.store.get_json::<Vec<Connector>>(&storage_key(user_id)).await {
            Ok(list) => list.unwrap_or_default(),
            Err(e) => {
                warn!("Discarding unreadable local connector list: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn save(&self, user_id: &str, connectors: &[Connector]) -> Result<()> {
        self.store.put_json(&storage_key(user_id), &connectors).await
    }

    /// Replaces any record with the same id.
    pub async fn upsert(&self, user_id: &str, connector: Connector) -> Result<()> {
        let mut list = self.load(user_id).await;
        list.retain(|c| c.id != connector.id);
        list.push(connector);
        self.save(user_id, &list).await
    }

    pub async fn remove(&self, user_id: &str, connector_id: &str) -> Result<()> {
        let mut list = self.load(user_id).await;
        let before = list.len();
        list.retain(|c| c.id != connector_id);
        if list.len() != before {
            self.save(user_id, &list).await?;
        }
        Ok(())
    }

    pub async fn disconnected(&self, user_id: &str) -> Vec<String> {
        match self
            .store
            .get_json::<Vec<String>>(&disconnected_key(user_id))
            .await
        {
            Ok(ids) => ids.unwrap_or_default(),
            Err(e) => {
                warn!("Discarding unreadable disconnect list: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn set_disconnected(&self, user_id: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return self.store.remove(&disconnected_key(user_id)).await;
        }
        self.store.put_json(&disconnected_key(user_id), &ids).await
    }

    pub async fn mark_disconnected(&self, user_id: &str, connector_id: &str) -> Result<()> {
        let mut ids = self.disconnected(user_id).await;
        if !ids.iter().any(|id| id == connector_id) {
            ids.push(connector_id.to_string());
            self.set_disconnected(user_id, &ids).await?;
        }
        Ok(())
    }

    pub async fn clear_disconnected(&self, user_id: &str, connector_id: &str) -> Result<()> {
        let mut ids = self.disconnected(user_id).await;
        let before = ids.len();
        ids.retain(|id| id != connector_id);
        if ids.len() != before {
            self.set_disconnected(user_id, &ids).await?;
        }
        Ok(())
    }
}
