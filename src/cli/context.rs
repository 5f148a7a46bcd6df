use anyhow::{Result, anyhow};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::core::config::AppConfig;
use crate::core::connectors::{ConnectorRegistry, LocalConnectorStore};
use crate::core::session::Session;
use crate::core::store::LocalStore;
use crate::core::transcribe::{self, Engine, Transcriber};
use crate::core::vault::{SecretsVault, vendor_key};
use crate::core::vendors::pica::{ConnectorApi, PicaClient};
use crate::core::vendors::tavus::TavusClient;
use crate::core::vendors::{Vendor, VendorError};
use crate::platform::{NativePlatform, Platform};

/// Everything a command needs, built once per invocation and passed down.
pub struct AppContext {
    pub data_dir: PathBuf,
    pub config: AppConfig,
    pub store: LocalStore,
    pub vault: Arc<SecretsVault>,
    pub session: Option<Session>,
}

impl AppContext {
    pub async fn load() -> Result<Self> {
        Self::load_from(NativePlatform::data_dir()).await
    }

    pub async fn load_from(data_dir: PathBuf) -> Result<Self> {
        let config = AppConfig::load(&data_dir).await?;
        let store = LocalStore::open(&data_dir).await?;
        let vault = SecretsVault::new(store.get_db())?;
        vault.initialize().await?;
        let session = Session::resolve(&config.session);
        debug!(
            "Context ready (data dir {}, signed in: {})",
            data_dir.display(),
            session.is_some()
        );
        Ok(Self {
            data_dir,
            config,
            store,
            vault: Arc::new(vault),
            session,
        })
    }

    /// Environment first, then the vault. Blank values count as missing.
    pub async fn api_key(&self, vendor: Vendor) -> Result<Option<String>> {
        if let Ok(value) = std::env::var(vendor.key_env())
            && !value.trim().is_empty()
        {
            return Ok(Some(value.trim().to_string()));
        }
        Ok(self
            .vault
            .get_secret(&vendor_key(vendor))
            .await?
            .filter(|v| !v.trim().is_empty()))
    }

    pub async fn require_key(&self, vendor: Vendor) -> Result<String> {
        self.api_key(vendor)
            .await?
            .ok_or_else(|| anyhow!(VendorError::NotConfigured(vendor).user_message()))
    }

    pub fn require_session(&self) -> Result<Session> {
        self.session.clone().ok_or_else(|| {
            anyhow!(
                "Not signed in. Set [session] user_id in {} or CREATORFLOW_USER_ID.",
                self.data_dir.join(crate::core::config::CONFIG_FILE).display()
            )
        })
    }

    pub async fn tavus(&self) -> Result<TavusClient> {
        let key = self.require_key(Vendor::Tavus).await?;
        Ok(TavusClient::new(&self.config.tavus.base_url, key))
    }

    /// `None` when no connector key is configured; callers fall back to the
    /// local account list.
    pub async fn pica(&self) -> Result<Option<Arc<dyn ConnectorApi>>> {
        Ok(self.api_key(Vendor::Pica).await?.map(|key| {
            Arc::new(PicaClient::new(&self.config.pica.base_url, key)) as Arc<dyn ConnectorApi>
        }))
    }

    pub async fn registry(&self) -> Result<ConnectorRegistry> {
        Ok(ConnectorRegistry::new(
            self.session.clone(),
            self.pica().await?,
            LocalConnectorStore::new(self.store.clone()),
            Some(self.vault.clone()),
        ))
    }

    pub fn engine(&self, requested: Option<&str>) -> Result<Engine> {
        let name = requested.unwrap_or(&self.config.transcription.engine);
        Engine::parse(name).ok_or_else(|| {
            anyhow!(
                "Unknown transcription engine '{}'. Use whisper or elevenlabs.",
                name
            )
        })
    }

    pub async fn transcriber(&self, engine: Engine) -> Result<Box<dyn Transcriber>> {
        let key = self.require_key(engine.vendor()).await?;
        Ok(transcribe::build(engine, key, &self.config.transcription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vault_supplies_missing_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = AppContext::load_from(tmp.path().to_path_buf()).await.unwrap();
        if std::env::var(Vendor::ElevenLabs.key_env()).is_ok() {
            return;
        }
        assert_eq!(ctx.api_key(Vendor::ElevenLabs).await.unwrap(), None);
        assert!(
            ctx.require_key(Vendor::ElevenLabs)
                .await
                .unwrap_err()
                .to_string()
                .contains("ELEVENLABS_API_KEY")
        );
        ctx.vault
            .set_secret(&vendor_key(Vendor::ElevenLabs), "xi-123")
            .await
            .unwrap();
        assert_eq!(
            ctx.api_key(Vendor::ElevenLabs).await.unwrap().as_deref(),
            Some("xi-123")
        );
    }

    #[tokio::test]
    async fn engine_defaults_to_config() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = AppContext::load_from(tmp.path().to_path_buf()).await.unwrap();
        assert_eq!(ctx.engine(None).unwrap(), Engine::Whisper);
        assert_eq!(ctx.engine(Some("elevenlabs")).unwrap(), Engine::ElevenLabs);
        assert!(ctx.engine(Some("nope")).is_err());
    }
}
