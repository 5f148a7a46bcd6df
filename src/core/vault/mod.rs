use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{Result, anyhow};
use base64::Engine;
use hmac::Mac;
use rusqlite::{Connection, OptionalExtension};
use sha2::Sha256;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::vendors::Vendor;

type HmacSha256 = hmac::Hmac<Sha256>;

const NONCE_LEN: usize = 12;
const KEY_LABEL: &[u8] = b"creatorflow-vault-v1";

/// Vault key under which a vendor's API key is kept when it is not in the
/// environment.
pub fn vendor_key(vendor: Vendor) -> String {
    vendor.key_env().to_ascii_lowercase()
}

/// Vault key for the access token handed back by a completed account link.
pub fn connector_token_key(user_id: &str, connector_id: &str) -> String {
    format!("pica_token_{}_{}", user_id, connector_id)
}

/// Machine-bound AES-256-GCM sealing. The key is
/// HMAC-SHA256(hostname + username) under a fixed label, so sealed values
/// only open on the machine and account that wrote them.
struct Sealer {
    cipher: Aes256Gcm,
}

impl Sealer {
    fn for_this_machine() -> Result<Self> {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown-host".to_string());
        Self::from_identity(&format!("{}{}", hostname, whoami::username()))
    }

    fn from_identity(identity: &str) -> Result<Self> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(KEY_LABEL)
            .map_err(|e| anyhow!("Vault key derivation failed: {}", e))?;
        mac.update(identity.as_bytes());
        let key = mac.finalize().into_bytes();
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| anyhow!("Vault cipher setup failed: {}", e))?;
        Ok(Self { cipher })
    }

    /// base64(nonce || ciphertext)
    fn seal(&self, plaintext: &str) -> Result<String> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
    }

    fn open(&self, encoded: &str) -> Result<String> {
        let combined = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| anyhow!("Base64 decode failed: {}", e))?;
        if combined.len() <= NONCE_LEN {
            return Err(anyhow!("Sealed value too short"));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| anyhow!("Sealed value was written on another machine or is corrupt"))?;
        String::from_utf8(plaintext).map_err(|e| anyhow!("UTF-8 decode failed: {}", e))
    }
}

/// Encrypted key/value table for vendor API keys and connector tokens.
pub struct SecretsVault {
    db: Arc<Mutex<Connection>>,
    sealer: Sealer,
}

impl SecretsVault {
    pub fn new(db: Arc<Mutex<Connection>>) -> Result<Self> {
        Ok(Self {
            db,
            sealer: Sealer::for_this_machine()?,
        })
    }

    pub async fn initialize(&self) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "CREATE TABLE IF NOT EXISTS secrets_vault (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub async fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        let sealed = self.sealer.seal(value)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO secrets_vault (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            (key, &sealed),
        )?;
        Ok(())
    }

    pub async fn get_secret(&self, key: &str) -> Result<Option<String>> {
        let stored: Option<String> = {
            let db = self.db.lock().await;
            db.query_row(
                "SELECT value FROM secrets_vault WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?
        };
        stored.map(|sealed| self.sealer.open(&sealed)).transpose()
    }

    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT key FROM secrets_vault ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    pub async fn remove_secret(&self, key: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.execute("DELETE FROM secrets_vault WHERE key = ?1", [key])?;
        Ok(())
    }
}
