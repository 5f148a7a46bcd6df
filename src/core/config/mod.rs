use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::core::jobs::{Backoff, RetryPolicy};

pub const CONFIG_FILE: &str = "config.toml";

/// Top-level `config.toml`. Every section is optional; a missing file
/// yields the defaults the product ships with.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub tavus: TavusConfig,

    #[serde(default)]
    pub pica: PicaConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub connectors: ConnectorsConfig,

    #[serde(default)]
    pub transcription: TranscriptionConfig,
}

/// Identity handed over by the authentication backend.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TavusConfig {
    #[serde(default = "default_tavus_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub default_replica_id: Option<String>,
    #[serde(default)]
    pub default_persona_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PicaConfig {
    #[serde(default = "default_pica_base_url")]
    pub base_url: String,
    #[serde(default = "default_callback_host")]
    pub callback_host: String,
    /// 0 binds an ephemeral port.
    #[serde(default)]
    pub callback_port: u16,
    #[serde(default = "default_closed_check_ms")]
    pub closed_check_ms: u64,
    #[serde(default = "default_abandon_after_secs")]
    pub abandon_after_secs: u64,
    #[serde(default = "default_true")]
    pub open_browser: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Budget for jobs created from an audio source.
    #[serde(default = "default_audio_max_attempts")]
    pub audio_max_attempts: u32,
    #[serde(default = "default_backoff")]
    pub backoff: String,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorsConfig {
    #[serde(default)]
    pub auto_refresh: bool,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default = "default_whisper_base_url")]
    pub whisper_base_url: String,
    #[serde(default = "default_elevenlabs_base_url")]
    pub elevenlabs_base_url: String,
    #[serde(default = "default_elevenlabs_model")]
    pub elevenlabs_model: String,
}

fn default_tavus_base_url() -> String {
    "https://tavusapi.com/v2".to_string()
}
fn default_pica_base_url() -> String {
    "https://api.picahq.com/v1".to_string()
}
fn default_callback_host() -> String {
    "127.0.0.1".to_string()
}
fn default_closed_check_ms() -> u64 {
    1000
}
fn default_abandon_after_secs() -> u64 {
    300
}
fn default_true() -> bool {
    true
}
fn default_interval_ms() -> u64 {
    10_000
}
fn default_max_attempts() -> u32 {
    60
}
fn default_audio_max_attempts() -> u32 {
    30
}
fn default_backoff() -> String {
    "fixed".to_string()
}
fn default_backoff_factor() -> f64 {
    1.5
}
fn default_max_interval_ms() -> u64 {
    60_000
}
fn default_refresh_interval_secs() -> u64 {
    30
}
fn default_engine() -> String {
    "whisper".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_whisper_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_elevenlabs_base_url() -> String {
    "https://api.elevenlabs.io/v1".to_string()
}
fn default_elevenlabs_model() -> String {
    "whisper-1".to_string()
}

impl Default for TavusConfig {
    fn default() -> Self {
        Self {
            base_url: default_tavus_base_url(),
            default_replica_id: None,
            default_persona_id: None,
        }
    }
}

impl Default for PicaConfig {
    fn default() -> Self {
        Self {
            base_url: default_pica_base_url(),
            callback_host: default_callback_host(),
            callback_port: 0,
            closed_check_ms: default_closed_check_ms(),
            abandon_after_secs: default_abandon_after_secs(),
            open_browser: true,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
            audio_max_attempts: default_audio_max_attempts(),
            backoff: default_backoff(),
            backoff_factor: default_backoff_factor(),
            max_interval_ms: default_max_interval_ms(),
        }
    }
}

impl Default for ConnectorsConfig {
    fn default() -> Self {
        Self {
            auto_refresh: false,
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            language: default_language(),
            prompt: None,
            whisper_base_url: default_whisper_base_url(),
            elevenlabs_base_url: default_elevenlabs_base_url(),
            elevenlabs_model: default_elevenlabs_model(),
        }
    }
}

impl AppConfig {
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let config_path = data_dir.as_ref().join(CONFIG_FILE);
        if !config_path.exists() {
            info!("No config.toml found, using defaults.");
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid {}", config_path.display()))?;

        info!(
            "Loaded config: poll_interval={}ms, max_attempts={}, backoff={}, engine={}",
            config.polling.interval_ms,
            config.polling.max_attempts,
            config.polling.backoff,
            config.transcription.engine
        );
        Ok(config)
    }
}

/// Upper bound for any configured poll delay.
pub const MAX_POLL_INTERVAL_MS: u64 = 60 * 60 * 1000;

impl PollingConfig {
    fn backoff(&self) -> Backoff {
        match self.backoff.as_str() {
            "exponential" => Backoff::Exponential {
                factor: self.backoff_factor.max(1.0),
                max_interval: Duration::from_millis(self.max_interval_ms.min(MAX_POLL_INTERVAL_MS)),
            },
            _ => Backoff::Fixed,
        }
    }

    /// Policy for script-driven jobs.
    pub fn script_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(self.interval_ms.min(MAX_POLL_INTERVAL_MS)),
            max_attempts: self.max_attempts.max(1),
            backoff: self.backoff(),
        }
    }

    /// Policy for jobs rendered from an uploaded audio source.
    pub fn audio_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.audio_max_attempts.max(1),
            ..self.script_policy()
        }
    }
}

impl PicaConfig {
    pub fn closed_check_interval(&self) -> Duration {
        Duration::from_millis(self.closed_check_ms.max(10))
    }

    pub fn abandon_after(&self) -> Duration {
        Duration::from_secs(self.abandon_after_secs)
    }
}

impl ConnectorsConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_product_behavior() {
        let config = AppConfig::default();
        assert_eq!(config.tavus.base_url, "https://tavusapi.com/v2");
        assert_eq!(config.pica.base_url, "https://api.picahq.com/v1");
        assert_eq!(config.polling.interval_ms, 10_000);
        assert_eq!(config.polling.max_attempts, 60);
        assert_eq!(config.polling.audio_max_attempts, 30);
        assert_eq!(config.connectors.refresh_interval_secs, 30);
        assert_eq!(config.pica.closed_check_ms, 1000);
        assert!(config.session.user_id.is_none());
    }

    #[test]
    fn audio_policy_keeps_interval_but_shrinks_budget() {
        let polling = PollingConfig::default();
        let script = polling.script_policy();
        let audio = polling.audio_policy();
        assert_eq!(script.interval, audio.interval);
        assert_eq!(script.max_attempts, 60);
        assert_eq!(audio.max_attempts, 30);
        assert_eq!(audio.backoff, Backoff::Fixed);
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let content = r#"
[session]
user_id = "user-42"

[polling]
interval_ms = 250
backoff = "exponential"
backoff_factor = 2.0
max_interval_ms = 1000
"#;
        let config: AppConfig = toml::from_str(content).unwrap();
        assert_eq!(config.session.user_id.as_deref(), Some("user-42"));
        assert_eq!(config.polling.max_attempts, 60);
        let policy = config.polling.script_policy();
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(
            policy.backoff,
            Backoff::Exponential {
                factor: 2.0,
                max_interval: Duration::from_millis(1000)
            }
        );
        assert_eq!(config.transcription.engine, "whisper");
    }

    #[test]
    fn zero_attempt_budget_is_clamped() {
        let polling = PollingConfig {
            max_attempts: 0,
            audio_max_attempts: 0,
            ..PollingConfig::default()
        };
        assert_eq!(polling.script_policy().max_attempts, 1);
        assert_eq!(polling.audio_policy().max_attempts, 1);
    }

    #[test]
    fn oversized_intervals_are_clamped() {
        let polling = PollingConfig {
            interval_ms: u64::MAX,
            backoff: "exponential".to_string(),
            max_interval_ms: u64::MAX,
            ..PollingConfig::default()
        };
        let policy = polling.script_policy();
        let cap = Duration::from_millis(MAX_POLL_INTERVAL_MS);
        assert_eq!(policy.interval, cap);
        assert_eq!(policy.delay_after(30), cap);
        assert_eq!(policy.budget(), cap * 59);
    }

    #[tokio::test]
    async fn load_missing_file_returns_default() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig::load(tmp.path()).await.unwrap();
        assert_eq!(config.polling.max_attempts, 60);
    }

    #[tokio::test]
    async fn load_rejects_malformed_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "[polling\ninterval_ms = ").unwrap();
        assert!(AppConfig::load(tmp.path()).await.is_err());
    }
}
