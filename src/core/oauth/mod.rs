//! Account-link handshake with the connector service.
//!
//! The consent page runs in a separate browser window. When it finishes it
//! lands on a local callback which forwards a typed message back here as an
//! [`Envelope`]. [`HandshakeBridge`] waits for the first trusted message or
//! for the window to go away, whichever comes first.

mod browser;
mod callback;

pub use browser::BrowserHandshake;
pub use callback::CallbackServer;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const SUCCESS_TYPE: &str = "PICA_AUTH_SUCCESS";
pub const ERROR_TYPE: &str = "PICA_AUTH_ERROR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccess {
    pub connector_id: String,
    pub access_token: String,
    pub user_id: String,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HandshakeMessage {
    #[serde(rename = "PICA_AUTH_SUCCESS")]
    Success(AuthSuccess),
    #[serde(rename = "PICA_AUTH_ERROR")]
    Error { error: String },
}

/// A message from the consent window together with the origin it claims.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    AwaitingPopupAuth,
    Succeeded,
    Cancelled,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Succeeded(AuthSuccess),
    Cancelled,
    Errored(String),
}

impl HandshakeOutcome {
    pub fn state(&self) -> HandshakeState {
        match self {
            HandshakeOutcome::Succeeded(_) => HandshakeState::Succeeded,
            HandshakeOutcome::Cancelled => HandshakeState::Cancelled,
            HandshakeOutcome::Errored(_) => HandshakeState::Errored,
        }
    }
}

/// The secondary window hosting the consent page.
pub trait AuthWindow: Send {
    fn is_closed(&self) -> bool;
    fn close(&mut self);
}

/// Drives one complete link attempt: exposes where the consent page should
/// call back to, then runs the handshake for a given authorization URL.
/// `state` is the value the connector service issued with that URL; when
/// present, only messages echoing it are trusted.
#[async_trait]
pub trait HandshakeDriver: Send {
    fn callback_url(&self) -> String;

    async fn run(&mut self, auth_url: &str, state: Option<&str>) -> Result<HandshakeOutcome>;
}

pub struct HandshakeBridge {
    trusted: Vec<String>,
    expected_state: Option<String>,
    closed_check: Duration,
    state: HandshakeState,
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

impl HandshakeBridge {
    pub fn new(origin: &str, closed_check: Duration) -> Self {
        Self {
            trusted: vec![normalize_origin(origin)],
            expected_state: None,
            closed_check: closed_check.max(Duration::from_millis(1)),
            state: HandshakeState::Idle,
        }
    }

    /// Also accept messages sent from `origin`, e.g. the consent page itself.
    pub fn trust_origin(mut self, origin: &str) -> Self {
        let origin = normalize_origin(origin);
        if !origin.is_empty() && origin != "null" && !self.trusted.contains(&origin) {
            self.trusted.push(origin);
        }
        self
    }

    /// Only accept messages whose `state` equals `state`. Blank means none.
    pub fn expect_state(mut self, state: Option<&str>) -> Self {
        self.expected_state = state
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Waits for the first trusted message or for the window to close. The
    /// bridge is consumed, so an attempt resolves exactly once; the message
    /// receiver and the window are dropped on return.
    pub async fn run<W: AuthWindow>(
        mut self,
        mut window: W,
        mut messages: mpsc::Receiver<Envelope>,
    ) -> HandshakeOutcome {
        self.state = HandshakeState::AwaitingPopupAuth;
        let mut check = tokio::time::interval(self.closed_check);
        check.set_missed_tick_behavior(MissedTickBehavior::Skip);
        check.tick().await;
        let mut listening = true;

        loop {
            tokio::select! {
                biased;
                envelope = messages.recv(), if listening => match envelope {
                    Some(envelope) => {
                        if let Some(outcome) = self.accept(envelope) {
                            window.close();
                            self.state = outcome.state();
                            return outcome;
                        }
                    }
                    None => {
                        debug!("Handshake message channel closed, watching the window only");
                        listening = false;
                    }
                },
                _ = check.tick() => {
                    if window.is_closed() {
                        info!("Consent window closed before the handshake finished");
                        self.state = HandshakeState::Cancelled;
                        return HandshakeOutcome::Cancelled;
                    }
                }
            }
        }
    }

    fn accept(&self, envelope: Envelope) -> Option<HandshakeOutcome> {
        if !self.trusted.contains(&normalize_origin(&envelope.origin)) {
            warn!(
                "Ignoring handshake message from untrusted origin {}",
                envelope.origin
            );
            return None;
        }
        if let Some(expected) = &self.expected_state
            && envelope.data.get("state").and_then(|v| v.as_str()) != Some(expected.as_str())
        {
            warn!("Ignoring handshake message with a missing or stale state");
            return None;
        }
        match serde_json::from_value::<HandshakeMessage>(envelope.data) {
            Ok(HandshakeMessage::Success(success)) => {
                info!(
                    "Account link succeeded for {} ({})",
                    success.platform, success.connector_id
                );
                Some(HandshakeOutcome::Succeeded(success))
            }
            Ok(HandshakeMessage::Error { error }) => {
                warn!("Account link failed: {}", error);
                Some(HandshakeOutcome::Errored(error))
            }
            Err(e) => {
                debug!("Ignoring unrecognized handshake message: {}", e);
                None
            }
        }
    }
}
