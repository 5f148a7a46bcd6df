use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;

use super::{AuthWindow, CallbackServer, Envelope, HandshakeBridge, HandshakeDriver, HandshakeOutcome};
use crate::core::config::PicaConfig;

/// A consent page opened in the user's browser. A terminal cannot see the
/// browser tab, so the window counts as closed once it is abandoned past
/// its deadline or the user interrupts.
pub struct BrowserWindow {
    opened_at: Instant,
    abandon_after: Duration,
    closed: Arc<AtomicBool>,
}

impl BrowserWindow {
    pub fn new(abandon_after: Duration) -> Self {
        Self {
            opened_at: Instant::now(),
            abandon_after,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that marks the window closed from elsewhere (Ctrl+C).
    pub fn closer(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl AuthWindow for BrowserWindow {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.opened_at.elapsed() >= self.abandon_after
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Handshake driver used by the CLI: local callback listener plus the
/// system browser.
pub struct BrowserHandshake {
    server: Option<CallbackServer>,
    messages: Option<mpsc::Receiver<Envelope>>,
    closed_check: Duration,
    abandon_after: Duration,
    open_browser: bool,
}

impl BrowserHandshake {
    pub async fn start(config: &PicaConfig) -> Result<Self> {
        let (tx, rx) = mpsc::channel(8);
        let server = CallbackServer::start(&config.callback_host, config.callback_port, tx).await?;
        Ok(Self {
            server: Some(server),
            messages: Some(rx),
            closed_check: config.closed_check_interval(),
            abandon_after: config.abandon_after(),
            open_browser: config.open_browser,
        })
    }
}

#[async_trait]
impl HandshakeDriver for BrowserHandshake {
    fn callback_url(&self) -> String {
        self.server
            .as_ref()
            .map(|s| s.callback_url())
            .unwrap_or_default()
    }

    async fn run(&mut self, auth_url: &str, state: Option<&str>) -> Result<HandshakeOutcome> {
        let (Some(server), Some(messages)) = (self.server.take(), self.messages.take()) else {
            return Err(anyhow!("This account-link attempt has already been used"));
        };

        println!(
            "  {} {}",
            console::style("Authorize in your browser:").bold(),
            console::style(auth_url).cyan().underlined()
        );
        if self.open_browser {
            if let Err(e) = open::that(auth_url) {
                warn!("Could not open a browser: {}", e);
                println!("  Open the link above manually to continue.");
            }
        }
        println!(
            "  {}",
            console::style("Waiting for authorization (Ctrl+C to cancel)...").dim()
        );

        let window = BrowserWindow::new(self.abandon_after);
        let closer = window.closer();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Account link interrupted");
                closer.store(true, Ordering::SeqCst);
            }
        });

        let mut bridge =
            HandshakeBridge::new(server.origin(), self.closed_check).expect_state(state);
        if let Ok(consent) = Url::parse(auth_url) {
            bridge = bridge.trust_origin(&consent.origin().ascii_serialization());
        }
        let outcome = bridge.run(window, messages).await;

        interrupt.abort();
        server.shutdown().await;
        Ok(outcome)
    }
}
