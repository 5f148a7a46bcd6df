use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Html;
use axum::routing::get;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{ERROR_TYPE, Envelope, SUCCESS_TYPE};

pub const CALLBACK_PATH: &str = "/pica/callback";
const FLOW_PARAM: &str = "flow";
const FLOW_TOKEN_LEN: usize = 32;

#[derive(Clone)]
struct CallbackState {
    origin: String,
    flow: String,
    messages: mpsc::Sender<Envelope>,
}

/// Local landing page for the consent flow. Only hits carrying this
/// listener's flow token are forwarded, each as an [`Envelope`] stamped with
/// the origin the request came from.
pub struct CallbackServer {
    origin: String,
    flow: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CallbackServer {
    pub async fn start(host: &str, port: u16, messages: mpsc::Sender<Envelope>) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind((host, port))
            .await
            .with_context(|| format!("Failed to bind callback listener on {}:{}", host, port))?;
        let addr = listener.local_addr()?;
        let origin = format!("http://{}:{}", host, addr.port());
        let flow = flow_token();

        let app = Router::new()
            .route(CALLBACK_PATH, get(pica_callback))
            .with_state(CallbackState {
                origin: origin.clone(),
                flow: flow.clone(),
                messages,
            });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                error!("Callback listener crashed: {}", e);
            }
        });
        info!("Account-link callback listening at {}{}", origin, CALLBACK_PATH);

        Ok(Self {
            origin,
            flow,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Where the consent page must send the browser back to. The flow token
    /// ties the redirect to this listener.
    pub fn callback_url(&self) -> String {
        format!("{}{}?{}={}", self.origin, CALLBACK_PATH, FLOW_PARAM, self.flow)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn flow_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(FLOW_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Origin of the page that sent the browser here: the `Origin` header, else
/// the origin of the `Referer`, else our own (a plain top-level redirect).
fn request_origin(headers: &HeaderMap, own_origin: &str) -> String {
    if let Some(origin) = headers.get(header::ORIGIN) {
        return origin.to_str().unwrap_or("null").to_string();
    }
    match headers.get(header::REFERER) {
        Some(referer) => referer
            .to_str()
            .ok()
            .and_then(|r| Url::parse(r).ok())
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|| "null".to_string()),
        None => own_origin.to_string(),
    }
}

/// Maps callback query parameters onto a handshake message body. `None`
/// while the parameters are incomplete.
fn message_from_query(params: &HashMap<String, String>) -> Option<serde_json::Value> {
    let mut body = if let Some(error) = params.get("error") {
        json!({ "type": ERROR_TYPE, "error": error })
    } else {
        let connector_id = params.get("connectorId")?;
        let access_token = params.get("accessToken")?;
        let user_id = params.get("userId")?;
        let platform = params.get("platform")?;
        let mut body = json!({
            "type": SUCCESS_TYPE,
            "connectorId": connector_id,
            "accessToken": access_token,
            "userId": user_id,
            "platform": platform,
        });
        if let Some(username) = params.get("username") {
            body["username"] = json!(username);
        }
        body
    };
    if let Some(state) = params.get("state") {
        body["state"] = json!(state);
    }
    Some(body)
}

async fn pica_callback(
    State(state): State<CallbackState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    if params.get(FLOW_PARAM) != Some(&state.flow) {
        warn!("Refusing callback without this attempt's flow token");
        return (
            StatusCode::FORBIDDEN,
            Html("<h1>Link expired</h1><p>This page is not part of an active sign-in.</p>"),
        );
    }
    let Some(data) = message_from_query(&params) else {
        debug!("Callback hit without a complete result");
        return (
            StatusCode::OK,
            Html("<h1>Connecting...</h1><p>Waiting for the authorization result.</p>"),
        );
    };
    let failed = params.contains_key("error");
    let envelope = Envelope {
        origin: request_origin(&headers, &state.origin),
        data,
    };
    if state.messages.send(envelope).await.is_err() {
        debug!("Callback arrived after the handshake finished");
    }
    if failed {
        (
            StatusCode::OK,
            Html("<h1>Connection failed</h1><p>You can close this window and try again.</p>"),
        )
    } else {
        (
            StatusCode::OK,
            Html("<h1>Connected successfully!</h1><p>You can close this window.</p>"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn incomplete_query_yields_nothing() {
        assert!(message_from_query(&params(&[("connectorId", "c1")])).is_none());
    }

    #[test]
    fn error_wins_over_partial_success() {
        let body = message_from_query(&params(&[
            ("error", "denied"),
            ("connectorId", "c1"),
            ("state", "st"),
        ]))
        .unwrap();
        assert_eq!(body["type"], ERROR_TYPE);
        assert_eq!(body["error"], "denied");
        assert_eq!(body["state"], "st");
    }

    #[test]
    fn origin_prefers_origin_then_referer_then_self() {
        let own = "http://127.0.0.1:4100";
        let mut headers = HeaderMap::new();
        assert_eq!(request_origin(&headers, own), own);

        headers.insert(header::REFERER, "https://evil.example/page?x=1".parse().unwrap());
        assert_eq!(request_origin(&headers, own), "https://evil.example");

        headers.insert(header::ORIGIN, "https://other.example".parse().unwrap());
        assert_eq!(request_origin(&headers, own), "https://other.example");

        let mut garbled = HeaderMap::new();
        garbled.insert(header::REFERER, "not a url".parse().unwrap());
        assert_eq!(request_origin(&garbled, own), "null");
    }

    #[tokio::test]
    async fn callback_hit_is_forwarded_with_its_origin() {
        let (tx, mut rx) = mpsc::channel(4);
        let server = CallbackServer::start("127.0.0.1", 0, tx).await.unwrap();
        let url = format!(
            "{}&connectorId=c7&accessToken=t&userId=u1&platform=youtube&state=st-1",
            server.callback_url()
        );

        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert!(body.contains("Connected successfully"));

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.origin, server.origin());
        assert_eq!(envelope.data["type"], SUCCESS_TYPE);
        assert_eq!(envelope.data["connectorId"], "c7");
        assert_eq!(envelope.data["state"], "st-1");
        assert!(envelope.data.get("username").is_none());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn hit_without_flow_token_is_refused() {
        let (tx, mut rx) = mpsc::channel(4);
        let server = CallbackServer::start("127.0.0.1", 0, tx).await.unwrap();
        let client = reqwest::Client::new();
        for flow in ["", "&flow=guess"] {
            let url = format!(
                "{}{}?connectorId=c7&accessToken=t&userId=u1&platform=youtube{}",
                server.origin(),
                CALLBACK_PATH,
                flow
            );
            let res = client.get(&url).send().await.unwrap();
            assert_eq!(res.status(), reqwest::StatusCode::FORBIDDEN);
        }
        assert!(rx.try_recv().is_err());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn cross_site_hit_carries_the_foreign_origin() {
        let (tx, mut rx) = mpsc::channel(4);
        let server = CallbackServer::start("127.0.0.1", 0, tx).await.unwrap();
        let url = format!(
            "{}&connectorId=x&accessToken=evil&userId=u1&platform=instagram",
            server.callback_url()
        );
        reqwest::Client::new()
            .get(&url)
            .header(header::ORIGIN, "https://evil.example")
            .send()
            .await
            .unwrap();

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.origin, "https://evil.example");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn bare_hit_sends_nothing() {
        let (tx, mut rx) = mpsc::channel(4);
        let server = CallbackServer::start("127.0.0.1", 0, tx).await.unwrap();
        let body = reqwest::get(server.callback_url())
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("Connecting"));
        assert!(rx.try_recv().is_err());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn each_listener_gets_its_own_flow_token() {
        let (tx, _rx) = mpsc::channel(1);
        let a = CallbackServer::start("127.0.0.1", 0, tx.clone()).await.unwrap();
        let b = CallbackServer::start("127.0.0.1", 0, tx).await.unwrap();
        let token = |s: &CallbackServer| s.callback_url().split("flow=").nth(1).unwrap().to_string();
        assert_eq!(token(&a).len(), FLOW_TOKEN_LEN);
        assert_ne!(token(&a), token(&b));
        a.shutdown().await;
        b.shutdown().await;
    }
}
