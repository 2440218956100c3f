//! OAuth2 authorization-code flow against the Exist provider.
//!
//! A short-lived axum server is bound on the loopback address, the user's browser
//! is pointed at the provider's authorize page, and the code delivered to the
//! redirect URI is exchanged for an access token. The server lives only as
//! long as [`ExistAuth::authorize`] waits for the callback.

use std::collections::HashMap;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_REDIRECT_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8000);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_SCOPES: [&str; 2] = ["read", "write"];

const SUCCESS_PAGE: &str = "<html><body><h1>Authorized</h1>\
  <p>You can close this window and return to the terminal.</p></body></html>";
const DENIED_PAGE: &str = "<html><body><h1>Authorization failed</h1>\
  <p>No authorization code was received. You can close this window.</p></body></html>";

#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Address the callback listener binds to. Port `0` picks a free port.
    pub redirect_addr: SocketAddr,
    pub scopes: Vec<String>,
    /// How long to wait for the browser redirect.
    pub timeout: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            redirect_addr: SocketAddr::from(DEFAULT_REDIRECT_ADDR),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Token endpoint response. Only `access_token` is guaranteed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Something that can show the authorize page to the user.
pub trait Browser {
    fn open(&self, url: &Url) -> Result<()>;
}

/// Opens URLs with the platform's default handler.
pub struct SystemBrowser;

impl Browser for SystemBrowser {
    fn open(&self, url: &Url) -> Result<()> {
        let mut command = if cfg!(target_os = "windows") {
            let mut command = Command::new("cmd");
            command.args(["/C", "start", ""]);
            command
        } else if cfg!(target_os = "macos") {
            Command::new("open")
        } else {
            Command::new("xdg-open")
        };
        command
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(())
    }
}

pub struct ExistAuth<B = SystemBrowser> {
    client: Client,
    client_id: String,
    client_secret: String,
    oauth_url: String,
    settings: AuthSettings,
    browser: B,
}

impl ExistAuth<SystemBrowser> {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        oauth_url: impl Into<String>,
    ) -> Self {
        ExistAuth {
            client: Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            oauth_url: oauth_url.into().trim_end_matches('/').to_string(),
            settings: AuthSettings::default(),
            browser: SystemBrowser,
        }
    }
}

impl<B: Browser> ExistAuth<B> {
    pub fn with_settings(mut self, settings: AuthSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_browser<C: Browser>(self, browser: C) -> ExistAuth<C> {
        ExistAuth {
            client: self.client,
            client_id: self.client_id,
            client_secret: self.client_secret,
            oauth_url: self.oauth_url,
            settings: self.settings,
            browser,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn authorize_url(&self, redirect_uri: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/authorize", self.oauth_url))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.settings.scopes.join(" "));
        Ok(url)
    }

    /// Runs the whole flow and hands back the access token, or `None` when the
    /// user denied access, the callback timed out or the exchange failed.
    pub async fn browser_authorize(&self) -> Option<String> {
        match self.authorize().await {
            Ok(token) => Some(token.access_token),
            Err(e) => {
                warn!(error = %e, "authorization failed");
                None
            }
        }
    }

    /// Runs the whole flow, reporting why it failed.
    pub async fn authorize(&self) -> Result<Token> {
        let listener = CallbackListener::bind(self.settings.redirect_addr).await?;
        let redirect_uri = listener.redirect_uri()?;
        let url = self.authorize_url(&redirect_uri)?;

        info!(%redirect_uri, "waiting for authorization callback");
        if let Err(e) = self.browser.open(&url) {
            warn!(error = %e, "could not open a browser");
            println!("Open this URL in your browser to authorize: {url}");
        }

        let code = listener.wait_for_code(self.settings.timeout).await?;
        self.exchange_code(&code, &redirect_uri).await
    }

    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Token> {
        let url = format!("{}/token", self.oauth_url);
        debug!(%url, "exchanging authorization code");

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            let token = serde_json::from_str::<Token>(&body)?;
            info!("access token received");
            Ok(token)
        } else {
            Err(Error::TokenExchange { status, body })
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code(String),
    Denied(String),
}

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<Callback>>>>;

/// Grace period for in-flight browser connections once the callback arrived.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Loopback HTTP server that answers on `/` until the redirect arrives.
/// Other paths get a 404. The socket is released when the wait returns.
struct CallbackListener {
    listener: TcpListener,
}

impl CallbackListener {
    async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(CallbackListener { listener })
    }

    fn redirect_uri(&self) -> Result<String> {
        Ok(format!("http://{}/", self.listener.local_addr()?))
    }

    async fn wait_for_code(self, timeout: Duration) -> Result<String> {
        let (callback_tx, callback_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let sender: CallbackSender = Arc::new(Mutex::new(Some(callback_tx)));
        let app = Router::new().route("/", get(receive_callback)).with_state(sender);

        let serve = axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .into_future();
        tokio::pin!(serve);

        let outcome = tokio::select! {
            outcome = tokio::time::timeout(timeout, callback_rx) => outcome,
            served = &mut serve => {
                served?;
                return Err(Error::AuthorizationDenied("callback server stopped".to_string()));
            }
        };

        let _ = stop_tx.send(());
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut serve).await.is_err() {
            debug!("closing callback connections that are still open");
        }

        match outcome {
            Err(_) => Err(Error::AuthorizationTimeout),
            Ok(Err(_)) => Err(Error::AuthorizationDenied("callback server stopped".to_string())),
            Ok(Ok(Callback::Code(code))) => Ok(code),
            Ok(Ok(Callback::Denied(reason))) => Err(Error::AuthorizationDenied(reason)),
        }
    }
}

async fn receive_callback(
    State(sender): State<CallbackSender>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let callback = parse_callback(&params);
    debug!(granted = matches!(callback, Callback::Code(_)), "callback request");
    let page = match callback {
        Callback::Code(_) => SUCCESS_PAGE,
        Callback::Denied(_) => DENIED_PAGE,
    };
    // Only the first callback counts; later ones just get the page.
    if let Some(tx) = sender.lock().await.take() {
        let _ = tx.send(callback);
    }
    Html(page)
}

fn parse_callback(params: &HashMap<String, String>) -> Callback {
    let code = params.get("code").filter(|code| !code.is_empty());
    match (code, params.get("error")) {
        (Some(code), None) => Callback::Code(code.clone()),
        (_, Some(error)) => Callback::Denied(match params.get("error_description") {
            Some(description) => format!("{error}: {description}"),
            None => error.clone(),
        }),
        (None, None) => Callback::Denied("no authorization code in callback".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use tokio::io::AsyncWriteExt;

    use super::*;

    /// Plays the provider: follows the authorize URL straight to the redirect URI
    /// with the given query appended.
    struct RedirectingBrowser {
        callback_query: &'static str,
    }

    impl Browser for RedirectingBrowser {
        fn open(&self, url: &Url) -> Result<()> {
            let redirect_uri = url
                .query_pairs()
                .find(|(key, _)| key == "redirect_uri")
                .map(|(_, value)| value.into_owned())
                .unwrap();
            let callback = format!("{redirect_uri}?{}", self.callback_query);
            tokio::spawn(async move {
                let _ = reqwest::get(callback).await;
            });
            Ok(())
        }
    }

    struct IdleBrowser;

    impl Browser for IdleBrowser {
        fn open(&self, _url: &Url) -> Result<()> {
            Ok(())
        }
    }

    fn ephemeral_settings(timeout: Duration) -> AuthSettings {
        AuthSettings {
            redirect_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            timeout,
            ..AuthSettings::default()
        }
    }

    #[test]
    fn given_client_id_when_authorize_url_then_all_parameters_are_present() {
        // Given
        let auth = ExistAuth::new("my-client", "secret", "https://exist.io/oauth2/");

        // When
        let url = auth.authorize_url("http://127.0.0.1:8000/").unwrap();

        // Then
        assert_eq!(url.path(), "/oauth2/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("client_id".to_string(), "my-client".to_string()),
                ("redirect_uri".to_string(), "http://127.0.0.1:8000/".to_string()),
                ("response_type".to_string(), "code".to_string()),
                ("scope".to_string(), "read write".to_string()),
            ]
        );
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn given_callback_parameters_when_parse_callback_then_classified() {
        assert_eq!(
            parse_callback(&params(&[("code", "abc"), ("state", "1")])),
            Callback::Code("abc".to_string())
        );
        assert_eq!(
            parse_callback(&params(&[("error", "access_denied")])),
            Callback::Denied("access_denied".to_string())
        );
        assert_eq!(
            parse_callback(&params(&[("error", "access_denied"), ("error_description", "User said no")])),
            Callback::Denied("access_denied: User said no".to_string())
        );
        assert!(matches!(parse_callback(&params(&[("code", "")])), Callback::Denied(_)));
        assert!(matches!(parse_callback(&params(&[])), Callback::Denied(_)));
    }

    #[tokio::test]
    async fn given_token_response_when_exchange_code_then_access_token() {
        // Given
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("grant_type=authorization_code".into()),
                Matcher::Regex("code=the-code".into()),
                Matcher::Regex("client_id=my-client".into()),
                Matcher::Regex("client_secret=secret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "abc123", "token_type": "Bearer"}"#)
            .create_async()
            .await;
        let auth = ExistAuth::new("my-client", "secret", server.url());

        // When
        let token = auth.exchange_code("the-code", "http://127.0.0.1:8000/").await.unwrap();

        // Then
        m.assert_async().await;
        assert_eq!(token.access_token, "abc123");
        assert_eq!(token.token_type.as_deref(), Some("Bearer"));
    }

    #[tokio::test]
    async fn given_rejected_code_when_exchange_code_then_token_exchange_error() {
        // Given
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;
        let auth = ExistAuth::new("my-client", "secret", server.url());

        // When
        let error = auth.exchange_code("stale", "http://127.0.0.1:8000/").await.unwrap_err();

        // Then
        match error {
            Error::TokenExchange { status, body } => {
                assert_eq!(status.as_u16(), 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn given_redirect_with_code_when_browser_authorize_then_token() {
        // Given
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/token")
            .match_body(Matcher::Regex("code=xyz".into()))
            .with_status(200)
            .with_body(r#"{"access_token": "abc123"}"#)
            .create_async()
            .await;
        let auth = ExistAuth::new("my-client", "secret", server.url())
            .with_settings(ephemeral_settings(Duration::from_secs(10)))
            .with_browser(RedirectingBrowser { callback_query: "code=xyz" });

        // When
        let token = auth.browser_authorize().await;

        // Then
        assert_eq!(token.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn given_no_callback_when_authorize_then_timeout_and_no_token() {
        // Given
        let mut server = Server::new_async().await;
        let token_endpoint = server.mock("POST", "/token").expect(0).create_async().await;
        let auth = ExistAuth::new("my-client", "secret", server.url())
            .with_settings(ephemeral_settings(Duration::from_millis(100)))
            .with_browser(IdleBrowser);

        // Then
        assert!(matches!(auth.authorize().await, Err(Error::AuthorizationTimeout)));
        assert_eq!(auth.browser_authorize().await, None);
        token_endpoint.assert_async().await;
    }

    #[tokio::test]
    async fn given_user_denies_consent_when_authorize_then_denied() {
        // Given
        let server = Server::new_async().await;
        let auth = ExistAuth::new("my-client", "secret", server.url())
            .with_settings(ephemeral_settings(Duration::from_secs(10)))
            .with_browser(RedirectingBrowser { callback_query: "error=access_denied" });

        // When
        let error = auth.authorize().await.unwrap_err();

        // Then
        assert!(matches!(error, Error::AuthorizationDenied(reason) if reason == "access_denied"));
    }

    #[tokio::test]
    async fn given_unrelated_request_first_when_waiting_then_code_still_received() {
        // Given
        let listener = CallbackListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let redirect_uri = listener.redirect_uri().unwrap();
        let client = tokio::spawn(async move {
            let favicon = reqwest::get(format!("{redirect_uri}favicon.ico")).await.unwrap();
            assert_eq!(favicon.status().as_u16(), 404);
            reqwest::get(format!("{redirect_uri}?code=late")).await.unwrap().text().await.unwrap()
        });

        // When
        let code = listener.wait_for_code(Duration::from_secs(10)).await.unwrap();

        // Then
        assert_eq!(code, "late");
        assert!(client.await.unwrap().contains("Authorized"));
    }

    #[tokio::test]
    async fn given_timed_out_listener_when_rebinding_then_port_is_free() {
        // Given
        let listener = CallbackListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let addr = listener.listener.local_addr().unwrap();

        // When
        let result = listener.wait_for_code(Duration::from_millis(50)).await;

        // Then
        assert!(matches!(result, Err(Error::AuthorizationTimeout)));
        assert!(TcpListener::bind(addr).await.is_ok());
    }

    #[tokio::test]
    async fn given_connection_closed_without_request_when_waiting_then_code_still_received() {
        // Given
        let listener = CallbackListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let addr = listener.listener.local_addr().unwrap();
        let redirect_uri = listener.redirect_uri().unwrap();
        let client = tokio::spawn(async move {
            drop(tokio::net::TcpStream::connect(addr).await.unwrap());
            tokio::time::sleep(Duration::from_millis(50)).await;
            reqwest::get(format!("{redirect_uri}?code=real")).await.unwrap();
        });

        // When
        let code = listener.wait_for_code(Duration::from_secs(10)).await.unwrap();

        // Then
        assert_eq!(code, "real");
        client.await.unwrap();
    }

    #[tokio::test]
    async fn given_idle_connection_open_when_waiting_then_code_still_received() {
        // Given
        let listener = CallbackListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let addr = listener.listener.local_addr().unwrap();
        let redirect_uri = listener.redirect_uri().unwrap();
        let idle = tokio::net::TcpStream::connect(addr).await.unwrap();
        let client = tokio::spawn(async move {
            reqwest::get(format!("{redirect_uri}?code=real")).await.unwrap();
        });

        // When
        let code = listener.wait_for_code(Duration::from_secs(10)).await.unwrap();

        // Then
        assert_eq!(code, "real");
        client.await.unwrap();
        drop(idle);
    }

    #[tokio::test]
    async fn given_client_gone_right_after_sending_code_when_waiting_then_code_kept() {
        // Given
        let listener = CallbackListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let addr = listener.listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /?code=hasty HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n")
                .await
                .unwrap();
            drop(stream);
        });

        // When
        let code = listener.wait_for_code(Duration::from_secs(10)).await.unwrap();

        // Then
        assert_eq!(code, "hasty");
    }
}
