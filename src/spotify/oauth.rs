//! Spotify user authorization: PKCE code flow with a local callback server
//! and a JSON token file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, bail};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const SCOPES: &str =
    "user-read-playback-state user-modify-playback-state user-read-currently-playing";

/// How long the browser flow may take.
const AUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let mut buf = [0u8; 32];
        rand::rng().fill_bytes(&mut buf);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(buf))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

fn random_state() -> String {
    let mut buf = [0u8; 16];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

pub fn redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{port}/callback")
}

pub fn authorize_url(
    client_id: &str,
    redirect_uri: &str,
    pkce: &Pkce,
    state: &str,
) -> anyhow::Result<url::Url> {
    let url = url::Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("client_id", client_id),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("scope", SCOPES),
            ("code_challenge_method", "S256"),
            ("code_challenge", pkce.challenge.as_str()),
            ("state", state),
        ],
    )?;
    Ok(url)
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Tokens as persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    pub obtained_at: DateTime<Utc>,
}

impl StoredTokens {
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
            token_type: response.token_type,
            obtained_at: now,
        }
    }

    /// Apply a refresh response. Fields the server omits keep their values.
    pub fn merge(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.access_token = response.access_token;
        if response.refresh_token.is_some() {
            self.refresh_token = response.refresh_token;
        }
        if response.expires_in.is_some() {
            self.expires_in = response.expires_in;
        }
        if response.token_type.is_some() {
            self.token_type = response.token_type;
        }
        self.obtained_at = now;
    }

    /// Unknown lifetimes count as expired.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_in {
            Some(secs) => {
                let expires = self.obtained_at + chrono::Duration::seconds(secs - EXPIRY_MARGIN_SECS);
                now < expires
            }
            None => false,
        }
    }
}

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<StoredTokens> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {e}", self.path.display());
                }
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(tokens) => {
                debug!("Tokens loaded from {}", self.path.display());
                Some(tokens)
            }
            Err(e) => {
                warn!("Failed to parse {}: {e}", self.path.display());
                None
            }
        }
    }

    pub fn save(&self, tokens: &StoredTokens) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(tokens)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[derive(Clone)]
struct CallbackState {
    #[allow(clippy::type_complexity)]
    code_tx: Arc<Mutex<Option<oneshot::Sender<Result<String, String>>>>>,
    expected_state: String,
}

const SUCCESS_PAGE: &str =
    "<html><body><h1>Authorization successful!</h1><p>You can close this window.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><h1>Authorization failed!</h1></body></html>";

async fn callback(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    let result = match (params.get("code"), params.get("state")) {
        (Some(code), Some(s)) if *s == state.expected_state => Ok(code.clone()),
        (Some(_), _) => Err("state mismatch".to_string()),
        (None, _) => Err(params
            .get("error")
            .cloned()
            .unwrap_or_else(|| "no code in callback".to_string())),
    };
    let page = if result.is_ok() {
        (StatusCode::OK, Html(SUCCESS_PAGE))
    } else {
        (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE))
    };

    let sender = state
        .code_tx
        .lock()
        .ok()
        .and_then(|mut slot| slot.take());
    if let Some(tx) = sender {
        let _ = tx.send(result);
    }
    page
}

/// Serve `/callback` on 127.0.0.1:`port` until a code arrives or `timeout`.
pub async fn wait_for_code(
    port: u16,
    expected_state: String,
    timeout: Duration,
) -> anyhow::Result<String> {
    let (code_tx, code_rx) = oneshot::channel();
    let state = CallbackState {
        code_tx: Arc::new(Mutex::new(Some(code_tx))),
        expected_state,
    };
    let router = Router::new()
        .route("/callback", get(callback))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Failed to bind 127.0.0.1:{port}"))?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    let result = tokio::time::timeout(timeout, code_rx).await;
    let _ = shutdown_tx.send(());
    let _ = server.await;

    match result {
        Err(_) => bail!("Authorization timed out after {}s", timeout.as_secs()),
        Ok(Err(_)) => bail!("Callback channel closed"),
        Ok(Ok(Err(reason))) => bail!("Authorization failed: {reason}"),
        Ok(Ok(Ok(code))) => Ok(code),
    }
}

/// Token endpoint calls for a public (PKCE) client.
pub struct Authorizer<'a> {
    pub http: &'a reqwest::blocking::Client,
    pub client_id: &'a str,
    pub port: u16,
}

impl Authorizer<'_> {
    /// Full browser flow. Blocks for up to two minutes.
    pub fn authorize(&self) -> anyhow::Result<TokenResponse> {
        let pkce = Pkce::generate();
        let state = random_state();
        let redirect = redirect_uri(self.port);
        let url = authorize_url(self.client_id, &redirect, &pkce, &state)?;

        info!("Opening browser for Spotify authorization");
        let opener = crate::actions::system::open_command(
            crate::actions::system::Platform::current(),
            url.as_str(),
        );
        if let Err(e) = opener.run() {
            warn!("Could not open browser: {e}");
        }
        println!("If the browser did not open, visit:\n\n    {url}\n");
        println!("Waiting for authorization...");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let code = runtime.block_on(wait_for_code(self.port, state, AUTH_TIMEOUT))?;

        self.exchange(&code, &redirect, &pkce.verifier)
    }

    fn exchange(
        &self,
        code: &str,
        redirect_uri: &str,
        verifier: &str,
    ) -> anyhow::Result<TokenResponse> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client_id),
                ("code_verifier", verifier),
            ])
            .send()?;
        if !resp.status().is_success() {
            bail!("Token exchange failed: {}", resp.status());
        }
        Ok(resp.json()?)
    }

    pub fn refresh(&self, refresh_token: &str) -> anyhow::Result<TokenResponse> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id),
            ])
            .send()?;
        if !resp.status().is_success() {
            bail!("Token refresh failed: {}", resp.status());
        }
        Ok(resp.json()?)
    }
}
