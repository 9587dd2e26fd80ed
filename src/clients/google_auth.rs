//! Google OAuth for installed applications.
//!
//! The first run opens a browser for consent and catches the redirect on a
//! loopback server. The token is stored in a JSON file and refreshed in place
//! on later runs.

#![allow(async_fn_in_trait)]

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use axum::{Extension, Router, extract::Query, response::Html, routing::get};
use chrono::Utc;
use log::{debug, info, warn};
use rand::{Rng, distr::Alphanumeric};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, oneshot};

use crate::clients::errors::{Error, Result};

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

// Tokens this close to expiry are treated as expired
const EXPIRY_MARGIN_SECS: u64 = 60;
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Persisted OAuth token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GoogleToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
    pub expires_in: u64,
    pub obtained_at: u64,
}

impl GoogleToken {
    pub fn is_valid_at(&self, now: u64) -> bool {
        now + EXPIRY_MARGIN_SECS < self.obtained_at + self.expires_in
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_secs())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

fn now_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

/// Source of Google credentials. Implementations own where and how tokens
/// are stored; callers only see tokens.
pub trait CredentialProvider {
    /// Stored token, if any.
    async fn load(&self) -> Result<Option<GoogleToken>>;
    /// Exchanges the refresh token of `token` for a fresh access token.
    async fn refresh(&self, token: &GoogleToken) -> Result<GoogleToken>;
    async fn persist(&self, token: &GoogleToken) -> Result<()>;
    /// Interactive consent flow.
    async fn authorize(&self) -> Result<GoogleToken>;
}

/// Returns a usable token: the stored one while valid, otherwise a refreshed
/// one, otherwise one from the interactive flow. New tokens are persisted.
pub async fn obtain_token<P: CredentialProvider>(provider: &P) -> Result<GoogleToken> {
    let stored = match provider.load().await {
        Ok(token) => token,
        Err(e) => {
            warn!("Ignoring unreadable Google token: {e}");
            None
        }
    };

    let token = match stored {
        Some(token) if token.is_valid() => {
            debug!("Using stored Google token");
            return Ok(token);
        }
        Some(token) if token.can_refresh() => match provider.refresh(&token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!("Google token refresh failed: {e}, re-authorizing");
                provider.authorize().await?
            }
        },
        _ => provider.authorize().await?,
    };

    provider.persist(&token).await?;
    Ok(token)
}

/// Client section of a Google OAuth client secrets file.
#[derive(Deserialize, Debug, Clone)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Deserialize, Debug)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(content: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(content)?;
        file.installed.or(file.web).ok_or_else(|| {
            Error::ConfigurationError(
                "Google client secrets file has neither an \"installed\" nor a \"web\" section"
                    .into(),
            )
        })
    }
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

impl TokenResponse {
    fn into_token(self, previous_refresh_token: Option<String>) -> GoogleToken {
        GoogleToken {
            access_token: self.access_token,
            // Refresh responses usually omit the refresh token
            refresh_token: self.refresh_token.or(previous_refresh_token),
            scope: self.scope.unwrap_or_default(),
            expires_in: self.expires_in,
            obtained_at: now_secs(),
        }
    }
}

/// File-backed installed-application flow.
pub struct InstalledAppFlow {
    secrets_path: PathBuf,
    token_path: PathBuf,
    http: Client,
}

impl InstalledAppFlow {
    pub fn new(secrets_path: PathBuf, token_path: PathBuf) -> Self {
        InstalledAppFlow {
            secrets_path,
            token_path,
            http: Client::new(),
        }
    }

    async fn secrets(&self) -> Result<ClientSecrets> {
        let content = tokio::fs::read_to_string(&self.secrets_path)
            .await
            .map_err(|e| {
                Error::ConfigurationError(format!(
                    "Cannot read Google client secrets {}: {e}",
                    self.secrets_path.display()
                ))
            })?;
        ClientSecrets::from_json(&content)
    }

    async fn request_token(&self, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.http.post(token_uri).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::GoogleAuthError(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        Ok(response.json().await?)
    }
}

impl CredentialProvider for InstalledAppFlow {
    async fn load(&self) -> Result<Option<GoogleToken>> {
        if !tokio::fs::try_exists(&self.token_path).await? {
            debug!("No stored Google token in {:?}", self.token_path);
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&self.token_path).await?;
        let token = serde_json::from_str(&content)?;
        debug!("Loaded Google token from {:?}", self.token_path);
        Ok(Some(token))
    }

    async fn refresh(&self, token: &GoogleToken) -> Result<GoogleToken> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| Error::GoogleAuthError("stored token has no refresh token".into()))?;
        let secrets = self.secrets().await?;
        debug!("Refreshing Google access token");
        let response = self
            .request_token(
                &secrets.token_uri,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", secrets.client_id.as_str()),
                    ("client_secret", secrets.client_secret.as_str()),
                ],
            )
            .await?;
        Ok(response.into_token(token.refresh_token.clone()))
    }

    async fn persist(&self, token: &GoogleToken) -> Result<()> {
        if let Some(parent) = self.token_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(token)?;
        tokio::fs::write(&self.token_path, json).await?;
        debug!("Stored Google token in {:?}", self.token_path);
        Ok(())
    }

    async fn authorize(&self) -> Result<GoogleToken> {
        let secrets = self.secrets().await?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let redirect_uri = format!("http://127.0.0.1:{}/", listener.local_addr()?.port());
        let state = random_state();

        let auth_url = consent_url(&secrets, &redirect_uri, &state)?;
        let code = wait_for_code(listener, &auth_url, state).await?;

        let response = self
            .request_token(
                &secrets.token_uri,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code.as_str()),
                    ("client_id", secrets.client_id.as_str()),
                    ("client_secret", secrets.client_secret.as_str()),
                    ("redirect_uri", redirect_uri.as_str()),
                ],
            )
            .await?;
        info!("Google authorization completed");
        Ok(response.into_token(None))
    }
}

fn random_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Consent page URL asking for offline access to spreadsheets.
pub fn consent_url(secrets: &ClientSecrets, redirect_uri: &str, state: &str) -> Result<Url> {
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", SHEETS_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ],
    )
    .map_err(|e| Error::ConfigurationError(format!("Invalid Google auth_uri: {e}")))
}

type CodeSender = Arc<Mutex<Option<oneshot::Sender<Result<String, String>>>>>;

#[derive(Clone)]
struct CallbackState {
    expected_state: String,
    sender: CodeSender,
}

async fn wait_for_code(
    listener: tokio::net::TcpListener,
    auth_url: &Url,
    expected_state: String,
) -> Result<String> {
    let (code_tx, code_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let callback_state = CallbackState {
        expected_state,
        sender: Arc::new(Mutex::new(Some(code_tx))),
    };
    let app = Router::new().route("/", get(callback).layer(Extension(callback_state)));
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_rx.await.ok();
            })
            .await
    });

    println!("Authorize Google Sheets access in your browser:\n{auth_url}");
    if webbrowser::open(auth_url.as_str()).is_err() {
        warn!("Failed to open browser, open the URL above manually");
    }

    let outcome = tokio::time::timeout(CONSENT_TIMEOUT, code_rx).await;
    shutdown_tx.send(()).ok();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Loopback server error: {e}"),
        Err(e) => debug!("Loopback server task ended abnormally: {e}"),
    }

    match outcome {
        Ok(Ok(Ok(code))) => Ok(code),
        Ok(Ok(Err(reason))) => Err(Error::GoogleAuthError(reason)),
        Ok(Err(_)) => Err(Error::GoogleAuthError(
            "loopback server stopped before receiving a code".into(),
        )),
        Err(_) => Err(Error::GoogleAuthError(
            "timed out waiting for Google authorization".into(),
        )),
    }
}

async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(state): Extension<CallbackState>,
) -> Html<&'static str> {
    let outcome = check_redirect(&params, &state.expected_state);
    let page = if outcome.is_ok() {
        Html("<h2>Authentication successful.</h2><p>You can close this window.</p>")
    } else {
        Html("<h4>Authentication failed.</h4>")
    };
    if let Some(sender) = state.sender.lock().await.take() {
        sender.send(outcome).ok();
    }
    page
}

fn check_redirect(params: &HashMap<String, String>, expected_state: &str) -> Result<String, String> {
    if let Some(error) = params.get("error") {
        return Err(format!("consent denied: {error}"));
    }
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err("state mismatch in redirect".to_string());
    }
    params
        .get("code")
        .cloned()
        .ok_or_else(|| "redirect is missing the authorization code".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn token(obtained_at: u64, refresh: Option<&str>) -> GoogleToken {
        GoogleToken {
            access_token: "access".into(),
            refresh_token: refresh.map(str::to_owned),
            scope: SHEETS_SCOPE.into(),
            expires_in: 3600,
            obtained_at,
        }
    }

    #[test]
    fn validity_uses_expiry_margin() {
        let t = token(1_000, None);
        assert!(t.is_valid_at(1_000));
        assert!(t.is_valid_at(1_000 + 3600 - EXPIRY_MARGIN_SECS - 1));
        assert!(!t.is_valid_at(1_000 + 3600 - EXPIRY_MARGIN_SECS));
        assert!(!t.is_valid_at(10_000));
    }

    #[test]
    fn refresh_requires_non_empty_refresh_token() {
        assert!(token(0, Some("r")).can_refresh());
        assert!(!token(0, Some("")).can_refresh());
        assert!(!token(0, None).can_refresh());
    }

    #[test]
    fn client_secrets_prefer_installed_section() {
        let json = r#"{"installed": {"client_id": "id", "client_secret": "secret",
            "redirect_uris": ["http://localhost"]}}"#;
        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.client_id, "id");
        assert_eq!(secrets.token_uri, "https://oauth2.googleapis.com/token");

        let web = r#"{"web": {"client_id": "w", "client_secret": "s",
            "auth_uri": "https://example.com/auth", "token_uri": "https://example.com/token"}}"#;
        assert_eq!(ClientSecrets::from_json(web).unwrap().token_uri, "https://example.com/token");

        assert!(matches!(
            ClientSecrets::from_json("{}"),
            Err(Error::ConfigurationError(_))
        ));
    }

    #[test]
    fn consent_url_carries_offline_scope_and_state() {
        let secrets = ClientSecrets {
            client_id: "my-client".into(),
            client_secret: "s".into(),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
        };
        let url = consent_url(&secrets, "http://127.0.0.1:8123/", "xyz").unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "my-client");
        assert_eq!(params["redirect_uri"], "http://127.0.0.1:8123/");
        assert_eq!(params["scope"], SHEETS_SCOPE);
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["state"], "xyz");
    }

    #[test]
    fn redirect_checks_state_and_error() {
        let ok: HashMap<String, String> = [("code", "c0de"), ("state", "s")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(check_redirect(&ok, "s"), Ok("c0de".to_string()));
        assert!(check_redirect(&ok, "other").is_err());

        let denied: HashMap<String, String> =
            [("error".to_string(), "access_denied".to_string())].into();
        assert!(check_redirect(&denied, "s").is_err());
    }

    #[test]
    fn refresh_keeps_previous_refresh_token() {
        let response = TokenResponse {
            access_token: "new".into(),
            expires_in: 3599,
            refresh_token: None,
            scope: None,
        };
        let t = response.into_token(Some("keep-me".into()));
        assert_eq!(t.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(t.access_token, "new");
    }

    #[derive(Default)]
    struct FakeProvider {
        stored: Option<GoogleToken>,
        refresh_fails: bool,
        calls: StdMutex<Vec<&'static str>>,
        persisted: StdMutex<Option<GoogleToken>>,
    }

    impl FakeProvider {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CredentialProvider for FakeProvider {
        async fn load(&self) -> Result<Option<GoogleToken>> {
            self.calls.lock().unwrap().push("load");
            Ok(self.stored.clone())
        }

        async fn refresh(&self, token: &GoogleToken) -> Result<GoogleToken> {
            self.calls.lock().unwrap().push("refresh");
            if self.refresh_fails {
                return Err(Error::GoogleAuthError("revoked".into()));
            }
            Ok(GoogleToken {
                access_token: "refreshed".into(),
                obtained_at: now_secs(),
                ..token.clone()
            })
        }

        async fn persist(&self, token: &GoogleToken) -> Result<()> {
            self.calls.lock().unwrap().push("persist");
            *self.persisted.lock().unwrap() = Some(token.clone());
            Ok(())
        }

        async fn authorize(&self) -> Result<GoogleToken> {
            self.calls.lock().unwrap().push("authorize");
            Ok(GoogleToken {
                access_token: "interactive".into(),
                ..token(now_secs(), Some("r"))
            })
        }
    }

    #[tokio::test]
    async fn valid_stored_token_is_used_as_is() {
        let provider = FakeProvider {
            stored: Some(token(now_secs(), Some("r"))),
            ..Default::default()
        };
        let t = obtain_token(&provider).await.unwrap();
        assert_eq!(t.access_token, "access");
        assert_eq!(provider.calls(), vec!["load"]);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let provider = FakeProvider {
            stored: Some(token(0, Some("r"))),
            ..Default::default()
        };
        let t = obtain_token(&provider).await.unwrap();
        assert_eq!(t.access_token, "refreshed");
        assert_eq!(provider.calls(), vec!["load", "refresh", "persist"]);
        assert_eq!(provider.persisted.lock().unwrap().as_ref(), Some(&t));
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_consent() {
        let provider = FakeProvider {
            stored: Some(token(0, Some("r"))),
            refresh_fails: true,
            ..Default::default()
        };
        let t = obtain_token(&provider).await.unwrap();
        assert_eq!(t.access_token, "interactive");
        assert_eq!(
            provider.calls(),
            vec!["load", "refresh", "authorize", "persist"]
        );
    }

    #[tokio::test]
    async fn missing_token_triggers_consent() {
        let provider = FakeProvider::default();
        let t = obtain_token(&provider).await.unwrap();
        assert_eq!(t.access_token, "interactive");
        assert_eq!(provider.calls(), vec!["load", "authorize", "persist"]);
    }
}
