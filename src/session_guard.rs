//! Authenticated session against the gateway.
//!
//! The gateway hands out a session cookie once a bearer token has been
//! accepted by `/auth/check_jwt`. The cookie lives in the reqwest cookie
//! store; this module tracks when it should be considered expired and makes
//! sure concurrent callers trigger at most one re-authentication.

use std::time::Duration;

use serde_derive::Deserialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::GatewayError;

/// Gateway sessions last roughly ten minutes.
pub const SESSION_DURATION: Duration = Duration::from_secs(10 * 60);

/// Sessions are treated as expired this long before the device would expire them.
pub const REFRESH_BUFFER: Duration = Duration::from_secs(60);

/// Deadline for every outbound request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const AUTH_CHECK_PATH: &str = "/auth/check_jwt";

pub const ENLIGHTEN_LOGIN_URL: &str = "https://enlighten.enphaseenergy.com/login/login.json";
pub const ENLIGHTEN_TOKEN_URL: &str = "https://entrez.enphaseenergy.com/tokens";

/// How the exporter obtains a bearer token for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayAuth {
    /// A long-lived token generated ahead of time.
    Token(String),
    /// Enlighten account credentials used to mint a token on every authentication.
    Enlighten { username: String, password: String },
}

/// Enlighten endpoints used when minting tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnlightenUrls {
    pub login: String,
    pub token: String,
}

impl Default for EnlightenUrls {
    fn default() -> Self {
        Self {
            login: ENLIGHTEN_LOGIN_URL.to_string(),
            token: ENLIGHTEN_TOKEN_URL.to_string(),
        }
    }
}

/// Immutable connection details for one gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Base address, e.g. `https://envoy.local`, without a trailing slash.
    pub address: String,
    pub serial: String,
    pub auth: GatewayAuth,
    pub enlighten: EnlightenUrls,
}

impl Credentials {
    pub fn with_token(address: &str, serial: &str, token: &str) -> Self {
        Self {
            address: address.trim_end_matches('/').to_string(),
            serial: serial.to_string(),
            auth: GatewayAuth::Token(token.to_string()),
            enlighten: EnlightenUrls::default(),
        }
    }
}

/// Local view of the gateway's trust state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Session {
    pub authenticated: bool,
    pub expires_at: Option<Instant>,
}

impl Session {
    fn established(expires_at: Instant) -> Self {
        Self {
            authenticated: true,
            expires_at: Some(expires_at),
        }
    }

    /// Usable iff authenticated and not inside the refresh window.
    pub fn is_valid(&self, now: Instant, refresh_buffer: Duration) -> bool {
        self.authenticated
            && self
                .expires_at
                .is_some_and(|expires_at| now + refresh_buffer < expires_at)
    }
}

#[derive(Debug, Default)]
struct SessionState {
    session: Session,
    ready: bool,
}

/// `/auth/check_jwt` body. Older firmware answers with plain HTML instead.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenCheckResponse {
    message: String,
    session_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnlightenLoginResponse {
    user_id: i64,
    user_name: String,
}

/// Owns the HTTP transport and the session it carries.
pub struct SessionGuard {
    credentials: Credentials,
    http: reqwest::Client,
    session_duration: Duration,
    refresh_buffer: Duration,
    state: RwLock<SessionState>,
}

impl SessionGuard {
    pub fn new(credentials: Credentials) -> Result<Self, GatewayError> {
        Self::with_timing(credentials, SESSION_DURATION, REFRESH_BUFFER)
    }

    /// `refresh_buffer` must be shorter than `session_duration`, otherwise a
    /// fresh session would already count as expired.
    pub fn with_timing(
        credentials: Credentials,
        session_duration: Duration,
        refresh_buffer: Duration,
    ) -> Result<Self, GatewayError> {
        debug_assert!(refresh_buffer < session_duration);

        // The gateway serves a self-signed certificate.
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(GatewayError::ClientBuild)?;

        Ok(Self {
            credentials,
            http,
            session_duration,
            refresh_buffer,
            state: RwLock::new(SessionState::default()),
        })
    }

    pub fn address(&self) -> &str {
        &self.credentials.address
    }

    pub fn serial(&self) -> &str {
        &self.credentials.serial
    }

    pub fn refresh_buffer(&self) -> Duration {
        self.refresh_buffer
    }

    /// Transport carrying the session cookie.
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.credentials.address, path)
    }

    /// True when the last authentication succeeded and the session is still valid.
    /// Never touches the network.
    pub async fn is_ready(&self) -> bool {
        let state = self.state.read().await;
        state.ready && state.session.is_valid(Instant::now(), self.refresh_buffer)
    }

    /// Current session snapshot.
    pub async fn session(&self) -> Session {
        self.state.read().await.session
    }

    /// Returns immediately while the session is valid, otherwise authenticates.
    ///
    /// The write lock is held across the handshake so concurrent callers wait
    /// for the in-flight attempt instead of starting their own.
    pub async fn ensure_authenticated(&self) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        if state.session.is_valid(Instant::now(), self.refresh_buffer) {
            return Ok(());
        }
        self.establish(&mut state).await
    }

    /// Runs the authentication protocol regardless of the current session.
    pub async fn authenticate(&self) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        self.establish(&mut state).await
    }

    async fn establish(&self, state: &mut SessionState) -> Result<(), GatewayError> {
        match self.handshake().await {
            Ok(()) => {
                state.session = Session::established(Instant::now() + self.session_duration);
                state.ready = true;
                info!(
                    address = %self.credentials.address,
                    expires_in_secs = self.session_duration.as_secs(),
                    "Gateway session established"
                );
                Ok(())
            }
            Err(e) => {
                state.session = Session::default();
                state.ready = false;
                warn!(
                    address = %self.credentials.address,
                    error = %e,
                    "Gateway authentication failed"
                );
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> Result<(), GatewayError> {
        let token = match &self.credentials.auth {
            GatewayAuth::Token(token) => {
                debug!("Using provided gateway token");
                token.clone()
            }
            GatewayAuth::Enlighten { username, password } => {
                debug!("Fetching gateway token from Enlighten");
                self.fetch_enlighten_token(username, password).await?
            }
        };
        self.check_token(&token).await
    }

    async fn check_token(&self, token: &str) -> Result<(), GatewayError> {
        let response = self
            .http
            .get(self.url(AUTH_CHECK_PATH))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| GatewayError::Transport {
                endpoint: "check_jwt",
                source,
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GatewayError::Authentication {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<TokenCheckResponse>(&body) {
            Ok(check) => debug!(
                message = %check.message,
                session_id = %check.session_id,
                "Gateway accepted token"
            ),
            Err(_) => debug!("Token check body was not JSON (older firmware)"),
        }
        Ok(())
    }

    async fn fetch_enlighten_token(
        &self,
        username: &str,
        password: &str,
    ) -> Result<String, GatewayError> {
        let urls = &self.credentials.enlighten;

        let login = self
            .http
            .post(&urls.login)
            .form(&[("user[email]", username), ("user[password]", password)])
            .send()
            .await
            .map_err(|e| GatewayError::TokenAcquisition(format!("login request failed: {e}")))?;

        let status = login.status();
        let body = login.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GatewayError::TokenAcquisition(format!(
                "login failed with status {}: {body}",
                status.as_u16()
            )));
        }
        let account: EnlightenLoginResponse = serde_json::from_str(&body).map_err(|e| {
            GatewayError::TokenAcquisition(format!("failed to decode login response: {e}"))
        })?;
        debug!(
            user_id = account.user_id,
            user_name = %account.user_name,
            "Enlighten login successful"
        );

        let response = self
            .http
            .get(&urls.token)
            .query(&[("serial_num", self.credentials.serial.as_str())])
            .send()
            .await
            .map_err(|e| GatewayError::TokenAcquisition(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GatewayError::TokenAcquisition(format!(
                "token request failed with status {}: {body}",
                status.as_u16()
            )));
        }

        let token = body.trim();
        if token.is_empty() {
            return Err(GatewayError::TokenAcquisition(
                "received empty token".to_string(),
            ));
        }
        debug!(serial = %self.credentials.serial, "Gateway token retrieved");
        Ok(token.to_string())
    }

    /// Pushes the expiry into the past as if the device session had lapsed.
    #[cfg(test)]
    pub(crate) async fn expire_now(&self) {
        let mut state = self.state.write().await;
        state.session.expires_at = Some(Instant::now());
    }
}
