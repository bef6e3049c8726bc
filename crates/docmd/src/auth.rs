//! Stored OAuth token for the Drive API.
//!
//! The token file holds the access/refresh token pair and the installed-app
//! client credentials it was issued for. An expired access token is refreshed
//! through the refresh-token grant and written back.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use docmd_core::{Authenticator, RemoteError, write_private_file};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const EXPIRY_MARGIN_SECS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    /// `None` means the token never expires
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "zero_time_as_none"
    )]
    pub expiry: Option<DateTime<Utc>>,
}

/// Go's oauth2 writes the zero time for tokens without an expiry.
fn zero_time_as_none<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    use chrono::Datelike;
    let raw: Option<DateTime<Utc>> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|time| time.year() > 1))
}

impl OAuthToken {
    /// Whether the access token must be refreshed before use at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_MARGIN_SECS) <= now,
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleCredentials {
    pub installed: InstalledCredentials,
}

/// Contents of `token.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAuth {
    pub token: OAuthToken,
    pub credentials: GoogleCredentials,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Token-file backed authenticator.
pub struct TokenFile {
    path: PathBuf,
    /// Loaded on first use
    cached: Mutex<Option<StoredAuth>>,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<StoredAuth, RemoteError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            RemoteError::Auth(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            RemoteError::Auth(format!("cannot parse {}: {}", self.path.display(), e))
        })
    }

    pub fn save(&self, auth: &StoredAuth) -> io::Result<()> {
        let contents = serde_json::to_vec_pretty(auth).map_err(io::Error::other)?;
        write_private_file(&self.path, &contents)
    }

    /// A usable access token, refreshing and persisting it when expired.
    pub async fn access_token(&self, http: &reqwest::Client) -> Result<String, RemoteError> {
        let mut cached = self.cached.lock().await;
        let mut auth = match cached.take() {
            Some(auth) => auth,
            None => self.load()?,
        };

        if auth.token.is_expired(Utc::now()) {
            debug!("Access token expired, refreshing");
            auth.token = refresh(http, &auth).await?;
            if let Err(e) = self.save(&auth) {
                warn!("Failed to save refreshed token: {}", e);
            }
        }

        let token = auth.token.access_token.clone();
        *cached = Some(auth);
        Ok(token)
    }
}

impl Authenticator for TokenFile {
    fn token_exists(&self) -> bool {
        self.path.is_file()
    }
}

async fn refresh(http: &reqwest::Client, auth: &StoredAuth) -> Result<OAuthToken, RemoteError> {
    if auth.token.refresh_token.is_empty() {
        return Err(RemoteError::Auth(
            "access token expired and no refresh token is stored".into(),
        ));
    }

    let params = [
        ("client_id", auth.credentials.installed.client_id.as_str()),
        ("client_secret", auth.credentials.installed.client_secret.as_str()),
        ("refresh_token", auth.token.refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ];
    let response = http
        .post(TOKEN_ENDPOINT)
        .form(&params)
        .send()
        .await
        .map_err(|e| RemoteError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RemoteError::Auth(format!(
            "token refresh returned {}: {}",
            status.as_u16(),
            body.trim()
        )));
    }

    let refreshed: RefreshResponse = response
        .json()
        .await
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
    Ok(apply_refresh(&auth.token, refreshed, Utc::now()))
}

fn apply_refresh(old: &OAuthToken, refreshed: RefreshResponse, now: DateTime<Utc>) -> OAuthToken {
    OAuthToken {
        access_token: refreshed.access_token,
        token_type: refreshed.token_type.unwrap_or_else(|| old.token_type.clone()),
        // Google only returns a new refresh token when it rotates one
        refresh_token: refreshed
            .refresh_token
            .unwrap_or_else(|| old.refresh_token.clone()),
        expiry: refreshed.expires_in.map(|secs| now + Duration::seconds(secs)),
    }
}
