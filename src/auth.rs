//! OAuth2 credentials for the mailbox API.
//!
//! Loads the stored token, refreshes it when it expires, and writes the
//! refreshed token back. The first token comes from [`crate::consent`].
//!
//! A rejected grant is fatal to the poll loop; an unreachable or failing
//! token endpoint ([`AuthError::Http`]) is retried on the next tick.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// Google OAuth2 token endpoint, used when the client secret names none.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Google OAuth2 consent endpoint, used when the client secret names none.
pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Refresh this long before the recorded expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// An access/refresh token pair with expiry tracking.
#[derive(Debug, Clone)]
pub struct OAuthToken {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    /// `None` means unknown; treated as expired.
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => now + chrono::Duration::seconds(EXPIRY_SKEW_SECS) >= at,
            None => true,
        }
    }
}

/// On-disk token layout.
///
/// Also reads the `token`/`expiry` and `token_expiry` spellings written by
/// Google's Python client libraries, so an existing credential file works.
#[derive(Serialize, Deserialize)]
struct TokenFile {
    #[serde(default, alias = "token")]
    access_token: String,
    refresh_token: String,
    #[serde(default, alias = "expiry", alias = "token_expiry")]
    expires_at: Option<DateTime<Utc>>,
}

/// Reads and writes the token file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<OAuthToken, AuthError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AuthError::MissingToken {
                    path: self.path.display().to_string(),
                    hint: "run `canned-reply --authorize` to complete the OAuth consent flow".into(),
                }
            } else {
                AuthError::Io(e)
            }
        })?;
        let file: TokenFile = serde_json::from_str(&raw).map_err(|e| AuthError::Unreadable {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        // Without an access token the expiry is meaningless; force a refresh.
        let expires_at = file.expires_at.filter(|_| !file.access_token.is_empty());
        Ok(OAuthToken {
            access_token: SecretString::from(file.access_token),
            refresh_token: SecretString::from(file.refresh_token),
            expires_at,
        })
    }

    pub fn save(&self, token: &OAuthToken) -> Result<(), AuthError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let file = TokenFile {
            access_token: token.access_token.expose_secret().to_string(),
            refresh_token: token.refresh_token.expose_secret().to_string(),
            expires_at: token.expires_at,
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| AuthError::Unreadable {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(&self.path, json)?;
        restrict_permissions(&self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), AuthError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), AuthError> {
    Ok(())
}

/// OAuth client credentials from Google's client secret JSON.
#[derive(Debug, Clone)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: SecretString,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecretSection>,
    web: Option<ClientSecretSection>,
}

#[derive(Deserialize)]
struct ClientSecretSection {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

impl ClientSecret {
    /// Load an `installed` or `web` client secret file.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let unreadable = |reason: String| AuthError::Unreadable {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        Self::parse(&raw).map_err(unreadable)
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let file: ClientSecretFile = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let section = file
            .installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" section".to_string())?;
        Ok(Self {
            client_id: section.client_id,
            client_secret: SecretString::from(section.client_secret),
            auth_uri: section
                .auth_uri
                .unwrap_or_else(|| DEFAULT_AUTH_URI.to_string()),
            token_uri: section
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        })
    }
}

/// Hands out valid access tokens, refreshing through the token endpoint.
pub struct Authenticator {
    http: Client,
    store: TokenStore,
    secret: ClientSecret,
    current: Mutex<Option<OAuthToken>>,
}

impl Authenticator {
    pub fn new(http: Client, store: TokenStore, secret: ClientSecret) -> Self {
        Self {
            http,
            store,
            secret,
            current: Mutex::new(None),
        }
    }

    /// A non-expired access token.
    pub async fn access_token(&self) -> Result<SecretString, AuthError> {
        let mut current = self.current.lock().await;
        let token = match current.take() {
            Some(token) => token,
            None => self.store.load()?,
        };

        let token = if token.is_expired() {
            debug!("Access token expired, refreshing");
            let fresh = self.refresh(&token).await?;
            if let Err(e) = self.store.save(&fresh) {
                warn!(path = %self.store.path().display(), error = %e, "Failed to persist refreshed token");
            }
            info!("Access token refreshed");
            fresh
        } else {
            token
        };

        let access = token.access_token.clone();
        *current = Some(token);
        Ok(access)
    }

    async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken, AuthError> {
        let resp = self
            .http
            .post(&self.secret.token_uri)
            .form(&[
                ("client_id", self.secret.client_id.as_str()),
                ("client_secret", self.secret.client_secret.expose_secret()),
                ("refresh_token", token.refresh_token.expose_secret()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        let status = resp.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Http(format!("{status}: {body}")));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        if !status.is_success() {
            let reason = body
                .get("error_description")
                .and_then(|v| v.as_str())
                .or_else(|| body.get("error").and_then(|v| v.as_str()))
                .unwrap_or("unknown error");
            return Err(AuthError::RefreshRejected(format!("{status}: {reason}")));
        }

        parse_refresh_response(&body, token, Utc::now())
    }
}

/// Build the refreshed token from a token endpoint response.
///
/// The refresh token is only rotated when the response carries a new one.
fn parse_refresh_response(
    body: &serde_json::Value,
    previous: &OAuthToken,
    now: DateTime<Utc>,
) -> Result<OAuthToken, AuthError> {
    let access_token = body
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AuthError::RefreshRejected("missing access_token in response".into()))?;
    let expires_in = body
        .get("expires_in")
        .and_then(|v| v.as_i64())
        .unwrap_or(3600);
    let refresh_token = match body.get("refresh_token").and_then(|v| v.as_str()) {
        Some(rotated) => SecretString::from(rotated.to_string()),
        None => previous.refresh_token.clone(),
    };

    Ok(OAuthToken {
        access_token: SecretString::from(access_token.to_string()),
        refresh_token,
        expires_at: Some(now + chrono::Duration::seconds(expires_in)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: Option<DateTime<Utc>>) -> OAuthToken {
        OAuthToken {
            access_token: SecretString::from("ya29.access".to_string()),
            refresh_token: SecretString::from("1//refresh".to_string()),
            expires_at,
        }
    }

    #[test]
    fn expiry_uses_skew() {
        let now = Utc::now();
        assert!(token(None).is_expired_at(now));
        assert!(token(Some(now + chrono::Duration::seconds(30))).is_expired_at(now));
        assert!(!token(Some(now + chrono::Duration::seconds(600))).is_expired_at(now));
    }

    #[test]
    fn token_store_roundtrip_restricts_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("creds").join("token.json"));
        let expires = Utc::now() + chrono::Duration::hours(1);
        store.save(&token(Some(expires))).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.access_token.expose_secret(), "ya29.access");
        assert_eq!(loaded.refresh_token.expose_secret(), "1//refresh");
        assert_eq!(
            loaded.expires_at.map(|t| t.timestamp()),
            Some(expires.timestamp())
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn missing_token_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load(), Err(AuthError::MissingToken { .. })));
    }

    #[test]
    fn client_secret_installed_section() {
        let secret = ClientSecret::parse(
            r#"{"installed":{"client_id":"cid.apps.googleusercontent.com","client_secret":"shh","token_uri":"https://example.test/token"}}"#,
        )
        .unwrap();
        assert_eq!(secret.client_id, "cid.apps.googleusercontent.com");
        assert_eq!(secret.client_secret.expose_secret(), "shh");
        assert_eq!(secret.token_uri, "https://example.test/token");
    }

    #[test]
    fn client_secret_web_section_defaults_token_uri() {
        let secret =
            ClientSecret::parse(r#"{"web":{"client_id":"cid","client_secret":"shh"}}"#).unwrap();
        assert_eq!(secret.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(secret.auth_uri, DEFAULT_AUTH_URI);
    }

    #[test]
    fn google_library_token_files_load() {
        let dir = tempfile::tempdir().unwrap();

        let authorized_user = dir.path().join("authorized_user.json");
        std::fs::write(
            &authorized_user,
            r#"{"type":"authorized_user","client_id":"cid","client_secret":"shh","refresh_token":"1//refresh"}"#,
        )
        .unwrap();
        let loaded = TokenStore::new(&authorized_user).load().unwrap();
        assert_eq!(loaded.refresh_token.expose_secret(), "1//refresh");
        assert!(loaded.is_expired());

        let storage = dir.path().join("storage.json");
        std::fs::write(
            &storage,
            r#"{"access_token":"ya29.old","refresh_token":"1//refresh","token_expiry":"2099-01-01T00:00:00Z","token_uri":"https://oauth2.googleapis.com/token"}"#,
        )
        .unwrap();
        let loaded = TokenStore::new(&storage).load().unwrap();
        assert_eq!(loaded.access_token.expose_secret(), "ya29.old");
        assert!(!loaded.is_expired());

        let google_auth = dir.path().join("token.json");
        std::fs::write(
            &google_auth,
            r#"{"token":"ya29.new","refresh_token":"1//refresh","expiry":"2099-01-01T00:00:00.123456Z"}"#,
        )
        .unwrap();
        let loaded = TokenStore::new(&google_auth).load().unwrap();
        assert_eq!(loaded.access_token.expose_secret(), "ya29.new");
        assert!(!loaded.is_expired());
    }

    #[test]
    fn client_secret_without_section_fails() {
        assert!(ClientSecret::parse(r#"{"other":{}}"#).is_err());
    }

    #[test]
    fn refresh_response_keeps_refresh_token_unless_rotated() {
        let now = Utc::now();
        let previous = token(None);
        let body = serde_json::json!({"access_token": "ya29.new", "expires_in": 1800});
        let fresh = parse_refresh_response(&body, &previous, now).unwrap();
        assert_eq!(fresh.access_token.expose_secret(), "ya29.new");
        assert_eq!(fresh.refresh_token.expose_secret(), "1//refresh");
        assert_eq!(fresh.expires_at, Some(now + chrono::Duration::seconds(1800)));

        let rotated = serde_json::json!({"access_token": "a", "refresh_token": "1//rotated"});
        let fresh = parse_refresh_response(&rotated, &previous, now).unwrap();
        assert_eq!(fresh.refresh_token.expose_secret(), "1//rotated");
    }

    #[test]
    fn refresh_response_without_access_token_is_rejected() {
        let body = serde_json::json!({"error": "invalid_grant"});
        assert!(parse_refresh_response(&body, &token(None), Utc::now()).is_err());
    }
}
