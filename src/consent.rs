//! Installed-app OAuth consent over a loopback redirect.
//!
//! `canned-reply --authorize` prints the Google consent URL, waits for the
//! browser to come back to `http://127.0.0.1:<port>/`, exchanges the code
//! (with PKCE) and writes the token file the responder runs on.

use std::collections::HashMap;

use chrono::Utc;
use oauth2::basic::BasicClient;
use oauth2::url::Url;
use oauth2::{AuthUrl, ClientId, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::auth::{ClientSecret, OAuthToken, TokenStore};
use crate::error::AuthError;

/// Read, send and label mail.
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// A consent URL plus the secrets needed to finish it.
pub struct ConsentRequest {
    url: String,
    redirect_uri: String,
    state: CsrfToken,
    verifier: PkceCodeVerifier,
}

impl ConsentRequest {
    pub fn new(secret: &ClientSecret, redirect_uri: &str) -> Result<Self, AuthError> {
        let invalid = |e: oauth2::url::ParseError| AuthError::Consent(format!("invalid OAuth URL: {e}"));
        let client = BasicClient::new(ClientId::new(secret.client_id.clone()))
            .set_auth_uri(AuthUrl::new(secret.auth_uri.clone()).map_err(invalid)?)
            .set_redirect_uri(RedirectUrl::new(redirect_uri.to_string()).map_err(invalid)?);

        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(GMAIL_MODIFY_SCOPE.to_string()))
            .set_pkce_challenge(challenge)
            // Google only returns a refresh token for offline access on a fresh consent.
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        Ok(Self {
            url: url.to_string(),
            redirect_uri: redirect_uri.to_string(),
            state,
            verifier,
        })
    }

    /// URL the user opens in a browser.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Authorization code from the redirect's request target, e.g. `/?state=..&code=..`.
    pub fn code_from_redirect(&self, target: &str) -> Result<String, AuthError> {
        let url = Url::parse("http://127.0.0.1/")
            .and_then(|base| base.join(target))
            .map_err(|e| AuthError::Consent(format!("malformed redirect: {e}")))?;
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        if let Some(error) = params.get("error") {
            return Err(AuthError::Consent(format!("consent denied: {error}")));
        }
        if params.get("state").map(String::as_str) != Some(self.state.secret().as_str()) {
            return Err(AuthError::Consent("state mismatch in redirect".into()));
        }
        params
            .get("code")
            .filter(|c| !c.is_empty())
            .cloned()
            .ok_or_else(|| AuthError::Consent("no authorization code in redirect".into()))
    }

    /// Trade the authorization code for tokens at the token endpoint.
    pub async fn exchange(
        &self,
        http: &Client,
        secret: &ClientSecret,
        code: &str,
    ) -> Result<OAuthToken, AuthError> {
        let resp = http
            .post(&secret.token_uri)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.expose_secret()),
                ("code_verifier", self.verifier.secret().as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Token exchange failed: {status}");
            return Err(AuthError::Consent(format!("token exchange failed ({status}): {body}")));
        }

        let tokens: ExchangeResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Consent(format!("unexpected token response: {e}")))?;
        let refresh_token = tokens.refresh_token.ok_or_else(|| {
            AuthError::Consent(
                "no refresh token returned; remove the app's access in your Google account and authorize again"
                    .into(),
            )
        })?;

        Ok(OAuthToken {
            access_token: SecretString::from(tokens.access_token),
            refresh_token: SecretString::from(refresh_token),
            expires_at: tokens
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        })
    }
}

#[derive(Deserialize)]
struct ExchangeResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Run the consent flow and save the resulting token to `store`.
///
/// The redirect comes back to `listener`. `show_url` receives the consent
/// URL to present to the user.
pub async fn authorize(
    http: &Client,
    secret: &ClientSecret,
    store: &TokenStore,
    listener: TcpListener,
    show_url: impl FnOnce(&str),
) -> Result<OAuthToken, AuthError> {
    let port = listener.local_addr()?.port();
    let redirect_uri = format!("http://127.0.0.1:{port}/");
    let request = ConsentRequest::new(secret, &redirect_uri)?;
    show_url(request.url());
    info!(port, "Waiting for the OAuth redirect");

    let code = loop {
        let (mut stream, peer) = listener.accept().await?;
        let target = read_request_target(&mut stream).await?;
        if !target.starts_with("/?") {
            debug!(%peer, "Ignoring unrelated request");
            respond(&mut stream, "404 Not Found", "Not found").await?;
            continue;
        }
        match request.code_from_redirect(&target) {
            Ok(code) => {
                respond(&mut stream, "200 OK", "Authorization complete. You can close this tab.").await?;
                break code;
            }
            Err(e) => {
                respond(&mut stream, "400 Bad Request", &e.to_string()).await?;
                return Err(e);
            }
        }
    };

    let token = request.exchange(http, secret, &code).await?;
    store.save(&token)?;
    info!(path = %store.path().display(), "OAuth token saved");
    Ok(token)
}

/// Request target of an HTTP/1.1 request line; drains the headers.
async fn read_request_target(stream: &mut TcpStream) -> Result<String, AuthError> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut header = String::new();
    loop {
        header.clear();
        let n = reader.read_line(&mut header).await?;
        if n == 0 || header == "\r\n" || header == "\n" {
            break;
        }
    }

    request_line
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| AuthError::Consent("malformed HTTP request from browser".into()))
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) -> Result<(), AuthError> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
