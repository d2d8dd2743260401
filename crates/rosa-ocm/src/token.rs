//! Access tokens for the cluster-management service
//!
//! `OCM_TOKEN` may hold either an access token, used as-is, or an offline
//! refresh token issued by Red Hat SSO. Refresh tokens are exchanged for a
//! short-lived access token which is cached until shortly before it expires.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use rosa_common::{Error, Result};

/// Environment variable the token is read from
pub const TOKEN_ENV: &str = "OCM_TOKEN";
/// Default token endpoint of Red Hat SSO
pub const DEFAULT_TOKEN_URL: &str =
    "https://sso.redhat.com/auth/realms/redhat-external/protocol/openid-connect/token";
/// Client the refresh grant is issued under
const CLIENT_ID: &str = "cloud-services";
/// Refresh this long before the cached token expires
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// What kind of token a JWT is, per its `typ` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Usable directly as a bearer token
    Access,
    /// Must be exchanged for an access token first
    Refresh,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    typ: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

fn decode_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Classify a token by its claims.
///
/// Opaque tokens that are not JWTs are treated as access tokens.
pub fn token_kind(token: &str) -> TokenKind {
    match decode_claims(token).and_then(|c| c.typ) {
        Some(typ) if typ.eq_ignore_ascii_case("refresh") || typ.eq_ignore_ascii_case("offline") => {
            TokenKind::Refresh
        }
        _ => TokenKind::Access,
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let skew = chrono::Duration::from_std(EXPIRY_SKEW).unwrap_or_default();
        self.expires_at.map_or(true, |exp| now + skew < exp)
    }
}

/// Source of bearer tokens for API calls
#[derive(Debug)]
pub struct TokenSource {
    token: String,
    kind: TokenKind,
    token_url: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    /// Create a token source for `token`, exchanging it at `token_url` if needed
    pub fn new(
        token: impl Into<String>,
        token_url: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        let token = token.into();
        let kind = token_kind(&token);
        Self {
            token,
            kind,
            token_url: token_url.into(),
            http,
            cached: Mutex::new(None),
        }
    }

    /// Create a token source from `OCM_TOKEN`
    pub fn from_env(token_url: impl Into<String>, http: reqwest::Client) -> Result<Self> {
        let token = std::env::var(TOKEN_ENV).map_err(|_| {
            Error::internal_with_context("token", format!("{} is not set", TOKEN_ENV))
        })?;
        if token.trim().is_empty() {
            return Err(Error::internal_with_context(
                "token",
                format!("{} is empty", TOKEN_ENV),
            ));
        }
        Ok(Self::new(token.trim(), token_url, http))
    }

    /// Kind of the configured token
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Return a bearer token, exchanging the refresh token when needed
    pub async fn access_token(&self) -> Result<String> {
        if self.kind == TokenKind::Access {
            return Ok(self.token.clone());
        }

        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let fresh = self.exchange(now).await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<CachedToken> {
        debug!(url = %self.token_url, "exchanging refresh token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", CLIENT_ID),
                ("refresh_token", self.token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                Error::internal_with_context("token", format!("token exchange failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::internal_with_context(
                "token",
                format!("token exchange returned {}: {}", status.as_u16(), body),
            ));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            Error::internal_with_context("token", format!("invalid token response: {}", e))
        })?;

        let expires_at = body
            .expires_in
            .and_then(|s| i64::try_from(s).ok())
            .map(|s| now + chrono::Duration::seconds(s))
            .or_else(|| {
                decode_claims(&body.access_token)
                    .and_then(|c| c.exp)
                    .and_then(|exp| DateTime::from_timestamp(exp, 0))
            });

        Ok(CachedToken {
            value: body.access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::routing::post;
    use axum::{Form, Json, Router};

    fn jwt(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn classifies_tokens_by_typ_claim() {
        assert_eq!(
            token_kind(&jwt(serde_json::json!({"typ": "Offline"}))),
            TokenKind::Refresh
        );
        assert_eq!(
            token_kind(&jwt(serde_json::json!({"typ": "Refresh"}))),
            TokenKind::Refresh
        );
        assert_eq!(
            token_kind(&jwt(serde_json::json!({"typ": "Bearer"}))),
            TokenKind::Access
        );
        assert_eq!(token_kind("opaque-token"), TokenKind::Access);
    }

    #[test]
    fn cached_token_expires_with_skew() {
        let now = Utc::now();
        let token = CachedToken {
            value: "t".to_string(),
            expires_at: Some(now + chrono::Duration::seconds(10)),
        };
        assert!(!token.is_fresh(now));
        let token = CachedToken {
            value: "t".to_string(),
            expires_at: Some(now + chrono::Duration::seconds(300)),
        };
        assert!(token.is_fresh(now));
    }

    #[tokio::test]
    async fn access_tokens_are_used_directly() {
        let source = TokenSource::new("opaque", "http://127.0.0.1:1/token", reqwest::Client::new());
        assert_eq!(source.access_token().await.unwrap(), "opaque");
    }

    #[tokio::test]
    async fn refresh_tokens_are_exchanged_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/token",
            post(move |Form(form): Form<Vec<(String, String)>>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let grant = ("grant_type".to_string(), "refresh_token".to_string());
                    assert!(form.contains(&grant));
                    assert!(form.contains(&("client_id".to_string(), CLIENT_ID.to_string())));
                    Json(serde_json::json!({"access_token": "exchanged", "expires_in": 900}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let source = TokenSource::new(
            jwt(serde_json::json!({"typ": "Offline"})),
            format!("http://{}/token", addr),
            reqwest::Client::new(),
        );
        assert_eq!(source.kind(), TokenKind::Refresh);
        assert_eq!(source.access_token().await.unwrap(), "exchanged");
        assert_eq!(source.access_token().await.unwrap(), "exchanged");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_exchange_is_an_error() {
        let app = Router::new().route(
            "/token",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "invalid_grant") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let source = TokenSource::new(
            jwt(serde_json::json!({"typ": "Refresh"})),
            format!("http://{}/token", addr),
            reqwest::Client::new(),
        );
        let err = source.access_token().await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
