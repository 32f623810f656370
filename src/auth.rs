//! Authentication provider abstraction.
//!
//! Accounts, passwords and ID tokens are owned by an external identity
//! service. [`AuthProvider`] is the narrow surface the API needs: create an
//! account, sign in, and verify a bearer token. [`FirebaseAuth`] implements
//! it against the Identity Toolkit REST API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::AuthConfig;
use crate::http;

const IDENTITY_TOOLKIT_BASE: &str = "https://identitytoolkit.googleapis.com/v1";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email already registered")]
    EmailExists,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("rejected by auth provider: {0}")]
    Rejected(String),
    #[error("auth provider unavailable: {0}")]
    Unavailable(String),
    #[error("auth provider is disabled")]
    Disabled,
}

/// Identity extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthClaims {
    pub uid: String,
    pub email: Option<String>,
}

/// Tokens issued on sign-in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub uid: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Create an account and return its uid.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<String, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    async fn verify_token(&self, token: &str) -> Result<AuthClaims, AuthError>;
}

pub struct DisabledAuth;

#[async_trait]
impl AuthProvider for DisabledAuth {
    async fn sign_up(&self, _: &str, _: &str, _: &str) -> Result<String, AuthError> {
        Err(AuthError::Disabled)
    }
    async fn sign_in(&self, _: &str, _: &str) -> Result<AuthSession, AuthError> {
        Err(AuthError::Disabled)
    }
    async fn verify_token(&self, _: &str) -> Result<AuthClaims, AuthError> {
        Err(AuthError::Disabled)
    }
}

pub struct FirebaseAuth {
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    id_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

impl FirebaseAuth {
    pub fn new(config: &AuthConfig) -> anyhow::Result<Self> {
        Ok(Self {
            api_key: http::api_key(&config.api_key_env)?,
            client: http::client(config.timeout_secs)?,
        })
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, AuthError> {
        let url = format!("{}/accounts:{}", IDENTITY_TOOLKIT_BASE, method);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        let json: Value = response
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        if status.is_success() {
            return Ok(json);
        }
        if status.is_server_error() {
            return Err(AuthError::Unavailable(format!("HTTP {}", status)));
        }

        let message = json
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        Err(classify_error(message))
    }
}

/// Maps an Identity Toolkit error message (e.g. `"EMAIL_EXISTS"` or
/// `"WEAK_PASSWORD : Password should be ..."`) to an [`AuthError`].
fn classify_error(message: &str) -> AuthError {
    let code = message.split(':').next().unwrap_or("").trim();
    match code {
        "EMAIL_EXISTS" => AuthError::EmailExists,
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED" => {
            AuthError::InvalidCredentials
        }
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" => AuthError::InvalidToken,
        _ => AuthError::Rejected(message.to_string()),
    }
}

#[async_trait]
impl AuthProvider for FirebaseAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<String, AuthError> {
        let json = self
            .call(
                "signUp",
                json!({ "email": email, "password": password, "returnSecureToken": true }),
            )
            .await?;
        let created: SignInResponse =
            serde_json::from_value(json).map_err(|e| AuthError::Unavailable(e.to_string()))?;

        if let Err(e) = self
            .call(
                "update",
                json!({ "idToken": created.id_token, "displayName": display_name }),
            )
            .await
        {
            tracing::warn!(uid = %created.local_id, error = %e, "failed to set display name");
        }

        Ok(created.local_id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let json = self
            .call(
                "signInWithPassword",
                json!({ "email": email, "password": password, "returnSecureToken": true }),
            )
            .await?;
        let session: SignInResponse =
            serde_json::from_value(json).map_err(|e| AuthError::Unavailable(e.to_string()))?;

        Ok(AuthSession {
            uid: session.local_id,
            id_token: session.id_token,
            refresh_token: session.refresh_token,
            expires_in: session
                .expires_in
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
        })
    }

    async fn verify_token(&self, token: &str) -> Result<AuthClaims, AuthError> {
        let json = self.call("lookup", json!({ "idToken": token })).await?;
        let user = json
            .pointer("/users/0")
            .ok_or(AuthError::InvalidToken)?;
        let uid = user
            .get("localId")
            .and_then(|v| v.as_str())
            .ok_or(AuthError::InvalidToken)?;

        Ok(AuthClaims {
            uid: uid.to_string(),
            email: user
                .get("email")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }
}

pub fn create_auth_provider(config: &AuthConfig) -> anyhow::Result<Box<dyn AuthProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledAuth)),
        "firebase" => Ok(Box::new(FirebaseAuth::new(config)?)),
        other => anyhow::bail!("Unknown auth provider: {}", other),
    }
}
