//! Credentials and tokens.
//!
//! Access tokens are short-lived RS256 JWTs carrying the caller's role.
//! Refresh tokens are opaque random strings kept in storage and rotated on
//! every use: the presented token is revoked and its replacement records it
//! as `parent_token`.
use crate::errors::{ApiError, CampusError, StoreError};
use crate::jwks::JwksManager;
use crate::session::Principal;
use crate::settings::Settings;
use crate::storage::{NewUser, RefreshToken, Store, User};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64ct::Encoding;
use chrono::Utc;
use josekit::jwt::JwtPayload;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Instructor,
    Reporter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Instructor => "instructor",
            Role::Reporter => "reporter",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "instructor" => Ok(Role::Instructor),
            "reporter" => Ok(Role::Reporter),
            other => Err(format!("unknown role {other}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("refresh token is invalid, expired or revoked")]
    InvalidGrant,
    #[error("invalid access token: {0}")]
    InvalidToken(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Internal(#[from] CampusError),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => {
                ApiError::unauthorized("invalid_credentials", err.to_string())
            }
            AuthError::InvalidGrant => ApiError::unauthorized("invalid_grant", err.to_string()),
            AuthError::InvalidToken(_) => ApiError::unauthorized("invalid_token", err.to_string()),
            AuthError::Store(e) => e.into(),
            AuthError::Internal(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
}

pub fn hash_password(password: &str) -> Result<String, CampusError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CampusError::Other(format!("Password hashing failed: {}", e)))?
        .to_string();
    Ok(hash)
}

/// False for a wrong password and for an unparseable stored hash.
pub fn verify_password(password_hash: &str, password: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is not a valid PHC string");
            false
        }
    }
}

/// Hash checked against when the username is unknown.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password(&random_id()).unwrap_or_default())
}

pub fn random_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

pub async fn create_user(
    store: &dyn Store,
    username: &str,
    password: &str,
    role: Role,
    email: Option<String>,
) -> Result<User, CampusError> {
    let user = store
        .create_user(NewUser {
            id: random_id(),
            username: username.to_string(),
            password_hash: hash_password(password)?,
            role,
            email,
        })
        .await?;
    tracing::info!(user_id = %user.id, username, role = %role, "Created user");
    Ok(user)
}

pub fn issue_access_token(
    jwks: &JwksManager,
    settings: &Settings,
    user: &User,
) -> Result<String, CampusError> {
    let now = SystemTime::now();
    let ttl = Duration::from_secs(settings.auth.access_token_ttl_secs.max(0) as u64);

    let mut payload = JwtPayload::new();
    payload.set_issuer(settings.issuer());
    payload.set_subject(&user.id);
    payload.set_issued_at(&now);
    payload.set_expires_at(&(now + ttl));
    payload.set_claim("role", Some(json!(user.role.as_str())))?;
    payload.set_claim("username", Some(json!(user.username)))?;

    jwks.sign_jwt_rs256(&payload)
}

/// Signature, issuer and expiry are all checked.
pub fn verify_access_token(
    jwks: &JwksManager,
    settings: &Settings,
    token: &str,
) -> Result<Principal, AuthError> {
    let payload = jwks
        .verify_jwt_rs256(token)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

    if payload.issuer() != Some(settings.issuer().as_str()) {
        return Err(AuthError::InvalidToken("issuer mismatch".into()));
    }
    let expires_at = payload
        .expires_at()
        .ok_or_else(|| AuthError::InvalidToken("missing exp".into()))?;
    if expires_at <= SystemTime::now() {
        return Err(AuthError::InvalidToken("token expired".into()));
    }

    let user_id = payload
        .subject()
        .ok_or_else(|| AuthError::InvalidToken("missing sub".into()))?
        .to_string();
    let role = payload
        .claim("role")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<Role>().ok())
        .ok_or_else(|| AuthError::InvalidToken("missing or unknown role".into()))?;
    let username = payload
        .claim("username")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(Principal {
        user_id,
        username,
        role,
    })
}

async fn issue_refresh_token(
    store: &dyn Store,
    settings: &Settings,
    user_id: &str,
    parent_token: Option<String>,
) -> Result<RefreshToken, StoreError> {
    let now = Utc::now().timestamp();
    let token = RefreshToken {
        token: random_id(),
        user_id: user_id.to_string(),
        created_at: now,
        expires_at: now + settings.auth.refresh_token_ttl_secs,
        revoked: false,
        parent_token,
    };
    store.insert_refresh_token(token.clone()).await?;
    Ok(token)
}

async fn token_pair(
    store: &dyn Store,
    jwks: &JwksManager,
    settings: &Settings,
    user: &User,
    parent_token: Option<String>,
) -> Result<TokenPair, AuthError> {
    let access_token = issue_access_token(jwks, settings, user)?;
    let refresh = issue_refresh_token(store, settings, &user.id, parent_token).await?;
    Ok(TokenPair {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: settings.auth.access_token_ttl_secs,
        refresh_token: refresh.token,
    })
}

pub async fn login(
    store: &dyn Store,
    jwks: &JwksManager,
    settings: &Settings,
    username: &str,
    password: &str,
) -> Result<TokenPair, AuthError> {
    let user = match store.get_user_by_username(username).await? {
        Some(u) if u.enabled => u,
        _ => {
            // Same argon2 cost as a real check, so timing does not reveal usernames
            verify_password(dummy_hash(), password);
            return Err(AuthError::InvalidCredentials);
        }
    };
    if !verify_password(&user.password_hash, password) {
        tracing::info!(username, "Rejected login");
        return Err(AuthError::InvalidCredentials);
    }

    let pair = token_pair(store, jwks, settings, &user, None).await?;
    tracing::info!(user_id = %user.id, role = %user.role, "User logged in");
    Ok(pair)
}

/// Rotate-on-use: the presented token is revoked before the new pair is issued.
pub async fn refresh(
    store: &dyn Store,
    jwks: &JwksManager,
    settings: &Settings,
    refresh_token: &str,
) -> Result<TokenPair, AuthError> {
    let current = store
        .consume_refresh_token(refresh_token)
        .await?
        .ok_or(AuthError::InvalidGrant)?;
    let user = match store.get_user(&current.user_id).await? {
        Some(u) if u.enabled => u,
        _ => return Err(AuthError::InvalidGrant),
    };

    token_pair(store, jwks, settings, &user, Some(current.token)).await
}

/// Revoke one of the caller's refresh tokens. Unknown tokens and tokens
/// belonging to someone else are ignored.
pub async fn logout(
    store: &dyn Store,
    user_id: &str,
    refresh_token: &str,
) -> Result<(), AuthError> {
    match store.get_refresh_token(refresh_token).await? {
        Some(token) if token.user_id == user_id => {
            store.revoke_refresh_token(refresh_token).await?
        }
        Some(_) => tracing::warn!(user_id, "Refused to revoke another user's refresh token"),
        None => {}
    }
    Ok(())
}

/// Make sure the configured administrator exists; returns the generated
/// password when one had to be made up.
pub async fn ensure_admin(
    store: &dyn Store,
    settings: &Settings,
) -> Result<Option<String>, CampusError> {
    let username = settings.auth.admin_username.as_str();
    if store.get_user_by_username(username).await?.is_some() {
        return Ok(None);
    }

    let (password, generated) = match &settings.auth.admin_password {
        Some(p) => (p.clone(), false),
        None => (random_id(), true),
    };
    create_user(store, username, &password, Role::Admin, None).await?;
    Ok(generated.then_some(password))
}
