use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::database::Store;
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::admin::Admin;
use crate::utils::crypto::{hash_password, verify_password};
use crate::utils::time::Clock;
use crate::utils::token::{issue_interview_token, IssuedToken};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

/// Admin sessions (HS256 JWT) and interview-join tokens.
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    jwt_secret: String,
    session_ttl: Duration,
    interview_token_ttl: Duration,
    bootstrap_email: String,
    bootstrap_password: Option<String>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            store,
            clock,
            jwt_secret: config.jwt_secret.clone(),
            session_ttl: Duration::minutes(config.admin_session_minutes),
            interview_token_ttl: Duration::hours(config.token_ttl_hours),
            bootstrap_email: config.admin_email.clone(),
            bootstrap_password: config.admin_password.clone(),
        }
    }

    pub fn interview_token_ttl(&self) -> Duration {
        self.interview_token_ttl
    }

    /// Mints a fresh single-use join token expiring one TTL from now.
    pub fn new_interview_token(&self) -> IssuedToken {
        issue_interview_token(self.clock.now(), self.interview_token_ttl)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let admin = self
            .store
            .find_admin_by_email(email.trim())
            .await?
            .filter(|a| a.is_active)
            .ok_or_else(|| Error::Unauthorized("invalid credentials".to_string()))?;
        if !verify_password(password, &admin.password_hash)? {
            tracing::warn!(admin_id = %admin.id, "admin login rejected");
            return Err(Error::Unauthorized("invalid credentials".to_string()));
        }

        let now = self.clock.now();
        let expires_at = now + self.session_ttl;
        let claims = Claims {
            sub: admin.id.to_string(),
            exp: expires_at.timestamp() as usize,
            role: Some(ADMIN_ROLE.to_string()),
        };
        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| Error::Internal(format!("failed to sign session token: {}", e)))?;

        self.store.record_admin_login(admin.id, now).await?;
        tracing::info!(admin_id = %admin.id, "admin logged in");
        Ok(LoginResponse {
            access_token,
            token_type: "bearer",
            expires_at,
        })
    }

    /// Validates signature and role; expiry is checked against the service clock.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| Error::Unauthorized("invalid_token".to_string()))?;

        if (data.claims.exp as i64) <= self.clock.now().timestamp() {
            return Err(Error::Unauthorized("token_expired".to_string()));
        }
        let role = data.claims.role.clone().unwrap_or_default();
        if !role.eq_ignore_ascii_case(ADMIN_ROLE) {
            return Err(Error::Forbidden("forbidden".to_string()));
        }
        Ok(data.claims)
    }

    pub async fn current_admin(&self, claims: &Claims) -> Result<Admin> {
        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| Error::Unauthorized("invalid_token".to_string()))?;
        let admin = self
            .store
            .get_admin(id)
            .await?
            .ok_or_else(|| Error::Unauthorized("unknown admin".to_string()))?;
        Ok(admin)
    }

    /// Sessions are stateless; the client drops its token and it lapses at `exp`.
    pub fn logout(&self, claims: &Claims) {
        tracing::info!(admin_id = %claims.sub, "admin logged out");
    }

    /// One-shot setup: creates the configured admin, refusing once it exists.
    pub async fn init_admin(&self) -> Result<Admin> {
        let password = self.bootstrap_password.as_deref().ok_or_else(|| {
            Error::BadRequest("ADMIN_PASSWORD is not configured".to_string())
        })?;
        if self
            .store
            .find_admin_by_email(&self.bootstrap_email)
            .await?
            .is_some()
        {
            return Err(Error::InvalidState("admin already initialized".to_string()));
        }
        self.ensure_admin(&self.bootstrap_email, password).await
    }

    /// Seeds the bootstrap admin when it does not exist yet.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<Admin> {
        let email = email.trim().to_lowercase();
        if let Some(existing) = self.store.find_admin_by_email(&email).await? {
            return Ok(existing);
        }
        let admin = Admin {
            id: Uuid::new_v4(),
            email,
            password_hash: hash_password(password)?,
            is_active: true,
            created_at: self.clock.now(),
            last_login_at: None,
        };
        let admin = self.store.insert_admin(admin).await?;
        tracing::info!(admin_id = %admin.id, email = %admin.email, "bootstrap admin created");
        Ok(admin)
    }
}
