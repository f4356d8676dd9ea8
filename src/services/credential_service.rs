use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::utils::crypto::sha256_hex;
use crate::utils::time::Clock;
use crate::utils::token::generate_access_token;

const REALTIME_MODEL: &str = "gpt-4o-realtime-preview";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: String,
}

/// Ephemeral credentials handed to the candidate's client when a session opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub session_id: String,
    pub client_secret: String,
    pub expires_at: DateTime<Utc>,
    pub room_id: String,
    pub ice_servers: Vec<IceServer>,
}

#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self, session_id: &str) -> Result<SessionCredentials>;
}

fn default_ice_servers() -> Vec<IceServer> {
    vec![
        IceServer {
            urls: "stun:stun.l.google.com:19302".to_string(),
        },
        IceServer {
            urls: "stun:stun1.l.google.com:19302".to_string(),
        },
    ]
}

fn room_id(session_id: &str) -> String {
    format!("room_{}", session_id)
}

/// Self-contained issuer: a SHA-256 session token plus public STUN servers.
#[derive(Clone)]
pub struct LocalIssuer {
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl LocalIssuer {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { clock, ttl }
    }
}

#[async_trait]
impl CredentialIssuer for LocalIssuer {
    async fn issue(&self, session_id: &str) -> Result<SessionCredentials> {
        let now = self.clock.now();
        let seed = format!(
            "{}_{}_{}",
            session_id,
            now.timestamp(),
            generate_access_token(16)
        );
        Ok(SessionCredentials {
            session_id: session_id.to_string(),
            client_secret: sha256_hex(&seed),
            expires_at: now + self.ttl,
            room_id: room_id(session_id),
            ice_servers: default_ice_servers(),
        })
    }
}

/// OpenAI realtime client-secret issuer.
#[derive(Clone)]
pub struct RealtimeIssuer {
    client: Client,
    api_key: String,
    base_url: String,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl RealtimeIssuer {
    pub fn new(
        client: Client,
        api_key: String,
        base_url: String,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            clock,
            ttl,
        }
    }
}

#[async_trait]
impl CredentialIssuer for RealtimeIssuer {
    async fn issue(&self, session_id: &str) -> Result<SessionCredentials> {
        let payload = json!({
            "expires_after": {"anchor": "created_at", "seconds": self.ttl.num_seconds()},
            "session": {"type": "realtime", "model": REALTIME_MODEL},
            "metadata": {"session_id": session_id}
        });
        let res = self
            .client
            .post(format!("{}/v1/realtime/client_secrets", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(Error::UpstreamUnavailable(format!(
                "realtime issuer error {}: {}",
                status, text
            )));
        }

        let body: JsonValue = res.json().await?;
        let secret = body
            .get("value")
            .or_else(|| body.get("client_secret").and_then(|c| c.get("value")))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::UpstreamUnavailable("realtime issuer returned no secret".to_string())
            })?;
        let expires_at = body
            .get("expires_at")
            .and_then(|v| v.as_i64())
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(|| self.clock.now() + self.ttl);

        Ok(SessionCredentials {
            session_id: session_id.to_string(),
            client_secret: secret.to_string(),
            expires_at,
            room_id: room_id(session_id),
            ice_servers: default_ice_servers(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::ManualClock;

    #[tokio::test]
    async fn local_credentials_are_fresh_and_short_lived() {
        let clock = ManualClock::new(Utc::now());
        let issuer = LocalIssuer::new(Arc::new(clock.clone()), Duration::minutes(10));
        let a = issuer.issue("interview_1").await.unwrap();
        let b = issuer.issue("interview_1").await.unwrap();
        assert_ne!(a.client_secret, b.client_secret);
        assert_eq!(a.client_secret.len(), 64);
        assert_eq!(a.expires_at - clock.now(), Duration::minutes(10));
        assert_eq!(a.room_id, "room_interview_1");
        assert_eq!(a.ice_servers.len(), 2);
    }
}
