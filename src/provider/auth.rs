//! Gateway authentication
//!
//! Bearer tokens come either from a fixed value (config or environment) or
//! from Google Application Default Credentials via `gcp_auth`.

use anyhow::{Context, Result};
use gcp_auth::{Token, TokenProvider};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scopes requested when the config names none
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Environment variable holding a static gateway token
pub const TOKEN_ENV: &str = "CLOUDREC_GATEWAY_TOKEN";

/// Application Default Credentials, keeping the last token until it expires
#[derive(Clone)]
pub struct AdcTokens {
    provider: Arc<dyn TokenProvider>,
    scopes: Vec<String>,
    current: Arc<RwLock<Option<Arc<Token>>>>,
}

impl AdcTokens {
    pub async fn new(scopes: &[String]) -> Result<Self> {
        let provider = gcp_auth::provider().await.context(
            "Failed to initialize Application Default Credentials. Run 'gcloud auth application-default login'",
        )?;

        let scopes = if scopes.is_empty() {
            DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
        } else {
            scopes.to_vec()
        };

        Ok(Self {
            provider,
            scopes,
            current: Arc::new(RwLock::new(None)),
        })
    }

    pub async fn token(&self) -> Result<String> {
        if let Some(token) = self.current.read().await.as_ref() {
            if !token.has_expired() {
                return Ok(token.as_str().to_string());
            }
            tracing::debug!("Gateway token expired at {}", token.expires_at());
        }

        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        let token = self
            .provider
            .token(&scopes)
            .await
            .context("Failed to get gateway access token")?;
        tracing::debug!("New gateway token, valid until {}", token.expires_at());

        let value = token.as_str().to_string();
        *self.current.write().await = Some(token);
        Ok(value)
    }
}

/// Where the gateway's bearer token comes from
#[derive(Clone)]
pub enum TokenSource {
    /// No `Authorization` header
    Anonymous,
    Static(String),
    Adc(AdcTokens),
}

impl TokenSource {
    /// Explicit token, then `CLOUDREC_GATEWAY_TOKEN`, then ADC
    pub async fn resolve(explicit: Option<&str>, use_adc: bool, scopes: &[String]) -> Result<Self> {
        if let Some(token) = explicit.filter(|t| !t.is_empty()) {
            return Ok(TokenSource::Static(token.to_string()));
        }
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.is_empty() {
                return Ok(TokenSource::Static(token));
            }
        }
        if use_adc {
            return Ok(TokenSource::Adc(AdcTokens::new(scopes).await?));
        }
        Ok(TokenSource::Anonymous)
    }

    pub async fn token(&self) -> Result<Option<String>> {
        match self {
            TokenSource::Anonymous => Ok(None),
            TokenSource::Static(token) => Ok(Some(token.clone())),
            TokenSource::Adc(adc) => adc.token().await.map(Some),
        }
    }
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Anonymous => write!(f, "Anonymous"),
            TokenSource::Static(_) => write!(f, "Static(***)"),
            TokenSource::Adc(adc) => write!(f, "Adc({})", adc.scopes.join(" ")),
        }
    }
}
