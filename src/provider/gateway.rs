//! REST gateway binding
//!
//! Talks to a provider gateway exposing:
//!
//! - `GET  {base}/regions/{mark}/{kind}?<filters>&pageToken=<t>` returning
//!   `{"items": [...], "nextPageToken": "..."}`
//! - `POST {base}/regions/{mark}/actions/{action}` with the request body
//! - `GET  {base}/regions` returning region metadata

use super::auth::TokenSource;
use super::http::HttpClient;
use super::{PageFetcher, ResourceApi, ResourceFilter};
use crate::context::Region;
use crate::reconcile::Request;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway endpoint and response conventions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Dot-separated path of the item array in a listing page
    #[serde(default = "default_items_key")]
    pub items_key: String,
    #[serde(default = "default_next_token_key")]
    pub next_token_key: String,
    #[serde(default = "default_page_token_param")]
    pub page_token_param: String,
}

fn default_items_key() -> String {
    "items".to_string()
}

fn default_next_token_key() -> String {
    "nextPageToken".to_string()
}

fn default_page_token_param() -> String {
    "pageToken".to_string()
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            items_key: default_items_key(),
            next_token_key: default_next_token_key(),
            page_token_param: default_page_token_param(),
        }
    }
}

/// One listing page
pub struct Page {
    pub items: Vec<Value>,
    pub next_token: Option<String>,
}

/// Gateway client implementing [`PageFetcher`] and [`ResourceApi`]
#[derive(Clone, Debug)]
pub struct Gateway {
    config: GatewayConfig,
    base: String,
    http: HttpClient,
    tokens: TokenSource,
}

impl Gateway {
    pub fn new(config: GatewayConfig, tokens: TokenSource) -> Result<Self> {
        let parsed = url::Url::parse(&config.base_url)
            .with_context(|| format!("Invalid gateway URL '{}'", config.base_url))?;
        if parsed.cannot_be_a_base() {
            anyhow::bail!("Gateway URL '{}' cannot be a base URL", config.base_url);
        }

        Ok(Self {
            base: config.base_url.trim_end_matches('/').to_string(),
            config,
            http: HttpClient::new()?,
            tokens,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// `{base}/regions`
    pub fn regions_url(&self) -> String {
        format!("{}/regions", self.base)
    }

    /// `{base}/regions/{mark}/{kind}`
    pub fn list_url(&self, region: &Region, kind: &str) -> String {
        format!(
            "{}/regions/{}/{}",
            self.base,
            urlencoding::encode(region.mark()),
            urlencoding::encode(kind)
        )
    }

    /// `{base}/regions/{mark}/actions/{action}`
    pub fn action_url(&self, region: &Region, action: &str) -> String {
        format!(
            "{}/regions/{}/actions/{}",
            self.base,
            urlencoding::encode(region.mark()),
            urlencoding::encode(action)
        )
    }

    pub async fn get(&self, url: &str, query: &[(String, String)]) -> Result<Value> {
        let token = self.tokens.token().await?;
        self.http.get(url, query, token.as_deref()).await
    }

    pub async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let token = self.tokens.token().await?;
        self.http.post(url, body, token.as_deref()).await
    }

    /// Fetch one listing page
    pub async fn fetch_page(
        &self,
        url: &str,
        filters: &[ResourceFilter],
        page_token: Option<&str>,
    ) -> Result<Page> {
        let mut query: Vec<(String, String)> = filters
            .iter()
            .map(|f| (f.param.clone(), f.values.join(",")))
            .collect();
        if let Some(token) = page_token {
            query.push((self.config.page_token_param.clone(), token.to_string()));
        }

        let response = self.get(url, &query).await?;
        let items = extract_items(&response, &self.config.items_key);
        let next_token = response
            .get(&self.config.next_token_key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        Ok(Page { items, next_token })
    }
}

/// Items at a dot-separated path; a bare array response is the item list
fn extract_items(response: &Value, path: &str) -> Vec<Value> {
    if let Some(items) = response.as_array() {
        return items.clone();
    }

    let mut current = response;
    for part in path.split('.').filter(|p| !p.is_empty()) {
        current = match current.get(part) {
            Some(v) => v,
            None => return vec![],
        };
    }

    current.as_array().cloned().unwrap_or_default()
}

impl PageFetcher for Gateway {
    fn fetch<'a>(
        &'a self,
        region: &'a Region,
        kind: &'static str,
        filters: &'a [ResourceFilter],
    ) -> BoxStream<'a, Result<Value>> {
        let url = self.list_url(region, kind);

        // State: `None` once the last page is in, else the token to send.
        let pages = stream::try_unfold(Some(None::<String>), move |state| {
            let url = url.clone();
            async move {
                let Some(page_token) = state else {
                    return Ok::<_, anyhow::Error>(None);
                };
                let page = self
                    .fetch_page(&url, filters, page_token.as_deref())
                    .await?;
                tracing::debug!("{} {}: page of {} items", region, kind, page.items.len());
                Ok(Some((page.items, page.next_token.map(Some))))
            }
        });

        pages
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<Value, anyhow::Error>)))
            .try_flatten()
            .boxed()
    }
}

#[async_trait]
impl ResourceApi for Gateway {
    async fn call(&self, region: &Region, request: &Request) -> Result<Value> {
        tracing::info!("{} {} ({})", region, request.action, request.id);
        let url = self.action_url(region, &request.action);
        self.post(&url, &request.body).await
    }
}
