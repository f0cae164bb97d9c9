//! Provider boundary
//!
//! The engine talks to a cloud through two traits: [`PageFetcher`] for
//! listings and [`ResourceApi`] for mutating calls. Payloads are opaque JSON.
//!
//! # Module Structure
//!
//! - [`auth`] - bearer token sources (static or Application Default Credentials)
//! - [`http`] - HTTP client wrapper used by the gateway
//! - [`gateway`] - REST gateway implementing both traits
//! - [`regions`] - region metadata listing

pub mod auth;
pub mod gateway;
pub mod http;
pub mod regions;

pub use gateway::{Gateway, GatewayConfig};

use crate::context::Region;
use crate::reconcile::Request;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filter for listings
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceFilter {
    pub param: String,
    pub values: Vec<String>,
}

impl ResourceFilter {
    pub fn new(param: &str, values: Vec<String>) -> Self {
        Self {
            param: param.to_string(),
            values,
        }
    }

    /// Parse `param=v1,v2`
    pub fn parse(spec: &str) -> Option<Self> {
        let (param, values) = spec.split_once('=')?;
        let param = param.trim();
        if param.is_empty() {
            return None;
        }
        let values = values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        Some(Self::new(param, values))
    }
}

/// Lists raw objects of one kind in one region.
///
/// The returned stream owns the provider's page-token loop and yields objects
/// in page order.
pub trait PageFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        region: &'a Region,
        kind: &'static str,
        filters: &'a [ResourceFilter],
    ) -> BoxStream<'a, anyhow::Result<Value>>;
}

/// Issues one mutating request and returns the raw response
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn call(&self, region: &Region, request: &Request) -> anyhow::Result<Value>;
}

/// Per-object second call filling in full information
#[async_trait]
pub trait Enricher<R>: Send + Sync {
    async fn enrich(&self, region: &Region, object: &mut R) -> anyhow::Result<()>;
}

/// Per-object tag lookup
#[async_trait]
pub trait TagSource<R>: Send + Sync {
    async fn tags(&self, region: &Region, object: &mut R) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_filter_spec() {
        let filter = ResourceFilter::parse("vpc-id = vpc-1, vpc-2").unwrap();
        assert_eq!(filter.param, "vpc-id");
        assert_eq!(filter.values, vec!["vpc-1", "vpc-2"]);

        assert!(ResourceFilter::parse("novalue").is_none());
        assert!(ResourceFilter::parse("=x").is_none());
    }
}
