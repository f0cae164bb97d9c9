//! Region metadata
//!
//! Lists the regions the gateway knows and back-fills their metadata into
//! the region registry.

use super::gateway::Gateway;
use crate::context::{Region, RegionMetadata};
use anyhow::Result;
use serde_json::Value;

/// Region information as returned by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub mark: String,
    pub display_name: Option<String>,
    pub endpoint: Option<String>,
    pub opt_in_status: Option<String>,
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

impl RegionInfo {
    fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            mark: str_field(value, &["RegionName", "regionName", "name"])?,
            display_name: str_field(value, &["DisplayName", "displayName", "description"]),
            endpoint: str_field(value, &["Endpoint", "endpoint"]),
            opt_in_status: str_field(value, &["OptInStatus", "optInStatus"]),
        })
    }

    /// Regions the account has not opted into are skipped
    fn is_usable(&self) -> bool {
        self.opt_in_status.as_deref() != Some("not-opted-in")
    }

    fn metadata(&self) -> RegionMetadata {
        RegionMetadata {
            display_name: self.display_name.clone(),
            opt_in_status: self.opt_in_status.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

/// Parse a `GET /regions` response
pub fn parse_regions(response: &Value) -> Vec<RegionInfo> {
    let items = response
        .get("regions")
        .or_else(|| response.get("Regions"))
        .unwrap_or(response);

    items
        .as_array()
        .map(|arr| arr.iter().filter_map(RegionInfo::from_value).collect())
        .unwrap_or_default()
}

/// List usable regions and back-fill their metadata
pub async fn list_regions(gateway: &Gateway) -> Result<Vec<Region>> {
    let response = gateway.get(&gateway.regions_url(), &[]).await?;

    let mut regions = Vec::new();
    for info in parse_regions(&response).into_iter().filter(RegionInfo::is_usable) {
        let region = Region::get(&info.mark)?;
        if let Err(e) = region.backfill(info.metadata()) {
            tracing::warn!("Skipping metadata for {}: {}", info.mark, e);
        }
        regions.push(region);
    }

    tracing::debug!("Gateway lists {} usable regions", regions.len());
    Ok(regions)
}
