//! Region registry
//!
//! Regions are interned by mark: [`Region::get`] hands out the same instance
//! for the same mark for the lifetime of the process, so two `Region`s compare
//! equal exactly when they point at the same registry entry.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

/// Provider-returned region metadata, back-filled lazily
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionMetadata {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub opt_in_status: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug)]
struct RegionInner {
    mark: String,
    metadata: RwLock<RegionMetadata>,
}

/// Handle to an interned region
#[derive(Debug, Clone)]
pub struct Region(Arc<RegionInner>);

static REGISTRY: OnceLock<Mutex<HashMap<String, Region>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, Region>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

impl Region {
    /// Look up (or register) the region for `mark`
    pub fn get(mark: &str) -> Result<Region> {
        if mark.is_empty() || mark.chars().any(char::is_whitespace) {
            return Err(Error::invalid(format!("invalid region mark: '{}'", mark)));
        }

        let mut regions = registry().lock().unwrap_or_else(|e| e.into_inner());
        let region = regions
            .entry(mark.to_string())
            .or_insert_with(|| {
                tracing::debug!("Registering region {}", mark);
                Region(Arc::new(RegionInner {
                    mark: mark.to_string(),
                    metadata: RwLock::new(RegionMetadata::default()),
                }))
            })
            .clone();
        Ok(region)
    }

    pub fn mark(&self) -> &str {
        &self.0.mark
    }

    /// Snapshot of the current metadata
    pub fn metadata(&self) -> RegionMetadata {
        self.0
            .metadata
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Fill in metadata fields that are still unknown.
    ///
    /// A display name that contradicts an already known one is rejected.
    pub fn backfill(&self, incoming: RegionMetadata) -> Result<()> {
        let mut current = self.0.metadata.write().unwrap_or_else(|e| e.into_inner());

        if let (Some(known), Some(new)) = (&current.display_name, &incoming.display_name) {
            if known != new {
                return Err(Error::invalid(format!(
                    "region {}: display name '{}' conflicts with '{}'",
                    self.mark(),
                    new,
                    known
                )));
            }
        }

        if current.display_name.is_none() {
            current.display_name = incoming.display_name;
        }
        if current.opt_in_status.is_none() {
            current.opt_in_status = incoming.opt_in_status;
        }
        if current.endpoint.is_none() {
            current.endpoint = incoming.endpoint;
        }
        Ok(())
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Region {}

impl std::hash::Hash for Region {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.mark.hash(state);
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mark())
    }
}

impl Serialize for Region {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.mark())
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let mark = String::deserialize(deserializer)?;
        Region::get(&mark).map_err(serde::de::Error::custom)
    }
}
