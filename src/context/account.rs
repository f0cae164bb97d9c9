//! Accounts and the explicit call context

use super::region::Region;
use crate::error::{Error, Result};
use std::sync::{Arc, RwLock};

/// An account the engine can enumerate and provision against
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    /// Used as the cache namespace directory
    pub name: String,
    regions: Vec<Region>,
    default_region: Option<Region>,
}

impl Account {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            regions: Vec::new(),
            default_region: None,
        }
    }

    pub fn with_regions<I>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = Region>,
    {
        for region in regions {
            self.add_region(region);
        }
        self
    }

    /// Add a managed region; re-adding a known mark is a no-op
    pub fn add_region(&mut self, region: Region) {
        if !self.regions.contains(&region) {
            self.regions.push(region);
        }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn set_default_region(&mut self, region: Region) {
        self.default_region = Some(region);
    }

    /// Explicit default, else the first managed region
    pub fn default_region(&self) -> Option<&Region> {
        self.default_region.as_ref().or_else(|| self.regions.first())
    }
}

/// Account + region every engine call runs against
#[derive(Debug, Clone)]
pub struct Context {
    pub account: Arc<Account>,
    pub region: Region,
}

impl Context {
    pub fn new(account: Arc<Account>, region: Region) -> Self {
        Self { account, region }
    }

    /// Same account, another region
    pub fn with_region(&self, region: Region) -> Self {
        Self {
            account: Arc::clone(&self.account),
            region,
        }
    }

    /// Build a context from the process-wide active account and region
    pub fn active() -> Result<Self> {
        let account = active_account()
            .ok_or_else(|| Error::invalid("no active account has been set"))?;
        let region = active_region()
            .or_else(|| account.default_region().cloned())
            .ok_or_else(|| Error::invalid("no active region has been set"))?;
        Ok(Self { account, region })
    }
}

static ACTIVE_ACCOUNT: RwLock<Option<Arc<Account>>> = RwLock::new(None);
static ACTIVE_REGION: RwLock<Option<Region>> = RwLock::new(None);

pub fn active_account() -> Option<Arc<Account>> {
    ACTIVE_ACCOUNT
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

pub fn set_active_account(account: Account) -> Arc<Account> {
    tracing::info!("Setting active account to {} ({})", account.name, account.id);
    let account = Arc::new(account);
    *ACTIVE_ACCOUNT.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&account));
    account
}

pub fn active_region() -> Option<Region> {
    ACTIVE_REGION
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

pub fn set_active_region(region: Region) {
    tracing::info!("Setting active region to {}", region);
    *ACTIVE_REGION.write().unwrap_or_else(|e| e.into_inner()) = Some(region);
}

/// Set the active region from a raw mark
pub fn set_active_region_mark(mark: &str) -> Result<Region> {
    let region = Region::get(mark)?;
    set_active_region(region.clone());
    Ok(region)
}
