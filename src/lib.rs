//! cloudrec - regional cloud resource enumeration, caching and declarative
//! reconciliation
//!
//! # Module Structure
//!
//! - [`context`] - region registry, accounts and the explicit call context
//! - [`resource`] - typed resources, field schemas and the regional enumerator
//! - [`cache`] - on-disk listing cache
//! - [`reconcile`] - differs producing minimal request deltas
//! - [`provision`] - get-or-create orchestration
//! - [`provider`] - provider traits and the REST gateway binding
//! - [`config`] - persistent configuration

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod provider;
pub mod provision;
pub mod reconcile;
pub mod resource;

pub use error::{Error, Result};
