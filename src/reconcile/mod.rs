//! Declarative reconciliation
//!
//! A differ compares a *current* object with a *desired* one of the same kind
//! and produces the minimal [`Delta`] of requests that converges them.
//!
//! - [`entries`] - generic child-entry partitioning by natural key
//! - [`delta`] - the request and delta types handed to the provisioner

mod delta;
mod entries;

pub use delta::{Delta, Request};
pub use entries::{diff_entries, DiffPolicy, Entry, EntryDiff};

use crate::error::Result;
use crate::resource::CloudResource;

/// Kinds that can be converged in place
pub trait Reconcile: CloudResource {
    /// Requests that turn `current` into `desired`; an empty delta means no
    /// API call is necessary
    fn diff(current: &Self, desired: &Self) -> Result<Delta>;
}
