//! Account and region context
//!
//! Every enumeration and provisioning call takes an explicit [`Context`].
//! The process-wide active account/region is kept for callers that want a
//! default, but nothing inside the engine reads it.

mod account;
mod region;

pub use account::{
    active_account, active_region, set_active_account, set_active_region,
    set_active_region_mark, Account, Context,
};
pub use region::{Region, RegionMetadata};
