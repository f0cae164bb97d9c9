//! Resource abstraction layer
//!
//! Typed resource objects built from raw provider payloads through a
//! declarative field schema, and the enumerator that lists them per region.
//!
//! # Architecture
//!
//! - [`schema`] - declarative field mapping and the generic mapper
//! - [`object`] - the [`CloudResource`] contract every kind implements
//! - [`enumerator`] - paginated, cached, per-region listing
//! - [`registry`] - static table of known kinds
//! - [`types`] - the concrete kinds
//!
//! # Example
//!
//! ```ignore
//! use cloudrec::resource::{EnumerateOptions, Enumerator, SecurityGroup};
//!
//! async fn list_groups(enumerator: &Enumerator, gateway: &Gateway) -> cloudrec::Result<Vec<SecurityGroup>> {
//!     enumerator.enumerate(gateway, EnumerateOptions::default()).await
//! }
//! ```

pub mod enumerator;
pub mod object;
mod registry;
pub mod schema;
pub mod types;

pub use enumerator::{EnumerateOptions, Enumerator, FanOut};
pub use object::{CloudResource, ResourceMeta};
pub use registry::*;
pub use schema::{init_attrs, snake_case, Field, Schema, Strictness, Transform};
pub use types::*;
