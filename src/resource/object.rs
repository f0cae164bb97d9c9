//! Resource object contract
//!
//! Every kind is a plain serde struct with an explicit field list. The
//! [`CloudResource`] trait ties that struct to its [`Schema`], its cache
//! representation and the requests the provider needs to create or delete it.

use super::schema::{init_attrs, Schema, Strictness};
use crate::context::Region;
use crate::error::{Error, Result};
use crate::reconcile::Request;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

/// Metadata every enumerated object carries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

pub trait CloudResource:
    Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static
{
    /// Kind name, used as the cache file stem and in error messages
    const KIND: &'static str;
    /// Provider client the kind belongs to (cache directory)
    const CLIENT: &'static str;

    fn schema() -> &'static Schema;

    fn meta(&self) -> &ResourceMeta;

    fn meta_mut(&mut self) -> &mut ResourceMeta;

    /// Attribute names copied from an existing object or a create response
    fn identity_attrs() -> &'static [&'static str];

    /// Caller-visible name used to find an existing resource
    fn natural_key(&self) -> Option<String>;

    /// Provider-assigned id, once known
    fn identity(&self) -> Option<String>;

    fn generate_create_request(&self) -> Result<Request>;

    fn generate_dispose_request(&self) -> Result<Request> {
        Err(Error::NotSupported {
            kind: Self::KIND,
            operation: "dispose",
        })
    }

    /// Requests issued right after a successful create
    fn post_create_requests(&self) -> Result<Vec<Request>> {
        Ok(Vec::new())
    }

    fn region(&self) -> Option<&Region> {
        self.meta().region.as_ref()
    }

    fn from_raw(raw: &Value, strictness: Strictness) -> Result<Self> {
        let attrs = init_attrs(raw, Self::schema(), strictness)?;
        Ok(serde_json::from_value(Value::Object(attrs))?)
    }

    fn from_cache(value: &Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    fn to_cache(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Copy identity attributes from `source` (cache form) into `self`
    fn copy_identity(&mut self, source: &serde_json::Map<String, Value>) -> Result<()> {
        let Value::Object(mut current) = self.to_cache()? else {
            return Err(Error::invalid(format!(
                "{}: cache form is not an object",
                Self::KIND
            )));
        };

        let mut copied = false;
        for attr in Self::identity_attrs() {
            if let Some(value) = source.get(*attr).filter(|v| !v.is_null()) {
                current.insert(attr.to_string(), value.clone());
                copied = true;
            }
        }

        if copied {
            *self = Self::from_cache(&Value::Object(current))?;
        }
        Ok(())
    }

    /// Adopt the identity of an existing provider object
    fn adopt_identity(&mut self, existing: &Self) -> Result<()> {
        match existing.to_cache()? {
            Value::Object(source) => self.copy_identity(&source),
            _ => Ok(()),
        }
    }

    /// Map a provider response leniently and merge its identity fields
    fn merge_response(&mut self, raw: &Value) -> Result<()> {
        if !raw.is_object() {
            return Ok(());
        }
        let attrs = init_attrs(raw, Self::schema(), Strictness::Lenient)?;
        self.copy_identity(&attrs)
    }
}
