//! Representative resource kinds
//!
//! - [`SecurityGroup`] - firewall rules, keyed per permission
//! - [`ReceiptRuleSet`] - ordered mail receipt rules
//! - [`DbSubnetGroup`] - database subnet group, single modify call
//! - [`Table`] - key/value table with an explicit throughput policy

mod db_subnet_group;
mod receipt_rule_set;
mod security_group;
mod table;

pub use db_subnet_group::{DbSubnetGroup, Subnet};
pub use receipt_rule_set::{ReceiptRule, ReceiptRuleSet};
pub use security_group::{
    DescriptionPolicy, Direction, IpPermission, IpRange, Ipv6Range, PermissionEntry, SecurityGroup,
    Source,
};
pub use table::{
    AttributeDefinition, BillingModeSummary, KeySchemaElement, ProvisionedThroughput, Table,
    ThroughputPolicy,
};

use super::schema::{Field, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Key/value tag shared by most kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

pub(crate) static TAG: Schema = Schema {
    kind: "tag",
    fields: &[Field::keep("Key"), Field::keep("Value")],
};

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

pub(crate) fn tags_wire(tags: &[Tag]) -> Value {
    Value::Array(
        tags.iter()
            .map(|t| json!({"Key": t.key, "Value": t.value}))
            .collect(),
    )
}

/// Insert `value` under `key` unless it is `None`
pub(crate) fn put<T: Serialize>(body: &mut serde_json::Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        if let Ok(value) = serde_json::to_value(value) {
            body.insert(key.to_string(), value);
        }
    }
}
