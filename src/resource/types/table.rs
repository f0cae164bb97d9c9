//! Key/value tables
//!
//! Whether provisioned throughput takes part in the comparison is an explicit
//! [`ThroughputPolicy`] on the desired object.

use super::{put, tags_wire, Tag, TAG};
use crate::error::{Error, Result};
use crate::reconcile::{Delta, Reconcile, Request};
use crate::resource::object::{CloudResource, ResourceMeta};
use crate::resource::schema::{init_attrs, Field, Schema, Strictness, Transform};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const PROVISIONED: &str = "PROVISIONED";
const PAY_PER_REQUEST: &str = "PAY_PER_REQUEST";

static ATTRIBUTE_DEFINITION: Schema = Schema {
    kind: "attribute_definition",
    fields: &[Field::keep("AttributeName"), Field::keep("AttributeType")],
};

static KEY_SCHEMA_ELEMENT: Schema = Schema {
    kind: "key_schema_element",
    fields: &[Field::keep("AttributeName"), Field::keep("KeyType")],
};

static PROVISIONED_THROUGHPUT: Schema = Schema {
    kind: "provisioned_throughput",
    fields: &[
        Field::keep("ReadCapacityUnits"),
        Field::keep("WriteCapacityUnits"),
        Field::keep("NumberOfDecreasesToday"),
        Field::keep("LastIncreaseDateTime").with(Transform::EpochMillis),
        Field::keep("LastDecreaseDateTime").with(Transform::EpochMillis),
    ],
};

static BILLING_MODE_SUMMARY: Schema = Schema {
    kind: "billing_mode_summary",
    fields: &[
        Field::keep("BillingMode"),
        Field::keep("LastUpdateToPayPerRequestDateTime").with(Transform::EpochMillis),
    ],
};

static TABLE: Schema = Schema {
    kind: "table",
    fields: &[
        Field::rename("TableName", "name"),
        Field::rename("TableArn", "arn"),
        Field::rename("TableId", "id"),
        Field::rename("TableStatus", "status"),
        Field::keep("CreationDateTime").with(Transform::EpochMillis),
        Field::keep("AttributeDefinitions").with(Transform::Nested(&ATTRIBUTE_DEFINITION)),
        Field::keep("KeySchema").with(Transform::Nested(&KEY_SCHEMA_ELEMENT)),
        Field::keep("ProvisionedThroughput").with(Transform::Nested(&PROVISIONED_THROUGHPUT)),
        Field::keep("BillingModeSummary").with(Transform::Nested(&BILLING_MODE_SUMMARY)),
        Field::keep("StreamSpecification"),
        Field::keep("LatestStreamArn"),
        Field::keep("TableSizeBytes"),
        Field::keep("ItemCount"),
        Field::keep("GlobalSecondaryIndexes"),
        Field::keep("Tags").with(Transform::Nested(&TAG)),
    ],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub attribute_name: String,
    pub attribute_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub key_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedThroughput {
    pub read_capacity_units: u64,
    pub write_capacity_units: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_decreases_today: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_increase_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decrease_date_time: Option<DateTime<Utc>>,
}

impl ProvisionedThroughput {
    pub fn new(read: u64, write: u64) -> Self {
        Self {
            read_capacity_units: read,
            write_capacity_units: write,
            number_of_decreases_today: None,
            last_increase_date_time: None,
            last_decrease_date_time: None,
        }
    }

    fn same_capacity(&self, other: &Self) -> bool {
        self.read_capacity_units == other.read_capacity_units
            && self.write_capacity_units == other.write_capacity_units
    }

    fn to_wire(&self) -> Value {
        json!({
            "ReadCapacityUnits": self.read_capacity_units,
            "WriteCapacityUnits": self.write_capacity_units,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingModeSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_to_pay_per_request_date_time: Option<DateTime<Utc>>,
}

/// Whether provisioned throughput takes part in the comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThroughputPolicy {
    #[default]
    Compare,
    /// Leave capacity to autoscaling or manual changes
    Ignore,
}

impl ThroughputPolicy {
    fn is_default(&self) -> bool {
        *self == ThroughputPolicy::Compare
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_definitions: Vec<AttributeDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_schema: Vec<KeySchemaElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_throughput: Option<ProvisionedThroughput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_mode_summary: Option<BillingModeSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_specification: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_stream_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_secondary_indexes: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "ThroughputPolicy::is_default")]
    pub throughput_policy: ThroughputPolicy,
    #[serde(flatten)]
    pub meta: ResourceMeta,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Table {
    /// Table with a single hash key
    pub fn new(name: impl Into<String>, hash_key: &str, hash_key_type: &str) -> Self {
        Self {
            name: name.into(),
            attribute_definitions: vec![AttributeDefinition {
                attribute_name: hash_key.to_string(),
                attribute_type: hash_key_type.to_string(),
            }],
            key_schema: vec![KeySchemaElement {
                attribute_name: hash_key.to_string(),
                key_type: "HASH".to_string(),
            }],
            ..Default::default()
        }
    }

    pub fn with_throughput(mut self, read: u64, write: u64) -> Self {
        self.provisioned_throughput = Some(ProvisionedThroughput::new(read, write));
        self.billing_mode_summary = Some(BillingModeSummary {
            billing_mode: Some(PROVISIONED.to_string()),
            last_update_to_pay_per_request_date_time: None,
        });
        self
    }

    pub fn with_on_demand(mut self) -> Self {
        self.provisioned_throughput = None;
        self.billing_mode_summary = Some(BillingModeSummary {
            billing_mode: Some(PAY_PER_REQUEST.to_string()),
            last_update_to_pay_per_request_date_time: None,
        });
        self
    }

    pub fn billing_mode(&self) -> Option<&str> {
        self.billing_mode_summary
            .as_ref()
            .and_then(|s| s.billing_mode.as_deref())
    }

    /// Billing mode this object asks for: the summary, else `PROVISIONED`
    /// when throughput is set
    fn declared_billing_mode(&self) -> Option<&str> {
        self.billing_mode().or_else(|| {
            self.provisioned_throughput
                .as_ref()
                .map(|_| PROVISIONED)
        })
    }

    /// Declared billing mode, `PAY_PER_REQUEST` when nothing is declared
    pub fn effective_billing_mode(&self) -> &str {
        self.declared_billing_mode().unwrap_or(PAY_PER_REQUEST)
    }

    fn required_throughput(&self) -> Result<&ProvisionedThroughput> {
        self.provisioned_throughput.as_ref().ok_or_else(|| {
            Error::invalid(format!(
                "table '{}': provisioned billing needs provisioned_throughput",
                self.name
            ))
        })
    }
}

impl CloudResource for Table {
    const KIND: &'static str = "table";
    const CLIENT: &'static str = "dynamodb";

    fn schema() -> &'static Schema {
        &TABLE
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }

    fn identity_attrs() -> &'static [&'static str] {
        &["arn", "id", "status", "creation_date_time", "latest_stream_arn"]
    }

    fn natural_key(&self) -> Option<String> {
        (!self.name.is_empty()).then(|| self.name.clone())
    }

    fn identity(&self) -> Option<String> {
        self.arn.clone()
    }

    fn generate_create_request(&self) -> Result<Request> {
        if self.name.is_empty() || self.key_schema.is_empty() {
            return Err(Error::invalid("table: name and key schema are required"));
        }

        let attributes: Vec<Value> = self
            .attribute_definitions
            .iter()
            .map(|a| json!({"AttributeName": a.attribute_name, "AttributeType": a.attribute_type}))
            .collect();
        let keys: Vec<Value> = self
            .key_schema
            .iter()
            .map(|k| json!({"AttributeName": k.attribute_name, "KeyType": k.key_type}))
            .collect();

        let mut body = Map::new();
        body.insert("TableName".to_string(), json!(self.name));
        body.insert("AttributeDefinitions".to_string(), json!(attributes));
        body.insert("KeySchema".to_string(), json!(keys));
        let billing_mode = self.effective_billing_mode();
        body.insert("BillingMode".to_string(), json!(billing_mode));
        if billing_mode == PROVISIONED {
            body.insert(
                "ProvisionedThroughput".to_string(),
                self.required_throughput()?.to_wire(),
            );
        }
        put(&mut body, "StreamSpecification", self.stream_specification.as_ref());
        if !self.global_secondary_indexes.is_empty() {
            body.insert(
                "GlobalSecondaryIndexes".to_string(),
                json!(self.global_secondary_indexes),
            );
        }
        if !self.tags.is_empty() {
            body.insert("Tags".to_string(), tags_wire(&self.tags));
        }

        Ok(Request::new("CreateTable", Value::Object(body)))
    }

    fn generate_dispose_request(&self) -> Result<Request> {
        Ok(Request::new("DeleteTable", json!({"TableName": self.name})))
    }

    /// Create responses wrap the table in `TableDescription`
    fn merge_response(&mut self, raw: &Value) -> Result<()> {
        let raw = raw.get("TableDescription").unwrap_or(raw);
        if !raw.is_object() {
            return Ok(());
        }
        let attrs = init_attrs(raw, Self::schema(), Strictness::Lenient)?;
        self.copy_identity(&attrs)
    }
}

impl Reconcile for Table {
    fn diff(current: &Self, desired: &Self) -> Result<Delta> {
        if !desired.key_schema.is_empty() && desired.key_schema != current.key_schema {
            return Err(Error::NotSupported {
                kind: Self::KIND,
                operation: "key schema change",
            });
        }

        let mut body = Map::new();

        let billing_changed = desired
            .declared_billing_mode()
            .filter(|mode| *mode != current.effective_billing_mode());
        if let Some(mode) = billing_changed {
            body.insert("BillingMode".to_string(), json!(mode));
        }

        if desired.declared_billing_mode() == Some(PROVISIONED) {
            if billing_changed.is_some() {
                body.insert(
                    "ProvisionedThroughput".to_string(),
                    desired.required_throughput()?.to_wire(),
                );
            } else if desired.throughput_policy == ThroughputPolicy::Compare {
                if let Some(want) = &desired.provisioned_throughput {
                    let same = current
                        .provisioned_throughput
                        .as_ref()
                        .is_some_and(|have| have.same_capacity(want));
                    if !same {
                        body.insert("ProvisionedThroughput".to_string(), want.to_wire());
                    }
                }
            }
        }

        if let Some(want) = &desired.stream_specification {
            let have = current
                .stream_specification
                .clone()
                .unwrap_or_else(|| json!({"StreamEnabled": false}));
            if &have != want {
                body.insert("StreamSpecification".to_string(), want.clone());
            }
        }

        let mut delta = Delta::default();
        if !body.is_empty() {
            body.insert("TableName".to_string(), json!(current.name));
            delta.update.push(Request::new("UpdateTable", Value::Object(body)));
        }
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> Table {
        Table::new("orders", "pk", "S")
    }

    #[test]
    fn throughput_difference_updates_when_compared() {
        let current = orders().with_throughput(5, 5);
        let desired = orders().with_throughput(10, 5);

        let delta = Table::diff(&current, &desired).unwrap();
        assert_eq!(delta.update.len(), 1);
        let body = &delta.update[0].body;
        assert_eq!(delta.update[0].action, "UpdateTable");
        assert_eq!(body["TableName"], "orders");
        assert_eq!(body["ProvisionedThroughput"]["ReadCapacityUnits"], 10);
        assert!(body.get("BillingMode").is_none());
    }

    #[test]
    fn throughput_difference_is_dropped_when_ignored() {
        let current = orders().with_throughput(5, 5);
        let mut desired = orders().with_throughput(10, 5);
        desired.throughput_policy = ThroughputPolicy::Ignore;

        assert!(Table::diff(&current, &desired).unwrap().is_empty());
    }

    #[test]
    fn switching_to_on_demand_drops_throughput() {
        let current = orders().with_throughput(5, 5);
        let desired = orders().with_on_demand();

        let delta = Table::diff(&current, &desired).unwrap();
        let body = &delta.update[0].body;
        assert_eq!(body["BillingMode"], "PAY_PER_REQUEST");
        assert!(body.get("ProvisionedThroughput").is_none());
    }

    #[test]
    fn key_schema_change_is_not_supported() {
        let current = orders();
        let desired = Table::new("orders", "id", "N");
        assert!(matches!(
            Table::diff(&current, &desired),
            Err(Error::NotSupported { kind: "table", .. })
        ));
    }

    #[test]
    fn maps_describe_output() {
        let raw = json!({
            "TableName": "orders",
            "TableArn": "arn:aws:dynamodb:us-west-2:123456789012:table/orders",
            "TableId": "4f1c",
            "TableStatus": "ACTIVE",
            "CreationDateTime": 1700000000000i64,
            "AttributeDefinitions": [{"AttributeName": "pk", "AttributeType": "S"}],
            "KeySchema": [{"AttributeName": "pk", "KeyType": "HASH"}],
            "ProvisionedThroughput": {
                "ReadCapacityUnits": 0,
                "WriteCapacityUnits": 0,
                "NumberOfDecreasesToday": 0
            },
            "BillingModeSummary": {
                "BillingMode": "PAY_PER_REQUEST",
                "LastUpdateToPayPerRequestDateTime": 1700000000000i64
            },
            "TableSizeBytes": 1024,
            "ItemCount": 3
        });

        let table = Table::from_raw(&raw, Strictness::Strict).unwrap();
        assert_eq!(
            table.arn.as_deref(),
            Some("arn:aws:dynamodb:us-west-2:123456789012:table/orders")
        );
        assert_eq!(table.creation_date_time.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(table.billing_mode(), Some("PAY_PER_REQUEST"));
        assert_eq!(table.item_count, Some(3));
        assert_eq!(Table::from_cache(&table.to_cache().unwrap()).unwrap(), table);
    }

    #[test]
    fn create_request_follows_billing_mode() {
        let request = orders().with_throughput(1, 2).generate_create_request().unwrap();
        assert_eq!(request.body["BillingMode"], "PROVISIONED");
        assert_eq!(request.body["ProvisionedThroughput"]["WriteCapacityUnits"], 2);

        let request = orders().generate_create_request().unwrap();
        assert_eq!(request.body["BillingMode"], "PAY_PER_REQUEST");
        assert!(request.body.get("ProvisionedThroughput").is_none());
    }

    #[test]
    fn throughput_without_summary_creates_provisioned() {
        let mut table = orders();
        table.provisioned_throughput = Some(ProvisionedThroughput::new(5, 5));

        let request = table.generate_create_request().unwrap();
        assert_eq!(request.body["BillingMode"], "PROVISIONED");
        assert_eq!(request.body["ProvisionedThroughput"]["ReadCapacityUnits"], 5);
    }

    #[test]
    fn throughput_without_summary_switches_on_demand_table() {
        let current = orders().with_on_demand();
        let mut desired = orders();
        desired.provisioned_throughput = Some(ProvisionedThroughput::new(5, 5));

        let delta = Table::diff(&current, &desired).unwrap();
        let body = &delta.update[0].body;
        assert_eq!(body["BillingMode"], "PROVISIONED");
        assert_eq!(body["ProvisionedThroughput"]["WriteCapacityUnits"], 5);
    }

    #[test]
    fn undeclared_billing_leaves_current_mode_alone() {
        let current = orders().with_throughput(5, 5);
        assert!(Table::diff(&current, &orders()).unwrap().is_empty());
    }

    #[test]
    fn provisioned_summary_without_throughput_is_rejected() {
        let mut table = orders().with_throughput(1, 1);
        table.provisioned_throughput = None;

        assert!(matches!(
            table.generate_create_request(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(Table::diff(&orders().with_on_demand(), &table).is_err());
    }
}
