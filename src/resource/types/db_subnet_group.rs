//! Database subnet groups
//!
//! The comparison only looks at what the desired object declares: a desired
//! group without a description or subnet list leaves those untouched.

use super::{tags_wire, Tag, TAG};
use crate::error::{Error, Result};
use crate::reconcile::{Delta, Reconcile, Request};
use crate::resource::object::{CloudResource, ResourceMeta};
use crate::resource::schema::{init_attrs, Field, Schema, Strictness, Transform};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

static AVAILABILITY_ZONE: Schema = Schema {
    kind: "availability_zone",
    fields: &[Field::keep("Name")],
};

static SUBNET: Schema = Schema {
    kind: "subnet",
    fields: &[
        Field::keep("SubnetIdentifier"),
        Field::keep("SubnetAvailabilityZone").with(Transform::Nested(&AVAILABILITY_ZONE)),
        Field::keep("SubnetOutpost"),
        Field::keep("SubnetStatus"),
    ],
};

static DB_SUBNET_GROUP: Schema = Schema {
    kind: "db_subnet_group",
    fields: &[
        Field::rename("DBSubnetGroupName", "name"),
        Field::rename("DBSubnetGroupDescription", "description"),
        Field::rename("DBSubnetGroupArn", "arn"),
        Field::keep("VpcId"),
        Field::rename("SubnetGroupStatus", "status"),
        Field::keep("Subnets").with(Transform::Nested(&SUBNET)),
        Field::keep("SupportedNetworkTypes"),
        Field::keep("Tags").with(Transform::Nested(&TAG)),
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub subnet_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_availability_zone: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_outpost: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_status: Option<String>,
}

impl Subnet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            subnet_identifier: id.into(),
            subnet_availability_zone: None,
            subnet_outpost: None,
            subnet_status: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbSubnetGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<Subnet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_network_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(flatten)]
    pub meta: ResourceMeta,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DbSubnetGroup {
    pub fn new<I, S>(name: impl Into<String>, description: impl Into<String>, subnet_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: Some(description.into()),
            subnets: subnet_ids.into_iter().map(Subnet::new).collect(),
            ..Default::default()
        }
    }

    pub fn subnet_ids(&self) -> BTreeSet<&str> {
        self.subnets
            .iter()
            .map(|s| s.subnet_identifier.as_str())
            .collect()
    }

    fn description_or_name(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }
}

impl CloudResource for DbSubnetGroup {
    const KIND: &'static str = "db_subnet_group";
    const CLIENT: &'static str = "rds";

    fn schema() -> &'static Schema {
        &DB_SUBNET_GROUP
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }

    fn identity_attrs() -> &'static [&'static str] {
        &["arn", "vpc_id", "status"]
    }

    fn natural_key(&self) -> Option<String> {
        (!self.name.is_empty()).then(|| self.name.clone())
    }

    fn identity(&self) -> Option<String> {
        self.arn.clone()
    }

    fn generate_create_request(&self) -> Result<Request> {
        if self.name.is_empty() || self.subnets.is_empty() {
            return Err(Error::invalid(
                "db subnet group: name and at least one subnet are required",
            ));
        }
        Ok(Request::new(
            "CreateDBSubnetGroup",
            json!({
                "DBSubnetGroupName": self.name,
                "DBSubnetGroupDescription": self.description_or_name(),
                "SubnetIds": self.subnet_ids(),
                "Tags": tags_wire(&self.tags),
            }),
        ))
    }

    fn generate_dispose_request(&self) -> Result<Request> {
        Ok(Request::new(
            "DeleteDBSubnetGroup",
            json!({"DBSubnetGroupName": self.name}),
        ))
    }

    /// Create responses wrap the group in `DBSubnetGroup`
    fn merge_response(&mut self, raw: &Value) -> Result<()> {
        let raw = raw.get("DBSubnetGroup").unwrap_or(raw);
        if !raw.is_object() {
            return Ok(());
        }
        let attrs = init_attrs(raw, Self::schema(), Strictness::Lenient)?;
        self.copy_identity(&attrs)
    }
}

impl Reconcile for DbSubnetGroup {
    fn diff(current: &Self, desired: &Self) -> Result<Delta> {
        let description_changed = desired
            .description
            .as_ref()
            .is_some_and(|d| current.description.as_ref() != Some(d));
        let subnets_changed =
            !desired.subnets.is_empty() && desired.subnet_ids() != current.subnet_ids();

        let mut delta = Delta::default();
        if !description_changed && !subnets_changed {
            return Ok(delta);
        }

        let subnets = if desired.subnets.is_empty() {
            current.subnet_ids()
        } else {
            desired.subnet_ids()
        };
        let description = desired
            .description
            .as_deref()
            .unwrap_or_else(|| current.description_or_name());

        delta.update.push(Request::new(
            "ModifyDBSubnetGroup",
            json!({
                "DBSubnetGroupName": current.name,
                "DBSubnetGroupDescription": description,
                "SubnetIds": subnets,
            }),
        ));
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_order_does_not_matter() {
        let current = DbSubnetGroup::new("db", "main", ["subnet-b", "subnet-a"]);
        let desired = DbSubnetGroup::new("db", "main", ["subnet-a", "subnet-b"]);
        assert!(DbSubnetGroup::diff(&current, &desired).unwrap().is_empty());
    }

    #[test]
    fn undeclared_fields_are_left_alone() {
        let current = DbSubnetGroup::new("db", "main", ["subnet-a"]);
        let desired = DbSubnetGroup {
            name: "db".to_string(),
            ..Default::default()
        };
        assert!(DbSubnetGroup::diff(&current, &desired).unwrap().is_empty());
    }

    #[test]
    fn changes_become_one_modify_call() {
        let current = DbSubnetGroup::new("db", "main", ["subnet-a"]);
        let desired = DbSubnetGroup::new("db", "primary", ["subnet-a", "subnet-c"]);

        let delta = DbSubnetGroup::diff(&current, &desired).unwrap();
        assert_eq!(delta.len(), 1);
        let request = &delta.update[0];
        assert_eq!(request.action, "ModifyDBSubnetGroup");
        assert_eq!(request.body["DBSubnetGroupDescription"], "primary");
        assert_eq!(request.body["SubnetIds"], json!(["subnet-a", "subnet-c"]));
    }

    #[test]
    fn merge_response_unwraps_create_output() {
        let mut group = DbSubnetGroup::new("db", "main", ["subnet-a"]);
        let response = json!({"DBSubnetGroup": {
            "DBSubnetGroupName": "db",
            "DBSubnetGroupArn": "arn:aws:rds:us-west-2:123:subgrp:db",
            "VpcId": "vpc-1",
            "SubnetGroupStatus": "Complete"
        }});

        group.merge_response(&response).unwrap();
        assert_eq!(group.arn.as_deref(), Some("arn:aws:rds:us-west-2:123:subgrp:db"));
        assert_eq!(group.status.as_deref(), Some("Complete"));
        assert_eq!(group.description.as_deref(), Some("main"));
    }

    #[test]
    fn maps_raw_and_round_trips() {
        let raw = json!({
            "DBSubnetGroupName": "db",
            "DBSubnetGroupDescription": "main",
            "VpcId": "vpc-1",
            "SubnetGroupStatus": "Complete",
            "Subnets": [{
                "SubnetIdentifier": "subnet-a",
                "SubnetAvailabilityZone": {"Name": "us-west-2a"},
                "SubnetOutpost": {},
                "SubnetStatus": "Active"
            }],
            "SupportedNetworkTypes": ["IPV4"]
        });

        let group = DbSubnetGroup::from_raw(&raw, Strictness::Strict).unwrap();
        assert_eq!(group.subnet_ids(), BTreeSet::from(["subnet-a"]));
        assert_eq!(
            group.subnets[0].subnet_availability_zone,
            Some(json!({"name": "us-west-2a"}))
        );
        assert_eq!(DbSubnetGroup::from_cache(&group.to_cache().unwrap()).unwrap(), group);
    }
}
