//! Security groups and their permission differ

use super::{put, tags_wire, Tag, TAG};
use crate::error::{Error, Result};
use crate::reconcile::{diff_entries, Delta, DiffPolicy, Entry, Reconcile, Request};
use crate::resource::object::{CloudResource, ResourceMeta};
use crate::resource::schema::{Field, Schema, Transform};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

static IP_RANGE: Schema = Schema {
    kind: "ip_range",
    fields: &[Field::keep("CidrIp"), Field::keep("Description")],
};

static IPV6_RANGE: Schema = Schema {
    kind: "ipv6_range",
    fields: &[Field::keep("CidrIpv6"), Field::keep("Description")],
};

static IP_PERMISSION: Schema = Schema {
    kind: "ip_permission",
    fields: &[
        Field::keep("IpProtocol"),
        Field::keep("FromPort"),
        Field::keep("ToPort"),
        Field::keep("IpRanges").with(Transform::Nested(&IP_RANGE)),
        Field::keep("Ipv6Ranges").with(Transform::Nested(&IPV6_RANGE)),
        Field::keep("UserIdGroupPairs"),
        Field::keep("PrefixListIds"),
    ],
};

static SECURITY_GROUP: Schema = Schema {
    kind: "security_group",
    fields: &[
        Field::rename("GroupId", "id"),
        Field::rename("GroupName", "name"),
        Field::keep("Description"),
        Field::keep("VpcId"),
        Field::keep("OwnerId"),
        Field::rename("SecurityGroupArn", "arn"),
        Field::keep("IpPermissions").with(Transform::Nested(&IP_PERMISSION)),
        Field::keep("IpPermissionsEgress").with(Transform::Nested(&IP_PERMISSION)),
        Field::keep("Tags").with(Transform::Nested(&TAG)),
    ],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRange {
    pub cidr_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv6Range {
    pub cidr_ipv6: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One provider permission block: a port range and its sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpPermission {
    pub ip_protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_ranges: Vec<IpRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ipv6_ranges: Vec<Ipv6Range>,
    /// Raw `{GroupId, Description, ...}` pairs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_id_group_pairs: Vec<Value>,
    /// Raw `{PrefixListId, Description}` records
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefix_list_ids: Vec<Value>,
}

impl IpPermission {
    /// Single-port TCP permission from one IPv4 CIDR
    pub fn tcp(port: i64, cidr: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            ip_protocol: "tcp".to_string(),
            from_port: Some(port),
            to_port: Some(port),
            ip_ranges: vec![IpRange {
                cidr_ip: cidr.into(),
                description: description.map(str::to_string),
            }],
            ipv6_ranges: Vec::new(),
            user_id_group_pairs: Vec::new(),
            prefix_list_ids: Vec::new(),
        }
    }

    /// Split into one entry per source
    pub fn entries(&self, direction: Direction) -> Vec<PermissionEntry> {
        let protocol = self.ip_protocol.to_lowercase();
        let (from_port, to_port) = if protocol == "-1" {
            (None, None)
        } else {
            (self.from_port, self.to_port)
        };
        let entry = |source: Source, description: Option<String>| PermissionEntry {
            direction,
            protocol: protocol.clone(),
            from_port,
            to_port,
            source,
            description,
        };

        let mut entries = Vec::new();
        for range in &self.ip_ranges {
            entries.push(entry(Source::Cidr(range.cidr_ip.clone()), range.description.clone()));
        }
        for range in &self.ipv6_ranges {
            entries.push(entry(Source::Cidr6(range.cidr_ipv6.clone()), range.description.clone()));
        }
        for pair in &self.user_id_group_pairs {
            if let Some(group) = pair.get("GroupId").and_then(Value::as_str) {
                entries.push(entry(Source::Group(group.to_string()), raw_description(pair)));
            }
        }
        for prefix in &self.prefix_list_ids {
            if let Some(id) = prefix.get("PrefixListId").and_then(Value::as_str) {
                entries.push(entry(Source::PrefixList(id.to_string()), raw_description(prefix)));
            }
        }
        entries
    }
}

fn raw_description(value: &Value) -> Option<String> {
    value
        .get("Description")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    fn verb(self, prefix: &str) -> String {
        match self {
            Direction::Ingress => format!("{}Ingress", prefix),
            Direction::Egress => format!("{}Egress", prefix),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Cidr(String),
    Cidr6(String),
    Group(String),
    PrefixList(String),
}

/// A single rule: direction, protocol, port range and one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionEntry {
    pub direction: Direction,
    pub protocol: String,
    pub from_port: Option<i64>,
    pub to_port: Option<i64>,
    pub source: Source,
    pub description: Option<String>,
}

impl Entry for PermissionEntry {
    type Key = (Direction, String, Option<i64>, Option<i64>, Source);

    fn key(&self) -> Self::Key {
        (
            self.direction,
            self.protocol.clone(),
            self.from_port,
            self.to_port,
            self.source.clone(),
        )
    }
}

impl PermissionEntry {
    /// Provider form: one permission block holding this entry's source
    pub fn to_wire(&self) -> Value {
        let mut source = Map::new();
        put(&mut source, "Description", self.description.as_deref());

        let mut body = Map::new();
        body.insert("IpProtocol".to_string(), json!(self.protocol));
        put(&mut body, "FromPort", self.from_port);
        put(&mut body, "ToPort", self.to_port);

        let (list, id_key, id) = match &self.source {
            Source::Cidr(cidr) => ("IpRanges", "CidrIp", cidr),
            Source::Cidr6(cidr) => ("Ipv6Ranges", "CidrIpv6", cidr),
            Source::Group(group) => ("UserIdGroupPairs", "GroupId", group),
            Source::PrefixList(id) => ("PrefixListIds", "PrefixListId", id),
        };
        source.insert(id_key.to_string(), json!(id));
        body.insert(list.to_string(), json!([source]));

        Value::Object(body)
    }

    fn is_default_egress(&self) -> bool {
        self.direction == Direction::Egress
            && self.protocol == "-1"
            && self.source == Source::Cidr("0.0.0.0/0".to_string())
    }
}

/// Whether rule descriptions take part in the comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionPolicy {
    /// Description-only differences are not a change
    #[default]
    Ignore,
    /// Description-only differences become in-place description updates
    Significant,
}

impl DescriptionPolicy {
    fn is_default(&self) -> bool {
        *self == DescriptionPolicy::Ignore
    }

    fn diff_policy(self) -> DiffPolicy<PermissionEntry> {
        match self {
            DescriptionPolicy::Ignore => DiffPolicy {
                equal: |_, _| true,
                in_place_update: false,
                order_sensitive: false,
            },
            DescriptionPolicy::Significant => DiffPolicy {
                equal: |a, b| a.description == b.description,
                in_place_update: true,
                order_sensitive: false,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_permissions: Vec<IpPermission>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_permissions_egress: Vec<IpPermission>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "DescriptionPolicy::is_default")]
    pub description_policy: DescriptionPolicy,
    #[serde(flatten)]
    pub meta: ResourceMeta,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SecurityGroup {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            ..Default::default()
        }
    }

    /// Every ingress and egress rule, one entry per source
    pub fn permission_entries(&self) -> Vec<PermissionEntry> {
        self.ip_permissions
            .iter()
            .flat_map(|p| p.entries(Direction::Ingress))
            .chain(
                self.ip_permissions_egress
                    .iter()
                    .flat_map(|p| p.entries(Direction::Egress)),
            )
            .collect()
    }

    /// Rules the differ manages; the provider's default egress rule is left alone
    fn managed_entries(&self) -> Vec<PermissionEntry> {
        self.permission_entries()
            .into_iter()
            .filter(|e| !e.is_default_egress())
            .collect()
    }

    fn required_id(&self, operation: &str) -> Result<&str> {
        self.id.as_deref().ok_or_else(|| {
            Error::invalid(format!(
                "security group '{}': {} needs a group id",
                self.name, operation
            ))
        })
    }
}

fn permissions_request(verb: String, group_id: &str, entries: &[&PermissionEntry]) -> Request {
    let permissions: Vec<Value> = entries.iter().map(|e| e.to_wire()).collect();
    Request::new(verb, json!({"GroupId": group_id, "IpPermissions": permissions}))
}

impl CloudResource for SecurityGroup {
    const KIND: &'static str = "security_group";
    const CLIENT: &'static str = "ec2";

    fn schema() -> &'static Schema {
        &SECURITY_GROUP
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }

    fn identity_attrs() -> &'static [&'static str] {
        &["id", "arn", "owner_id", "vpc_id"]
    }

    fn natural_key(&self) -> Option<String> {
        (!self.name.is_empty()).then(|| self.name.clone())
    }

    fn identity(&self) -> Option<String> {
        self.id.clone()
    }

    fn generate_create_request(&self) -> Result<Request> {
        if self.name.is_empty() {
            return Err(Error::invalid("security group: name is required"));
        }

        let mut body = Map::new();
        body.insert("GroupName".to_string(), json!(self.name));
        body.insert(
            "Description".to_string(),
            json!(self.description.as_deref().unwrap_or(&self.name)),
        );
        put(&mut body, "VpcId", self.vpc_id.as_deref());
        if !self.tags.is_empty() {
            body.insert(
                "TagSpecifications".to_string(),
                json!([{"ResourceType": "security-group", "Tags": tags_wire(&self.tags)}]),
            );
        }

        Ok(Request::new("CreateSecurityGroup", Value::Object(body)))
    }

    fn generate_dispose_request(&self) -> Result<Request> {
        let group_id = self.required_id("dispose")?;
        Ok(Request::new("DeleteSecurityGroup", json!({"GroupId": group_id})))
    }

    /// Rules are authorized separately once the group exists
    fn post_create_requests(&self) -> Result<Vec<Request>> {
        let entries = self.permission_entries();
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let group_id = self.required_id("rule authorization")?;

        let mut requests = Vec::new();
        for direction in [Direction::Ingress, Direction::Egress] {
            let selected: Vec<&PermissionEntry> = entries
                .iter()
                .filter(|e| e.direction == direction && !e.is_default_egress())
                .collect();
            if !selected.is_empty() {
                requests.push(permissions_request(
                    direction.verb("AuthorizeSecurityGroup"),
                    group_id,
                    &selected,
                ));
            }
        }
        Ok(requests)
    }
}

impl Reconcile for SecurityGroup {
    fn diff(current: &Self, desired: &Self) -> Result<Delta> {
        let policy = desired.description_policy.diff_policy();
        let diff = diff_entries(
            &current.managed_entries(),
            &desired.managed_entries(),
            &policy,
        );

        let mut delta = Delta::default();
        if diff.is_empty() {
            return Ok(delta);
        }
        let group_id = current.required_id("update")?;

        for direction in [Direction::Ingress, Direction::Egress] {
            let added: Vec<&PermissionEntry> =
                diff.added.iter().filter(|e| e.direction == direction).collect();
            if !added.is_empty() {
                delta.add.push(permissions_request(
                    direction.verb("AuthorizeSecurityGroup"),
                    group_id,
                    &added,
                ));
            }

            let changed: Vec<&PermissionEntry> = diff
                .changed
                .iter()
                .map(|(_, want)| want)
                .filter(|e| e.direction == direction)
                .collect();
            if !changed.is_empty() {
                delta.update.push(permissions_request(
                    direction.verb("UpdateSecurityGroupRuleDescriptions"),
                    group_id,
                    &changed,
                ));
            }

            let removed: Vec<&PermissionEntry> =
                diff.removed.iter().filter(|e| e.direction == direction).collect();
            if !removed.is_empty() {
                delta.remove.push(permissions_request(
                    direction.verb("RevokeSecurityGroup"),
                    group_id,
                    &removed,
                ));
            }
        }

        Ok(delta)
    }
}
