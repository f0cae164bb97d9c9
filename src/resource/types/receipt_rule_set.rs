//! Mail receipt rule sets
//!
//! Rules are evaluated in order, so the differ is order sensitive: a pure
//! permutation becomes a single reorder request.

use super::put;
use crate::error::{Error, Result};
use crate::reconcile::{diff_entries, Delta, DiffPolicy, Entry, Reconcile, Request};
use crate::resource::object::{CloudResource, ResourceMeta};
use crate::resource::schema::{Field, Schema, Transform};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

static RECEIPT_RULE: Schema = Schema {
    kind: "receipt_rule",
    fields: &[
        Field::keep("Name"),
        Field::keep("Enabled"),
        Field::keep("TlsPolicy"),
        Field::keep("Recipients"),
        Field::keep("Actions"),
        Field::keep("ScanEnabled"),
    ],
};

static RECEIPT_RULE_SET: Schema = Schema {
    kind: "receipt_rule_set",
    fields: &[
        Field::keep("Name"),
        Field::keep("CreatedTimestamp").with(Transform::EpochSeconds),
        Field::keep("Rules").with(Transform::Nested(&RECEIPT_RULE)),
        Field::keep("Active"),
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRule {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
    /// Provider action records, kept as returned
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_enabled: Option<bool>,
}

impl ReceiptRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            tls_policy: None,
            recipients: Vec::new(),
            actions: Vec::new(),
            scan_enabled: None,
        }
    }

    fn to_wire(&self) -> Value {
        let mut rule = Map::new();
        rule.insert("Name".to_string(), json!(self.name));
        rule.insert("Enabled".to_string(), json!(self.enabled));
        put(&mut rule, "TlsPolicy", self.tls_policy.as_deref());
        if !self.recipients.is_empty() {
            rule.insert("Recipients".to_string(), json!(self.recipients));
        }
        if !self.actions.is_empty() {
            rule.insert("Actions".to_string(), json!(self.actions));
        }
        put(&mut rule, "ScanEnabled", self.scan_enabled);
        Value::Object(rule)
    }
}

impl Entry for ReceiptRule {
    type Key = String;

    fn key(&self) -> Self::Key {
        self.name.clone()
    }
}

const RULE_POLICY: DiffPolicy<ReceiptRule> = DiffPolicy {
    equal: |a, b| a == b,
    in_place_update: true,
    order_sensitive: true,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRuleSet {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default)]
    pub rules: Vec<ReceiptRule>,
    #[serde(flatten)]
    pub meta: ResourceMeta,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ReceiptRuleSet {
    pub fn new(name: impl Into<String>, rules: Vec<ReceiptRule>) -> Self {
        Self {
            name: name.into(),
            rules,
            ..Default::default()
        }
    }

    fn create_rule_request(&self, rule: &ReceiptRule, after: Option<&str>) -> Request {
        let mut body = Map::new();
        body.insert("RuleSetName".to_string(), json!(self.name));
        put(&mut body, "After", after);
        body.insert("Rule".to_string(), rule.to_wire());
        Request::new("CreateReceiptRule", Value::Object(body))
    }

    /// Rule that precedes `name` in this set's order
    fn predecessor(&self, name: &str) -> Option<&str> {
        let index = self.rules.iter().position(|r| r.name == name)?;
        index
            .checked_sub(1)
            .map(|prev| self.rules[prev].name.as_str())
    }
}

impl CloudResource for ReceiptRuleSet {
    const KIND: &'static str = "receipt_rule_set";
    const CLIENT: &'static str = "ses";

    fn schema() -> &'static Schema {
        &RECEIPT_RULE_SET
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }

    fn identity_attrs() -> &'static [&'static str] {
        &["created_timestamp"]
    }

    fn natural_key(&self) -> Option<String> {
        (!self.name.is_empty()).then(|| self.name.clone())
    }

    /// Rule set names are only unique within a region
    fn identity(&self) -> Option<String> {
        let name = self.natural_key()?;
        Some(match &self.meta.region {
            Some(region) => format!("{}/{}", region, name),
            None => name,
        })
    }

    fn generate_create_request(&self) -> Result<Request> {
        if self.name.is_empty() {
            return Err(Error::invalid("receipt rule set: name is required"));
        }
        Ok(Request::new(
            "CreateReceiptRuleSet",
            json!({"RuleSetName": self.name}),
        ))
    }

    fn generate_dispose_request(&self) -> Result<Request> {
        Ok(Request::new(
            "DeleteReceiptRuleSet",
            json!({"RuleSetName": self.name}),
        ))
    }

    /// A new set is empty; its rules are created one after another
    fn post_create_requests(&self) -> Result<Vec<Request>> {
        let mut after: Option<&str> = None;
        let mut requests = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            requests.push(self.create_rule_request(rule, after));
            after = Some(rule.name.as_str());
        }
        Ok(requests)
    }
}

impl Reconcile for ReceiptRuleSet {
    fn diff(current: &Self, desired: &Self) -> Result<Delta> {
        let diff = diff_entries(&current.rules, &desired.rules, &RULE_POLICY);
        let mut delta = Delta::default();

        for rule in &diff.added {
            let after = desired.predecessor(&rule.name);
            delta.add.push(desired.create_rule_request(rule, after));
        }

        for (_, rule) in &diff.changed {
            delta.update.push(Request::new(
                "UpdateReceiptRule",
                json!({"RuleSetName": desired.name, "Rule": rule.to_wire()}),
            ));
        }

        if let Some(order) = diff.reorder {
            delta.reorder = Some(Request::new(
                "ReorderReceiptRuleSet",
                json!({"RuleSetName": desired.name, "RuleNames": order}),
            ));
        }

        for rule in &diff.removed {
            delta.remove.push(Request::new(
                "DeleteReceiptRule",
                json!({"RuleSetName": current.name, "RuleName": rule.name}),
            ));
        }

        Ok(delta)
    }
}
