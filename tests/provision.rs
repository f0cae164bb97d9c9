//! Get-or-create provisioning against an in-memory provider

mod common;

use cloudrec::cache::CacheKey;
use cloudrec::provision::{ActionType, ProvisionOptions, Provisioner};
use cloudrec::resource::{
    EnumerateOptions, IpPermission, ReceiptRule, ReceiptRuleSet, SecurityGroup,
};
use cloudrec::Error;
use common::*;
use serde_json::json;

fn web_group(ports: &[i64]) -> SecurityGroup {
    SecurityGroup {
        ip_permissions: ports
            .iter()
            .map(|p| IpPermission::tcp(*p, "0.0.0.0/0", None))
            .collect(),
        ..SecurityGroup::new("web", "web servers")
    }
}

#[tokio::test]
async fn creates_missing_group_then_authorizes_rules() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::new();
    cloud.respond("CreateSecurityGroup", json!({"GroupId": "sg-new"}));
    let enumerator = enumerator(dir.path(), &["eu-central-1"]);

    let mut desired = web_group(&[443]);
    let report = Provisioner::new(&enumerator, &cloud, &cloud)
        .provision(&mut desired)
        .await
        .unwrap();

    assert_eq!(report.action, ActionType::Create);
    assert_eq!(
        cloud.actions(),
        vec!["CreateSecurityGroup", "AuthorizeSecurityGroupIngress"]
    );
    assert_eq!(report.requests.len(), 2);
    assert_eq!(desired.id.as_deref(), Some("sg-new"));
    assert_eq!(desired.meta.region.as_ref().map(|r| r.mark()), Some("eu-central-1"));

    let calls = cloud.calls();
    assert_eq!(calls[0].0, "eu-central-1");
    assert_eq!(calls[0].1.body["GroupName"], "web");
    assert_eq!(calls[1].1.body["GroupId"], "sg-new");
    assert_eq!(calls[1].1.body["IpPermissions"][0]["FromPort"], 443);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::new();
    cloud.respond("CreateSecurityGroup", json!({"GroupId": "sg-new"}));
    let enumerator = enumerator(dir.path(), &["eu-central-1"]);
    let provisioner = Provisioner::new(&enumerator, &cloud, &cloud);

    provisioner.provision(&mut web_group(&[443])).await.unwrap();
    cloud.set_items("eu-central-1", vec![raw_group("sg-new", "web")]);

    let mut desired = web_group(&[443]);
    let report = provisioner.provision(&mut desired).await.unwrap();

    assert_eq!(report.action, ActionType::NoOp);
    assert!(report.requests.is_empty());
    assert_eq!(cloud.actions().len(), 2);
    assert_eq!(desired.id.as_deref(), Some("sg-new"));
    assert_eq!(desired.vpc_id.as_deref(), Some("vpc-0abc"));
}

#[tokio::test]
async fn existing_group_is_converged_by_natural_key() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::new();
    cloud.set_items(
        "eu-central-1",
        vec![raw_group("sg-db", "db"), raw_group("sg-web", "web")],
    );
    let enumerator = enumerator(dir.path(), &["eu-central-1"]);

    let mut desired = web_group(&[443, 22]);
    let report = Provisioner::new(&enumerator, &cloud, &cloud)
        .provision(&mut desired)
        .await
        .unwrap();

    assert_eq!(report.action, ActionType::Update);
    assert_eq!(cloud.actions(), vec!["AuthorizeSecurityGroupIngress"]);
    let body = &cloud.calls()[0].1.body;
    assert_eq!(body["GroupId"], "sg-web");
    assert_eq!(body["IpPermissions"][0]["FromPort"], 22);
    assert_eq!(desired.id.as_deref(), Some("sg-web"));
}

#[tokio::test]
async fn two_matches_are_ambiguous() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::new();
    cloud.set_items(
        "eu-central-1",
        vec![raw_group("sg-1", "web"), raw_group("sg-2", "web")],
    );
    let enumerator = enumerator(dir.path(), &["eu-central-1"]);

    let err = Provisioner::new(&enumerator, &cloud, &cloud)
        .provision(&mut web_group(&[443]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::AmbiguousResource { kind: "security_group", count: 2, .. }
    ));
    assert!(cloud.actions().is_empty());
}

#[tokio::test]
async fn dispose_deletes_the_match_only() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::new();
    cloud.set_items("eu-central-1", vec![raw_group("sg-web", "web")]);
    let enumerator = enumerator(dir.path(), &["eu-central-1"]);
    let provisioner = Provisioner::new(&enumerator, &cloud, &cloud);

    assert!(provisioner.dispose(&web_group(&[])).await.unwrap());
    assert_eq!(cloud.actions(), vec!["DeleteSecurityGroup"]);
    assert_eq!(cloud.calls()[0].1.body["GroupId"], "sg-web");

    let missing = SecurityGroup::new("api", "api servers");
    assert!(!provisioner.dispose(&missing).await.unwrap());
    assert_eq!(cloud.actions().len(), 1);
}

#[tokio::test]
async fn mutations_invalidate_the_kind_cache_in_every_region() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::new();
    cloud.set_items("eu-central-1", vec![raw_group("sg-web", "web")]);
    cloud.set_items("eu-west-1", vec![raw_group("sg-other", "web")]);
    let enumerator = enumerator(dir.path(), &["eu-central-1", "eu-west-1"]);

    enumerator
        .enumerate::<SecurityGroup>(&cloud, EnumerateOptions::default())
        .await
        .unwrap();
    let rule_sets = CacheKey::new(ACCOUNT_NAME, &region("eu-central-1"), "ses", "receipt_rule_set");
    enumerator.cache().write(&rule_sets, &[]).unwrap();

    Provisioner::new(&enumerator, &cloud, &cloud)
        .provision(&mut web_group(&[443, 80]))
        .await
        .unwrap();

    for mark in ["eu-central-1", "eu-west-1"] {
        assert!(!cache_file(dir.path(), mark, "ec2", "security_group.json").exists());
    }
    assert!(enumerator.cache().path(&rule_sets).exists());
}

#[tokio::test]
async fn cached_lookup_skips_the_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::new();
    cloud.set_items("eu-central-1", vec![raw_group("sg-web", "web")]);
    let enumerator = enumerator(dir.path(), &["eu-central-1"]);

    enumerator
        .enumerate::<SecurityGroup>(&cloud, EnumerateOptions::default())
        .await
        .unwrap();

    let options = ProvisionOptions {
        update_info: false,
        ..ProvisionOptions::default()
    };
    let report = Provisioner::new(&enumerator, &cloud, &cloud)
        .with_options(options)
        .provision(&mut web_group(&[443]))
        .await
        .unwrap();

    assert_eq!(report.action, ActionType::NoOp);
    assert_eq!(cloud.fetches("eu-central-1"), 1);
}

#[tokio::test]
async fn rule_permutation_is_one_reorder_call() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::new();
    cloud.set_items(
        "us-east-1",
        vec![json!({
            "Name": "inbound",
            "CreatedTimestamp": 1700000000,
            "Active": true,
            "Rules": [
                {"Name": "A", "Enabled": true},
                {"Name": "B", "Enabled": true},
                {"Name": "C", "Enabled": true}
            ]
        })],
    );
    let enumerator = enumerator(dir.path(), &["us-east-1"]);

    let mut desired = ReceiptRuleSet::new(
        "inbound",
        ["C", "A", "B"].into_iter().map(ReceiptRule::new).collect(),
    );
    let report = Provisioner::new(&enumerator, &cloud, &cloud)
        .provision(&mut desired)
        .await
        .unwrap();

    assert_eq!(report.action, ActionType::Update);
    assert_eq!(cloud.actions(), vec!["ReorderReceiptRuleSet"]);
    assert_eq!(cloud.calls()[0].1.body["RuleNames"], json!(["C", "A", "B"]));
    assert!(desired.created_timestamp.is_some());
}

#[tokio::test]
async fn new_rule_set_creates_rules_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::new();
    let enumerator = enumerator(dir.path(), &["us-east-1"]);

    let mut desired = ReceiptRuleSet::new(
        "outbound",
        ["first", "second"].into_iter().map(ReceiptRule::new).collect(),
    );
    let report = Provisioner::new(&enumerator, &cloud, &cloud)
        .provision(&mut desired)
        .await
        .unwrap();

    assert_eq!(report.action, ActionType::Create);
    assert_eq!(
        cloud.actions(),
        vec!["CreateReceiptRuleSet", "CreateReceiptRule", "CreateReceiptRule"]
    );
    let calls = cloud.calls();
    assert!(calls[1].1.body.get("After").is_none());
    assert_eq!(calls[2].1.body["After"], "first");
}
