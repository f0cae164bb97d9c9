//! In-memory provider used by the integration tests

#![allow(dead_code)]

use cloudrec::cache::DiskCache;
use cloudrec::context::{Account, Context, Region};
use cloudrec::provider::{PageFetcher, ResourceApi, ResourceFilter};
use cloudrec::reconcile::Request;
use cloudrec::resource::Enumerator;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const ACCOUNT_ID: &str = "123456789012";
pub const ACCOUNT_NAME: &str = "staging";

/// Fake cloud: per-region listings, canned action responses and a call log
#[derive(Default)]
pub struct FakeCloud {
    items: Mutex<HashMap<String, Vec<Value>>>,
    failing: Mutex<HashSet<String>>,
    fetches: Mutex<HashMap<String, usize>>,
    filters_seen: Mutex<Vec<Vec<ResourceFilter>>>,
    responses: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<(String, Request)>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_items(&self, region: &str, items: Vec<Value>) {
        self.items.lock().unwrap().insert(region.to_string(), items);
    }

    pub fn fail_region(&self, region: &str) {
        self.failing.lock().unwrap().insert(region.to_string());
    }

    pub fn respond(&self, action: &str, response: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(action.to_string(), response);
    }

    pub fn fetches(&self, region: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(region)
            .copied()
            .unwrap_or(0)
    }

    pub fn filters_seen(&self) -> Vec<Vec<ResourceFilter>> {
        self.filters_seen.lock().unwrap().clone()
    }

    /// Actions issued so far, in order
    pub fn actions(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.action.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<(String, Request)> {
        self.calls.lock().unwrap().clone()
    }
}

impl PageFetcher for FakeCloud {
    fn fetch<'a>(
        &'a self,
        region: &'a Region,
        _kind: &'static str,
        filters: &'a [ResourceFilter],
    ) -> BoxStream<'a, anyhow::Result<Value>> {
        let mark = region.mark().to_string();
        *self.fetches.lock().unwrap().entry(mark.clone()).or_default() += 1;
        self.filters_seen.lock().unwrap().push(filters.to_vec());

        let items = self
            .items
            .lock()
            .unwrap()
            .get(&mark)
            .cloned()
            .unwrap_or_default();

        if self.failing.lock().unwrap().contains(&mark) {
            // One good object, then the failure
            let head = items.into_iter().take(1).map(Ok::<Value, anyhow::Error>);
            let failure = std::iter::once(Err(anyhow::anyhow!("{}: service unavailable", mark)));
            return stream::iter(head.chain(failure).collect::<Vec<_>>()).boxed();
        }

        stream::iter(items.into_iter().map(Ok::<Value, anyhow::Error>)).boxed()
    }
}

#[async_trait::async_trait]
impl ResourceApi for FakeCloud {
    async fn call(&self, region: &Region, request: &Request) -> anyhow::Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((region.mark().to_string(), request.clone()));

        if self.failing.lock().unwrap().contains(region.mark()) {
            anyhow::bail!("{}: {} rejected", region, request.action);
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&request.action)
            .cloned()
            .unwrap_or_else(|| json!({})))
    }
}

pub fn region(mark: &str) -> Region {
    Region::get(mark).unwrap()
}

/// Enumerator over `regions` (the first is the context region) caching under `root`
pub fn enumerator(root: &Path, regions: &[&str]) -> Enumerator {
    let account =
        Account::new(ACCOUNT_ID, ACCOUNT_NAME).with_regions(regions.iter().map(|r| region(r)));
    let ctx = Context::new(Arc::new(account), region(regions[0]));
    Enumerator::new(ctx, DiskCache::new(root))
}

pub fn cache_file(root: &Path, region: &str, client: &str, file: &str) -> std::path::PathBuf {
    root.join(ACCOUNT_NAME).join(region).join(client).join(file)
}

/// Raw describe output for a security group with one HTTPS rule and the default egress rule
pub fn raw_group(id: &str, name: &str) -> Value {
    json!({
        "GroupId": id,
        "GroupName": name,
        "Description": format!("{} servers", name),
        "VpcId": "vpc-0abc",
        "OwnerId": ACCOUNT_ID,
        "IpPermissions": [{
            "IpProtocol": "tcp",
            "FromPort": 443,
            "ToPort": 443,
            "IpRanges": [{"CidrIp": "0.0.0.0/0"}]
        }],
        "IpPermissionsEgress": [{
            "IpProtocol": "-1",
            "IpRanges": [{"CidrIp": "0.0.0.0/0"}]
        }]
    })
}
