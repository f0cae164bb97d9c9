//! Provision orchestrator
//!
//! Get-or-create on top of the enumerator and the differs: find the existing
//! resource by natural key, converge it, or create it.

use crate::cache::ClearScope;
use crate::context::Region;
use crate::error::{Error, Result};
use crate::provider::{PageFetcher, ResourceApi};
use crate::reconcile::{Reconcile, Request};
use crate::resource::{CloudResource, EnumerateOptions, Enumerator, Strictness};
use serde::Serialize;
use serde_json::Value;

/// What provisioning did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Create,
    Update,
    NoOp,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub action: ActionType,
    /// Requests issued, in order
    pub requests: Vec<Request>,
}

#[derive(Debug, Clone, Copy)]
pub struct ProvisionOptions {
    /// Refetch the current state instead of trusting the cache
    pub update_info: bool,
    pub strictness: Strictness,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            update_info: true,
            strictness: Strictness::Strict,
        }
    }
}

pub struct Provisioner<'a> {
    enumerator: &'a Enumerator,
    fetcher: &'a dyn PageFetcher,
    api: &'a dyn ResourceApi,
    options: ProvisionOptions,
}

impl<'a> Provisioner<'a> {
    pub fn new(enumerator: &'a Enumerator, fetcher: &'a dyn PageFetcher, api: &'a dyn ResourceApi) -> Self {
        Self {
            enumerator,
            fetcher,
            api,
            options: ProvisionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ProvisionOptions) -> Self {
        self.options = options;
        self
    }

    /// Converge `desired` onto the provider; identity fields are filled in
    pub async fn provision<R: Reconcile>(&self, desired: &mut R) -> Result<ProvisionReport> {
        let region = self.target_region(desired);
        let key = natural_key(desired)?;

        let existing = self.find::<R>(&region, &key).await?;
        let mut issued = Vec::new();

        let action = match existing {
            Some(current) => {
                let delta = R::diff(&current, desired)?;
                desired.adopt_identity(&current)?;

                if delta.is_empty() {
                    tracing::info!("{} '{}' in {} is up to date", R::KIND, key, region);
                    ActionType::NoOp
                } else {
                    tracing::info!(
                        "{} '{}' in {}: {} request(s) to converge",
                        R::KIND,
                        key,
                        region,
                        delta.len()
                    );
                    for request in delta.into_requests() {
                        self.issue::<R>(&region, request, &mut issued).await?;
                    }
                    ActionType::Update
                }
            }
            None => {
                tracing::info!("{} '{}' not found in {}, creating", R::KIND, key, region);
                let request = desired.generate_create_request()?;
                let response = self.issue::<R>(&region, request, &mut issued).await?;
                desired.merge_response(&response)?;

                for request in desired.post_create_requests()? {
                    self.issue::<R>(&region, request, &mut issued).await?;
                }
                ActionType::Create
            }
        };

        Ok(ProvisionReport {
            action,
            requests: issued,
        })
    }

    /// Delete the resource matching `desired`'s natural key; `false` when
    /// there is none
    pub async fn dispose<R: CloudResource>(&self, desired: &R) -> Result<bool> {
        let region = desired
            .region()
            .cloned()
            .unwrap_or_else(|| self.enumerator.context().region.clone());
        let key = natural_key(desired)?;

        let Some(current) = self.find::<R>(&region, &key).await? else {
            tracing::info!("{} '{}' not found in {}, nothing to dispose", R::KIND, key, region);
            return Ok(false);
        };

        let request = current.generate_dispose_request()?;
        self.issue::<R>(&region, request, &mut Vec::new()).await?;
        Ok(true)
    }

    fn target_region<R: CloudResource>(&self, desired: &mut R) -> Region {
        let ctx = self.enumerator.context();
        let meta = desired.meta_mut();
        let region = meta.region.get_or_insert_with(|| ctx.region.clone()).clone();
        if meta.account_id.is_none() {
            meta.account_id = Some(ctx.account.id.clone());
        }
        region
    }

    async fn find<R: CloudResource>(&self, region: &Region, key: &str) -> Result<Option<R>> {
        let opts = EnumerateOptions::<R> {
            strictness: self.options.strictness,
            ..EnumerateOptions::default()
        }
        .region(region.clone())
        .update_info(self.options.update_info);

        let mut matches: Vec<R> = self
            .enumerator
            .enumerate::<R>(self.fetcher, opts)
            .await?
            .into_iter()
            .filter(|object| object.natural_key().as_deref() == Some(key))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            count => Err(Error::AmbiguousResource {
                kind: R::KIND,
                key: key.to_string(),
                count,
            }),
        }
    }

    /// Issue one request, record it and invalidate the kind's cache
    async fn issue<R: CloudResource>(
        &self,
        region: &Region,
        request: Request,
        issued: &mut Vec<Request>,
    ) -> Result<Value> {
        tracing::debug!("{} {}: {}", region, request.action, request.body);
        let response = self
            .api
            .call(region, &request)
            .await
            .map_err(Error::Provider)?;
        issued.push(request);
        self.invalidate::<R>();
        Ok(response)
    }

    fn invalidate<R: CloudResource>(&self) {
        let ctx = self.enumerator.context();
        let scope = ClearScope::Kind {
            client: R::CLIENT,
            kind: R::KIND,
            region: None,
        };
        if let Err(e) = self.enumerator.cache().clear(&ctx.account.name, &scope) {
            tracing::warn!("Failed to invalidate {} cache: {}", R::KIND, e);
        }
    }
}

fn natural_key<R: CloudResource>(object: &R) -> Result<String> {
    object
        .natural_key()
        .ok_or_else(|| Error::invalid(format!("{}: desired object has no natural key", R::KIND)))
}
