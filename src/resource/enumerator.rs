//! Paginated Regional Enumerator
//!
//! Fans a listing out over regions, maps every raw object to its typed form
//! and keeps the per-region result in the disk cache.

use super::object::CloudResource;
use super::schema::Strictness;
use crate::cache::{filter_digest, CacheKey, DiskCache};
use crate::context::{Context, Region};
use crate::error::{Error, Result};
use crate::provider::{Enricher, PageFetcher, ResourceFilter, TagSource};
use futures::future::try_join_all;
use futures::TryStreamExt;
use serde_json::Value;
use std::collections::HashSet;

/// How regions are visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanOut {
    /// One region after another
    #[default]
    Sequential,
    /// All regions at once; results still come back in region order and the
    /// first failure drops the rest
    Parallel,
}

/// Options for [`Enumerator::enumerate`]
pub struct EnumerateOptions<'a, R> {
    /// `None` means every region of the account
    pub regions: Option<Vec<Region>>,
    pub filters: Option<Vec<ResourceFilter>>,
    /// Second, per-object call filling in full information
    pub enrich: Option<&'a dyn Enricher<R>>,
    pub tags: Option<&'a dyn TagSource<R>>,
    /// Bypass the cache, refetch and rewrite it
    pub update_info: bool,
    /// Cache suffix that makes a filtered listing cacheable
    pub cache_filter_key: Option<String>,
    pub write_cache: bool,
    /// Drop later objects whose identity repeats
    pub dedupe: bool,
    pub fan_out: FanOut,
    pub strictness: Strictness,
}

impl<R> Default for EnumerateOptions<'_, R> {
    fn default() -> Self {
        Self {
            regions: None,
            filters: None,
            enrich: None,
            tags: None,
            update_info: false,
            cache_filter_key: None,
            write_cache: true,
            dedupe: false,
            fan_out: FanOut::Sequential,
            strictness: Strictness::Strict,
        }
    }
}

impl<R> EnumerateOptions<'_, R> {
    pub fn region(mut self, region: Region) -> Self {
        self.regions = Some(vec![region]);
        self
    }

    pub fn update_info(mut self, update_info: bool) -> Self {
        self.update_info = update_info;
        self
    }

    /// Filter the listing; passing `cache_key: true` caches it under a digest
    /// of the filters
    pub fn filters(mut self, filters: Vec<ResourceFilter>, cache_key: bool) -> Self {
        if cache_key {
            self.cache_filter_key = Some(filter_digest(&filters));
        }
        self.filters = Some(filters);
        self
    }

    fn has_filters(&self) -> bool {
        self.filters.as_ref().is_some_and(|f| !f.is_empty())
    }

    /// Unfiltered listings and listings with a filter key are cacheable
    fn cacheable(&self) -> bool {
        !self.has_filters() || self.cache_filter_key.is_some()
    }
}

pub struct Enumerator {
    ctx: Context,
    cache: DiskCache,
}

impl Enumerator {
    pub fn new(ctx: Context, cache: DiskCache) -> Self {
        Self { ctx, cache }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    /// Regions in scope, in iteration order
    pub fn regions_in_scope<R>(&self, opts: &EnumerateOptions<'_, R>) -> Vec<Region> {
        match &opts.regions {
            Some(regions) => regions.clone(),
            None if self.ctx.account.regions().is_empty() => vec![self.ctx.region.clone()],
            None => self.ctx.account.regions().to_vec(),
        }
    }

    fn cache_key<R: CloudResource>(&self, region: &Region, opts: &EnumerateOptions<'_, R>) -> Option<CacheKey> {
        opts.cacheable().then(|| {
            CacheKey::new(&self.ctx.account.name, region, R::CLIENT, R::KIND)
                .full_info(opts.enrich.is_some())
                .tags(opts.tags.is_some())
                .suffix(opts.cache_filter_key.clone())
        })
    }

    /// List `R` across the regions in scope
    pub async fn enumerate<R: CloudResource>(
        &self,
        fetcher: &dyn PageFetcher,
        opts: EnumerateOptions<'_, R>,
    ) -> Result<Vec<R>> {
        let regions = self.regions_in_scope(&opts);
        tracing::debug!(
            "Enumerating {} in {} region(s) ({:?})",
            R::KIND,
            regions.len(),
            opts.fan_out
        );

        let per_region = match opts.fan_out {
            FanOut::Sequential => {
                let mut results = Vec::with_capacity(regions.len());
                for region in &regions {
                    results.push(self.enumerate_region(fetcher, region, &opts).await?);
                }
                results
            }
            FanOut::Parallel => {
                try_join_all(
                    regions
                        .iter()
                        .map(|region| self.enumerate_region(fetcher, region, &opts)),
                )
                .await?
            }
        };

        let objects = per_region.into_iter().flatten();
        if !opts.dedupe {
            return Ok(objects.collect());
        }

        let mut seen = HashSet::new();
        Ok(objects
            .filter(|object| match object.identity() {
                Some(id) => seen.insert(id),
                None => true,
            })
            .collect())
    }

    async fn enumerate_region<R: CloudResource>(
        &self,
        fetcher: &dyn PageFetcher,
        region: &Region,
        opts: &EnumerateOptions<'_, R>,
    ) -> Result<Vec<R>> {
        let key = self.cache_key(region, opts);

        if let (Some(key), false) = (&key, opts.update_info) {
            if let Some(cached) = self.read_cached::<R>(key) {
                return Ok(cached);
            }
        }

        let filters = opts.filters.as_deref().unwrap_or_default();
        let mut stream = fetcher.fetch(region, R::KIND, filters);
        let mut objects = Vec::new();

        while let Some(raw) = stream.try_next().await.map_err(Error::Provider)? {
            let mut object = R::from_raw(&raw, opts.strictness)?;
            {
                let meta = object.meta_mut();
                meta.region = Some(region.clone());
                meta.account_id = Some(self.ctx.account.id.clone());
            }
            if let Some(enrich) = opts.enrich {
                enrich.enrich(region, &mut object).await.map_err(Error::Provider)?;
            }
            if let Some(tags) = opts.tags {
                tags.tags(region, &mut object).await.map_err(Error::Provider)?;
            }
            objects.push(object);
        }

        tracing::debug!("{} {}: fetched {} objects", region, R::KIND, objects.len());

        if let (Some(key), true) = (&key, opts.write_cache) {
            let items = objects
                .iter()
                .map(R::to_cache)
                .collect::<Result<Vec<Value>>>()?;
            self.cache.write(key, &items)?;
        }

        Ok(objects)
    }

    fn read_cached<R: CloudResource>(&self, key: &CacheKey) -> Option<Vec<R>> {
        let items = self.cache.read(key)?;
        match items.iter().map(R::from_cache).collect::<Result<Vec<R>>>() {
            Ok(objects) => Some(objects),
            Err(e) => {
                tracing::warn!("Stale {} cache entry for {}: {}, refetching", R::KIND, key.region, e);
                None
            }
        }
    }
}
