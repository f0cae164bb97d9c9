//! On-disk listing cache
//!
//! One JSON array file per account, region, client, kind and variant:
//!
//! ```text
//! <root>/<account>/<region>/<client>/<kind>[_full_info][_tags][_<suffix>].json
//! ```
//!
//! Files are replaced whole (temp file + rename), so a reader sees either the
//! previous or the new listing. Nothing serializes concurrent writers to the
//! same key; the last write wins.

use crate::context::Region;
use crate::error::Result;
use crate::provider::ResourceFilter;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Identifies one cache file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub account: String,
    pub region: Region,
    pub client: &'static str,
    pub kind: &'static str,
    pub full_info: bool,
    pub tags: bool,
    pub suffix: Option<String>,
}

impl CacheKey {
    pub fn new(account: &str, region: &Region, client: &'static str, kind: &'static str) -> Self {
        Self {
            account: account.to_string(),
            region: region.clone(),
            client,
            kind,
            full_info: false,
            tags: false,
            suffix: None,
        }
    }

    pub fn full_info(mut self, full_info: bool) -> Self {
        self.full_info = full_info;
        self
    }

    pub fn tags(mut self, tags: bool) -> Self {
        self.tags = tags;
        self
    }

    pub fn suffix(mut self, suffix: Option<String>) -> Self {
        self.suffix = suffix;
        self
    }

    pub fn file_name(&self) -> String {
        let mut name = self.kind.to_string();
        if self.full_info {
            name.push_str("_full_info");
        }
        if self.tags {
            name.push_str("_tags");
        }
        if let Some(suffix) = &self.suffix {
            name.push('_');
            name.push_str(suffix);
        }
        name.push_str(".json");
        name
    }
}

/// What [`DiskCache::clear`] removes
#[derive(Debug, Clone)]
pub enum ClearScope {
    /// Every variant of one kind, in one region or all of them
    Kind {
        client: &'static str,
        kind: &'static str,
        region: Option<Region>,
    },
    /// Everything cached for one region
    Region(Region),
    /// The account's whole cache directory
    All,
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(&key.account)
            .join(key.region.mark())
            .join(key.client)
            .join(key.file_name())
    }

    /// Cached listing, or `None` when absent or unreadable
    pub fn read(&self, key: &CacheKey) -> Option<Vec<Value>> {
        let path = self.path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Cannot read cache file {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(items)) => {
                tracing::debug!("Cache hit {} ({} items)", path.display(), items.len());
                Some(items)
            }
            Ok(_) => {
                tracing::warn!("Cache file {} is not a JSON array, ignoring", path.display());
                None
            }
            Err(e) => {
                tracing::warn!("Corrupt cache file {}: {}, ignoring", path.display(), e);
                None
            }
        }
    }

    /// Replace the listing stored under `key`
    pub fn write(&self, key: &CacheKey, items: &[Value]) -> Result<()> {
        let path = self.path(key);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        let file = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(file.as_file());
            serde_json::to_writer(&mut writer, items)?;
            writer.flush()?;
        }
        file.persist(&path).map_err(std::io::Error::from)?;

        tracing::debug!("Cache write {} ({} items)", path.display(), items.len());
        Ok(())
    }

    /// Remove cache files for `account`; returns how many were removed
    pub fn clear(&self, account: &str, scope: &ClearScope) -> Result<usize> {
        let account_dir = self.root.join(account);

        match scope {
            ClearScope::All => remove_dir(&account_dir),
            ClearScope::Region(region) => remove_dir(&account_dir.join(region.mark())),
            ClearScope::Kind {
                client,
                kind,
                region,
            } => {
                let regions = match region {
                    Some(region) => vec![account_dir.join(region.mark())],
                    None => subdirs(&account_dir)?,
                };

                let mut removed = 0;
                for region_dir in regions {
                    removed += remove_kind_files(&region_dir.join(client), kind)?;
                }
                tracing::debug!("Cleared {} cache files for {}/{}", removed, client, kind);
                Ok(removed)
            }
        }
    }
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

fn remove_kind_files(client_dir: &Path, kind: &str) -> Result<usize> {
    let entries = match fs::read_dir(client_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json && is_kind_variant(stem, kind) {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Whether `stem` is a file name [`CacheKey::file_name`] builds for `kind`,
/// with a [`filter_digest`] as the only recognised suffix
fn is_kind_variant(stem: &str, kind: &str) -> bool {
    let Some(rest) = stem.strip_prefix(kind) else {
        return false;
    };
    let rest = rest.strip_prefix("_full_info").unwrap_or(rest);
    let rest = rest.strip_prefix("_tags").unwrap_or(rest);
    match rest.strip_prefix('_') {
        None => rest.is_empty(),
        Some(digest) => {
            digest.len() == DIGEST_LEN
                && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        }
    }
}

fn remove_dir(dir: &Path) -> Result<usize> {
    let count = count_files(dir);
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(count),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}

const DIGEST_LEN: usize = 16;

/// Stable digest of a filter set, usable as a cache key suffix
pub fn filter_digest(filters: &[ResourceFilter]) -> String {
    let mut sorted: Vec<ResourceFilter> = filters
        .iter()
        .map(|f| {
            let mut f = f.clone();
            f.values.sort();
            f
        })
        .collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    for filter in &sorted {
        hasher.update(filter.param.as_bytes());
        hasher.update([0u8]);
        for value in &filter.values {
            hasher.update(value.as_bytes());
            hasher.update([0x1fu8]);
        }
        hasher.update([0x1eu8]);
    }

    hasher
        .finalize()
        .iter()
        .take(DIGEST_LEN / 2)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(region: &str, kind: &'static str) -> CacheKey {
        CacheKey::new("staging", &Region::get(region).unwrap(), "ec2", kind)
    }

    #[test]
    fn file_name_variants() {
        let key = key("us-west-2", "security_group");
        assert_eq!(key.file_name(), "security_group.json");
        assert_eq!(
            key.clone()
                .full_info(true)
                .tags(true)
                .suffix(Some("abc".to_string()))
                .file_name(),
            "security_group_full_info_tags_abc.json"
        );
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let key = key("us-west-2", "security_group");

        assert!(cache.read(&key).is_none());
        cache.write(&key, &[json!({"id": "sg-1"})]).unwrap();
        assert_eq!(cache.read(&key).unwrap(), vec![json!({"id": "sg-1"})]);
        assert!(dir
            .path()
            .join("staging/us-west-2/ec2/security_group.json")
            .exists());

        cache.write(&key, &[]).unwrap();
        assert_eq!(cache.read(&key).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn corrupt_file_reads_as_cold() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let key = key("us-west-2", "security_group");
        let path = cache.path(&key);

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[{\"id\": ").unwrap();
        assert!(cache.read(&key).is_none());

        fs::write(&path, "{\"id\": 1}").unwrap();
        assert!(cache.read(&key).is_none());
    }

    #[test]
    fn clearing_a_kind_spares_kinds_sharing_its_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let item = [json!({})];
        let digest = filter_digest(&[ResourceFilter::new("vpc-id", vec!["vpc-1".into()])]);

        cache.write(&key("us-west-2", "security_group"), &item).unwrap();
        cache
            .write(
                &key("us-west-2", "security_group").tags(true).suffix(Some(digest)),
                &item,
            )
            .unwrap();
        cache.write(&key("us-west-2", "security_group_rule"), &item).unwrap();
        cache
            .write(&key("us-west-2", "security_group_rule").full_info(true), &item)
            .unwrap();

        let removed = cache
            .clear(
                "staging",
                &ClearScope::Kind {
                    client: "ec2",
                    kind: "security_group",
                    region: None,
                },
            )
            .unwrap();
        assert_eq!(removed, 2);
        assert!(cache.read(&key("us-west-2", "security_group_rule")).is_some());
        assert!(cache
            .read(&key("us-west-2", "security_group_rule").full_info(true))
            .is_some());
    }

    #[test]
    fn clear_by_kind_region_and_all() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let item = [json!({})];

        cache.write(&key("us-west-2", "security_group"), &item).unwrap();
        cache
            .write(&key("us-west-2", "security_group").full_info(true), &item)
            .unwrap();
        cache.write(&key("us-east-1", "security_group"), &item).unwrap();
        cache.write(&key("us-east-1", "other"), &item).unwrap();

        let removed = cache
            .clear(
                "staging",
                &ClearScope::Kind {
                    client: "ec2",
                    kind: "security_group",
                    region: None,
                },
            )
            .unwrap();
        assert_eq!(removed, 3);
        assert!(cache.read(&key("us-east-1", "other")).is_some());

        let removed = cache
            .clear("staging", &ClearScope::Region(Region::get("us-east-1").unwrap()))
            .unwrap();
        assert_eq!(removed, 1);

        cache.write(&key("eu-west-1", "other"), &item).unwrap();
        assert_eq!(cache.clear("staging", &ClearScope::All).unwrap(), 1);
        assert_eq!(cache.clear("staging", &ClearScope::All).unwrap(), 0);
    }

    #[test]
    fn filter_digest_ignores_order() {
        let a = vec![
            ResourceFilter::new("vpc-id", vec!["vpc-2".into(), "vpc-1".into()]),
            ResourceFilter::new("group-name", vec!["web".into()]),
        ];
        let b = vec![
            ResourceFilter::new("group-name", vec!["web".into()]),
            ResourceFilter::new("vpc-id", vec!["vpc-1".into(), "vpc-2".into()]),
        ];
        let c = vec![ResourceFilter::new("group-name", vec!["db".into()])];

        assert_eq!(filter_digest(&a), filter_digest(&b));
        assert_ne!(filter_digest(&a), filter_digest(&c));
        assert_eq!(filter_digest(&a).len(), 16);
    }
}
