//! The domain catalog.
//!
//! Same locking and commit discipline as the device catalog: callers
//! hold the write guard, stage mutations on [`DomainTable`], and commit
//! against a checkpoint. Snapshot format: one header line per domain
//! followed by tab-indented device lines.

use crate::domain::Domain;
use crate::error::{CatalogError, CatalogResult};
use crate::snapshot;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The domain table behind the catalog's lock.
pub struct DomainTable {
    domains: BTreeMap<String, Domain>,
    path: PathBuf,
}

impl DomainTable {
    /// Saved copy of the table state, for commit rollback.
    pub fn checkpoint(&self) -> BTreeMap<String, Domain> {
        self.domains.clone()
    }

    /// Persist the table; on failure restore `before` and report the
    /// error.
    pub async fn commit(&mut self, before: BTreeMap<String, Domain>) -> CatalogResult<()> {
        match snapshot::rewrite(&self.path, &self.render()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.domains = before;
                Err(e)
            }
        }
    }

    /// Look up a domain.
    pub fn get(&self, name: &str) -> Option<&Domain> {
        self.domains.get(name)
    }

    /// Mutable domain lookup.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Domain> {
        self.domains.get_mut(name)
    }

    /// Whether a domain exists.
    pub fn exists(&self, name: &str) -> bool {
        self.domains.contains_key(name)
    }

    /// Insert a new domain.
    pub fn insert(&mut self, domain: Domain) {
        self.domains.insert(domain.name.clone(), domain);
    }

    /// Whether the requester may read from the device: either it owns
    /// the device or it shares at least one domain with it.
    pub fn has_access_to_device(&self, requester: &str, device_full_id: &str) -> bool {
        if let Some((owner, _)) = device_full_id.split_once(':') {
            if owner == requester {
                return true;
            }
        }
        self.domains
            .values()
            .any(|d| d.has_device(device_full_id) && d.is_member(requester))
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for domain in self.domains.values() {
            out.push_str(&domain.render_block());
        }
        out
    }
}

/// The domain catalog: a [`DomainTable`] behind a reader/writer lock.
pub struct DomainCatalog {
    inner: RwLock<DomainTable>,
}

impl DomainCatalog {
    /// Load the catalog from its snapshot file.
    pub async fn load(path: PathBuf) -> CatalogResult<Self> {
        let file = path.display().to_string();
        let mut domains: BTreeMap<String, Domain> = BTreeMap::new();
        let mut current: Option<String> = None;

        for line in snapshot::load_lines(&path).await? {
            if let Some(device_line) = line.strip_prefix('\t') {
                let name = current.as_ref().ok_or_else(|| CatalogError::Corrupt {
                    file: file.clone(),
                    detail: format!("device line before any domain header: {device_line}"),
                })?;
                let domain = domains.get_mut(name).ok_or_else(|| CatalogError::Corrupt {
                    file: file.clone(),
                    detail: format!("dangling domain header: {name}"),
                })?;
                domain.add_device(device_line.trim());
            } else {
                let fields: Vec<&str> = line.split(':').collect();
                let domain =
                    Domain::from_header(&fields).ok_or_else(|| CatalogError::Corrupt {
                        file: file.clone(),
                        detail: format!("bad domain header: {line}"),
                    })?;
                current = Some(domain.name.clone());
                domains.insert(domain.name.clone(), domain);
            }
        }

        Ok(Self {
            inner: RwLock::new(DomainTable { domains, path }),
        })
    }

    /// Acquire the read guard.
    pub async fn read(&self) -> RwLockReadGuard<'_, DomainTable> {
        self.inner.read().await
    }

    /// Acquire the write guard.
    pub async fn write(&self) -> RwLockWriteGuard<'_, DomainTable> {
        self.inner.write().await
    }
}
