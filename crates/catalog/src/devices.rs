//! The device catalog.
//!
//! In-memory table of every device ever authenticated, keyed by the
//! composite `userId:devId`, behind a reader/writer lock. Mutating
//! methods on [`DeviceTable`] are synchronous; callers holding the
//! write guard stage their mutation and then [`DeviceTable::commit`]
//! it, which rewrites the snapshot and rolls the table back if the
//! rewrite fails.

use crate::device::Device;
use crate::error::CatalogResult;
use crate::snapshot;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The device table behind the catalog's lock.
pub struct DeviceTable {
    devices: BTreeMap<String, Device>,
    path: PathBuf,
}

impl DeviceTable {
    /// Saved copy of the table state, for commit rollback.
    pub fn checkpoint(&self) -> BTreeMap<String, Device> {
        self.devices.clone()
    }

    /// Persist the table; on failure restore `before` and report the
    /// error, so memory and disk never silently diverge.
    pub async fn commit(&mut self, before: BTreeMap<String, Device>) -> CatalogResult<()> {
        match snapshot::rewrite(&self.path, &self.render()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.devices = before;
                Err(e)
            }
        }
    }

    /// Restore a checkpoint without touching the snapshot.
    pub fn restore(&mut self, before: BTreeMap<String, Device>) {
        self.devices = before;
    }

    /// Look up a device.
    pub fn get(&self, full_id: &str) -> Option<&Device> {
        self.devices.get(full_id)
    }

    /// Whether a device exists.
    pub fn exists(&self, full_id: &str) -> bool {
        self.devices.contains_key(full_id)
    }

    /// Whether the user has any online device.
    pub fn user_has_online_device(&self, user_id: &str) -> bool {
        self.devices
            .values()
            .any(|d| d.online && d.user_id == user_id)
    }

    /// Insert a new device record.
    pub fn insert(&mut self, device: Device) {
        self.devices.insert(device.full_id(), device);
    }

    /// Toggle a device's online flag. No-op for unknown ids.
    pub fn set_online(&mut self, full_id: &str, online: bool) {
        if let Some(device) = self.devices.get_mut(full_id) {
            device.online = online;
        }
    }

    /// Record a domain on a device. No-op for unknown ids.
    pub fn add_domain(&mut self, full_id: &str, domain: &str) {
        if let Some(device) = self.devices.get_mut(full_id) {
            device.domains.insert(domain.to_string());
        }
    }

    /// Overwrite a device's last temperature. No-op for unknown ids.
    pub fn set_temperature(&mut self, full_id: &str, value: f32) {
        if let Some(device) = self.devices.get_mut(full_id) {
            device.temperature = Some(value);
        }
    }

    /// Overwrite a device's last image name. No-op for unknown ids.
    pub fn set_image(&mut self, full_id: &str, name: &str) {
        if let Some(device) = self.devices.get_mut(full_id) {
            device.image = Some(name.to_string());
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for device in self.devices.values() {
            out.push_str(&device.render_line());
            out.push('\n');
        }
        out
    }
}

/// The device catalog: a [`DeviceTable`] behind a reader/writer lock.
pub struct DeviceCatalog {
    inner: RwLock<DeviceTable>,
}

impl DeviceCatalog {
    /// Load the catalog from its snapshot file.
    pub async fn load(path: PathBuf) -> CatalogResult<Self> {
        let file = path.display().to_string();
        let mut devices = BTreeMap::new();
        for line in snapshot::load_lines(&path).await? {
            let device = Device::parse_line(&line, &file)?;
            devices.insert(device.full_id(), device);
        }

        Ok(Self {
            inner: RwLock::new(DeviceTable { devices, path }),
        })
    }

    /// Acquire the read guard.
    pub async fn read(&self) -> RwLockReadGuard<'_, DeviceTable> {
        self.inner.read().await
    }

    /// Acquire the write guard.
    pub async fn write(&self) -> RwLockWriteGuard<'_, DeviceTable> {
        self.inner.write().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_reload_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.txt");

        {
            let catalog = DeviceCatalog::load(path.clone()).await.unwrap();
            let mut table = catalog.write().await;
            let before = table.checkpoint();
            let mut device = Device::new("alice", "1");
            device.temperature = Some(19.0);
            table.insert(device);
            table.commit(before).await.unwrap();
        }

        let catalog = DeviceCatalog::load(path).await.unwrap();
        let table = catalog.read().await;
        let device = table.get("alice:1").unwrap();
        assert_eq!(device.temperature, Some(19.0));
        assert!(!device.online, "online flag must not survive reload");
    }

    #[tokio::test]
    async fn online_tracking_is_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = DeviceCatalog::load(dir.path().join("devices.txt"))
            .await
            .unwrap();

        let mut table = catalog.write().await;
        table.insert(Device::new("alice", "1"));
        table.insert(Device::new("bob", "1"));
        table.set_online("alice:1", true);

        assert!(table.user_has_online_device("alice"));
        assert!(!table.user_has_online_device("bob"));

        table.set_online("alice:1", false);
        assert!(!table.user_has_online_device("alice"));
    }
}
