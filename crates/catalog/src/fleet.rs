//! The fleet manager.
//!
//! Owns one instance of each catalog plus the image store and
//! implements every catalog-facing protocol operation. Operations that
//! touch more than one catalog acquire locks in the global order
//! **domains → devices → users** on every path. Error-status order is
//! uniform: existence checks, then permission checks, then
//! data-availability checks.

use crate::devices::DeviceCatalog;
use crate::domain::Domain;
use crate::domains::DomainCatalog;
use crate::error::CatalogResult;
use crate::images::ImageStore;
use crate::users::UserRegistry;
use corral_core::config::StorageConfig;
use corral_core::ident::full_id;
use corral_core::Status;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

/// Result of an access-checked catalog operation.
#[derive(Debug, PartialEq)]
pub enum Outcome<T = ()> {
    /// The operation ran; carries its result.
    Granted(T),
    /// The operation was refused with a protocol status.
    Denied(Status),
}

/// Top-level owner of the catalogs. One instance per server process,
/// shared by every connection worker.
pub struct FleetManager {
    users: Arc<UserRegistry>,
    devices: DeviceCatalog,
    domains: DomainCatalog,
    images: ImageStore,
}

impl FleetManager {
    /// Load every catalog from the storage root.
    pub async fn open(storage: &StorageConfig) -> CatalogResult<Self> {
        tokio::fs::create_dir_all(&storage.data_dir).await?;
        Ok(Self {
            users: Arc::new(UserRegistry::load(storage.users_file()).await?),
            devices: DeviceCatalog::load(storage.devices_file()).await?,
            domains: DomainCatalog::load(storage.domains_file()).await?,
            images: ImageStore::new(storage.image_dir()).await?,
        })
    }

    /// The user identity store.
    pub fn users(&self) -> &Arc<UserRegistry> {
        &self.users
    }

    /// Admit a device session for `user:dev`.
    ///
    /// Rejected with `NOK_DEVID` while the user has any online device
    /// (single-active-session policy). A first-seen device id is added
    /// to the catalog durably before admission is reported.
    pub async fn admit_device(&self, user_id: &str, device_id: &str) -> CatalogResult<Outcome> {
        let mut devices = self.devices.write().await;
        if devices.user_has_online_device(user_id) {
            return Ok(Outcome::Denied(Status::NokDevid));
        }

        let id = full_id(user_id, device_id);
        if !devices.exists(&id) {
            let before = devices.checkpoint();
            devices.insert(crate::device::Device::new(user_id, device_id));
            devices.commit(before).await?;
            debug!(device = %id, "device added to catalog");
        }
        devices.set_online(&id, true);
        Ok(Outcome::Granted(()))
    }

    /// Mark a device offline. Runs on every disconnect path; the online
    /// flag is session state, so no snapshot rewrite is needed.
    pub async fn disconnect_device(&self, user_id: &str, device_id: &str) {
        let mut devices = self.devices.write().await;
        devices.set_online(&full_id(user_id, device_id), false);
    }

    /// `CREATE`: create a domain owned by the caller.
    pub async fn create_domain(&self, owner: &str, name: &str) -> CatalogResult<Outcome> {
        let mut domains = self.domains.write().await;
        if domains.exists(name) {
            return Ok(Outcome::Denied(Status::AlreadyExists));
        }

        let before = domains.checkpoint();
        domains.insert(Domain::new(name, owner));
        domains.commit(before).await?;
        debug!(domain = %name, owner = %owner, "domain created");
        Ok(Outcome::Granted(()))
    }

    /// `ADD`: append a user to a domain the requester owns.
    pub async fn add_user_to_domain(
        &self,
        requester: &str,
        target: &str,
        name: &str,
    ) -> CatalogResult<Outcome> {
        let mut domains = self.domains.write().await;
        let before = domains.checkpoint();
        let Some(domain) = domains.get_mut(name) else {
            return Ok(Outcome::Denied(Status::NoSuchDomain));
        };
        if !domain.is_owner(requester) {
            return Ok(Outcome::Denied(Status::NotOwner));
        }
        if !self.users.is_registered(target).await {
            return Ok(Outcome::Denied(Status::NoSuchUser));
        }
        if !domain.add_member(target) {
            return Ok(Outcome::Denied(Status::AlreadyMember));
        }
        domains.commit(before).await?;
        debug!(domain = %name, user = %target, "member added");
        Ok(Outcome::Granted(()))
    }

    /// `REGISTER_DEVICE`: register the caller's session device into a
    /// domain. Touches both catalogs; both snapshots are committed
    /// before the guards drop, with cross-rollback on failure.
    pub async fn register_device_in_domain(
        &self,
        user_id: &str,
        device_id: &str,
        name: &str,
    ) -> CatalogResult<Outcome> {
        let mut domains = self.domains.write().await;
        let mut devices = self.devices.write().await;

        let domains_before = domains.checkpoint();
        let devices_before = devices.checkpoint();
        let Some(domain) = domains.get_mut(name) else {
            return Ok(Outcome::Denied(Status::NoSuchDomain));
        };
        if !domain.is_member(user_id) {
            return Ok(Outcome::Denied(Status::NotMember));
        }
        let id = full_id(user_id, device_id);
        if domain.has_device(&id) {
            return Ok(Outcome::Denied(Status::AlreadyRegistered));
        }

        domain.add_device(&id);
        devices.add_domain(&id, name);

        if let Err(e) = domains.commit(domains_before).await {
            devices.restore(devices_before);
            return Err(e);
        }
        if let Err(e) = devices.commit(devices_before).await {
            // The domain snapshot already carries the device; undo the
            // domain side in memory and rewrite it, best effort.
            let before = domains.checkpoint();
            if let Some(domain) = domains.get_mut(name) {
                domain.remove_device(&id);
            }
            if let Err(persist_err) = domains.commit(before).await {
                tracing::error!(error = %persist_err, "domain rollback rewrite failed");
            }
            return Err(e);
        }

        debug!(domain = %name, device = %id, "device registered in domain");
        Ok(Outcome::Granted(()))
    }

    /// `SET_TEMPERATURE`: overwrite the session device's last reading.
    /// No domain membership is required to publish.
    pub async fn set_temperature(
        &self,
        user_id: &str,
        device_id: &str,
        value: f32,
    ) -> CatalogResult<Outcome> {
        let mut devices = self.devices.write().await;
        let id = full_id(user_id, device_id);
        if !devices.exists(&id) {
            return Ok(Outcome::Denied(Status::NoSuchDevice));
        }

        let before = devices.checkpoint();
        devices.set_temperature(&id, value);
        devices.commit(before).await?;
        Ok(Outcome::Granted(()))
    }

    /// `UPLOAD_IMAGE`: persist the bytes, then record the name as the
    /// session device's last image.
    pub async fn store_image(
        &self,
        user_id: &str,
        device_id: &str,
        name: &str,
        bytes: &[u8],
    ) -> CatalogResult<Outcome> {
        let mut devices = self.devices.write().await;
        let id = full_id(user_id, device_id);
        if !devices.exists(&id) {
            return Ok(Outcome::Denied(Status::NoSuchDevice));
        }

        // Bytes land on disk first; the record update is what makes
        // them visible, so a failure after this point leaves only an
        // unreferenced file.
        self.images.save(name, bytes).await?;

        let before = devices.checkpoint();
        devices.set_image(&id, name);
        devices.commit(before).await?;
        Ok(Outcome::Granted(()))
    }

    /// `READ_TEMPERATURES`: the latest reading of every device in the
    /// domain that has ever published one. Devices with no reading are
    /// omitted.
    pub async fn read_temperatures(
        &self,
        requester: &str,
        name: &str,
    ) -> CatalogResult<Outcome<Vec<(String, f32)>>> {
        let domains = self.domains.read().await;
        let devices = self.devices.read().await;

        let Some(domain) = domains.get(name) else {
            return Ok(Outcome::Denied(Status::NoSuchDomain));
        };
        if !domain.is_member(requester) {
            return Ok(Outcome::Denied(Status::NotMember));
        }

        let readings: Vec<(String, f32)> = domain
            .devices()
            .iter()
            .filter_map(|id| {
                devices
                    .get(id)
                    .and_then(|d| d.temperature.map(|t| (id.clone(), t)))
            })
            .collect();

        if readings.is_empty() {
            return Ok(Outcome::Denied(Status::NoData));
        }
        Ok(Outcome::Granted(readings))
    }

    /// `READ_IMAGE`: the name of the target device's last image, access
    /// permitting. Check order: existence, permission, data.
    pub async fn read_image(
        &self,
        requester: &str,
        target_full_id: &str,
    ) -> CatalogResult<Outcome<String>> {
        let domains = self.domains.read().await;
        let devices = self.devices.read().await;

        let Some(device) = devices.get(target_full_id) else {
            return Ok(Outcome::Denied(Status::NoSuchDevice));
        };
        if !domains.has_access_to_device(requester, target_full_id) {
            return Ok(Outcome::Denied(Status::NotPermitted));
        }
        let Some(name) = device.image.clone() else {
            return Ok(Outcome::Denied(Status::NoData));
        };
        Ok(Outcome::Granted(name))
    }

    /// Load stored image bytes by name.
    pub async fn load_image(&self, name: &str) -> CatalogResult<Vec<u8>> {
        self.images.load(name).await
    }

    /// Render a temperature listing into a scratch buffer: one
    /// `fullId temperature` line per device.
    pub fn render_temperature_listing(readings: &[(String, f32)]) -> Vec<u8> {
        let mut listing = String::new();
        for (id, temp) in readings {
            let _ = writeln!(listing, "{id} {temp}");
        }
        listing.into_bytes()
    }
}
