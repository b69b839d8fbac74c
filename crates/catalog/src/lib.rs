//! Durable catalogs for the Corral fleet server.
//!
//! Three in-memory tables — users, devices, domains — each guarded by a
//! reader/writer lock and backed by a flat snapshot file that is
//! rewritten wholesale (write-then-rename) before the write lock is
//! released. The [`FleetManager`] composes the tables under a fixed
//! lock-acquisition order (domains, then devices, then users) and
//! implements every catalog-facing protocol operation.

pub mod device;
pub mod devices;
pub mod domain;
pub mod domains;
pub mod error;
pub mod fleet;
pub mod images;
pub mod snapshot;
pub mod users;

pub use device::Device;
pub use devices::DeviceCatalog;
pub use domain::Domain;
pub use domains::DomainCatalog;
pub use error::{CatalogError, CatalogResult};
pub use fleet::{FleetManager, Outcome};
pub use images::ImageStore;
pub use users::{Credential, PasswordVerdict, UserRegistry};
