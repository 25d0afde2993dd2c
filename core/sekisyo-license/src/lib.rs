//! Plugin license registry and revalidation gate.
//!
//! This crate handles:
//! - Registering plugins with their license server endpoint and failure tolerance
//! - Validating and unlinking license keys against those servers
//! - Persisting per-plugin license state behind a swappable store
//! - Periodic health sweeps that deactivate plugins past their tolerance
//!
//! # Lifecycle
//!
//! The host builds one [`LicenseRegistry`] at startup, registers every
//! plugin, then hands the registry (in an `Arc`) to its request handlers
//! and to a [`RevalidationScheduler`]. User actions call
//! [`LicenseRegistry::validate_license`] and
//! [`LicenseRegistry::unlink_license`]; the scheduler re-checks valid
//! licenses on its own timer.
//!
//! # Example
//!
//! ```no_run
//! use sekisyo_license::{KeeperConfig, LicenseRegistry, MemoryLicenseStore, PluginRecord};
//! use std::sync::Arc;
//!
//! # fn main() -> sekisyo_license::LicenseResult<()> {
//! let config = KeeperConfig::default();
//! let registry = LicenseRegistry::from_config(&config, Arc::new(MemoryLicenseStore::new()))?;
//! registry.register(PluginRecord::new(
//!     "my-plugin",
//!     "my-plugin/my-plugin.php",
//!     "My Plugin",
//!     "Does useful things.",
//!     "https://licenses.example.com/v1/my-plugin",
//!     3,
//! ))?;
//! assert!(!registry.is_any_valid(["my-plugin"])?);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod manifest;
mod record;
mod registry;
mod scheduler;
mod store;
mod validator;

pub use config::{KeeperConfig, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SWEEP_INTERVAL_SECS};
pub use error::{LicenseError, LicenseResult};
pub use manifest::{PluginMetadata, UNDEFINED};
pub use record::{FailureMode, LicenseState, PluginRecord, PluginView};
pub use registry::{HealthCheck, LicenseRegistry};
pub use scheduler::{LicenseEvent, RevalidationScheduler, SchedulerHandle, SweepReport};
pub use store::{LicenseStore, MemoryLicenseStore, SqliteLicenseStore};
pub use validator::{HttpLicenseValidator, LicenseValidator, RemoteError};
