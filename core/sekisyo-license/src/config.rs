//! Keeper configuration.

use crate::error::{LicenseError, LicenseResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default sweep interval (two hours).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60 * 2;

/// Default timeout for a license server round-trip.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Settings shared by the registry and the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    /// Public URL of this site, sent to license servers as `url`.
    pub site_url: String,
    /// Seconds between health sweeps.
    pub sweep_interval_secs: u64,
    /// Upper bound on every license server request, in seconds.
    pub request_timeout_secs: u64,
    /// Directory that plugin `local_path`s are relative to.
    pub plugins_dir: PathBuf,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            site_url: "http://localhost".to_string(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            plugins_dir: PathBuf::from("plugins"),
        }
    }
}

impl KeeperConfig {
    /// The caller origin: `site_url` without trailing slashes.
    #[must_use]
    pub fn origin(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Rejects settings the scheduler or HTTP client cannot run with.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.sweep_interval_secs == 0 {
            return Err(LicenseError::Config(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(LicenseError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.origin().is_empty() {
            return Err(LicenseError::Config("site_url must not be empty".to_string()));
        }
        Ok(())
    }
}
