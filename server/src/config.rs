//! Server configuration file.
//!
//! ```toml
//! listen = "127.0.0.1:8787"
//! database = "sekisyo.db"
//! admin_token = "change-me"
//!
//! [keeper]
//! site_url = "https://example.com"
//! sweep_interval_secs = 7200
//!
//! [[plugins]]
//! id = "premium"
//! local_path = "premium/premium.php"
//! label = "Premium"
//! validate_url = "https://licenses.example.com/v1/premium"
//! fail_limit = 3
//! ```

use anyhow::{Context, Result};
use sekisyo_license::{
    KeeperConfig, LicenseRegistry, LicenseStore, MemoryLicenseStore, PluginRecord,
    SqliteLicenseStore,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// `database` value that keeps license state in memory only.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Top-level server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the admin API binds to.
    pub listen: String,
    /// SQLite file holding license state, or `:memory:`.
    pub database: PathBuf,
    /// Bearer token required by every admin route. Empty rejects all requests.
    pub admin_token: String,
    pub keeper: KeeperConfig,
    /// Plugins registered at startup, in order.
    pub plugins: Vec<PluginEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8787".to_string(),
            database: PathBuf::from("sekisyo.db"),
            admin_token: String::new(),
            keeper: KeeperConfig::default(),
            plugins: Vec::new(),
        }
    }
}

/// One plugin registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntry {
    pub id: String,
    #[serde(default)]
    pub local_path: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub validate_url: String,
    #[serde(default)]
    pub fail_limit: u32,
}

impl PluginEntry {
    pub fn to_record(&self) -> PluginRecord {
        PluginRecord::new(
            &self.id,
            &self.local_path,
            &self.label,
            &self.description,
            &self.validate_url,
            self.fail_limit,
        )
    }
}

impl ServerConfig {
    /// Reads a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.keeper.validate()?;
        Ok(config)
    }

    fn open_store(&self) -> Result<Arc<dyn LicenseStore>> {
        if self.database.as_os_str() == IN_MEMORY_DATABASE {
            return Ok(Arc::new(MemoryLicenseStore::new()));
        }
        let store = SqliteLicenseStore::open(&self.database)
            .with_context(|| format!("Failed to open database {}", self.database.display()))?;
        Ok(Arc::new(store))
    }
}

/// Opens the store, builds the registry and registers every configured plugin.
pub fn build_registry(config: &ServerConfig) -> Result<Arc<LicenseRegistry>> {
    let registry = LicenseRegistry::from_config(&config.keeper, config.open_store()?)?;
    for entry in &config.plugins {
        registry
            .register(entry.to_record())
            .with_context(|| format!("Failed to register plugin {}", entry.id))?;
    }
    info!("Registered {} plugin(s)", registry.len());
    for id in registry.orphaned_states()? {
        warn!(plugin_id = %id, "Stored license state for a plugin that is not configured");
    }
    Ok(Arc::new(registry))
}
