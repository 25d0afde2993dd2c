//! The license registry.
//!
//! Owns the catalog of registered plugins and drives every license state
//! transition. Records are appended at startup and never removed. State
//! lives in a [`LicenseStore`]; each transition reads the current state,
//! computes the next one and writes it back while holding that plugin's
//! lock, so two calls for the same plugin never interleave.

use crate::config::KeeperConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::record::{FailureMode, LicenseState, PluginRecord, PluginView};
use crate::store::LicenseStore;
use crate::validator::{HttpLicenseValidator, LicenseValidator, RemoteError};
use chrono::Utc;
use reqwest::Url;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct Entry {
    record: PluginRecord,
    /// Serializes state transitions for this plugin.
    lock: Mutex<()>,
}

/// Outcome of one [`LicenseRegistry::health_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheck {
    /// The license server accepted the key.
    pub passed: bool,
    /// Failure counter after the check.
    pub consecutive_failures: u32,
}

#[derive(Default)]
struct Catalog {
    /// Registration order.
    order: Vec<Arc<Entry>>,
    by_id: HashMap<String, Arc<Entry>>,
}

/// Registry of licensed plugins.
pub struct LicenseRegistry {
    catalog: RwLock<Catalog>,
    store: Arc<dyn LicenseStore>,
    validator: Arc<dyn LicenseValidator>,
    origin: String,
    plugins_dir: PathBuf,
}

impl std::fmt::Debug for LicenseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseRegistry")
            .field("origin", &self.origin)
            .field("plugins_dir", &self.plugins_dir)
            .finish_non_exhaustive()
    }
}

impl LicenseRegistry {
    /// Creates an empty registry.
    pub fn new(
        config: &KeeperConfig,
        store: Arc<dyn LicenseStore>,
        validator: Arc<dyn LicenseValidator>,
    ) -> Self {
        Self {
            catalog: RwLock::new(Catalog::default()),
            store,
            validator,
            origin: config.origin().to_string(),
            plugins_dir: config.plugins_dir.clone(),
        }
    }

    /// Creates an empty registry that talks to license servers over HTTP.
    pub fn from_config(config: &KeeperConfig, store: Arc<dyn LicenseStore>) -> LicenseResult<Self> {
        config.validate()?;
        let validator = HttpLicenseValidator::new(config.request_timeout())?;
        Ok(Self::new(config, store, Arc::new(validator)))
    }

    /// The origin sent to license servers.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[must_use]
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    // ================================================================
    // Catalog
    // ================================================================

    /// Registers a plugin. Fails if the id is taken.
    ///
    /// Nothing is written to the store until a license is first set.
    pub fn register(&self, record: PluginRecord) -> LicenseResult<()> {
        let id = record.id().to_string();
        if id.is_empty() {
            return Err(LicenseError::Config("plugin id must not be empty".to_string()));
        }
        check_endpoint(&record)?;

        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        if catalog.by_id.contains_key(&id) {
            return Err(LicenseError::AlreadyRegistered(id));
        }
        let entry = Arc::new(Entry {
            record,
            lock: Mutex::new(()),
        });
        catalog.order.push(Arc::clone(&entry));
        catalog.by_id.insert(id.clone(), entry);

        info!(plugin_id = %id, "Plugin registered");
        Ok(())
    }

    /// Returns the record registered under `id`.
    pub fn get(&self, id: &str) -> LicenseResult<PluginRecord> {
        self.entry(id).map(|entry| entry.record.clone())
    }

    /// All records, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<PluginRecord> {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        catalog.order.iter().map(|e| e.record.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        catalog.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &str) -> LicenseResult<Arc<Entry>> {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        catalog
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| LicenseError::NotFound(id.to_string()))
    }

    // ================================================================
    // State queries
    // ================================================================

    /// Current license state for `id`; defaults if nothing was stored yet.
    pub fn state(&self, id: &str) -> LicenseResult<LicenseState> {
        self.entry(id)?;
        self.load(id)
    }

    fn load(&self, id: &str) -> LicenseResult<LicenseState> {
        Ok(self.store.get(id)?.unwrap_or_default())
    }

    /// The display view of one plugin.
    pub fn view(&self, id: &str) -> LicenseResult<PluginView> {
        let entry = self.entry(id)?;
        let state = self.load(id)?;
        Ok(PluginView::new(&entry.record, state, &self.plugins_dir))
    }

    /// Display views of every plugin, in registration order.
    pub fn views(&self) -> LicenseResult<Vec<PluginView>> {
        self.list()
            .iter()
            .map(|record| {
                let state = self.load(record.id())?;
                Ok(PluginView::new(record, state, &self.plugins_dir))
            })
            .collect()
    }

    /// True if any of `ids` is registered and currently valid.
    ///
    /// Unregistered ids are ignored.
    pub fn is_any_valid<I, S>(&self, ids: I) -> LicenseResult<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            let id = id.as_ref();
            if self.entry(id).is_err() {
                continue;
            }
            if self.load(id)?.valid {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Ids with stored license state but no registered plugin.
    ///
    /// Left behind when a plugin is dropped from the host's configuration.
    pub fn orphaned_states(&self) -> LicenseResult<Vec<String>> {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        Ok(self
            .store
            .all()?
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| !catalog.by_id.contains_key(id))
            .collect())
    }

    // ================================================================
    // Transitions
    // ================================================================

    /// Checks `key` with the plugin's license server and records the outcome.
    ///
    /// On success the key is stored as valid and the failure counter reset.
    /// On failure the counter goes up by one and, unless `mode` is
    /// [`FailureMode::PreserveStatus`], the license is marked invalid. The
    /// server's rejection comes back as [`LicenseError::Validation`].
    pub async fn validate_license(&self, id: &str, key: &str, mode: FailureMode) -> LicenseResult<()> {
        let entry = self.entry(id)?;
        let _guard = entry.lock.lock().await;

        match self.check_locked(&entry, key, mode).await? {
            (_, None) => Ok(()),
            (_, Some(err)) => Err(LicenseError::Validation {
                id: id.to_string(),
                status: err.status,
                message: err.message,
            }),
        }
    }

    /// Re-checks the stored key of a valid license in
    /// [`FailureMode::PreserveStatus`].
    ///
    /// The key is read under the plugin's lock, so a concurrent validation
    /// or unlink is never undone by a check of the key it replaced. Returns
    /// `None` if the license was not valid and nothing was checked.
    pub async fn health_check(&self, id: &str) -> LicenseResult<Option<HealthCheck>> {
        let entry = self.entry(id)?;
        let _guard = entry.lock.lock().await;

        let current = self.load(id)?;
        if !current.valid {
            return Ok(None);
        }
        let (next, failure) = self
            .check_locked(&entry, &current.license_key, FailureMode::PreserveStatus)
            .await?;
        Ok(Some(HealthCheck {
            passed: failure.is_none(),
            consecutive_failures: next.consecutive_failures,
        }))
    }

    /// One remote check and its bookkeeping. Caller holds the entry lock.
    async fn check_locked(
        &self,
        entry: &Entry,
        key: &str,
        mode: FailureMode,
    ) -> LicenseResult<(LicenseState, Option<RemoteError>)> {
        let id = entry.record.id();
        let outcome = if key.trim().is_empty() {
            Err(RemoteError::new(None, "license key is empty"))
        } else {
            self.validator
                .validate(entry.record.validation_endpoint(), key, &self.origin)
                .await
        };

        let now = Utc::now();
        match outcome {
            Ok(()) => {
                let next = LicenseState::validated(key, now);
                self.store.put(id, &next)?;
                info!(plugin_id = %id, "License validated");
                Ok((next, None))
            }
            Err(err) => {
                let next = self.load(id)?.rejected(key, mode, now);
                self.store.put(id, &next)?;
                warn!(
                    plugin_id = %id,
                    status = ?err.status,
                    failed = next.consecutive_failures,
                    valid = next.valid,
                    "License validation failed: {}",
                    err.message
                );
                Ok((next, Some(err)))
            }
        }
    }

    /// Releases `key` at the license server and resets local state.
    ///
    /// If the server cannot be reached nothing changes locally.
    pub async fn unlink_license(&self, id: &str, key: &str) -> LicenseResult<()> {
        let entry = self.entry(id)?;
        let _guard = entry.lock.lock().await;

        if let Err(err) = self
            .validator
            .unlink(entry.record.validation_endpoint(), key, &self.origin)
            .await
        {
            warn!(plugin_id = %id, "License unlink failed: {}", err.message);
            return Err(LicenseError::Unlink {
                id: id.to_string(),
                status: err.status,
                message: err.message,
            });
        }

        self.store.put(id, &LicenseState::unlinked(Utc::now()))?;
        info!(plugin_id = %id, "License unlinked");
        Ok(())
    }

    /// Marks the license invalid, leaving key and failure counter alone.
    pub async fn deactivate(&self, id: &str) -> LicenseResult<()> {
        let entry = self.entry(id)?;
        let _guard = entry.lock.lock().await;
        self.deactivate_locked(id)
    }

    /// Deactivates `id` only if its failure counter is past its tolerance.
    ///
    /// The check and the write happen under the plugin's lock, so a
    /// validation that lands in between is never overridden. Returns whether
    /// the plugin was deactivated.
    pub async fn deactivate_over_tolerance(&self, id: &str) -> LicenseResult<bool> {
        let entry = self.entry(id)?;
        let _guard = entry.lock.lock().await;

        let current = self.load(id)?;
        if !current.valid || !entry.record.exceeds_tolerance(current.consecutive_failures) {
            debug!(plugin_id = %id, failed = current.consecutive_failures, "Within tolerance");
            return Ok(false);
        }
        self.deactivate_locked(id)?;
        Ok(true)
    }

    fn deactivate_locked(&self, id: &str) -> LicenseResult<()> {
        let current = self.load(id)?;
        self.store.put(id, &current.deactivated())?;
        info!(plugin_id = %id, failed = current.consecutive_failures, "License deactivated");
        Ok(())
    }
}

fn check_endpoint(record: &PluginRecord) -> LicenseResult<()> {
    let invalid = |reason: String| LicenseError::InvalidEndpoint {
        id: record.id().to_string(),
        reason,
    };
    let url = Url::parse(record.validation_endpoint()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}
