//! Shared test helpers for registry and scheduler tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sekisyo_license::{
    HttpLicenseValidator, KeeperConfig, LicenseRegistry, LicenseStore, LicenseValidator,
    MemoryLicenseStore, PluginRecord, RemoteError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const SITE_URL: &str = "https://site.test/";
pub const ORIGIN: &str = "https://site.test";

pub fn test_config() -> KeeperConfig {
    KeeperConfig {
        site_url: SITE_URL.to_string(),
        request_timeout_secs: 5,
        ..Default::default()
    }
}

/// Creates a record with placeholder metadata.
pub fn record(id: &str, endpoint: &str, tolerance: u32) -> PluginRecord {
    PluginRecord::new(
        id,
        format!("{id}/{id}.php"),
        format!("Plugin {id}"),
        "A plugin under test.",
        endpoint,
        tolerance,
    )
}

/// A registry that talks to a real HTTP endpoint, backed by memory.
pub fn http_registry() -> (Arc<LicenseRegistry>, Arc<MemoryLicenseStore>) {
    let store = Arc::new(MemoryLicenseStore::new());
    let validator = HttpLicenseValidator::new(Duration::from_secs(5)).unwrap();
    let registry = LicenseRegistry::new(
        &test_config(),
        Arc::clone(&store) as Arc<dyn LicenseStore>,
        Arc::new(validator),
    );
    (Arc::new(registry), store)
}

/// A registry driven by an in-process validator.
pub fn scripted_registry(
    validator: Arc<dyn LicenseValidator>,
) -> (Arc<LicenseRegistry>, Arc<MemoryLicenseStore>) {
    let store = Arc::new(MemoryLicenseStore::new());
    let registry = LicenseRegistry::new(
        &test_config(),
        Arc::clone(&store) as Arc<dyn LicenseStore>,
        validator,
    );
    (Arc::new(registry), store)
}

/// Validator whose answer can be flipped between accept and reject.
#[derive(Default)]
pub struct ScriptedValidator {
    reject: AtomicBool,
    validate_calls: AtomicUsize,
    unlink_calls: AtomicUsize,
    endpoints: Mutex<Vec<String>>,
}

impl ScriptedValidator {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn unlink_calls(&self) -> usize {
        self.unlink_calls.load(Ordering::SeqCst)
    }

    /// Endpoints hit by `validate`, in call order.
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().unwrap().clone()
    }

    fn answer(&self) -> Result<(), RemoteError> {
        if self.reject.load(Ordering::SeqCst) {
            Err(RemoteError::new(Some(500), "license server down"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LicenseValidator for ScriptedValidator {
    async fn validate(&self, endpoint: &str, _key: &str, _origin: &str) -> Result<(), RemoteError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().unwrap().push(endpoint.to_string());
        self.answer()
    }

    async fn unlink(&self, _endpoint: &str, _key: &str, _origin: &str) -> Result<(), RemoteError> {
        self.unlink_calls.fetch_add(1, Ordering::SeqCst);
        self.answer()
    }
}

/// Validator that parks inside the next `validate` call until released, once armed.
#[derive(Default)]
pub struct GatedValidator {
    armed: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedValidator {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LicenseValidator for GatedValidator {
    async fn validate(&self, _endpoint: &str, _key: &str, _origin: &str) -> Result<(), RemoteError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(())
    }

    async fn unlink(&self, _endpoint: &str, _key: &str, _origin: &str) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Validator that accepts one key and rejects every other. Once armed, the
/// next call (validate or unlink) parks until released.
pub struct KeyValidator {
    accepted: String,
    armed: AtomicBool,
    keys: Mutex<Vec<String>>,
    pub entered: Notify,
    pub release: Notify,
}

impl KeyValidator {
    pub fn accepting(key: &str) -> Arc<Self> {
        Arc::new(Self {
            accepted: key.to_string(),
            armed: AtomicBool::new(false),
            keys: Mutex::new(Vec::new()),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Keys sent to `validate`, in call order.
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }

    async fn gate(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl LicenseValidator for KeyValidator {
    async fn validate(&self, _endpoint: &str, key: &str, _origin: &str) -> Result<(), RemoteError> {
        self.keys.lock().unwrap().push(key.to_string());
        self.gate().await;
        if key == self.accepted {
            Ok(())
        } else {
            Err(RemoteError::new(Some(403), "License key is not recognized."))
        }
    }

    async fn unlink(&self, _endpoint: &str, _key: &str, _origin: &str) -> Result<(), RemoteError> {
        self.gate().await;
        Ok(())
    }
}
