//! Plugin records and their persisted license state.
//!
//! A [`PluginRecord`] is fixed at registration time. The mutable side,
//! [`LicenseState`], lives in a [`LicenseStore`](crate::LicenseStore) and is
//! only ever replaced as a whole. All transitions are pure functions on
//! `LicenseState` so the registry can compute the next value under its
//! per-record lock and write it back in one step.

use crate::manifest::PluginMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A registered plugin's identity and configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginRecord {
    id: String,
    local_path: String,
    display_name: String,
    description: String,
    validation_endpoint: String,
    failure_tolerance: u32,
}

impl PluginRecord {
    /// Creates a record. Leading path separators are stripped from `local_path`.
    pub fn new(
        id: impl Into<String>,
        local_path: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        validation_endpoint: impl Into<String>,
        failure_tolerance: u32,
    ) -> Self {
        let local_path = local_path.into();
        Self {
            id: id.into(),
            local_path: local_path.trim_start_matches(['/', '\\']).to_string(),
            display_name: display_name.into(),
            description: description.into(),
            validation_endpoint: validation_endpoint.into(),
            failure_tolerance,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of the plugin's main file, relative to the plugins directory.
    #[must_use]
    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn validation_endpoint(&self) -> &str {
        &self.validation_endpoint
    }

    /// Consecutive failures allowed before auto-deactivation. Zero disables it.
    #[must_use]
    pub fn failure_tolerance(&self) -> u32 {
        self.failure_tolerance
    }

    /// Returns true if the scheduler may deactivate this plugin.
    #[must_use]
    pub fn tolerance_enabled(&self) -> bool {
        self.failure_tolerance > 0
    }

    /// Returns true once `failures` is past the tolerance.
    #[must_use]
    pub fn exceeds_tolerance(&self, failures: u32) -> bool {
        self.tolerance_enabled() && failures > self.failure_tolerance
    }

    /// Reads descriptive metadata from the plugin's own manifest header.
    ///
    /// Read on every call; nothing is cached on the record.
    #[must_use]
    pub fn metadata(&self, plugins_dir: &Path) -> PluginMetadata {
        PluginMetadata::load(plugins_dir, &self.local_path)
    }
}

/// How a failed validation treats the `valid` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// A failure marks the license invalid. Used for user-initiated checks.
    #[default]
    Invalidate,
    /// A failure only bumps the counter; `valid` keeps its previous value.
    /// Used by the health sweep, which deactivates through the counter.
    PreserveStatus,
}

/// Persisted license state for one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LicenseState {
    /// The user-supplied key. May be empty.
    #[serde(rename = "license")]
    pub license_key: String,
    /// Last known validation outcome.
    pub valid: bool,
    /// When the key was last checked, `None` meaning never.
    pub last_checked: Option<DateTime<Utc>>,
    /// Failed checks since the last success or unlink.
    #[serde(rename = "failed")]
    pub consecutive_failures: u32,
}

impl LicenseState {
    /// State after the license server accepted `key`.
    #[must_use]
    pub fn validated(key: &str, now: DateTime<Utc>) -> Self {
        Self {
            license_key: key.to_string(),
            valid: !key.is_empty(),
            last_checked: Some(now),
            consecutive_failures: 0,
        }
    }

    /// State after a failed check of `key`, starting from `self`.
    #[must_use]
    pub fn rejected(&self, key: &str, mode: FailureMode, now: DateTime<Utc>) -> Self {
        let valid = match mode {
            FailureMode::Invalidate => false,
            FailureMode::PreserveStatus => self.valid,
        };
        Self {
            license_key: key.to_string(),
            valid: valid && !key.is_empty(),
            last_checked: Some(now),
            consecutive_failures: self.consecutive_failures.saturating_add(1),
        }
    }

    /// State after the key was unlinked at the license server.
    #[must_use]
    pub fn unlinked(now: DateTime<Utc>) -> Self {
        Self {
            last_checked: Some(now),
            ..Self::default()
        }
    }

    /// Same state with `valid` cleared; key and counter untouched.
    #[must_use]
    pub fn deactivated(&self) -> Self {
        Self {
            valid: false,
            ..self.clone()
        }
    }

    /// Returns true if a key has been entered.
    #[must_use]
    pub fn has_key(&self) -> bool {
        !self.license_key.is_empty()
    }
}

/// A record joined with its metadata and current state, for display.
#[derive(Debug, Clone, Serialize)]
pub struct PluginView {
    pub id: String,
    pub label: String,
    pub description: String,
    pub metadata: PluginMetadata,
    pub license: LicenseState,
}

impl PluginView {
    /// Builds the view for `record`.
    #[must_use]
    pub fn new(record: &PluginRecord, state: LicenseState, plugins_dir: &Path) -> Self {
        Self {
            id: record.id().to_string(),
            label: record.display_name().to_string(),
            description: record.description().trim().to_string(),
            metadata: record.metadata(plugins_dir),
            license: state,
        }
    }
}
