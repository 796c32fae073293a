//! Configuration.
//!
//! Two layers live here:
//!
//! * [`LicenseConfig`], the administrator-editable license settings
//!   persisted under the `license_config` storage key.
//! * [`Settings`], process-level options read from the environment at
//!   start-up.

use crate::storage::{read_json, write_json, KeyValueStore, LICENSE_CONFIG_SLOT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LIFETIME_KEY: &str = "DEV-LIFETIME-2025-MAIN-DEVELOPER";
pub const DEFAULT_DEMO_DURATION_SECS: u64 = 3600;

/// License settings.  Serialised in camelCase to match the stored
/// document layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LicenseConfig {
    /// Length of a demo session, in seconds.
    pub demo_duration: u64,
    pub enable_demo: bool,
    /// The key that unlocks the lifetime license.
    pub admin_license_key: String,
    pub max_demo_sessions: u32,
    /// Features withheld from demo sessions.
    pub demo_restricted_features: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            demo_duration: DEFAULT_DEMO_DURATION_SECS,
            enable_demo: true,
            admin_license_key: DEFAULT_LIFETIME_KEY.to_string(),
            max_demo_sessions: 5,
            demo_restricted_features: Vec::new(),
            last_updated: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// A partial update for [`LicenseConfig`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseConfigPatch {
    pub demo_duration: Option<u64>,
    pub enable_demo: Option<bool>,
    pub admin_license_key: Option<String>,
    pub max_demo_sessions: Option<u32>,
    pub demo_restricted_features: Option<Vec<String>>,
}

impl LicenseConfig {
    /// Loads the stored configuration.  Missing fields take their
    /// default; a missing or corrupt document yields the defaults.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        read_json(store, LICENSE_CONFIG_SLOT).unwrap_or_default()
    }

    pub fn save(&self, store: &dyn KeyValueStore) {
        write_json(store, LICENSE_CONFIG_SLOT, self);
    }

    /// Applies `patch`, stamps `last_updated` and persists the result.
    pub fn update(&mut self, patch: LicenseConfigPatch, now: DateTime<Utc>, store: &dyn KeyValueStore) {
        if let Some(v) = patch.demo_duration {
            self.demo_duration = v;
        }
        if let Some(v) = patch.enable_demo {
            self.enable_demo = v;
        }
        if let Some(v) = patch.admin_license_key {
            self.admin_license_key = v;
        }
        if let Some(v) = patch.max_demo_sessions {
            self.max_demo_sessions = v;
        }
        if let Some(v) = patch.demo_restricted_features {
            self.demo_restricted_features = v;
        }
        self.last_updated = now;
        self.save(store);
        tracing::info!(demo_duration = self.demo_duration, enable_demo = self.enable_demo, "license config updated");
    }

    /// Restores and persists the defaults.
    pub fn reset_to_defaults(&mut self, now: DateTime<Utc>, store: &dyn KeyValueStore) {
        *self = Self {
            last_updated: now,
            ..Self::default()
        };
        self.save(store);
    }

    pub fn demo_duration(&self) -> Duration {
        Duration::from_secs(self.demo_duration)
    }
}

/// Process settings taken from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// `WORKLOG_BIND_ADDR`, default `127.0.0.1:3000`.
    pub bind_addr: String,
    /// `WORKLOG_DATA_DIR`, default `data`.
    pub data_dir: PathBuf,
    /// `WORKLOG_LIFETIME_KEY`; replaces the configured lifetime key.
    pub lifetime_key_override: Option<String>,
    /// `WORKLOG_TICK_MS`, default 1000.
    pub tick_period: Duration,
    /// `WORKLOG_ENCODE_KEYS`; base64-encode the stored license key.
    pub encode_stored_keys: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let bind_addr = lookup("WORKLOG_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let data_dir = PathBuf::from(lookup("WORKLOG_DATA_DIR").unwrap_or_else(|| "data".to_string()));
        let lifetime_key_override = lookup("WORKLOG_LIFETIME_KEY").filter(|k| !k.trim().is_empty());
        let tick_ms = match lookup("WORKLOG_TICK_MS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => ms,
                _ => {
                    tracing::warn!(value = %raw, "ignoring invalid WORKLOG_TICK_MS");
                    1000
                }
            },
            None => 1000,
        };
        let encode_stored_keys = lookup("WORKLOG_ENCODE_KEYS")
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
        Self {
            bind_addr,
            data_dir,
            lifetime_key_override,
            tick_period: Duration::from_millis(tick_ms),
            encode_stored_keys,
        }
    }
}
