//! License state snapshots handed to callers.

use crate::config::LicenseConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FEATURE_UNLIMITED: &str = "unlimited";
pub const DEMO_FEATURES: [&str; 3] = ["basic_crud", "reports", "dashboard"];

/// Where the session sits in the license lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseMode {
    /// Initial state.  Nothing is unlocked.
    Unlicensed,
    /// Time-boxed evaluation with a reduced feature set.
    Demo,
    /// The demo clock ran out.  Only a new key leaves this state.
    DemoExpired,
    Full,
    Lifetime,
}

impl LicenseMode {
    pub fn is_licensed(self) -> bool {
        matches!(self, Self::Full | Self::Lifetime)
    }
}

/// Demo countdown figures at the instant the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoStatus {
    pub start_time: DateTime<Utc>,
    pub duration_seconds: u64,
    /// Derived from `now - start_time`; never stored.
    pub time_left_seconds: u64,
}

/// A point-in-time view of the license.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseState {
    pub mode: LicenseMode,
    pub key: Option<String>,
    pub demo: Option<DemoStatus>,
    /// Only ever set for `Full` licenses found in the registry.
    pub expires_at: Option<DateTime<Utc>>,
    pub features: Vec<String>,
}

impl LicenseState {
    pub fn unlicensed() -> Self {
        Self {
            mode: LicenseMode::Unlicensed,
            key: None,
            demo: None,
            expires_at: None,
            features: Vec::new(),
        }
    }

    pub fn grants(&self, feature: &str) -> bool {
        self.features
            .iter()
            .any(|f| f == feature || f == FEATURE_UNLIMITED)
    }
}

/// Features a mode unlocks under the given configuration.
pub fn features_for(mode: LicenseMode, config: &LicenseConfig) -> Vec<String> {
    match mode {
        LicenseMode::Full | LicenseMode::Lifetime => vec![FEATURE_UNLIMITED.to_string()],
        LicenseMode::Demo => DEMO_FEATURES
            .iter()
            .filter(|f| !config.demo_restricted_features.iter().any(|r| r == *f))
            .map(|f| f.to_string())
            .collect(),
        LicenseMode::Unlicensed | LicenseMode::DemoExpired => Vec::new(),
    }
}

/// What the UI shell may render for the current principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum Access {
    Unrestricted,
    Demo { time_left_seconds: u64 },
    Locked,
}
