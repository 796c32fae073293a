//! The license/demo state machine.
//!
//! ```text
//! Unlicensed --validate(key)--> Demo | Full | Lifetime
//! Demo ------time runs out----> DemoExpired
//! any -------reset_demo-------> Unlicensed
//! any -------clear_license----> Unlicensed
//! ```
//!
//! A [`LicenseManager`] owns the live state.  Build one at start-up,
//! wrap it in whatever lock the host needs and pass it to the parts that
//! consult it.  Nothing here is global.
//!
//! Time-based fields are never trusted from storage: on [`restore`]
//! the stored key is validated again and the demo clock is re-derived
//! from its stored start instant.
//!
//! [`restore`]: LicenseManager::restore

use super::countdown::{DemoCountdown, StoredCountdown};
use super::keys::{classify, KeyKind};
use super::registry::{LicenseRegistry, LicenseRequest, LicensedUser};
use super::state::{features_for, Access, LicenseMode, LicenseState};
use crate::clock::Clock;
use crate::config::{LicenseConfig, LicenseConfigPatch};
use crate::encoding::TextEncoding;
use crate::identity::Principal;
use crate::roles::{RoleCatalog, RoleDraft, RoleError, RolePatch, UserRole};
use crate::storage::{
    read_json, remove_key, write_json, KeyValueStore, DEMO_COUNTDOWN_SLOT, LICENSE_KEY_SLOT,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LicenseError {
    #[error("invalid license key format")]
    InvalidKeyFormat,
    #[error("demo mode is disabled")]
    DemoDisabled,
    #[error("license `{key}` is no longer valid (expiry {expired_at})")]
    Expired {
        key: String,
        expired_at: DateTime<Utc>,
    },
    #[error("licensed user `{0}` not found")]
    UnknownUser(String),
    #[error("role `{0}` does not exist")]
    UnknownRole(String),
}

/// What a call to [`LicenseManager::tick`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No demo is running.
    Inactive,
    Running { time_left_seconds: u64 },
    /// The demo ran out on this tick; expiry listeners have run.
    Expired,
    /// The demo had already expired on an earlier tick or before restore.
    AlreadyExpired,
}

type ExpiryListener = Box<dyn Fn(&LicenseState) + Send + Sync>;

pub struct LicenseManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: LicenseConfig,
    /// Process-only replacement for `config.admin_license_key`.
    lifetime_key_override: Option<String>,
    encoding: TextEncoding,
    mode: LicenseMode,
    key: Option<String>,
    countdown: Option<DemoCountdown>,
    expires_at: Option<DateTime<Utc>>,
    expiry_fired: bool,
    expiry_listeners: Vec<ExpiryListener>,
}

impl std::fmt::Debug for LicenseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseManager")
            .field("mode", &self.mode)
            .field("key", &self.key)
            .field("countdown", &self.countdown)
            .field("expires_at", &self.expires_at)
            .field("expiry_fired", &self.expiry_fired)
            .finish_non_exhaustive()
    }
}

impl LicenseManager {
    /// Creates an `Unlicensed` manager, loading `license_config` from the
    /// store.  Call [`restore`](Self::restore) to pick up a stored key.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let config = LicenseConfig::load(store.as_ref());
        Self {
            store,
            clock,
            config,
            lifetime_key_override: None,
            encoding: TextEncoding::default(),
            mode: LicenseMode::Unlicensed,
            key: None,
            countdown: None,
            expires_at: None,
            expiry_fired: false,
            expiry_listeners: Vec::new(),
        }
    }

    /// Stores the license key through `encoding` from now on.
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn config(&self) -> &LicenseConfig {
        &self.config
    }

    /// Applies a configuration patch and persists it.  A running demo
    /// keeps its start instant and picks up the new duration.
    pub fn update_config(&mut self, patch: LicenseConfigPatch) -> &LicenseConfig {
        let now = self.clock.now();
        self.config.update(patch, now, self.store.as_ref());
        self.apply_config_duration();
        &self.config
    }

    pub fn reset_config(&mut self) -> &LicenseConfig {
        let now = self.clock.now();
        self.config.reset_to_defaults(now, self.store.as_ref());
        self.apply_config_duration();
        &self.config
    }

    /// Replaces the lifetime key for this process only.  The stored
    /// configuration keeps its own key.
    pub fn override_lifetime_key(&mut self, key: impl Into<String>) {
        self.lifetime_key_override = Some(key.into());
    }

    fn lifetime_key(&self) -> &str {
        self.lifetime_key_override
            .as_deref()
            .unwrap_or(&self.config.admin_license_key)
    }

    pub fn mode(&self) -> LicenseMode {
        self.mode
    }

    /// Snapshot of the current state with time fields derived from the
    /// clock.  Reading never transitions; only [`tick`](Self::tick) does.
    pub fn state(&self) -> LicenseState {
        let now = self.clock.now();
        LicenseState {
            mode: self.mode,
            key: self.key.clone(),
            demo: self.countdown.map(|c| c.status(now)),
            expires_at: self.expires_at,
            features: features_for(self.mode, &self.config),
        }
    }

    /// Whether a demo countdown still needs ticking.
    pub fn countdown_active(&self) -> bool {
        self.mode == LicenseMode::Demo
    }

    /// Registers a callback run once each time a demo expires.
    pub fn on_expiry<F>(&mut self, listener: F)
    where
        F: Fn(&LicenseState) + Send + Sync + 'static,
    {
        self.expiry_listeners.push(Box::new(listener));
    }

    /// Classifies `key` and moves to the matching state.
    ///
    /// On error nothing changes: neither the in-memory state nor storage.
    pub fn validate(&mut self, key: &str) -> Result<LicenseState, LicenseError> {
        let kind = classify(key, self.lifetime_key()).ok_or_else(|| {
            tracing::debug!("rejected license key with unknown format");
            LicenseError::InvalidKeyFormat
        })?;
        let now = self.clock.now();

        match kind {
            KeyKind::Lifetime => {
                self.stop_demo();
                self.enter(LicenseMode::Lifetime, key, None);
            }
            KeyKind::Full => {
                let registry = LicenseRegistry::load(self.store.as_ref());
                let expires_at = match registry.find_by_key(key) {
                    Some(user) if !user.is_usable(now) => {
                        return Err(LicenseError::Expired {
                            key: key.to_string(),
                            expired_at: user.expiry_date,
                        });
                    }
                    Some(user) => Some(user.expiry_date),
                    None => None,
                };
                self.stop_demo();
                self.enter(LicenseMode::Full, key, expires_at);
            }
            KeyKind::Demo => {
                if !self.config.enable_demo {
                    return Err(LicenseError::DemoDisabled);
                }
                self.enter_demo(key, now);
            }
        }
        Ok(self.state())
    }

    /// Validates `key` and, on success, remembers it for the next start.
    pub fn activate(&mut self, key: &str) -> Result<LicenseState, LicenseError> {
        let state = self.validate(key)?;
        write_json(self.store.as_ref(), LICENSE_KEY_SLOT, &self.encoding.encode(key));
        Ok(state)
    }

    /// Rebuilds state from the stored key.  A missing or no longer valid
    /// key leaves the manager `Unlicensed`.
    pub fn restore(&mut self) -> LicenseState {
        let stored: Option<String> = read_json(self.store.as_ref(), LICENSE_KEY_SLOT);
        let Some(stored) = stored else {
            tracing::info!("no stored license key, starting unlicensed");
            return self.state();
        };
        let key = self.encoding.decode(&stored);
        match self.validate(&key) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(error = %err, "stored license key rejected, starting unlicensed");
                self.state()
            }
        }
    }

    /// Re-derives the demo clock and fires expiry at most once.
    pub fn tick(&mut self) -> TickOutcome {
        match self.mode {
            LicenseMode::Demo => {}
            LicenseMode::DemoExpired => return TickOutcome::AlreadyExpired,
            _ => return TickOutcome::Inactive,
        }
        let Some(countdown) = self.countdown else {
            // Demo without a countdown cannot happen through the public API.
            self.mode = LicenseMode::Unlicensed;
            return TickOutcome::Inactive;
        };
        let now = self.clock.now();
        if !countdown.is_expired(now) {
            let time_left_seconds = countdown.time_left_secs(now);
            tracing::debug!(time_left_seconds, "demo countdown tick");
            return TickOutcome::Running { time_left_seconds };
        }

        self.expire(countdown)
    }

    /// Moves to `DemoExpired` and runs the listeners unless they already
    /// ran for this countdown.
    fn expire(&mut self, countdown: DemoCountdown) -> TickOutcome {
        self.mode = LicenseMode::DemoExpired;
        if self.expiry_fired {
            return TickOutcome::AlreadyExpired;
        }
        self.expiry_fired = true;
        tracing::warn!(started = %countdown.start_time(), "demo period expired");
        let state = self.state();
        for listener in &self.expiry_listeners {
            listener(&state);
        }
        TickOutcome::Expired
    }

    /// Forgets the demo countdown and returns to `Unlicensed`.  The stored
    /// license key is kept, so a restart validates it again.
    pub fn reset_demo(&mut self) -> LicenseState {
        self.stop_demo();
        self.enter_unlicensed();
        tracing::info!("demo reset");
        self.state()
    }

    /// Removes the stored key and any demo countdown.
    pub fn clear_license(&mut self) -> LicenseState {
        remove_key(self.store.as_ref(), LICENSE_KEY_SLOT);
        self.stop_demo();
        self.enter_unlicensed();
        tracing::info!("license cleared");
        self.state()
    }

    /// Issues a full license to a new user and records it in the registry.
    /// The requested role must exist in the role catalogue.
    pub fn issue_license(&mut self, request: LicenseRequest, generated_by: &str) -> Result<LicensedUser, LicenseError> {
        if RoleCatalog::load(self.store.as_ref()).find_by_name(&request.role).is_none() {
            return Err(LicenseError::UnknownRole(request.role));
        }
        let now = self.clock.now();
        let mut registry = LicenseRegistry::load(self.store.as_ref());
        let user = registry.issue(request, generated_by, now).clone();
        registry.save(self.store.as_ref());
        Ok(user)
    }

    /// Suspends an active license or reactivates an inactive one.
    pub fn toggle_license_status(&mut self, id: &str) -> Result<LicensedUser, LicenseError> {
        self.update_registry(id, |registry, _| registry.toggle_status(id).cloned())
    }

    /// Gives the user a new key valid for `months` from now.  The old key
    /// stops matching the registry.
    pub fn regenerate_license(&mut self, id: &str, months: u32) -> Result<LicensedUser, LicenseError> {
        self.update_registry(id, |registry, now| registry.regenerate(id, months, now).cloned())
    }

    pub fn delete_licensed_user(&mut self, id: &str) -> Result<LicensedUser, LicenseError> {
        self.update_registry(id, |registry, _| registry.remove(id))
    }

    /// Active licenses that run out within `days` from now.
    pub fn expiring_licenses(&self, days: u32) -> Vec<LicensedUser> {
        LicenseRegistry::load(self.store.as_ref())
            .expiring_within(self.clock.now(), days)
            .into_iter()
            .cloned()
            .collect()
    }

    fn update_registry<F>(&mut self, id: &str, change: F) -> Result<LicensedUser, LicenseError>
    where
        F: FnOnce(&mut LicenseRegistry, DateTime<Utc>) -> Option<LicensedUser>,
    {
        let now = self.clock.now();
        let mut registry = LicenseRegistry::load(self.store.as_ref());
        let user = change(&mut registry, now).ok_or_else(|| LicenseError::UnknownUser(id.to_string()))?;
        registry.save(self.store.as_ref());
        Ok(user)
    }

    /// Roles `principal` may see.
    pub fn roles(&self, principal: Option<&Principal>) -> Vec<UserRole> {
        RoleCatalog::load(self.store.as_ref()).visible_to(principal)
    }

    pub fn create_role(&mut self, draft: RoleDraft) -> Result<UserRole, RoleError> {
        let now = self.clock.now();
        let mut catalog = RoleCatalog::load(self.store.as_ref());
        let role = catalog.create(draft, now)?.clone();
        catalog.save(self.store.as_ref());
        Ok(role)
    }

    pub fn update_role(&mut self, id: &str, patch: RolePatch) -> Result<UserRole, RoleError> {
        let now = self.clock.now();
        let mut catalog = RoleCatalog::load(self.store.as_ref());
        let role = catalog.update(id, patch, now)?.clone();
        catalog.save(self.store.as_ref());
        Ok(role)
    }

    pub fn delete_role(&mut self, id: &str) -> Result<UserRole, RoleError> {
        let mut catalog = RoleCatalog::load(self.store.as_ref());
        let role = catalog.delete(id)?;
        catalog.save(self.store.as_ref());
        Ok(role)
    }

    /// Registry contents, with overdue licenses marked expired first.
    pub fn licensed_users(&mut self) -> Vec<LicensedUser> {
        let mut registry = LicenseRegistry::load(self.store.as_ref());
        if registry.expire_overdue(self.clock.now()) > 0 {
            registry.save(self.store.as_ref());
        }
        registry.users().to_vec()
    }

    /// Decides what `principal` may see.  A system administrator is let
    /// through before any license state is read.
    pub fn access(&self, principal: Option<&Principal>) -> Access {
        if principal.is_some_and(|p| p.is_system_admin) {
            return Access::Unrestricted;
        }
        let now = self.clock.now();
        match self.mode {
            LicenseMode::Lifetime => Access::Unrestricted,
            LicenseMode::Full => match self.expires_at {
                Some(at) if now >= at => Access::Locked,
                _ => Access::Unrestricted,
            },
            LicenseMode::Demo => match self.countdown {
                Some(c) if !c.is_expired(now) => Access::Demo {
                    time_left_seconds: c.time_left_secs(now),
                },
                _ => Access::Locked,
            },
            LicenseMode::Unlicensed | LicenseMode::DemoExpired => Access::Locked,
        }
    }

    pub fn has_feature(&self, principal: Option<&Principal>, feature: &str) -> bool {
        if principal.is_some_and(|p| p.is_system_admin) {
            return true;
        }
        self.access(principal) != Access::Locked && self.state().grants(feature)
    }

    fn enter(&mut self, mode: LicenseMode, key: &str, expires_at: Option<DateTime<Utc>>) {
        self.mode = mode;
        self.key = Some(key.to_string());
        self.expires_at = expires_at;
        tracing::info!(?mode, ?expires_at, "license activated");
    }

    fn enter_unlicensed(&mut self) {
        self.mode = LicenseMode::Unlicensed;
        self.key = None;
        self.expires_at = None;
    }

    /// Starts the demo clock, or resumes the one already running or
    /// stored.  A countdown from this process that ran out between ticks
    /// expires through the same path as [`tick`](Self::tick).  One loaded
    /// from storage lands in `DemoExpired` without firing listeners.
    fn enter_demo(&mut self, key: &str, now: DateTime<Utc>) {
        let duration = self.config.demo_duration();
        let in_memory = self.countdown.is_some();
        let existing = self.countdown.or_else(|| {
            read_json::<StoredCountdown>(self.store.as_ref(), DEMO_COUNTDOWN_SLOT)
                .and_then(|stored| DemoCountdown::from_stored(stored, duration))
        });
        let countdown = match existing {
            Some(c) => c.with_duration(duration),
            None => {
                let c = DemoCountdown::start(now, duration);
                write_json(self.store.as_ref(), DEMO_COUNTDOWN_SLOT, &c.to_stored());
                tracing::info!(duration_seconds = duration.as_secs(), "demo countdown started");
                self.expiry_fired = false;
                c
            }
        };
        self.countdown = Some(countdown);
        self.key = Some(key.to_string());
        self.expires_at = None;

        if countdown.is_expired(now) {
            if in_memory {
                self.expire(countdown);
            } else {
                self.mode = LicenseMode::DemoExpired;
                self.expiry_fired = true;
                tracing::info!("demo key presented but the demo period has already expired");
            }
        } else {
            self.mode = LicenseMode::Demo;
            tracing::info!(
                time_left_seconds = countdown.time_left_secs(now),
                "demo mode active"
            );
        }
    }

    fn stop_demo(&mut self) {
        if self.countdown.take().is_some() || self.mode == LicenseMode::DemoExpired {
            tracing::debug!("demo countdown stopped");
        }
        self.expiry_fired = false;
        remove_key(self.store.as_ref(), DEMO_COUNTDOWN_SLOT);
    }

    fn apply_config_duration(&mut self) {
        let duration = self.config.demo_duration();
        if let Some(c) = self.countdown.as_mut() {
            *c = c.with_duration(duration);
        }
    }
}
