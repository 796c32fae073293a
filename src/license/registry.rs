//! Licensed-user registry.
//!
//! Administrators issue full license keys to named users.  The registry
//! remembers each issued key with its validity window and status, and is
//! persisted under `licensed_users`.  Keys that match the full-license
//! format but were never issued here are still accepted by the state
//! machine; they simply carry no expiry.

use super::keys::generate_license_key;
use crate::storage::{read_json, write_json, KeyValueStore, LICENSED_USERS_SLOT};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Expired,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    Demo,
    Full,
    Trial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicensedUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub license_key: String,
    pub license_status: LicenseStatus,
    pub license_type: LicenseType,
    pub issued_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub generated_by: String,
    pub role: String,
}

impl LicensedUser {
    /// Usable right now: status is active and the expiry is in the future.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.license_status == LicenseStatus::Active && now < self.expiry_date
    }
}

/// Request to issue a license to a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    /// Validity in months.
    pub duration: u32,
    pub license_type: LicenseType,
    pub role: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseRegistry {
    users: Vec<LicensedUser>,
}

impl LicenseRegistry {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        read_json(store, LICENSED_USERS_SLOT).unwrap_or_default()
    }

    pub fn save(&self, store: &dyn KeyValueStore) {
        write_json(store, LICENSED_USERS_SLOT, self);
    }

    pub fn users(&self) -> &[LicensedUser] {
        &self.users
    }

    pub fn find_by_key(&self, key: &str) -> Option<&LicensedUser> {
        self.users.iter().find(|u| u.license_key == key)
    }

    /// Creates a user with a freshly generated key and returns it.
    pub fn issue(&mut self, request: LicenseRequest, generated_by: &str, now: DateTime<Utc>) -> &LicensedUser {
        let expiry_date = expiry_after(now, request.duration);
        let user = LicensedUser {
            id: uuid::Uuid::new_v4().to_string(),
            license_key: generate_license_key(&request.full_name, &request.email, now),
            username: request.username,
            email: request.email,
            full_name: request.full_name,
            license_status: LicenseStatus::Active,
            license_type: request.license_type,
            issued_date: now,
            expiry_date,
            generated_by: generated_by.to_string(),
            role: request.role,
        };
        tracing::info!(username = %user.username, expiry = %user.expiry_date, "license issued");
        self.users.push(user);
        &self.users[self.users.len() - 1]
    }

    /// Flips between active and suspended.  An expired license becomes
    /// active again.
    pub fn toggle_status(&mut self, id: &str) -> Option<&LicensedUser> {
        let current = self.users.iter().find(|u| u.id == id)?.license_status;
        let next = match current {
            LicenseStatus::Active => LicenseStatus::Suspended,
            LicenseStatus::Suspended | LicenseStatus::Expired => LicenseStatus::Active,
        };
        self.set_status(id, next);
        self.users.iter().find(|u| u.id == id)
    }

    /// Replaces the user's key and restarts the validity window from `now`.
    pub fn regenerate(&mut self, id: &str, months: u32, now: DateTime<Utc>) -> Option<&LicensedUser> {
        let user = self.users.iter_mut().find(|u| u.id == id)?;
        user.license_key = generate_license_key(&user.full_name, &user.email, now);
        user.license_status = LicenseStatus::Active;
        user.issued_date = now;
        user.expiry_date = expiry_after(now, months);
        tracing::info!(username = %user.username, expiry = %user.expiry_date, "license regenerated");
        Some(&*user)
    }

    pub fn remove(&mut self, id: &str) -> Option<LicensedUser> {
        let index = self.users.iter().position(|u| u.id == id)?;
        Some(self.users.remove(index))
    }

    /// Active licenses that run out after `now` but within `days`.
    pub fn expiring_within(&self, now: DateTime<Utc>, days: u32) -> Vec<&LicensedUser> {
        let threshold = now + Duration::days(i64::from(days));
        self.users
            .iter()
            .filter(|u| {
                u.license_status == LicenseStatus::Active
                    && u.expiry_date > now
                    && u.expiry_date <= threshold
            })
            .collect()
    }

    /// Changes a user's status.  Returns `false` if the id is unknown.
    pub fn set_status(&mut self, id: &str, status: LicenseStatus) -> bool {
        match self.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.license_status = status;
                true
            }
            None => false,
        }
    }

    /// Marks every active license past its expiry as expired and returns
    /// how many changed.
    pub fn expire_overdue(&mut self, now: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for user in &mut self.users {
            if user.license_status == LicenseStatus::Active && now >= user.expiry_date {
                user.license_status = LicenseStatus::Expired;
                changed += 1;
            }
        }
        changed
    }
}

fn expiry_after(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn request(months: u32) -> LicenseRequest {
        LicenseRequest {
            username: "rina".into(),
            email: "rina@company.com".into(),
            full_name: "Rina Wijaya".into(),
            duration: months,
            license_type: LicenseType::Full,
            role: "employee".into(),
        }
    }

    #[test]
    fn issue_sets_expiry_by_months() {
        let now = Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap();
        let mut registry = LicenseRegistry::default();
        let user = registry.issue(request(1), "admin", now).clone();
        assert_eq!(user.expiry_date, Utc.with_ymd_and_hms(2025, 2, 28, 0, 0, 0).unwrap());
        assert!(user.license_key.starts_with(crate::license::keys::FULL_KEY_PREFIX));
        assert!(user.is_usable(now));
        assert!(!user.is_usable(user.expiry_date));
        assert_eq!(registry.find_by_key(&user.license_key), Some(&user));
    }

    #[test]
    fn persists_as_a_plain_array() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut registry = LicenseRegistry::default();
        registry.issue(request(12), "admin", now);
        registry.save(&store);

        let raw = store.get(LICENSED_USERS_SLOT).unwrap().unwrap();
        assert!(raw.starts_with('['), "{raw}");
        assert_eq!(LicenseRegistry::load(&store), registry);
    }

    #[test]
    fn status_changes_and_overdue_expiry() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut registry = LicenseRegistry::default();
        let id = registry.issue(request(1), "admin", now).id.clone();
        let other = registry.issue(request(6), "admin", now).id.clone();

        assert!(registry.set_status(&other, LicenseStatus::Suspended));
        assert!(!registry.set_status("missing", LicenseStatus::Active));

        let later = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(registry.expire_overdue(later), 1);
        let first = registry.users().iter().find(|u| u.id == id).unwrap();
        assert_eq!(first.license_status, LicenseStatus::Expired);
    }

    #[test]
    fn toggle_regenerate_and_remove() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut registry = LicenseRegistry::default();
        let user = registry.issue(request(1), "admin", now).clone();

        assert_eq!(registry.toggle_status(&user.id).unwrap().license_status, LicenseStatus::Suspended);
        assert_eq!(registry.toggle_status(&user.id).unwrap().license_status, LicenseStatus::Active);
        assert!(registry.toggle_status("missing").is_none());

        registry.set_status(&user.id, LicenseStatus::Suspended);
        let later = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let renewed = registry.regenerate(&user.id, 12, later).unwrap().clone();
        assert_ne!(renewed.license_key, user.license_key);
        assert_eq!(renewed.license_status, LicenseStatus::Active);
        assert_eq!(renewed.issued_date, later);
        assert_eq!(renewed.expiry_date, Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap());
        assert!(registry.find_by_key(&user.license_key).is_none());

        assert_eq!(registry.remove(&user.id).map(|u| u.id), Some(user.id.clone()));
        assert!(registry.remove(&user.id).is_none());
        assert!(registry.users().is_empty());
    }

    #[test]
    fn expiring_window_excludes_past_and_inactive() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut registry = LicenseRegistry::default();
        let soon = registry.issue(request(1), "admin", now).id.clone();
        registry.issue(request(12), "admin", now);
        let suspended = registry.issue(request(1), "admin", now).id.clone();
        registry.set_status(&suspended, LicenseStatus::Suspended);

        let ids: Vec<&str> = registry
            .expiring_within(now, 90)
            .into_iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(ids, [soon.as_str()]);

        let after = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert!(registry.expiring_within(after, 90).is_empty());
    }
}
