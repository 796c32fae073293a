//! Role catalogue.
//!
//! Three system roles always exist and cannot be changed.  Administrators
//! may add custom roles on top; only those are persisted, under the
//! `user_roles` storage key, and they are merged back over the defaults
//! on load.

use crate::identity::Principal;
use crate::storage::{read_json, write_json, KeyValueStore, USER_ROLES_SLOT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    #[error("role `{0}` not found")]
    NotFound(String),
    #[error("system role `{0}` cannot be modified")]
    SystemRole(String),
    #[error("a role named `{0}` already exists")]
    DuplicateName(String),
    #[error("role name must not be empty")]
    EmptyName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRole {
    pub id: String,
    /// Machine name, referenced by licensed users.
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub permissions: Vec<String>,
    #[serde(default)]
    pub department: Option<String>,
    pub is_system_role: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields an administrator supplies for a new role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDraft {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub department: Option<String>,
}

/// A partial update; `None` leaves a field alone.  The name is fixed
/// once created because licensed users refer to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePatch {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
    pub department: Option<String>,
}

fn system_role(name: &str, display_name: &str, description: &str, permissions: &[&str]) -> UserRole {
    UserRole {
        id: name.to_string(),
        name: name.to_string(),
        display_name: display_name.to_string(),
        description: Some(description.to_string()),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        department: None,
        is_system_role: true,
        created_at: DateTime::<Utc>::UNIX_EPOCH,
        updated_at: DateTime::<Utc>::UNIX_EPOCH,
    }
}

pub fn default_roles() -> Vec<UserRole> {
    vec![
        system_role("admin", "Administrator", "Full system access", &["all"]),
        system_role("employee", "Employee", "Basic employee access", &["records_read", "records_write"]),
        system_role("viewer", "Viewer", "Read-only access", &["records_read", "reports_read"]),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleCatalog {
    roles: Vec<UserRole>,
}

impl Default for RoleCatalog {
    fn default() -> Self {
        Self {
            roles: default_roles(),
        }
    }
}

impl RoleCatalog {
    /// Defaults followed by the stored custom roles.  Stored entries that
    /// claim to be system roles are ignored.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let stored: Vec<UserRole> = read_json(store, USER_ROLES_SLOT).unwrap_or_default();
        let mut catalog = Self::default();
        catalog
            .roles
            .extend(stored.into_iter().filter(|r| !r.is_system_role));
        catalog
    }

    /// Persists the custom roles only.
    pub fn save(&self, store: &dyn KeyValueStore) {
        write_json(store, USER_ROLES_SLOT, &self.custom_roles().collect::<Vec<_>>());
    }

    pub fn roles(&self) -> &[UserRole] {
        &self.roles
    }

    pub fn custom_roles(&self) -> impl Iterator<Item = &UserRole> {
        self.roles.iter().filter(|r| !r.is_system_role)
    }

    /// The system administrator sees every role, anyone else the
    /// built-in ones.
    pub fn visible_to(&self, principal: Option<&Principal>) -> Vec<UserRole> {
        if principal.is_some_and(|p| p.is_system_admin) {
            self.roles.clone()
        } else {
            self.roles.iter().filter(|r| r.is_system_role).cloned().collect()
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<&UserRole> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn create(&mut self, draft: RoleDraft, now: DateTime<Utc>) -> Result<&UserRole, RoleError> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(RoleError::EmptyName);
        }
        if self.find_by_name(name).is_some() {
            return Err(RoleError::DuplicateName(name.to_string()));
        }
        let role = UserRole {
            id: format!("role-{}", uuid::Uuid::new_v4().simple()),
            name: name.to_string(),
            display_name: draft.display_name,
            description: draft.description,
            permissions: draft.permissions,
            department: draft.department,
            is_system_role: false,
            created_at: now,
            updated_at: now,
        };
        tracing::info!(role = %role.name, "role created");
        self.roles.push(role);
        Ok(&self.roles[self.roles.len() - 1])
    }

    pub fn update(&mut self, id: &str, patch: RolePatch, now: DateTime<Utc>) -> Result<&UserRole, RoleError> {
        let role = self.custom_mut(id)?;
        if let Some(v) = patch.display_name {
            role.display_name = v;
        }
        if let Some(v) = patch.description {
            role.description = Some(v);
        }
        if let Some(v) = patch.permissions {
            role.permissions = v;
        }
        if let Some(v) = patch.department {
            role.department = Some(v);
        }
        role.updated_at = now;
        Ok(&*role)
    }

    pub fn delete(&mut self, id: &str) -> Result<UserRole, RoleError> {
        self.custom_mut(id)?;
        let index = self
            .roles
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RoleError::NotFound(id.to_string()))?;
        let role = self.roles.remove(index);
        tracing::info!(role = %role.name, "role deleted");
        Ok(role)
    }

    fn custom_mut(&mut self, id: &str) -> Result<&mut UserRole, RoleError> {
        let role = self
            .roles
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RoleError::NotFound(id.to_string()))?;
        if role.is_system_role {
            return Err(RoleError::SystemRole(role.name.clone()));
        }
        Ok(role)
    }
}
