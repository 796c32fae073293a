//! The authenticated principal, as supplied by the identity provider.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employee,
    Viewer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Skips license gating entirely.  Only the identity provider may
    /// set this; licensed users created at runtime never have it.
    #[serde(default)]
    pub is_system_admin: bool,
}

impl Principal {
    pub fn system_admin(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            role: Role::Admin,
            is_system_admin: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn licensed_users_are_not_system_admins_by_default() {
        let p: Principal = serde_json::from_str(
            r#"{"id": "u-7", "name": "Maya", "email": "maya@company.com", "role": "employee"}"#,
        )
        .unwrap();
        assert!(!p.is_system_admin);
        assert_eq!(p.role, Role::Employee);
        assert!(Principal::system_admin("a", "Admin", "a@x").is_system_admin);
    }
}
