use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::models::sqlite_text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewDirectory,
    ViewOwnProfile,

    ManageChurches,
    ManagePositions,
    ManageSubjects,
    ManageWorkers,
    ManageAdmins,
    ManageUsers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Worker,
}

sqlite_text_enum!(Role);

static WORKER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewDirectory);
    permissions.insert(Permission::ViewOwnProfile);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(WORKER_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageChurches);
    permissions.insert(Permission::ManagePositions);
    permissions.insert(Permission::ManageSubjects);
    permissions.insert(Permission::ManageWorkers);
    permissions.insert(Permission::ManageAdmins);
    permissions.insert(Permission::ManageUsers);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Worker => &WORKER_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Worker => "worker",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "worker" => Ok(Role::Worker),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_inherits_worker_permissions() {
        for permission in Role::Worker.permissions() {
            assert!(Role::Admin.has_permission(*permission));
        }

        assert!(Role::Admin.has_permission(Permission::ManageAdmins));
        assert!(!Role::Worker.has_permission(Permission::ManageChurches));
        assert!(Role::Worker.has_permission(Permission::ViewDirectory));
    }

    #[test]
    fn test_role_round_trips_through_text() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(Role::Worker.to_string(), "worker");
        assert!("pastor".parse::<Role>().is_err());
    }
}
