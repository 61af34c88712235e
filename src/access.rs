//! Roles, permissions and the explicit access context of the acting user.
//!
//! Every destructive or administrative operation takes an [`AccessContext`] and asks it for a
//! [`Capability`]; there is no other place where permissions are evaluated.
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(Error::validation("role", &format!("unknown role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Something an actor may be allowed to do.
pub enum Capability {
    ViewDashboard,
    RecordReadings,
    ViewReadings,
    ViewCharts,
    ViewPerformance,
    ManageUsers,
    ManageSettings,
    DeleteRecords,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::ViewDashboard,
        Capability::RecordReadings,
        Capability::ViewReadings,
        Capability::ViewCharts,
        Capability::ViewPerformance,
        Capability::ManageUsers,
        Capability::ManageSettings,
        Capability::DeleteRecords,
    ];

    /// The permission string stored in a user profile for this capability.
    pub fn permission(&self) -> &'static str {
        match self {
            Capability::ViewDashboard => "/",
            Capability::RecordReadings => "/record",
            Capability::ViewReadings => "/readings",
            Capability::ViewCharts => "/charts",
            Capability::ViewPerformance => "/performance",
            Capability::ManageUsers => "/users",
            Capability::ManageSettings => "/settings",
            Capability::DeleteRecords => "delete_records",
        }
    }

    /// Capabilities that only the admin role holds, whatever the permission set says.
    pub fn is_admin_only(&self) -> bool {
        match self {
            Capability::ViewPerformance | Capability::ManageUsers | Capability::ManageSettings => true,
            _ => false,
        }
    }

    pub fn from_permission(permission: &str) -> Option<Capability> {
        Capability::ALL
            .iter()
            .copied()
            .find(|capability| capability.permission() == permission)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.permission())
    }
}

/// Every known permission string, as granted to the bootstrap administrator.
pub fn all_permissions() -> BTreeSet<String> {
    Capability::ALL
        .iter()
        .map(|capability| capability.permission().to_string())
        .collect()
}

/// Checks a permission list for unknown entries.
pub fn validate_permissions<I, S>(permissions: I) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut validated = BTreeSet::new();
    for permission in permissions {
        let permission = permission.as_ref().trim();
        if permission.is_empty() {
            continue;
        }
        if Capability::from_permission(permission).is_none() {
            return Err(Error::validation(
                "permissions",
                &format!("unknown permission '{}'", permission),
            ));
        }
        validated.insert(permission.to_string());
    }
    Ok(validated)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Profile of a user known to the identity provider.
pub struct UserProfile {
    /// Identity provider id.
    pub id: String,
    pub name: String,
    pub email: String,
    pub employee_number: String,
    pub role: Role,
    pub permissions: BTreeSet<String>,
}

#[derive(Debug, Clone)]
/// The acting user, passed explicitly to every operation that needs an authorization decision.
pub struct AccessContext {
    actor: UserProfile,
}

impl AccessContext {
    pub fn new(actor: UserProfile) -> Self {
        AccessContext { actor }
    }

    pub fn actor(&self) -> &UserProfile {
        &self.actor
    }

    pub fn is_admin(&self) -> bool {
        self.actor.role == Role::Admin
    }

    pub fn can(&self, capability: Capability) -> bool {
        if self.is_admin() {
            return true;
        }
        if capability.is_admin_only() {
            return false;
        }
        self.actor.permissions.contains(capability.permission())
    }

    /// # Errors
    ///
    /// * `Error::Forbidden` - The actor does not hold `capability`.
    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.can(capability) {
            Ok(())
        } else {
            log::warn!(target: "qclogd", "User '{}' was denied '{}'", self.actor.email, capability);
            Err(Error::Forbidden(capability))
        }
    }
}
