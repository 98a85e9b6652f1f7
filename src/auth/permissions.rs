//! Permission names and the route permission table

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use hyper::Method;

/// Achievement permissions carried in the bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Create,
    Update,
    Delete,
    Verify,
    /// Implies every other permission
    Manage,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "achievement:read",
            Permission::Create => "achievement:create",
            Permission::Update => "achievement:update",
            Permission::Delete => "achievement:delete",
            Permission::Verify => "achievement:verify",
            Permission::Manage => "achievement:manage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    /// Accepts `achievement:<action>` and the legacy `prestasi:<action>` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = s
            .strip_prefix("achievement:")
            .or_else(|| s.strip_prefix("prestasi:"))
            .ok_or_else(|| format!("unknown permission: {}", s))?;

        match action {
            "read" => Ok(Permission::Read),
            "create" => Ok(Permission::Create),
            "update" => Ok(Permission::Update),
            "delete" => Ok(Permission::Delete),
            "verify" => Ok(Permission::Verify),
            "manage" => Ok(Permission::Manage),
            _ => Err(format!("unknown permission: {}", s)),
        }
    }
}

/// Parse a list of permission names, skipping ones this service does not know.
pub fn parse_permissions<'a>(names: impl IntoIterator<Item = &'a String>) -> Vec<Permission> {
    names
        .into_iter()
        .filter_map(|n| n.parse::<Permission>().ok())
        .collect()
}

/// Get the permission required for an achievement route.
///
/// `segments` is the path below `/api/v1/achievements`, e.g. `["{id}", "verify"]`.
/// Returns None for routes that do not exist.
pub fn get_required_permission(method: &Method, segments: &[&str]) -> Option<Permission> {
    match (method, segments) {
        (&Method::GET, []) => Some(Permission::Read),
        (&Method::POST, []) => Some(Permission::Create),
        (&Method::GET, [_]) => Some(Permission::Read),
        (&Method::PUT, [_]) => Some(Permission::Update),
        (&Method::DELETE, [_]) => Some(Permission::Delete),
        (&Method::POST, [_, "submit"]) => Some(Permission::Update),
        (&Method::POST, [_, "verify"]) => Some(Permission::Verify),
        (&Method::POST, [_, "reject"]) => Some(Permission::Verify),
        (&Method::GET, [_, "history"]) => Some(Permission::Read),
        (&Method::POST, [_, "attachments"]) => Some(Permission::Update),
        _ => None,
    }
}
