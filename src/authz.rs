//! Role resolution and the role-permission authorization gate.
//!
//! A role document carries a list of permission ids; the resolver expands
//! them into permission summaries, dropping whatever no longer resolves.
//! The gate then answers one question: does any granted permission's
//! `(method, apiPath)` template cover the incoming request?

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::store::{Database, PERMISSIONS, ROLES};

/// Name of the protected administrator role.
pub const ADMIN_ROLE: &str = "ADMIN";
/// Name of the default role for self-registered accounts.
pub const USER_ROLE: &str = "USER";
/// Name of the role given to recruiter registrations.
pub const HR_ROLE: &str = "HR";

/// One granted permission, as exposed to the gate and to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "apiPath")]
    pub api_path: String,
    pub method: String,
    pub module: String,
}

/// A role with its permission list fully expanded.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedRole {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub permissions: Vec<PermissionSummary>,
}

/// Expands role documents into resolved roles.
#[derive(Clone)]
pub struct RoleResolver {
    db: Arc<Database>,
}

impl RoleResolver {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Resolve a role by id. Returns `None` when the role is missing or
    /// soft-deleted. An inactive role resolves with an empty permission
    /// set; a permission id that no longer resolves to a live permission
    /// document is treated as revoked and silently skipped.
    pub async fn resolve(&self, role_id: &str) -> Result<Option<ResolvedRole>> {
        let Some(role) = self.db.find_by_id(ROLES, role_id).await? else {
            return Ok(None);
        };

        let name = role
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let active = role
            .get("isActive")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut permissions = Vec::new();
        if active {
            for entry in permission_ids(&role) {
                if let Some(doc) = self.db.find_by_id(PERMISSIONS, &entry).await? {
                    if let Ok(summary) = serde_json::from_value::<PermissionSummary>(doc) {
                        permissions.push(summary);
                    }
                }
            }
        }

        Ok(Some(ResolvedRole {
            id: role_id.to_string(),
            name,
            active,
            permissions,
        }))
    }
}

/// Pull the permission id list out of a role document. Entries may be
/// plain id strings or embedded objects carrying an `id`.
fn permission_ids(role: &Value) -> Vec<String> {
    role.get("permissions")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match entry {
                    Value::String(id) => Some(id.clone()),
                    Value::Object(map) => map
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Decide whether a permission set covers `method path`.
///
/// Methods compare case-insensitively; paths match segment by segment
/// against the permission's template, where `:param` segments match any
/// single segment.
pub fn authorize(permissions: &[PermissionSummary], method: &str, path: &str) -> bool {
    let method = method.to_ascii_uppercase();
    permissions.iter().any(|p| {
        p.method.eq_ignore_ascii_case(&method) && template_matches(&p.api_path, path)
    })
}

/// Segment-wise template match. `/api/v1/users/:id` covers
/// `/api/v1/users/42` but not `/api/v1/users` or `/api/v1/users/42/x`.
pub fn template_matches(template: &str, path: &str) -> bool {
    let template_segments: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if template_segments.len() != path_segments.len() {
        return false;
    }

    template_segments
        .iter()
        .zip(&path_segments)
        .all(|(t, p)| t.starts_with(':') || t == p)
}
