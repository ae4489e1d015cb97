//! Role management. Role names are unique among live roles, and the
//! administrator role is protected from deletion.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::authz::ADMIN_ROLE;
use crate::error::{JobdeskError, Result};
use crate::pagination::Paginated;
use crate::query::{Filter, FilterValue};
use crate::store::{
    stamp_created, stamp_deleted, stamp_updated, strip_stamps, Actor, Database, PERMISSIONS, ROLES,
};
use crate::listing;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRole {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
}

fn default_active() -> bool {
    true
}

#[derive(Clone)]
pub struct RoleService {
    db: Arc<Database>,
}

impl RoleService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn create(&self, dto: CreateRole, actor: &Actor) -> Result<Value> {
        self.check_name_free(&dto.name, None).await?;

        let mut body = json!({
            "name": dto.name,
            "description": dto.description,
            "isActive": dto.is_active,
            "permissions": dto.permissions,
        });
        stamp_created(&mut body, actor);

        let stored = self.db.insert(ROLES, body).await?;
        Ok(json!({ "id": stored["id"], "createdAt": stored["createdAt"] }))
    }

    pub async fn find_all(&self, raw_query: &str) -> Result<Paginated<Value>> {
        listing::list(&self.db, ROLES, raw_query).await
    }

    /// Fetch one role with its permission ids expanded into live
    /// permission documents; dangling ids are dropped.
    pub async fn find_one(&self, id: &str) -> Result<Value> {
        let mut role = self
            .db
            .find_by_id(ROLES, id)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("role {}", id)))?;

        let ids: Vec<String> = role
            .get("permissions")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut expanded = Vec::with_capacity(ids.len());
        for perm_id in ids {
            if let Some(doc) = self.db.find_by_id(PERMISSIONS, &perm_id).await? {
                expanded.push(doc);
            }
        }
        role["permissions"] = Value::Array(expanded);

        Ok(role)
    }

    pub async fn update(&self, id: &str, mut patch: Value, actor: &Actor) -> Result<Value> {
        let map = patch
            .as_object_mut()
            .ok_or_else(|| JobdeskError::Validation("Patch must be a JSON object".to_string()))?;
        map.remove("id");
        strip_stamps(&mut patch);

        if let Some(name) = patch.get("name").and_then(Value::as_str) {
            let name = name.to_string();
            self.check_name_free(&name, Some(id)).await?;
        }

        stamp_updated(&mut patch, actor);

        self.db
            .update(ROLES, id, &patch)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("role {}", id)))
    }

    /// Soft-delete a role. The administrator role is protected.
    pub async fn remove(&self, id: &str, actor: &Actor) -> Result<()> {
        let role = self
            .db
            .find_by_id(ROLES, id)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("role {}", id)))?;

        if role.get("name").and_then(Value::as_str) == Some(ADMIN_ROLE) {
            return Err(JobdeskError::Conflict(format!(
                "Cannot delete the {} role",
                ADMIN_ROLE
            )));
        }

        self.db.update(ROLES, id, &stamp_deleted(actor)).await?;
        self.db.soft_delete(ROLES, id).await
    }

    /// Advisory duplicate check; the store's partial unique index is the
    /// real guard.
    async fn check_name_free(&self, name: &str, except_id: Option<&str>) -> Result<()> {
        if let Some(existing) = self
            .db
            .find_one(ROLES, &Filter::field_eq("name", FilterValue::Str(name.to_string())))
            .await?
        {
            if existing["id"].as_str() != except_id {
                return Err(JobdeskError::Validation(format!(
                    "Role with name {} already exists",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> Actor {
        Actor::new("admin-1", "admin@x.io")
    }

    async fn service() -> (RoleService, Arc<Database>) {
        let db = Arc::new(Database::in_memory().await.expect("db"));
        (RoleService::new(db.clone()), db)
    }

    fn create_dto(name: &str) -> CreateRole {
        CreateRole {
            name: name.to_string(),
            description: Some(format!("{} role", name)),
            is_active: true,
            permissions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn duplicate_live_name_is_rejected() {
        let (service, _db) = service().await;

        service.create(create_dto("HR"), &actor()).await.expect("first");
        let err = service
            .create(create_dto("HR"), &actor())
            .await
            .expect_err("duplicate");
        assert!(matches!(err, JobdeskError::Validation(_)));
    }

    #[tokio::test]
    async fn name_is_reusable_after_soft_delete() {
        let (service, _db) = service().await;

        let first = service.create(create_dto("HR"), &actor()).await.expect("create");
        service
            .remove(first["id"].as_str().unwrap(), &actor())
            .await
            .expect("remove");

        service
            .create(create_dto("HR"), &actor())
            .await
            .expect("name is free again");
    }

    #[tokio::test]
    async fn admin_role_cannot_be_deleted() {
        let (service, _db) = service().await;

        let admin = service
            .create(create_dto(ADMIN_ROLE), &actor())
            .await
            .expect("create");
        let err = service
            .remove(admin["id"].as_str().unwrap(), &actor())
            .await
            .expect_err("protected");
        assert!(matches!(err, JobdeskError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_checks_name_but_allows_self_rename() {
        let (service, _db) = service().await;

        let hr = service.create(create_dto("HR"), &actor()).await.expect("hr");
        service.create(create_dto("SALES"), &actor()).await.expect("sales");
        let hr_id = hr["id"].as_str().unwrap();

        let err = service
            .update(hr_id, json!({ "name": "SALES" }), &actor())
            .await
            .expect_err("collision");
        assert!(matches!(err, JobdeskError::Validation(_)));

        // Re-submitting its own name is not a collision.
        let updated = service
            .update(hr_id, json!({ "name": "HR", "description": "updated" }), &actor())
            .await
            .expect("self rename");
        assert_eq!(updated["description"], json!("updated"));
        assert_eq!(updated["updatedBy"]["id"], json!("admin-1"));
    }

    #[tokio::test]
    async fn find_one_expands_live_permissions_only() {
        let (service, db) = service().await;

        let perm = db
            .insert(
                PERMISSIONS,
                json!({ "name": "List users", "apiPath": "/api/v1/users", "method": "GET", "module": "USERS" }),
            )
            .await
            .expect("insert");
        let perm_id = perm["id"].as_str().unwrap().to_string();

        let mut dto = create_dto("HR");
        dto.permissions = vec![perm_id.clone(), "dangling".to_string()];
        let role = service.create(dto, &actor()).await.expect("create");

        let fetched = service
            .find_one(role["id"].as_str().unwrap())
            .await
            .expect("fetch");
        let permissions = fetched["permissions"].as_array().expect("array");
        assert_eq!(permissions.len(), 1);
        assert_eq!(permissions[0]["id"], json!(perm_id));
    }

    #[tokio::test]
    async fn missing_role_is_not_found() {
        let (service, _db) = service().await;
        let err = service.find_one("nope").await.expect_err("missing");
        assert!(matches!(err, JobdeskError::NotFound(_)));
    }
}
