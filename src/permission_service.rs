//! Permission catalog: named `(method, apiPath)` grants grouped by module.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{JobdeskError, Result};
use crate::listing;
use crate::pagination::Paginated;
use crate::query::{Filter, FilterOp, FilterValue};
use crate::store::{
    stamp_created, stamp_deleted, stamp_updated, strip_stamps, Actor, Database, PERMISSIONS,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePermission {
    pub name: String,
    #[serde(rename = "apiPath")]
    pub api_path: String,
    pub method: String,
    pub module: String,
}

#[derive(Clone)]
pub struct PermissionService {
    db: Arc<Database>,
}

impl PermissionService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a permission. The `(apiPath, method)` pair must be unique
    /// among live permissions; the method is stored uppercase.
    pub async fn create(&self, dto: CreatePermission, actor: &Actor) -> Result<Value> {
        let method = dto.method.to_ascii_uppercase();
        self.check_pair_free(&dto.api_path, &method, None).await?;

        let mut body = json!({
            "name": dto.name,
            "apiPath": dto.api_path,
            "method": method,
            "module": dto.module,
        });
        stamp_created(&mut body, actor);

        let stored = self.db.insert(PERMISSIONS, body).await?;
        Ok(json!({ "id": stored["id"], "createdAt": stored["createdAt"] }))
    }

    pub async fn find_all(&self, raw_query: &str) -> Result<Paginated<Value>> {
        listing::list(&self.db, PERMISSIONS, raw_query).await
    }

    pub async fn find_one(&self, id: &str) -> Result<Value> {
        self.db
            .find_by_id(PERMISSIONS, id)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("permission {}", id)))
    }

    pub async fn update(&self, id: &str, mut patch: Value, actor: &Actor) -> Result<Value> {
        let map = patch
            .as_object_mut()
            .ok_or_else(|| JobdeskError::Validation("Patch must be a JSON object".to_string()))?;
        map.remove("id");

        if let Some(method) = map.get("method").and_then(Value::as_str) {
            let upper = method.to_ascii_uppercase();
            map.insert("method".to_string(), json!(upper));
        }
        strip_stamps(&mut patch);

        // When either half of the pair changes, recheck uniqueness with
        // the other half taken from the stored document.
        if patch.get("apiPath").is_some() || patch.get("method").is_some() {
            let current = self.find_one(id).await?;
            let api_path = patch
                .get("apiPath")
                .or_else(|| current.get("apiPath"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let method = patch
                .get("method")
                .or_else(|| current.get("method"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            self.check_pair_free(&api_path, &method, Some(id)).await?;
        }

        stamp_updated(&mut patch, actor);

        self.db
            .update(PERMISSIONS, id, &patch)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("permission {}", id)))
    }

    /// Soft-delete a permission. Roles still holding its id see it as
    /// revoked; nothing is rewritten on their side.
    pub async fn remove(&self, id: &str, actor: &Actor) -> Result<()> {
        if self.db.find_by_id(PERMISSIONS, id).await?.is_none() {
            return Err(JobdeskError::NotFound(format!("permission {}", id)));
        }

        self.db.update(PERMISSIONS, id, &stamp_deleted(actor)).await?;
        self.db.soft_delete(PERMISSIONS, id).await
    }

    async fn check_pair_free(
        &self,
        api_path: &str,
        method: &str,
        except_id: Option<&str>,
    ) -> Result<()> {
        let mut filter = Filter::new();
        filter.push("apiPath", FilterOp::Eq(FilterValue::Str(api_path.to_string())));
        filter.push("method", FilterOp::Eq(FilterValue::Str(method.to_string())));

        if let Some(existing) = self.db.find_one(PERMISSIONS, &filter).await? {
            if existing["id"].as_str() != except_id {
                return Err(JobdeskError::Conflict(format!(
                    "Permission with apiPath={}, method={} already exists",
                    api_path, method
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

    async fn service() -> PermissionService {
        let db = Arc::new(Database::in_memory().await.expect("db"));
        PermissionService::new(db)
    }

    fn dto(method: &str, api_path: &str) -> CreatePermission {
        CreatePermission {
            name: format!("{} {}", method, api_path),
            api_path: api_path.to_string(),
            method: method.to_string(),
            module: "USERS".to_string(),
        }
    }

    #[tokio::test]
    async fn method_is_stored_uppercase() {
        let service = service().await;

        let created = service
            .create(dto("get", "/api/v1/users"), &actor())
            .await
            .expect("create");

        let fetched = service
            .find_one(created["id"].as_str().unwrap())
            .await
            .expect("fetch");
        assert_eq!(fetched["method"], json!("GET"));
    }

    #[tokio::test]
    async fn duplicate_pair_is_rejected_case_insensitively() {
        let service = service().await;

        service
            .create(dto("GET", "/api/v1/users"), &actor())
            .await
            .expect("first");

        let err = service
            .create(dto("get", "/api/v1/users"), &actor())
            .await
            .expect_err("same pair");
        assert!(matches!(err, JobdeskError::Conflict(_)));

        // Same path under a different method is a different grant.
        service
            .create(dto("POST", "/api/v1/users"), &actor())
            .await
            .expect("different method");
    }

    #[tokio::test]
    async fn update_recheck_uses_stored_half_of_the_pair() {
        let service = service().await;

        service
            .create(dto("GET", "/api/v1/users"), &actor())
            .await
            .expect("get");
        let post = service
            .create(dto("POST", "/api/v1/users"), &actor())
            .await
            .expect("post");
        let post_id = post["id"].as_str().unwrap();

        // Changing only the method would collide with the GET grant.
        let err = service
            .update(post_id, json!({ "method": "get" }), &actor())
            .await
            .expect_err("collision");
        assert!(matches!(err, JobdeskError::Conflict(_)));

        // A non-pair update is untouched by the check.
        let updated = service
            .update(post_id, json!({ "name": "Create users" }), &actor())
            .await
            .expect("rename");
        assert_eq!(updated["name"], json!("Create users"));
    }

    #[tokio::test]
    async fn removed_pair_is_reusable() {
        let service = service().await;

        let created = service
            .create(dto("DELETE", "/api/v1/users/:id"), &actor())
            .await
            .expect("create");
        service
            .remove(created["id"].as_str().unwrap(), &actor())
            .await
            .expect("remove");

        service
            .create(dto("DELETE", "/api/v1/users/:id"), &actor())
            .await
            .expect("pair free again");
    }

    #[tokio::test]
    async fn missing_permission_is_not_found() {
        let service = service().await;
        assert!(matches!(
            service.find_one("nope").await,
            Err(JobdeskError::NotFound(_))
        ));
        assert!(matches!(
            service.remove("nope", &actor()).await,
            Err(JobdeskError::NotFound(_))
        ));
    }
}
