//! Bootstrap seeding: the permission catalog, the two built-in roles, and
//! the initial accounts. Runs at startup when `SHOULD_INIT` is set, and
//! each collection is seeded only while it is still empty, so restarts
//! never duplicate data.

use std::sync::Arc;

use serde_json::json;

use crate::auth::hash_password;
use crate::authz::{ADMIN_ROLE, USER_ROLE};
use crate::config::JobdeskConfig;
use crate::error::Result;
use crate::query::{Filter, FilterValue};
use crate::store::{Database, PERMISSIONS, ROLES, USERS};
use crate::user_service::ROOT_ADMIN_EMAIL;

struct SeedPermission {
    name: &'static str,
    api_path: &'static str,
    method: &'static str,
    module: &'static str,
}

const INIT_PERMISSIONS: &[SeedPermission] = &[
    // USERS
    SeedPermission { name: "Create a user", api_path: "/api/v1/users", method: "POST", module: "USERS" },
    SeedPermission { name: "List users with pagination", api_path: "/api/v1/users", method: "GET", module: "USERS" },
    SeedPermission { name: "Fetch a user by id", api_path: "/api/v1/users/:id", method: "GET", module: "USERS" },
    SeedPermission { name: "Update a user", api_path: "/api/v1/users/:id", method: "PATCH", module: "USERS" },
    SeedPermission { name: "Delete a user", api_path: "/api/v1/users/:id", method: "DELETE", module: "USERS" },
    // ROLES
    SeedPermission { name: "Create a role", api_path: "/api/v1/roles", method: "POST", module: "ROLES" },
    SeedPermission { name: "List roles with pagination", api_path: "/api/v1/roles", method: "GET", module: "ROLES" },
    SeedPermission { name: "Fetch a role by id", api_path: "/api/v1/roles/:id", method: "GET", module: "ROLES" },
    SeedPermission { name: "Update a role", api_path: "/api/v1/roles/:id", method: "PATCH", module: "ROLES" },
    SeedPermission { name: "Delete a role", api_path: "/api/v1/roles/:id", method: "DELETE", module: "ROLES" },
    // PERMISSIONS
    SeedPermission { name: "Create a permission", api_path: "/api/v1/permissions", method: "POST", module: "PERMISSIONS" },
    SeedPermission { name: "List permissions with pagination", api_path: "/api/v1/permissions", method: "GET", module: "PERMISSIONS" },
    SeedPermission { name: "Fetch a permission by id", api_path: "/api/v1/permissions/:id", method: "GET", module: "PERMISSIONS" },
    SeedPermission { name: "Update a permission", api_path: "/api/v1/permissions/:id", method: "PATCH", module: "PERMISSIONS" },
    SeedPermission { name: "Delete a permission", api_path: "/api/v1/permissions/:id", method: "DELETE", module: "PERMISSIONS" },
    // COMPANIES
    SeedPermission { name: "Create a company", api_path: "/api/v1/companies", method: "POST", module: "COMPANIES" },
    SeedPermission { name: "List companies with pagination", api_path: "/api/v1/companies", method: "GET", module: "COMPANIES" },
    SeedPermission { name: "Fetch a company by id", api_path: "/api/v1/companies/:id", method: "GET", module: "COMPANIES" },
    SeedPermission { name: "Update a company", api_path: "/api/v1/companies/:id", method: "PATCH", module: "COMPANIES" },
    SeedPermission { name: "Delete a company", api_path: "/api/v1/companies/:id", method: "DELETE", module: "COMPANIES" },
    // RESUMES
    SeedPermission { name: "Submit a resume", api_path: "/api/v1/resumes", method: "POST", module: "RESUMES" },
    SeedPermission { name: "List resumes with pagination", api_path: "/api/v1/resumes", method: "GET", module: "RESUMES" },
    SeedPermission { name: "Fetch a resume by id", api_path: "/api/v1/resumes/:id", method: "GET", module: "RESUMES" },
    SeedPermission { name: "Update resume status", api_path: "/api/v1/resumes/:id", method: "PATCH", module: "RESUMES" },
    SeedPermission { name: "Delete a resume", api_path: "/api/v1/resumes/:id", method: "DELETE", module: "RESUMES" },
    SeedPermission { name: "List own resumes", api_path: "/api/v1/resumes/by-user", method: "POST", module: "RESUMES" },
];

/// Grants given to the default USER role: submitting and tracking own
/// resumes, plus browsing companies.
const USER_GRANTS: &[(&str, &str)] = &[
    ("POST", "/api/v1/resumes"),
    ("POST", "/api/v1/resumes/by-user"),
    ("GET", "/api/v1/companies"),
    ("GET", "/api/v1/companies/:id"),
];

/// Seed whatever is still empty. No-op when `SHOULD_INIT` is off.
pub async fn run(db: &Arc<Database>, config: &JobdeskConfig) -> Result<()> {
    if !config.should_init {
        return Ok(());
    }

    if db.count(PERMISSIONS, &Filter::new()).await? == 0 {
        let bodies = INIT_PERMISSIONS
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "apiPath": p.api_path,
                    "method": p.method,
                    "module": p.module,
                })
            })
            .collect();
        let stored = db.insert_many(PERMISSIONS, bodies).await?;
        tracing::info!(count = stored.len(), "seeded permission catalog");
    }

    if db.count(ROLES, &Filter::new()).await? == 0 {
        let all = db.find(PERMISSIONS, &Filter::new(), None, None, None).await?;

        let all_ids: Vec<String> = all
            .iter()
            .filter_map(|p| p["id"].as_str().map(str::to_string))
            .collect();
        let user_ids: Vec<String> = all
            .iter()
            .filter(|p| {
                USER_GRANTS.iter().any(|(method, path)| {
                    p["method"].as_str() == Some(method) && p["apiPath"].as_str() == Some(path)
                })
            })
            .filter_map(|p| p["id"].as_str().map(str::to_string))
            .collect();

        db.insert(
            ROLES,
            json!({
                "name": ADMIN_ROLE,
                "description": "Administrator with every permission",
                "isActive": true,
                "permissions": all_ids,
            }),
        )
        .await?;
        db.insert(
            ROLES,
            json!({
                "name": USER_ROLE,
                "description": "Default role for registered accounts",
                "isActive": true,
                "permissions": user_ids,
            }),
        )
        .await?;
        tracing::info!("seeded built-in roles");
    }

    if db.count(USERS, &Filter::new()).await? == 0 {
        let admin_role = role_id(db, ADMIN_ROLE).await?;
        let user_role = role_id(db, USER_ROLE).await?;
        let password = hash_password(&config.init_password)?;

        let accounts = vec![
            json!({
                "name": "Luffy",
                "email": ROOT_ADMIN_EMAIL,
                "password": password,
                "age": 20,
                "gender": "MALE",
                "address": "Grand Line",
                "role": admin_role,
            }),
            json!({
                "name": "Zoro",
                "email": "zoro@gmail.com",
                "password": password,
                "age": 21,
                "gender": "MALE",
                "address": "Grand Line",
                "role": admin_role,
            }),
            json!({
                "name": "Black Beard",
                "email": "rauden@gmail.com",
                "password": password,
                "age": 40,
                "gender": "MALE",
                "address": "New World",
                "role": user_role,
            }),
        ];
        let stored = db.insert_many(USERS, accounts).await?;
        tracing::info!(count = stored.len(), "seeded initial accounts");
    }

    Ok(())
}

async fn role_id(db: &Database, name: &str) -> Result<String> {
    let role = db
        .find_one(ROLES, &Filter::field_eq("name", FilterValue::Str(name.to_string())))
        .await?
        .ok_or_else(|| crate::error::JobdeskError::Database(format!("Seed role {} missing", name)))?;
    Ok(role["id"].as_str().unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;

    fn config(should_init: bool) -> JobdeskConfig {
        JobdeskConfig {
            database_path: ":memory:".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            jwt_secret: "test".to_string(),
            jwt_ttl_secs: 60,
            should_init,
            init_password: "123456".to_string(),
        }
    }

    #[tokio::test]
    async fn seeds_catalog_roles_and_accounts() {
        let db = Arc::new(Database::in_memory().await.expect("db"));

        run(&db, &config(true)).await.expect("seed");

        assert_eq!(
            db.count(PERMISSIONS, &Filter::new()).await.expect("count"),
            INIT_PERMISSIONS.len() as i64
        );
        assert_eq!(db.count(ROLES, &Filter::new()).await.expect("count"), 2);
        assert_eq!(db.count(USERS, &Filter::new()).await.expect("count"), 3);

        let root = db
            .find_one(
                USERS,
                &Filter::field_eq("email", FilterValue::Str(ROOT_ADMIN_EMAIL.to_string())),
            )
            .await
            .expect("lookup")
            .expect("root exists");
        assert!(verify_password(
            "123456",
            root["password"].as_str().expect("hash")
        ));

        // ADMIN holds the full catalog, USER only its grants.
        let admin = db
            .find_one(ROLES, &Filter::field_eq("name", FilterValue::Str(ADMIN_ROLE.into())))
            .await
            .expect("lookup")
            .expect("admin role");
        assert_eq!(
            admin["permissions"].as_array().expect("ids").len(),
            INIT_PERMISSIONS.len()
        );

        let user = db
            .find_one(ROLES, &Filter::field_eq("name", FilterValue::Str(USER_ROLE.into())))
            .await
            .expect("lookup")
            .expect("user role");
        assert_eq!(
            user["permissions"].as_array().expect("ids").len(),
            USER_GRANTS.len()
        );
    }

    #[tokio::test]
    async fn rerun_is_a_no_op() {
        let db = Arc::new(Database::in_memory().await.expect("db"));

        run(&db, &config(true)).await.expect("first run");
        run(&db, &config(true)).await.expect("second run");

        assert_eq!(db.count(USERS, &Filter::new()).await.expect("count"), 3);
        assert_eq!(db.count(ROLES, &Filter::new()).await.expect("count"), 2);
    }

    #[tokio::test]
    async fn disabled_seeder_writes_nothing() {
        let db = Arc::new(Database::in_memory().await.expect("db"));

        run(&db, &config(false)).await.expect("no-op");

        assert_eq!(db.count(USERS, &Filter::new()).await.expect("count"), 0);
        assert_eq!(
            db.count(PERMISSIONS, &Filter::new()).await.expect("count"),
            0
        );
    }
}
