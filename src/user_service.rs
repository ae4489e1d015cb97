//! User management: registration, CRUD, and credential persistence.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::hash_password;
use crate::authz::{HR_ROLE, USER_ROLE};
use crate::error::{JobdeskError, Result};
use crate::listing::{self, scrub_secrets};
use crate::pagination::Paginated;
use crate::query::{Filter, FilterValue};
use crate::store::{
    stamp_created, stamp_deleted, stamp_updated, strip_stamps, Actor, Database, COMPANIES, ROLES,
    USERS,
};

/// The seeded root administrator; this account cannot be deleted.
pub const ROOT_ADMIN_EMAIL: &str = "admin@gmail.com";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

/// Self-registration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Recruiter registration payload: an account plus its company.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRecruiter {
    #[serde(flatten)]
    pub user: RegisterUser,
    pub company: CompanyRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyRef {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// Admin-side create payload; the role is chosen by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    #[serde(flatten)]
    pub base: RegisterUser,
    pub role: String,
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<Database>,
}

impl UserService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Self-registration. The new account always gets the default role.
    /// Returns the stored user with secrets removed.
    pub async fn register(&self, dto: RegisterUser) -> Result<Value> {
        self.validate_new_email(&dto.email).await?;

        let role_id = self.role_id_by_name(USER_ROLE).await?;
        let body = self.build_user_body(&dto, &role_id, None)?;

        let mut stored = self.db.insert(USERS, body).await?;
        scrub_secrets(&mut stored);
        Ok(stored)
    }

    /// Recruiter registration: creates the account under the HR role,
    /// then its company, and links the two. If the company write fails
    /// the freshly created account is soft-deleted so no orphan survives.
    pub async fn register_recruiter(&self, dto: RegisterRecruiter) -> Result<Value> {
        self.validate_new_email(&dto.user.email).await?;

        let role_id = self.hr_role_id().await?;
        let body = self.build_user_body(&dto.user, &role_id, None)?;
        let user = self.db.insert(USERS, body).await?;
        let user_id = doc_id(&user)?;

        let creator = Actor::new(user_id.clone(), dto.user.email.clone());
        let mut company = json!({
            "name": dto.company.name,
            "address": dto.company.address,
        });
        stamp_created(&mut company, &creator);

        let company = match self.db.insert(COMPANIES, company).await {
            Ok(company) => company,
            Err(e) => {
                self.db.soft_delete(USERS, &user_id).await?;
                return Err(e);
            }
        };

        let snapshot = json!({
            "id": company["id"],
            "name": company["name"],
        });
        let mut linked = self
            .db
            .update(USERS, &user_id, &json!({ "company": snapshot }))
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("user {}", user_id)))?;
        scrub_secrets(&mut linked);
        Ok(linked)
    }

    /// Admin-side create with an explicit role.
    pub async fn create(&self, dto: CreateUser, actor: &Actor) -> Result<Value> {
        self.validate_new_email(&dto.base.email).await?;

        if self.db.find_by_id(ROLES, &dto.role).await?.is_none() {
            return Err(JobdeskError::NotFound(format!("role {}", dto.role)));
        }

        let mut body = self.build_user_body(&dto.base, &dto.role, None)?;
        stamp_created(&mut body, actor);

        let stored = self.db.insert(USERS, body).await?;
        Ok(json!({ "id": stored["id"], "createdAt": stored["createdAt"] }))
    }

    pub async fn find_all(&self, raw_query: &str) -> Result<Paginated<Value>> {
        listing::list(&self.db, USERS, raw_query).await
    }

    /// Fetch one user with secrets removed and the role reference
    /// resolved to an `{id, name}` snapshot.
    pub async fn find_one(&self, id: &str) -> Result<Value> {
        let mut user = self
            .db
            .find_by_id(USERS, id)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("user {}", id)))?;

        if let Some(role_id) = user.get("role").and_then(Value::as_str) {
            let role_id = role_id.to_string();
            if let Some(role) = self.db.find_by_id(ROLES, &role_id).await? {
                user["role"] = json!({ "id": role["id"], "name": role["name"] });
            }
        }

        scrub_secrets(&mut user);
        Ok(user)
    }

    /// Internal lookup for the login flow. Returns the raw document,
    /// password hash included.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Value>> {
        self.db
            .find_one(USERS, &Filter::field_eq("email", FilterValue::Str(email.to_string())))
            .await
    }

    /// Patch a user. The password never changes through this path, an
    /// email change must not collide with another live account, and a
    /// role change must point at a live role.
    pub async fn update(&self, id: &str, mut patch: Value, actor: &Actor) -> Result<Value> {
        let map = patch
            .as_object_mut()
            .ok_or_else(|| JobdeskError::Validation("Patch must be a JSON object".to_string()))?;
        map.remove("password");
        map.remove("refreshToken");
        map.remove("id");
        strip_stamps(&mut patch);

        if let Some(role_id) = patch.get("role").and_then(Value::as_str) {
            let role_id = role_id.to_string();
            if self.db.find_by_id(ROLES, &role_id).await?.is_none() {
                return Err(JobdeskError::NotFound(format!("role {}", role_id)));
            }
        }

        if let Some(email) = patch.get("email").and_then(Value::as_str) {
            let email = email.to_string();
            if let Some(existing) = self.find_by_email(&email).await? {
                if existing["id"].as_str() != Some(id) {
                    return Err(JobdeskError::Validation(format!(
                        "Email: {} already exists",
                        email
                    )));
                }
            }
        }

        stamp_updated(&mut patch, actor);

        let mut updated = self
            .db
            .update(USERS, id, &patch)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("user {}", id)))?;
        scrub_secrets(&mut updated);
        Ok(updated)
    }

    /// Soft-delete a user. The root administrator is protected.
    pub async fn remove(&self, id: &str, actor: &Actor) -> Result<()> {
        let user = self
            .db
            .find_by_id(USERS, id)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("user {}", id)))?;

        if user.get("email").and_then(Value::as_str) == Some(ROOT_ADMIN_EMAIL) {
            return Err(JobdeskError::Conflict(
                "Cannot delete the root administrator account".to_string(),
            ));
        }

        self.db.update(USERS, id, &stamp_deleted(actor)).await?;
        self.db.soft_delete(USERS, id).await
    }

    /// Persist a refresh-token digest, or clear it on logout.
    pub async fn set_refresh_digest(&self, id: &str, digest: Option<&str>) -> Result<()> {
        let patch = match digest {
            Some(digest) => json!({ "refreshToken": digest }),
            None => json!({ "refreshToken": null }),
        };
        self.db
            .update(USERS, id, &patch)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("user {}", id)))?;
        Ok(())
    }

    /// Find the user holding a given refresh-token digest.
    pub async fn find_by_refresh_digest(&self, digest: &str) -> Result<Option<Value>> {
        self.db
            .find_one(
                USERS,
                &Filter::field_eq("refreshToken", FilterValue::Str(digest.to_string())),
            )
            .await
    }

    async fn validate_new_email(&self, email: &str) -> Result<()> {
        if !EMAIL_RE.is_match(email) {
            return Err(JobdeskError::Validation(format!(
                "Invalid email: {}",
                email
            )));
        }
        if self.find_by_email(email).await?.is_some() {
            return Err(JobdeskError::Validation(format!(
                "Email: {} already exists, please use another email",
                email
            )));
        }
        Ok(())
    }

    async fn role_id_by_name(&self, name: &str) -> Result<String> {
        let role = self
            .db
            .find_one(ROLES, &Filter::field_eq("name", FilterValue::Str(name.to_string())))
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("role {}", name)))?;
        doc_id(&role)
    }

    /// The HR role, created on first recruiter registration when no
    /// administrator has set one up yet.
    async fn hr_role_id(&self) -> Result<String> {
        match self.role_id_by_name(HR_ROLE).await {
            Ok(id) => Ok(id),
            Err(JobdeskError::NotFound(_)) => {
                let role = self
                    .db
                    .insert(
                        ROLES,
                        json!({
                            "name": HR_ROLE,
                            "description": "Recruiter role",
                            "isActive": true,
                            "permissions": [],
                        }),
                    )
                    .await?;
                doc_id(&role)
            }
            Err(e) => Err(e),
        }
    }

    fn build_user_body(
        &self,
        dto: &RegisterUser,
        role_id: &str,
        company: Option<Value>,
    ) -> Result<Value> {
        if dto.password.is_empty() {
            return Err(JobdeskError::Validation(
                "Password must not be empty".to_string(),
            ));
        }

        Ok(json!({
            "name": dto.name,
            "email": dto.email,
            "password": hash_password(&dto.password)?,
            "age": dto.age,
            "gender": dto.gender,
            "address": dto.address,
            "role": role_id,
            "company": company,
        }))
    }
}

fn doc_id(doc: &Value) -> Result<String> {
    doc.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| JobdeskError::Database("Document missing id".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::authz::ADMIN_ROLE;

    async fn service_with_roles() -> (UserService, Arc<Database>, String) {
        let db = Arc::new(Database::in_memory().await.expect("db"));
        let role = db
            .insert(ROLES, json!({ "name": USER_ROLE, "isActive": true, "permissions": [] }))
            .await
            .expect("insert role");
        let role_id = role["id"].as_str().unwrap().to_string();
        (UserService::new(db.clone()), db, role_id)
    }

    fn register_dto(email: &str) -> RegisterUser {
        RegisterUser {
            name: "Luffy".to_string(),
            email: email.to_string(),
            password: "s3cret!".to_string(),
            age: Some(20),
            gender: Some("MALE".to_string()),
            address: None,
        }
    }

    #[tokio::test]
    async fn register_assigns_default_role_and_hides_password() {
        let (service, db, role_id) = service_with_roles().await;

        let user = service
            .register(register_dto("luffy@x.io"))
            .await
            .expect("should register");

        assert_eq!(user["role"], json!(role_id));
        assert!(user.get("password").is_none());

        // The stored document carries a verifiable hash, not the clear text.
        let stored = db
            .find_by_id(USERS, user["id"].as_str().unwrap())
            .await
            .expect("fetch")
            .expect("exists");
        let hash = stored["password"].as_str().expect("hash present");
        assert!(verify_password("s3cret!", hash));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (service, _db, _role) = service_with_roles().await;

        service
            .register(register_dto("dup@x.io"))
            .await
            .expect("first registration");

        let err = service
            .register(register_dto("dup@x.io"))
            .await
            .expect_err("second must fail");
        assert!(matches!(err, JobdeskError::Validation(_)));
        assert!(err.user_message().contains("dup@x.io"));
    }

    #[tokio::test]
    async fn malformed_email_is_rejected() {
        let (service, _db, _role) = service_with_roles().await;
        let err = service
            .register(register_dto("not-an-email"))
            .await
            .expect_err("should reject");
        assert!(matches!(err, JobdeskError::Validation(_)));
    }

    #[tokio::test]
    async fn recruiter_registration_links_company() {
        let (service, db, _role) = service_with_roles().await;

        let dto = RegisterRecruiter {
            user: register_dto("hr@acme.io"),
            company: CompanyRef {
                name: "Acme".to_string(),
                address: Some("Hanoi".to_string()),
            },
        };

        let user = service
            .register_recruiter(dto)
            .await
            .expect("should register");

        assert_eq!(user["company"]["name"], json!("Acme"));

        let companies = db
            .count(COMPANIES, &Filter::new())
            .await
            .expect("count");
        assert_eq!(companies, 1);
    }

    #[tokio::test]
    async fn recruiter_gets_the_hr_role() {
        let (service, db, user_role_id) = service_with_roles().await;

        // No HR role exists yet; the first recruiter registration
        // creates it.
        let dto = RegisterRecruiter {
            user: register_dto("hr@acme.io"),
            company: CompanyRef {
                name: "Acme".to_string(),
                address: None,
            },
        };
        let user = service
            .register_recruiter(dto)
            .await
            .expect("should register");

        let role_id = user["role"].as_str().expect("role id");
        assert_ne!(role_id, user_role_id);

        let role = db
            .find_by_id(ROLES, role_id)
            .await
            .expect("fetch role")
            .expect("role exists");
        assert_eq!(role["name"], json!(HR_ROLE));

        // A second recruiter reuses the same role.
        let dto = RegisterRecruiter {
            user: register_dto("hr2@acme.io"),
            company: CompanyRef {
                name: "Globex".to_string(),
                address: None,
            },
        };
        let second = service
            .register_recruiter(dto)
            .await
            .expect("should register");
        assert_eq!(second["role"].as_str(), Some(role_id));
    }

    #[tokio::test]
    async fn update_never_changes_password_and_checks_email() {
        let (service, db, _role) = service_with_roles().await;
        let actor = Actor::new("admin-1", "admin@x.io");

        let a = service.register(register_dto("a@x.io")).await.expect("a");
        service.register(register_dto("b@x.io")).await.expect("b");
        let a_id = a["id"].as_str().unwrap();

        let err = service
            .update(a_id, json!({ "email": "b@x.io" }), &actor)
            .await
            .expect_err("duplicate email");
        assert!(matches!(err, JobdeskError::Validation(_)));

        let updated = service
            .update(a_id, json!({ "name": "Monkey D. Luffy", "password": "pwned" }), &actor)
            .await
            .expect("should update");
        assert_eq!(updated["name"], json!("Monkey D. Luffy"));
        assert_eq!(updated["updatedBy"]["id"], json!("admin-1"));

        let stored = db
            .find_by_id(USERS, a_id)
            .await
            .expect("fetch")
            .expect("exists");
        assert!(verify_password("s3cret!", stored["password"].as_str().unwrap()));
    }

    #[tokio::test]
    async fn update_cannot_forge_audit_stamps() {
        let (service, db, role_id) = service_with_roles().await;
        let creator = Actor::new("admin-1", "admin@x.io");

        let created = service
            .create(
                CreateUser {
                    base: register_dto("stamped@x.io"),
                    role: role_id,
                },
                &creator,
            )
            .await
            .expect("create");
        let id = created["id"].as_str().unwrap();

        let forged = json!({
            "name": "Still Luffy",
            "createdBy": { "id": "forged", "email": "evil@x.io" },
            "createdAt": "1999-01-01T00:00:00Z",
            "deletedBy": { "id": "forged", "email": "evil@x.io" },
            "deletedAt": "1999-01-01T00:00:00Z",
            "isDeleted": true,
        });
        let updated = service
            .update(id, forged, &Actor::new("admin-2", "other@x.io"))
            .await
            .expect("update");

        assert_eq!(updated["name"], json!("Still Luffy"));
        assert_eq!(updated["createdBy"]["id"], json!("admin-1"));
        assert!(updated.get("deletedBy").is_none());
        assert!(updated.get("deletedAt").is_none());
        assert_eq!(updated["isDeleted"], json!(false));

        // The record is still live.
        assert!(db
            .find_by_id(USERS, id)
            .await
            .expect("fetch")
            .is_some());
    }

    #[tokio::test]
    async fn update_validates_role_reference() {
        let (service, _db, role_id) = service_with_roles().await;
        let actor = Actor::new("admin-1", "admin@x.io");

        let user = service
            .register(register_dto("rolechange@x.io"))
            .await
            .expect("register");
        let id = user["id"].as_str().unwrap();

        let err = service
            .update(id, json!({ "role": "no-such-role" }), &actor)
            .await
            .expect_err("dangling role reference");
        assert!(matches!(err, JobdeskError::NotFound(_)));

        let updated = service
            .update(id, json!({ "role": role_id.clone() }), &actor)
            .await
            .expect("live role is accepted");
        assert_eq!(updated["role"], json!(role_id));
    }

    #[tokio::test]
    async fn root_admin_cannot_be_deleted() {
        let (service, _db, _role) = service_with_roles().await;
        let actor = Actor::new("admin-1", "admin@x.io");

        let root = service
            .register(register_dto(ROOT_ADMIN_EMAIL))
            .await
            .expect("register root");

        let err = service
            .remove(root["id"].as_str().unwrap(), &actor)
            .await
            .expect_err("must be protected");
        assert!(matches!(err, JobdeskError::Conflict(_)));
    }

    #[tokio::test]
    async fn remove_stamps_and_hides() {
        let (service, _db, _role) = service_with_roles().await;
        let actor = Actor::new("admin-1", "admin@x.io");

        let user = service.register(register_dto("gone@x.io")).await.expect("register");
        let id = user["id"].as_str().unwrap();

        service.remove(id, &actor).await.expect("remove");

        let err = service.find_one(id).await.expect_err("hidden");
        assert!(matches!(err, JobdeskError::NotFound(_)));

        let err = service.remove(id, &actor).await.expect_err("already gone");
        assert!(matches!(err, JobdeskError::NotFound(_)));
    }

    #[tokio::test]
    async fn refresh_digest_round_trip() {
        let (service, _db, _role) = service_with_roles().await;

        let user = service.register(register_dto("r@x.io")).await.expect("register");
        let id = user["id"].as_str().unwrap();

        service
            .set_refresh_digest(id, Some("digest-1"))
            .await
            .expect("set");
        let found = service
            .find_by_refresh_digest("digest-1")
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(found["id"].as_str(), Some(id));

        service.set_refresh_digest(id, None).await.expect("clear");
        assert!(service
            .find_by_refresh_digest("digest-1")
            .await
            .expect("lookup")
            .is_none());
    }

    #[tokio::test]
    async fn create_requires_existing_role() {
        let (service, _db, role_id) = service_with_roles().await;
        let actor = Actor::new("admin-1", "admin@x.io");

        let err = service
            .create(
                CreateUser {
                    base: register_dto("c@x.io"),
                    role: "no-such-role".to_string(),
                },
                &actor,
            )
            .await
            .expect_err("unknown role");
        assert!(matches!(err, JobdeskError::NotFound(_)));

        let created = service
            .create(
                CreateUser {
                    base: register_dto("c@x.io"),
                    role: role_id,
                },
                &actor,
            )
            .await
            .expect("should create");
        assert!(created["id"].as_str().is_some());
        assert!(created["createdAt"].as_str().is_some());
    }

    #[tokio::test]
    async fn find_one_resolves_role_snapshot() {
        let (service, db, role_id) = service_with_roles().await;

        let user = service.register(register_dto("snap@x.io")).await.expect("register");
        let fetched = service
            .find_one(user["id"].as_str().unwrap())
            .await
            .expect("fetch");

        assert_eq!(fetched["role"]["id"], json!(role_id));
        assert_eq!(fetched["role"]["name"], json!(USER_ROLE));

        // Admin role exists but was never assigned.
        db.insert(ROLES, json!({ "name": ADMIN_ROLE, "isActive": true, "permissions": [] }))
            .await
            .expect("insert");
        let fetched = service
            .find_one(user["id"].as_str().unwrap())
            .await
            .expect("fetch");
        assert_eq!(fetched["role"]["name"], json!(USER_ROLE));
    }
}
