//! Shared listing pipeline used by every collection endpoint.
//!
//! One raw query string in, one paginated envelope out. The pipeline runs
//! translate, count, paginate, fetch, populate, project, in that order.
//! The count pass always runs over the full filtered set, never the
//! current window.

use serde_json::Value;

use crate::error::{JobdeskError, Result};
use crate::pagination::{paginate, Paginated};
use crate::query::{page_params, translate};
use crate::store::{Database, COMPANIES, PERMISSIONS, ROLES, USERS};

/// Fields never returned to clients, whatever the projection says.
const SECRET_FIELDS: [&str; 2] = ["password", "refreshToken"];

/// Run the full listing pipeline for one collection.
pub async fn list(db: &Database, collection: &str, raw_query: &str) -> Result<Paginated<Value>> {
    let (current, page_size) = page_params(raw_query);
    if current < 1 {
        return Err(JobdeskError::Validation(
            "current must be at least 1".to_string(),
        ));
    }

    let descriptor = translate(raw_query)?;

    let total = db.count(collection, &descriptor.filter).await?;
    let window = paginate(current, page_size, total);

    let mut documents = db
        .find(
            collection,
            &descriptor.filter,
            descriptor.sort.as_deref(),
            Some(window.offset),
            Some(window.effective_limit),
        )
        .await?;

    if let Some(fields) = &descriptor.population {
        for doc in &mut documents {
            populate(db, doc, fields).await?;
        }
    }

    for doc in &mut documents {
        if let Some(fields) = &descriptor.projection {
            project(doc, fields);
        }
        scrub_secrets(doc);
    }

    Ok(Paginated::new(
        current,
        page_size,
        window.total_pages,
        total,
        documents,
    ))
}

/// Map a populatable reference field to the collection it points into.
/// Unknown fields are ignored rather than rejected.
fn target_collection(field: &str) -> Option<&'static str> {
    match field {
        "role" => Some(ROLES),
        "permissions" => Some(PERMISSIONS),
        "company" | "companyId" => Some(COMPANIES),
        "userId" => Some(USERS),
        _ => None,
    }
}

/// Replace reference fields with the referenced live documents.
///
/// A scalar id resolves to the full document or `null` when it dangles;
/// an id array resolves element-wise with dangling entries dropped.
/// Embedded snapshot objects are re-resolved through their `id`.
async fn populate(db: &Database, doc: &mut Value, fields: &[String]) -> Result<()> {
    for field in fields {
        let Some(collection) = target_collection(field) else {
            continue;
        };
        let Some(reference) = doc.get(field).cloned() else {
            continue;
        };

        match reference {
            Value::String(id) => {
                doc[field.as_str()] = resolve(db, collection, &id).await?;
            }
            Value::Object(map) => {
                if let Some(id) = map.get("id").and_then(Value::as_str) {
                    doc[field.as_str()] = resolve(db, collection, id).await?;
                }
            }
            Value::Array(entries) => {
                let mut resolved = Vec::with_capacity(entries.len());
                for entry in entries {
                    let id = match &entry {
                        Value::String(id) => Some(id.clone()),
                        Value::Object(map) => map
                            .get("id")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        _ => None,
                    };
                    if let Some(id) = id {
                        let target = resolve(db, collection, &id).await?;
                        if !target.is_null() {
                            resolved.push(target);
                        }
                    }
                }
                doc[field.as_str()] = Value::Array(resolved);
            }
            _ => {}
        }
    }

    Ok(())
}

async fn resolve(db: &Database, collection: &str, id: &str) -> Result<Value> {
    let mut target = db
        .find_by_id(collection, id)
        .await?
        .unwrap_or(Value::Null);
    scrub_secrets(&mut target);
    Ok(target)
}

/// Keep only the requested top-level fields. `id` always survives.
fn project(doc: &mut Value, fields: &[String]) {
    let Some(map) = doc.as_object_mut() else {
        return;
    };
    map.retain(|key, _| key == "id" || fields.iter().any(|f| f == key));
}

/// Strip credential fields from a document and one level of populated
/// children.
pub fn scrub_secrets(doc: &mut Value) {
    let Some(map) = doc.as_object_mut() else {
        return;
    };
    for secret in SECRET_FIELDS {
        map.remove(secret);
    }
    for child in map.values_mut() {
        if let Some(child_map) = child.as_object_mut() {
            for secret in SECRET_FIELDS {
                child_map.remove(secret);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::store::RESUMES;

    async fn seeded() -> Database {
        let db = Database::in_memory().await.expect("db");
        for (name, age, email) in [
            ("Luffy", 20, "luffy@x.io"),
            ("Zoro", 24, "zoro@x.io"),
            ("Nami", 21, "nami@x.io"),
            ("Black Beard", 55, "bb@x.io"),
        ] {
            db.insert(
                USERS,
                json!({ "name": name, "age": age, "email": email, "password": "hash" }),
            )
            .await
            .expect("insert");
        }
        db
    }

    #[tokio::test]
    async fn filter_sort_and_paginate() {
        let db = seeded().await;

        let page = list(&db, USERS, "current=1&pageSize=2&age[gte]=21&sort=-age")
            .await
            .expect("should list");

        assert_eq!(page.meta.total, 3);
        assert_eq!(page.meta.pages, 2);
        assert_eq!(page.meta.current, 1);
        assert_eq!(page.meta.page_size, 2);
        assert_eq!(page.result.len(), 2);
        assert_eq!(page.result[0]["name"], json!("Black Beard"));
        assert_eq!(page.result[1]["name"], json!("Zoro"));
    }

    #[tokio::test]
    async fn second_page_holds_the_remainder() {
        let db = seeded().await;

        let page = list(&db, USERS, "current=2&pageSize=3&sort=name")
            .await
            .expect("should list");

        assert_eq!(page.meta.total, 4);
        assert_eq!(page.meta.pages, 2);
        assert_eq!(page.result.len(), 1);
    }

    #[tokio::test]
    async fn current_below_one_is_rejected() {
        let db = seeded().await;

        let err = list(&db, USERS, "current=0&pageSize=10")
            .await
            .expect_err("should reject");
        assert!(matches!(err, JobdeskError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_result_has_zero_pages() {
        let db = seeded().await;

        let page = list(&db, USERS, "age[gt]=100").await.expect("should list");
        assert_eq!(page.meta.total, 0);
        assert_eq!(page.meta.pages, 0);
        assert!(page.result.is_empty());
    }

    #[tokio::test]
    async fn passwords_never_leave_the_pipeline() {
        let db = seeded().await;

        // Even asking for the password explicitly does not return it.
        let page = list(&db, USERS, "fields=name,password")
            .await
            .expect("should list");

        for doc in &page.result {
            assert!(doc.get("password").is_none());
            assert!(doc.get("id").is_some());
            assert!(doc.get("name").is_some());
            // Projection dropped the rest.
            assert!(doc.get("email").is_none());
        }
    }

    #[tokio::test]
    async fn population_resolves_role_reference() {
        let db = Database::in_memory().await.expect("db");

        let role = db
            .insert(ROLES, json!({ "name": "ADMIN", "isActive": true, "permissions": [] }))
            .await
            .expect("insert role");
        let role_id = role["id"].as_str().unwrap();

        db.insert(
            USERS,
            json!({ "name": "Luffy", "email": "luffy@x.io", "role": role_id }),
        )
        .await
        .expect("insert user");

        let page = list(&db, USERS, "populate=role").await.expect("should list");
        assert_eq!(page.result[0]["role"]["name"], json!("ADMIN"));
    }

    #[tokio::test]
    async fn population_of_dangling_reference_yields_null() {
        let db = Database::in_memory().await.expect("db");

        db.insert(
            RESUMES,
            json!({ "email": "luffy@x.io", "userId": "gone", "url": "cv.pdf" }),
        )
        .await
        .expect("insert resume");

        let page = list(&db, RESUMES, "populate=userId")
            .await
            .expect("should list");
        assert_eq!(page.result[0]["userId"], Value::Null);
    }

    #[tokio::test]
    async fn population_of_id_array_drops_dangling_entries() {
        let db = Database::in_memory().await.expect("db");

        let perm = db
            .insert(
                PERMISSIONS,
                json!({ "name": "List users", "apiPath": "/api/v1/users", "method": "GET", "module": "USERS" }),
            )
            .await
            .expect("insert permission");

        db.insert(
            ROLES,
            json!({
                "name": "HR",
                "isActive": true,
                "permissions": [perm["id"].as_str().unwrap(), "dangling"],
            }),
        )
        .await
        .expect("insert role");

        let page = list(&db, ROLES, "populate=permissions")
            .await
            .expect("should list");

        let permissions = page.result[0]["permissions"].as_array().expect("array");
        assert_eq!(permissions.len(), 1);
        assert_eq!(permissions[0]["name"], json!("List users"));
    }

    #[test]
    fn scrub_reaches_populated_children() {
        let mut doc = json!({
            "name": "cv",
            "password": "top",
            "userId": { "name": "Luffy", "password": "hash", "refreshToken": "t" },
        });
        scrub_secrets(&mut doc);
        assert!(doc.get("password").is_none());
        assert!(doc["userId"].get("password").is_none());
        assert!(doc["userId"].get("refreshToken").is_none());
        assert_eq!(doc["userId"]["name"], json!("Luffy"));
    }
}
