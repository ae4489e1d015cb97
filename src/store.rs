//! SQLite-backed document store with uniform soft-delete semantics.
//!
//! Every collection lives in one `documents` table keyed by
//! `(collection, id)` with the record body as JSON. All reads compose an
//! implicit `is_deleted = 0` predicate, so the soft-delete policy is
//! enforced in exactly one place. Filters arrive as the tagged structures
//! from [`crate::query`] and are compiled to `json_extract` conditions with
//! bound parameters only; client text never reaches the SQL.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{JobdeskError, Result};
use crate::query::{Filter, FilterOp, FilterValue, SortField};

// Collection names.
pub const USERS: &str = "users";
pub const ROLES: &str = "roles";
pub const PERMISSIONS: &str = "permissions";
pub const COMPANIES: &str = "companies";
pub const RESUMES: &str = "resumes";
pub const AUDIT_LOG: &str = "audit_log";

/// The acting principal recorded on create/update/delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub email: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }

    fn as_json(&self) -> Value {
        json!({ "id": self.id, "email": self.email })
    }
}

// ========== Audit stamps ==========
//
// Each stamp kind is independent and retains only its latest value; a
// later update never touches `createdBy`, a delete never touches
// `updatedBy`.

/// Stamp a new document with its creator.
pub fn stamp_created(body: &mut Value, actor: &Actor) {
    body["createdBy"] = actor.as_json();
    body["createdAt"] = json!(chrono::Utc::now().to_rfc3339());
}

/// Stamp an update patch with its author.
pub fn stamp_updated(patch: &mut Value, actor: &Actor) {
    patch["updatedBy"] = actor.as_json();
    patch["updatedAt"] = json!(chrono::Utc::now().to_rfc3339());
}

/// Build the patch recording who deleted a document.
pub fn stamp_deleted(actor: &Actor) -> Value {
    json!({ "deletedBy": actor.as_json() })
}

/// Envelope and marker fields that only the stamp helpers and the
/// soft-delete path may write.
const PROTECTED_FIELDS: [&str; 7] = [
    "createdBy",
    "createdAt",
    "updatedBy",
    "updatedAt",
    "deletedBy",
    "deletedAt",
    "isDeleted",
];

/// Drop envelope and marker fields from a client-supplied patch so a
/// request body cannot forge stamps or resurrect a deleted record.
pub fn strip_stamps(patch: &mut Value) {
    if let Some(map) = patch.as_object_mut() {
        for field in PROTECTED_FIELDS {
            map.remove(field);
        }
    }
}

/// A value ready to be bound into a SQL statement.
enum SqlValue {
    Text(String),
    Int(i64),
    Real(f64),
}

impl From<&FilterValue> for SqlValue {
    fn from(value: &FilterValue) -> Self {
        match value {
            FilterValue::Str(s) => SqlValue::Text(s.clone()),
            FilterValue::Int(n) => SqlValue::Int(*n),
            // JSON booleans surface as 0/1 through json_extract.
            FilterValue::Bool(b) => SqlValue::Int(i64::from(*b)),
            FilterValue::Float(f) => SqlValue::Real(*f),
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file and initialize the schema.
    pub async fn new(path: &str) -> Result<Self> {
        let db_path = Path::new(path);

        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    JobdeskError::Database(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| JobdeskError::Database(format!("Failed to connect to database: {}", e)))?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Create an in-memory database for testing.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| JobdeskError::Database(format!("Failed to create in-memory db: {}", e)))?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Initialize the schema. Idempotent.
    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| JobdeskError::Database(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| JobdeskError::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    // ========== Document operations ==========

    /// Insert a document, assigning an id when the body carries none.
    /// Returns the stored body.
    pub async fn insert(&self, collection: &str, mut body: Value) -> Result<Value> {
        if !body.is_object() {
            return Err(JobdeskError::Validation(
                "Document body must be a JSON object".to_string(),
            ));
        }

        let id = match body.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                body["id"] = json!(id);
                id
            }
        };
        if body.get("createdAt").is_none() {
            body["createdAt"] = json!(chrono::Utc::now().to_rfc3339());
        }
        body["isDeleted"] = json!(false);

        let encoded = serde_json::to_string(&body)?;

        sqlx::query("INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(&encoded)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, collection))?;

        Ok(body)
    }

    /// Bulk insert, used by the bootstrap seeder.
    pub async fn insert_many(&self, collection: &str, bodies: Vec<Value>) -> Result<Vec<Value>> {
        let mut stored = Vec::with_capacity(bodies.len());
        for body in bodies {
            stored.push(self.insert(collection, body).await?);
        }
        Ok(stored)
    }

    /// Fetch one live document by id.
    pub async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let row = sqlx::query(
            "SELECT body FROM documents WHERE collection = ? AND id = ? AND is_deleted = 0",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| JobdeskError::Database(format!("Failed to fetch document: {}", e)))?;

        match row {
            Some(row) => {
                let body: String = row.get("body");
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    /// Fetch the first live document matching a filter.
    pub async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        let mut found = self.find(collection, filter, None, None, Some(1)).await?;
        Ok(found.pop())
    }

    /// Fetch live documents matching a filter, with optional sort and window.
    pub async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&[SortField]>,
        offset: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<Value>> {
        let (conditions, mut binds) = compile_filter(filter);

        let mut sql = format!(
            "SELECT body FROM documents WHERE collection = ? AND is_deleted = 0{}",
            conditions
        );

        if let Some(sort) = sort {
            let mut keys = Vec::with_capacity(sort.len());
            for field in sort {
                let direction = if field.descending { "DESC" } else { "ASC" };
                keys.push(format!("json_extract(body, ?) {}", direction));
                binds.push(SqlValue::Text(json_path(&field.field)));
            }
            if !keys.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&keys.join(", "));
            }
        }

        sql.push_str(" LIMIT ? OFFSET ?");
        binds.push(SqlValue::Int(limit.unwrap_or(-1)));
        binds.push(SqlValue::Int(offset.unwrap_or(0)));

        let mut query = sqlx::query(&sql).bind(collection);
        for bind in &binds {
            query = match bind {
                SqlValue::Text(s) => query.bind(s),
                SqlValue::Int(n) => query.bind(n),
                SqlValue::Real(f) => query.bind(f),
            };
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| JobdeskError::Database(format!("Failed to query documents: {}", e)))?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.get("body");
            documents.push(serde_json::from_str(&body)?);
        }

        Ok(documents)
    }

    /// Count live documents matching a filter. This is the full second pass
    /// the pagination contract requires; it is independent of any window.
    pub async fn count(&self, collection: &str, filter: &Filter) -> Result<i64> {
        let (conditions, binds) = compile_filter(filter);

        let sql = format!(
            "SELECT COUNT(*) AS total FROM documents WHERE collection = ? AND is_deleted = 0{}",
            conditions
        );

        let mut query = sqlx::query(&sql).bind(collection);
        for bind in &binds {
            query = match bind {
                SqlValue::Text(s) => query.bind(s),
                SqlValue::Int(n) => query.bind(n),
                SqlValue::Real(f) => query.bind(f),
            };
        }

        let row = query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| JobdeskError::Database(format!("Failed to count documents: {}", e)))?;

        Ok(row.get::<i64, _>("total"))
    }

    /// Shallow-merge a patch into a live document. JSON `null` values
    /// remove their keys (json_patch semantics). Returns the updated body,
    /// or `None` when no live document matched.
    pub async fn update(&self, collection: &str, id: &str, patch: &Value) -> Result<Option<Value>> {
        let encoded = serde_json::to_string(patch)?;

        let result = sqlx::query(
            "UPDATE documents SET body = json_patch(body, ?)
             WHERE collection = ? AND id = ? AND is_deleted = 0",
        )
        .bind(&encoded)
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, collection))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(collection, id).await
    }

    /// Mark a document deleted in place. Idempotent: re-deleting keeps the
    /// original deletion timestamp and changes nothing observable.
    pub async fn soft_delete(&self, collection: &str, id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE documents
             SET deleted_at = COALESCE(deleted_at, ?1),
                 body = json_set(body, '$.isDeleted', json('true'),
                                       '$.deletedAt', COALESCE(deleted_at, ?1)),
                 is_deleted = 1
             WHERE collection = ?2 AND id = ?3",
        )
        .bind(&now)
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| JobdeskError::Database(format!("Failed to soft-delete document: {}", e)))?;

        Ok(())
    }
}

/// Compile a filter into `AND`-joined SQL conditions plus bind values.
/// Field names were validated by the translator; values are always bound.
fn compile_filter(filter: &Filter) -> (String, Vec<SqlValue>) {
    let mut sql = String::new();
    let mut binds = Vec::new();

    for clause in &filter.0 {
        let path = json_path(&clause.field);
        match &clause.op {
            FilterOp::Eq(v) => push_compare(&mut sql, &mut binds, &path, "=", v),
            FilterOp::Ne(v) => push_compare(&mut sql, &mut binds, &path, "!=", v),
            FilterOp::Gt(v) => push_compare(&mut sql, &mut binds, &path, ">", v),
            FilterOp::Gte(v) => push_compare(&mut sql, &mut binds, &path, ">=", v),
            FilterOp::Lt(v) => push_compare(&mut sql, &mut binds, &path, "<", v),
            FilterOp::Lte(v) => push_compare(&mut sql, &mut binds, &path, "<=", v),
            FilterOp::In(values) => {
                if values.is_empty() {
                    // An empty set matches nothing.
                    sql.push_str(" AND 0");
                    continue;
                }
                let placeholders: Vec<&str> = values.iter().map(|_| "?").collect();
                sql.push_str(&format!(
                    " AND json_extract(body, ?) IN ({})",
                    placeholders.join(", ")
                ));
                binds.push(SqlValue::Text(path));
                for value in values {
                    binds.push(SqlValue::from(value));
                }
            }
            FilterOp::Prefix(prefix) => {
                sql.push_str(" AND json_extract(body, ?) LIKE ? ESCAPE '\\'");
                binds.push(SqlValue::Text(path));
                binds.push(SqlValue::Text(format!("{}%", escape_like(prefix))));
            }
        }
    }

    (sql, binds)
}

fn push_compare(sql: &mut String, binds: &mut Vec<SqlValue>, path: &str, op: &str, value: &FilterValue) {
    sql.push_str(&format!(" AND json_extract(body, ?) {} ?", op));
    binds.push(SqlValue::Text(path.to_string()));
    binds.push(SqlValue::from(value));
}

fn json_path(field: &str) -> String {
    format!("$.{}", field)
}

/// Escape LIKE metacharacters in a literal prefix.
fn escape_like(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if ch == '%' || ch == '_' || ch == '\\' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Map write errors, surfacing unique-index violations as validation
/// errors. The partial unique indexes are the real uniqueness guard; the
/// service-level checks only produce friendlier messages first.
fn map_write_error(e: sqlx::Error, collection: &str) -> JobdeskError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        return JobdeskError::Validation(format!(
            "Duplicate value for unique field in {}",
            collection
        ));
    }
    JobdeskError::Database(format!("Write to {} failed: {}", collection, message))
}

/// Database schema SQL.
///
/// The partial unique indexes apply to live rows only, so a soft-deleted
/// user's email can be reused by a new registration.
const SCHEMA: &str = r#"
-- All collections share one document table
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at TEXT,
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_live ON documents(collection, is_deleted);

-- Store-level uniqueness guards (the application checks are advisory)
CREATE UNIQUE INDEX IF NOT EXISTS idx_live_user_email
    ON documents(json_extract(body, '$.email'))
    WHERE collection = 'users' AND is_deleted = 0;

CREATE UNIQUE INDEX IF NOT EXISTS idx_live_role_name
    ON documents(json_extract(body, '$.name'))
    WHERE collection = 'roles' AND is_deleted = 0;
"#;
