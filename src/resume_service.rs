//! Resume management: submissions tied to the applying user, with a
//! status history appended on every transition.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{JobdeskError, Result};
use crate::listing;
use crate::pagination::Paginated;
use crate::query::{Filter, FilterValue, SortField};
use crate::store::{stamp_created, stamp_deleted, stamp_updated, Actor, Database, COMPANIES, RESUMES};

/// The resume status lifecycle. Transitions are free-form but must land
/// on one of these.
pub const STATUSES: [&str; 4] = ["PENDING", "REVIEWING", "APPROVED", "REJECTED"];

#[derive(Debug, Clone, Deserialize)]
pub struct CreateResume {
    pub url: String,
    #[serde(rename = "companyId")]
    pub company_id: String,
    #[serde(default)]
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

#[derive(Clone)]
pub struct ResumeService {
    db: Arc<Database>,
}

impl ResumeService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Submit a resume for the acting user. Starts in `PENDING` with the
    /// first history entry already recorded.
    pub async fn create(&self, dto: CreateResume, actor: &Actor) -> Result<Value> {
        if dto.url.trim().is_empty() {
            return Err(JobdeskError::Validation(
                "Resume url must not be empty".to_string(),
            ));
        }
        if self.db.find_by_id(COMPANIES, &dto.company_id).await?.is_none() {
            return Err(JobdeskError::NotFound(format!("company {}", dto.company_id)));
        }

        let mut body = json!({
            "email": actor.email,
            "userId": actor.id,
            "url": dto.url,
            "status": "PENDING",
            "companyId": dto.company_id,
            "jobId": dto.job_id,
            "history": [history_entry("PENDING", actor)],
        });
        stamp_created(&mut body, actor);

        let stored = self.db.insert(RESUMES, body).await?;
        Ok(json!({ "id": stored["id"], "createdAt": stored["createdAt"] }))
    }

    pub async fn find_all(&self, raw_query: &str) -> Result<Paginated<Value>> {
        listing::list(&self.db, RESUMES, raw_query).await
    }

    pub async fn find_one(&self, id: &str) -> Result<Value> {
        self.db
            .find_by_id(RESUMES, id)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("resume {}", id)))
    }

    /// Move a resume to a new status, appending to its history.
    pub async fn update_status(&self, id: &str, status: &str, actor: &Actor) -> Result<Value> {
        let status = status.to_ascii_uppercase();
        if !STATUSES.contains(&status.as_str()) {
            return Err(JobdeskError::Validation(format!(
                "Invalid resume status: {} (expected one of {})",
                status,
                STATUSES.join(", ")
            )));
        }

        let resume = self.find_one(id).await?;

        let mut history = resume
            .get("history")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        history.push(history_entry(&status, actor));

        let mut patch = json!({
            "status": status,
            "history": history,
        });
        stamp_updated(&mut patch, actor);

        self.db
            .update(RESUMES, id, &patch)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("resume {}", id)))
    }

    /// All live resumes submitted by the acting user, newest first.
    pub async fn find_by_user(&self, actor: &Actor) -> Result<Vec<Value>> {
        let sort = [SortField {
            field: "createdAt".to_string(),
            descending: true,
        }];
        self.db
            .find(
                RESUMES,
                &Filter::field_eq("userId", FilterValue::Str(actor.id.clone())),
                Some(&sort),
                None,
                None,
            )
            .await
    }

    pub async fn remove(&self, id: &str, actor: &Actor) -> Result<()> {
        if self.db.find_by_id(RESUMES, id).await?.is_none() {
            return Err(JobdeskError::NotFound(format!("resume {}", id)));
        }

        self.db.update(RESUMES, id, &stamp_deleted(actor)).await?;
        self.db.soft_delete(RESUMES, id).await
    }
}

fn history_entry(status: &str, actor: &Actor) -> Value {
    json!({
        "status": status,
        "updatedAt": chrono::Utc::now().to_rfc3339(),
        "updatedBy": { "id": actor.id, "email": actor.email },
    })
}
