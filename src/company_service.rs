//! Company management: plain CRUD over the companies collection.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{JobdeskError, Result};
use crate::listing;
use crate::pagination::Paginated;
use crate::store::{
    stamp_created, stamp_deleted, stamp_updated, strip_stamps, Actor, Database, COMPANIES,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCompany {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

#[derive(Clone)]
pub struct CompanyService {
    db: Arc<Database>,
}

impl CompanyService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn create(&self, dto: CreateCompany, actor: &Actor) -> Result<Value> {
        if dto.name.trim().is_empty() {
            return Err(JobdeskError::Validation(
                "Company name must not be empty".to_string(),
            ));
        }

        let mut body = json!({
            "name": dto.name,
            "address": dto.address,
            "description": dto.description,
            "logo": dto.logo,
        });
        stamp_created(&mut body, actor);

        self.db.insert(COMPANIES, body).await
    }

    pub async fn find_all(&self, raw_query: &str) -> Result<Paginated<Value>> {
        listing::list(&self.db, COMPANIES, raw_query).await
    }

    pub async fn find_one(&self, id: &str) -> Result<Value> {
        self.db
            .find_by_id(COMPANIES, id)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("company {}", id)))
    }

    pub async fn update(&self, id: &str, mut patch: Value, actor: &Actor) -> Result<Value> {
        let map = patch
            .as_object_mut()
            .ok_or_else(|| JobdeskError::Validation("Patch must be a JSON object".to_string()))?;
        map.remove("id");
        strip_stamps(&mut patch);

        stamp_updated(&mut patch, actor);

        self.db
            .update(COMPANIES, id, &patch)
            .await?
            .ok_or_else(|| JobdeskError::NotFound(format!("company {}", id)))
    }

    pub async fn remove(&self, id: &str, actor: &Actor) -> Result<()> {
        if self.db.find_by_id(COMPANIES, id).await?.is_none() {
            return Err(JobdeskError::NotFound(format!("company {}", id)));
        }

        self.db.update(COMPANIES, id, &stamp_deleted(actor)).await?;
        self.db.soft_delete(COMPANIES, id).await
    }
}
