//! HTTP API: router, application state, auth extractors, and handlers.
//!
//! Handlers stay thin; the services own the semantics. Authentication is
//! a bearer-token extractor, and authorization is a second extractor that
//! resolves the caller's role and checks the permission catalog against
//! the request's method and path. Every denial is recorded in the audit
//! collection before the 403 leaves the building.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, RawQuery, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::auth::{new_refresh_token, refresh_token_digest, verify_password, TokenService};
use crate::authz::{authorize, RoleResolver};
use crate::company_service::{CompanyService, CreateCompany};
use crate::config::JobdeskConfig;
use crate::error::{JobdeskError, Result};
use crate::permission_service::{CreatePermission, PermissionService};
use crate::resume_service::{CreateResume, ResumeService};
use crate::role_service::{CreateRole, RoleService};
use crate::store::{Actor, Database, AUDIT_LOG};
use crate::user_service::{CreateUser, RegisterRecruiter, RegisterUser, UserService};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub users: UserService,
    pub roles: RoleService,
    pub permissions: PermissionService,
    pub companies: CompanyService,
    pub resumes: ResumeService,
    pub resolver: RoleResolver,
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(db: Arc<Database>, config: &JobdeskConfig) -> Self {
        Self {
            users: UserService::new(db.clone()),
            roles: RoleService::new(db.clone()),
            permissions: PermissionService::new(db.clone()),
            companies: CompanyService::new(db.clone()),
            resumes: ResumeService::new(db.clone()),
            resolver: RoleResolver::new(db.clone()),
            tokens: TokenService::new(&config.jwt_secret, config.jwt_ttl_secs),
            db,
        }
    }
}

/// An authenticated caller, extracted from the bearer token.
pub struct Identity {
    pub actor: Actor,
    pub role_id: String,
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = JobdeskError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(JobdeskError::Unauthorized)?;

        let claims = state.tokens.verify(token)?;

        Ok(Identity {
            actor: Actor::new(claims.sub, claims.email),
            role_id: claims.role,
        })
    }
}

/// An authenticated caller whose role covers the current request.
///
/// Resolution happens per request, so a permission revoked a second ago
/// already denies. Denials are written to the audit collection.
pub struct Authorized(pub Identity);

impl FromRequestParts<AppState> for Authorized {
    type Rejection = JobdeskError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self> {
        let identity = Identity::from_request_parts(parts, state).await?;
        let method = parts.method.as_str().to_string();
        let path = parts.uri.path().to_string();

        let resolved = state
            .resolver
            .resolve(&identity.role_id)
            .await?
            .ok_or(JobdeskError::Forbidden)?;

        if !authorize(&resolved.permissions, &method, &path) {
            tracing::warn!(
                user = %identity.actor.email,
                role = %resolved.name,
                method = %method,
                path = %path,
                "permission denied"
            );

            let entry = json!({
                "userId": identity.actor.id,
                "email": identity.actor.email,
                "role": resolved.name,
                "method": method,
                "path": path,
                "deniedAt": chrono::Utc::now().to_rfc3339(),
            });
            if let Err(e) = state.db.insert(AUDIT_LOG, entry).await {
                tracing::error!(error = %e, "failed to record denial");
            }

            return Err(JobdeskError::Forbidden);
        }

        Ok(Authorized(identity))
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/register-hr", post(register_hr))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/refresh", post(refresh))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/auth/account", get(account))
        .route("/api/v1/users", get(list_users).post(create_user))
        .route(
            "/api/v1/users/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/api/v1/roles", get(list_roles).post(create_role))
        .route(
            "/api/v1/roles/{id}",
            get(get_role).patch(update_role).delete(delete_role),
        )
        .route(
            "/api/v1/permissions",
            get(list_permissions).post(create_permission),
        )
        .route(
            "/api/v1/permissions/{id}",
            get(get_permission)
                .patch(update_permission)
                .delete(delete_permission),
        )
        .route("/api/v1/companies", get(list_companies).post(create_company))
        .route(
            "/api/v1/companies/{id}",
            get(get_company).patch(update_company).delete(delete_company),
        )
        .route("/api/v1/resumes", get(list_resumes).post(create_resume))
        .route("/api/v1/resumes/by-user", post(resumes_by_user))
        .route(
            "/api/v1/resumes/{id}",
            get(get_resume)
                .patch(update_resume_status)
                .delete(delete_resume),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ========== Health ==========

async fn health(State(state): State<AppState>) -> Result<Json<Value>> {
    state.db.health_check().await?;
    Ok(Json(json!({ "status": "ok" })))
}

// ========== Auth ==========

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

async fn register(
    State(state): State<AppState>,
    Json(dto): Json<RegisterUser>,
) -> Result<impl IntoResponse> {
    let user = state.users.register(dto).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn register_hr(
    State(state): State<AppState>,
    Json(dto): Json<RegisterRecruiter>,
) -> Result<impl IntoResponse> {
    let user = state.users.register_recruiter(dto).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<AppState>,
    Json(dto): Json<LoginRequest>,
) -> Result<Json<Value>> {
    let user = state
        .users
        .find_by_email(&dto.email)
        .await?
        .ok_or(JobdeskError::Unauthorized)?;

    let hash = user
        .get("password")
        .and_then(Value::as_str)
        .ok_or(JobdeskError::Unauthorized)?;
    if !verify_password(&dto.password, hash) {
        return Err(JobdeskError::Unauthorized);
    }

    issue_session(&state, &user).await
}

/// Rotate the refresh token: the presented one is spent whether or not a
/// new pair is issued.
async fn refresh(
    State(state): State<AppState>,
    Json(dto): Json<RefreshRequest>,
) -> Result<Json<Value>> {
    let digest = refresh_token_digest(&dto.refresh_token);
    let user = state
        .users
        .find_by_refresh_digest(&digest)
        .await?
        .ok_or(JobdeskError::Unauthorized)?;

    issue_session(&state, &user).await
}

async fn issue_session(state: &AppState, user: &Value) -> Result<Json<Value>> {
    let id = user["id"].as_str().unwrap_or_default();
    let email = user["email"].as_str().unwrap_or_default();
    let role = user["role"].as_str().unwrap_or_default();

    let access_token = state.tokens.issue(id, email, role)?;
    let refresh_token = new_refresh_token();
    state
        .users
        .set_refresh_digest(id, Some(&refresh_token_digest(&refresh_token)))
        .await?;

    Ok(Json(json!({
        "accessToken": access_token,
        "refreshToken": refresh_token,
        "user": {
            "id": id,
            "name": user["name"],
            "email": email,
            "role": role,
        },
    })))
}

async fn logout(State(state): State<AppState>, identity: Identity) -> Result<Json<Value>> {
    state
        .users
        .set_refresh_digest(&identity.actor.id, None)
        .await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// The caller's own profile, with the role expanded to its live
/// permission set so clients can build their menus.
async fn account(State(state): State<AppState>, identity: Identity) -> Result<Json<Value>> {
    let mut user = state.users.find_one(&identity.actor.id).await?;

    if let Some(resolved) = state.resolver.resolve(&identity.role_id).await? {
        user["role"] = json!({
            "id": resolved.id,
            "name": resolved.name,
            "permissions": resolved.permissions,
        });
    }

    Ok(Json(user))
}

// ========== Users ==========

async fn create_user(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Json(dto): Json<CreateUser>,
) -> Result<impl IntoResponse> {
    let created = state.users.create(dto, &identity.actor).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_users(
    State(state): State<AppState>,
    _auth: Authorized,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse> {
    let page = state.users.find_all(query.as_deref().unwrap_or("")).await?;
    Ok(Json(page))
}

async fn get_user(
    State(state): State<AppState>,
    _auth: Authorized,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    Ok(Json(state.users.find_one(&id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>> {
    Ok(Json(state.users.update(&id, patch, &identity.actor).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.users.remove(&id, &identity.actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========== Roles ==========

async fn create_role(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Json(dto): Json<CreateRole>,
) -> Result<impl IntoResponse> {
    let created = state.roles.create(dto, &identity.actor).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_roles(
    State(state): State<AppState>,
    _auth: Authorized,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse> {
    let page = state.roles.find_all(query.as_deref().unwrap_or("")).await?;
    Ok(Json(page))
}

async fn get_role(
    State(state): State<AppState>,
    _auth: Authorized,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    Ok(Json(state.roles.find_one(&id).await?))
}

async fn update_role(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>> {
    Ok(Json(state.roles.update(&id, patch, &identity.actor).await?))
}

async fn delete_role(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.roles.remove(&id, &identity.actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========== Permissions ==========

async fn create_permission(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Json(dto): Json<CreatePermission>,
) -> Result<impl IntoResponse> {
    let created = state.permissions.create(dto, &identity.actor).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_permissions(
    State(state): State<AppState>,
    _auth: Authorized,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse> {
    let page = state
        .permissions
        .find_all(query.as_deref().unwrap_or(""))
        .await?;
    Ok(Json(page))
}

async fn get_permission(
    State(state): State<AppState>,
    _auth: Authorized,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    Ok(Json(state.permissions.find_one(&id).await?))
}

async fn update_permission(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>> {
    Ok(Json(
        state.permissions.update(&id, patch, &identity.actor).await?,
    ))
}

async fn delete_permission(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.permissions.remove(&id, &identity.actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========== Companies ==========

async fn create_company(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Json(dto): Json<CreateCompany>,
) -> Result<impl IntoResponse> {
    let created = state.companies.create(dto, &identity.actor).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_companies(
    State(state): State<AppState>,
    _auth: Authorized,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse> {
    let page = state
        .companies
        .find_all(query.as_deref().unwrap_or(""))
        .await?;
    Ok(Json(page))
}

async fn get_company(
    State(state): State<AppState>,
    _auth: Authorized,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    Ok(Json(state.companies.find_one(&id).await?))
}

async fn update_company(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>> {
    Ok(Json(
        state.companies.update(&id, patch, &identity.actor).await?,
    ))
}

async fn delete_company(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.companies.remove(&id, &identity.actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========== Resumes ==========

#[derive(Debug, Deserialize)]
struct UpdateResumeStatus {
    status: String,
}

async fn create_resume(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Json(dto): Json<CreateResume>,
) -> Result<impl IntoResponse> {
    let created = state.resumes.create(dto, &identity.actor).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_resumes(
    State(state): State<AppState>,
    _auth: Authorized,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse> {
    let page = state
        .resumes
        .find_all(query.as_deref().unwrap_or(""))
        .await?;
    Ok(Json(page))
}

async fn resumes_by_user(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
) -> Result<Json<Vec<Value>>> {
    Ok(Json(state.resumes.find_by_user(&identity.actor).await?))
}

async fn get_resume(
    State(state): State<AppState>,
    _auth: Authorized,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    Ok(Json(state.resumes.find_one(&id).await?))
}

async fn update_resume_status(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Path(id): Path<String>,
    Json(dto): Json<UpdateResumeStatus>,
) -> Result<Json<Value>> {
    Ok(Json(
        state
            .resumes
            .update_status(&id, &dto.status, &identity.actor)
            .await?,
    ))
}

async fn delete_resume(
    State(state): State<AppState>,
    Authorized(identity): Authorized,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.resumes.remove(&id, &identity.actor).await?;
    Ok(StatusCode::NO_CONTENT)
}
