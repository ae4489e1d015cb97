//! Jobdesk: a job-portal backend with role/permission authorization.
//!
//! Users, roles, permissions, companies, and resumes live in a SQLite
//! document store with uniform soft-delete semantics. Listings share one
//! pipeline (filter translation, two-pass pagination, population,
//! projection), and every protected route is gated by the caller's role
//! resolved against the permission catalog on each request.

pub mod auth;
pub mod authz;
pub mod company_service;
pub mod config;
pub mod error;
pub mod listing;
pub mod pagination;
pub mod permission_service;
pub mod query;
pub mod resume_service;
pub mod role_service;
pub mod seed;
pub mod store;
pub mod user_service;
pub mod web;
