//! GDPR data-subject-rights and lifecycle engine.
//!
//! Transport-independent: every module takes a `&sqlx::PgPool` and an
//! `&dyn EventPublisher` directly, so `crates/api` and `crates/worker` are
//! the only places a database connection or HTTP server is ever bound.

pub mod audit;
pub mod consent;
pub mod data_operator;
pub mod error;
pub mod notification;
pub mod request_engine;
pub mod restriction;
pub mod retention;
pub mod schema_map;
pub mod scheduler;
pub mod types;
pub mod webhooks;

pub use error::{ComplianceError, ComplianceResult};
