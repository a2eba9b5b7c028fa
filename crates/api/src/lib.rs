//! PlexMCP GDPR compliance API
//!
//! Transport binding over `plexmcp-compliance`: axum routes, shared-secret
//! operator auth, and process configuration.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
