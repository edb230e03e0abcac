//! Web administration UI module.
//!
//! Provides:
//! - Magic-link sign-in against the admin lookup table
//! - Session management
//! - Dashboard with document upload/delete and the access log

pub mod auth;
pub mod middleware;
pub mod routes;
pub mod templates;

pub use auth::{AdminAuthStore, LogMagicLinkSender, MagicLinkSender};
pub use middleware::{AdminSession, AdminState};
pub use routes::admin_router;
