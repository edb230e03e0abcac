//! docgate library
//!
//! Email-gated document viewer: visitors leave their email to view the
//! current PDF through short-lived signed links, and the owner manages
//! uploads and reads the access log in a small admin console.
//! The binary entry point is in main.rs.

pub mod access;
pub mod access_log;
pub mod admin;
pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod documents;
pub mod platform;
pub mod server;
mod sql;
pub mod storage;
pub mod templates;
pub mod viewer;
