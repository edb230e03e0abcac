//! SQL query constants with database-specific placeholders.
//!
//! SQLite uses `?` placeholders, PostgreSQL uses `$1, $2, ...` numbered placeholders.
//! Timestamps are RFC 3339 text with a fixed width, so text ordering is time ordering.

// =============================================================================
// Documents
// =============================================================================

#[cfg(feature = "sqlite")]
pub const INSERT_DOCUMENT: &str =
    "INSERT INTO documents (id, name, storage_path, size, created_at) VALUES (?, ?, ?, ?, ?)";

#[cfg(feature = "postgres")]
pub const INSERT_DOCUMENT: &str =
    "INSERT INTO documents (id, name, storage_path, size, created_at) VALUES ($1, $2, $3, $4, $5)";

#[cfg(feature = "sqlite")]
pub const SELECT_LATEST_DOCUMENT: &str =
    "SELECT id, name, storage_path, size, created_at FROM documents ORDER BY created_at DESC, id DESC LIMIT 1";

#[cfg(feature = "postgres")]
pub const SELECT_LATEST_DOCUMENT: &str =
    "SELECT id, name, storage_path, size, created_at FROM documents ORDER BY created_at DESC, id DESC LIMIT 1";

#[cfg(feature = "sqlite")]
pub const SELECT_ALL_DOCUMENTS: &str =
    "SELECT id, name, storage_path, size, created_at FROM documents ORDER BY created_at DESC, id DESC";

#[cfg(feature = "postgres")]
pub const SELECT_ALL_DOCUMENTS: &str =
    "SELECT id, name, storage_path, size, created_at FROM documents ORDER BY created_at DESC, id DESC";

#[cfg(feature = "sqlite")]
pub const SELECT_DOCUMENT: &str =
    "SELECT id, name, storage_path, size, created_at FROM documents WHERE id = ?";

#[cfg(feature = "postgres")]
pub const SELECT_DOCUMENT: &str =
    "SELECT id, name, storage_path, size, created_at FROM documents WHERE id = $1";

#[cfg(feature = "sqlite")]
pub const DELETE_DOCUMENT: &str = "DELETE FROM documents WHERE id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_DOCUMENT: &str = "DELETE FROM documents WHERE id = $1";

// =============================================================================
// Access log
// =============================================================================

#[cfg(feature = "sqlite")]
pub const INSERT_ACCESS_RECORD: &str =
    "INSERT INTO document_access (id, email, accessed_at, user_agent, ip_address) VALUES (?, ?, ?, ?, ?)";

#[cfg(feature = "postgres")]
pub const INSERT_ACCESS_RECORD: &str =
    "INSERT INTO document_access (id, email, accessed_at, user_agent, ip_address) VALUES ($1, $2, $3, $4, $5)";

#[cfg(feature = "sqlite")]
pub const SELECT_ALL_ACCESS_RECORDS: &str =
    "SELECT email, accessed_at, user_agent, ip_address FROM document_access ORDER BY accessed_at DESC, id DESC";

#[cfg(feature = "postgres")]
pub const SELECT_ALL_ACCESS_RECORDS: &str =
    "SELECT email, accessed_at, user_agent, ip_address FROM document_access ORDER BY accessed_at DESC, id DESC";

// =============================================================================
// Admin users
// =============================================================================

#[cfg(feature = "sqlite")]
pub const INSERT_ADMIN_USER: &str =
    "INSERT INTO admin_users (email, created_at) VALUES (?, ?) ON CONFLICT(email) DO NOTHING";

#[cfg(feature = "postgres")]
pub const INSERT_ADMIN_USER: &str =
    "INSERT INTO admin_users (email, created_at) VALUES ($1, $2) ON CONFLICT(email) DO NOTHING";

#[cfg(feature = "sqlite")]
pub const SELECT_ADMIN_USER: &str =
    "SELECT email, created_at, last_login FROM admin_users WHERE email = ?";

#[cfg(feature = "postgres")]
pub const SELECT_ADMIN_USER: &str =
    "SELECT email, created_at, last_login FROM admin_users WHERE email = $1";

#[cfg(feature = "sqlite")]
pub const SELECT_ALL_ADMIN_USERS: &str =
    "SELECT email, created_at, last_login FROM admin_users ORDER BY email";

#[cfg(feature = "postgres")]
pub const SELECT_ALL_ADMIN_USERS: &str =
    "SELECT email, created_at, last_login FROM admin_users ORDER BY email";

#[cfg(feature = "sqlite")]
pub const UPDATE_ADMIN_USER_LAST_LOGIN: &str =
    "UPDATE admin_users SET last_login = ? WHERE email = ?";

#[cfg(feature = "postgres")]
pub const UPDATE_ADMIN_USER_LAST_LOGIN: &str =
    "UPDATE admin_users SET last_login = $1 WHERE email = $2";

#[cfg(feature = "sqlite")]
pub const DELETE_ADMIN_USER: &str = "DELETE FROM admin_users WHERE email = ?";

#[cfg(feature = "postgres")]
pub const DELETE_ADMIN_USER: &str = "DELETE FROM admin_users WHERE email = $1";

// =============================================================================
// Magic links
// =============================================================================

#[cfg(feature = "sqlite")]
pub const INSERT_MAGIC_LINK: &str =
    "INSERT INTO admin_magic_links (token, email, created_at, expires_at) VALUES (?, ?, ?, ?)";

#[cfg(feature = "postgres")]
pub const INSERT_MAGIC_LINK: &str =
    "INSERT INTO admin_magic_links (token, email, created_at, expires_at) VALUES ($1, $2, $3, $4)";

#[cfg(feature = "sqlite")]
pub const CONSUME_MAGIC_LINK: &str =
    "DELETE FROM admin_magic_links WHERE token = ? RETURNING email, expires_at";

#[cfg(feature = "postgres")]
pub const CONSUME_MAGIC_LINK: &str =
    "DELETE FROM admin_magic_links WHERE token = $1 RETURNING email, expires_at";

#[cfg(feature = "sqlite")]
pub const DELETE_EXPIRED_MAGIC_LINKS: &str = "DELETE FROM admin_magic_links WHERE expires_at < ?";

#[cfg(feature = "postgres")]
pub const DELETE_EXPIRED_MAGIC_LINKS: &str = "DELETE FROM admin_magic_links WHERE expires_at < $1";

// =============================================================================
// Admin sessions
// =============================================================================

#[cfg(feature = "sqlite")]
pub const INSERT_ADMIN_SESSION: &str =
    "INSERT INTO admin_sessions (session_id, email, created_at, expires_at, ip_address, user_agent) VALUES (?, ?, ?, ?, ?, ?)";

#[cfg(feature = "postgres")]
pub const INSERT_ADMIN_SESSION: &str =
    "INSERT INTO admin_sessions (session_id, email, created_at, expires_at, ip_address, user_agent) VALUES ($1, $2, $3, $4, $5, $6)";

#[cfg(feature = "sqlite")]
pub const SELECT_ADMIN_SESSION: &str =
    "SELECT session_id, email, created_at, expires_at, ip_address, user_agent FROM admin_sessions WHERE session_id = ?";

#[cfg(feature = "postgres")]
pub const SELECT_ADMIN_SESSION: &str =
    "SELECT session_id, email, created_at, expires_at, ip_address, user_agent FROM admin_sessions WHERE session_id = $1";

#[cfg(feature = "sqlite")]
pub const DELETE_ADMIN_SESSION: &str = "DELETE FROM admin_sessions WHERE session_id = ?";

#[cfg(feature = "postgres")]
pub const DELETE_ADMIN_SESSION: &str = "DELETE FROM admin_sessions WHERE session_id = $1";

#[cfg(feature = "sqlite")]
pub const DELETE_ADMIN_SESSIONS_BY_EMAIL: &str = "DELETE FROM admin_sessions WHERE email = ?";

#[cfg(feature = "postgres")]
pub const DELETE_ADMIN_SESSIONS_BY_EMAIL: &str = "DELETE FROM admin_sessions WHERE email = $1";

#[cfg(feature = "sqlite")]
pub const DELETE_EXPIRED_ADMIN_SESSIONS: &str = "DELETE FROM admin_sessions WHERE expires_at < ?";

#[cfg(feature = "postgres")]
pub const DELETE_EXPIRED_ADMIN_SESSIONS: &str = "DELETE FROM admin_sessions WHERE expires_at < $1";
