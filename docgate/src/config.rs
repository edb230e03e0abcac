//! Configuration loading for the docgate server.
//!
//! Loads configuration from TOML files and/or environment variables using figment.
//!
//! # Configuration Sources (in order of priority, lowest to highest)
//!
//! 1. Default values (from `#[serde(default)]` attributes)
//! 2. TOML config file (if provided)
//! 3. Environment variables (prefix: `DOCGATE_`, nested with `__`)
//!
//! # Environment Variable Naming
//!
//! - `DOCGATE_HTTP__LISTEN_ADDR` → `http.listen_addr`
//! - `DOCGATE_HTTP__PUBLIC_URL` → `http.public_url`
//! - `DOCGATE_STORAGE__SIGNING_SECRET` → `storage.signing_secret`
//! - `DOCGATE_GATE__RENEWAL_INTERVAL_SECS` → `gate.renewal_interval_secs`
//! - `DOCGATE_ADMIN__SESSION_TIMEOUT_SECS` → `admin.session_timeout_secs`

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "DOCGATE_";

/// Placeholder value; a config still carrying it is rejected.
const PLACEHOLDER_SECRET: &str = "change-me";

/// Main configuration for the docgate server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Object store and link signing
    pub storage: StorageConfig,

    /// Viewer gate behaviour
    #[serde(default)]
    pub gate: GateConfig,

    /// Admin console
    #[serde(default)]
    pub admin: AdminConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Externally reachable base URL, used to build signed links and
    /// magic-link callbacks
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Largest accepted document upload
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            public_url: default_public_url(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

/// Object store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding uploaded objects.
    /// If not specified, defaults to `objects` in the data directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// HMAC key for signed links
    pub signing_secret: String,

    /// Validity window of each signed link
    #[serde(default = "default_link_ttl_secs")]
    pub link_ttl_secs: u64,
}

impl StorageConfig {
    /// Resolve the object directory against the data directory.
    pub fn dir_or_default(&self, data_dir: &Path) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| data_dir.join("objects"))
    }

    pub fn link_ttl(&self) -> Duration {
        Duration::from_secs(self.link_ttl_secs)
    }
}

fn default_link_ttl_secs() -> u64 {
    600
}

/// Viewer gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GateConfig {
    /// How often a mounted viewer re-signs its link
    #[serde(default = "default_renewal_interval_secs")]
    pub renewal_interval_secs: u64,

    /// Public IP echo service used by the CLI viewer
    #[serde(default = "default_ip_lookup_url")]
    pub ip_lookup_url: String,

    /// Timeout for the IP lookup
    #[serde(default = "default_ip_lookup_timeout_secs")]
    pub ip_lookup_timeout_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            renewal_interval_secs: default_renewal_interval_secs(),
            ip_lookup_url: default_ip_lookup_url(),
            ip_lookup_timeout_secs: default_ip_lookup_timeout_secs(),
        }
    }
}

impl GateConfig {
    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(self.renewal_interval_secs)
    }

    pub fn ip_lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.ip_lookup_timeout_secs)
    }
}

fn default_renewal_interval_secs() -> u64 {
    600
}

fn default_ip_lookup_url() -> String {
    "https://api.ipify.org?format=json".to_string()
}

fn default_ip_lookup_timeout_secs() -> u64 {
    5
}

/// Admin console configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    /// Session lifetime after a successful sign-in
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// Lifetime of an unused magic link
    #[serde(default = "default_magic_link_ttl_secs")]
    pub magic_link_ttl_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
            magic_link_ttl_secs: default_magic_link_ttl_secs(),
        }
    }
}

fn default_session_timeout_secs() -> u64 {
    86400
}

fn default_magic_link_ttl_secs() -> u64 {
    900
}

// =============================================================================
// Database Configuration (compile-time feature selection)
// =============================================================================

/// SQLite database configuration (used when compiled with `sqlite` feature).
#[cfg(feature = "sqlite")]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    /// If not specified, defaults to `docgate.db` in the data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// PostgreSQL database configuration (used when compiled with `postgres` feature).
#[cfg(feature = "postgres")]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database host (default: "localhost")
    #[serde(default = "default_postgres_host")]
    pub host: String,

    /// Database port (default: 5432)
    #[serde(default = "default_postgres_port")]
    pub port: u16,

    /// Database user
    #[serde(default)]
    pub user: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Database name (default: "docgate")
    #[serde(default = "default_postgres_database")]
    pub database: String,
}

#[cfg(feature = "postgres")]
fn default_postgres_host() -> String {
    "localhost".to_string()
}

#[cfg(feature = "postgres")]
fn default_postgres_port() -> u16 {
    5432
}

#[cfg(feature = "postgres")]
fn default_postgres_database() -> String {
    "docgate".to_string()
}

#[cfg(feature = "postgres")]
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_postgres_host(),
            port: default_postgres_port(),
            user: String::new(),
            password: String::new(),
            database: default_postgres_database(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables.
    ///
    /// ```bash
    /// # Override the listen address via environment variable
    /// export DOCGATE_HTTP__LISTEN_ADDR=127.0.0.1:3000
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let config: Config = Self::figment(path).extract().with_context(|| {
            format!(
                "Failed to load config from {} and environment",
                path.display()
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load only the `[database]` section, for admin commands that do not
    /// need the signing secret.
    pub fn load_database(path: &Path) -> Result<DatabaseConfig> {
        Self::load_section(path, "database")
    }

    /// Load only the `[gate]` section, for the remote viewer.
    pub fn load_gate(path: &Path) -> Result<GateConfig> {
        Self::load_section(path, "gate")
    }

    fn load_section<T: DeserializeOwned + Default>(path: &Path, key: &str) -> Result<T> {
        let figment = Self::figment(path);
        if figment.find_value(key).is_err() {
            return Ok(T::default());
        }

        figment.extract_inner(key).with_context(|| {
            format!(
                "Failed to load [{key}] from {} and environment",
                path.display()
            )
        })
    }

    fn figment(path: &Path) -> Figment {
        let mut figment = Figment::new();

        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn validate(&self) -> Result<()> {
        if self.storage.signing_secret.trim().is_empty() {
            bail!("storage.signing_secret must not be empty");
        }
        if self.storage.signing_secret.trim() == PLACEHOLDER_SECRET {
            bail!("storage.signing_secret is still the placeholder; set a random secret");
        }
        if self.storage.link_ttl_secs == 0 {
            bail!("storage.link_ttl_secs must be greater than zero");
        }
        if self.gate.renewal_interval_secs == 0 {
            bail!("gate.renewal_interval_secs must be greater than zero");
        }
        if self.gate.renewal_interval_secs > self.storage.link_ttl_secs {
            tracing::warn!(
                renewal_interval_secs = self.gate.renewal_interval_secs,
                link_ttl_secs = self.storage.link_ttl_secs,
                "Renewal interval is longer than the link lifetime; viewers will see expired links"
            );
        }
        Ok(())
    }

    /// Get the default config file path
    /// - macOS: ~/Library/Application Support/docgate/config.toml
    /// - Linux: ~/.config/docgate/config.toml
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docgate")
            .join("config.toml")
    }

    /// Get the default data directory (database, objects, logs)
    /// - macOS: ~/Library/Application Support/docgate/
    /// - Linux: ~/.local/share/docgate/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docgate")
    }
}

/// 64 random alphanumerics for a fresh config file.
fn generate_signing_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// Create a default configuration template with a freshly generated
/// signing secret.
pub fn default_config_template() -> String {
    let data_dir = Config::default_data_dir();
    let data_dir_str = data_dir.display();
    let signing_secret = generate_signing_secret();

    format!(
        r#"# docgate configuration
# Data directory: {data_dir_str}

[http]
listen_addr = "0.0.0.0:8080"
# Base URL visitors use to reach this server. Signed links and admin
# sign-in links are built from it.
public_url = "http://localhost:8080"
max_upload_bytes = 26214400

[storage]
# dir = "{data_dir_str}/objects"  # Optional, defaults to data_dir/objects
# Secret used to sign document links. Generated for this file; keep it private.
signing_secret = "{signing_secret}"
link_ttl_secs = 600

[gate]
renewal_interval_secs = 600
ip_lookup_url = "https://api.ipify.org?format=json"
ip_lookup_timeout_secs = 5

[admin]
session_timeout_secs = 86400
magic_link_ttl_secs = 900

# =============================================================================
# Database Configuration
# =============================================================================
#
# The database backend is selected at compile time via cargo features:
#   - cargo build -p docgate --features sqlite (default)
#   - cargo build -p docgate --features postgres --no-default-features

# SQLite configuration (when compiled with --features sqlite)
[database]
# path = "{data_dir_str}/docgate.db"  # Optional, defaults to data_dir/docgate.db

# PostgreSQL configuration (when compiled with --features postgres)
# [database]
# host = "localhost"
# port = 5432
# user = "docgate"
# password = "secret"
# database = "docgate"
"#
    )
}
