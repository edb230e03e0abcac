//! docgate - Main entry point
//!
//! Serves the email-gated document viewer and admin console, manages the
//! admin list, and can view a remote docgate server from the terminal.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, debug, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use docgate::access::{
    AccessSessionController, AccessSnapshot, ControllerConfig, DocumentView, GateState,
};
use docgate::admin::{AdminAuthStore, LogMagicLinkSender};
use docgate::client::{FileGateTokenStore, HttpBackend, HttpIpLookup};
use docgate::config::{self, Config};
use docgate::db::Database;
use docgate::server::{AppState, ServerConfig, http_router, run_server};

/// docgate - Email-gated PDF viewer
#[derive(Parser)]
#[command(name = "docgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value_os_t = Config::default_path())]
    config: PathBuf,

    /// Data directory for the database, objects and logs
    #[arg(short, long, default_value_os_t = Config::default_data_dir())]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the viewer and admin console
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// Admin list management
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// View the current document of a remote docgate server
    View {
        /// Base URL of the server (e.g. https://docs.example.com)
        #[arg(long)]
        server: String,

        /// Email to record if this machine has not passed the gate yet
        #[arg(long)]
        email: Option<String>,
    },

    /// Generate a default configuration file
    InitConfig {
        /// Output path (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Grant admin access to an email
    Add {
        email: String,
    },

    /// List admins
    List,

    /// Revoke admin access and end their sessions
    Remove {
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    match cli.command {
        Commands::Serve { listen } => {
            // For daemon mode: log to both stdout and file with rotation
            init_daemon_logging(&cli.data_dir, filter)?;
            serve(&cli.config, &cli.data_dir, listen).await
        }
        Commands::Admin { command } => {
            init_cli_logging(filter);
            handle_admin_command(command, &cli.config, &cli.data_dir).await
        }
        Commands::View { server, email } => {
            init_cli_logging(filter);
            view(&cli.config, &cli.data_dir, &server, email).await
        }
        Commands::InitConfig { output } => {
            init_cli_logging(filter);
            generate_config(output)
        }
    }
}

/// Initialize logging for CLI commands (stdout only).
fn init_cli_logging(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// Initialize logging for daemon mode (stdout + rotating file).
fn init_daemon_logging(data_dir: &Path, filter: EnvFilter) -> Result<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    // Daily rotation, e.g. docgate.2026-01-15.log
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("docgate")
        .filename_suffix("log")
        .build(&log_dir)
        .with_context(|| "Failed to create log file appender")?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The writer must outlive every log call in the daemon
    std::mem::forget(guard);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false)) // stdout
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking),
        ) // file
        .init();

    info!("Logging to: {}", log_dir.display());
    Ok(())
}

/// Run the viewer and admin console
async fn serve(
    config_path: &Path,
    data_dir: &Path,
    listen_override: Option<SocketAddr>,
) -> Result<()> {
    ensure_data_dir(data_dir)?;

    let config = Config::load(config_path)?;

    let listen_addr: SocketAddr = match listen_override {
        Some(addr) => addr,
        None => config.http.listen_addr.parse().with_context(|| {
            format!(
                "Invalid listen address in config: {}",
                config.http.listen_addr
            )
        })?,
    };

    // Magic links go to the log until a mail transport is configured
    let state = AppState::build(&config, data_dir, Arc::new(LogMagicLinkSender)).await?;

    info!("docgate starting...");
    info!("Listening on: {}", listen_addr);
    info!("Public URL: {}", config.http.public_url);

    match state.admin.auth_store.list_users().await {
        Ok(users) if users.is_empty() => {
            warn!("No admins configured. Add one with `docgate admin add <email>`");
        }
        Ok(users) => debug!("{} admin(s) configured", users.len()),
        Err(e) => warn!("Failed to list admins: {e:#}"),
    }

    // Spawn expired session / magic link cleanup task
    let cleanup_store = state.admin.auth_store.clone();
    tokio::spawn(async move {
        let cleanup_interval = std::time::Duration::from_secs(300);
        let mut ticker = tokio::time::interval(cleanup_interval);

        loop {
            ticker.tick().await;
            match cleanup_store.cleanup_expired().await {
                Ok((0, 0)) => {}
                Ok((sessions, links)) => {
                    debug!(sessions, links, "Removed expired admin sessions and magic links");
                }
                Err(e) => warn!("Admin cleanup failed: {e:#}"),
            }
        }
    });

    let router = http_router(&state, config.http.max_upload_bytes);
    let server_config = ServerConfig { listen_addr };

    run_server(server_config, router, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Ensure data directory exists
fn ensure_data_dir(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        info!("Created data directory: {}", data_dir.display());
    }
    Ok(())
}

/// Handle admin subcommands
async fn handle_admin_command(
    command: AdminCommands,
    config_path: &Path,
    data_dir: &Path,
) -> Result<()> {
    ensure_data_dir(data_dir)?;

    let db_config = Config::load_database(config_path)?;
    let db = Database::new(&db_config, data_dir).await?;
    let auth_store = AdminAuthStore::new(db.pool());

    match command {
        AdminCommands::Add { email } => {
            if !docgate::access::model::is_valid_email(email.trim()) {
                bail!("Not a valid email address: {email}");
            }
            if auth_store.add_user(&email).await? {
                println!("Admin added: {}", email.trim());
            } else {
                println!("{} is already an admin.", email.trim());
            }
            Ok(())
        }

        AdminCommands::List => {
            let users = auth_store.list_users().await?;

            if users.is_empty() {
                println!("No admins configured.");
                return Ok(());
            }

            println!("{:<40} {:<20} {:<20}", "EMAIL", "ADDED", "LAST LOGIN");
            println!("{}", "-".repeat(80));

            for user in users {
                let added = user.created_at.format("%Y-%m-%d %H:%M");
                let last_login = user
                    .last_login
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!("{:<40} {:<20} {:<20}", user.email, added, last_login);
            }
            Ok(())
        }

        AdminCommands::Remove { email } => {
            if auth_store.remove_user(&email).await? {
                println!("Admin removed. Their sessions have been ended.");
            } else {
                println!("Admin not found.");
            }
            Ok(())
        }
    }
}

/// Pass the gate of a remote server and print fresh document links until
/// interrupted.
async fn view(
    config_path: &Path,
    data_dir: &Path,
    server: &str,
    email: Option<String>,
) -> Result<()> {
    ensure_data_dir(data_dir)?;

    let gate = Config::load_gate(config_path)?;

    let backend = Arc::new(HttpBackend::new(server)?);
    let tokens = Arc::new(FileGateTokenStore::new(data_dir));
    let ip_lookup = Arc::new(HttpIpLookup::new(&gate.ip_lookup_url, gate.ip_lookup_timeout())?);

    let controller_config = ControllerConfig {
        renewal_interval: gate.renewal_interval(),
        ..ControllerConfig::default()
    };

    let controller =
        AccessSessionController::open(controller_config, backend, tokens, ip_lookup).await;
    let mut updates = controller.subscribe();

    controller.mount();

    if controller.gate_state() == GateState::Ungated {
        let email = match email {
            Some(email) => email,
            None => prompt_email()?,
        };
        controller
            .submit(&email)
            .await
            .context("Could not record access")?;
    }

    let mut last_shown = None;
    print_snapshot(&updates.borrow_and_update(), &mut last_shown);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                print_snapshot(&snapshot, &mut last_shown);
            }
        }
    }

    controller.unmount();
    Ok(())
}

fn prompt_email() -> Result<String> {
    print!("Enter your email to view the document: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read email")?;
    Ok(line.trim().to_string())
}

/// Print the document area when it changes.
fn print_snapshot(snapshot: &AccessSnapshot, last_shown: &mut Option<DocumentView>) {
    if last_shown.as_ref() == Some(&snapshot.document) {
        return;
    }

    match &snapshot.document {
        DocumentView::Idle | DocumentView::Loading => return,
        DocumentView::Ready(link) => {
            println!(
                "{}  (valid until {})",
                link.url,
                link.expires_at().format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        DocumentView::NoDocument => println!("No documents found in the database."),
        DocumentView::Unavailable => {
            let message = snapshot
                .notice
                .as_ref()
                .map(|n| n.message().to_string())
                .unwrap_or_else(|| "Document unavailable".to_string());
            eprintln!("{message}. Retrying at the next renewal.");
        }
    }

    *last_shown = Some(snapshot.document.clone());
}

/// Generate a default configuration file
fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = config::default_config_template();

    match output {
        Some(path) => {
            std::fs::write(&path, &config)?;
            println!("Configuration written to: {}", path.display());
        }
        None => {
            print!("{}", config);
        }
    }

    Ok(())
}
