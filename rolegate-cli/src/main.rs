//! Rolegate CLI - Command-line interface for the session role resolver
//!
//! Drives the resolver against a file-backed token store so sessions, role levels
//! and route decisions can be inspected from a terminal

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rolegate_core::{
    init_logging, log_operation_error, log_operation_start, log_operation_success,
    performance::measure_async, RoleLookup, RolegateConfig, Session, SessionUser,
};
use rolegate_session::{
    FileTokenStore, NavigationBus, ResolverState, RouteDecision, RouteGuard, RouteTable,
    SessionRoleLookup, SessionRoleResolver, StaticRoleLookup,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "rolegate")]
#[command(about = "Inspect sessions, role levels and route access")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Session file path
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Use this role name instead of the one stored with the session
    #[arg(long)]
    role: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current session and role level
    Status,

    /// Store a new session
    Login {
        /// User id
        #[arg(long)]
        id: u64,

        /// User name
        #[arg(long)]
        username: String,

        /// Role name issued to the user
        #[arg(long)]
        role: Option<String>,

        /// Session token (generated when omitted)
        #[arg(long)]
        token: Option<String>,
    },

    /// Renew the stored session; clears it if renewal fails
    Refresh,

    /// Remove the stored session
    Logout,

    /// Decide whether the current user may open a path
    Check {
        /// Route path, e.g. /audit/logs
        path: String,
    },

    /// List the menu entries visible to the current user
    Menu,

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

/// Everything the commands need
struct App {
    config: RolegateConfig,
    ttl: chrono::Duration,
    store: Arc<FileTokenStore>,
    resolver: SessionRoleResolver,
}

#[derive(Serialize)]
struct StatusReport<'a> {
    #[serde(flatten)]
    state: &'a ResolverState,
    /// Configured role name for the resolved level
    role_name: Option<&'a str>,
}

#[derive(Serialize)]
struct CheckReport<'a> {
    path: &'a str,
    #[serde(flatten)]
    decision: RouteDecision,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(default_config_path);

    // Runs before loading so a broken file can be replaced
    if let Commands::Config { init: true, .. } = cli.command {
        init_config(config_path.as_ref())?;
    }
    let config = load_config(config_path.as_ref())?;

    let mut logging_config = config.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }
    init_logging(&logging_config).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting Rolegate CLI v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Config { show, validate, .. } = cli.command {
        handle_config(&config, show, validate)?;
        return Ok(ExitCode::SUCCESS);
    }

    let app = App::new(config, cli.store, cli.role)?;

    let code = match cli.command {
        Commands::Status => {
            handle_status(&app).await?;
            ExitCode::SUCCESS
        }
        Commands::Login {
            id,
            username,
            role,
            token,
        } => {
            handle_login(&app, id, username, role, token).await?;
            ExitCode::SUCCESS
        }
        Commands::Refresh => handle_refresh(&app).await?,
        Commands::Logout => {
            handle_logout(&app).await?;
            ExitCode::SUCCESS
        }
        Commands::Check { path } => handle_check(&app, &path).await?,
        Commands::Menu => {
            handle_menu(&app).await?;
            ExitCode::SUCCESS
        }
        Commands::Config { .. } => ExitCode::SUCCESS,
    };

    app.resolver.teardown();
    Ok(code)
}

impl App {
    fn new(
        config: RolegateConfig,
        store_path: Option<PathBuf>,
        role_override: Option<String>,
    ) -> Result<Self> {
        let store_path = store_path
            .or_else(default_store_path)
            .context("Could not determine a data directory; pass --store")?;
        debug!("Using session file {:?}", store_path);

        let ttl = config.session.session_ttl()?;
        let store = Arc::new(FileTokenStore::new(&store_path, ttl));
        let lookup: Arc<dyn RoleLookup> = match role_override {
            Some(role) => Arc::new(StaticRoleLookup::role(role)),
            None => Arc::new(SessionRoleLookup::new(store.clone())),
        };
        let resolver = SessionRoleResolver::from_config(store.clone(), lookup, &config);

        Ok(Self {
            config,
            ttl,
            store,
            resolver,
        })
    }

    fn routes(&self) -> RouteTable {
        RouteTable::new(self.config.routes.clone())
    }

    async fn initialize(&self) -> ResolverState {
        let state = measure_async("initialize", self.resolver.initialize()).await;
        debug!("{}", state.summary());
        state
    }
}

fn load_config(config_path: Option<&PathBuf>) -> Result<RolegateConfig> {
    match config_path {
        Some(path) if path.exists() => {
            info!("Loading configuration from {:?}", path);
            RolegateConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))
        }
        Some(path) => {
            debug!("No configuration at {:?}, using defaults", path);
            Ok(RolegateConfig::default())
        }
        None => Ok(RolegateConfig::default()),
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .map(|d| d.join("rolegate").join("config.toml"))
}

fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".local").join("share")))
        .map(|d| d.join("rolegate").join("session.json"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_status(app: &App) -> Result<()> {
    log_operation_start!("status");
    let state = app.initialize().await;
    print_json(&StatusReport {
        state: &state,
        role_name: app.config.roles.name_for(state.role_level()),
    })?;
    log_operation_success!("status", role = %state.role_level());
    Ok(())
}

async fn handle_login(
    app: &App,
    id: u64,
    username: String,
    role: Option<String>,
    token: Option<String>,
) -> Result<()> {
    log_operation_start!("login", user_id = id);

    let mut user = SessionUser::new(id, username);
    user.role = role;
    let token = token.unwrap_or_else(|| format!("local-{}", chrono::Utc::now().timestamp_millis()));
    let session = Session::new(token, user).with_ttl(app.ttl);

    if let Err(e) = app.store.save_session(&session).await {
        log_operation_error!("login", e, user_id = id);
        return Err(e).context("Failed to store session");
    }

    let state = app.initialize().await;
    print_json(&state)?;
    log_operation_success!("login", user_id = id, role = %state.role_level());
    Ok(())
}

async fn handle_refresh(app: &App) -> Result<ExitCode> {
    log_operation_start!("refresh");
    let session = measure_async("refresh_session", app.resolver.refresh_session()).await;
    print_json(&app.resolver.snapshot())?;

    match session {
        Some(session) => {
            log_operation_success!("refresh", user_id = session.user.id);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            info!("No session after refresh");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn handle_logout(app: &App) -> Result<()> {
    log_operation_start!("logout");
    app.resolver.clear_session().await;
    print_json(&app.resolver.snapshot())?;
    log_operation_success!("logout");
    Ok(())
}

async fn handle_check(app: &App, path: &str) -> Result<ExitCode> {
    log_operation_start!("check", path = path);

    let navigation = NavigationBus::new(path);
    let guard = RouteGuard::spawn(app.routes(), &navigation, &app.resolver);
    let mut view = guard.subscribe();
    app.resolver.mount();

    // Session fetch and role lookup are each bounded by the refresh timeout
    let limit = Duration::from_millis(app.config.session.refresh_timeout_ms.saturating_mul(2));
    let settled = tokio::time::timeout(limit, async {
        view.wait_for(|current| current.decision != RouteDecision::Pending)
            .await
            .map(|current| current.decision)
    })
    .await;

    let decision = match settled {
        Ok(Ok(decision)) => decision,
        _ => {
            let e = anyhow!("Route decision for {} did not settle", path);
            log_operation_error!("check", e, path = path);
            return Err(e);
        }
    };

    print_json(&CheckReport {
        path: &navigation.current(),
        decision,
    })?;
    log_operation_success!("check", path = path, allowed = decision.is_allowed());

    Ok(if decision.is_allowed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

async fn handle_menu(app: &App) -> Result<()> {
    log_operation_start!("menu");
    let state = app.initialize().await;
    let items = app.routes().menu(state.role_level());
    print_json(&items)?;
    log_operation_success!("menu", items = items.len());
    Ok(())
}

fn init_config(config_path: Option<&PathBuf>) -> Result<()> {
    let path = config_path.context("Could not determine a config directory; pass --config")?;
    RolegateConfig::default().save_to_file(path)?;
    println!("Configuration initialized at: {:?}", path);
    Ok(())
}

fn handle_config(config: &RolegateConfig, show: bool, validate: bool) -> Result<()> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    if validate {
        match config.validate() {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => {
                println!("Configuration validation failed: {}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_replaces_malformed_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[roles\nsuperAdmin = ").unwrap();
        assert!(load_config(Some(&path)).is_err());

        init_config(Some(&path)).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.roles, RolegateConfig::default().roles);
    }

    #[test]
    fn app_rejects_out_of_range_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RolegateConfig::default();
        config.session.session_ttl_minutes = i64::MAX;

        let result = App::new(config, Some(dir.path().join("session.json")), None);
        assert!(result.is_err());
    }
}
