//! `courier` – runs the message bus with a terminal console attached.
//!
//! On start-up it:
//!
//! 1. Loads `~/.courier/config.toml`, writing the defaults on first run.
//! 2. Installs logging (and OTLP export when `OTEL_EXPORTER_OTLP_ENDPOINT`
//!    is set).
//! 3. Opens the location history and restores the tracker from it.
//! 4. Starts the orchestrator with a [`ConsoleComponent`] on stdin/stdout.
//! 5. Intercepts **Ctrl-C** (and `/quit`) to shut every component down.

mod config;

use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use courier_bus::{ComponentRegistry, Router};
use courier_memory::{LocationLog, LocationTracker, SqliteLocationLog};
use courier_runtime::{
    ConsoleComponent, DispatchEngine, LogFormat, Orchestrator, OrchestratorConfig, init_tracing,
    standard_rules,
};
use courier_types::CourierError;

use config::{Config, IN_MEMORY_DB};

fn main() -> ExitCode {
    let cfg = load_config();

    let format = cfg.log_format.parse::<LogFormat>().unwrap_or_else(|e| {
        eprintln!("{}: {}", "Config warning".yellow(), e);
        LogFormat::Compact
    });
    let _otel_guard = init_tracing("courier", format);

    print_banner();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(cfg));
    // Stdin reads park a blocking thread that never wakes on its own.
    runtime.shutdown_timeout(Duration::from_millis(250));

    match result {
        Ok(()) => {
            println!("{}", "  ✓ Courier stopped.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "courier failed");
            println!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config) -> Result<(), String> {
    let log = open_log(&cfg.database_path)?;
    let tracker = Arc::new(LocationTracker::restore(log).map_err(|e| e.to_string())?);
    if let Ok(last) = tracker.most_recent_event() {
        info!(
            user = %last.user,
            location = %last.location,
            event = %last.event.as_str(),
            "location history restored"
        );
    }

    let mut orchestrator = build_orchestrator(&cfg, tracker).map_err(|e| e.to_string())?;
    let shutdown = orchestrator.cancellation_token();

    let console = ConsoleComponent::new(
        cfg.console_user.clone(),
        orchestrator.identity().to_string(),
        tokio::io::BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .with_shutdown(shutdown.clone());
    orchestrator
        .spawn_component(Box::new(console))
        .map_err(|e| e.to_string())?;

    // A route to an unregistered responder would only surface at the first
    // message, so refuse to start instead.
    orchestrator.validate_routes().map_err(|e| e.to_string())?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let ctrlc_token = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        ctrlc_token.cancel();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use /quit to exit");
    }

    println!(
        "  Talking to {} as {}.  Type {} to leave.\n",
        orchestrator.identity().bold(),
        cfg.console_user.bold(),
        "/quit".bold().cyan()
    );

    orchestrator.run().await;
    Ok(())
}

fn build_orchestrator(
    cfg: &Config,
    tracker: Arc<LocationTracker>,
) -> Result<Orchestrator, CourierError> {
    let rules = standard_rules(Arc::clone(&tracker), &cfg.responder_settings())?;
    let engine = DispatchEngine::new(rules)
        .with_policy(cfg.match_policy)
        .with_default_reply(cfg.default_reply.clone());
    Orchestrator::new(
        OrchestratorConfig {
            identity: cfg.identity.clone(),
            tracked_user: cfg.tracked_user.clone(),
        },
        ComponentRegistry::new(),
        Router::new(cfg.routes.clone()),
        tracker,
        engine,
    )
}

fn open_log(database_path: &str) -> Result<Box<dyn LocationLog>, String> {
    if database_path == IN_MEMORY_DB {
        return SqliteLocationLog::open_in_memory()
            .map(|log| Box::new(log) as Box<dyn LocationLog>)
            .map_err(|e| format!("Failed to open in-memory location history: {e}"));
    }
    if let Some(parent) = Path::new(database_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
    }
    SqliteLocationLog::open(database_path)
        .map(|log| Box::new(log) as Box<dyn LocationLog>)
        .map_err(|e| format!("Failed to open location history at {database_path}: {e}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

fn load_config() -> Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____                _          "#.bold().cyan());
    println!("{}", r#"  / ___|___  _   _ _ __(_) ___ _ __ "#.bold().cyan());
    println!("{}", r#" | |   / _ \| | | | '__| |/ _ \ '__|"#.bold().cyan());
    println!("{}", r#" | |__| (_) | |_| | |  | |  __/ |   "#.bold().cyan());
    println!("{}", r#"  \____\___/ \__,_|_|  |_|\___|_|   "#.bold().cyan());
    println!();
    println!(
        "  {} v{}",
        "courier".bold(),
        env!("CARGO_PKG_VERSION").dimmed()
    );
    println!();
}
