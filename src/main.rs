//! SQLDock server entrypoint.
//!
//! The heavy lifting (engine startup, middleware wiring, graceful
//! shutdown) lives in dedicated modules so this file remains a thin
//! orchestrator.

mod lifecycle;
mod logging;
mod middleware;

use std::env;

use anyhow::Result;
use log::info;

use sqldock_configs::ServerConfig;

const USAGE: &str = "SQLDock - single-binary PostgreSQL with an HTTP API

Usage:
  sqldock <command>

Commands:
  serve      Start the HTTP server and embedded engine
  version    Print version information
  help       Display this help message

Examples:
  sqldock serve        Start server on 127.0.0.1:5173
  sqldock version      Show version and build info
";

#[actix_web::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("serve") => serve().await,
        Some("version") | Some("--version") | Some("-v") => {
            print_version();
            Ok(())
        }
        Some("help") | Some("--help") | Some("-h") => {
            print!("{}", USAGE);
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {}\n", other);
            eprint!("{}", USAGE);
            std::process::exit(1);
        }
        None => {
            eprint!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

fn print_version() {
    println!(
        "sqldock {} (commit {}, branch {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("GIT_BRANCH"),
        env!("BUILD_DATE"),
    );
}

async fn serve() -> Result<()> {
    // Load configuration; defaults apply when config.toml is absent.
    let config_path = "config.toml";
    let config = match ServerConfig::load_or_default(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Logging before any other side effects
    let server_log_path = format!("{}/server.log", config.logging.logs_path);
    logging::init_logging(
        &config.logging.level,
        &server_log_path,
        config.logging.log_to_console,
        Some(&config.logging.targets),
        &config.logging.format,
    )?;

    info!(
        "SQLDock v{} (commit {}, branch {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("GIT_BRANCH"),
        env!("BUILD_DATE"),
    );
    info!("Host: {}  Port: {}  Engine port: {}", config.server.host, config.server.port, config.engine.port);

    // Bring up the engine and pool, then serve until a termination signal
    let components = lifecycle::bootstrap(&config).await?;
    lifecycle::run(&config, components).await
}
