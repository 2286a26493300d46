//! prestaops CLI - PrestaShop migration and audit tool.

mod wizard;

use clap::{Args, Parser, Subcommand};
use prestaops::audit::{run_audit, DEFAULT_REPORT_FILE};
use prestaops::config::{render, DEFAULT_CONFIG_FILE};
use prestaops::orchestrator::StageStatus;
use prestaops::site::RecordStatus;
use prestaops::{CredentialStore, MigrateError, MigrationResult, Orchestrator, RunMode};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use wizard::TerminalPrompt;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "prestaops")]
#[command(about = "Migrate and audit PrestaShop installations")]
#[command(version)]
struct Cli {
    /// Path to the migration variables file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config_file: PathBuf,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy files and database from the source server, then configure the copy
    Migrate(MigrateArgs),

    /// Check the SSH connection, source path and source database
    Check,

    /// Print every stored migration variable, passwords included
    ShowVariables {
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },

    /// Scan the modules of the PrestaShop installation in the current directory
    Audit {
        /// Report file
        #[arg(long, short, default_value = DEFAULT_REPORT_FILE)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct MigrateArgs {
    /// Only transfer the database
    #[arg(long)]
    database_only: bool,

    /// Only transfer the files
    #[arg(long)]
    files_only: bool,

    /// Skip both transfers and only configure the destination shop
    #[arg(long)]
    configure_only: bool,

    /// Rewrite shop URLs under this domain (e.g. staging.example.com)
    #[arg(long, value_name = "SUFFIX")]
    staging_url_suffix: Option<String>,

    /// Turn off SSL enforcement on the destination shop
    #[arg(long)]
    disable_ssl: bool,

    /// Run each transfer in the foreground and stream its output
    #[arg(long)]
    sync: bool,

    /// Wait for background transfers before configuring the shop
    #[arg(long)]
    wait_before_configure: bool,
}

impl From<MigrateArgs> for RunMode {
    fn from(args: MigrateArgs) -> Self {
        RunMode {
            database_only: args.database_only,
            files_only: args.files_only,
            configure_only: args.configure_only,
            synchronous: args.sync,
            disable_ssl: args.disable_ssl,
            wait_before_configure: args.wait_before_configure,
            staging_url_suffix: args.staging_url_suffix,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let store = CredentialStore::new(&cli.config_file);

    match cli.command {
        Commands::Migrate(args) => {
            let mode = RunMode::from(args);
            let show_progress = !cli.output_json && cli.log_format != "json";

            let orchestrator =
                Orchestrator::new(store, Box::new(TerminalPrompt), mode)?.with_progress(show_progress);

            // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
            let cancel_token = setup_signal_handler();

            let result = orchestrator.run(cancel_token).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_summary(&result);
            }
        }

        Commands::Check => {
            let mut orchestrator =
                Orchestrator::new(store, Box::new(TerminalPrompt), RunMode::default())?;
            let check = orchestrator.check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&check)?);
            } else {
                println!("Source checks passed:");
                println!("  SSH user: {}", check.ssh.output);
                if let Some(path) = &check.source_path {
                    println!("  Source path: {}", path);
                }
                println!("  Shop URLs: {}", check.shop_urls.len());
            }
        }

        Commands::ShowVariables { yes } => {
            if !yes && !wizard::confirm_show_variables(store.path())? {
                return Err(MigrateError::Config(
                    "Refused to display migration variables".to_string(),
                ));
            }

            let variables = store.load()?;
            if cli.output_json {
                let map: serde_json::Map<String, serde_json::Value> = variables
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                print!("{}", render(&variables));
            }
        }

        Commands::Audit { output } => {
            let root = std::env::current_dir()?;
            info!("Auditing {}", root.display());
            let report = run_audit(&root, &output)?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Audited {} modules ({} skipped), report written to {}",
                    report.modules.len(),
                    report.skipped.len(),
                    report.output.display()
                );
            }
        }
    }

    Ok(())
}

fn print_summary(result: &MigrationResult) {
    println!("\nMigration {}!", result.status.replace('_', " "));
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);

    for stage in &result.stages {
        let status = match stage.status {
            StageStatus::Skipped => "skipped".to_string(),
            StageStatus::Succeeded => "ok".to_string(),
            StageStatus::Failed => match stage.exit_code {
                Some(code) => format!("failed (exit {})", code),
                None => "failed".to_string(),
            },
        };
        match stage.pid {
            Some(pid) => println!("  {}: {} (pid {})", stage.job, status, pid),
            None => println!("  {}: {}", stage.job, status),
        }
    }

    if let Some(site) = &result.site {
        println!(
            "  Shop URLs: {} updated, {} unchanged, {} failed",
            site.count(RecordStatus::Updated),
            site.count(RecordStatus::Skipped),
            site.count(RecordStatus::Failed)
        );
        if site.ssl_disabled {
            println!("  SSL: disabled");
        }
        match &site.rewrite_generator {
            Some(generator) => println!("  Rewrite file: {}", generator),
            None => println!("  Rewrite file: not regenerated"),
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json keeps stdout clean.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Background transfers keep running.", name);
                    token.cancel();
                });
            }
            Err(e) => eprintln!("Could not install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Background transfers keep running.");
            token.cancel();
        }
    });

    cancel_token
}
