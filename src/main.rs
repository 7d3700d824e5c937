use std::path::PathBuf;

use aigernon_core::{AppBuilder, resolve_config_path};
use aigernon_security::AuditLogger;
use aigernon_tools::{CommandGuard, ToolContext, ToolParams, ToolRegistry};
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;

const CLI_CHANNEL: &str = "cli";
const CLI_SENDER: &str = "local";

#[derive(Parser, Debug)]
#[command(name = "aigernon")]
#[command(about = "Security-gated tool execution for the Aigernon agent")]
#[command(version)]
struct Cli {
    /// Configuration file path (falls back to AIGERNON_CONFIG, then config/default.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print tool definitions as JSON
    Tools,
    /// Run a shell command through the exec tool
    Exec {
        command: String,
        #[arg(long)]
        working_dir: Option<String>,
    },
    /// Call any registered tool with JSON parameters
    Call {
        tool: String,
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Show whether the command guard would allow a command, without running it
    Guard {
        command: String,
        #[arg(long)]
        working_dir: Option<PathBuf>,
    },
    /// Print the most recent audit events
    Audit {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Manage integrity baselines of the identity files
    Integrity {
        #[command(subcommand)]
        action: IntegrityAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum IntegrityAction {
    /// Record baselines for all monitored files
    Init,
    /// Compare monitored files against their baselines
    Verify,
    /// Summarise tracked files
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(resolve_config_path);
    let app = AppBuilder::load(config_path)?;

    match cli.command {
        Command::Tools => {
            let registry = app.build_registry(None)?;
            println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
        }
        Command::Exec {
            command,
            working_dir,
        } => {
            let mut params = ToolParams::new();
            params.insert("command".into(), Value::String(command));
            if let Some(dir) = working_dir {
                params.insert("working_dir".into(), Value::String(dir));
            }
            println!("{}", dispatch(&app, "exec", params).await?);
        }
        Command::Call { tool, params } => {
            let params: Value =
                serde_json::from_str(&params).context("--params must be valid JSON")?;
            let Value::Object(params) = params else {
                bail!("--params must be a JSON object");
            };
            println!("{}", dispatch(&app, &tool, params).await?);
        }
        Command::Guard {
            command,
            working_dir,
        } => {
            let guard = CommandGuard::new(&app.config().tools.shell)?;
            let cwd = working_dir
                .or_else(|| app.config().tools.shell.working_dir.clone())
                .unwrap_or_else(|| app.workspace());
            match guard.check(&command, &cwd) {
                Ok(()) => println!("allowed"),
                Err(rejection) => println!("{rejection}"),
            }
        }
        Command::Audit { limit } => {
            let logger = AuditLogger::from_config(&app.config().tools.audit);
            for event in logger.recent_events(limit) {
                println!("{event}");
            }
        }
        Command::Integrity { action } => integrity(&app, action)?,
    }

    Ok(())
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Admit the local CLI sender, check integrity, then run one tool call.
async fn dispatch(app: &AppBuilder, tool: &str, params: ToolParams) -> anyhow::Result<String> {
    let audit = app.build_audit();

    let gate = app.build_ingress(audit.clone());
    if let Err(rejection) = gate.admit(CLI_CHANNEL, CLI_SENDER) {
        bail!("{rejection}");
    }

    let mut monitor = app.build_integrity(audit.clone());
    let violations = app.check_integrity_on_startup(&mut monitor);
    if violations > 0 {
        tracing::warn!("{violations} integrity violation(s) detected, see audit log");
    }

    let registry: ToolRegistry = app.build_registry(audit)?;
    let ctx = ToolContext::new(CLI_SENDER, CLI_CHANNEL);
    Ok(registry.execute_in(&ctx, tool, params).await)
}

fn integrity(app: &AppBuilder, action: IntegrityAction) -> anyhow::Result<()> {
    let audit = app.build_audit();
    let mut monitor = app.build_integrity(audit);

    match action {
        IntegrityAction::Init => {
            let hashes = monitor.initialize()?;
            for (path, hash) in &hashes {
                println!("{hash}  {path}");
            }
            println!(
                "recorded {} baseline(s) in {}",
                hashes.len(),
                monitor.hashes_file().display()
            );
        }
        IntegrityAction::Verify => {
            let violations = monitor.verify();
            if violations.is_empty() {
                println!("all monitored files match their baselines");
                return Ok(());
            }
            println!("{}", serde_json::to_string_pretty(&violations)?);
            bail!("{} integrity violation(s)", violations.len());
        }
        IntegrityAction::Status => {
            let status = monitor.status();
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}
