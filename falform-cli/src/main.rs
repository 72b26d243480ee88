mod serve;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use falform_core::provider::Provider;
use falform_provider::{FalConfig, FalProvider};

use crate::serve::Server;

/// Provider version; release builds set `FALFORM_VERSION`
const VERSION: &str = match option_env!("FALFORM_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};

#[derive(Parser)]
#[command(name = "falform")]
#[command(about = "Manage fal applications from declarative configuration", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(clap::Args)]
struct ServeArgs {
    /// fal API key
    #[arg(long, env = "FAL_KEY", hide_env_values = true)]
    fal_key: Option<String>,

    /// Path to the fal CLI
    #[arg(long, default_value = FalConfig::DEFAULT_FAL_BIN)]
    fal_bin: String,

    /// Path to git
    #[arg(long, default_value = FalConfig::DEFAULT_GIT_BIN)]
    git_bin: String,

    /// Arguments passed by the host engine (ignored)
    #[arg(hide = true)]
    engine_args: Vec<String>,
}

impl ServeArgs {
    fn config(&self) -> FalConfig {
        FalConfig {
            fal_key: self.fal_key.clone(),
            fal_bin: self.fal_bin.clone(),
            git_bin: self.git_bin.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the provider version
    Version,
    /// Print resource and configuration schemas as JSON
    Schema,
    /// Serve provider requests over stdin/stdout (default)
    Serve(ServeArgs),
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("{}", VERSION);
            Ok(())
        }
        Some(Commands::Schema) => run_schema(),
        Some(Commands::Serve(args)) => run_serve(&args).await,
        None => run_serve(&cli.serve).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_schema() -> Result<(), String> {
    let provider = FalProvider::new(FalConfig::default());
    let resources: serde_json::Map<_, _> = provider
        .resource_types()
        .iter()
        .map(|t| (t.name().to_string(), t.schema().to_json()))
        .collect();

    let schema = json!({
        "name": provider.name(),
        "version": VERSION,
        "config": FalConfig::schema().to_json(),
        "resources": resources,
    });
    let rendered = serde_json::to_string_pretty(&schema)
        .map_err(|e| format!("Failed to render schema: {}", e))?;
    println!("{}", rendered);
    Ok(())
}

async fn run_serve(args: &ServeArgs) -> Result<(), String> {
    if !args.engine_args.is_empty() {
        log::debug!("ignoring engine arguments: {:?}", args.engine_args);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, cancelling running operations");
            on_interrupt.cancel();
        }
    });

    let mut server = Server::new(args.config(), cancel);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve::serve(&mut server, stdin, tokio::io::stdout())
        .await
        .map_err(|e| format!("Failed to serve requests: {}", e))
}
