// ABOUTME: Command line entry point for the Sparkbox server
// ABOUTME: Parses subcommands, initializes logging and dispatches to the server library

use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use sparkbox_cli::config::Config;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "sparkbox")]
#[command(about = "Sparkbox - per-project sandbox sessions for generated code")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Bind address (overrides SPARKBOX_API_HOST)
        #[arg(long)]
        host: Option<IpAddr>,
        /// Port (overrides SPARKBOX_API_PORT)
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, help = "Kill sessions on shutdown instead of pausing them")]
        kill_on_shutdown: bool,
    },
    /// List the sandbox templates the server can provision
    Templates {
        /// Templates JSON file (defaults to SPARKBOX_TEMPLATES_PATH or the built-in set)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            host,
            port,
            kill_on_shutdown,
        } => serve(host, port, kill_on_shutdown).await,
        Commands::Templates { path } => list_templates(path),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn serve(
    host: Option<IpAddr>,
    port: Option<u16>,
    kill_on_shutdown: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config.kill_on_shutdown |= kill_on_shutdown;

    println!(
        "{} http://{}:{}",
        "Starting Sparkbox API on".green().bold(),
        config.host,
        config.port
    );
    sparkbox_cli::run_server(config).await
}

fn list_templates(path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.or_else(|| Config::from_env().ok().and_then(|c| c.templates_path));
    let registry = sparkbox_cli::load_templates(path.as_deref())?;

    let mut templates = registry.list();
    templates.sort_by(|a, b| a.id.cmp(&b.id));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec!["ID", "Image", "Ports", "Runs code"]);

    for template in templates {
        let ports = if template.ports.is_empty() {
            "-".to_string()
        } else {
            template
                .ports
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };

        table.add_row(vec![
            template.id.clone(),
            template.image.clone(),
            ports,
            if template.code_runner.is_some() { "yes" } else { "no" }.to_string(),
        ]);
    }

    println!("{table}");
    Ok(())
}
