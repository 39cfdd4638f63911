use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use emo_mcp::config::Config;
use emo_mcp::document::{parser, validator};
use emo_mcp::input::load_document;
use emo_mcp::{build_dispatcher, server};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emo-mcp")]
#[command(
    version,
    about = "MCP tool server and utilities for occupational medical exam records"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
#[command(
    group(
        clap::ArgGroup::new("transport")
            .required(true)
            .multiple(false)
            .args(["stdio", "http"])
    )
)]
struct ServeArgs {
    /// Serve MCP over stdio (NDJSON)
    #[arg(long)]
    stdio: bool,
    /// Serve MCP over HTTP (POST /api/mcp)
    #[arg(long)]
    http: bool,
    /// HTTP bind address, overrides EMO_MCP_BIND
    #[arg(long, requires = "http")]
    bind: Option<SocketAddr>,
}

#[derive(Args, Clone)]
#[command(
    group(
        clap::ArgGroup::new("input")
            .required(true)
            .multiple(false)
            .args(["path", "base64"])
    )
)]
struct ValidatePdfArgs {
    /// Path to the EMO PDF
    #[arg(long)]
    path: Option<PathBuf>,
    /// Base64-encoded PDF bytes
    #[arg(long)]
    base64: Option<String>,
    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Clone)]
struct ParseExtractionArgs {
    /// Path to a saved model reply
    #[arg(long)]
    path: PathBuf,
    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server
    Serve(ServeArgs),
    /// Validate and classify a PDF without calling any service
    ValidatePdf(ValidatePdfArgs),
    /// Parse a saved model reply into summary and table
    ParseExtraction(ParseExtractionArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::ValidatePdf(args) => run_validate_pdf(args),
        Commands::ParseExtraction(args) => run_parse_extraction(args),
    }
}

/// Logs go to stderr; stdout carries the protocol.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("emo_mcp=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    let dispatcher = build_dispatcher(&config).context("failed to start server")?;

    if args.stdio {
        server::serve_stdio(dispatcher).await?;
    } else {
        let bind = args.bind.unwrap_or(config.server.bind);
        server::serve_http(dispatcher, bind, config.server.request_timeout).await?;
    }
    Ok(())
}

fn run_validate_pdf(args: ValidatePdfArgs) -> Result<()> {
    let input = match load_document(args.path.as_deref(), args.base64.as_deref()) {
        Ok(input) => input,
        Err(err) => fail(&err.to_string()),
    };
    tracing::debug!(source = %input.source, "validating document");
    let validation = validator::validate(&input.base64);

    if args.json {
        print_json(&validation)?;
    } else if validation.is_valid {
        let pages = validation
            .page_count
            .map(|count| count.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "valid {} PDF, {:.2} MB, {pages} pages, preprocessing {}",
            validation.kind.as_str(),
            validation.size_in_mb,
            if validation.needs_preprocessing() {
                "recommended"
            } else {
                "not needed"
            }
        );
    }

    if !validation.is_valid {
        fail(validation.error.as_deref().unwrap_or("invalid document"));
    }
    Ok(())
}

fn run_parse_extraction(args: ParseExtractionArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let parsed = match parser::parse(&text) {
        Ok(parsed) => parsed,
        Err(err) => fail(&err.to_string()),
    };

    if args.json {
        return print_json(&parsed);
    }

    println!("{}", parsed.clinical_summary);
    if let Some(table) = &parsed.parsed_table {
        println!();
        for (header, value) in table {
            println!("{header}: {value}");
        }
    }
    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let output = serde_json::to_string_pretty(value)?;
    println!("{output}");
    Ok(())
}

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    process::exit(1);
}
