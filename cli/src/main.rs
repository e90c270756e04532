use std::fs;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use alethia_kernel::address::derive_log_identifier;
use alethia_kernel::config::LedgerConfig;
use alethia_kernel::ledger::InMemoryLedger;
use alethia_kernel::simulate::simulate_upload;
use alethia_kernel::verify::{hash_lines, split_lines, verify_records};

/// Alethia log integrity CLI
#[derive(Parser, Debug)]
#[command(name = "alethia")]
#[command(about = "Tamper-evident log ledger tooling", long_about = None)]
struct Cli {
    /// Path to ledger config JSON
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive the identifier of a log and optionally one page address
    LogId {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        log: String,
        #[arg(long)]
        page: Option<u64>,
    },

    /// Write one SHA-256 digest per line of a log file
    Hash {
        #[arg(long)]
        input: String,
        #[arg(long)]
        output: String,
    },

    /// Verify a log file against a hash file
    Verify {
        #[arg(long)]
        log: String,
        #[arg(long)]
        hashes: String,
    },

    /// Upload a log's line digests to an in-memory ledger and verify them
    Simulate {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        log: String,
        #[arg(long)]
        input: String,
    },
}

#[derive(Debug, Serialize)]
struct LogIdOutput {
    log_id: String,
    namespace: String,
    page_address: Option<String>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&str>) -> Result<LedgerConfig> {
    let Some(path) = path else {
        return Ok(LedgerConfig::default());
    };
    let data = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    Ok(LedgerConfig::from_json(&data)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::LogId { owner, log, page } => {
            let log_id = derive_log_identifier(&config.family_name, &owner, &log)?;
            print_json(&LogIdOutput {
                namespace: log_id.namespace().to_string(),
                page_address: page.map(|i| log_id.page(i).to_string()),
                log_id: log_id.to_string(),
            })
        }

        Command::Hash { input, output } => {
            let text = fs::read_to_string(&input).with_context(|| format!("reading {input}"))?;
            let digests = hash_lines(&text);

            let mut body = digests.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            fs::write(&output, body).with_context(|| format!("writing {output}"))?;

            info!(lines = digests.len(), %output, "wrote hash file");
            Ok(())
        }

        Command::Verify { log, hashes } => {
            let text = fs::read_to_string(&log).with_context(|| format!("reading {log}"))?;
            let hash_text =
                fs::read_to_string(&hashes).with_context(|| format!("reading {hashes}"))?;

            let report = verify_records(&split_lines(&text), &split_lines(&hash_text));
            if !report.is_clean() {
                info!(
                    mismatches = report.mismatches.len(),
                    "log does not match its hashes"
                );
            }
            print_json(&report)
        }

        Command::Simulate { owner, log, input } => {
            let text = fs::read_to_string(&input).with_context(|| format!("reading {input}"))?;
            let ledger = InMemoryLedger::new(config.clone())?;

            let result = simulate_upload(&ledger, &config, &owner, &log, &text)?;
            print_json(&result)
        }
    }
}
