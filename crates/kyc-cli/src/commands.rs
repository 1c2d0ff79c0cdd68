use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::{ColoredString, Colorize};
use kyc_crypto::EntryHasher;
use kyc_ledger::{Entry, Journal, Ledger, LedgerReader, StatusResolver, StreamValidator};
use kyc_server::{KycServer, ServerConfig};
use kyc_types::{SubjectId, VerificationStatus};
use serde_json::{json, Value};
use tracing::debug;

use crate::cli::*;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "kyc.toml";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let journal = config.journal_path();
    debug!(
        data_dir = %config.data_dir.display(),
        journal = %journal.display(),
        "loaded configuration"
    );
    let format = cli.format;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args),
        Command::Verify(args) => cmd_verify(&config, args, &format),
        Command::Status(args) => cmd_status(&config, args, &format),
        Command::Pending(_) => cmd_pending(&config, &format),
        Command::Log(args) => cmd_log(&config, args, &format),
        Command::History(args) => cmd_history(&config, args, &format),
        Command::Config(_) => cmd_config(&config, &format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    let config = match path {
        Some(path) => ServerConfig::load(path)?,
        None if default_path.exists() => ServerConfig::load(default_path)?,
        None => ServerConfig::default(),
    };
    Ok(config)
}

/// Load the journal read-only and rebuild a validated in-memory ledger.
fn open_ledger(journal: &Path) -> anyhow::Result<Ledger> {
    if !journal.exists() {
        bail!(
            "no ledger journal at {} (start `kyc serve` once to create it)",
            journal.display()
        );
    }
    let entries = Journal::read_entries(journal)
        .with_context(|| format!("failed to read {}", journal.display()))?;
    Ledger::from_entries(entries, EntryHasher::ENTRY)
        .with_context(|| format!("{} failed validation; run `kyc verify`", journal.display()))
}

fn open_resolver(config: &ServerConfig) -> anyhow::Result<StatusResolver> {
    Ok(StatusResolver::new(Arc::new(open_ledger(&config.journal_path())?)))
}

fn subject(raw: String) -> anyhow::Result<SubjectId> {
    SubjectId::new(raw).context("invalid KYC id")
}

fn print_json(value: Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn paint(status: &VerificationStatus) -> ColoredString {
    match status {
        VerificationStatus::Verified => status.as_str().green().bold(),
        VerificationStatus::Rejected => status.as_str().red().bold(),
        VerificationStatus::Pending => status.as_str().yellow().bold(),
        VerificationStatus::NotFound => status.as_str().dimmed(),
        VerificationStatus::Unknown | VerificationStatus::Other(_) => status.as_str().magenta(),
    }
}

fn entry_json(entry: &Entry) -> Value {
    json!({
        "sequence": entry.sequence(),
        "timestamp": entry.timestamp(),
        "payload": entry.payload(),
        "previousDigest": entry.previous_digest(),
        "digest": entry.digest(),
    })
}

fn print_entry(entry: &Entry, oneline: bool) {
    let payload = entry.payload();
    let event = payload.event().unwrap_or("?");
    let subject = payload.subject_id().unwrap_or("-");
    let seq = format!("#{}", entry.sequence());
    if oneline {
        println!(
            "{} {} {} {}",
            seq.yellow(),
            entry.digest().short_hex().dimmed(),
            event,
            subject
        );
        return;
    }
    println!(
        "{}  {}  {}",
        seq.yellow().bold(),
        entry.digest().short_hex().dimmed(),
        entry.timestamp().to_rfc3339().dimmed()
    );
    print!("  {} {}", event.cyan(), subject);
    match payload.status() {
        Some(status) => println!(" {}", paint(&VerificationStatus::from_ledger_value(status))),
        None => println!(),
    }
    for (key, value) in payload.iter() {
        if !matches!(key.as_str(), "event" | "subjectId" | "status") {
            println!("    {}: {}", key.dimmed(), value);
        }
    }
}

fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = args.upload_dir {
        config.upload_dir = dir;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move { KycServer::open(config).await?.serve().await })?;
    Ok(())
}

fn cmd_verify(config: &ServerConfig, args: VerifyArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let journal = args.journal.unwrap_or_else(|| config.journal_path());
    if !journal.exists() {
        bail!("no ledger journal at {}", journal.display());
    }
    let entries = Journal::read_entries(&journal)
        .with_context(|| format!("{} is corrupt", journal.display()))?;
    let report = StreamValidator::validate_entries(&entries, EntryHasher::ENTRY);

    match format {
        OutputFormat::Json => print_json(serde_json::to_value(&report)?)?,
        OutputFormat::Text if report.is_valid() => {
            println!("{} Ledger chain verified", "✓".green().bold());
            println!("  Entries: {}", report.entry_count.to_string().bold());
            if let Some(head) = report.head_digest {
                println!("  Head: {}", head.short_hex().yellow());
            }
        }
        OutputFormat::Text => {
            println!("{} Ledger chain broken", "✗".red().bold());
            for violation in &report.violations {
                println!(
                    "  {} {}",
                    format!("#{}", violation.sequence).yellow(),
                    violation.description
                );
            }
        }
    }
    if matches!(format, OutputFormat::Text) {
        for malformed in &report.malformed {
            println!(
                "  {} #{} {}",
                "malformed:".magenta(),
                malformed.sequence,
                malformed.description
            );
        }
    }

    match report.first_offender() {
        Some(sequence) => bail!("chain integrity violated at sequence {sequence}"),
        None => Ok(()),
    }
}

fn cmd_status(config: &ServerConfig, args: SubjectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let subject = subject(args.kyc_id)?;
    let status = open_resolver(config)?.status_of(&subject)?;
    match format {
        OutputFormat::Json => print_json(json!({ "kycId": subject, "status": status })),
        OutputFormat::Text => {
            println!("{} {}", subject.as_str().bold(), paint(&status));
            Ok(())
        }
    }
}

fn cmd_pending(config: &ServerConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let pending = open_resolver(config)?.pending_subjects()?;
    match format {
        OutputFormat::Json => print_json(json!({ "pending": pending })),
        OutputFormat::Text => {
            if pending.is_empty() {
                println!("No applications awaiting a decision.");
            }
            for subject in &pending {
                println!("  {} {}", paint(&VerificationStatus::Pending), subject);
            }
            Ok(())
        }
    }
}

fn cmd_log(config: &ServerConfig, args: LogArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let snapshot = open_ledger(&config.journal_path())?.all_entries()?;
    let newest: Vec<&Entry> = snapshot.iter().rev().take(args.limit).collect();
    match format {
        OutputFormat::Json => print_json(Value::Array(
            newest.iter().map(|entry| entry_json(entry)).collect(),
        )),
        OutputFormat::Text => {
            for entry in newest {
                print_entry(entry, args.oneline);
            }
            Ok(())
        }
    }
}

fn cmd_history(config: &ServerConfig, args: SubjectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let subject = subject(args.kyc_id)?;
    let resolver = open_resolver(config)?;
    let history = resolver.history(&subject)?;
    match format {
        OutputFormat::Json => print_json(json!({
            "kycId": subject,
            "entries": history.iter().map(|entry| entry_json(entry)).collect::<Vec<_>>(),
        })),
        OutputFormat::Text => {
            if history.is_empty() {
                println!("No entries for {}.", subject.as_str().bold());
            }
            for entry in &history {
                print_entry(entry, false);
            }
            println!("Status: {}", paint(&resolver.status_of(&subject)?));
            Ok(())
        }
    }
}

fn cmd_config(config: &ServerConfig, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(serde_json::to_value(config)?),
        OutputFormat::Text => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
