use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kyc",
    about = "KYC ledger: tamper-evident identity verification records",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML config file (defaults to ./kyc.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Validate the ledger journal's hash chain
    Verify(VerifyArgs),
    /// Show an applicant's derived status
    Status(SubjectArgs),
    /// List applicants awaiting a decision
    Pending(PendingArgs),
    /// Show ledger entries, newest first
    Log(LogArgs),
    /// Show every entry for one applicant
    History(SubjectArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Journal file to check instead of the configured one
    pub journal: Option<PathBuf>,
}

#[derive(Args)]
pub struct SubjectArgs {
    pub kyc_id: String,
}

#[derive(Args)]
pub struct PendingArgs {}

#[derive(Args)]
pub struct LogArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long)]
    pub oneline: bool,
}

#[derive(Args)]
pub struct ConfigArgs {}
