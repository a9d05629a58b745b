use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "hoard",
    about = "Hoard: replicate projects across a content-addressed chunk network",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Copy a project or file until every chunk has enough replicas
    Replicate(ReplicateArgs),
    /// Inspect or build manifest files
    Manifest(ManifestArgs),
    /// Publish a directory as a project
    Publish(PublishArgs),
    /// Generate a signing key
    Keygen(KeygenArgs),
}

#[derive(Args)]
pub struct ReplicateArgs {
    /// Root hash of the project or file (hex)
    pub hash: String,
    /// Store directory to read metadata from
    #[arg(long = "read", value_name = "DIR")]
    pub read: Vec<PathBuf>,
    /// Store directory to replicate to
    #[arg(long = "write", value_name = "DIR")]
    pub write: Vec<PathBuf>,
    /// Required copies per chunk
    #[arg(short = 'r', long)]
    pub replications: Option<usize>,
    #[arg(long)]
    pub workers: Option<usize>,
    /// Signing key file
    #[arg(long, value_name = "FILE")]
    pub key: Option<PathBuf>,
}

#[derive(Args)]
pub struct ManifestArgs {
    #[command(subcommand)]
    pub action: ManifestAction,
}

#[derive(Subcommand)]
pub enum ManifestAction {
    /// Decode and print a manifest
    Show { file: PathBuf },
    /// Write a manifest describing a directory
    Build(BuildArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    pub dir: PathBuf,
    #[arg(short, long)]
    pub output: PathBuf,
    /// Project name (defaults to the directory name)
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(
        long = "format-version",
        default_value_t = 4,
        value_parser = clap::value_parser!(u8).range(1..=4)
    )]
    pub format_version: u8,
}

#[derive(Args)]
pub struct PublishArgs {
    pub dir: PathBuf,
    /// Store directory to publish to
    #[arg(long = "to", value_name = "DIR", required = true)]
    pub to: Vec<PathBuf>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long, value_name = "FILE")]
    pub key: Option<PathBuf>,
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,
}

#[derive(Args)]
pub struct KeygenArgs {
    pub file: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
