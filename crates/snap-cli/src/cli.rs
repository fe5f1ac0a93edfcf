use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use snap_diff::engine::DEFAULT_MAX_CONCURRENCY;
use snap_store::Artifact;
use snap_types::BuildId;

#[derive(Parser)]
#[command(
    name = "snap-inspect",
    about = "Inspect incremental snapshot layers and their redundant blocks",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML storage config. Falls back to STORAGE_PROVIDER and friends.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "memfile")]
    pub artifact: ArtifactArg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ArtifactArg {
    Memfile,
    Rootfs,
}

impl From<ArtifactArg> for Artifact {
    fn from(arg: ArtifactArg) -> Self {
        match arg {
            ArtifactArg::Memfile => Artifact::Memfile,
            ArtifactArg::Rootfs => Artifact::Rootfs,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Classify every block of a range across a layer chain
    Diff(DiffArgs),
    /// Print a layer's metadata and block mapping
    Header(HeaderArgs),
    /// Show which build stores the bytes at an offset
    Resolve(ResolveArgs),
}

#[derive(Args)]
pub struct DiffArgs {
    /// Comma-separated build ids; the chain is loaded from the last one
    #[arg(long, value_delimiter = ',', required = true)]
    pub layers: Vec<BuildId>,
    /// Expected block size in bytes (defaults to the chain's)
    #[arg(long)]
    pub block_size: Option<u64>,
    /// First block index
    #[arg(long, default_value_t = 0)]
    pub start: u64,
    /// End block index, exclusive. 0 means the last block.
    #[arg(long, default_value_t = 0)]
    pub end: u64,
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENCY)]
    pub concurrency: usize,
}

#[derive(Args)]
pub struct HeaderArgs {
    #[arg(long)]
    pub build: BuildId,
}

#[derive(Args)]
pub struct ResolveArgs {
    #[arg(long)]
    pub build: BuildId,
    /// Byte offset into the layer's address space
    #[arg(long)]
    pub offset: u64,
}
