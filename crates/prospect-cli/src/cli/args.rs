use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_DB: &str = ".prospect/cache.db";

#[derive(Parser)]
#[command(
    name = "prospect",
    version,
    about = "Cached, batched classification of researcher profiles"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Classify profiles and write the segmentation report
    Run(RunArgs),
    /// Show fingerprints and evidence counts without calling the classifier
    Inspect(InspectArgs),
    /// Classification cache inspection
    Cache(CacheArgs),
}

#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    #[arg(long, default_value = "prospect.yaml")]
    pub config: PathBuf,

    /// profiles, one JSON object per line
    #[arg(long)]
    pub input: PathBuf,

    /// overrides cache_path from the config
    #[arg(long)]
    pub db: Option<PathBuf>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// ignore cached results and overwrite them with fresh classifications
    #[arg(long)]
    pub refresh: bool,

    /// write the JSON report here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
pub struct InspectArgs {
    #[arg(long)]
    pub input: PathBuf,

    /// also print the rendered evidence spans
    #[arg(long)]
    pub spans: bool,
}

#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub cmd: CacheCmd,
}

#[derive(Subcommand, Debug)]
pub enum CacheCmd {
    /// Entry counts per final label
    Stats {
        #[arg(long, default_value = DEFAULT_DB)]
        db: PathBuf,
    },
    /// Print the stored result for one fingerprint
    Show {
        #[arg(long, default_value = DEFAULT_DB)]
        db: PathBuf,
        fingerprint: String,
    },
}
