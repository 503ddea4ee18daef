use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "mdscope CLI - Load molecular-dynamics trajectories and compute statistical properties over their frames.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print structure and trajectory information without computing anything.
    Info(InfoArgs),
    /// Compute the properties defined in an analysis config and export them as CSV.
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Path to the molecular structure file (e.g. protein.gro, protein.pdb).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub structure: PathBuf,

    /// Path to a trajectory file paired with the structure.
    #[arg(short, long, value_name = "PATH")]
    pub trajectory: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Path to the molecular structure file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub structure: PathBuf,

    /// Path to the trajectory file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub trajectory: PathBuf,

    /// Path to the analysis configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Directory the per-property CSV files are written to.
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub output: PathBuf,
}
