use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use slurmify::options::ResourceRequest;
use slurmify::slurm::job::{DEFAULT_EXTENSION, DEFAULT_LOG_DIRECTORY};
use slurmify::slurm::submit::SBATCH;

#[derive(Parser, Debug)]
#[command(
    name = "slurmify",
    version,
    about = "Render SLURM job scripts and submit them with sbatch"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render job scripts to stdout or to files
    Render(JobArgs),
    /// Render job scripts and submit each one with sbatch
    Submit(SubmitArgs),
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Submission command
    #[arg(long, default_value = SBATCH)]
    pub sbatch: String,
}

#[derive(Args, Debug)]
pub struct JobArgs {
    /// Name of the job
    pub job_name: String,

    /// TOML file with run options. Flags given on the command line override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// TOML file with a [context] table for the setup and teardown sections
    #[arg(long)]
    pub context: Option<PathBuf>,

    /// Directory of templates overriding the built-in ones
    #[arg(long)]
    pub templates: Option<PathBuf>,

    /// Script run after the payload whether or not it succeeds
    #[arg(long)]
    pub epilog: Option<PathBuf>,

    #[command(flatten)]
    pub resources: ResourceRequest,

    /// Directory for job stdout and stderr logs
    #[arg(long, default_value = DEFAULT_LOG_DIRECTORY)]
    pub log_dir: String,

    /// Use a plain bash shebang instead of a login shell
    #[arg(long)]
    pub no_login_shell: bool,

    /// Address for job notifications
    #[arg(long)]
    pub email: Option<String>,

    /// Notification events [default: BEGIN,END,FAIL]
    #[arg(long)]
    pub mail_type: Option<String>,

    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Exactly one of these must be given
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Run a single command
    #[arg(long)]
    pub command: Option<String>,

    /// Run a script file
    #[arg(long)]
    pub script_in: Option<PathBuf>,

    /// Generate one job per file in a directory
    #[arg(long)]
    pub batch_in: Option<PathBuf>,

    /// Embed script contents in the job script instead of running the script by path
    #[arg(long)]
    pub embed_script: bool,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Write the job script here instead of stdout
    #[arg(long)]
    pub script_out: Option<PathBuf>,

    /// Directory for batch job scripts
    #[arg(long)]
    pub batch_out: Option<PathBuf>,

    /// Extension appended to batch job script names
    #[arg(long, default_value = DEFAULT_EXTENSION)]
    pub extension: String,
}
