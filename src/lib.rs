//! Generate SLURM batch scripts from a job description and submit them with sbatch
//!
//! Options from config files and CLI flags are normalised into template bindings
//! ([`options`]), rendered into five script fragments, and assembled into a job script
//! ([`slurm`]).

/// Job submission options and their normalisation into template bindings
pub mod options;

/// Script rendering and submission
pub mod slurm;
