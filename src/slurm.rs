//! Load job script templates, render them, and submit the result to SLURM

/// Script fragments and the bindings each one requires
pub mod fragment;

/// The immutable set of fragment templates
pub mod catalog;

/// Validate bindings, render fragments, and assemble the final script
pub mod compose;

/// Command, script, and batch inputs
pub mod input;

/// Job identity and per-input script generation
pub mod job;

/// Hand rendered scripts to sbatch
pub mod submit;
