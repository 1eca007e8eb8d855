use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use slurmify::options::config::read_options;
use slurmify::options::context::ContextBindings;
use slurmify::options::normalize::Normalizer;
use slurmify::options::{merge_overrides, Options};
use slurmify::slurm::catalog::TemplateCatalog;
use slurmify::slurm::compose::Composer;
use slurmify::slurm::input::Input;
use slurmify::slurm::job::{write_batch, Job, JobIdentity, JobScript};
use slurmify::slurm::submit::{SubmissionResult, Submitter};

use crate::cli::{Cli, Commands, JobArgs};

mod cli;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    info!("Starting slurmify {}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    match cli.command {
        Commands::Render(args) => render(&args),
        Commands::Submit(args) => submit(&args.job, &args.sbatch),
    }
}

/// Render scripts and print them, or write them when an output path was given
fn render(args: &JobArgs) -> Result<()> {
    let (input, job, catalog) = prepare(args)?;
    if matches!(input, Input::Batch { .. }) && args.output.batch_out.is_none() {
        bail!("--batch-in requires --batch-out");
    }
    let composer = Composer::new(&catalog)?;
    let scripts = job.scripts(&composer, &input)?;

    match (&input, &args.output.batch_out, &args.output.script_out) {
        (Input::Batch { .. }, Some(out_dir), _) => {
            for path in write_batch(&scripts, out_dir, &args.output.extension)? {
                println!("Writing submission: {}", path.display());
            }
        }
        (_, _, Some(out_path)) => {
            for script in &scripts {
                println!("Writing submission: {}", out_path.display());
                write_script(script, out_path)?;
            }
        }
        _ => {
            for script in &scripts {
                print!("{}", script.content);
            }
        }
    }

    Ok(())
}

/// Render scripts and submit each one, keeping the files when an output path was given
fn submit(args: &JobArgs, sbatch: &str) -> Result<()> {
    let (input, job, catalog) = prepare(args)?;
    let composer = Composer::new(&catalog)?;
    let scripts = job.scripts(&composer, &input)?;
    let submitter = Submitter::new(sbatch);

    match (&input, &args.output.batch_out, &args.output.script_out) {
        (Input::Batch { .. }, Some(out_dir), _) => {
            for path in write_batch(&scripts, out_dir, &args.output.extension)? {
                report(&submitter.submit(&path)?);
            }
        }
        (Input::Batch { .. }, None, _) => {
            for script in &scripts {
                report(&submitter.submit_text(&script.content)?);
            }
        }
        (_, _, Some(out_path)) => {
            for script in &scripts {
                write_script(script, out_path)?;
                report(&submitter.submit(out_path)?);
            }
        }
        _ => {
            for script in &scripts {
                report(&submitter.submit_text(&script.content)?);
            }
        }
    }

    Ok(())
}

/// Gather input, options, context, and templates from the arguments
fn prepare(args: &JobArgs) -> Result<(Input, Job, TemplateCatalog)> {
    let input = Input::select(
        args.input.command.clone(),
        args.input.script_in.clone(),
        args.input.batch_in.clone(),
        args.input.embed_script,
    )?;
    let input = resolve_input(input)?;

    let config = match &args.config {
        Some(path) => read_options(path)?,
        None => Options::new(),
    };
    let options = merge_overrides(config, args.resources.to_options());
    let run = Normalizer::run().normalize(&options);

    let mut context = match &args.context {
        Some(path) => ContextBindings::from_document(read_options(path)?)?,
        None => ContextBindings::default(),
    };
    if let Some(epilog) = &args.epilog {
        context.set_epilog(resolve(epilog)?.display().to_string());
    }

    let mut identity = JobIdentity::new(&args.job_name)
        .with_log_directory(&args.log_dir)
        .with_login_shell(!args.no_login_shell)
        .with_notify_email(args.email.clone());
    if let Some(events) = &args.mail_type {
        identity = identity.with_notify_events(events);
    }

    let catalog = match &args.templates {
        Some(dir) => TemplateCatalog::from_dir(dir)
            .with_context(|| format!("Can't load templates from {}", dir.display()))?,
        None => TemplateCatalog::builtin(),
    };

    Ok((input, Job::new(identity, run, context), catalog))
}

/// Absolute paths for script and batch inputs
fn resolve_input(input: Input) -> Result<Input> {
    let input = match input {
        Input::Script { path, embed } => Input::Script { path: resolve(&path)?, embed },
        Input::Batch { dir, embed } => Input::Batch { dir: resolve(&dir)?, embed },
        command => command,
    };
    Ok(input)
}

/// Absolute form of a path, which must exist
fn resolve(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Can't find {}", path.display()))
}

fn write_script(script: &JobScript, out_path: &Path) -> Result<()> {
    script
        .write(out_path)
        .with_context(|| format!("Can't write job script to {}", out_path.display()))
}

fn report(result: &SubmissionResult) {
    println!("JOBID: {}", result.job_id);
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use slurmify::slurm::input::AmbiguousInputError;
    use tempfile::TempDir;

    fn job_args(args: &[&str]) -> JobArgs {
        let cli = Cli::try_parse_from(["slurmify", "render", "test1"].iter().chain(args)).unwrap();
        match cli.command {
            Commands::Render(args) => args,
            Commands::Submit(args) => args.job,
        }
    }

    #[test]
    fn test_two_inputs_are_ambiguous_before_paths_are_checked() {
        let args = job_args(&["--command", "echo hi", "--script-in", "/nonexistent/missing.sh"]);
        let err = prepare(&args).unwrap_err();
        assert!(err.downcast_ref::<AmbiguousInputError>().is_some());
    }

    #[test]
    fn test_batch_without_out_dir_is_ambiguous_with_command() {
        let args = job_args(&["--command", "echo hi", "--batch-in", "/nonexistent/jobs"]);
        let err = render(&args).unwrap_err();
        assert!(err.downcast_ref::<AmbiguousInputError>().is_some());
    }

    #[test]
    fn test_batch_requires_out_dir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_str().unwrap();
        let err = render(&job_args(&["--walltime", "1:00", "--batch-in", dir])).unwrap_err();
        assert_eq!(err.to_string(), "--batch-in requires --batch-out");
    }

    #[test]
    fn test_cli_flags_override_config() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("run.toml");
        fs::write(
            &config,
            "walltime = 01:00:00\nnum_cpus = 4\nconstraint = \"skylake\"\n",
        )
        .unwrap();

        let args = job_args(&[
            "--config",
            config.to_str().unwrap(),
            "--num-cpus",
            "8",
            "--num-gpus",
            "2",
            "--command",
            "echo hi",
        ]);
        let (input, job, _) = prepare(&args).unwrap();

        assert_eq!(input, Input::Command("echo hi".to_string()));
        assert_eq!(job.run["walltime"], json!("01:00:00"));
        assert_eq!(job.run["cpus_per_task"], json!("8"));
        assert_eq!(job.run["constraint"], json!("skylake"));
        assert_eq!(job.run["gres"], json!("gpu:2"));
        assert_eq!(job.run["nodes"], json!(1));
    }

    #[test]
    fn test_epilog_flag_overrides_context() {
        let temp = TempDir::new().unwrap();
        let context = temp.path().join("context.toml");
        fs::write(&context, "[context]\nepilog = \"/from/context.sh\"\n").unwrap();
        let epilog = temp.path().join("post.sh");
        fs::write(&epilog, "echo done\n").unwrap();

        let args = job_args(&[
            "--context",
            context.to_str().unwrap(),
            "--epilog",
            epilog.to_str().unwrap(),
            "--command",
            "echo hi",
        ]);
        let (_, job, _) = prepare(&args).unwrap();

        let expected = fs::canonicalize(&epilog).unwrap().display().to_string();
        assert_eq!(job.context.general["epilog"], json!(expected));
    }

    #[test]
    fn test_identity_flags() {
        let args = job_args(&[
            "--email",
            "me@example.org",
            "--mail-type",
            "END",
            "--log-dir",
            "out",
            "--no-login-shell",
            "--command",
            "echo hi",
        ]);
        let (_, job, _) = prepare(&args).unwrap();
        let bindings = job.identity.bindings();

        assert_eq!(bindings["mail_user"], json!("me@example.org"));
        assert_eq!(bindings["mail_type"], json!("END"));
        assert_eq!(bindings["stdout_log_dir"], json!("out"));
        assert_eq!(bindings["login_shell"], json!(false));
    }

    #[test]
    fn test_script_input_is_made_absolute() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("job.sh");
        fs::write(&script, "echo hi\n").unwrap();

        let (input, _, _) = prepare(&job_args(&["--script-in", script.to_str().unwrap()])).unwrap();
        assert_eq!(
            input,
            Input::Script { path: fs::canonicalize(&script).unwrap(), embed: false }
        );
    }
}
