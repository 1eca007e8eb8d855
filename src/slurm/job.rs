use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::options::context::ContextBindings;
use crate::slurm::compose::{ComposeError, Composer, PayloadSource};
use crate::slurm::fragment::Bindings;
use crate::slurm::input::{get_script_paths, Input};

/// Default directory for job stdout and stderr logs, relative to the submission directory
pub const DEFAULT_LOG_DIRECTORY: &str = "logs";

/// Default mail notification events
pub const DEFAULT_NOTIFY_EVENTS: &[&str] = &["BEGIN", "END", "FAIL"];

/// Default extension appended to batch output file names
pub const DEFAULT_EXTENSION: &str = "slurm";

/// Permissions of written job scripts: rwx for user and group, read for others
pub const EXECUTABLE_MODE: u32 = 0o774;

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error("can't read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Who the job is and where it reports to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdentity {
    job_name: String,
    log_directory: String,
    login_shell: bool,
    notify_email: Option<String>,
    notify_events: String,
}

impl JobIdentity {
    pub fn new(job_name: impl Into<String>) -> Self {
        JobIdentity {
            job_name: job_name.into(),
            log_directory: DEFAULT_LOG_DIRECTORY.to_string(),
            login_shell: true,
            notify_email: None,
            notify_events: DEFAULT_NOTIFY_EVENTS.join(","),
        }
    }

    pub fn with_log_directory(mut self, log_directory: impl Into<String>) -> Self {
        self.log_directory = log_directory.into();
        self
    }

    pub fn with_login_shell(mut self, login_shell: bool) -> Self {
        self.login_shell = login_shell;
        self
    }

    pub fn with_notify_email(mut self, email: Option<String>) -> Self {
        self.notify_email = email;
        self
    }

    pub fn with_notify_events(mut self, events: impl Into<String>) -> Self {
        self.notify_events = events.into();
        self
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Job header bindings. Both log streams go to the same directory.
    pub fn bindings(&self) -> Bindings {
        let mut bindings = Bindings::new();
        bindings.insert("job_name".to_string(), Value::String(self.job_name.clone()));
        bindings.insert("stderr_log_dir".to_string(), Value::String(self.log_directory.clone()));
        bindings.insert("stdout_log_dir".to_string(), Value::String(self.log_directory.clone()));
        bindings.insert("login_shell".to_string(), Value::Bool(self.login_shell));
        if let Some(email) = &self.notify_email {
            bindings.insert("mail_user".to_string(), Value::String(email.clone()));
        }
        bindings.insert("mail_type".to_string(), Value::String(self.notify_events.clone()));
        bindings
    }
}

/// A rendered job script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobScript {
    /// File name of the input script this was generated from (batch mode only)
    pub source_name: Option<String>,
    pub content: String,
}

impl JobScript {
    /// Output file name, `<source name>.<extension>`
    pub fn file_name(&self, extension: &str) -> Option<String> {
        self.source_name.as_ref().map(|name| format!("{name}.{extension}"))
    }

    /// Write the script to disk, replacing any existing file, and make it executable
    pub fn write(&self, out_path: &Path) -> Result<(), io::Error> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(out_path)?;
        file.write_all(self.content.as_bytes())?;
        set_executable(out_path)
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), io::Error> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(EXECUTABLE_MODE))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), io::Error> {
    Ok(())
}

/// Write batch scripts into `out_dir` (created if needed) and return the written paths
///
/// All or nothing: if any script can't be written, the scripts already written by this call are
/// removed again before the error is returned. The output directory itself is left in place.
pub fn write_batch(
    scripts: &[JobScript],
    out_dir: &Path,
    extension: &str,
) -> Result<Vec<PathBuf>, io::Error> {
    fs::create_dir_all(out_dir)?;
    let mut written = Vec::with_capacity(scripts.len());
    for (i, script) in scripts.iter().enumerate() {
        let name = script
            .file_name(extension)
            .unwrap_or_else(|| format!("job-{i}.{extension}"));
        let path = out_dir.join(name);
        info!("Writing job script to {}", path.display());
        if let Err(err) = script.write(&path) {
            warn!("Can't write {}: {}, removing scripts written so far", path.display(), err);
            if path.is_file() {
                written.push(path);
            }
            remove_written(&written);
            return Err(err);
        }
        written.push(path);
    }
    Ok(written)
}

fn remove_written(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = fs::remove_file(path) {
            warn!("Can't remove {}: {}", path.display(), err);
        }
    }
}

/// Everything needed to generate scripts for one job, independent of its input
#[derive(Debug, Clone)]
pub struct Job {
    pub identity: JobIdentity,
    /// Normalised run header bindings
    pub run: Bindings,
    pub context: ContextBindings,
}

impl Job {
    pub fn new(identity: JobIdentity, run: Bindings, context: ContextBindings) -> Self {
        Job { identity, run, context }
    }

    /// Generate one script per input: a single one for command and script inputs, one per file
    /// for a batch directory
    pub fn scripts(&self, composer: &Composer, input: &Input) -> Result<Vec<JobScript>, JobError> {
        match input {
            Input::Command(command) => {
                info!("Rendering command job {}", self.identity.job_name());
                let content = self.compose_commands(composer, &[command.clone()], None)?;
                Ok(vec![JobScript { source_name: None, content }])
            }
            Input::Script { path, embed } => {
                info!("Rendering script job {} from {}", self.identity.job_name(), path.display());
                let content = self.compose_script(composer, path, *embed)?;
                Ok(vec![JobScript { source_name: None, content }])
            }
            Input::Batch { dir, embed } => {
                let paths = get_script_paths(dir).map_err(|source| JobError::Read {
                    path: dir.clone(),
                    source,
                })?;
                if paths.is_empty() {
                    warn!("No scripts found in {}, nothing to render", dir.display());
                }
                let mut scripts = Vec::with_capacity(paths.len());
                for path in paths {
                    info!(
                        "Rendering batch job {} from {}",
                        self.identity.job_name(),
                        path.display()
                    );
                    let content = self.compose_script(composer, &path, *embed)?;
                    let source_name =
                        path.file_name().map(|name| name.to_string_lossy().into_owned());
                    scripts.push(JobScript { source_name, content });
                }
                Ok(scripts)
            }
        }
    }

    /// Embedded scripts become the payload verbatim. Otherwise the script's path is the command,
    /// and setup and teardown learn about it through `task_script`.
    fn compose_script(
        &self,
        composer: &Composer,
        path: &Path,
        embed: bool,
    ) -> Result<String, JobError> {
        if embed {
            let text = fs::read_to_string(path).map_err(|source| JobError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let sections = composer.compose_sections(
                &self.identity.bindings(),
                &self.run,
                &self.context.setup_bindings(None),
                PayloadSource::Embedded(&text),
                &self.context.teardown_bindings(None),
            )?;
            Ok(sections.script())
        } else {
            let task_script = path.to_string_lossy().into_owned();
            self.compose_commands(composer, &[task_script.clone()], Some(&task_script))
        }
    }

    fn compose_commands(
        &self,
        composer: &Composer,
        commands: &[String],
        task_script: Option<&str>,
    ) -> Result<String, JobError> {
        let script = composer.compose(
            &self.identity.bindings(),
            &self.run,
            &self.context.setup_bindings(task_script),
            &self.context.payload_bindings(commands),
            &self.context.teardown_bindings(task_script),
        )?;
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::normalize::Normalizer;
    use crate::slurm::catalog::TemplateCatalog;
    use serde_json::json;
    use tempfile::TempDir;

    fn job() -> Job {
        let options = json!({"walltime": "01:00:00", "num_cpus": 2});
        let run = Normalizer::run().normalize(options.as_object().unwrap());
        Job::new(JobIdentity::new("test1"), run, ContextBindings::default())
    }

    #[test]
    fn test_identity_defaults() {
        let bindings = JobIdentity::new("test1").bindings();
        assert_eq!(bindings["job_name"], json!("test1"));
        assert_eq!(bindings["stderr_log_dir"], json!("logs"));
        assert_eq!(bindings["stdout_log_dir"], json!("logs"));
        assert_eq!(bindings["login_shell"], json!(true));
        assert_eq!(bindings["mail_type"], json!("BEGIN,END,FAIL"));
        assert!(!bindings.contains_key("mail_user"));
    }

    #[test]
    fn test_command_job() {
        let catalog = TemplateCatalog::builtin();
        let composer = Composer::new(&catalog).unwrap();
        let scripts = job().scripts(&composer, &Input::Command("echo hi".to_string())).unwrap();

        assert_eq!(scripts.len(), 1);
        let content = &scripts[0].content;
        assert!(content.starts_with("#!/bin/bash --login\n#SBATCH --job-name=test1\n"));
        assert!(content.contains("#SBATCH --cpus-per-task=2\n"));
        assert!(content.ends_with("\nsrun echo hi\n"));
        assert!(!content.contains("--gres"));
        assert!(!content.contains("task script"));
    }

    #[test]
    fn test_script_job_stages_task_script() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.sh");
        fs::write(&path, "python train.py\n").unwrap();

        let catalog = TemplateCatalog::builtin();
        let composer = Composer::new(&catalog).unwrap();
        let input = Input::Script { path: path.clone(), embed: false };
        let scripts = job().scripts(&composer, &input).unwrap();

        let content = &scripts[0].content;
        let path = path.display().to_string();
        assert!(content.contains(&format!("srun {path}\n")));
        assert!(content.contains(&format!("echo \"staging task script {path}\"\n")));
        assert!(content.ends_with(&format!("echo \"finished task script {path}\"\n")));
        assert!(!content.contains("python train.py"));
    }

    #[test]
    fn test_embedded_script_job() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.sh");
        fs::write(&path, "python train.py\n").unwrap();

        let catalog = TemplateCatalog::builtin();
        let composer = Composer::new(&catalog).unwrap();
        let input = Input::Script { path, embed: true };
        let scripts = job().scripts(&composer, &input).unwrap();

        let content = &scripts[0].content;
        assert!(content.ends_with("\npython train.py\n"));
        assert!(!content.contains("srun"));
        assert!(!content.contains("task script"));
    }

    #[test]
    fn test_missing_script_file() {
        let temp = TempDir::new().unwrap();
        let catalog = TemplateCatalog::builtin();
        let composer = Composer::new(&catalog).unwrap();
        let input = Input::Script { path: temp.path().join("missing.sh"), embed: true };
        assert!(matches!(job().scripts(&composer, &input), Err(JobError::Read { .. })));
    }

    #[test]
    fn test_batch_job_writes_one_file_per_script() {
        let temp = TempDir::new().unwrap();
        let batch_in = temp.path().join("in");
        let batch_out = temp.path().join("out");
        fs::create_dir(&batch_in).unwrap();
        fs::write(batch_in.join("a.sh"), "echo a\n").unwrap();
        fs::write(batch_in.join("b.sh"), "echo b\n").unwrap();

        let catalog = TemplateCatalog::builtin();
        let composer = Composer::new(&catalog).unwrap();
        let input = Input::Batch { dir: batch_in.clone(), embed: false };
        let scripts = job().scripts(&composer, &input).unwrap();
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].source_name.as_deref(), Some("a.sh"));
        let srun = format!("srun {}\n", batch_in.join("a.sh").display());
        assert!(scripts[0].content.contains(&srun));

        let written = write_batch(&scripts, &batch_out, DEFAULT_EXTENSION).unwrap();
        assert_eq!(written, vec![batch_out.join("a.sh.slurm"), batch_out.join("b.sh.slurm")]);
        assert_eq!(fs::read_to_string(&written[1]).unwrap(), scripts[1].content);
    }

    #[test]
    fn test_failed_batch_write_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let batch_out = temp.path().join("out");
        // a directory where the second script should go makes its write fail
        fs::create_dir_all(batch_out.join("b.sh.slurm")).unwrap();

        let scripts = vec![
            JobScript { source_name: Some("a.sh".to_string()), content: "echo a\n".to_string() },
            JobScript { source_name: Some("b.sh".to_string()), content: "echo b\n".to_string() },
            JobScript { source_name: Some("c.sh".to_string()), content: "echo c\n".to_string() },
        ];
        assert!(write_batch(&scripts, &batch_out, DEFAULT_EXTENSION).is_err());

        assert!(!batch_out.join("a.sh.slurm").exists());
        assert!(!batch_out.join("c.sh.slurm").exists());
        assert!(batch_out.join("b.sh.slurm").is_dir());
    }

    #[test]
    fn test_empty_batch_directory() {
        let temp = TempDir::new().unwrap();
        let catalog = TemplateCatalog::builtin();
        let composer = Composer::new(&catalog).unwrap();
        let input = Input::Batch { dir: temp.path().to_path_buf(), embed: true };
        assert!(job().scripts(&composer, &input).unwrap().is_empty());
    }

    #[test]
    fn test_missing_walltime_fails_job() {
        let run = Normalizer::run().normalize(json!({"num_cpus": 2}).as_object().unwrap());
        let job = Job::new(JobIdentity::new("test1"), run, ContextBindings::default());
        let catalog = TemplateCatalog::builtin();
        let composer = Composer::new(&catalog).unwrap();

        let err = job.scripts(&composer, &Input::Command("echo hi".to_string())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "can't render run_header: missing required bindings walltime"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_written_script_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("job.slurm");
        let script = JobScript { source_name: None, content: "#!/bin/bash\n".to_string() };
        script.write(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, EXECUTABLE_MODE);
    }
}
