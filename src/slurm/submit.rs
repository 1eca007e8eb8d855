use std::ffi::{OsStr, OsString};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use log::{debug, info};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Default scheduler submission command
pub const SBATCH: &str = "sbatch";

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} rejected {}: {status}: {stderr}", .script.display())]
    Rejected {
        program: String,
        script: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{program} did not report a job id")]
    MissingJobId { program: String },
    #[error("can't stage job script for submission: {0}")]
    Stage(#[source] io::Error),
}

/// Outcome of a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    pub job_id: String,
    pub stdout: String,
    pub stderr: String,
}

/// Runs the scheduler's submission command, one synchronous call per script
#[derive(Debug, Clone)]
pub struct Submitter {
    program: OsString,
    args: Vec<OsString>,
}

impl Submitter {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Submitter { program: program.as_ref().to_os_string(), args: Vec::new() }
    }

    /// Extra leading arguments, passed before `--parsable <script>`
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Submit a script file and return the job id reported by the scheduler
    pub fn submit(&self, script: &Path) -> Result<SubmissionResult, SubmissionError> {
        let mut sbatch = Command::new(&self.program);
        let cmd = sbatch.args(&self.args).arg("--parsable").arg(script);
        info!("Running {} process", self.program_name());
        debug!("{:?}", &cmd);

        let output = cmd.output().map_err(|source| SubmissionError::Spawn {
            program: self.program_name(),
            source,
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(SubmissionError::Rejected {
                program: self.program_name(),
                script: script.to_path_buf(),
                status: output.status,
                stderr: stderr.trim().to_string(),
            });
        }

        // --parsable prints "<job id>[;<cluster>]"
        let job_id = stdout.trim().split(';').next().unwrap_or_default().to_string();
        if job_id.is_empty() {
            return Err(SubmissionError::MissingJobId { program: self.program_name() });
        }
        info!("SLURM job id: {job_id}");

        Ok(SubmissionResult { job_id, stdout, stderr })
    }

    /// Submit script text that only exists in memory
    ///
    /// The text is staged in a temporary file which lives until the submission command returns;
    /// sbatch copies the script at submission time.
    pub fn submit_text(&self, text: &str) -> Result<SubmissionResult, SubmissionError> {
        let mut staged = NamedTempFile::new().map_err(SubmissionError::Stage)?;
        staged.write_all(text.as_bytes()).map_err(SubmissionError::Stage)?;
        staged.flush().map_err(SubmissionError::Stage)?;
        self.submit(staged.path())
    }
}

impl Default for Submitter {
    fn default() -> Self {
        Submitter::new(SBATCH)
    }
}
