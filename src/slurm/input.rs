use std::path::{Path, PathBuf};
use std::{fs, io};

use thiserror::Error;

/// What a job runs. Exactly one input is chosen per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A single command line, wrapped in `srun`
    Command(String),
    /// A script file, either embedded verbatim or run by path
    Script { path: PathBuf, embed: bool },
    /// Every file in a directory, each becoming its own job script
    Batch { dir: PathBuf, embed: bool },
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error(
    "choose exactly one input: command, script, or batch (selected: {})",
    display_selected(.selected)
)]
pub struct AmbiguousInputError {
    pub selected: Vec<&'static str>,
}

fn display_selected(selected: &[&str]) -> String {
    if selected.is_empty() {
        "none".to_string()
    } else {
        selected.join(", ")
    }
}

impl Input {
    /// Fold the three optional input flags into one input
    pub fn select(
        command: Option<String>,
        script: Option<PathBuf>,
        batch: Option<PathBuf>,
        embed: bool,
    ) -> Result<Input, AmbiguousInputError> {
        match (command, script, batch) {
            (Some(command), None, None) => Ok(Input::Command(command)),
            (None, Some(path), None) => Ok(Input::Script { path, embed }),
            (None, None, Some(dir)) => Ok(Input::Batch { dir, embed }),
            (command, script, batch) => {
                let selected = [
                    ("command", command.is_some()),
                    ("script", script.is_some()),
                    ("batch", batch.is_some()),
                ]
                .into_iter()
                .filter(|(_, chosen)| *chosen)
                .map(|(name, _)| name)
                .collect();
                Err(AmbiguousInputError { selected })
            }
        }
    }
}

/// Regular files in `dir`, sorted by file name
pub fn get_script_paths(dir: &Path) -> Result<Vec<PathBuf>, io::Error> {
    let mut paths = fs::read_dir(dir)?
        .map(|res| res.map(|e| e.path()))
        .collect::<Result<Vec<PathBuf>, io::Error>>()?;
    paths.retain(|path| path.is_file());
    paths.sort();
    Ok(paths)
}
