use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::options::Options;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("can't read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid context: {0}")]
    InvalidContext(String),
}

/// Read a TOML file into a flat options mapping
pub fn read_options(path: &Path) -> Result<Options, ConfigError> {
    info!("Reading configuration at {}", path.display());
    let text = fs::read_to_string(path).map_err(|source| {
        warn!("Can't read configuration at path {}: {}", path.display(), source);
        ConfigError::Read { path: path.to_path_buf(), source }
    })?;
    parse_options(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Key toml uses to smuggle dates and times through serde
const TOML_DATETIME_KEY: &str = "$__toml_private_datetime";

/// Parse TOML text into an options mapping
///
/// Unquoted dates and times (`walltime = 01:00:00`) become their literal text.
pub fn parse_options(text: &str) -> Result<Options, toml::de::Error> {
    let options = toml::from_str::<Options>(text)?;
    Ok(options
        .into_iter()
        .map(|(key, value)| (key, datetime_to_string(value)))
        .collect())
}

fn datetime_to_string(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if let (1, Some(Value::String(text))) = (map.len(), map.get(TOML_DATETIME_KEY)) {
                return Value::String(text.clone());
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, datetime_to_string(value)))
                    .collect(),
            )
        }
        Value::Array(values) => Value::Array(values.into_iter().map(datetime_to_string).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_read_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.toml");
        fs::write(
            &path,
            "walltime = \"04:00:00\"\nnum_cpus = 8\nconstraint = \"skylake\"\n",
        )
        .unwrap();

        let options = read_options(&path).unwrap();
        assert_eq!(options["walltime"], json!("04:00:00"));
        assert_eq!(options["num_cpus"], json!(8));
        assert_eq!(options["constraint"], json!("skylake"));
    }

    #[test]
    fn test_unquoted_times_are_text() {
        let options = parse_options(
            "walltime = 01:00:00\n\
             [context]\n\
             deadline = 2024-05-01\n\
             times = [12:30:00]\n",
        )
        .unwrap();
        assert_eq!(options["walltime"], json!("01:00:00"));
        assert_eq!(options["context"]["deadline"], json!("2024-05-01"));
        assert_eq!(options["context"]["times"], json!(["12:30:00"]));
    }

    #[test]
    fn test_unquoted_walltime_renders() {
        use crate::options::normalize::Normalizer;
        use crate::slurm::catalog::TemplateCatalog;
        use crate::slurm::compose::Composer;
        use crate::slurm::fragment::Fragment;

        let options = parse_options("walltime = 01:00:00\nnum_cpus = 2\n").unwrap();
        let run = Normalizer::run().normalize(&options);
        let catalog = TemplateCatalog::builtin();
        let composer = Composer::new(&catalog).unwrap();
        let header = composer.render_fragment(Fragment::RunHeader, &run).unwrap();
        assert!(header.starts_with("#SBATCH --time=01:00:00\n"));
    }

    #[test]
    fn test_missing_config_file() {
        let temp = TempDir::new().unwrap();
        let err = read_options(&temp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_invalid_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        fs::write(&path, "walltime = ").unwrap();
        assert!(matches!(read_options(&path), Err(ConfigError::Parse { .. })));
    }
}
