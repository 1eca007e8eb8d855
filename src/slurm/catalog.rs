use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use log::info;

use crate::slurm::fragment::Fragment;

/// included job header template
static JOB_HEADER: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/data/templates/job_header.txt"
));
/// included run header template
static RUN_HEADER: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/data/templates/run_header.txt"
));
/// included setup template
static SETUP: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/setup.txt"));
/// included commands (payload) template
static COMMANDS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/data/templates/commands.txt"
));
/// included teardown template
static TEARDOWN: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/data/templates/teardown.txt"
));

/// Template text for every fragment
///
/// Built once at startup and never changed afterwards. A
/// [`Composer`](crate::slurm::compose::Composer) borrows the catalog for as long as it renders.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    sources: HashMap<Fragment, String>,
}

impl TemplateCatalog {
    /// The templates compiled into the binary
    pub fn builtin() -> Self {
        let sources = Fragment::ALL
            .iter()
            .map(|fragment| (*fragment, builtin_source(*fragment).to_string()))
            .collect();
        TemplateCatalog { sources }
    }

    /// Built-in templates, overlaid with any `<fragment>.txt` files found in `dir`
    pub fn from_dir(dir: &Path) -> io::Result<Self> {
        let mut catalog = TemplateCatalog::builtin();
        for fragment in Fragment::ALL {
            let path = dir.join(fragment.file_name());
            if path.is_file() {
                info!("Loading {} template from {}", fragment, path.display());
                catalog.sources.insert(fragment, fs::read_to_string(&path)?);
            }
        }
        Ok(catalog)
    }

    pub fn source(&self, fragment: Fragment) -> &str {
        self.sources
            .get(&fragment)
            .map(String::as_str)
            .unwrap_or_else(|| builtin_source(fragment))
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        TemplateCatalog::builtin()
    }
}

fn builtin_source(fragment: Fragment) -> &'static str {
    match fragment {
        Fragment::JobHeader => JOB_HEADER,
        Fragment::RunHeader => RUN_HEADER,
        Fragment::Setup => SETUP,
        Fragment::Payload => COMMANDS,
        Fragment::Teardown => TEARDOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_has_every_fragment() {
        let catalog = TemplateCatalog::builtin();
        assert!(catalog.source(Fragment::JobHeader).contains("--job-name={job_name}"));
        assert!(catalog.source(Fragment::RunHeader).contains("--time={walltime}"));
        assert!(catalog.source(Fragment::Payload).contains("srun {command}"));
    }

    #[test]
    fn test_directory_overlays_builtin() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("teardown.txt"), "echo done\n").unwrap();

        let catalog = TemplateCatalog::from_dir(temp.path()).unwrap();
        assert_eq!(catalog.source(Fragment::Teardown), "echo done\n");
        assert_eq!(catalog.source(Fragment::Setup), SETUP);
    }
}
