use serde_json::{json, Value};

use crate::options::config::ConfigError;
use crate::options::Options;

/// Bindings shared by the setup, payload, and teardown fragments
///
/// A context document looks like:
///
/// ```toml
/// [context]
/// epilog = "/home/me/cleanup.sh"
///
/// [context.setup]
/// modules = ["gcc/12", "cuda/12.2"]
///
/// [context.setup.env_vars]
/// OMP_NUM_THREADS = "4"
///
/// [context.teardown]
/// archive = true
/// ```
///
/// Everything directly under `[context]` is general and visible to setup and teardown. The
/// section tables override general values with the same name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBindings {
    pub general: Options,
    pub setup: Options,
    pub teardown: Options,
}

impl ContextBindings {
    /// Split a parsed context document. A document with no `[context]` table is empty.
    pub fn from_document(mut document: Options) -> Result<Self, ConfigError> {
        let mut general = match document.remove("context") {
            None => Options::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(ConfigError::InvalidContext(
                    "`context` must be a table".to_string(),
                ))
            }
        };

        let mut setup = take_table(&mut general, "setup")?;
        if let Some(env_vars) = setup.remove("env_vars") {
            setup.insert("env_vars".to_string(), env_var_list(env_vars)?);
        }
        let teardown = take_table(&mut general, "teardown")?;

        Ok(ContextBindings { general, setup, teardown })
    }

    pub fn set_epilog(&mut self, epilog: String) {
        self.general.insert("epilog".to_string(), Value::String(epilog));
    }

    pub fn setup_bindings(&self, task_script: Option<&str>) -> Options {
        overlay(&self.general, &self.setup, task_script)
    }

    pub fn teardown_bindings(&self, task_script: Option<&str>) -> Options {
        overlay(&self.general, &self.teardown, task_script)
    }

    /// Bindings for the commands fragment: the command list plus the general epilog, if any
    pub fn payload_bindings(&self, commands: &[String]) -> Options {
        let mut bindings = Options::new();
        bindings.insert("commands".to_string(), json!(commands));
        if let Some(epilog) = self.general.get("epilog") {
            bindings.insert("epilog".to_string(), epilog.clone());
        }
        bindings
    }
}

fn take_table(general: &mut Options, key: &str) -> Result<Options, ConfigError> {
    match general.remove(key) {
        None => Ok(Options::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(ConfigError::InvalidContext(format!("`context.{key}` must be a table"))),
    }
}

/// Environment variables become an ordered list of `{name, value}` pairs the template can iterate
fn env_var_list(env_vars: Value) -> Result<Value, ConfigError> {
    match env_vars {
        Value::Object(map) => Ok(Value::Array(
            map.into_iter()
                .map(|(name, value)| json!({ "name": name, "value": value }))
                .collect(),
        )),
        list @ Value::Array(_) => Ok(list),
        _ => Err(ConfigError::InvalidContext("`env_vars` must be a table".to_string())),
    }
}

fn overlay(general: &Options, section: &Options, task_script: Option<&str>) -> Options {
    let mut bindings = general.clone();
    for (key, value) in section {
        bindings.insert(key.clone(), value.clone());
    }
    if let Some(path) = task_script {
        bindings.insert("task_script".to_string(), Value::String(path.to_string()));
    }
    bindings
}
