//! Read job submission options and normalise them into template bindings

use clap::Args;
use serde::Serialize;
use serde_json::{Map, Value};

/// Rename, default, and synthesise option keys into run header bindings
pub mod normalize;

/// Split a context document into setup, teardown, and general bindings
pub mod context;

/// Read TOML configuration files into an options mapping
pub mod config;

/// A flat mapping of option names to values, as supplied by config files and CLI flags
pub type Options = Map<String, Value>;

/// Resource options exposed on the command line
///
/// Field names are the external option names (the same keys a `--config` file uses), not the
/// template binding names. Unset flags are skipped during serialisation so they never override a
/// config file value.
#[derive(Args, Serialize, Debug, Default, Clone)]
pub struct ResourceRequest {
    /// Walltime limit, e.g. 01:00:00
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub walltime: Option<String>,

    /// Number of nodes [default: 1]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u32>,

    /// Number of tasks [default: 1]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ntasks: Option<u32>,

    /// CPUs per task
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_cpus: Option<u32>,

    /// GPUs requested as a generic resource
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_gpus: Option<u32>,

    /// Memory per node, e.g. 16G
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    /// Memory per CPU, e.g. 2G
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_per_cpu: Option<String>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodelist: Option<String>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,

    /// Working directory of the job on the execution host
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chdir: Option<String>,
}

impl ResourceRequest {
    /// Only the flags that were actually given, keyed by their external option name
    pub fn to_options(&self) -> Options {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Options::new(),
        }
    }
}

/// Overlay `overrides` on top of `base`, ignoring null override values
pub fn merge_overrides(mut base: Options, overrides: Options) -> Options {
    for (key, value) in overrides {
        if !value.is_null() {
            base.insert(key, value);
        }
    }
    base
}

/// String form of an option value without JSON quoting
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
