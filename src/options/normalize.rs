use log::debug;
use serde_json::{json, Value};

use crate::options::{value_to_string, Options};

/// A generic resource request synthesised from a count option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRule {
    /// Option key holding the requested count
    pub option: &'static str,
    /// Scheduler resource tag, rendered as `tag:count`
    pub tag: &'static str,
}

/// Generic resource rules, applied in order
pub const GENERIC_RESOURCE_RULES: &[ResourceRule] = &[ResourceRule {
    option: "num_gpus",
    tag: "gpu",
}];

/// Separator between `tag:count` tokens in the composite generic resource string
pub const GENERIC_RESOURCE_SEPARATOR: &str = ",";

/// Key the composite generic resource string is assigned to
pub const GENERIC_RESOURCES_KEY: &str = "generic_resources";

/// Options that the templates expect in string form
pub const STRING_KEYS: &[&str] = &["num_cpus", "num_gpus"];

/// External option name -> template binding name, applied in order
pub const RENAME_KEYS: &[(&str, &str)] = &[
    ("num_cpus", "cpus_per_task"),
    ("memory", "node_mem"),
    ("email", "mail_user"),
    (GENERIC_RESOURCES_KEY, "gres"),
];

/// Defaults for run options that were neither configured nor given on the command line
pub fn run_defaults() -> Options {
    let defaults = json!({
        "nodes": 1,
        "ntasks": 1,
    });
    match defaults {
        Value::Object(map) => map,
        _ => Options::new(),
    }
}

/// Insert every default whose key is not already present. Supplied values are never replaced.
pub fn apply_defaults(options: &Options, defaults: &Options) -> Options {
    let mut applied = options.clone();
    for (key, value) in defaults {
        if !applied.contains_key(key) {
            applied.insert(key.clone(), value.clone());
        }
    }
    applied
}

/// Pop each rule's option and join the resulting `tag:count` tokens into [`GENERIC_RESOURCES_KEY`]
///
/// The composite key is always present afterwards: with no resource requested it is the empty
/// string, so the template field is bound even when nothing was asked for.
pub fn synthesize_generic_resources(mut options: Options, rules: &[ResourceRule]) -> Options {
    let mut tokens: Vec<String> = Vec::new();
    for rule in rules {
        if let Some(count) = options.remove(rule.option) {
            tokens.push(format!("{}:{}", rule.tag, value_to_string(&count)));
        }
    }
    let joined = tokens.join(GENERIC_RESOURCE_SEPARATOR);
    debug!("Generic resources: '{joined}'");
    options.insert(GENERIC_RESOURCES_KEY.to_string(), Value::String(joined));
    options
}

/// Replace the value of each listed key with its string representation
pub fn stringify_typed(mut options: Options, keys: &[&str]) -> Options {
    for key in keys {
        if let Some(value) = options.get_mut(*key) {
            if !value.is_string() {
                *value = Value::String(value_to_string(value));
            }
        }
    }
    options
}

/// Move each external key's value to its template name
pub fn rename_keys(mut options: Options, table: &[(&str, &str)]) -> Options {
    for (external, template) in table {
        if let Some(value) = options.remove(*external) {
            options.insert(template.to_string(), value);
        }
    }
    options
}

/// The options normaliser, driven entirely by its tables
///
/// Steps run in a fixed order: defaults, generic resource synthesis (which consumes raw counts),
/// stringification, and finally renaming, so no step loses a key a previous step still needed.
#[derive(Debug, Clone)]
pub struct Normalizer {
    pub defaults: Options,
    pub resource_rules: &'static [ResourceRule],
    pub string_keys: &'static [&'static str],
    pub renames: &'static [(&'static str, &'static str)],
}

impl Normalizer {
    /// Normaliser producing run header bindings
    pub fn run() -> Self {
        Normalizer {
            defaults: run_defaults(),
            resource_rules: GENERIC_RESOURCE_RULES,
            string_keys: STRING_KEYS,
            renames: RENAME_KEYS,
        }
    }

    pub fn normalize(&self, options: &Options) -> Options {
        let options = apply_defaults(options, &self.defaults);
        let options = synthesize_generic_resources(options, self.resource_rules);
        let options = stringify_typed(options, self.string_keys);
        rename_keys(options, self.renames)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer::run()
    }
}
