use std::fmt;

use serde_json::{Map, Value};

/// Named values supplied to a fragment when it's rendered
pub type Bindings = Map<String, Value>;

/// One independently rendered section of a submission script
///
/// The scheduler only reads `#SBATCH` directives before the first executable line, so the
/// declaration order here is also the order fragments appear in a script.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fragment {
    JobHeader,
    RunHeader,
    Setup,
    Payload,
    Teardown,
}

const JOB_HEADER_BINDINGS: &[(&str, bool)] = &[
    ("job_name", false),
    ("stderr_log_dir", false),
    ("stdout_log_dir", false),
    ("login_shell", true),
    ("mail_user", true),
    ("mail_type", true),
];

const RUN_HEADER_BINDINGS: &[(&str, bool)] = &[
    ("walltime", false),
    ("nodes", false),
    ("ntasks", false),
    ("cpus_per_task", false),
    ("mem_per_cpu", true),
    ("node_mem", true),
    ("nodelist", true),
    ("constraint", true),
    ("gres", true),
    ("chdir", true),
];

const SETUP_BINDINGS: &[(&str, bool)] =
    &[("task_script", true), ("env_vars", true), ("modules", true)];

const PAYLOAD_BINDINGS: &[(&str, bool)] = &[("commands", false), ("epilog", true)];

const TEARDOWN_BINDINGS: &[(&str, bool)] = &[("task_script", true)];

impl Fragment {
    pub const ALL: [Fragment; 5] = [
        Fragment::JobHeader,
        Fragment::RunHeader,
        Fragment::Setup,
        Fragment::Payload,
        Fragment::Teardown,
    ];

    /// Ordered `(binding name, is optional)` table
    pub fn bindings(&self) -> &'static [(&'static str, bool)] {
        match self {
            Fragment::JobHeader => JOB_HEADER_BINDINGS,
            Fragment::RunHeader => RUN_HEADER_BINDINGS,
            Fragment::Setup => SETUP_BINDINGS,
            Fragment::Payload => PAYLOAD_BINDINGS,
            Fragment::Teardown => TEARDOWN_BINDINGS,
        }
    }

    /// Name the template is registered under
    pub fn template_name(&self) -> &'static str {
        match self {
            Fragment::JobHeader => "job_header",
            Fragment::RunHeader => "run_header",
            Fragment::Setup => "setup",
            Fragment::Payload => "commands",
            Fragment::Teardown => "teardown",
        }
    }

    /// File name of the template inside a template directory
    pub fn file_name(&self) -> String {
        format!("{}.txt", self.template_name())
    }

    /// Required bindings not present in `bindings`, in table order
    pub fn missing_bindings(&self, bindings: &Bindings) -> Vec<&'static str> {
        self.bindings()
            .iter()
            .filter(|(name, optional)| !optional && !bindings.contains_key(*name))
            .map(|(name, _)| *name)
            .collect()
    }

    /// A rendering context: the supplied bindings plus `null` for every declared binding that's
    /// absent, so optional sections in the template see it as unset
    pub fn context(&self, bindings: &Bindings) -> Value {
        let mut context = bindings.clone();
        for (name, _) in self.bindings() {
            context.entry(name.to_string()).or_insert(Value::Null);
        }
        Value::Object(context)
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Fragment::JobHeader => write!(f, "job_header"),
            Fragment::RunHeader => write!(f, "run_header"),
            Fragment::Setup => write!(f, "setup"),
            Fragment::Payload => write!(f, "payload"),
            Fragment::Teardown => write!(f, "teardown"),
        }
    }
}
