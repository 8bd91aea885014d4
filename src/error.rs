use camino::Utf8PathBuf;
use thiserror::Error;

fn join(paths: &[Utf8PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Error)]
pub enum WeaveError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Error while generating the build graph.\n{0}")]
    Generate(#[from] GenerateError),

    #[error("Couldn't write {0}.\n{1}")]
    Write(Utf8PathBuf, std::io::Error),

    #[error("Couldn't enter the project root {0}.\n{1}")]
    Root(Utf8PathBuf, std::io::Error),

    #[error("Couldn't run ninja.\n{0}")]
    Ninja(std::io::Error),

    #[cfg(feature = "watch")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] notify::Error),
}

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Invalid wildcard name '{1}' in pattern '{0}'")]
    InvalidName(String, String),

    #[error("Empty character class in pattern '{0}'")]
    EmptyClass(String),

    #[error("Couldn't compile pattern '{0}'.\n{1}")]
    Regex(String, Box<fancy_regex::Error>),

    #[error("Couldn't match '{1}' against pattern '{0}'.\n{2}")]
    Match(String, String, Box<fancy_regex::Error>),

    #[error("Got {1} candidate sets for {0} patterns")]
    Candidates(usize, usize),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unknown variable '{1}' in '{0}'")]
    Missing(String, String),

    #[error("Invalid placeholder at position {1} in '{0}'")]
    Invalid(String, usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}:\n{1}")]
    File(Utf8PathBuf, Box<ConfigError>),

    #[error("Couldn't read the configuration.\n{0}")]
    Read(std::io::Error),

    #[error("Couldn't parse the configuration.\n{0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Unknown import '{0}'")]
    UnknownImport(String),

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Invalid {0} name '{1}'")]
    InvalidName(&'static str, String),

    #[error("Variable '{0}' must be a string")]
    VariableType(String),

    #[error("Invalid loop: {0}")]
    Loop(String),

    #[error("Command '{0}' needs at least one input pattern")]
    NoInputs(String),

    #[error("Command '{}' accepts at most one output pattern, got: {}", .0, .1.join(" "))]
    TooManyOutputs(String, Vec<String>),

    #[error("Invalid argument for command '{0}'.\n{1}")]
    Arg(String, anyhow::Error),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

impl ConfigError {
    pub(crate) fn in_file(self, path: impl Into<Utf8PathBuf>) -> Self {
        ConfigError::File(path.into(), Box::new(self))
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Task {0}:\n{1}")]
    Task(String, anyhow::Error),

    #[error("No files match the inputs of task {0}")]
    NoMatch(String),

    #[error(
        "A build statement partially overlaps with earlier build statements.\n  new: {}\n  existing: {}",
        join(.new),
        join(.existing)
    )]
    Ambiguous {
        new: Vec<Utf8PathBuf>,
        existing: Vec<Utf8PathBuf>,
    },

    #[error("Rule '{0}' is defined twice with different parameters")]
    RuleConflict(String),

    #[error("Pool '{0}' is defined twice with different parameters")]
    PoolConflict(String),

    #[error("Build statement for '{1}' uses unknown rule '{0}'")]
    UnknownRule(String, Utf8PathBuf),

    #[error("Task {0} orders after barrier '{1}', which is not declared before it")]
    UnknownBarrier(String, String),

    #[error("Dependency cycle involving '{0}'")]
    Cycle(Utf8PathBuf),
}
