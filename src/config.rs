//! Loading of `paperweave.yaml` files.
//!
//! A configuration file declares the command sets it imports, a few
//! variables, and a list of tasks. A task entry is one of three kinds,
//! recognized by its keys: `subdir` recurses into another directory,
//! `barrier` declares a barrier, and anything else is a build task.
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::command::{Command, Registry};
use crate::error::ConfigError;
use crate::graph::Step;
use crate::paths::normalize_path;
use crate::pattern::Pattern;
use crate::task::Task;
use crate::template::{Variables, is_identifier, rewrite_path, substitute};

/// Name of the configuration file in every directory.
pub const CONFIG_FILE: &str = "paperweave.yaml";

/// Environment variables with this prefix define configuration variables.
pub const ENV_PREFIX: &str = "PAPERWEAVE_VARIABLE_";

/// Directory for files the tool keeps next to each configuration file.
pub const CACHE_DIR: &str = ".paperweave";

/// Whitespace-separated words, or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Words {
    Text(String),
    List(Vec<String>),
}

impl Words {
    fn into_vec(self) -> Vec<String> {
        match self {
            Words::Text(text) => text.split_whitespace().map(String::from).collect(),
            Words::List(list) => list,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    variables: serde_yaml::Mapping,
    #[serde(default)]
    tasks: Vec<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildEntry {
    command: String,
    inp: Words,
    #[serde(default)]
    out: Option<Words>,
    #[serde(default)]
    arg: Option<serde_yaml::Value>,
    #[serde(default, rename = "override")]
    overrides: BTreeMap<String, String>,
    #[serde(default, rename = "loop")]
    loops: Vec<LoopEntry>,
    #[serde(default)]
    phony: Option<Words>,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    built_inputs_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SubDirEntry {
    subdir: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BarrierEntry {
    barrier: String,
}

/// One table of a loop: every row assigns a value to each key.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoopEntry {
    key: Words,
    val: LoopValues,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LoopValues {
    /// Every word is a row of its own.
    Flat(String),
    Rows(Vec<Words>),
}

impl LoopEntry {
    fn rows(self) -> Result<(Vec<String>, Vec<Vec<String>>), ConfigError> {
        let keys = self.key.into_vec();
        if let Some(key) = keys.iter().find(|key| !is_identifier(key)) {
            return Err(ConfigError::InvalidName("loop variable", key.clone()));
        }

        let rows: Vec<Vec<String>> = match self.val {
            LoopValues::Flat(text) => text.split_whitespace().map(|w| vec![w.to_string()]).collect(),
            LoopValues::Rows(rows) => rows.into_iter().map(Words::into_vec).collect(),
        };

        if let Some(row) = rows.iter().find(|row| row.len() != keys.len()) {
            return Err(ConfigError::Loop(format!(
                "row '{}' does not match keys '{}'",
                row.join(" "),
                keys.join(" ")
            )));
        }

        Ok((keys, rows))
    }
}

/// Cartesian product of all loop tables, the first table varies slowest.
fn iterate_loops(loops: Vec<LoopEntry>) -> Result<Vec<Variables>, ConfigError> {
    let mut combos = vec![Variables::new()];
    for entry in loops {
        let (keys, rows) = entry.rows()?;
        combos = combos
            .iter()
            .flat_map(|combo| {
                rows.iter().map(|row| {
                    let mut combo = combo.clone();
                    combo.extend(keys.iter().cloned().zip(row.iter().cloned()));
                    combo
                })
            })
            .collect();
    }
    Ok(combos)
}

/// The variables a configuration directory ended up with, kept on disk so
/// that scripts run by the build can read them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariablesCache {
    pub path: Utf8PathBuf,
    pub content: String,
}

/// Everything declared by a tree of configuration files.
#[derive(Debug, Default)]
pub struct Loaded {
    pub steps: Vec<Step>,
    pub caches: Vec<VariablesCache>,
}

type Commands = BTreeMap<String, Arc<dyn Command>>;

struct Loader<'a> {
    registry: &'a Registry,
    root: Utf8PathBuf,
    env: Variables,
    loaded: Loaded,
}

/// Load the configuration tree starting at the `paperweave.yaml` in the
/// current directory. `root` is the absolute path of that directory.
pub fn load(root: &Utf8Path, registry: &Registry) -> Result<Loaded, ConfigError> {
    let env = std::env::vars()
        .filter_map(|(key, value)| Some((key.strip_prefix(ENV_PREFIX)?.to_string(), value)))
        .collect();

    let mut loader = Loader {
        registry,
        root: root.to_path_buf(),
        env,
        loaded: Loaded::default(),
    };
    loader.load_dir(Utf8PathBuf::from("."), &Variables::new(), &Commands::new())?;
    Ok(loader.loaded)
}

impl Loader<'_> {
    fn load_dir(&mut self, here: Utf8PathBuf, inherited: &Variables, commands: &Commands) -> Result<(), ConfigError> {
        let path = normalize_path(here.join(CONFIG_FILE));
        tracing::info!("Loading {path}");

        self.load_file(&path, here, inherited, commands)
            .map_err(|e| match e {
                ConfigError::File(..) => e,
                e => e.in_file(&path),
            })
    }

    fn load_file(
        &mut self,
        path: &Utf8Path,
        here: Utf8PathBuf,
        inherited: &Variables,
        commands: &Commands,
    ) -> Result<(), ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::Read)?;
        let config: ConfigFile = if text.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(&text)?
        };

        let variables = self.variables(&here, &config.variables, inherited)?;
        self.loaded.caches.push(VariablesCache {
            path: normalize_path(here.join(CACHE_DIR).join("variables.json")),
            content: serde_json::to_string_pretty(&variables)
                .map_err(|e| ConfigError::Read(e.into()))?,
        });

        let mut commands = commands.clone();
        for name in &config.imports {
            let set = self
                .registry
                .get(name)
                .ok_or_else(|| ConfigError::UnknownImport(name.clone()))?;
            for command in set {
                commands.insert(command.name().to_string(), command.clone());
            }
        }

        for value in config.tasks {
            if value.get("subdir").is_some() {
                let entry: SubDirEntry = serde_yaml::from_value(value)?;
                let dir = rewrite_path(&entry.subdir, &variables)?;
                self.load_dir(Utf8PathBuf::from(dir), &variables, &commands)?;
            } else if value.get("barrier").is_some() {
                let entry: BarrierEntry = serde_yaml::from_value(value)?;
                if !is_identifier(&entry.barrier) {
                    return Err(ConfigError::InvalidName("barrier", entry.barrier));
                }
                self.loaded.steps.push(Step::Barrier(entry.barrier));
            } else {
                let entry: BuildEntry = serde_yaml::from_value(value)?;
                self.build_tasks(entry, &variables, &commands)?;
            }
        }

        Ok(())
    }

    /// Variables of one directory. The first definition of a name wins:
    /// `here` and `root`, then the environment, then the file, then whatever
    /// the parent directory had.
    fn variables(
        &self,
        here: &Utf8Path,
        declared: &serde_yaml::Mapping,
        inherited: &Variables,
    ) -> Result<Variables, ConfigError> {
        let mut vars = Variables::from([
            ("here".to_string(), here.to_string()),
            ("root".to_string(), self.root.to_string()),
        ]);

        for (name, value) in &self.env {
            if !is_identifier(name) {
                tracing::warn!("Ignoring environment variable {ENV_PREFIX}{name}, not an identifier");
                continue;
            }
            if !vars.contains_key(name) {
                let value = substitute(value, &(&vars, inherited))?;
                vars.insert(name.clone(), value);
            }
        }

        for (name, value) in declared {
            let Some(name) = name.as_str() else {
                return Err(ConfigError::InvalidName("variable", format!("{name:?}")));
            };
            if !is_identifier(name) {
                return Err(ConfigError::InvalidName("variable", name.into()));
            }
            let Some(value) = value.as_str() else {
                return Err(ConfigError::VariableType(name.into()));
            };
            if !vars.contains_key(name) {
                let value = substitute(value, &(&vars, inherited))?;
                vars.insert(name.into(), value);
            }
        }

        for (name, value) in inherited {
            vars.entry(name.clone()).or_insert_with(|| value.clone());
        }

        Ok(vars)
    }

    fn build_tasks(&mut self, entry: BuildEntry, variables: &Variables, commands: &Commands) -> Result<(), ConfigError> {
        let (name, default) = match entry.command.strip_prefix('_') {
            Some(name) => (name, false),
            None => (entry.command.as_str(), true),
        };
        if !is_identifier(name) {
            return Err(ConfigError::InvalidName("command", entry.command.clone()));
        }
        let command = commands
            .get(name)
            .ok_or_else(|| ConfigError::UnknownCommand(name.into()))?;

        let mut constants = variables.clone();
        for (key, value) in &entry.overrides {
            if !is_identifier(key) {
                return Err(ConfigError::InvalidName("variable", key.clone()));
            }
            constants.insert(key.clone(), substitute(value, variables)?);
        }

        let barriers = entry.phony.map(Words::into_vec).unwrap_or_default();
        let inp = entry.inp.into_vec();
        let out = entry.out.map(Words::into_vec).unwrap_or_default();
        if out.len() > 1 {
            return Err(ConfigError::TooManyOutputs(name.into(), out));
        }

        for loop_vars in iterate_loops(entry.loops)? {
            let lookup = (&loop_vars, &constants);
            let inputs = inp
                .iter()
                .map(|path| Ok(Pattern::new(&rewrite_path(path, &lookup)?)?))
                .collect::<Result<Vec<_>, ConfigError>>()?;

            let mut task = Task::new(command.clone(), inputs, entry.arg.as_ref())?
                .default(default)
                .optional(entry.optional)
                .built_inputs_only(entry.built_inputs_only)
                .after(barriers.iter().cloned())
                .constants(constants.clone())?;
            if let Some(path) = out.first() {
                task = task.output(rewrite_path(path, &lookup)?);
            }

            tracing::debug!("Declared task {}", task.describe());
            self.loaded.steps.push(Step::Build(task));
        }

        Ok(())
    }
}
