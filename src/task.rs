//! Tasks: one declaration in a configuration file, expanded into build records
//! for every consistent binding of its named wildcards.
use std::collections::BTreeSet;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::command::{Arg, Command};
use crate::error::{ConfigError, GenerateError, PatternError, TemplateError};
use crate::graph::GraphState;
use crate::paths::{normalize_path, parent_dir, relative_to};
use crate::pattern::{Binding, Pattern, correlate};
use crate::record::{BuildRecord, ERROR_MISSING, MKDIR_SUFFIX, PHONY, Record};
use crate::template::{Variables, substitute, substitute_safe, wildcard_vars};

/// Variable holding whitespace-separated patterns of inputs that may be
/// missing without breaking generation.
pub const IGNORE_MISSING: &str = "ignore_missing";

/// A declared unit of work.
#[derive(Clone)]
pub struct Task {
    command: Arc<dyn Command>,
    inputs: Vec<Pattern>,
    output: Option<String>,
    arg: Arg,
    arg_text: Option<String>,
    default: bool,
    optional: bool,
    built_inputs_only: bool,
    after: Vec<String>,
    constants: Variables,
    ignore_missing: Vec<Pattern>,
}

/// Something a task contributes to the build file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Emitted {
    Comment(String),
    Build { record: BuildRecord, default: bool },
}

#[derive(Debug, Default)]
pub(crate) struct TaskOutput {
    pub(crate) emitted: Vec<Emitted>,
    pub(crate) gendeps: BTreeSet<Utf8PathBuf>,
}

impl Task {
    /// A task without output pattern or constants, built by default. The
    /// argument is decoded for the command right away, an absent one from
    /// `null`.
    pub fn new(
        command: Arc<dyn Command>,
        inputs: Vec<Pattern>,
        arg: Option<&serde_yaml::Value>,
    ) -> Result<Self, ConfigError> {
        if inputs.is_empty() {
            return Err(ConfigError::NoInputs(command.name().into()));
        }

        let fail = |e: anyhow::Error| ConfigError::Arg(command.name().into(), e);
        let arg_text = match arg {
            None | Some(serde_yaml::Value::Null) => None,
            Some(value) => Some(serde_json::to_string(value).map_err(|e| fail(e.into()))?),
        };
        let arg = command.decode_arg(arg).map_err(fail)?;

        Ok(Self {
            command,
            inputs,
            output: None,
            arg,
            arg_text,
            default: true,
            optional: false,
            built_inputs_only: false,
            after: Vec::new(),
            constants: Variables::new(),
            ignore_missing: Vec::new(),
        })
    }

    /// Output template. Named wildcards are filled in from each binding.
    pub fn output(mut self, template: impl Into<String>) -> Self {
        self.output = Some(template.into());
        self
    }

    pub fn default(mut self, default: bool) -> Self {
        self.default = default;
        self
    }

    /// Without any match, emit a comment instead of failing.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Only match outputs of earlier tasks, never files on disk.
    pub fn built_inputs_only(mut self, built_inputs_only: bool) -> Self {
        self.built_inputs_only = built_inputs_only;
        self
    }

    /// Barriers that every record of this task must wait for.
    pub fn after<I, S>(mut self, barriers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.extend(barriers.into_iter().map(Into::into));
        self
    }

    /// Configuration variables. They expand `${...}` in records and override
    /// record variables with the same name.
    pub fn constants(mut self, constants: Variables) -> Result<Self, ConfigError> {
        self.ignore_missing = match constants.get(IGNORE_MISSING) {
            Some(patterns) => patterns
                .split_whitespace()
                .map(Pattern::new)
                .collect::<Result<_, _>>()?,
            None => Vec::new(),
        };
        self.constants = constants;
        Ok(self)
    }

    pub fn command(&self) -> &Arc<dyn Command> {
        &self.command
    }

    pub fn barriers(&self) -> &[String] {
        &self.after
    }

    /// Short description for logs and error messages.
    pub fn describe(&self) -> String {
        let mut text = format!(
            "{} (inp: {}",
            self.command.name(),
            self.inputs
                .iter()
                .map(Pattern::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        );
        if let Some(output) = &self.output {
            text.push_str(", out: ");
            text.push_str(output);
        }
        if let Some(arg) = &self.arg_text {
            text.push_str(", arg: ");
            text.push_str(arg);
        }
        text.push(')');
        text
    }

    fn describe_concrete(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf]) -> String {
        let mut text = format!("{} (inp: {}", self.command.name(), join(inp));
        if !out.is_empty() {
            text.push_str(", out: ");
            text.push_str(&join(out));
        }
        if let Some(arg) = &self.arg_text {
            text.push_str(", arg: ");
            text.push_str(arg);
        }
        text.push(')');
        text
    }

    fn fail(&self, context: String) -> impl FnOnce(anyhow::Error) -> GenerateError {
        move |e| GenerateError::Task(context, e)
    }

    /// Candidate paths for each input pattern.
    fn candidates(&self, known: &BTreeSet<String>) -> Result<Vec<BTreeSet<String>>, PatternError> {
        self.inputs
            .iter()
            .map(|pattern| {
                let mut candidates = if self.built_inputs_only {
                    BTreeSet::new()
                } else {
                    pattern.glob()?
                };
                candidates.extend(known.iter().cloned());
                Ok(candidates)
            })
            .collect()
    }

    pub(crate) fn generate(&self, state: &GraphState) -> Result<TaskOutput, GenerateError> {
        let known: BTreeSet<String> = state.outputs().iter().map(|p| p.to_string()).collect();

        let correlations = self
            .candidates(&known)
            .and_then(|candidates| correlate(&self.inputs, &candidates))
            .map_err(|e| GenerateError::Task(self.describe(), e.into()))?;

        let mut output = TaskOutput::default();

        if correlations.is_empty() {
            if self.optional {
                tracing::debug!("No matches for optional task {}", self.describe());
                output
                    .emitted
                    .push(Emitted::Comment(format!("No matches for optional task {}", self.describe())));
                return Ok(output);
            }
            return Err(GenerateError::NoMatch(self.describe()));
        }

        for correlation in correlations {
            let inp: Vec<Utf8PathBuf> = correlation.paths().map(Utf8PathBuf::from).collect();
            let out: Vec<Utf8PathBuf> = match &self.output {
                Some(template) => vec![self.bind_output(template, &correlation.binding)?],
                None => Vec::new(),
            };

            let context = self.describe_concrete(&inp, &out);
            tracing::debug!("Generating {context}");

            let generated = self
                .command
                .generate(&inp, &out, &self.arg)
                .map_err(self.fail(context.clone()))?;

            output.emitted.extend(self.comments(&inp, &out));
            for record in generated.records {
                match record {
                    Record::Comment(text) => output.emitted.push(Emitted::Comment(text)),
                    Record::Build(record) => {
                        let emitted = self
                            .post_process(record, state)
                            .map_err(self.fail(context.clone()))?;
                        output.emitted.push(emitted);
                    }
                }
            }
            output.gendeps.extend(generated.gendeps);
        }

        Ok(output)
    }

    fn bind_output(&self, template: &str, binding: &Binding) -> Result<Utf8PathBuf, GenerateError> {
        let path = substitute(template, &wildcard_vars(binding))
            .map_err(|e| GenerateError::Task(self.describe(), e.into()))?;

        let mut normal = normalize_path(&path).into_string();
        if path.ends_with('/') && !normal.ends_with('/') {
            normal.push('/');
        }
        Ok(normal.into())
    }

    fn comments(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf]) -> Vec<Emitted> {
        let mut comments = vec![
            Emitted::Comment(format!("command: {}", self.command.name())),
            Emitted::Comment(format!("inp: {}", join(inp))),
        ];
        if !out.is_empty() {
            comments.push(Emitted::Comment(format!("out: {}", join(out))));
        }
        if let Some(arg) = &self.arg_text {
            comments.push(Emitted::Comment(format!("arg: {arg}")));
        }
        comments
    }

    fn post_process(&self, mut record: BuildRecord, state: &GraphState) -> anyhow::Result<Emitted> {
        if record.outputs.is_empty() {
            anyhow::bail!("Build record for rule '{}' has no outputs", record.rule);
        }

        for (key, value) in record.variables.iter_mut() {
            if let Some(constant) = self.constants.get(key) {
                value.clone_from(constant);
            }
        }

        self.expand(&mut record)?;

        let missing = self.missing_inputs(&record, state)?;
        if !missing.is_empty() {
            tracing::debug!("Missing inputs for {}: {}", join(&record.outputs), join(&missing));
            let mut placeholder = BuildRecord::new(ERROR_MISSING)
                .outputs(record.outputs)
                .implicit_outputs(record.implicit_outputs)
                .variable("missing", join(&missing));
            placeholder.tidy();
            return Ok(Emitted::Build {
                record: placeholder,
                default: false,
            });
        }

        if record.rule != PHONY {
            inject_mkdir(&mut record);
        }
        record.tidy();
        record
            .order_only
            .extend(self.after.iter().map(Utf8PathBuf::from));

        let default = self.default && record.rule != PHONY;
        Ok(Emitted::Build { record, default })
    }

    fn expand(&self, record: &mut BuildRecord) -> Result<(), TemplateError> {
        let root = self.constants.get("root").map(Utf8Path::new);

        let expand_path = |path: &Utf8PathBuf| -> Result<Utf8PathBuf, TemplateError> {
            let path = substitute(path.as_str(), &self.constants)?;
            Ok(match root {
                Some(root) if path.starts_with('/') => relative_to(&path, root),
                _ => normalize_path(&path),
            })
        };

        for list in [
            &mut record.outputs,
            &mut record.implicit_outputs,
            &mut record.inputs,
            &mut record.implicit,
            &mut record.order_only,
        ] {
            for path in list.iter_mut() {
                *path = expand_path(path)?;
            }
        }

        if let Some(depfile) = &mut record.depfile {
            *depfile = substitute_safe(depfile, &self.constants);
        }

        for value in record.variables.values_mut() {
            let expanded = substitute_safe(value, &self.constants);
            *value = match root {
                Some(root) if Utf8Path::new(&expanded).starts_with(root) => {
                    relative_to(&expanded, root).into_string()
                }
                _ => expanded,
            };
        }

        Ok(())
    }

    fn missing_inputs(&self, record: &BuildRecord, state: &GraphState) -> Result<Vec<Utf8PathBuf>, PatternError> {
        let mut missing = Vec::new();
        if self.ignore_missing.is_empty() {
            return Ok(missing);
        }

        for path in record.inputs.iter().chain(&record.implicit) {
            if state.outputs().contains(path) || path.is_file() {
                continue;
            }
            for pattern in &self.ignore_missing {
                if pattern.is_match(path.as_str())? {
                    missing.push(path.clone());
                    break;
                }
            }
        }

        Ok(missing)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Task").field(&self.describe()).finish()
    }
}

/// Rename the rule to its `_mkdir` variant when outputs land in directories
/// that no input lives in.
fn inject_mkdir(record: &mut BuildRecord) {
    let sources: BTreeSet<String> = record
        .inputs
        .iter()
        .chain(&record.implicit)
        .map(|p| parent_dir(p.as_str()))
        .chain([".".to_string()])
        .collect();

    let targets: BTreeSet<String> = record
        .all_outputs()
        .map(|p| parent_dir(p.as_str()))
        .collect();

    let todo: Vec<&str> = targets.difference(&sources).map(String::as_str).collect();
    if !todo.is_empty() {
        record.rule.push_str(MKDIR_SUFFIX);
        record.variables.insert("dstdirs".into(), todo.join(" "));
    }
}

fn join(paths: &[Utf8PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::command::TypedCommand;
    use crate::record::{Generated, Rule};
    use crate::testing::in_temp_dir;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    /// Copies every input into the output directory.
    struct Publish;

    impl TypedCommand for Publish {
        type Arg = ();

        fn name(&self) -> &str {
            "publish"
        }

        fn rules(&self) -> BTreeMap<String, Rule> {
            BTreeMap::from([("publish".into(), Rule::new("cp ${in} ${out}"))])
        }

        fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
            let dir = out.first().cloned().unwrap_or_else(|| "public".into());
            let records = inp.iter().map(|src| {
                let name = src.file_name().unwrap_or_default();
                Record::Build(
                    BuildRecord::new("publish")
                        .input(src.clone())
                        .output(dir.join(name))
                        .variable("tool", "cp"),
                )
            });
            Ok(Generated::new(records).with_gendeps(["manifest.txt"]))
        }
    }

    fn task(inputs: &[&str]) -> Task {
        let patterns = inputs.iter().map(|s| Pattern::new(s).unwrap()).collect();
        Task::new(Arc::new(Publish), patterns, None).unwrap()
    }

    fn state(outputs: &[&str]) -> GraphState {
        let mut state = GraphState::default();
        for output in outputs {
            state.claim(&BuildRecord::new("x").output(*output)).unwrap();
        }
        state
    }

    fn builds(output: &TaskOutput) -> Vec<(&BuildRecord, bool)> {
        output
            .emitted
            .iter()
            .filter_map(|e| match e {
                Emitted::Build { record, default } => Some((record, *default)),
                Emitted::Comment(_) => None,
            })
            .collect()
    }

    #[test]
    fn expands_known_outputs() {
        let task = task(&["${*dir}/foo.txt", "${*dir}/b?r${*id}.csv"]).output("public/${*dir}${*id}/");
        let state = state(&["a/foo.txt", "a/bar1.csv", "a/bir1.csv", "b/foo.txt", "b/bar2.csv"]);
        let output = task.built_inputs_only(true).generate(&state).unwrap();

        let records = builds(&output);
        let outputs: Vec<_> = records.iter().map(|(r, _)| r.outputs[0].as_str()).collect();
        assert_eq!(
            outputs,
            [
                "public/a1/foo.txt",
                "public/a1/bar1.csv",
                "public/a1/bir1.csv",
                "public/b2/foo.txt",
                "public/b2/bar2.csv",
            ]
        );
        assert!(records.iter().all(|(r, d)| *d && r.rule == "publish_mkdir"));
        assert_eq!(records[0].0.variables["dstdirs"], "public/a1");
        assert_eq!(output.gendeps, BTreeSet::from(["manifest.txt".into()]));

        assert_eq!(
            output.emitted[..3],
            [
                Emitted::Comment("command: publish".into()),
                Emitted::Comment("inp: a/foo.txt a/bar1.csv a/bir1.csv".into()),
                Emitted::Comment("out: public/a1/".into()),
            ]
        );
    }

    #[test]
    #[serial]
    fn globs_the_filesystem() {
        in_temp_dir(&[("notes/a.md", ""), ("notes/.hidden.md", ""), ("notes/sub/b.md", "")], || {
            let output = task(&["notes/*.md"]).generate(&GraphState::default()).unwrap();
            let records = builds(&output);
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].0.inputs, ["notes/a.md"]);
            assert_eq!(records[0].0.outputs, ["public/a.md"]);
        });
    }

    #[test]
    #[serial]
    fn no_match_is_fatal_unless_optional() {
        in_temp_dir(&[], || {
            let err = task(&["nothing/*.md"]).generate(&GraphState::default()).unwrap_err();
            assert!(matches!(err, GenerateError::NoMatch(_)));

            let output = task(&["nothing/*.md"])
                .optional(true)
                .generate(&GraphState::default())
                .unwrap();
            assert!(matches!(&output.emitted[..], [Emitted::Comment(c)] if c.contains("nothing/*.md")));
        });
    }

    #[test]
    fn constants_expand_and_override() {
        let constants = Variables::from([
            ("root".into(), "/home/me/book".into()),
            ("here".into(), ".".into()),
            ("tool".into(), "rsync".into()),
        ]);
        let task = task(&["src.txt"])
            .output("/home/me/book/site/")
            .constants(constants)
            .unwrap()
            .built_inputs_only(true)
            .default(false);

        let output = task.generate(&state(&["src.txt"])).unwrap();
        let records = builds(&output);
        assert_eq!(records[0].0.outputs, ["site/src.txt"]);
        assert_eq!(records[0].0.variables["tool"], "rsync");
        assert!(!records[0].1);
    }

    #[test]
    #[serial]
    fn soft_missing_inputs() {
        in_temp_dir(&[("data/present.csv", "")], || {
            let constants = Variables::from([(IGNORE_MISSING.into(), "*.csv data/*.csv".into())]);
            let task = task(&["${*name}.csv"]).constants(constants).unwrap();

            // A known output counts as present, even though it is not on disk.
            let mut state = state(&["gone.csv"]);
            let output = task.generate(&state).unwrap();
            let records = builds(&output);
            assert_eq!(records[0].0.inputs, ["gone.csv"]);
            assert_eq!(records[0].0.rule, "publish_mkdir");

            state = GraphState::default();
            let record = BuildRecord::new("publish").input("data/absent.csv").output("public/absent.csv");
            let emitted = task.post_process(record, &state).unwrap();
            let Emitted::Build { record, default } = emitted else { panic!("expected a build") };
            assert_eq!(record.rule, ERROR_MISSING);
            assert_eq!(record.variables["missing"], "data/absent.csv");
            assert_eq!(record.outputs, ["public/absent.csv"]);
            assert!(record.inputs.is_empty());
            assert!(!default);

            let record = BuildRecord::new("publish").input("data/present.csv").output("public/present.csv");
            let Emitted::Build { record, .. } = task.post_process(record, &state).unwrap() else {
                panic!("expected a build")
            };
            assert_eq!(record.rule, "publish_mkdir");
        });
    }

    #[test]
    fn barriers_become_order_only() {
        let task = task(&["a.txt"]).after(["hold"]).built_inputs_only(true);
        let output = task.generate(&state(&["a.txt"])).unwrap();
        assert_eq!(builds(&output)[0].0.order_only, ["hold"]);
    }

    #[test]
    fn mkdir_only_for_new_directories() {
        let mut record = BuildRecord::new("copy").input("a/x.txt").output("a/y.txt");
        inject_mkdir(&mut record);
        assert_eq!(record.rule, "copy");

        let mut record = BuildRecord::new("copy")
            .input("x.txt")
            .output("out/y.txt")
            .implicit_outputs(["deep/er/z.txt", "y.log"]);
        inject_mkdir(&mut record);
        assert_eq!(record.rule, "copy_mkdir");
        assert_eq!(record.variables["dstdirs"], "deep/er out");
    }

    #[test]
    fn records_need_outputs() {
        let task = task(&["a.txt"]);
        let err = task.post_process(BuildRecord::new("publish").input("a.txt"), &GraphState::default());
        assert!(err.is_err());
    }

    #[test]
    fn describe_mentions_everything() {
        let task = task(&["${*x}.md", "extra.txt"]).output("out/${*x}.html");
        assert_eq!(task.describe(), "publish (inp: ${*x}.md extra.txt, out: out/${*x}.html)");

        let patterns = vec![Pattern::new("a.txt").unwrap()];
        let value = serde_yaml::Value::Bool(true);
        let err = Task::new(Arc::new(Publish), patterns, Some(&value)).unwrap_err();
        assert!(matches!(err, ConfigError::Arg(name, _) if name == "publish"));
    }
}
