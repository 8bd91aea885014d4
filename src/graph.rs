//! Assembly of the complete build graph from a sequence of steps.
//!
//! Steps run strictly in declaration order. Every accepted build statement
//! adds its outputs to the [`GraphState`], where later tasks can match them
//! as inputs, even though none of them exist on disk yet.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{self, Display};
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use indicatif::ProgressStyle;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::command::Command;
use crate::error::GenerateError;
use crate::ninja::Writer;
use crate::record::{BuildRecord, CONSOLE_POOL, ERROR_MISSING, MKDIR_SUFFIX, PHONY, Pool, Rule};
use crate::task::{Emitted, Task};

static PROGRESS_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("Error setting progress bar template")
        .progress_chars("=>-")
});

/// Name of the rule that writes the build file again.
pub const REGENERATE: &str = "regenerate";

/// One declaration, in configuration order.
#[derive(Debug, Clone)]
pub enum Step {
    Build(Task),
    /// Everything declared so far as default must be built before anything
    /// that orders after this barrier.
    Barrier(String),
}

/// What the assembler knows about the graph so far.
#[derive(Debug, Default)]
pub struct GraphState {
    outputs: BTreeSet<Utf8PathBuf>,
    defaults: BTreeSet<Utf8PathBuf>,
    gendeps: BTreeSet<Utf8PathBuf>,
}

/// Outcome of offering a build statement to the [`GraphState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    Accepted,
    Duplicate,
}

impl GraphState {
    pub fn outputs(&self) -> &BTreeSet<Utf8PathBuf> {
        &self.outputs
    }

    pub fn defaults(&self) -> &BTreeSet<Utf8PathBuf> {
        &self.defaults
    }

    pub fn gendeps(&self) -> &BTreeSet<Utf8PathBuf> {
        &self.gendeps
    }

    /// Register the outputs of a record. The first build statement for an
    /// output wins, later statements with only known outputs are dropped, but
    /// a partial overlap is ambiguous.
    pub(crate) fn claim(&mut self, record: &BuildRecord) -> Result<Claim, GenerateError> {
        let proposed: BTreeSet<&Utf8PathBuf> = record.all_outputs().collect();
        let existing: Vec<Utf8PathBuf> = proposed
            .iter()
            .filter(|path| self.outputs.contains(**path))
            .map(|path| (*path).clone())
            .collect();

        if existing.is_empty() {
            self.outputs.extend(proposed.into_iter().cloned());
            Ok(Claim::Accepted)
        } else if existing.len() == proposed.len() {
            Ok(Claim::Duplicate)
        } else {
            let new = proposed
                .into_iter()
                .filter(|path| !self.outputs.contains(*path))
                .cloned()
                .collect();
            Err(GenerateError::Ambiguous { new, existing })
        }
    }
}

/// Knobs of the generated file itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Path of the generated build file.
    pub build_file: Utf8PathBuf,
    /// Shell command that writes the build file again.
    pub regenerate: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            build_file: "build.ninja".into(),
            regenerate: "paperweave generate".into(),
        }
    }
}

/// A line or block in the body of the build file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Comment(String),
    Build(BuildRecord),
}

/// The complete build graph, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFile {
    pub pools: BTreeMap<String, Pool>,
    pub rules: BTreeMap<String, Rule>,
    pub entries: Vec<Entry>,
    pub defaults: Vec<Utf8PathBuf>,
    /// Files that influenced the shape of the graph.
    pub gendeps: Vec<Utf8PathBuf>,
    /// Rule and statement that bring the build file itself up to date.
    pub regenerate: Option<(Rule, BuildRecord)>,
}

impl BuildFile {
    /// All build statements, in order, without the self-regeneration.
    pub fn builds(&self) -> impl Iterator<Item = &BuildRecord> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Build(record) => Some(record),
            Entry::Comment(_) => None,
        })
    }

    /// The build statement producing `path`, if any.
    pub fn producer(&self, path: impl AsRef<Utf8Path>) -> Option<&BuildRecord> {
        let path = path.as_ref();
        self.builds()
            .find(|record| record.all_outputs().any(|out| out == path))
    }
}

impl Display for BuildFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = Writer::new(f);
        writer.comment("Generated by paperweave. Do not edit, changes will be overwritten.")?;
        writer.variable("ninja_required_version", "1.10", 0)?;
        writer.newline()?;

        for (name, pool) in &self.pools {
            writer.pool(name, pool)?;
            writer.newline()?;
        }

        for (name, rule) in &self.rules {
            writer.rule(name, rule)?;
            writer.newline()?;
        }

        for entry in &self.entries {
            match entry {
                Entry::Comment(text) => writer.comment(text)?,
                Entry::Build(record) => {
                    writer.build(record)?;
                    writer.newline()?;
                }
            }
        }

        if !self.defaults.is_empty() {
            writer.default(self.defaults.iter().map(Utf8PathBuf::as_path))?;
            writer.newline()?;
        }

        if let Some((rule, record)) = &self.regenerate {
            writer.rule(REGENERATE, rule)?;
            writer.build(record)?;
        }

        Ok(())
    }
}

#[derive(Default)]
struct Assembler {
    state: GraphState,
    rules: BTreeMap<String, Rule>,
    pools: BTreeMap<String, Pool>,
    entries: Vec<Entry>,
    barriers: BTreeSet<String>,
}

impl Assembler {
    fn register(&mut self, command: &dyn Command) -> Result<(), GenerateError> {
        for (name, rule) in command.rules() {
            match self.rules.get(&name) {
                Some(existing) if *existing != rule => return Err(GenerateError::RuleConflict(name)),
                Some(_) => {}
                None => {
                    self.rules.insert(name, rule);
                }
            }
        }

        for (name, pool) in command.pools() {
            if name == CONSOLE_POOL {
                continue;
            }
            match self.pools.get(&name) {
                Some(existing) if *existing != pool => return Err(GenerateError::PoolConflict(name)),
                Some(_) => {}
                None => {
                    self.pools.insert(name, pool);
                }
            }
        }

        Ok(())
    }

    fn add_task(&mut self, task: &Task) -> Result<(), GenerateError> {
        for barrier in task.barriers() {
            if !self.barriers.contains(barrier) {
                return Err(GenerateError::UnknownBarrier(task.describe(), barrier.clone()));
            }
        }

        self.register(task.command().as_ref())?;

        let output = task.generate(&self.state)?;
        for emitted in output.emitted {
            match emitted {
                Emitted::Comment(text) => self.entries.push(Entry::Comment(text)),
                Emitted::Build { record, default } => match self.state.claim(&record)? {
                    Claim::Accepted => {
                        if default {
                            self.state.defaults.extend(record.outputs.iter().cloned());
                        }
                        self.entries.push(Entry::Build(record));
                    }
                    Claim::Duplicate => {
                        tracing::debug!("Skipping duplicate build of {}", join(&record.outputs));
                    }
                },
            }
        }
        self.state.gendeps.extend(output.gendeps);

        Ok(())
    }

    fn add_barrier(&mut self, name: &str) -> Result<(), GenerateError> {
        let path = Utf8PathBuf::from(name);
        if self.state.outputs.contains(&path) {
            return Err(GenerateError::Ambiguous {
                new: vec![],
                existing: vec![path],
            });
        }

        let record = BuildRecord::new(PHONY)
            .output(path.clone())
            .inputs(std::mem::take(&mut self.state.defaults));

        self.entries.push(Entry::Comment(format!("barrier: {name}")));
        self.entries.push(Entry::Build(record));
        self.state.outputs.insert(path.clone());
        self.state.defaults.insert(path);
        self.barriers.insert(name.into());
        Ok(())
    }

    /// Declare the `_mkdir` variants and the placeholder rule that records
    /// actually use, and check that every other rule is known.
    fn complete_rules(&mut self) -> Result<(), GenerateError> {
        let used: BTreeMap<&str, &BuildRecord> = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Build(record) => Some((record.rule.as_str(), record)),
                Entry::Comment(_) => None,
            })
            .collect();

        for (name, record) in used {
            if name == PHONY || self.rules.contains_key(name) {
                continue;
            }

            let rule = if name == ERROR_MISSING {
                Rule::new("echo 'Missing inputs for ${out}: ${missing}' && false")
                    .description("MISSING ${missing}")
            } else {
                match name
                    .strip_suffix(MKDIR_SUFFIX)
                    .and_then(|base| self.rules.get(base))
                {
                    Some(base) => base.with_mkdir(),
                    None => {
                        let output = record.outputs.first().cloned().unwrap_or_default();
                        return Err(GenerateError::UnknownRule(name.into(), output));
                    }
                }
            };
            self.rules.insert(name.into(), rule);
        }

        Ok(())
    }

    fn check_cycles(&self) -> Result<(), GenerateError> {
        let builds: Vec<&BuildRecord> = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Build(record) => Some(record),
                Entry::Comment(_) => None,
            })
            .collect();

        let mut graph = DiGraph::<usize, ()>::new();
        let nodes: Vec<NodeIndex> = (0..builds.len()).map(|i| graph.add_node(i)).collect();

        let mut producers: HashMap<&Utf8PathBuf, NodeIndex> = HashMap::new();
        for (record, node) in builds.iter().zip(&nodes) {
            for output in record.all_outputs() {
                producers.insert(output, *node);
            }
        }

        for (record, node) in builds.iter().zip(&nodes) {
            for input in record.all_inputs() {
                if let Some(producer) = producers.get(input) {
                    graph.add_edge(*producer, *node, ());
                }
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            let record = builds[graph[cycle.node_id()]];
            GenerateError::Cycle(record.outputs.first().cloned().unwrap_or_default())
        })?;

        Ok(())
    }

    fn finish(mut self, settings: &Settings) -> Result<BuildFile, GenerateError> {
        self.complete_rules()?;
        self.check_cycles()?;

        let gendeps: Vec<Utf8PathBuf> = self.state.gendeps.iter().cloned().collect();
        let regenerate = if gendeps.is_empty() {
            None
        } else {
            // Ninja refuses inputs that neither exist nor are built. An absent
            // file is watched through the closest directory that exists, whose
            // timestamp changes once the file appears.
            let implicit: BTreeSet<Utf8PathBuf> = gendeps
                .iter()
                .map(|path| {
                    if self.state.outputs.contains(path) || path.exists() {
                        path.clone()
                    } else {
                        nearest_existing_dir(path)
                    }
                })
                .collect();
            let rule = Rule::new(settings.regenerate.clone())
                .description("REGENERATE ${out}")
                .generator();
            let record = BuildRecord::new(REGENERATE)
                .output(settings.build_file.clone())
                .implicit(implicit);
            Some((rule, record))
        };

        Ok(BuildFile {
            pools: self.pools,
            rules: self.rules,
            entries: self.entries,
            defaults: self.state.defaults.into_iter().collect(),
            gendeps,
            regenerate,
        })
    }
}

/// Run all steps and assemble the build graph.
pub fn assemble(steps: &[Step], settings: &Settings) -> Result<BuildFile, GenerateError> {
    let span = tracing::span!(Level::INFO, "generating");
    span.pb_set_length(steps.len() as u64);
    span.pb_set_style(&PROGRESS_STYLE);
    span.pb_set_message("Expanding tasks...");
    let _enter = span.enter();

    let mut assembler = Assembler::default();
    for step in steps {
        match step {
            Step::Build(task) => assembler.add_task(task)?,
            Step::Barrier(name) => assembler.add_barrier(name)?,
        }
        span.pb_inc(1);
    }

    let file = assembler.finish(settings)?;
    tracing::info!(
        "Generated {} build statements with {} rules",
        file.builds().count(),
        file.rules.len()
    );
    Ok(file)
}

fn nearest_existing_dir(path: &Utf8Path) -> Utf8PathBuf {
    path.ancestors()
        .skip(1)
        .find(|dir| !dir.as_str().is_empty() && dir.is_dir())
        .map_or_else(|| Utf8PathBuf::from("."), Utf8Path::to_path_buf)
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
    use std::sync::Arc;

    use super::*;
    use crate::command::TypedCommand;
    use crate::pattern::Pattern;
    use crate::record::Generated;
    use crate::testing::in_temp_dir;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serial_test::serial;

    /// Emits exactly the outputs given in its argument.
    struct Emit;

    #[derive(Deserialize)]
    struct EmitArg {
        outputs: Vec<String>,
        #[serde(default)]
        implicit: Vec<String>,
        #[serde(default)]
        gendeps: Vec<String>,
        #[serde(default)]
        rule: Option<String>,
    }

    impl TypedCommand for Emit {
        type Arg = EmitArg;

        fn name(&self) -> &str {
            "emit"
        }

        fn rules(&self) -> BTreeMap<String, Rule> {
            BTreeMap::from([("emit".into(), Rule::new("touch ${out}"))])
        }

        fn pools(&self) -> BTreeMap<String, Pool> {
            BTreeMap::from([("console".into(), Pool { depth: 1 })])
        }

        fn generate(&self, inp: &[Utf8PathBuf], _: &[Utf8PathBuf], arg: &EmitArg) -> anyhow::Result<Generated> {
            let record = BuildRecord::new(arg.rule.clone().unwrap_or_else(|| "emit".into()))
                .inputs(inp.iter().cloned())
                .outputs(arg.outputs.iter().map(String::as_str))
                .implicit(arg.implicit.iter().map(String::as_str));
            Ok(Generated::build(record).with_gendeps(arg.gendeps.iter().map(String::as_str)))
        }
    }

    fn emit(inp: &str, arg: &str) -> Step {
        let value: serde_yaml::Value = serde_yaml::from_str(arg).unwrap();
        let task = Task::new(Arc::new(Emit), vec![Pattern::new(inp).unwrap()], Some(&value)).unwrap();
        Step::Build(task)
    }

    fn claimed(state: &mut GraphState, outputs: &[&str]) -> Result<Claim, GenerateError> {
        state.claim(&BuildRecord::new("x").outputs(outputs.iter().copied()))
    }

    #[test]
    fn first_declared_wins() {
        let mut state = GraphState::default();
        assert_eq!(claimed(&mut state, &["a", "b"]).unwrap(), Claim::Accepted);
        assert_eq!(claimed(&mut state, &["a"]).unwrap(), Claim::Duplicate);
        assert_eq!(claimed(&mut state, &["a", "b"]).unwrap(), Claim::Duplicate);
        assert_eq!(claimed(&mut state, &["c"]).unwrap(), Claim::Accepted);

        let err = claimed(&mut state, &["b", "d"]).unwrap_err();
        let GenerateError::Ambiguous { new, existing } = &err else {
            panic!("expected an ambiguity, got {err}");
        };
        assert_eq!(new, &["d"]);
        assert_eq!(existing, &["b"]);
        assert!(err.to_string().contains("new: d"));
        assert!(err.to_string().contains("existing: b"));
    }

    #[test]
    #[serial]
    fn duplicate_tasks_are_idempotent() {
        in_temp_dir(&[("src.txt", "")], || {
            let steps = [
                emit("src.txt", "{outputs: [out.txt]}"),
                emit("src.txt", "{outputs: [out.txt]}"),
            ];
            let file = assemble(&steps, &Settings::default()).unwrap();
            assert_eq!(file.builds().count(), 1);
            assert_eq!(file.defaults, ["out.txt"]);
        });
    }

    #[test]
    #[serial]
    fn partial_overlap_fails() {
        in_temp_dir(&[("src.txt", "")], || {
            let steps = [
                emit("src.txt", "{outputs: [a.txt]}"),
                emit("src.txt", "{outputs: [a.txt, b.txt]}"),
            ];
            let err = assemble(&steps, &Settings::default()).unwrap_err();
            assert!(matches!(err, GenerateError::Ambiguous { .. }));
        });
    }

    #[test]
    #[serial]
    fn outputs_feed_later_tasks() {
        in_temp_dir(&[("src.txt", "")], || {
            let steps = [
                emit("src.txt", "{outputs: [gen/a.txt]}"),
                emit("gen/*.txt", "{outputs: [final.txt]}"),
            ];
            let file = assemble(&steps, &Settings::default()).unwrap();
            let last = file.producer("final.txt").unwrap();
            assert_eq!(last.inputs, ["gen/a.txt"]);
            assert_eq!(file.producer("gen/a.txt").unwrap().rule, "emit_mkdir");
            assert_eq!(
                file.rules["emit_mkdir"].command,
                "mkdir -p ${dstdirs} && touch ${out}"
            );
            assert!(!file.pools.contains_key("console"));
        });
    }

    #[test]
    #[serial]
    fn barrier_names_are_claimed() {
        in_temp_dir(&[("src.txt", "")], || {
            let steps = [
                Step::Barrier("hold".into()),
                emit("src.txt", "{outputs: [hold]}"),
                emit("hold", "{outputs: [after.txt]}"),
            ];
            let file = assemble(&steps, &Settings::default()).unwrap();
            let producers = file
                .builds()
                .filter(|r| r.all_outputs().any(|out| out == "hold"))
                .count();
            assert_eq!(producers, 1);
            assert_eq!(file.producer("hold").unwrap().rule, PHONY);
            assert_eq!(file.producer("after.txt").unwrap().inputs, ["hold"]);

            let steps = [
                Step::Barrier("hold".into()),
                emit("src.txt", "{outputs: [hold, other.txt]}"),
            ];
            let err = assemble(&steps, &Settings::default()).unwrap_err();
            assert!(matches!(err, GenerateError::Ambiguous { .. }));
        });
    }

    #[test]
    #[serial]
    fn barriers_collect_defaults() {
        in_temp_dir(&[("src.txt", "")], || {
            let mut late = emit("src.txt", "{outputs: [late.txt]}");
            if let Step::Build(task) = &mut late {
                *task = task.clone().after(["hold"]);
            }
            let steps = [
                emit("src.txt", "{outputs: [b.txt]}"),
                emit("src.txt", "{outputs: [a.txt]}"),
                Step::Barrier("hold".into()),
                late,
            ];
            let file = assemble(&steps, &Settings::default()).unwrap();

            let hold = file.producer("hold").unwrap();
            assert_eq!(hold.rule, "phony");
            assert_eq!(hold.inputs, ["a.txt", "b.txt"]);
            assert_eq!(file.producer("late.txt").unwrap().order_only, ["hold"]);
            assert_eq!(file.defaults, ["hold", "late.txt"]);
        });
    }

    #[test]
    #[serial]
    fn barrier_names_must_be_fresh() {
        in_temp_dir(&[("src.txt", "")], || {
            let steps = [emit("src.txt", "{outputs: [hold]}"), Step::Barrier("hold".into())];
            let err = assemble(&steps, &Settings::default()).unwrap_err();
            assert!(matches!(err, GenerateError::Ambiguous { .. }));
        });
    }

    #[test]
    #[serial]
    fn undeclared_barrier() {
        in_temp_dir(&[("src.txt", "")], || {
            let mut step = emit("src.txt", "{outputs: [x.txt]}");
            if let Step::Build(task) = &mut step {
                *task = task.clone().after(["later"]);
            }
            let err = assemble(&[step], &Settings::default()).unwrap_err();
            assert!(matches!(err, GenerateError::UnknownBarrier(_, name) if name == "later"));
        });
    }

    #[test]
    #[serial]
    fn cycles_are_detected() {
        in_temp_dir(&[("src.txt", "")], || {
            let steps = [
                emit("src.txt", "{outputs: [a.txt], implicit: [b.txt]}"),
                emit("a.txt", "{outputs: [b.txt]}"),
            ];
            let err = assemble(&steps, &Settings::default()).unwrap_err();
            assert!(matches!(err, GenerateError::Cycle(_)));
        });
    }

    #[test]
    #[serial]
    fn unknown_rules_are_rejected() {
        in_temp_dir(&[("src.txt", "")], || {
            let steps = [emit("src.txt", "{outputs: [a.txt], rule: nope}")];
            let err = assemble(&steps, &Settings::default()).unwrap_err();
            assert!(matches!(err, GenerateError::UnknownRule(rule, _) if rule == "nope"));
        });
    }

    #[test]
    #[serial]
    fn regeneration_follows_gendeps() {
        in_temp_dir(&[("src.txt", ""), ("scan.txt", "")], || {
            let quiet = [emit("src.txt", "{outputs: [a.txt]}")];
            let file = assemble(&quiet, &Settings::default()).unwrap();
            assert!(file.regenerate.is_none());

            let steps = [
                emit("src.txt", "{outputs: [table.tex]}"),
                emit("src.txt", "{outputs: [doc.pdf], gendeps: [scan.txt, table.tex, absent.tex]}"),
            ];
            let file = assemble(&steps, &Settings::default()).unwrap();
            let (rule, record) = file.regenerate.clone().unwrap();
            assert!(rule.generator);
            assert_eq!(rule.command, "paperweave generate");
            assert_eq!(record.outputs, ["build.ninja"]);
            assert_eq!(record.implicit, [".", "scan.txt", "table.tex"]);
            assert_eq!(file.gendeps, ["absent.tex", "scan.txt", "table.tex"]);

            let text = file.to_string();
            assert!(text.ends_with(
                "rule regenerate\n  command = paperweave generate\n  description = REGENERATE ${out}\n  generator = 1\n\
                 build build.ninja: regenerate | . scan.txt table.tex\n"
            ));
        });
    }

    #[test]
    #[serial]
    fn absent_gendeps_watch_their_directory() {
        in_temp_dir(&[("src.txt", ""), ("chapters/one.tex", "")], || {
            let steps = [emit(
                "src.txt",
                "{outputs: [doc.pdf], gendeps: [chapters/two.tex, chapters/extra/three.tex, chapters/one.tex]}",
            )];
            let file = assemble(&steps, &Settings::default()).unwrap();
            let (_, record) = file.regenerate.unwrap();
            assert_eq!(record.implicit, ["chapters", "chapters/one.tex"]);

            let steps = [emit("src.txt", "{outputs: [doc.pdf], gendeps: [missing/deep/file.tex]}")];
            let file = assemble(&steps, &Settings::default()).unwrap();
            let (_, record) = file.regenerate.unwrap();
            assert_eq!(record.implicit, ["."]);
        });
    }

    #[test]
    #[serial]
    fn rendering_is_deterministic() {
        in_temp_dir(&[("x/1.txt", ""), ("x/2.txt", "")], || {
            let steps = [emit("x/${*n}.txt", "{outputs: [y.txt]}")];
            let first = assemble(&steps, &Settings::default()).unwrap().to_string();
            let second = assemble(&steps, &Settings::default()).unwrap().to_string();
            assert_eq!(first, second);
            assert!(first.starts_with("# Generated by paperweave."));
            assert!(first.contains("rule emit\n  command = touch ${out}\n"));
            assert!(first.contains("# command: emit\n# inp: x/1.txt\n# arg: {\"outputs\":[\"y.txt\"]}\nbuild y.txt: emit x/1.txt\n"));
            assert!(first.contains("default y.txt\n"));
        });
    }
}
