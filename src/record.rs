//! Build statements, rules and pools as they end up in `build.ninja`.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;

/// The rule Ninja provides out of the box for aliases.
pub const PHONY: &str = "phony";

/// Rule of the placeholder record that stands in for a build with missing
/// inputs. Building it always fails.
pub const ERROR_MISSING: &str = "error_missing";

/// Suffix of the rule variant that creates output directories first.
pub const MKDIR_SUFFIX: &str = "_mkdir";

/// Pool that Ninja defines itself. It is never declared in the build file.
pub const CONSOLE_POOL: &str = "console";

/// A single `build` statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRecord {
    pub rule: String,
    pub outputs: Vec<Utf8PathBuf>,
    pub implicit_outputs: Vec<Utf8PathBuf>,
    pub inputs: Vec<Utf8PathBuf>,
    pub implicit: Vec<Utf8PathBuf>,
    pub order_only: Vec<Utf8PathBuf>,
    pub variables: BTreeMap<String, String>,
    pub pool: Option<String>,
    pub depfile: Option<String>,
}

impl BuildRecord {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            ..Default::default()
        }
    }

    pub fn output(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    pub fn outputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.outputs.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn implicit_outputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.implicit_outputs.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn input(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.inputs.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn implicit<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.implicit.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn order_only<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.order_only.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    pub fn depfile(mut self, depfile: impl Into<String>) -> Self {
        self.depfile = Some(depfile.into());
        self
    }

    /// Explicit and implicit outputs.
    pub fn all_outputs(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.outputs.iter().chain(&self.implicit_outputs)
    }

    /// Explicit, implicit and order-only inputs.
    pub fn all_inputs(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.inputs
            .iter()
            .chain(&self.implicit)
            .chain(&self.order_only)
    }

    /// Sort and deduplicate the lists whose order carries no meaning.
    pub(crate) fn tidy(&mut self) {
        for list in [
            &mut self.implicit,
            &mut self.implicit_outputs,
            &mut self.order_only,
        ] {
            list.sort();
            list.dedup();
        }
    }
}

/// Anything a command can emit into the build file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Comment(String),
    Build(BuildRecord),
}

impl From<BuildRecord> for Record {
    fn from(build: BuildRecord) -> Self {
        Record::Build(build)
    }
}

impl From<String> for Record {
    fn from(comment: String) -> Self {
        Record::Comment(comment)
    }
}

impl From<&str> for Record {
    fn from(comment: &str) -> Self {
        Record::Comment(comment.into())
    }
}

/// A Ninja `rule`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rule {
    pub command: String,
    pub description: Option<String>,
    pub depfile: Option<String>,
    pub deps: Option<String>,
    pub pool: Option<String>,
    pub generator: bool,
    pub restat: bool,
}

impl Rule {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn depfile(mut self, depfile: impl Into<String>) -> Self {
        self.depfile = Some(depfile.into());
        self
    }

    pub fn deps(mut self, deps: impl Into<String>) -> Self {
        self.deps = Some(deps.into());
        self
    }

    pub fn pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    pub fn generator(mut self) -> Self {
        self.generator = true;
        self
    }

    pub fn restat(mut self) -> Self {
        self.restat = true;
        self
    }

    /// The variant of this rule that first creates the directories listed in
    /// the `dstdirs` variable.
    pub fn with_mkdir(&self) -> Self {
        Self {
            command: format!("mkdir -p ${{dstdirs}} && {}", self.command),
            ..self.clone()
        }
    }
}

/// A Ninja `pool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pool {
    pub depth: usize,
}

/// What a command produces for one set of inputs and outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generated {
    pub records: Vec<Record>,
    /// Files that were read, or would have been read if they existed, to
    /// decide on the records. When any of them changes, the build file must
    /// be generated again.
    pub gendeps: Vec<Utf8PathBuf>,
}

impl Generated {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records.into_iter().collect(),
            gendeps: Vec::new(),
        }
    }

    pub fn build(record: BuildRecord) -> Self {
        Self::new([Record::Build(record)])
    }

    pub fn with_gendeps<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.gendeps.extend(paths.into_iter().map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_fields() {
        let mut record = BuildRecord::new("latex")
            .input("doc/main.tex")
            .output("doc/main.pdf")
            .implicit(["doc/b.tex", "doc/a.tex", "doc/b.tex"])
            .variable("latex", "pdflatex")
            .pool(CONSOLE_POOL);
        record.tidy();

        assert_eq!(record.implicit, ["doc/a.tex", "doc/b.tex"]);
        assert_eq!(record.pool.as_deref(), Some("console"));
        assert_eq!(
            record.all_outputs().map(|p| p.as_str()).collect::<Vec<_>>(),
            ["doc/main.pdf"]
        );
    }

    #[test]
    fn mkdir_variant() {
        let rule = Rule::new("cp ${in} ${out}").description("copy");
        let mkdir = rule.with_mkdir();
        assert_eq!(mkdir.command, "mkdir -p ${dstdirs} && cp ${in} ${out}");
        assert_eq!(mkdir.description.as_deref(), Some("copy"));
    }
}
