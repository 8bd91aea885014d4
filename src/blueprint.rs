use std::time::Instant;

use camino::Utf8Path;
use console::style;

use crate::command::Registry;
use crate::config::{self, VariablesCache};
use crate::error::{ConfigError, GenerateError, WeaveError};
use crate::graph::{BuildFile, Settings, Step, assemble};
use crate::io::{as_overhead, write_if_changed};
use crate::task::Task;

/// The blueprint of a build.
///
/// A `Blueprint` is an ordered list of tasks and barriers, usually loaded from
/// the `paperweave.yaml` files of a project, which can be turned into a
/// complete Ninja build file.
///
/// All paths are relative to the current directory, which must be the
/// project root.
///
/// # Example
///
/// ```rust,no_run
/// use camino::Utf8Path;
/// use paperweave::{Blueprint, Registry};
///
/// let blueprint = Blueprint::load(Utf8Path::new("/home/me/thesis"), &Registry::default())?;
/// let file = blueprint.write()?;
/// println!("{} build statements", file.builds().count());
/// # Ok::<(), paperweave::WeaveError>(())
/// ```
#[derive(Debug, Default)]
pub struct Blueprint {
    steps: Vec<Step>,
    caches: Vec<VariablesCache>,
    settings: Settings,
}

impl Blueprint {
    /// Creates a new, empty blueprint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the configuration tree of the project in the current directory.
    /// `root` is the absolute path of that directory.
    pub fn load(root: &Utf8Path, registry: &Registry) -> Result<Self, ConfigError> {
        let s = Instant::now();
        let loaded = config::load(root, registry)?;
        tracing::info!(
            "Loaded {} configuration files {}",
            loaded.caches.len(),
            as_overhead(s)
        );

        Ok(Self {
            steps: loaded.steps,
            caches: loaded.caches,
            settings: Settings::default(),
        })
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn task(&mut self, task: Task) -> &mut Self {
        self.steps.push(Step::Build(task));
        self
    }

    pub fn barrier(&mut self, name: impl Into<String>) -> &mut Self {
        self.steps.push(Step::Barrier(name.into()));
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Build the graph without writing anything.
    pub fn assemble(&self) -> Result<BuildFile, GenerateError> {
        assemble(&self.steps, &self.settings)
    }

    /// Build the graph, then write the build file and the variables caches,
    /// each only when its content changed. Nothing is written when the
    /// graph can't be built.
    pub fn write(&self) -> Result<BuildFile, WeaveError> {
        let s = Instant::now();
        let file = self.assemble()?;

        let path = &self.settings.build_file;
        let written = write_if_changed(path, &file.to_string())
            .map_err(|e| WeaveError::Write(path.clone(), e))?;

        for cache in &self.caches {
            write_if_changed(&cache.path, &cache.content)
                .map_err(|e| WeaveError::Write(cache.path.clone(), e))?;
        }

        let status = if written { "Wrote" } else { "Unchanged" };
        eprintln!("{} {} {}", style(status).green(), path, as_overhead(s));
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use super::*;
    use crate::builtin::Transform;
    use crate::pattern::Pattern;
    use crate::testing::in_temp_dir;
    use serial_test::serial;

    #[test]
    #[serial]
    fn writes_only_on_success() {
        in_temp_dir(&[("a.txt", "")], || {
            let copy = |out: &str| {
                Task::new(Arc::new(Transform::COPY), vec![Pattern::new("a.txt").unwrap()], None)
                    .unwrap()
                    .output(out)
            };

            let mut blueprint = Blueprint::new();
            blueprint.task(copy("out/"));
            let file = blueprint.write().unwrap();
            assert!(file.producer("out/a.txt").is_some());
            let first = fs::read_to_string("build.ninja").unwrap();

            blueprint.task(copy("out/a.txt")).task(copy("other/"));
            blueprint.barrier("late");
            assert!(blueprint.write().is_ok());
            let second = fs::read_to_string("build.ninja").unwrap();
            assert_ne!(first, second);

            let mut broken = Blueprint::new();
            broken.task(copy("nested/"));
            broken.task(
                Task::new(Arc::new(Transform::COPY), vec![Pattern::new("none/*.txt").unwrap()], None)
                    .unwrap()
                    .output("x/"),
            );
            assert!(broken.write().is_err());
            assert_eq!(fs::read_to_string("build.ninja").unwrap(), second);
        });
    }
}
