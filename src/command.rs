//! The plugin boundary: commands turn concrete inputs and outputs into build
//! records.
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use camino::Utf8PathBuf;
use serde::de::DeserializeOwned;

use crate::record::{Generated, Pool, Rule};

/// A decoded, type-erased command argument.
pub type Arg = Arc<dyn Any + Send + Sync>;

/// A command with a strongly typed argument.
///
/// Implement this trait for new commands. The argument is decoded from the
/// `arg` field of a task when the configuration is loaded, an absent field is
/// decoded from `null`. Commands without an argument use `()`.
pub trait TypedCommand: Send + Sync {
    type Arg: DeserializeOwned + Send + Sync + 'static;

    /// Name under which the command is used in configuration files.
    fn name(&self) -> &str;

    /// Ninja rules referenced by the records of this command.
    fn rules(&self) -> BTreeMap<String, Rule>;

    fn pools(&self) -> BTreeMap<String, Pool> {
        BTreeMap::new()
    }

    /// Produce the records for one binding of a task.
    ///
    /// This may read the filesystem, but every file that was consulted, or
    /// would have been if it existed, must be listed in
    /// [`Generated::gendeps`].
    fn generate(
        &self,
        inp: &[Utf8PathBuf],
        out: &[Utf8PathBuf],
        arg: &Self::Arg,
    ) -> anyhow::Result<Generated>;
}

/// The object-safe counterpart of [`TypedCommand`].
pub trait Command: Send + Sync {
    fn name(&self) -> &str;
    fn rules(&self) -> BTreeMap<String, Rule>;
    fn pools(&self) -> BTreeMap<String, Pool>;
    fn decode_arg(&self, arg: Option<&serde_yaml::Value>) -> anyhow::Result<Arg>;
    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], arg: &Arg) -> anyhow::Result<Generated>;
}

// The argument type is erased here, and restored again in `generate`.
impl<T> Command for T
where
    T: TypedCommand + 'static,
{
    fn name(&self) -> &str {
        <T as TypedCommand>::name(self)
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        <T as TypedCommand>::rules(self)
    }

    fn pools(&self) -> BTreeMap<String, Pool> {
        <T as TypedCommand>::pools(self)
    }

    fn decode_arg(&self, arg: Option<&serde_yaml::Value>) -> anyhow::Result<Arg> {
        let value = arg.cloned().unwrap_or(serde_yaml::Value::Null);
        let arg: T::Arg = serde_yaml::from_value(value)
            .with_context(|| format!("Malformed argument for command '{}'", <T as TypedCommand>::name(self)))?;
        Ok(Arc::new(arg))
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], arg: &Arg) -> anyhow::Result<Generated> {
        let arg = arg
            .downcast_ref::<T::Arg>()
            .with_context(|| format!("Argument of the wrong type for command '{}'", <T as TypedCommand>::name(self)))?;
        <T as TypedCommand>::generate(self, inp, out, arg)
    }
}

/// Named sets of commands that configuration files can import.
#[derive(Clone)]
pub struct Registry {
    sets: BTreeMap<String, Vec<Arc<dyn Command>>>,
}

impl Registry {
    /// A registry without any command set.
    pub fn empty() -> Self {
        Self {
            sets: BTreeMap::new(),
        }
    }

    /// Register a command set, replacing any set with the same name.
    pub fn register(&mut self, name: impl Into<String>, commands: Vec<Arc<dyn Command>>) -> &mut Self {
        self.sets.insert(name.into(), commands);
        self
    }

    pub fn get(&self, name: &str) -> Option<&[Arc<dyn Command>]> {
        self.sets.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}

impl Default for Registry {
    /// A registry with the `builtin` command set.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(crate::builtin::SET_NAME, crate::builtin::commands());
        registry
    }
}
