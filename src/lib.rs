#![cfg_attr(not(test), forbid(unsafe_code))]
//! Paperweave generates a [Ninja](https://ninja-build.org) build file for
//! document pipelines: LaTeX papers, figures, converted office files,
//! archives, scripts producing tables.
//!
//! A project is described by `paperweave.yaml` files. Every task names a
//! command and a few input patterns with *named wildcards*:
//!
//! ```yaml
//! imports: [builtin]
//! tasks:
//!   - command: convert_svg_pdf
//!     inp: figures/${*name}.svg
//!   - command: latex
//!     inp: paper/${*doc}.tex
//! ```
//!
//! The patterns are matched against the files on disk and against the
//! outputs of every earlier task, so a task can consume files that don't
//! exist yet. Each consistent assignment of the wildcards becomes one call
//! of the command, which returns Ninja build statements. The result is a
//! single `build.ninja`, which also knows how to regenerate itself whenever
//! a file that shaped it changes.
//!
//! Commands are plugins: implement [`TypedCommand`] and register the command
//! in a [`Registry`] under a set name that configuration files can import.

mod blueprint;
pub mod builtin;
mod command;
mod config;
mod error;
mod executor;
mod graph;
mod io;
mod ninja;
mod paths;
pub mod pattern;
mod record;
mod task;
pub mod template;
#[cfg(test)]
mod testing;
#[cfg(feature = "watch")]
mod watch;

use camino::Utf8Path;

pub use crate::blueprint::Blueprint;
pub use crate::command::{Arg, Command, Registry, TypedCommand};
pub use crate::config::{CACHE_DIR, CONFIG_FILE, ENV_PREFIX, Loaded, VariablesCache, load};
pub use crate::error::*;
pub use crate::executor::{NINJA, exit_code, run_ninja};
pub use crate::graph::{BuildFile, Entry, GraphState, REGENERATE, Settings, Step, assemble};
pub use crate::ninja::{Writer, escape_path};
pub use crate::paths::{hide_path, normalize_path};
pub use crate::record::{
    BuildRecord, CONSOLE_POOL, ERROR_MISSING, Generated, MKDIR_SUFFIX, PHONY, Pool, Record, Rule,
};
pub use crate::task::{IGNORE_MISSING, Task};
#[cfg(feature = "watch")]
pub use crate::watch::watch;

/// Load the project in the current directory and write its build file.
/// `root` is the absolute path of the current directory.
pub fn generate(root: &Utf8Path, registry: &Registry) -> Result<BuildFile, WeaveError> {
    let blueprint = Blueprint::load(root, registry)?;
    blueprint.write()
}
