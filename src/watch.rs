use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use console::style;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::new_debouncer;

use crate::command::Registry;
use crate::error::WeaveError;
use crate::executor::run_ninja;
use crate::graph::Settings;
use crate::paths::normalize_path;

/// Generate and build, then do it again after every change to a source file.
///
/// Changes to hidden files, directories and anything the build itself
/// produces are ignored.
pub fn watch(root: &Utf8Path, registry: &Registry, args: &[String]) -> Result<(), WeaveError> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(Duration::from_millis(250), None, tx)?;
    debouncer.watch(root.as_std_path(), RecursiveMode::Recursive)?;

    let mut ignored = HashSet::new();
    rebuild(root, registry, args, &mut ignored);

    for result in &rx {
        let events = match result {
            Ok(events) => events,
            Err(errors) => {
                for e in errors {
                    tracing::warn!("Error while watching: {e}");
                }
                continue;
            }
        };

        let changed: Vec<Utf8PathBuf> = events
            .iter()
            .filter(|de| {
                matches!(
                    de.event.kind,
                    EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
                )
            })
            .flat_map(|de| &de.event.paths)
            .filter_map(|path| relevant(path, root, &ignored))
            .collect();

        if changed.is_empty() {
            continue;
        }

        for path in &changed {
            tracing::debug!("Changed: {path}");
        }
        eprintln!("{} {}", style("Changed").blue(), changed[0]);
        rebuild(root, registry, args, &mut ignored);
    }

    Ok(())
}

fn rebuild(root: &Utf8Path, registry: &Registry, args: &[String], ignored: &mut HashSet<Utf8PathBuf>) {
    let file = match crate::generate(root, registry) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("{} {e}", style("Error:").red());
            return;
        }
    };

    ignored.clear();
    ignored.insert(Settings::default().build_file);
    ignored.extend(file.builds().flat_map(|b| b.all_outputs()).cloned());

    if let Err(e) = run_ninja(args) {
        eprintln!("{} {e}", style("Error:").red());
    }
}

/// The path relative to the root, if a change to it matters.
fn relevant(path: &Path, root: &Utf8Path, ignored: &HashSet<Utf8PathBuf>) -> Option<Utf8PathBuf> {
    let path = Utf8Path::from_path(path)?;
    let path = match path.strip_prefix(root) {
        Ok(relative) => normalize_path(relative),
        Err(_) if path.is_relative() => normalize_path(path),
        Err(_) => return None,
    };

    let hidden = path
        .components()
        .any(|c| c.as_str().starts_with('.') && !matches!(c.as_str(), "." | ".."));
    if hidden || ignored.contains(&path) || path.is_dir() {
        return None;
    }
    Some(path)
}
