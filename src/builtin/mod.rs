//! The `builtin` command set.
//!
//! Most commands only shape build statements around external tools: the
//! `rr-*` helper scripts, `mutool`, `inkscape`, `libreoffice`, `gs` and the
//! LaTeX tool chain. Tool names are record variables with a sensible
//! default, so a configuration variable of the same name replaces them.
//! `python_script` also runs `python3` while generating, to learn what a
//! script reads and writes.
use std::sync::Arc;

use anyhow::{anyhow, bail};
use camino::{Utf8Path, Utf8PathBuf};

use crate::command::Command;

mod check_hrefs;
mod latex;
mod mupdf;
mod python_script;
mod render;
mod shell_script;
mod transform;
mod zip;

pub use check_hrefs::CheckHrefs;
pub use latex::{Latex, LatexDiff, LatexFlat, LatexScan, scan_latex_deps};
pub use mupdf::{PdfAddNotes, PdfMerge, PdfNup};
pub use python_script::PythonScript;
pub use render::Render;
pub use shell_script::ShellScript;
pub use transform::Transform;
pub use zip::{ZipLatex, ZipManifest, ZipPlain};

/// Name under which configuration files import these commands.
pub const SET_NAME: &str = "builtin";

pub fn commands() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(CheckHrefs),
        Arc::new(Latex),
        Arc::new(LatexFlat),
        Arc::new(LatexDiff),
        Arc::new(PdfAddNotes),
        Arc::new(PdfMerge),
        Arc::new(PdfNup),
        Arc::new(PythonScript),
        Arc::new(Transform::COPY),
        Arc::new(Transform::CONVERT_SVG_PDF),
        Arc::new(Transform::CONVERT_ODF_PDF),
        Arc::new(Transform::CONVERT_PDF_PNG),
        Arc::new(Transform::MARKDOWN_PDF),
        Arc::new(Transform::PDF_RASTER),
        Arc::new(Render),
        Arc::new(ShellScript),
        Arc::new(ZipLatex),
        Arc::new(ZipManifest),
        Arc::new(ZipPlain),
    ]
}

/// The only path of a list that must hold exactly one.
fn single<'a>(paths: &'a [Utf8PathBuf], what: &str) -> anyhow::Result<&'a Utf8PathBuf> {
    match paths {
        [path] => Ok(path),
        _ => Err(anyhow!("Expecting one {what}, got: {}", join(paths))),
    }
}

fn no_outputs(out: &[Utf8PathBuf]) -> anyhow::Result<()> {
    if !out.is_empty() {
        bail!("Expected no outputs, got: {}", join(out));
    }
    Ok(())
}

/// The path without the extension `ext`, which it must have.
fn prefix<'a>(path: &'a Utf8Path, ext: &str, what: &str) -> anyhow::Result<&'a str> {
    path.as_str()
        .strip_suffix(ext)
        .ok_or_else(|| anyhow!("The {what} must end with {ext}, got {path}"))
}

fn all_with_ext(paths: &[Utf8PathBuf], ext: &str, what: &str) -> anyhow::Result<()> {
    for path in paths {
        prefix(path, ext, what)?;
    }
    Ok(())
}

fn join(paths: &[Utf8PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".into();
    }
    paths
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::record::{BuildRecord, Generated, Record};

    /// Build records of a command run, without comments.
    pub(super) fn builds(generated: &Generated) -> Vec<&BuildRecord> {
        generated
            .records
            .iter()
            .filter_map(|r| match r {
                Record::Build(build) => Some(build),
                Record::Comment(_) => None,
            })
            .collect()
    }

    pub(super) fn paths(list: &[&str]) -> Vec<Utf8PathBuf> {
        list.iter().map(Utf8PathBuf::from).collect()
    }

    #[test]
    fn names_are_unique() {
        let commands = commands();
        let names: BTreeSet<&str> = commands.iter().map(|c| c.name()).collect();
        assert_eq!(names.len(), commands.len());
    }

    #[test]
    fn shared_rules_agree() {
        let mut seen = std::collections::BTreeMap::new();
        for command in commands() {
            for (name, rule) in command.rules() {
                if let Some(previous) = seen.insert(name.clone(), rule.clone()) {
                    assert_eq!(previous, rule, "rule {name} differs between commands");
                }
            }
        }
    }

    #[test]
    fn helpers() {
        assert!(single(&paths(&["a"]), "input").is_ok());
        let err = single(&paths(&[]), "input").unwrap_err();
        assert_eq!(err.to_string(), "Expecting one input, got: nothing");
        assert_eq!(prefix(Utf8Path::new("doc/a.tex"), ".tex", "input").unwrap(), "doc/a");
        assert!(all_with_ext(&paths(&["a.pdf", "b.png"]), ".pdf", "input").is_err());
        assert!(no_outputs(&paths(&["x"])).is_err());
    }
}
