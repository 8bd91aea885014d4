//! LaTeX compilation with a heuristic dependency scan.
//!
//! Dependencies are found with regular expressions for `\input`, `\import`,
//! `\includegraphics` and `\bibliography`. Arguments built from macros are
//! not understood. Without an extension, `\includegraphics` is assumed to
//! refer to a PDF file, even though pdflatex tries PNG first.
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::sync::LazyLock;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use super::{no_outputs, prefix, single};
use crate::command::TypedCommand;
use crate::paths::{normalize_path, parent_dir};
use crate::record::{BuildRecord, Generated, Rule};

static RE_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\\input\s*\{(.*?)\}").expect("Error compiling regex"));

static RE_INCLUDEGRAPHICS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\\includegraphics(?:\s*\[.*?\])?\s*\{(.*?)\}").expect("Error compiling regex")
});

static RE_BIBLIOGRAPHY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\\bibliography\s*\{(.*?)\}").expect("Error compiling regex"));

static RE_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\\import\s*\{(.*?)\}\s*\{(.*?)\}").expect("Error compiling regex"));

const DEFAULT_CONTEXT2CMD: &str =
    "abstract,supplementary,dataavailability,funding,authorcontributions,conflictsofinterest,abbreviations";

/// Files a LaTeX source depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatexScan {
    pub implicit: BTreeSet<Utf8PathBuf>,
    /// Every `.tex` file that was scanned, or would have been if it existed.
    pub gendeps: BTreeSet<Utf8PathBuf>,
    pub bib: BTreeSet<Utf8PathBuf>,
}

/// Scan `path_tex` and everything it includes, recursively.
///
/// References are relative to the directory of `path_tex`, except inside a
/// file pulled in with `\import{dir}{file}`, where they are relative to `dir`.
pub fn scan_latex_deps(path_tex: &Utf8Path) -> anyhow::Result<LatexScan> {
    let mut scan = LatexScan::default();
    scan_into(&mut scan, path_tex, None)?;
    Ok(scan)
}

fn scan_into(scan: &mut LatexScan, path: &Utf8Path, tex_root: Option<&Utf8Path>) -> anyhow::Result<()> {
    if !scan.gendeps.insert(path.to_path_buf()) || !path.is_file() {
        return Ok(());
    }

    let tex_root = match tex_root {
        Some(root) => root.to_path_buf(),
        None => Utf8PathBuf::from(parent_dir(path.as_str())),
    };
    let bytes = fs::read(path).with_context(|| format!("Couldn't read {path}"))?;
    let text = String::from_utf8_lossy(&bytes);

    for (new_root, reference, ext) in references(&text) {
        let new_root = normalize_path(tex_root.join(new_root));
        let path_inc = normalize_path(new_root.join(cleanup_path(reference, ext)));
        match ext {
            ".bib" => {
                scan.bib.insert(path_inc);
            }
            ".tex" => {
                scan.implicit.insert(path_inc.clone());
                scan_into(scan, &path_inc, Some(&new_root))?;
            }
            _ => {
                scan.implicit.insert(path_inc);
            }
        }
    }

    Ok(())
}

/// Directory, referenced path and default extension of every reference.
fn references(text: &str) -> Vec<(&str, &str, &'static str)> {
    let mut found = Vec::new();
    for (regex, ext) in [
        (&*RE_INPUT, ".tex"),
        (&*RE_INCLUDEGRAPHICS, ".pdf"),
        (&*RE_BIBLIOGRAPHY, ".bib"),
    ] {
        for caps in regex.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                found.push((".", m.as_str(), ext));
            }
        }
    }
    for caps in RE_IMPORT.captures_iter(text) {
        if let (Some(dir), Some(m)) = (caps.get(1), caps.get(2)) {
            found.push((dir.as_str(), m.as_str(), ".tex"));
        }
    }
    found
}

/// Strip braces and whitespace, add the default extension when there is none.
fn cleanup_path(path: &str, ext: &str) -> Utf8PathBuf {
    let path: String = path.chars().filter(|c| !matches!(c, '{' | '}')).collect();
    let mut path = path.trim().to_string();
    let name = path.rsplit('/').next().unwrap_or_default();
    if !name.contains('.') {
        path.push_str(ext);
    }
    normalize_path(&path)
}

fn rules() -> BTreeMap<String, Rule> {
    BTreeMap::from([
        (
            "latex_bibtex".into(),
            Rule::new(
                "rr-latex ${in} ${latex} --bibtex=${bibtex} \
                 --bibsane='${bibsane}' --bibsane-config='${bibsane_config}'",
            )
            .description("LATEX ${out}"),
        ),
        (
            "latex".into(),
            Rule::new("rr-latex ${in} ${latex}").description("LATEX ${out}"),
        ),
        (
            "latex_diff".into(),
            Rule::new("${latexdiff} --append-context2cmd=${latexdiff_context2cmd} ${in} > ${out}"),
        ),
        ("latex_flat".into(), Rule::new("rr-latex-flat ${in} ${out}")),
    ])
}

/// Compile a document as often as needed, with BibTeX when it has a
/// bibliography.
#[derive(Debug, Clone, Copy)]
pub struct Latex;

impl TypedCommand for Latex {
    type Arg = ();

    fn name(&self) -> &str {
        "latex"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        rules()
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        let path_tex = single(inp, "input file, the main tex file")?;
        let stem = prefix(path_tex, ".tex", "input of the latex command")?;
        no_outputs(out)?;

        let scan = scan_latex_deps(path_tex)?;
        let mut implicit_outputs = vec![
            format!("{stem}.log"),
            format!("{stem}.aux"),
            format!("{stem}.out"),
            format!("{stem}.fls"),
        ];

        let mut record = BuildRecord::new("latex")
            .input(path_tex.clone())
            .output(format!("{stem}.pdf"))
            .implicit(scan.implicit)
            .variable("latex", "pdflatex");

        if !scan.bib.is_empty() {
            implicit_outputs.extend([format!("{stem}.blg"), format!("{stem}.bbl")]);
            record = record
                .implicit(scan.bib)
                .variable("bibtex", "bibtex")
                .variable("bibsane", "bibsane")
                .variable("bibsane_config", "${root}/bibsane.yaml");
            record.rule = "latex_bibtex".into();
        }

        let record = record.implicit_outputs(implicit_outputs);
        Ok(Generated::build(record).with_gendeps(scan.gendeps))
    }
}

/// Flatten `\input` and `\import` into a single LaTeX file.
#[derive(Debug, Clone, Copy)]
pub struct LatexFlat;

impl TypedCommand for LatexFlat {
    type Arg = ();

    fn name(&self) -> &str {
        "latex_flat"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        rules()
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        let path_src = single(inp, "input file")?;
        prefix(path_src, ".tex", "input of latex_flat")?;
        let path_flat = single(out, "output, the flattened LaTeX file")?;
        prefix(path_flat, ".tex", "output of latex_flat")?;

        let scan = scan_latex_deps(path_src)?;
        let record = BuildRecord::new("latex_flat")
            .input(path_src.clone())
            .output(path_flat.clone())
            .implicit(scan.implicit);
        Ok(Generated::build(record).with_gendeps(scan.gendeps))
    }
}

/// Mark up the differences between two compiled documents, both in the
/// LaTeX source and in the bibliography.
#[derive(Debug, Clone, Copy)]
pub struct LatexDiff;

impl TypedCommand for LatexDiff {
    type Arg = ();

    fn name(&self) -> &str {
        "latex_diff"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        rules()
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        let [new_tex, old_tex] = inp else {
            anyhow::bail!("Command latex_diff requires two inputs, the new and the old source");
        };
        let new_prefix = prefix(new_tex, ".tex", "inputs of latex_diff")?;
        let old_prefix = prefix(old_tex, ".tex", "inputs of latex_diff")?;
        let diff_tex = single(out, "output")?;
        let diff_prefix = prefix(diff_tex, ".tex", "output of latex_diff")?;

        let diff = |ext: &str| {
            BuildRecord::new("latex_diff")
                .inputs([format!("{old_prefix}{ext}"), format!("{new_prefix}{ext}")])
                .output(format!("{diff_prefix}{ext}"))
                .variable("latexdiff", "latexdiff")
                .variable("latexdiff_context2cmd", DEFAULT_CONTEXT2CMD)
        };

        Ok(Generated::new([diff(".bbl").into(), diff(".tex").into()]))
    }
}
