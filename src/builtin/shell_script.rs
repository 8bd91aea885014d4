use std::collections::BTreeMap;
use std::fs;

use anyhow::{Context, bail};
use camino::{Utf8Path, Utf8PathBuf};

use super::{no_outputs, prefix, single};
use crate::command::TypedCommand;
use crate::paths::{normalize_path, parent_dir};
use crate::record::{BuildRecord, Generated, Rule};

/// Comment lines starting with this declare extra inputs or outputs.
pub const DIRECTIVE: &str = "#PAPERWEAVE";

/// Run a shell script in its own directory, logging to a hidden file.
///
/// Lines like `#PAPERWEAVE inputs a.csv b.csv` or `#PAPERWEAVE outputs
/// plot.pdf` in the script declare paths relative to the script.
#[derive(Debug, Clone, Copy)]
pub struct ShellScript;

#[derive(Debug, Default, PartialEq, Eq)]
struct Directives {
    inputs: Vec<Utf8PathBuf>,
    outputs: Vec<Utf8PathBuf>,
}

fn parse_directives(text: &str, workdir: &Utf8Path) -> anyhow::Result<Directives> {
    let mut directives = Directives::default();
    for line in text.lines() {
        let Some(rest) = line.strip_prefix(DIRECTIVE) else {
            continue;
        };
        let mut words = rest.split_whitespace();
        let list = match words.next().map(str::to_lowercase).as_deref() {
            Some("inputs") => &mut directives.inputs,
            Some("outputs") => &mut directives.outputs,
            Some(other) => bail!("Unsupported keyword: {DIRECTIVE} {other}"),
            None => bail!("Missing keyword after {DIRECTIVE}"),
        };
        list.extend(words.map(|path| normalize_path(workdir.join(path))));
    }
    Ok(directives)
}

impl TypedCommand for ShellScript {
    type Arg = ();

    fn name(&self) -> &str {
        "shell_script"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        BTreeMap::from([("shell_script".into(), Rule::new("rr-shell-script ${in} > ${out}"))])
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        let path_sh = single(inp, "input file, the shell script")?;
        prefix(path_sh, ".sh", "shell script")?;
        no_outputs(out)?;

        let workdir = Utf8PathBuf::from(parent_dir(path_sh.as_str()));
        let stem = path_sh.file_stem().unwrap_or_default();

        // The script may still have to be built, then it has no directives yet.
        let directives = if path_sh.is_file() {
            let text = fs::read_to_string(path_sh).with_context(|| format!("Couldn't read {path_sh}"))?;
            parse_directives(&text, &workdir).with_context(|| format!("In {path_sh}"))?
        } else {
            Directives::default()
        };

        let record = BuildRecord::new("shell_script")
            .input(path_sh.clone())
            .output(normalize_path(workdir.join(format!(".{stem}.log"))))
            .implicit(directives.inputs)
            .implicit_outputs(directives.outputs);
        Ok(Generated::build(record).with_gendeps([path_sh.clone()]))
    }
}
