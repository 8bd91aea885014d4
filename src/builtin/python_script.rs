use std::collections::BTreeMap;
use std::process;

use anyhow::{Context, bail};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use super::{no_outputs, prefix, single};
use crate::command::TypedCommand;
use crate::config::CACHE_DIR;
use crate::paths::{hide_path, normalize_path, parent_dir};
use crate::record::{BuildRecord, Generated, Record, Rule};

/// Interpreter used to ask a script what it reads and writes.
const PYTHON: &str = "python3";

/// Loads the script given as first argument from the current directory and
/// prints its build cases as JSON. The variables file and the value of `here`
/// follow as second and third argument.
const INSPECT: &str = r#"
import importlib.util, inspect, json, sys

fn_py, path_variables, here = sys.argv[1:4]
spec = importlib.util.spec_from_file_location("<paperweave>", fn_py)
script = importlib.util.module_from_spec(spec)
spec.loader.exec_module(script)

info = getattr(script, "paperweave_info", None)
uses_variables = info is not None and "variables" in inspect.signature(info).parameters
kwargs = {}
if uses_variables:
    try:
        with open(path_variables) as fh:
            kwargs["variables"] = json.load(fh)
    except FileNotFoundError:
        kwargs["variables"] = {}
    kwargs["variables"]["here"] = here

cases = None
if info is not None:
    fmt = getattr(script, "PAPERWEAVE_CASE_FMT", None)
    list_cases = getattr(script, "paperweave_cases", None)
    cases = []
    for case in ([()] if list_cases is None else list_cases()):
        args, kw = ((), case) if isinstance(case, dict) else (tuple(case), {})
        if fmt is not None:
            argstr = fmt.format(*args, **kw)
        elif kw:
            raise ValueError("Keyword cases need PAPERWEAVE_CASE_FMT")
        else:
            argstr = "_".join([fn_py[:-3], *map(str, args)])
        result = info(*args, **kw, **kwargs)
        cases.append({
            "argstr": argstr,
            "inputs": result.get("inputs", []),
            "outputs": result.get("outputs", []),
        })

json.dump({"variables": uses_variables, "cases": cases}, sys.stdout)
"#;

/// Run a Python script in its own directory, once per case it declares.
///
/// The script describes itself with `paperweave_info(*case)`, returning the
/// `inputs` and `outputs` it uses relative to its own directory, and may list
/// its cases with `paperweave_cases()`. At build time, the module files it
/// imports end up in a depfile.
#[derive(Debug, Clone, Copy)]
pub struct PythonScript;

#[derive(Debug, Default, Deserialize)]
struct ScriptInfo {
    #[serde(default)]
    variables: bool,
    /// `None` when the script has no `paperweave_info`.
    cases: Option<Vec<Case>>,
}

#[derive(Debug, Deserialize)]
struct Case {
    argstr: String,
    #[serde(default)]
    inputs: Vec<String>,
    #[serde(default)]
    outputs: Vec<String>,
}

fn inspect(path_py: &Utf8Path, workdir: &Utf8Path) -> anyhow::Result<ScriptInfo> {
    let variables = std::env::current_dir()?.join(CACHE_DIR).join("variables.json");
    let output = process::Command::new(PYTHON)
        .arg("-c")
        .arg(INSPECT)
        .arg(path_py.file_name().unwrap_or(path_py.as_str()))
        .arg(variables)
        .arg(workdir.as_str())
        .current_dir(workdir)
        .output()
        .with_context(|| format!("Couldn't run {PYTHON} to inspect {path_py}"))?;

    if !output.status.success() {
        bail!(
            "Inspecting {path_py} failed:\n{}",
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
    }
    serde_json::from_slice(&output.stdout).with_context(|| format!("Unexpected description of {path_py}"))
}

fn case_records(path_py: &Utf8Path, workdir: &Utf8Path, info: ScriptInfo) -> anyhow::Result<Vec<Record>> {
    let Some(cases) = info.cases else {
        return Ok(vec![Record::from(format!("Skipped {path_py}: paperweave_info(...) missing"))]);
    };

    let fix = |path: &String| normalize_path(workdir.join(path));
    let mut records = Vec::with_capacity(cases.len());
    for case in cases {
        if case.argstr.is_empty() || case.argstr.contains(char::is_whitespace) {
            bail!("Case names of {path_py} can't be empty or contain whitespace, got '{}'", case.argstr);
        }
        let out_prefix = hide_path(normalize_path(workdir.join(&case.argstr)));

        let mut record = BuildRecord::new("python_script")
            .input(path_py.to_path_buf())
            .output(format!("{out_prefix}.log"))
            .implicit(case.inputs.iter().map(fix))
            .implicit_outputs(case.outputs.iter().map(fix))
            .variable("argstr", case.argstr)
            .variable("out_prefix", out_prefix.as_str());
        if info.variables {
            record = record.implicit([Utf8Path::new(CACHE_DIR).join("variables.json")]);
        }
        records.push(Record::Build(record));
    }
    Ok(records)
}

impl TypedCommand for PythonScript {
    type Arg = ();

    fn name(&self) -> &str {
        "python_script"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        BTreeMap::from([(
            "python_script".into(),
            Rule::new("rr-python-script ${in} ${argstr} > ${out}").depfile("${out_prefix}.d"),
        )])
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        let path_py = single(inp, "input file, the Python script")?;
        let stem = prefix(path_py, ".py", "Python script")?;
        no_outputs(out)?;

        let workdir = Utf8PathBuf::from(parent_dir(path_py.as_str()));

        // A script that is still to be built runs once, without declared paths.
        let info = if path_py.is_file() {
            inspect(path_py, &workdir)?
        } else {
            let argstr = Utf8Path::new(stem).file_name().unwrap_or(stem).to_string();
            ScriptInfo {
                variables: false,
                cases: Some(vec![Case {
                    argstr,
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                }]),
            }
        };

        let records = case_records(path_py, &workdir, info).with_context(|| format!("In {path_py}"))?;
        Ok(Generated::new(records).with_gendeps([path_py.clone()]))
    }
}
