use std::collections::BTreeMap;

use anyhow::bail;
use camino::Utf8PathBuf;

use super::{prefix, single};
use crate::command::TypedCommand;
use crate::record::{BuildRecord, CONSOLE_POOL, Generated, Rule};

/// A reproducible ZIP file holding the inputs.
#[derive(Debug, Clone, Copy)]
pub struct ZipPlain;

impl TypedCommand for ZipPlain {
    type Arg = ();

    fn name(&self) -> &str {
        "zip_plain"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        BTreeMap::from([("zip_plain".into(), Rule::new("rr-zip-plain ${in} ${out}"))])
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        if inp.is_empty() {
            bail!("Expecting at least one file to archive");
        }
        let path_zip = single(out, "output, the zip file")?;
        prefix(path_zip, ".zip", "output of zip_plain")?;

        let record = BuildRecord::new("zip_plain")
            .inputs(inp.iter().cloned())
            .output(path_zip.clone())
            .pool(CONSOLE_POOL);
        Ok(Generated::build(record))
    }
}

/// A reproducible ZIP file with all sources a LaTeX run recorded in its
/// `.fls` file.
#[derive(Debug, Clone, Copy)]
pub struct ZipLatex;

impl TypedCommand for ZipLatex {
    type Arg = ();

    fn name(&self) -> &str {
        "zip_latex"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        BTreeMap::from([("zip_latex".into(), Rule::new("rr-latex-zip ${in} ${out}"))])
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        let path_fls = single(inp, "input, the LaTeX fls file")?;
        let stem = prefix(path_fls, ".fls", "input of zip_latex")?;
        let path_zip = single(out, "output, the zip file")?;
        prefix(path_zip, ".zip", "output of zip_latex")?;

        // The fls file is rewritten by every LaTeX pass, wait for the last.
        let record = BuildRecord::new("zip_latex")
            .input(path_fls.clone())
            .output(path_zip.clone())
            .order_only([format!("{stem}.pdf")])
            .pool(CONSOLE_POOL);
        Ok(Generated::build(record))
    }
}

/// A reproducible ZIP file of the files listed in a `.sha256` manifest,
/// whose checksums are verified while archiving.
#[derive(Debug, Clone, Copy)]
pub struct ZipManifest;

impl TypedCommand for ZipManifest {
    type Arg = ();

    fn name(&self) -> &str {
        "zip_manifest"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        BTreeMap::from([("zip_manifest".into(), Rule::new("rr-zip-manifest ${in} ${out}"))])
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        let path_sha256 = single(inp, "input, the sha256 manifest")?;
        prefix(path_sha256, ".sha256", "input of zip_manifest")?;
        let path_zip = single(out, "output, the zip file")?;
        prefix(path_zip, ".zip", "output of zip_manifest")?;

        let record = BuildRecord::new("zip_manifest")
            .input(path_sha256.clone())
            .output(path_zip.clone())
            .pool(CONSOLE_POOL);
        Ok(Generated::build(record))
    }
}
