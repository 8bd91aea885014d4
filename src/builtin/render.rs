use std::collections::BTreeMap;

use anyhow::bail;
use camino::Utf8PathBuf;

use super::{all_with_ext, join, single};
use crate::command::TypedCommand;
use crate::paths::is_dir_like;
use crate::record::{BuildRecord, Generated, Rule};

/// Fill in a template with constants from one or more JSON files.
///
/// The first input is the template, all others are the JSON files.
#[derive(Debug, Clone, Copy)]
pub struct Render;

impl TypedCommand for Render {
    type Arg = ();

    fn name(&self) -> &str {
        "render"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        BTreeMap::from([("render".into(), Rule::new("rr-render ${in} ${out}"))])
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        let out = single(out, "output (file or directory)")?;
        let [template, constants @ ..] = inp else {
            bail!("At least two inputs are required, got: {}", join(inp));
        };
        if constants.is_empty() {
            bail!(
                "At least two inputs are required (template and one or more constants JSON), got: {}",
                join(inp)
            );
        }
        all_with_ext(constants, ".json", "constants file")?;

        let dst = if is_dir_like(out.as_str()) {
            out.join(template.file_name().unwrap_or(template.as_str()))
        } else {
            out.clone()
        };

        let record = BuildRecord::new("render")
            .inputs(inp.iter().cloned())
            .output(dst);
        Ok(Generated::build(record))
    }
}
