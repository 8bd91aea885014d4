use std::collections::BTreeMap;

use camino::Utf8PathBuf;

use super::no_outputs;
use crate::command::TypedCommand;
use crate::paths::hide_path;
use crate::record::{BuildRecord, Generated, Record, Rule};

/// Check the hyperlinks in Markdown and PDF documents, one log per input.
#[derive(Debug, Clone, Copy)]
pub struct CheckHrefs;

impl TypedCommand for CheckHrefs {
    type Arg = ();

    fn name(&self) -> &str {
        "check_hrefs"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        BTreeMap::from([("check_hrefs".into(), Rule::new("rr-check-hrefs ${in} ${out}"))])
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        if let Some(path) = inp
            .iter()
            .find(|p| !matches!(p.extension(), Some("md" | "pdf")))
        {
            anyhow::bail!("The inputs for check_hrefs must be Markdown or PDF files, got {path}");
        }
        no_outputs(out)?;

        let records = inp.iter().map(|path| {
            Record::Build(
                BuildRecord::new("check_hrefs")
                    .input(path.clone())
                    .output(hide_path(format!("{path}-check_hrefs.log"))),
            )
        });
        Ok(Generated::new(records))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{builds, paths};
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hidden_logs() {
        let generated = CheckHrefs
            .generate(&paths(&["README.md", "out/paper.pdf"]), &[], &())
            .unwrap();
        let outputs: Vec<_> = builds(&generated).iter().map(|r| r.outputs[0].clone()).collect();
        assert_eq!(outputs, [".README.md-check_hrefs.log", "out/.paper.pdf-check_hrefs.log"]);

        assert!(CheckHrefs.generate(&paths(&["index.html"]), &[], &()).is_err());
    }
}
