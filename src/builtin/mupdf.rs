use std::collections::BTreeMap;

use anyhow::bail;
use camino::Utf8PathBuf;

use super::{all_with_ext, join, prefix, single};
use crate::command::TypedCommand;
use crate::record::{BuildRecord, Generated, Rule};

/// Merge one or more PDF files into one.
#[derive(Debug, Clone, Copy)]
pub struct PdfMerge;

impl TypedCommand for PdfMerge {
    type Arg = ();

    fn name(&self) -> &str {
        "pdf_merge"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        BTreeMap::from([(
            "pdf_merge".into(),
            Rule::new("${mutool} merge -o ${out} ${in} && rr-pdf-normalize ${out}"),
        )])
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        if inp.is_empty() {
            bail!("Expecting at least one input PDF");
        }
        all_with_ext(inp, ".pdf", "input files")?;
        let path_out = single(out, "output, the merged PDF file")?;
        prefix(path_out, ".pdf", "output")?;

        let record = BuildRecord::new("pdf_merge")
            .inputs(inp.iter().cloned())
            .output(path_out.clone())
            .variable("mutool", "mutool");
        Ok(Generated::build(record))
    }
}

/// Insert a page for notes after every page.
#[derive(Debug, Clone, Copy)]
pub struct PdfAddNotes;

impl TypedCommand for PdfAddNotes {
    type Arg = ();

    fn name(&self) -> &str {
        "pdf_add_notes"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        BTreeMap::from([(
            "pdf_add_notes".into(),
            Rule::new("rr-pdf-add-notes ${in} ${out} && rr-pdf-normalize ${out}"),
        )])
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        if inp.len() != 2 {
            bail!("Expecting two input PDFs, the document and the notes page, got: {}", join(inp));
        }
        all_with_ext(inp, ".pdf", "input files")?;
        let path_out = single(out, "output PDF file")?;
        prefix(path_out, ".pdf", "output")?;

        let record = BuildRecord::new("pdf_add_notes")
            .inputs(inp.iter().cloned())
            .output(path_out.clone());
        Ok(Generated::build(record))
    }
}

/// Put several pages on a single sheet.
///
/// The argument is `[nrow, ncol, margin, width, height]`, with lengths in
/// millimeter.
#[derive(Debug, Clone, Copy)]
pub struct PdfNup;

impl TypedCommand for PdfNup {
    type Arg = (u32, u32, f64, f64, f64);

    fn name(&self) -> &str {
        "pdf_nup"
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        BTreeMap::from([(
            "pdf_nup".into(),
            Rule::new(
                "rr-pdf-nup ${in} ${nrow} ${ncol} ${margin} ${width} ${height} ${out} \
                 && rr-pdf-normalize ${out}",
            ),
        )])
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], arg: &Self::Arg) -> anyhow::Result<Generated> {
        let path_src = single(inp, "input PDF")?;
        prefix(path_src, ".pdf", "input file")?;
        let path_dst = single(out, "output PDF file")?;
        prefix(path_dst, ".pdf", "output")?;

        let (nrow, ncol, margin, width, height) = *arg;
        if nrow == 0 || ncol == 0 {
            bail!("The number of rows and columns must be positive, got {nrow}x{ncol}");
        }

        let record = BuildRecord::new("pdf_nup")
            .input(path_src.clone())
            .output(path_dst.clone())
            .variable("nrow", nrow.to_string())
            .variable("ncol", ncol.to_string())
            .variable("margin", format!("{margin:.3}"))
            .variable("width", format!("{width:.3}"))
            .variable("height", format!("{height:.3}"));
        Ok(Generated::build(record))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::tests::{builds, paths};
    use super::*;
    use crate::command::Command;
    use pretty_assertions::assert_eq;

    fn merge(inp: &[&str]) -> anyhow::Result<Generated> {
        TypedCommand::generate(&PdfMerge, &paths(inp), &paths(&["all.pdf"]), &())
    }

    fn add_notes(inp: &[&str]) -> anyhow::Result<Generated> {
        TypedCommand::generate(&PdfAddNotes, &paths(inp), &paths(&["b.pdf"]), &())
    }

    #[test]
    fn merges_pdfs() {
        let generated = merge(&["a.pdf", "b.pdf"]).unwrap();
        let record = builds(&generated)[0];
        assert_eq!(record.inputs, ["a.pdf", "b.pdf"]);
        assert_eq!(record.variables["mutool"], "mutool");

        assert!(merge(&[]).is_err());
        assert!(merge(&["a.png"]).is_err());
    }

    #[test]
    fn adds_notes() {
        assert!(add_notes(&["a.pdf", "notes.pdf"]).is_ok());
        assert!(add_notes(&["a.pdf"]).is_err());
    }

    #[test]
    fn nup_argument() {
        let command: Arc<dyn Command> = Arc::new(PdfNup);
        let value: serde_yaml::Value = serde_yaml::from_str("[2, 3, 10, 297, 210.5]").unwrap();
        let arg = command.decode_arg(Some(&value)).unwrap();
        let generated = command
            .generate(&paths(&["slides.pdf"]), &paths(&["handout.pdf"]), &arg)
            .unwrap();
        let record = builds(&generated)[0];
        assert_eq!(record.variables["nrow"], "2");
        assert_eq!(record.variables["ncol"], "3");
        assert_eq!(record.variables["margin"], "10.000");
        assert_eq!(record.variables["height"], "210.500");

        let short: serde_yaml::Value = serde_yaml::from_str("[2, 3]").unwrap();
        assert!(command.decode_arg(Some(&short)).is_err());
        assert!(command.decode_arg(None).is_err());
    }
}
