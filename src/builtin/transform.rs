use std::collections::BTreeMap;

use anyhow::bail;
use camino::Utf8PathBuf;

use super::join;
use crate::command::TypedCommand;
use crate::paths::is_dir_like;
use crate::record::{BuildRecord, Generated, Record, Rule};

/// One build per input file, each running the same shell command.
///
/// The destination of an input is, in order of preference: the output
/// directory (when the output ends with `/`), the single output file, or the
/// input with its extension replaced.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    name: &'static str,
    command: &'static str,
    /// Extension of the results, without the dot.
    new_ext: Option<&'static str>,
    /// Tool variable and its default.
    tool: Option<(&'static str, &'static str)>,
}

impl Transform {
    pub const COPY: Transform = Transform {
        name: "copy",
        command: "cp ${in} ${out}",
        new_ext: None,
        tool: None,
    };

    pub const CONVERT_SVG_PDF: Transform = Transform {
        name: "convert_svg_pdf",
        command: "${inkscape} ${in} -T --export-filename=${out} --export-type=pdf \
                  && rr-pdf-normalize ${out}",
        new_ext: Some("pdf"),
        tool: Some(("inkscape", "inkscape")),
    };

    pub const CONVERT_ODF_PDF: Transform = Transform {
        name: "convert_odf_pdf",
        // LibreOffice only writes into a directory, under a name of its choice.
        command: "WORK=`mktemp -d --suffix=paperweave` \
                  && ${libreoffice} --convert-to pdf ${in} --outdir $$WORK > /dev/null \
                  && cp $$WORK/*.pdf ${out} \
                  && rm -r $$WORK",
        new_ext: Some("pdf"),
        tool: Some(("libreoffice", "libreoffice")),
    };

    pub const CONVERT_PDF_PNG: Transform = Transform {
        name: "convert_pdf_png",
        command: "${mutool} draw -q -r 600 -o ${out} ${in}",
        new_ext: Some("png"),
        tool: Some(("mutool", "mutool")),
    };

    pub const MARKDOWN_PDF: Transform = Transform {
        name: "markdown_pdf",
        command: "rr-markdown-pdf ${in} ${out}",
        new_ext: Some("pdf"),
        tool: None,
    };

    pub const PDF_RASTER: Transform = Transform {
        name: "pdf_raster",
        command: "${gs} -sDEVICE=pdfimage24 -dNOPAUSE -dBATCH -dSAFER -r150 -sOutputFile=${out} ${in}",
        new_ext: None,
        tool: Some(("gs", "gs")),
    };

    fn destination(&self, src: &Utf8PathBuf, out: Option<&Utf8PathBuf>) -> Utf8PathBuf {
        match (out, self.new_ext) {
            (Some(dir), _) if is_dir_like(dir.as_str()) => {
                let name = src.file_name().unwrap_or(src.as_str());
                let mut dst = dir.join(name);
                if let Some(ext) = self.new_ext {
                    dst.set_extension(ext);
                }
                dst
            }
            (Some(file), _) => file.clone(),
            (None, Some(ext)) => src.with_extension(ext),
            (None, None) => src.clone(),
        }
    }
}

impl TypedCommand for Transform {
    type Arg = ();

    fn name(&self) -> &str {
        self.name
    }

    fn rules(&self) -> BTreeMap<String, Rule> {
        BTreeMap::from([(self.name.to_string(), Rule::new(self.command))])
    }

    fn generate(&self, inp: &[Utf8PathBuf], out: &[Utf8PathBuf], _: &()) -> anyhow::Result<Generated> {
        if out.len() > 1 {
            bail!("Expecting at most one destination, got: {}", join(out));
        }
        let out = out.first();
        if inp.len() > 1 && !out.is_some_and(|o| is_dir_like(o.as_str())) {
            bail!("Need a directory output for multiple inputs, got: {}", join(inp));
        }
        if out.is_none() && self.new_ext.is_none() {
            bail!("Output required because the extension does not change");
        }

        let records = inp.iter().map(|src| {
            let mut record = BuildRecord::new(self.name)
                .input(src.clone())
                .output(self.destination(src, out));
            if let Some((key, value)) = self.tool {
                record = record.variable(key, value);
            }
            Record::Build(record)
        });

        Ok(Generated::new(records))
    }
}
