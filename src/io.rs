use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::time::Instant;

use camino::Utf8Path;
use console::Style;

const ANSI_BLUE: Style = Style::new().blue();

pub fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

/// Write `content` to `path` unless the file already holds exactly that.
/// Returns whether the file was written.
///
/// The content goes to a temporary sibling first and is then renamed over the
/// target, so readers never observe a half-written file.
pub fn write_if_changed(path: impl AsRef<Utf8Path>, content: &str) -> std::io::Result<bool> {
    let path = path.as_ref();
    if let Ok(existing) = fs::read(path)
        && existing == content.as_bytes()
    {
        return Ok(false);
    }

    if let Some(dir) = path.parent()
        && !dir.as_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }

    let name = path.file_name().unwrap_or("out");
    let temp = path.with_file_name(format!(".{name}.tmp"));
    {
        let mut file = fs::File::create(&temp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&temp, path)?;

    Ok(true)
}
