//! Helpers for tests that need a scratch project on disk.
use std::fs;
use std::path::PathBuf;

/// Run `f` with the current directory set to a fresh temporary directory
/// holding `files`. Tests using this must be `#[serial]`.
pub(crate) fn in_temp_dir<R>(files: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
    let dir = tempfile::tempdir().unwrap();
    for (path, content) in files {
        let path = dir.path().join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    let previous: PathBuf = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
    std::env::set_current_dir(previous).unwrap();

    match result {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
