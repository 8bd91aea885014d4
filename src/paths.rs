//! Lexical path helpers.
//!
//! None of these touch the filesystem: paths in build files are plain strings
//! relative to the project root, and they may still contain unresolved
//! `${...}` placeholders when they pass through here.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

/// Collapse `.` and `..` components without consulting the filesystem.
///
/// An empty result is returned as `.`, so that the output is always a usable
/// path.
pub fn normalize_path(path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
    let mut components = path.as_ref().components().peekable();
    let mut ret = if let Some(c @ Utf8Component::Prefix(..)) = components.peek().cloned() {
        components.next();
        Utf8PathBuf::from(c.as_str())
    } else {
        Utf8PathBuf::new()
    };

    for component in components {
        match component {
            Utf8Component::Prefix(..) => unreachable!(),
            Utf8Component::RootDir => {
                ret.push(Utf8Component::RootDir);
            }
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if ret.ends_with(Utf8Component::ParentDir) || ret.as_str().is_empty() {
                    ret.push(Utf8Component::ParentDir);
                } else if !ret.pop() && !ret.has_root() {
                    ret.push(Utf8Component::ParentDir);
                }
            }
            Utf8Component::Normal(c) => {
                ret.push(c);
            }
        }
    }

    if ret.as_str().is_empty() {
        Utf8PathBuf::from(".")
    } else {
        ret
    }
}

/// Express `path` relative to `base`. Both are expected to be absolute, or
/// both relative to the same directory.
pub fn relative_to(path: impl AsRef<Utf8Path>, base: impl AsRef<Utf8Path>) -> Utf8PathBuf {
    let path = normalize_path(path);
    let base = normalize_path(base);

    let mut path = path.components().peekable();
    let mut base = base.components().peekable();
    while let (Some(a), Some(b)) = (path.peek(), base.peek()) {
        if a != b {
            break;
        }
        path.next();
        base.next();
    }

    let mut ret = Utf8PathBuf::new();
    for component in base {
        if component != Utf8Component::CurDir {
            ret.push("..");
        }
    }
    for component in path {
        ret.push(component);
    }

    normalize_path(ret)
}

/// Directory part of a path, normalized. A bare file name lives in `.`.
pub fn parent_dir(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) => "/".into(),
        Some((head, _)) => normalize_path(head).into_string(),
        None => ".".into(),
    }
}

/// The hidden sibling of a file: `dir/name` becomes `dir/.name`.
pub fn hide_path(path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
    let path = path.as_ref();
    match path.file_name() {
        Some(name) if !name.starts_with('.') => path.with_file_name(format!(".{name}")),
        _ => path.to_path_buf(),
    }
}

/// Whether a path string names a directory, i.e. ends with a slash.
pub fn is_dir_like(path: &str) -> bool {
    path.ends_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(normalize_path("a/./b/../c"), "a/c");
        assert_eq!(normalize_path("./a"), "a");
        assert_eq!(normalize_path("a/.."), ".");
        assert_eq!(normalize_path(""), ".");
        assert_eq!(normalize_path("../a"), "../a");
        assert_eq!(normalize_path("../../a"), "../../a");
        assert_eq!(normalize_path("/a/../../b"), "/b");
        assert_eq!(normalize_path("sub/${*name}.tex"), "sub/${*name}.tex");
    }

    #[test]
    fn relative_paths() {
        assert_eq!(relative_to("/root/project/a/b.txt", "/root/project"), "a/b.txt");
        assert_eq!(relative_to("/root/other/b.txt", "/root/project"), "../other/b.txt");
        assert_eq!(relative_to("/root/project", "/root/project"), ".");
    }

    #[test]
    fn parents() {
        assert_eq!(parent_dir("foo.txt"), ".");
        assert_eq!(parent_dir("a/b/foo.txt"), "a/b");
        assert_eq!(parent_dir("./a/foo.txt"), "a");
        assert_eq!(parent_dir("/foo.txt"), "/");
    }

    #[test]
    fn hidden() {
        assert_eq!(hide_path("out/paper.pdf"), "out/.paper.pdf");
        assert_eq!(hide_path("paper.pdf"), ".paper.pdf");
        assert_eq!(hide_path("out/.paper.pdf"), "out/.paper.pdf");
    }
}
