//! Flat `${name}` interpolation.
//!
//! A template is plain text with `${name}` or `$name` placeholders and `$$`
//! for a literal dollar. Names are identifiers, optionally prefixed with `*`
//! for the named wildcards of a pattern. There are no expressions, filters or
//! nested lookups; every substitution variant below is a different policy
//! applied by the same scanner.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;

use crate::error::TemplateError;
use crate::paths::{normalize_path, relative_to};

/// A flat table of variables.
pub type Variables = BTreeMap<String, String>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$(?:(?P<escaped>\$)|(?P<named>\*?[_A-Za-z][_A-Za-z0-9]*)|\{(?P<braced>\*?[_A-Za-z][_A-Za-z0-9]*)\}|(?P<invalid>))",
    )
    .expect("Error compiling placeholder regex")
});

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[_A-Za-z][_A-Za-z0-9]*$").expect("Error compiling identifier regex")
});

/// Whether `name` can be used as a variable or command name.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Something variables can be looked up in.
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<&str>;
}

impl Lookup for Variables {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl<T: Lookup + ?Sized> Lookup for &T {
    fn lookup(&self, name: &str) -> Option<&str> {
        (**self).lookup(name)
    }
}

/// Layered lookup, the first table shadows the second.
impl<A: Lookup, B: Lookup> Lookup for (A, B) {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.0.lookup(name).or_else(|| self.1.lookup(name))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Policy {
    Strict,
    Safe,
    KeepWildcards,
}

fn render(template: &str, vars: &impl Lookup, policy: Policy) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        if caps.name("escaped").is_some() {
            out.push('$');
            continue;
        }

        let name = caps.name("named").or_else(|| caps.name("braced"));
        let Some(name) = name else {
            // A `$` followed by neither `$`, an identifier nor `{identifier}`.
            if policy == Policy::Strict {
                return Err(TemplateError::Invalid(template.into(), whole.start()));
            }
            out.push('$');
            continue;
        };

        let name = name.as_str();
        let keep = match vars.lookup(name) {
            Some(value) => {
                out.push_str(value);
                continue;
            }
            None => match policy {
                Policy::Strict => false,
                Policy::Safe => true,
                Policy::KeepWildcards => name.starts_with('*'),
            },
        };

        if !keep {
            return Err(TemplateError::Missing(template.into(), name.into()));
        }
        out.push_str(whole.as_str());
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Substitute every placeholder. A missing name or a stray `$` is an error.
pub fn substitute(template: &str, vars: &impl Lookup) -> Result<String, TemplateError> {
    render(template, vars, Policy::Strict)
}

/// Substitute known names and leave everything else untouched.
pub fn substitute_safe(template: &str, vars: &impl Lookup) -> String {
    match render(template, vars, Policy::Safe) {
        Ok(text) => text,
        Err(_) => template.into(),
    }
}

/// Substitute ordinary names strictly, but keep `${*name}` wildcards for the
/// pattern matcher.
pub fn substitute_keep_wildcards(template: &str, vars: &impl Lookup) -> Result<String, TemplateError> {
    render(template, vars, Policy::KeepWildcards)
}

/// Names of all placeholders, in order of appearance, without duplicates.
pub fn identifiers(template: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        if let Some(name) = caps.name("named").or_else(|| caps.name("braced")) {
            if !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }
    }
    names
}

/// Substitute a path from a configuration file and make it relative to the
/// project root.
///
/// Absolute results are re-rooted relative to `${root}`, relative results are
/// joined with `${here}`. A trailing `/` marks a directory and survives
/// normalization.
pub fn rewrite_path(path: &str, vars: &impl Lookup) -> Result<String, TemplateError> {
    let expanded = substitute_keep_wildcards(path, vars)?;
    let lookup = |name: &str| {
        vars.lookup(name)
            .ok_or_else(|| TemplateError::Missing(path.into(), name.into()))
    };

    let joined = if expanded.starts_with('/') {
        relative_to(&expanded, lookup("root")?)
    } else {
        Utf8Path::new(lookup("here")?).join(&expanded)
    };

    let mut result = normalize_path(joined).into_string();
    if expanded.ends_with('/') && !result.ends_with('/') {
        result.push('/');
    }
    Ok(result)
}

/// Variables for the named wildcards of a binding, keyed as `*name`.
pub fn wildcard_vars<'a, I>(binding: I) -> Variables
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    binding
        .into_iter()
        .map(|(name, value)| (format!("*{name}"), value.clone()))
        .collect()
}
