//! Glob patterns with named wildcards.
//!
//! Besides the usual `?`, `*`, `**` and `[...]`, a pattern may contain named
//! wildcards `${*name}`. A named wildcard matches like `*`, but every
//! occurrence of the same name must match the same text, and the matched text
//! is reported back so that matches can be grouped and correlated across
//! several patterns.
//!
//! ```
//! use paperweave::pattern::Pattern;
//!
//! let pattern = Pattern::new("path/${*prefix}/foo*/${*prefix}-main.txt").unwrap();
//! let buckets = pattern
//!     .filter([
//!         "path/some/foo1/some-main.txt",
//!         "path/other/foo2/other-main.txt",
//!         "path/other/foo1/other-main.txt",
//!         "path/other/foo1/some-main.txt",
//!     ])
//!     .unwrap();
//!
//! assert_eq!(buckets.len(), 2);
//! assert_eq!(buckets[0].0["prefix"], "other");
//! assert_eq!(buckets[0].1, ["path/other/foo1/other-main.txt", "path/other/foo2/other-main.txt"]);
//! ```

mod correlate;
mod token;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;
use glob::MatchOptions;
use fancy_regex::Regex;

use crate::error::PatternError;

pub use correlate::{Correlation, correlate};
pub use token::Token;

/// Values of named wildcards, keyed by name without the `*`.
pub type Binding = BTreeMap<String, String>;

/// A compiled glob pattern with named wildcards.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    tokens: Vec<Token>,
    names: Vec<String>,
    regex: Arc<Regex>,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, PatternError> {
        Self::from_tokens(token::tokenize(source)?)
    }

    fn from_tokens(tokens: Vec<Token>) -> Result<Self, PatternError> {
        let source: String = tokens.iter().map(ToString::to_string).collect();

        let mut names: Vec<String> = Vec::new();
        for token in &tokens {
            if let Token::Named(name) = token
                && !names.contains(name)
            {
                names.push(name.clone());
            }
        }

        let regex = format!("^(?:{})$", to_regex(&tokens));
        let regex = Regex::new(&regex).map_err(|e| PatternError::Regex(source.clone(), Box::new(e)))?;

        Ok(Self {
            source,
            tokens,
            names,
            regex: Arc::new(regex),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Distinct names of the named wildcards, in order of first appearance.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether the pattern contains any wildcard at all.
    pub fn is_literal(&self) -> bool {
        self.tokens.iter().all(|t| matches!(t, Token::Literal(_)))
    }

    /// The equivalent plain glob: named wildcards become `*` and neighbouring
    /// wildcards are merged where one subsumes the other.
    pub fn to_glob(&self) -> String {
        let mut merged: Vec<Token> = Vec::with_capacity(self.tokens.len());

        for token in &self.tokens {
            let token = match token {
                Token::Named(_) => Token::Star,
                other => other.clone(),
            };

            match (merged.last(), &token) {
                (Some(Token::Star | Token::GlobStar), Token::Single | Token::Star) => continue,
                (Some(Token::GlobStar), Token::GlobStar) => continue,
                (Some(Token::Single), Token::Star) | (Some(Token::Star | Token::Single), Token::GlobStar) => {
                    merged.pop();
                }
                _ => {}
            }
            merged.push(token);
        }

        merged.iter().map(Token::glob_text).collect()
    }

    /// The regular expression this pattern is matched with, without anchors.
    pub fn to_regex(&self) -> String {
        to_regex(&self.tokens)
    }

    /// Match a path against the whole pattern. On success, returns the values
    /// of the named wildcards in the order of [`Pattern::names`].
    pub fn captures(&self, path: &str) -> Result<Option<Vec<String>>, PatternError> {
        let caps = self
            .regex
            .captures(path)
            .map_err(|e| PatternError::Match(self.source.clone(), path.into(), Box::new(e)))?;

        Ok(caps.map(|caps| {
            self.names
                .iter()
                .map(|name| caps.name(name).map_or("", |m| m.as_str()).to_string())
                .collect()
        }))
    }

    pub fn is_match(&self, path: &str) -> Result<bool, PatternError> {
        Ok(self.captures(path)?.is_some())
    }

    /// Replace the named wildcards that have a value in `binding` by that
    /// value. Names without a value are left untouched.
    pub fn bind(&self, binding: &Binding) -> Result<Self, PatternError> {
        let mut tokens: Vec<Token> = Vec::with_capacity(self.tokens.len());

        for token in &self.tokens {
            let token = match token {
                Token::Named(name) => match binding.get(name) {
                    Some(value) => Token::Literal(value.clone()),
                    None => token.clone(),
                },
                other => other.clone(),
            };

            if let Token::Literal(next) = &token {
                if next.is_empty() {
                    continue;
                }
                if let Some(Token::Literal(prev)) = tokens.last_mut() {
                    prev.push_str(next);
                    continue;
                }
            }
            tokens.push(token);
        }

        Self::from_tokens(tokens)
    }

    /// Group the matching paths by the values of the named wildcards.
    ///
    /// Buckets are ordered by their values, in the order of
    /// [`Pattern::names`], and the paths within a bucket are sorted. Without
    /// named wildcards, all matches end up in a single bucket with an empty
    /// binding. Without any match, there are no buckets.
    pub fn filter<'a, I>(&self, paths: I) -> Result<Vec<(Binding, Vec<String>)>, PatternError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut buckets: BTreeMap<Vec<String>, BTreeSet<&str>> = BTreeMap::new();

        for path in paths {
            if let Some(values) = self.captures(path)? {
                buckets.entry(values).or_default().insert(path);
            }
        }

        Ok(buckets
            .into_iter()
            .map(|(values, paths)| {
                let binding = self.names.iter().cloned().zip(values).collect();
                let paths = paths.into_iter().map(String::from).collect();
                (binding, paths)
            })
            .collect())
    }

    /// Paths on disk, relative to the current directory, that may match this
    /// pattern. The result is a superset of the actual matches and should be
    /// passed through [`Pattern::filter`].
    pub fn glob(&self) -> Result<BTreeSet<String>, PatternError> {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };

        let mut found = BTreeSet::new();
        for entry in glob::glob_with(&globstar_components(&self.to_glob()), options)? {
            let path = Utf8PathBuf::try_from(entry?)?;
            found.insert(path.into_string());
        }
        Ok(found)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

/// The glob crate only understands `**` as a whole path component.
fn globstar_components(glob: &str) -> String {
    glob.split('/')
        .map(|part| {
            if part != "**" && part.contains("**") {
                let mut part = part.to_string();
                while part.contains("**") {
                    part = part.replace("**", "*");
                }
                part
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn escape_class(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    for ch in body.chars() {
        if matches!(ch, '[' | '\\' | '&' | '~' | '^') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn to_regex(tokens: &[Token]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    let mut out = String::new();

    for token in tokens {
        match token {
            Token::Literal(text) => out.push_str(&fancy_regex::escape(text)),
            Token::Single => out.push_str("[^/]"),
            Token::Star => out.push_str("[^/]*"),
            Token::GlobStar => out.push_str(".*"),
            Token::Class { negated, body } => {
                out.push('[');
                if *negated {
                    out.push('^');
                }
                out.push_str(&escape_class(body));
                out.push(']');
            }
            Token::Named(name) if seen.contains(&name.as_str()) => {
                out.push_str(&format!("(?P={name})"));
            }
            Token::Named(name) => {
                seen.push(name);
                out.push_str(&format!("(?P<{name}>[^/]*)"));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_glob_merges_wildcards() {
        let cases = [
            ("generic/${*ch}/*.md", "generic/*/*.md"),
            ("generic/*${*ch}/*.md", "generic/*/*.md"),
            ("generic/${*ch}*/*.md", "generic/*/*.md"),
            ("generic/*${*ch}*/*.md", "generic/*/*.md"),
            ("generic/*${*ch}**/*.md", "generic/**/*.md"),
            ("generic/**${*ch}*/*.md", "generic/**/*.md"),
            ("generic/**${*ch}**/*.md", "generic/**/*.md"),
            ("generic/${*ch}${*foo}/*.md", "generic/*/*.md"),
            ("generic/${*ch}-${*foo}/*.md", "generic/*-*/*.md"),
            ("generic/${*ch}/${*foo}/*.md", "generic/*/*/*.md"),
            ("${*generic}/ch${*foo}/*.md", "*/ch*/*.md"),
            ("generic/ch${*foo}/${*md}", "generic/ch*/*"),
            ("generic/${*md}${*ch}/${*md}", "generic/*/*"),
            ("generic/${*md}?/${*md}", "generic/*/*"),
            ("generic/**?/?${*md}", "generic/**/*"),
            ("generic/?**/*?", "generic/**/*"),
            ("generic/${*md}[a[b]/?[*]", "generic/*[a[b]/?[*]"),
            ("a*${*x}*b", "a*b"),
        ];
        for (named, plain) in cases {
            assert_eq!(Pattern::new(named).unwrap().to_glob(), plain, "{named}");
        }
    }

    #[test]
    fn regex_conversion() {
        let cases = [
            ("generic/${*ch}/*.md", r"generic/(?P<ch>[^/]*)/[^/]*\.md"),
            ("generic/${*ch}/?.md", r"generic/(?P<ch>[^/]*)/[^/]\.md"),
            ("generic/${*ch}/[abc].md", r"generic/(?P<ch>[^/]*)/[abc]\.md"),
            ("generic/${*ch}/[!abc].md", r"generic/(?P<ch>[^/]*)/[^abc]\.md"),
            ("generic/${*ch}**/${*foo}/*.md", r"generic/(?P<ch>[^/]*).*/(?P<foo>[^/]*)/[^/]*\.md"),
            ("generic/${*md}${*ch}/${*md}", r"generic/(?P<md>[^/]*)(?P<ch>[^/]*)/(?P=md)"),
        ];
        for (named, regex) in cases {
            assert_eq!(Pattern::new(named).unwrap().to_regex(), regex, "{named}");
        }
    }

    #[test]
    fn captures_in_name_order() {
        let pattern = Pattern::new("generic/${*ch}**/${*foo}/*.md").unwrap();
        assert_eq!(
            pattern.captures("generic/ch1/some/some/name/file.md").unwrap(),
            Some(vec!["ch1".to_string(), "name".to_string()])
        );
        assert_eq!(pattern.captures("generic/ch1/file.md").unwrap(), None);
    }

    #[test]
    fn backreferences_must_agree() {
        let pattern = Pattern::new("${*x}/${*x}.txt").unwrap();
        let buckets = pattern.filter(["a/a.txt", "a/b.txt", "b/b.txt"]).unwrap();
        let values: Vec<_> = buckets.iter().map(|(b, _)| b["x"].as_str()).collect();
        assert_eq!(values, ["a", "b"]);
        assert_eq!(buckets[0].1, ["a/a.txt"]);
        assert_eq!(buckets[1].1, ["b/b.txt"]);

        let pattern = Pattern::new("${*md}${*ch}/${*md}").unwrap();
        assert_eq!(
            pattern.captures("xy/x").unwrap(),
            Some(vec!["x".to_string(), "y".to_string()])
        );
        assert_eq!(pattern.captures("xy/z").unwrap(), None);

        let pattern = Pattern::new("${*a}${*b}-${*a}${*c}").unwrap();
        assert_eq!(
            pattern.captures("xyz-xw").unwrap(),
            Some(vec!["x".to_string(), "yz".to_string(), "w".to_string()])
        );
    }

    #[test]
    fn repeated_name_next_to_star() {
        // The second occurrence must repeat the first, never fall back to "".
        let pattern = Pattern::new("data/${*run}*${*run}.csv").unwrap();
        assert_eq!(pattern.captures("data/r1_r1.csv").unwrap(), Some(vec!["r1".to_string()]));

        let buckets = pattern
            .filter(["data/r1_r1.csv", "data/r2-r2.csv", "data/r1_r2.csv"])
            .unwrap();
        let runs: Vec<_> = buckets.iter().map(|(b, _)| b["run"].as_str()).collect();
        // Without a common text, the empty value still matches through the star.
        assert_eq!(runs, ["", "r1", "r2"]);
        assert_eq!(buckets[0].1, ["data/r1_r2.csv"]);
        assert_eq!(buckets[1].1, ["data/r1_r1.csv"]);
        assert_eq!(buckets[2].1, ["data/r2-r2.csv"]);
    }

    #[test]
    fn filter_groups_by_value() {
        let paths = [
            "path/some/foo1/some-main.txt",
            "path/other/foo1/other-main.txt",
            "path/other/foo2/other-main.txt",
            "path/other/foo1/some-main.txt",
        ];
        let pattern = Pattern::new("path/${*prefix}/foo*/${*prefix}-main.txt").unwrap();
        let buckets = pattern.filter(paths).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].0, Binding::from([("prefix".into(), "other".into())]));
        assert_eq!(
            buckets[0].1,
            ["path/other/foo1/other-main.txt", "path/other/foo2/other-main.txt"]
        );
        assert_eq!(buckets[1].0, Binding::from([("prefix".into(), "some".into())]));
        assert_eq!(buckets[1].1, ["path/some/foo1/some-main.txt"]);
    }

    #[test]
    fn filter_without_names() {
        let paths = ["b/x-main.txt", "a/foo1/y-main.txt", "path/a/foo2/z-main.txt"];
        let pattern = Pattern::new("path/*/foo*/*-main.txt").unwrap();
        let buckets = pattern.filter(paths).unwrap();
        assert_eq!(buckets, vec![(Binding::new(), vec!["path/a/foo2/z-main.txt".to_string()])]);

        let none = Pattern::new("nothing/*").unwrap().filter(paths).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn star_does_not_cross_directories() {
        let pattern = Pattern::new("*.txt").unwrap();
        assert!(pattern.is_match("a.txt").unwrap());
        assert!(!pattern.is_match("sub/a.txt").unwrap());
        let pattern = Pattern::new("**.txt").unwrap();
        assert!(pattern.is_match("sub/a.txt").unwrap());
    }

    #[test]
    fn binding_specializes() {
        let pattern = Pattern::new("${*dir}/b?r${*id}.csv").unwrap();
        let bound = pattern
            .bind(&Binding::from([("dir".into(), "a".into())]))
            .unwrap();
        assert_eq!(bound.as_str(), "a/b?r${*id}.csv");
        assert_eq!(bound.names(), ["id"]);
        assert_eq!(bound.tokens()[0], Token::Literal("a/b".into()));

        let literal = bound.bind(&Binding::from([("id".into(), "1".into())])).unwrap();
        assert_eq!(literal.as_str(), "a/b?r1.csv");
        assert!(literal.names().is_empty());
    }

    #[test]
    fn bound_values_are_literal() {
        let pattern = Pattern::new("${*x}.txt").unwrap();
        let bound = pattern.bind(&Binding::from([("x".into(), "a*".into())])).unwrap();
        assert!(bound.is_match("a*.txt").unwrap());
        assert!(!bound.is_match("ab.txt").unwrap());
    }

    #[test]
    fn globstar_inside_component() {
        assert_eq!(globstar_components("a/**/b"), "a/**/b");
        assert_eq!(globstar_components("a/**.txt"), "a/*.txt");
        assert_eq!(globstar_components("x**y/**"), "x*y/**");
    }
}
