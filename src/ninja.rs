//! A minimal writer for the Ninja build file syntax.
use std::fmt::{self, Write};

use camino::Utf8Path;

use crate::record::{BuildRecord, Pool, Rule};

/// Escape a path for use in a `build` or `default` line.
pub fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        if matches!(ch, '$' | ' ' | ':') {
            out.push('$');
        }
        out.push(ch);
    }
    out
}

pub struct Writer<W> {
    out: W,
}

impl<W: Write> Writer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn newline(&mut self) -> fmt::Result {
        self.out.write_char('\n')
    }

    pub fn comment(&mut self, text: &str) -> fmt::Result {
        for line in text.lines() {
            if line.is_empty() {
                writeln!(self.out, "#")?;
            } else {
                writeln!(self.out, "# {line}")?;
            }
        }
        Ok(())
    }

    pub fn variable(&mut self, key: &str, value: &str, indent: usize) -> fmt::Result {
        if value.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "{:width$}{key} = {value}", "", width = 2 * indent)
    }

    pub fn pool(&mut self, name: &str, pool: &Pool) -> fmt::Result {
        writeln!(self.out, "pool {name}")?;
        self.variable("depth", &pool.depth.to_string(), 1)
    }

    pub fn rule(&mut self, name: &str, rule: &Rule) -> fmt::Result {
        writeln!(self.out, "rule {name}")?;
        self.variable("command", &rule.command, 1)?;
        if let Some(description) = &rule.description {
            self.variable("description", description, 1)?;
        }
        if let Some(depfile) = &rule.depfile {
            self.variable("depfile", depfile, 1)?;
        }
        if let Some(deps) = &rule.deps {
            self.variable("deps", deps, 1)?;
        }
        if let Some(pool) = &rule.pool {
            self.variable("pool", pool, 1)?;
        }
        if rule.generator {
            self.variable("generator", "1", 1)?;
        }
        if rule.restat {
            self.variable("restat", "1", 1)?;
        }
        Ok(())
    }

    pub fn build(&mut self, record: &BuildRecord) -> fmt::Result {
        let mut line = String::from("build");
        push_paths(&mut line, &record.outputs);
        if !record.implicit_outputs.is_empty() {
            line.push_str(" |");
            push_paths(&mut line, &record.implicit_outputs);
        }
        line.push_str(": ");
        line.push_str(&record.rule);
        push_paths(&mut line, &record.inputs);
        if !record.implicit.is_empty() {
            line.push_str(" |");
            push_paths(&mut line, &record.implicit);
        }
        if !record.order_only.is_empty() {
            line.push_str(" ||");
            push_paths(&mut line, &record.order_only);
        }
        writeln!(self.out, "{line}")?;

        if let Some(pool) = &record.pool {
            self.variable("pool", pool, 1)?;
        }
        if let Some(depfile) = &record.depfile {
            self.variable("depfile", depfile, 1)?;
        }
        for (key, value) in &record.variables {
            self.variable(key, value, 1)?;
        }
        Ok(())
    }

    pub fn default<'a, I>(&mut self, paths: I) -> fmt::Result
    where
        I: IntoIterator<Item = &'a Utf8Path>,
    {
        let mut line = String::from("default");
        for path in paths {
            line.push(' ');
            line.push_str(&escape_path(path.as_str()));
        }
        writeln!(self.out, "{line}")
    }
}

fn push_paths<P: AsRef<Utf8Path>>(line: &mut String, paths: &[P]) {
    for path in paths {
        line.push(' ');
        line.push_str(&escape_path(path.as_ref().as_str()));
    }
}
