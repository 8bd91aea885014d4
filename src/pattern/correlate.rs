use std::collections::BTreeSet;

use super::{Binding, Pattern};
use crate::error::PatternError;

/// One consistent assignment of named wildcards across several patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub binding: Binding,
    /// For each pattern, the sorted paths matching it under `binding`.
    pub matches: Vec<Vec<String>>,
}

impl Correlation {
    /// All matched paths, pattern by pattern.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.matches.iter().flatten().map(String::as_str)
    }
}

/// Correlate several patterns that share named wildcards.
///
/// `candidates[i]` are the paths considered for `patterns[i]`. The first
/// pattern is filtered on its own; each of its bindings is substituted into
/// the remaining patterns, which are then correlated recursively. A binding
/// for which some later pattern has no match at all is dropped.
pub fn correlate(
    patterns: &[Pattern],
    candidates: &[BTreeSet<String>],
) -> Result<Vec<Correlation>, PatternError> {
    if patterns.len() != candidates.len() {
        return Err(PatternError::Candidates(patterns.len(), candidates.len()));
    }

    let Some((first, rest)) = patterns.split_first() else {
        return Ok(Vec::new());
    };

    let mut result = Vec::new();
    for (binding, paths) in first.filter(candidates[0].iter().map(String::as_str))? {
        if rest.is_empty() {
            result.push(Correlation {
                binding,
                matches: vec![paths],
            });
            continue;
        }

        let bound = rest
            .iter()
            .map(|pattern| pattern.bind(&binding))
            .collect::<Result<Vec<_>, _>>()?;

        for tail in correlate(&bound, &candidates[1..])? {
            let mut full = binding.clone();
            full.extend(tail.binding);

            let mut matches = Vec::with_capacity(patterns.len());
            matches.push(paths.clone());
            matches.extend(tail.matches);

            result.push(Correlation {
                binding: full,
                matches,
            });
        }
    }

    Ok(result)
}
