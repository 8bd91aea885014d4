use std::fmt::{self, Write};

use crate::error::PatternError;

/// One span of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    /// `?`
    Single,
    /// `*`
    Star,
    /// `**`
    GlobStar,
    /// `[...]` or `[!...]`
    Class { negated: bool, body: String },
    /// `${*name}`
    Named(String),
}

impl Token {
    /// Text of this token in a plain glob, named wildcards become `*`.
    pub fn glob_text(&self) -> String {
        match self {
            Token::Named(_) => "*".into(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(text) => f.write_str(text),
            Token::Single => f.write_char('?'),
            Token::Star => f.write_char('*'),
            Token::GlobStar => f.write_str("**"),
            Token::Class { negated: true, body } => write!(f, "[!{body}]"),
            Token::Class { negated: false, body } => write!(f, "[{body}]"),
            Token::Named(name) => write!(f, "${{*{name}}}"),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Split a pattern into tokens. Adjacent literal text is merged into a single
/// token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, PatternError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = source;

    fn flush(tokens: &mut Vec<Token>, literal: &mut String) {
        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(literal)));
        }
    }

    while let Some(ch) = rest.chars().next() {
        let token = match ch {
            '[' => rest[1..].find(']').map(|end| {
                let body = &rest[1..1 + end];
                (2 + end, body)
            }),
            '$' if rest.starts_with("${*") => rest[3..].find('}').map(|end| (4 + end, &rest[3..3 + end])),
            _ => None,
        };

        let (token, len) = match (ch, token) {
            ('[', Some((len, body))) => {
                let (negated, body) = match body.strip_prefix('!') {
                    Some(body) => (true, body),
                    None => (false, body),
                };
                if body.is_empty() {
                    return Err(PatternError::EmptyClass(source.into()));
                }
                let body = body.to_string();
                (Token::Class { negated, body }, len)
            }
            ('$', Some((len, name))) => {
                if !is_identifier(name) {
                    return Err(PatternError::InvalidName(source.into(), name.into()));
                }
                (Token::Named(name.into()), len)
            }
            ('*', _) if rest.starts_with("**") => (Token::GlobStar, 2),
            ('*', _) => (Token::Star, 1),
            ('?', _) => (Token::Single, 1),
            _ => {
                literal.push(ch);
                rest = &rest[ch.len_utf8()..];
                continue;
            }
        };

        flush(&mut tokens, &mut literal);
        tokens.push(token);
        rest = &rest[len..];
    }

    flush(&mut tokens, &mut literal);
    Ok(tokens)
}
