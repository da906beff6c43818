//! Checks a hand-edited query string before it replaces the builder's tree.

use crate::ast::QueryTree;
use crate::parser::parse_query;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryStringError {
    pub id: &'static str,
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl QueryStringError {
    fn error(id: &'static str, title: &str, message: impl Into<String>) -> Self {
        Self {
            id,
            severity: Severity::Error,
            title: title.to_string(),
            message: message.into(),
        }
    }

    pub fn unbalanced_punctuation() -> Self {
        Self::error(
            "checkBalancedPunctuation",
            "Unbalanced punctuation",
            "Check for missing parentheses, brackets, quotations or curly braces.",
        )
    }

    pub fn missing_union() -> Self {
        Self::error(
            "checkMissingUnion",
            "Missing union",
            "Check for missing unions (AND, OR) or that all unions are of type (AND, OR) between grouped elements.",
        )
    }

    pub fn unnecessary_unions() -> Self {
        Self::error(
            "unnecessaryUnions",
            "Unnecessary unions",
            "Check for unions (AND, OR, NOT) at the beginning or end of the query.",
        )
    }
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// The formatted query string the checks ran against.
    pub querystring: String,
    pub errors: Vec<QueryStringError>,
    /// The parsed tree, present only when every check passed.
    pub tree: Option<QueryTree>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Collapses runs of whitespace into one space and trims the ends.
pub fn format_query_string(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn validate_query_string(input: &str) -> ValidationReport {
    let querystring = format_query_string(input);
    let mut errors = Vec::new();

    if !check_balanced_punctuation(&querystring) {
        errors.push(QueryStringError::unbalanced_punctuation());
    }
    if !check_missing_union(&querystring) {
        errors.push(QueryStringError::missing_union());
    }
    if !check_leading_trailing_union(&querystring) {
        errors.push(QueryStringError::unnecessary_unions());
    }

    let mut tree = None;
    if errors.is_empty() {
        match parse_query(&querystring) {
            Ok(parsed) => tree = Some(parsed),
            Err(err) => errors.push(QueryStringError::error(
                "parseQueryString",
                "Invalid query",
                err.to_string(),
            )),
        }
    }

    let errors = remove_duplicate_errors(errors);
    debug!(querystring = %querystring, errors = errors.len(), "query string validated");
    ValidationReport {
        querystring,
        errors,
        tree,
    }
}

/// Every `(`, `[` and `{` is closed in order and quotes come in pairs.
/// A backslash escapes the character after it.
pub fn check_balanced_punctuation(s: &str) -> bool {
    let mut stack = Vec::new();
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return false;
                }
            }
            '"' => {
                if stack.last() == Some(&'"') {
                    stack.pop();
                } else {
                    stack.push('"');
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}

fn is_union_word(word: &str) -> bool {
    matches!(word, "AND" | "OR" | "NOT" | "&&" | "||")
}

/// Splits on whitespace, keeping a quoted phrase as one word without its quotes.
fn query_words(s: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        let quoted = rest
            .strip_prefix('"')
            .and_then(|tail| tail.find('"').map(|end| (&tail[..end], &tail[end + 1..])));
        let (word, tail) = match quoted {
            Some(split) => split,
            None => {
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                (&rest[..end], &rest[end..])
            }
        };
        words.push(word);
        rest = tail.trim_start();
    }
    words
}

/// Grouped elements must be joined by a union: no `)(`, nothing but a union or a
/// `field:` before an opening paren, nothing but a union after a closing one.
pub fn check_missing_union(s: &str) -> bool {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.contains(")(") {
        return false;
    }

    let words = query_words(s);
    for (i, word) in words.iter().enumerate() {
        if word.starts_with('(') && i > 0 {
            let previous = words[i - 1];
            if !previous.is_empty() && !previous.ends_with(':') && !is_union_word(previous) {
                return false;
            }
        }
        if word.ends_with(')') {
            if let Some(next) = words.get(i + 1) {
                if !next.is_empty() && !is_union_word(next) {
                    return false;
                }
            }
        }
    }
    true
}

/// The query neither starts nor ends with a union.
pub fn check_leading_trailing_union(s: &str) -> bool {
    let mut words = s.split(' ').filter(|w| !w.is_empty());
    let first = words.next();
    let last = words.last().or(first);
    !(first.is_some_and(is_union_word) || last.is_some_and(is_union_word))
}

/// Drops errors whose title and message already appeared earlier.
pub fn remove_duplicate_errors(errors: Vec<QueryStringError>) -> Vec<QueryStringError> {
    let mut unique: Vec<QueryStringError> = Vec::with_capacity(errors.len());
    for error in errors {
        if !unique
            .iter()
            .any(|seen| seen.title == error.title && seen.message == error.message)
        {
            unique.push(error);
        }
    }
    unique
}
