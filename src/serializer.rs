//! Query serializer: flattens a query tree into the search backend's boolean query string.
//!
//! Grammar produced:
//!
//! ```text
//! group  := "(" expr (" AND " | " OR ") expr ... ")"   -- two or more non-empty children
//!         | expr                                         -- exactly one non-empty child
//!         | ""                                           -- no non-empty children
//! leaf   := field ":" querystring | querystring
//!         | field ":[" start " TO " end "]"              -- open bounds render as *
//!         | "_exists_:" field | "-_exists_:" field
//! ```

use crate::ast::{Group, Leaf, LeafValue, Node, NodeId, Operator, QueryTree, Term};

/// Field name the backend uses for presence checks.
pub const EXISTS_FIELD: &str = "_exists_";
/// Field name the backend uses for absence checks.
pub const NOT_EXISTS_FIELD: &str = "-_exists_";

/// Characters with a meaning in the backend grammar, escaped inside user values.
const RESERVED: &[char] = &[
    '\\', '+', '-', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', ':', '/', '&', '|',
];

/// A structural simplification applied while serializing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Simplification {
    /// The group had nothing to render and was left out.
    EmptyGroupSkipped { group: NodeId },
    /// The group had a single renderable child and was rendered without parentheses.
    SingleChildUnwrapped { group: NodeId, child: NodeId },
}

/// Serialized query with the simplifications applied to produce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeResult {
    pub query: String,
    pub simplifications: Vec<Simplification>,
}

/// Serializes the whole tree.
pub fn serialize(tree: &QueryTree) -> String {
    serialize_group(tree.root())
}

pub fn serialize_group(group: &Group) -> String {
    render_group(group, &mut Vec::new())
}

pub fn serialize_with_report(tree: &QueryTree) -> SerializeResult {
    let mut simplifications = Vec::new();
    let query = render_group(tree.root(), &mut simplifications);
    SerializeResult {
        query,
        simplifications,
    }
}

pub fn render_node(node: &Node) -> String {
    match node {
        Node::Leaf(leaf) => render_leaf(leaf),
        Node::Group(group) => serialize_group(group),
    }
}

fn render_group(group: &Group, report: &mut Vec<Simplification>) -> String {
    let mut parts: Vec<(String, &NodeId)> = group
        .children
        .iter()
        .map(|child| {
            let rendered = match child {
                Node::Leaf(leaf) => render_leaf(leaf),
                Node::Group(inner) => render_group(inner, report),
            };
            (rendered, child.id())
        })
        .filter(|(rendered, _)| !rendered.is_empty())
        .collect();

    match parts.len() {
        0 => {
            report.push(Simplification::EmptyGroupSkipped {
                group: group.id.clone(),
            });
            String::new()
        }
        1 => {
            let (rendered, child) = parts.remove(0);
            report.push(Simplification::SingleChildUnwrapped {
                group: group.id.clone(),
                child: child.clone(),
            });
            rendered
        }
        _ => {
            let separator = format!(" {} ", group.kind);
            let joined = parts
                .into_iter()
                .map(|(rendered, _)| rendered)
                .collect::<Vec<_>>()
                .join(&separator);
            format!("({})", joined)
        }
    }
}

/// Renders one leaf; an empty string means the leaf has nothing to search for.
pub fn render_leaf(leaf: &Leaf) -> String {
    let field = leaf.field.as_deref().map(str::trim).filter(|f| !f.is_empty());

    match leaf.operator {
        Some(Operator::Exists) => field
            .map(|f| format!("{}:{}", EXISTS_FIELD, f))
            .unwrap_or_default(),
        Some(Operator::NotExists) => field
            .map(|f| format!("{}:{}", NOT_EXISTS_FIELD, f))
            .unwrap_or_default(),
        _ => {
            let value = match &leaf.value {
                LeafValue::Range { start, end } => range_expression(start.as_deref(), end.as_deref()),
                LeafValue::Text(_) => group_multi_word(leaf.querystring.trim()),
            };
            match (field, value.is_empty()) {
                (_, true) => String::new(),
                (Some(f), false) => format!("{}:{}", f, value),
                (None, false) => value,
            }
        }
    }
}

/// `[start TO end]`, with `*` standing in for a missing bound.
///
/// Bounds that would not lex as a single word (spaces, delimiters, keywords) are quoted.
pub fn range_expression(start: Option<&str>, end: Option<&str>) -> String {
    let bound = |b: Option<&str>| match b.map(str::trim).filter(|s| !s.is_empty()) {
        None => "*".to_string(),
        Some(b) if needs_quoting(b) => format!("\"{}\"", escape_phrase(b)),
        Some(b) => b.to_string(),
    };
    format!("[{} TO {}]", bound(start), bound(end))
}

fn needs_quoting(bound: &str) -> bool {
    matches!(bound, "TO" | "AND" | "OR" | "NOT" | "&&" | "||")
        || bound.chars().any(|c| {
            c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | ':' | '"' | '\\')
        })
}

/// Wraps a multi-word querystring in parentheses so a field applies to every word.
fn group_multi_word(querystring: &str) -> String {
    if querystring.is_empty() || !querystring.contains(char::is_whitespace) {
        return querystring.to_string();
    }
    if is_phrase(querystring) || is_parenthesized(querystring) {
        return querystring.to_string();
    }
    format!("({})", querystring)
}

/// A single quoted phrase: no unescaped quote inside, and the closing quote is not escaped.
fn is_phrase(s: &str) -> bool {
    let Some(inner) = s.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) else {
        return false;
    };
    let mut escaped = false;
    for c in inner.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return false,
            _ => escaped = false,
        }
    }
    !escaped
}

/// Escapes backslashes, then quotes, so `value` can sit between double quotes.
fn escape_phrase(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Reverses the backslash escapes of a quoted phrase's content.
pub fn unescape_phrase(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn is_parenthesized(s: &str) -> bool {
    if !(s.starts_with('(') && s.ends_with(')')) {
        return false;
    }
    // "(a) AND (b)" starts and ends with parens but is not one group
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != s.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

/// Computes the querystring a leaf sends for `term`.
pub fn build_querystring(term: &Term) -> String {
    match (&term.value, term.operator) {
        (_, Some(Operator::Exists)) | (_, Some(Operator::NotExists)) => {
            term.field.clone().unwrap_or_default()
        }
        (LeafValue::Range { start, end }, _) => range_expression(start.as_deref(), end.as_deref()),
        (LeafValue::Text(value), None) | (LeafValue::Text(value), Some(Operator::Range)) => {
            value.trim().to_string()
        }
        (LeafValue::Text(value), Some(Operator::Exact)) => exact_phrase(value),
        (LeafValue::Text(value), Some(operator)) => wildcard_querystring(value, operator),
    }
}

/// Quotes a value for exact matching.
pub fn exact_phrase(value: &str) -> String {
    let trimmed = value.trim();
    if is_phrase(trimmed) {
        // already quoted and escaped
        return if trimmed.len() > 2 { trimmed.to_string() } else { String::new() };
    }
    if trimmed.is_empty() {
        return String::new();
    }
    format!("\"{}\"", escape_phrase(trimmed))
}

/// Wildcards every word of `value` on its own.
///
/// Multi-word wildcards do not match reliably in the backend, so
/// `perennial allergic` becomes `*perennial* *allergic*` rather than `*perennial allergic*`.
pub fn wildcard_querystring(value: &str, operator: Operator) -> String {
    value
        .split_whitespace()
        .map(|word| word.replace(',', ""))
        .filter(|word| !word.is_empty())
        .map(|word| {
            let word = encode_term(&word);
            match operator {
                Operator::StartsWith => format!("{}*", word),
                Operator::EndsWith => format!("*{}", word),
                _ => format!("*{}*", word),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escapes reserved characters so the value is searched literally.
pub fn encode_term(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Strips quotes or wildcards from a querystring, recovering what the user typed.
pub fn strip_search_term(querystring: &str) -> String {
    let s = querystring.trim();
    if is_phrase(s) {
        return unescape_phrase(&s[1..s.len() - 1]);
    }
    s.split(' ')
        .map(|word| {
            let word = word.strip_prefix('*').unwrap_or(word);
            word.strip_suffix('*').unwrap_or(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}
