//! Python symbol extraction.
//!
//! Every function, async function and class in a source file becomes a
//! [`Symbol`]. Nested definitions are included. Traversal is breadth-first
//! with block-like wrapper nodes flattened, so outer definitions come before
//! the ones nested inside them and siblings keep their source order.

pub mod store;

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use tree_sitter::{Language, Node, Parser};
use walkdir::{DirEntry, WalkDir};

/// Syntax-tree nodes that only group statements. Their children are treated
/// as children of the enclosing node during traversal.
const TRANSPARENT_KINDS: &[&str] = &[
    "block",
    "decorated_definition",
    "else_clause",
    "finally_clause",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
}

impl SymbolKind {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
        }
    }
}

impl fmt::Display for SymbolKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// `name(p1, p2)` for functions, the bare name for classes
    pub signature: String,
    /// Cleaned docstring, empty when the definition has none
    pub docstring: String,
    /// Repository-relative, `/`-separated
    pub path: String,
    /// 1-based line of the `def` or `class` keyword
    pub lineno: usize,
    /// 1-based last line of the definition body
    #[serde(default)]
    pub end_lineno: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to parse {path} at line {line}: {message}")]
pub struct ParseError {
    pub path: String,
    pub line: usize,
    pub message: String,
}

/// A file that could not be read or parsed during a repository scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub symbols: Vec<Symbol>,
    pub failures: Vec<ParseFailure>,
}

/// Extract every definition from Python source.
///
/// Invalid syntax yields a [`ParseError`] for the first error node; no
/// partial symbol list is returned.
#[inline]
pub fn extract_from_source(source: &str, path: &str) -> Result<Vec<Symbol>, ParseError> {
    let parse_error = |line: usize, message: String| ParseError {
        path: path.to_string(),
        line,
        message,
    };

    let language: Language = tree_sitter_python::LANGUAGE.into();
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| parse_error(0, format!("failed to load Python grammar: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| parse_error(0, "parser produced no syntax tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        let (line, message) = first_syntax_error(root, source)
            .unwrap_or_else(|| (1, "invalid syntax".to_string()));
        return Err(parse_error(line, message));
    }
    if let Some((line, keyword)) = first_legacy_statement(root) {
        return Err(parse_error(
            line,
            format!("`{keyword}` statements are not valid Python 3"),
        ));
    }

    let bytes = source.as_bytes();
    let mut symbols = Vec::new();
    let mut queue = VecDeque::from([root]);

    while let Some(node) = queue.pop_front() {
        match node.kind() {
            "function_definition" => {
                if let Some(symbol) = function_symbol(node, bytes, path) {
                    symbols.push(symbol);
                }
            }
            "class_definition" => {
                if let Some(symbol) = class_symbol(node, bytes, path) {
                    symbols.push(symbol);
                }
            }
            _ => {}
        }
        push_children(node, &mut queue);
    }

    debug!("Extracted {} symbols from {}", symbols.len(), path);
    Ok(symbols)
}

/// Read `path` and extract its symbols, recording the path relative to `root`
#[inline]
pub fn extract_from_file(path: &Path, root: &Path) -> crate::Result<Vec<Symbol>> {
    let bytes = fs::read(path)?;
    let source = String::from_utf8_lossy(&bytes);
    let relative = relative_path(path, root);
    Ok(extract_from_source(&source, &relative)?)
}

/// Extract symbols from every `.py` file under `root`.
///
/// Files are visited in sorted order. A file that fails is logged, recorded in
/// [`ParseReport::failures`] and skipped; the scan continues.
#[inline]
pub fn parse_repo(root: &Path) -> ParseReport {
    let mut report = ParseReport::default();

    let files = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_git_dir(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_python_file(entry.path()));

    for entry in files {
        match extract_from_file(entry.path(), root) {
            Ok(symbols) => report.symbols.extend(symbols),
            Err(e) => {
                let path = relative_path(entry.path(), root);
                warn!("Skipping {}: {}", path, e);
                report.failures.push(ParseFailure {
                    path,
                    message: e.to_string(),
                });
            }
        }
    }

    debug!(
        "Parsed repository {}: {} symbols, {} failures",
        root.display(),
        report.symbols.len(),
        report.failures.len()
    );
    report
}

/// Repository-relative path with `/` separators
#[inline]
pub fn relative_path(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn is_git_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == ".git"
}

fn is_python_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("py"))
}

fn push_children<'tree>(node: Node<'tree>, queue: &mut VecDeque<Node<'tree>>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if TRANSPARENT_KINDS.contains(&child.kind()) {
            push_children(child, queue);
        } else {
            queue.push_back(child);
        }
    }
}

fn first_syntax_error(root: Node<'_>, source: &str) -> Option<(usize, String)> {
    let mut stack = vec![root];
    let mut found: Option<Node<'_>> = None;

    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let earlier = found.is_none_or(|current| node.start_byte() < current.start_byte());
            if earlier {
                found = Some(node);
            }
            continue;
        }
        if node.has_error() {
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
    }

    found.map(|node| {
        let line = node.start_position().row + 1;
        let message = if node.is_missing() {
            format!("expected `{}`", node.kind())
        } else {
            let snippet = node
                .utf8_text(source.as_bytes())
                .unwrap_or_default()
                .lines()
                .next()
                .unwrap_or_default()
                .trim();
            if snippet.is_empty() {
                "invalid syntax".to_string()
            } else {
                format!("invalid syntax near `{snippet}`")
            }
        };
        (line, message)
    })
}

/// The grammar still accepts Python 2 `print` and `exec` statements
fn first_legacy_statement(root: Node<'_>) -> Option<(usize, &'static str)> {
    let mut stack = vec![root];
    let mut found: Option<(usize, &'static str)> = None;

    while let Some(node) = stack.pop() {
        let keyword = match node.kind() {
            "print_statement" => Some("print"),
            "exec_statement" => Some("exec"),
            _ => None,
        };
        if let Some(keyword) = keyword {
            let line = node.start_position().row + 1;
            if found.is_none_or(|(first, _)| line < first) {
                found = Some((line, keyword));
            }
            continue;
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }

    found
}

fn function_symbol(node: Node<'_>, source: &[u8], path: &str) -> Option<Symbol> {
    let name = node_text(node.child_by_field_name("name")?, source)?;
    let params = node
        .child_by_field_name("parameters")
        .map(|parameters| positional_or_keyword_params(parameters, source))
        .unwrap_or_default();

    Some(Symbol {
        signature: format!("{name}({})", params.join(", ")),
        docstring: docstring(node, source),
        name: name.to_string(),
        kind: SymbolKind::Function,
        path: path.to_string(),
        lineno: node.start_position().row + 1,
        end_lineno: node.end_position().row + 1,
    })
}

fn class_symbol(node: Node<'_>, source: &[u8], path: &str) -> Option<Symbol> {
    let name = node_text(node.child_by_field_name("name")?, source)?;

    Some(Symbol {
        signature: name.to_string(),
        docstring: docstring(node, source),
        name: name.to_string(),
        kind: SymbolKind::Class,
        path: path.to_string(),
        lineno: node.start_position().row + 1,
        end_lineno: node.end_position().row + 1,
    })
}

/// Names of the parameters that may be passed by position or keyword.
/// Anything before `/` is positional-only; anything from `*`, `*args` or
/// `**kwargs` on is keyword-only or variadic.
fn positional_or_keyword_params(parameters: Node<'_>, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = parameters.walk();

    for param in parameters.named_children(&mut cursor) {
        match param.kind() {
            "identifier" => {
                if let Some(name) = node_text(param, source) {
                    names.push(name.to_string());
                }
            }
            "default_parameter" | "typed_default_parameter" => {
                if let Some(name) = param
                    .child_by_field_name("name")
                    .and_then(|name| node_text(name, source))
                {
                    names.push(name.to_string());
                }
            }
            "typed_parameter" => {
                let mut inner = param.walk();
                let first = param.named_children(&mut inner).next();
                match first {
                    Some(first) if first.kind() == "identifier" => {
                        if let Some(name) = node_text(first, source) {
                            names.push(name.to_string());
                        }
                    }
                    // `*args: T` or `**kwargs: T`
                    _ => break,
                }
            }
            "positional_separator" => names.clear(),
            "keyword_separator" | "list_splat_pattern" | "dictionary_splat_pattern" => break,
            _ => {}
        }
    }

    names
}

fn docstring(definition: Node<'_>, source: &[u8]) -> String {
    let Some(body) = definition.child_by_field_name("body") else {
        return String::new();
    };

    let mut cursor = body.walk();
    let Some(first) = body
        .named_children(&mut cursor)
        .find(|statement| statement.kind() != "comment")
    else {
        return String::new();
    };

    if first.kind() != "expression_statement" || first.named_child_count() != 1 {
        return String::new();
    }

    let mut inner = first.walk();
    let Some(expression) = first.named_children(&mut inner).next() else {
        return String::new();
    };

    let raw = match expression.kind() {
        "string" => string_value(expression, source),
        "concatenated_string" => {
            let mut parts = expression.walk();
            expression
                .named_children(&mut parts)
                .filter(|part| part.kind() == "string")
                .map(|part| string_value(part, source))
                .collect::<Option<Vec<_>>>()
                .map(|parts| parts.concat())
        }
        _ => None,
    };

    raw.map(|doc| clean_docstring(&doc)).unwrap_or_default()
}

/// Value of a plain string literal. Byte strings and f-strings yield `None`.
fn string_value(string: Node<'_>, source: &[u8]) -> Option<String> {
    let mut cursor = string.walk();
    let children: Vec<Node<'_>> = string.children(&mut cursor).collect();
    let start = children.iter().find(|child| child.kind() == "string_start")?;
    let end = children.iter().rev().find(|child| child.kind() == "string_end")?;

    let opener = node_text(*start, source)?;
    let prefix: String = opener
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if prefix.contains('b') || prefix.contains('f') {
        return None;
    }

    let body = source.get(start.end_byte()..end.start_byte())?;
    let body = String::from_utf8_lossy(body);
    if prefix.contains('r') {
        Some(body.into_owned())
    } else {
        Some(unescape(&body))
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            out.push('\\');
            break;
        };
        match escape {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '\n' => {}
            '0'..='7' => {
                let mut value = escape.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|next| next.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            'x' => push_hex_escape(&mut out, &mut chars, escape, 2),
            'u' => push_hex_escape(&mut out, &mut chars, escape, 4),
            'U' => push_hex_escape(&mut out, &mut chars, escape, 8),
            // Named escapes (`\N{...}`) and unknown escapes stay as written
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    out
}

/// Decode exactly `width` hex digits. Short or invalid sequences are kept
/// verbatim.
fn push_hex_escape(
    out: &mut String,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    escape: char,
    width: usize,
) {
    let mut digits = String::with_capacity(width);
    while digits.len() < width {
        match chars.peek() {
            Some(next) if next.is_ascii_hexdigit() => {
                digits.push(*next);
                chars.next();
            }
            _ => break,
        }
    }

    let decoded = if digits.len() == width {
        u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
    } else {
        None
    };
    match decoded {
        Some(c) => out.push(c),
        None => {
            out.push('\\');
            out.push(escape);
            out.push_str(&digits);
        }
    }
}

/// Normalize docstring indentation: the first line is stripped, the common
/// leading whitespace of the remaining lines is removed, and blank lines at
/// either end are dropped.
#[inline]
pub fn clean_docstring(doc: &str) -> String {
    let expanded = expand_tabs(doc);
    let lines: Vec<&str> = expanded.split('\n').collect();

    let margin = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim_start().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    if let Some(first) = lines.first() {
        cleaned.push(first.trim_start().to_string());
    }
    for line in lines.iter().skip(1) {
        let indent = line.len() - line.trim_start().len();
        let stripped = line.get(indent.min(margin)..).unwrap_or_else(|| line.trim_start());
        cleaned.push(stripped.to_string());
    }

    while cleaned.last().is_some_and(|line| line.trim().is_empty()) {
        cleaned.pop();
    }
    let leading_blank = cleaned
        .iter()
        .take_while(|line| line.trim().is_empty())
        .count();

    cleaned[leading_blank..].join("\n")
}

fn expand_tabs(text: &str) -> String {
    const TAB_SIZE: usize = 8;

    let mut out = String::with_capacity(text.len());
    let mut column = 0;
    for c in text.chars() {
        match c {
            '\t' => {
                let spaces = TAB_SIZE - column % TAB_SIZE;
                out.extend(std::iter::repeat_n(' ', spaces));
                column += spaces;
            }
            '\n' | '\r' => {
                out.push(c);
                column = 0;
            }
            _ => {
                out.push(c);
                column += 1;
            }
        }
    }
    out
}

fn node_text<'s>(node: Node<'_>, source: &'s [u8]) -> Option<&'s str> {
    node.utf8_text(source).ok()
}
