//! Line scanner building the node table of a YAML document
//!
//! The scanner does not decode values (serde_yaml does that); it records
//! where each block-mapping key lives in the source so that edits can
//! replace exactly the lines of one key. Rows refer to their parent by index,
//! there are no child pointers.
//!
//! Line and column numbers in [`Node`] and [`Annotation`] are 0-based
//! indices into the source lines; [`ParseError`] positions are 1-based.

use std::collections::HashSet;

use crate::error::ParseError;

/// Marker comment that pins a top-level key against later sources.
pub const FINAL_MARKER: &str = "!final";

/// What follows a key's colon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Nothing yet: no inline value and no nested lines seen.
    Empty,
    /// Nested block mapping whose keys sit at `child_indent`.
    Mapping { child_indent: usize },
    /// Block sequence whose `- ` items start at `item_indent`.
    Sequence { item_indent: usize },
    /// Inline scalar (plain, quoted, alias or tagged).
    Scalar,
    /// Inline flow collection (`[...]` or `{...}`), possibly spanning lines.
    Flow,
    /// Literal or folded block scalar (`|` / `>`).
    BlockScalar,
}

impl NodeKind {
    /// Whether nested keys of this node are indexed in the table.
    pub fn indexes_children(&self) -> bool {
        matches!(self, Self::Empty | Self::Mapping { .. })
    }
}

/// One row of the node table: a key of a block mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub key: String,
    pub parent: Option<usize>,
    /// Line holding the key.
    pub line: usize,
    /// One past the last content line belonging to this key.
    pub end_line: usize,
    pub indent: usize,
    /// Byte column just past the `:`.
    pub colon_end: usize,
    /// Byte range of the inline value on the key line, if any.
    pub value_span: Option<(usize, usize)>,
    /// Byte column of the trailing comment's `#`.
    pub comment: Option<usize>,
    pub is_final: bool,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    /// A line holding only a comment.
    FullLine,
    /// A comment after content on the same line.
    Trailing,
}

/// A comment in the source, keyed by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub line: usize,
    pub column: usize,
    /// Comment text including the leading `#`.
    pub text: String,
    pub kind: AnnotationKind,
}

/// Result of scanning one YAML source
#[derive(Debug, Clone, Default)]
pub(crate) struct Scan {
    pub nodes: Vec<Node>,
    pub annotations: Vec<Annotation>,
    /// Indentation of top-level keys.
    pub root_indent: Option<usize>,
    /// Whether any non-comment, non-marker content exists.
    pub has_content: bool,
    /// First content line starts a flow collection instead of a block mapping.
    pub flow_root: bool,
}

/// Split source into lines, keeping line terminators.
pub(crate) fn split_lines(source: &str) -> Vec<&str> {
    source.split_inclusive('\n').collect()
}

/// Strip the line terminator (`\n` or `\r\n`).
pub(crate) fn line_text(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

pub(crate) fn scan(source: &str) -> Result<Scan, ParseError> {
    Scanner::default().run(source)
}

#[derive(Default)]
struct Scanner {
    out: Scan,
    /// Open nodes, innermost last.
    stack: Vec<usize>,
    siblings: HashSet<(Option<usize>, String)>,
    /// Bracket depth of an unterminated flow collection.
    flow_depth: i32,
}

impl Scanner {
    fn run(mut self, source: &str) -> Result<Scan, ParseError> {
        for (idx, raw) in split_lines(source).into_iter().enumerate() {
            self.line(idx, line_text(raw))?;
        }
        Ok(self.out)
    }

    fn line(&mut self, idx: usize, text: &str) -> Result<(), ParseError> {
        let trimmed = text.trim_start_matches([' ', '\t']);
        if trimmed.is_empty() {
            return Ok(());
        }
        let indent = text.len() - trimmed.len();

        // Continuation of a multi-line flow collection
        if self.flow_depth > 0 {
            self.flow_depth += bracket_delta(text, 0);
            self.extend(idx);
            self.annotate_trailing(idx, text, 0);
            return Ok(());
        }

        // Body of a block scalar: comments and keys are literal text here
        if let Some(&top) = self.stack.last() {
            let node = &self.out.nodes[top];
            if node.kind == NodeKind::BlockScalar && indent > node.indent {
                self.extend(idx);
                return Ok(());
            }
        }

        if let Some(tab) = text[..indent].find('\t') {
            return Err(ParseError::new(
                idx + 1,
                tab + 1,
                "tab character used for indentation",
            ));
        }

        if trimmed.starts_with('#') {
            self.out.annotations.push(Annotation {
                line: idx,
                column: indent,
                text: trimmed.to_string(),
                kind: AnnotationKind::FullLine,
            });
            return Ok(());
        }

        if indent == 0 && is_marker(trimmed) {
            return Ok(());
        }

        if !self.out.has_content {
            self.out.has_content = true;
            self.out.flow_root = trimmed.starts_with('{') || trimmed.starts_with('[');
        }

        let is_item = trimmed == "-" || trimmed.starts_with("- ");
        self.pop_to(indent, is_item);
        self.extend(idx);

        let parent = self.stack.last().copied();
        if is_item {
            if let Some(p) = parent {
                if self.out.nodes[p].kind == NodeKind::Empty {
                    self.out.nodes[p].kind = NodeKind::Sequence { item_indent: indent };
                }
            }
            self.annotate_trailing(idx, text, indent);
            return Ok(());
        }

        let accepts_key = match parent {
            None => *self.out.root_indent.get_or_insert(indent) == indent,
            Some(p) => match self.out.nodes[p].kind {
                NodeKind::Empty => true,
                NodeKind::Mapping { child_indent } => child_indent == indent,
                _ => false,
            },
        };

        match parse_key(trimmed).filter(|_| accepts_key) {
            Some((key, colon)) => self.key_line(idx, text, indent, parent, key, indent + colon + 1),
            None => {
                self.annotate_trailing(idx, text, indent);
                Ok(())
            }
        }
    }

    fn key_line(
        &mut self,
        idx: usize,
        text: &str,
        indent: usize,
        parent: Option<usize>,
        key: String,
        colon_end: usize,
    ) -> Result<(), ParseError> {
        if !self.siblings.insert((parent, key.clone())) {
            return Err(ParseError::new(
                idx + 1,
                indent + 1,
                format!("duplicate key `{key}`"),
            ));
        }
        if let Some(p) = parent {
            if self.out.nodes[p].kind == NodeKind::Empty {
                self.out.nodes[p].kind = NodeKind::Mapping { child_indent: indent };
            }
        }

        let rest = &text[colon_end..];
        let value_start = colon_end + (rest.len() - rest.trim_start_matches([' ', '\t']).len());
        let comment = find_comment(text, value_start);
        let value_end = comment.unwrap_or(text.len());
        let inline = text[value_start..value_end].trim_end();
        let value_span = (!inline.is_empty()).then(|| (value_start, value_start + inline.len()));

        let kind = match inline.chars().next() {
            None => NodeKind::Empty,
            Some('|') | Some('>') => NodeKind::BlockScalar,
            Some('[') | Some('{') => {
                self.flow_depth = bracket_delta(text, value_start).max(0);
                NodeKind::Flow
            }
            Some(_) => NodeKind::Scalar,
        };

        let is_final = comment
            .map(|col| text[col + 1..].trim() == FINAL_MARKER)
            .unwrap_or(false);
        if let Some(col) = comment {
            self.push_trailing(idx, col, &text[col..]);
        }

        let node = self.out.nodes.len();
        self.out.nodes.push(Node {
            key,
            parent,
            line: idx,
            end_line: idx + 1,
            indent,
            colon_end,
            value_span,
            comment,
            is_final,
            kind,
        });
        self.stack.push(node);
        Ok(())
    }

    /// Close every open node the line at `indent` is not nested in.
    fn pop_to(&mut self, indent: usize, is_item: bool) {
        while let Some(&top) = self.stack.last() {
            let node = &self.out.nodes[top];
            if indent > node.indent {
                break;
            }
            // Compact sequence: `key:` followed by `- item` at the same indent
            let compact = match node.kind {
                NodeKind::Empty => true,
                NodeKind::Sequence { item_indent } => item_indent == indent,
                _ => false,
            };
            if is_item && indent == node.indent && compact {
                break;
            }
            self.stack.pop();
        }
    }

    fn extend(&mut self, idx: usize) {
        for &open in &self.stack {
            self.out.nodes[open].end_line = idx + 1;
        }
    }

    fn annotate_trailing(&mut self, idx: usize, text: &str, from: usize) {
        if let Some(col) = find_comment(text, from) {
            self.push_trailing(idx, col, &text[col..]);
        }
    }

    fn push_trailing(&mut self, idx: usize, col: usize, comment: &str) {
        self.out.annotations.push(Annotation {
            line: idx,
            column: col,
            text: comment.to_string(),
            kind: AnnotationKind::Trailing,
        });
    }
}

fn is_marker(trimmed: &str) -> bool {
    trimmed == "---"
        || trimmed.starts_with("--- ")
        || trimmed == "..."
        || trimmed.starts_with('%')
}

/// Split a mapping key off the start of a trimmed line.
///
/// Returns the decoded key and the byte offset of its `:` within `trimmed`.
pub(crate) fn parse_key(trimmed: &str) -> Option<(String, usize)> {
    let first = trimmed.chars().next()?;
    match first {
        '"' => {
            let close = closing_double_quote(trimmed)?;
            let raw = &trimmed[..=close];
            let key = serde_json::from_str::<String>(raw)
                .unwrap_or_else(|_| raw[1..raw.len() - 1].to_string());
            colon_after(trimmed, close + 1).map(|colon| (key, colon))
        }
        '\'' => {
            let close = closing_single_quote(trimmed)?;
            let key = trimmed[1..close].replace("''", "'");
            colon_after(trimmed, close + 1).map(|colon| (key, colon))
        }
        '[' | '{' | '#' | '&' | '*' | '!' | '|' | '>' | '%' | '@' | '`' | '?' | '-' | ',' => None,
        _ => {
            let bytes = trimmed.as_bytes();
            for (i, &b) in bytes.iter().enumerate() {
                if b == b'#' && i > 0 && matches!(bytes[i - 1], b' ' | b'\t') {
                    return None;
                }
                if b == b':' && matches!(bytes.get(i + 1), None | Some(b' ') | Some(b'\t')) {
                    let key = trimmed[..i].trim_end();
                    return (!key.is_empty()).then(|| (key.to_string(), i));
                }
            }
            None
        }
    }
}

fn closing_double_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, ch) in s.char_indices().skip(1) {
        match ch {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some(i),
            _ => escaped = false,
        }
    }
    None
}

fn closing_single_quote(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

fn colon_after(s: &str, from: usize) -> Option<usize> {
    let rest = &s[from..];
    let skipped = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    let colon = from + skipped;
    let bytes = s.as_bytes();
    (bytes.get(colon) == Some(&b':')
        && matches!(bytes.get(colon + 1), None | Some(b' ') | Some(b'\t')))
    .then_some(colon)
}

/// Byte column of a trailing comment starting at or after `from`.
///
/// A `#` opens a comment only outside quotes and when it starts the scanned
/// region or follows whitespace.
pub(crate) fn find_comment(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        let token_start = i == from || matches!(bytes[i - 1], b' ' | b'\t' | b'[' | b'{' | b',' | b':');
        match quote {
            Some(b'"') => match b {
                b'\\' => i += 1,
                b'"' => quote = None,
                _ => {}
            },
            Some(_) => {
                if b == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 1;
                    } else {
                        quote = None;
                    }
                }
            }
            None => match b {
                b'"' | b'\'' if token_start => quote = Some(b),
                b'#' if i == from || matches!(bytes[i - 1], b' ' | b'\t') => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Net count of opened flow brackets from `from` to the end of the line.
fn bracket_delta(text: &str, from: usize) -> i32 {
    let end = find_comment(text, from).unwrap_or(text.len());
    let bytes = text.as_bytes();
    let mut depth = 0;
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < end {
        let b = bytes[i];
        match quote {
            Some(b'"') => match b {
                b'\\' => i += 1,
                b'"' => quote = None,
                _ => {}
            },
            Some(_) => {
                if b == b'\'' {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'[' | b'{' => depth += 1,
                b']' | b'}' => depth -= 1,
                _ => {}
            },
        }
        i += 1;
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("channels:", Some(("channels", 8)))]
    #[case("channels: [a]", Some(("channels", 8)))]
    #[case("\"quoted.key\": 1", Some(("quoted.key", 12)))]
    #[case("'it''s': 1", Some(("it's", 7)))]
    #[case("url: http://x:80", Some(("url", 3)))]
    #[case("- item", None)]
    #[case("http://x", None)]
    #[case("plain text # not: a key", None)]
    fn parse_key_cases(#[case] line: &str, #[case] expected: Option<(&str, usize)>) {
        let got = parse_key(line);
        assert_eq!(got.as_ref().map(|(k, c)| (k.as_str(), *c)), expected);
    }

    #[rstest]
    #[case("key: value # note", 0, Some(11))]
    #[case("key: 'a # b'", 0, None)]
    #[case("key: \"a \\\" # b\"  # c", 0, Some(17))]
    #[case("url: http://x/#frag", 0, None)]
    #[case("key: # only", 5, Some(5))]
    fn find_comment_cases(#[case] text: &str, #[case] from: usize, #[case] expected: Option<usize>) {
        assert_eq!(find_comment(text, from), expected);
    }

    #[test]
    fn nested_mapping_spans_children() {
        let src = "proxy_servers:\n  http: a\n  # note\n  https: b\nssl_verify: true\n";
        let scan = scan(src).unwrap();
        let keys: Vec<_> = scan.nodes.iter().map(|n| (n.key.as_str(), n.parent, n.line, n.end_line)).collect();
        assert_eq!(
            keys,
            vec![
                ("proxy_servers", None, 0, 4),
                ("http", Some(0), 1, 2),
                ("https", Some(0), 3, 4),
                ("ssl_verify", None, 4, 5),
            ]
        );
        assert_eq!(scan.nodes[0].kind, NodeKind::Mapping { child_indent: 2 });
    }

    #[test]
    fn sequence_items_are_not_indexed() {
        let src = "channels:\n- a\n- b # second\nenvs_dirs:\n  - x\n";
        let scan = scan(src).unwrap();
        assert_eq!(scan.nodes.len(), 2);
        assert_eq!(scan.nodes[0].end_line, 3);
        assert_eq!(scan.nodes[0].kind, NodeKind::Sequence { item_indent: 0 });
        assert_eq!(scan.nodes[1].kind, NodeKind::Sequence { item_indent: 2 });
        assert_eq!(scan.annotations[0].text, "# second");
    }

    #[test]
    fn multiline_flow_collection_belongs_to_its_key() {
        let src = "channels: [a,\n  b,\n]\nthreads: 2\n";
        let scan = scan(src).unwrap();
        assert_eq!(scan.nodes[0].kind, NodeKind::Flow);
        assert_eq!(scan.nodes[0].end_line, 3);
        assert_eq!(scan.nodes[1].key, "threads");
    }

    #[test]
    fn block_scalar_body_is_opaque() {
        let src = "banner: |\n  # not a comment\n  key: not a key\nother: 1\n";
        let scan = scan(src).unwrap();
        let keys: Vec<_> = scan.nodes.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["banner", "other"]);
        assert!(scan.annotations.is_empty());
        assert_eq!(scan.nodes[0].end_line, 3);
    }

    #[test]
    fn final_marker_is_detected() {
        let scan = scan("channels:  #!final\n  - a\nthreads: 1 # !final\n").unwrap();
        assert!(scan.nodes[0].is_final);
        assert!(scan.nodes[1].is_final);
    }

    #[test]
    fn tab_indentation_is_rejected() {
        let err = scan("a:\n\tb: 1\n").unwrap_err();
        assert_eq!((err.line, err.column), (2, 1));
    }

    #[test]
    fn duplicate_sibling_is_rejected_but_cousins_are_fine() {
        assert!(scan("a:\n  x: 1\nb:\n  x: 2\n").is_ok());
        let err = scan("a:\n  x: 1\n  x: 2\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("duplicate key `x`"));
    }
}
