//! Parsed configuration documents with comment-preserving edits

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, ParseError, Result};
use crate::format::Format;
use crate::path::KeyPath;
use crate::render;
use crate::scan::{self, Annotation, Node, NodeKind, Scan};
use crate::value::Value;

const DEFAULT_STEP: usize = 2;

/// One configuration source: original text plus decoded values.
///
/// Documents are immutable. [`with_value`](Self::with_value) and
/// [`without_key`](Self::without_key) return a new, re-parsed document and
/// leave every line they did not target untouched.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    origin: Option<PathBuf>,
    format: Format,
    source: String,
    value: Value,
    scan: Scan,
}

impl ConfigDocument {
    /// Parse content with format auto-detection
    pub fn parse(source: &str) -> std::result::Result<Self, ParseError> {
        Self::parse_as(source, Format::from_content(source))
    }

    /// Parse with explicit format
    pub fn parse_as(source: &str, format: Format) -> std::result::Result<Self, ParseError> {
        let (value, scan) = match format {
            Format::Yaml => parse_yaml(source)?,
            Format::Json => (parse_json(source)?, Scan::default()),
        };

        Ok(Self {
            origin: None,
            format,
            source: source.to_string(),
            value,
            scan,
        })
    }

    /// An empty YAML document.
    pub fn empty() -> Self {
        Self {
            origin: None,
            format: Format::Yaml,
            source: String::new(),
            value: Value::map(),
            scan: Scan::default(),
        }
    }

    /// Build a YAML document from a root mapping.
    pub fn from_value(root: &Value) -> Result<Self> {
        if root.as_map().is_none() {
            return Err(Error::PathSetFailed {
                path: String::new(),
                reason: format!("document root must be a mapping, found {}", root.type_name()),
            });
        }
        Ok(Self::parse_as(&render::document(root, DEFAULT_STEP), Format::Yaml)?)
    }

    /// Tag the document with the file it was read from.
    pub fn with_origin(mut self, path: impl Into<PathBuf>) -> Self {
        self.origin = Some(path.into());
        self
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Get current source
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The decoded root mapping.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        static EMPTY: BTreeMap<String, Value> = BTreeMap::new();
        self.value.as_map().unwrap_or(&EMPTY)
    }

    /// Top-level keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries().keys().map(String::as_str)
    }

    pub fn get(&self, path: &KeyPath) -> Option<&Value> {
        self.value.get_path(path)
    }

    pub fn contains(&self, path: &KeyPath) -> bool {
        self.get(path).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// The node table (block-mapping keys, in source order).
    pub fn nodes(&self) -> &[Node] {
        &self.scan.nodes
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.scan.annotations
    }

    /// Top-level keys carrying a `#!final` marker.
    pub fn final_keys(&self) -> Vec<&str> {
        self.scan
            .nodes
            .iter()
            .filter(|n| n.parent.is_none() && n.is_final)
            .map(|n| n.key.as_str())
            .collect()
    }

    pub fn is_final(&self, key: &str) -> bool {
        self.final_keys().contains(&key)
    }

    /// Row index of the node addressed by `path`, if it is indexed.
    pub fn find_node(&self, path: &KeyPath) -> Option<usize> {
        let (found, matched) = self.deepest_node(path);
        (matched == path.len()).then_some(found).flatten()
    }

    /// Return a copy with `value` stored at `path`.
    ///
    /// Only the lines of the targeted key change. Missing parents are created
    /// as block mappings at the end of the deepest existing parent.
    pub fn with_value(&self, path: &KeyPath, value: Value) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::PathSetFailed {
                path: String::new(),
                reason: "empty key path".to_string(),
            });
        }
        let mut updated = self.value.clone();
        updated.set_path(path, value)?;

        match self.format {
            Format::Json => self.rerender(&updated),
            Format::Yaml => self.edit_yaml(path, &updated),
        }
    }

    /// Return a copy without the key at `path`.
    pub fn without_key(&self, path: &KeyPath) -> Result<Self> {
        let mut updated = self.value.clone();
        if updated.remove_path(path).is_none() {
            return Err(Error::PathNotFound {
                path: path.to_string(),
            });
        }

        if self.format == Format::Json || self.scan.flow_root {
            return self.rerender(&updated);
        }

        let (found, matched) = self.deepest_node(path);
        match found {
            Some(idx) if matched == path.len() => {
                let node = &self.scan.nodes[idx];
                self.splice(node.line, node.end_line, Vec::new())
            }
            // Inside a flow collection or sequence: rewrite the ancestor
            Some(idx) => self.replace_node(idx, &updated),
            None => self.rerender(&updated),
        }
    }

    /// Return a copy with `item` inserted at `index` of the list at `path`.
    ///
    /// In a block sequence only the new item's lines are added, so comments
    /// on the other items stay. Any other shape is rewritten the way
    /// [`with_value`](Self::with_value) would. An index past the end appends.
    pub fn with_list_item(&self, path: &KeyPath, index: usize, item: Value) -> Result<Self> {
        let mut items = self.list_at(path)?;
        let index = index.min(items.len());

        if let Some((item_indent, ranges)) = self.block_items(path, items.len()) {
            let at = ranges
                .get(index)
                .map(|&(start, _)| start)
                .or_else(|| ranges.last().map(|&(_, end)| end));
            if let Some(at) = at {
                let lines = render::children(&Value::List(vec![item]), item_indent, self.step());
                return self.splice(at, at, lines);
            }
        }

        items.insert(index, item);
        self.with_value(path, Value::List(items))
    }

    /// Return a copy without any occurrence of `item` in the list at `path`.
    ///
    /// In a block sequence only the removed items' lines go away. A list
    /// left empty is written as `[]`.
    pub fn without_list_item(&self, path: &KeyPath, item: &Value) -> Result<Self> {
        let items = self.list_at(path)?;
        let remaining: Vec<Value> = items.iter().filter(|v| *v != item).cloned().collect();
        if remaining.len() == items.len() {
            return Err(Error::PathNotFound {
                path: format!("{path}[{item}]"),
            });
        }
        if remaining.is_empty() {
            return self.with_value(path, Value::List(remaining));
        }

        let Some((_, ranges)) = self.block_items(path, items.len()) else {
            return self.with_value(path, Value::List(remaining));
        };
        let dropped: Vec<(usize, usize)> = ranges
            .iter()
            .zip(&items)
            .filter(|(_, value)| *value == item)
            .map(|(&range, _)| range)
            .collect();
        let kept: String = scan::split_lines(&self.source)
            .into_iter()
            .enumerate()
            .filter(|(line, _)| !dropped.iter().any(|&(start, end)| (start..end).contains(line)))
            .map(|(_, text)| text)
            .collect();
        self.reparsed(&kept)
    }

    /// The list stored at `path`; empty when unset.
    fn list_at(&self, path: &KeyPath) -> Result<Vec<Value>> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::List(items)) => Ok(items.clone()),
            Some(other) => Err(Error::PathSetFailed {
                path: path.to_string(),
                reason: format!("expected a list, found {}", other.type_name()),
            }),
        }
    }

    /// Item indent and per-item line ranges of the block sequence at `path`.
    ///
    /// `None` unless the node is a block sequence with exactly `count` items.
    /// An item's range ends at its last content line, so comment lines
    /// between items stay with the item below them.
    fn block_items(&self, path: &KeyPath, count: usize) -> Option<(usize, Vec<(usize, usize)>)> {
        if self.format != Format::Yaml || self.scan.flow_root {
            return None;
        }
        let node = &self.scan.nodes[self.find_node(path)?];
        let NodeKind::Sequence { item_indent } = node.kind else {
            return None;
        };

        let lines = scan::split_lines(&self.source);
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for line in node.line + 1..node.end_line {
            let text = scan::line_text(lines[line]);
            let trimmed = text.trim_start_matches(' ');
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let indent = text.len() - trimmed.len();
            if indent == item_indent && (trimmed == "-" || trimmed.starts_with("- ")) {
                ranges.push((line, line + 1));
            } else if let Some(last) = ranges.last_mut() {
                last.1 = line + 1;
            }
        }
        (!ranges.is_empty() && ranges.len() == count).then_some((item_indent, ranges))
    }

    fn edit_yaml(&self, path: &KeyPath, updated: &Value) -> Result<Self> {
        if self.scan.flow_root {
            return self.rerender(updated);
        }

        let (found, matched) = self.deepest_node(path);
        let Some(idx) = found else {
            // Nothing of the path exists yet: append a new top-level entry
            let segments = path.segments();
            let root_key = KeyPath::from_segments([segments[0].clone()]);
            let value = updated.get_path(&root_key).cloned().unwrap_or_default();
            let indent = self.scan.root_indent.unwrap_or(0);
            let lines = render::entry(&segments[0], &value, indent, self.step());
            let at = scan::split_lines(&self.source).len();
            return self.splice(at, at, lines);
        };

        let node = &self.scan.nodes[idx];
        match node.kind {
            NodeKind::Mapping { child_indent } if matched < path.len() => {
                let segments = &path.segments()[..=matched];
                let child_path = KeyPath::from_segments(segments.iter().cloned());
                let value = updated.get_path(&child_path).cloned().unwrap_or_default();
                let lines = render::entry(&segments[matched], &value, child_indent, self.step());
                self.splice(node.end_line, node.end_line, lines)
            }
            _ => self.replace_node(idx, updated),
        }
    }

    /// Rewrite a node's lines from its value in `updated`.
    fn replace_node(&self, idx: usize, updated: &Value) -> Result<Self> {
        let node = &self.scan.nodes[idx];
        let node_path = self.node_path(idx);
        let value = updated.get_path(&node_path).cloned().unwrap_or_default();

        let lines = scan::split_lines(&self.source);
        let text = scan::line_text(lines[node.line]);
        let head = &text[..node.colon_end];
        let comment = node.comment.map(|col| &text[col..]);

        let mut out = Vec::new();
        match render::scalar(&value) {
            Some(scalar) => {
                let gap = match (node.value_span, node.comment) {
                    (Some((_, end)), Some(col)) => &text[end..col],
                    _ => " ",
                };
                let mut first = format!("{head} {scalar}");
                if let Some(comment) = comment {
                    first.push_str(gap);
                    first.push_str(comment);
                }
                out.push(first);
            }
            None => {
                let mut first = head.to_string();
                if let Some(comment) = comment {
                    first.push(' ');
                    first.push_str(comment);
                }
                out.push(first);
                out.extend(render::children(&value, node.indent + self.step(), self.step()));
            }
        }
        self.splice(node.line, node.end_line, out)
    }

    /// Replace lines `start..end` and re-parse.
    fn splice(&self, start: usize, end: usize, new_lines: Vec<String>) -> Result<Self> {
        let newline = if self.source.contains("\r\n") { "\r\n" } else { "\n" };
        let lines = scan::split_lines(&self.source);

        let mut out = String::with_capacity(self.source.len() + 64);
        for line in &lines[..start] {
            out.push_str(line);
        }
        if !new_lines.is_empty() && !out.is_empty() && !out.ends_with('\n') {
            out.push_str(newline);
        }
        for line in new_lines {
            out.push_str(&line);
            out.push_str(newline);
        }
        for line in &lines[end..] {
            out.push_str(line);
        }

        self.reparsed(&out)
    }

    fn rerender(&self, updated: &Value) -> Result<Self> {
        let text = match self.format {
            Format::Json => {
                let mut text = serde_json::to_string_pretty(&updated.to_json())?;
                text.push('\n');
                text
            }
            Format::Yaml => render::document(updated, self.step()),
        };
        self.reparsed(&text)
    }

    fn reparsed(&self, source: &str) -> Result<Self> {
        let mut doc = Self::parse_as(source, self.format)?;
        doc.origin = self.origin.clone();
        Ok(doc)
    }

    /// Deepest indexed node along `path` and how many segments it matched.
    fn deepest_node(&self, path: &KeyPath) -> (Option<usize>, usize) {
        let mut found = None;
        let mut matched = 0;
        for segment in path.segments() {
            let next = self
                .scan
                .nodes
                .iter()
                .position(|n| n.parent == found && &n.key == segment);
            match next {
                Some(idx) => {
                    found = Some(idx);
                    matched += 1;
                }
                None => break,
            }
        }
        (found, matched)
    }

    fn node_path(&self, idx: usize) -> KeyPath {
        let mut segments = Vec::new();
        let mut current = Some(idx);
        while let Some(i) = current {
            segments.push(self.scan.nodes[i].key.clone());
            current = self.scan.nodes[i].parent;
        }
        segments.reverse();
        KeyPath::from_segments(segments)
    }

    /// Indentation step used by the document, 2 when it cannot be told.
    fn step(&self) -> usize {
        self.scan
            .nodes
            .iter()
            .find_map(|n| match n.kind {
                NodeKind::Mapping { child_indent } if child_indent > n.indent => {
                    Some(child_indent - n.indent)
                }
                NodeKind::Sequence { item_indent } if item_indent > n.indent => {
                    Some(item_indent - n.indent)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_STEP)
    }
}

impl std::fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_yaml(source: &str) -> std::result::Result<(Value, Scan), ParseError> {
    let scan = scan::scan(source)?;
    if !scan.has_content {
        return Ok((Value::map(), scan));
    }
    let value = serde_yaml::from_str::<Value>(source).map_err(|e| ParseError::from_yaml(&e))?;
    Ok((root_mapping(value, first_content_line(source))?, scan))
}

fn parse_json(source: &str) -> std::result::Result<Value, ParseError> {
    if source.trim().is_empty() {
        return Ok(Value::map());
    }
    let value = serde_json::from_str::<Value>(source).map_err(|e| ParseError::from_json(&e))?;
    root_mapping(value, first_content_line(source))
}

fn root_mapping(value: Value, line: usize) -> std::result::Result<Value, ParseError> {
    match value {
        Value::Null => Ok(Value::map()),
        Value::Map(_) => Ok(value),
        other => Err(ParseError::new(
            line,
            1,
            format!("document root must be a mapping, found {}", other.type_name()),
        )),
    }
}

/// 1-based number of the first line that is not blank or a comment.
fn first_content_line(source: &str) -> usize {
    source
        .lines()
        .position(|l| {
            let t = l.trim();
            !t.is_empty() && !t.starts_with('#')
        })
        .map_or(1, |i| i + 1)
}
