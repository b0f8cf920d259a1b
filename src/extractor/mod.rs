use crate::ids::{self, RefKind};
use crate::model::{Edge, EdgeMetadata, EdgeType, Language, Node, NodeMetadata, NodeType};
use crate::util;
use anyhow::{anyhow, Result};
use std::collections::HashSet;

pub mod java;
pub mod python;
pub mod typescript;

/// Output of one extractor invocation. Edge sources always reference
/// nodes produced in the same invocation; targets in other files are
/// `ref:` placeholders.
#[derive(Debug, Default)]
pub struct Extraction {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// One extractor per language family, constructed once and reused
/// across files; tree-sitter parsers are cheap to keep but not to build.
pub struct ExtractorSet {
    typescript: typescript::TypeScriptExtractor,
    python: python::PythonExtractor,
    java: java::JavaExtractor,
}

impl ExtractorSet {
    pub fn new() -> Result<Self> {
        Ok(Self {
            typescript: typescript::TypeScriptExtractor::new()?,
            python: python::PythonExtractor::new()?,
            java: java::JavaExtractor::new()?,
        })
    }

    pub fn extract(
        &mut self,
        language: Language,
        file_path: &str,
        source: &str,
    ) -> Result<Extraction> {
        match language {
            Language::Typescript | Language::Javascript => {
                self.typescript.extract(file_path, source)
            }
            Language::Python => self.python.extract(file_path, source),
            Language::Java => self.java.extract(file_path, source),
        }
        .map_err(|err| anyhow!("extract {file_path}: {err}"))
    }
}

// -- shared construction helpers ---------------------------------------

pub(crate) fn make_node(
    file_path: &str,
    node_type: NodeType,
    name: &str,
    line_start: i64,
    line_end: i64,
    language: Language,
    metadata: NodeMetadata,
) -> Node {
    Node {
        id: ids::node_id(file_path, node_type.as_str(), name, line_start),
        node_type,
        name: name.to_string(),
        file_path: file_path.to_string(),
        line_start,
        line_end,
        language,
        metadata,
    }
}

/// Every file yields exactly one file node covering all its lines.
pub(crate) fn file_node(file_path: &str, source: &str, language: Language) -> Node {
    make_node(
        file_path,
        NodeType::File,
        util::basename(file_path),
        1,
        util::line_count(source),
        language,
        NodeMetadata::File,
    )
}

pub(crate) fn contains_edge(source_id: &str, target_id: &str) -> Edge {
    plain_edge(source_id, target_id, EdgeType::Contains)
}

pub(crate) fn plain_edge(source_id: &str, target_id: &str, edge_type: EdgeType) -> Edge {
    Edge {
        id: ids::edge_id(source_id, target_id, edge_type.as_str()),
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
        edge_type,
        metadata: EdgeMetadata::default(),
    }
}

/// An edge whose target is not yet bound to a node identity. `ref_name`
/// goes into the placeholder; `target_name` is kept verbatim as written
/// at the reference site.
pub(crate) fn ref_edge(
    source_id: &str,
    kind: RefKind,
    ref_name: &str,
    target_name: &str,
    edge_type: EdgeType,
    line: Option<i64>,
) -> Edge {
    let target_id = ids::ref_target(kind, ref_name);
    Edge {
        id: ids::edge_id(source_id, &target_id, edge_type.as_str()),
        source_id: source_id.to_string(),
        target_id,
        edge_type,
        metadata: EdgeMetadata {
            unresolved: true,
            target_name: Some(target_name.to_string()),
            line,
            ..Default::default()
        },
    }
}

/// Per-owner call sink: at most one `calls` edge per distinct call name
/// within a single function body.
pub(crate) struct CallSink<'a> {
    owner_id: &'a str,
    ref_kind: RefKind,
    seen: HashSet<String>,
    pub edges: Vec<Edge>,
}

impl<'a> CallSink<'a> {
    pub fn new(owner_id: &'a str, ref_kind: RefKind) -> Self {
        Self {
            owner_id,
            ref_kind,
            seen: HashSet::new(),
            edges: Vec::new(),
        }
    }

    pub fn add(&mut self, call_name: &str, line: i64) {
        if call_name.is_empty() || !self.seen.insert(call_name.to_string()) {
            return;
        }
        self.edges.push(ref_edge(
            self.owner_id,
            self.ref_kind,
            call_name,
            call_name,
            EdgeType::Calls,
            Some(line),
        ));
    }
}

/// Python identifiers that never produce call edges.
pub(crate) const PYTHON_BUILTINS: &[&str] = &[
    "print", "len", "range", "str", "int", "float", "list", "dict", "set", "tuple", "type",
    "isinstance", "hasattr", "getattr", "setattr", "open", "super", "enumerate", "zip", "map",
    "filter", "sorted", "reversed", "any", "all", "min", "max", "sum", "abs", "round", "format",
    "repr", "id", "hash", "callable", "dir", "vars", "globals", "locals", "input", "eval", "exec",
    "compile",
];

/// Drop a trailing generic argument list: `Base<T, U>` -> `Base`.
pub(crate) fn strip_generics(name: &str) -> &str {
    match name.find('<') {
        Some(idx) => name[..idx].trim_end(),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_sink_dedupes_by_name() {
        let mut sink = CallSink::new("owner", RefKind::Function);
        sink.add("a.greet", 2);
        sink.add("a.greet", 5);
        sink.add("other", 7);
        assert_eq!(sink.edges.len(), 2);
        assert_eq!(sink.edges[0].target_id, "ref:function:a.greet");
        assert_eq!(sink.edges[0].metadata.line, Some(2));
        assert!(sink.edges[0].metadata.unresolved);
    }

    #[test]
    fn generics_are_stripped() {
        assert_eq!(strip_generics("Base<T>"), "Base");
        assert_eq!(strip_generics("Map<String, List<Integer>>"), "Map");
        assert_eq!(strip_generics("Plain"), "Plain");
    }
}
