use crate::model::{
    Edge, EdgeType, Language, Node, NodeMetadata, NodeType, ResolveReport,
};
use crate::store::Store;
use crate::util;
use anyhow::Result;
use std::collections::{HashMap, HashSet};

/// A resolution wins outright only when it beats the runner-up by more
/// than this margin; anything closer is recorded as ambiguous.
const AMBIGUITY_GAP: i64 = 10;

const MAX_AMBIGUOUS_CANDIDATES: usize = 5;

/// Whole-graph pass binding `ref:<kind>:<name>` edges to concrete node
/// identities. Indices are built once per run against a consistent
/// snapshot; updates flow back through the store per edge.
pub fn resolve(store: &Store) -> Result<ResolveReport> {
    let nodes = store.all_nodes()?;
    let exports = build_file_exports(&nodes);
    let index = SymbolIndex::build(&nodes, &exports);
    let imports = build_file_imports(&nodes);
    let node_by_id: HashMap<&str, &Node> =
        nodes.iter().map(|node| (node.id.as_str(), node)).collect();
    let no_imports: Vec<ImportEntry> = Vec::new();

    let mut report = ResolveReport::default();
    for edge in store.unresolved_edges()? {
        let source = node_by_id.get(edge.source_id.as_str()).copied();
        let file_imports = source
            .map(|node| {
                imports
                    .get(node.file_path.as_str())
                    .map(|entries| entries.as_slice())
                    .unwrap_or(&[])
            })
            .unwrap_or(&no_imports);
        match resolve_edge(&edge, source, &index, file_imports) {
            Outcome::Resolved(target_id) => {
                store.update_edge_target(&edge.id, &target_id, false)?;
                report.resolved += 1;
            }
            Outcome::Ambiguous(candidates) => {
                let mut metadata = edge.metadata.clone();
                metadata.ambiguous_candidates = Some(candidates);
                store.update_edge_metadata(&edge.id, &metadata)?;
                report.ambiguous += 1;
            }
            Outcome::Unresolved => report.unresolved += 1,
        }
    }
    Ok(report)
}

enum Outcome {
    Resolved(String),
    Ambiguous(Vec<String>),
    Unresolved,
}

fn resolve_edge(
    edge: &Edge,
    source: Option<&Node>,
    index: &SymbolIndex,
    imports: &[ImportEntry],
) -> Outcome {
    let Some(target_name) = edge.metadata.target_name.as_deref() else {
        return Outcome::Unresolved;
    };
    let Some(source) = source else {
        return Outcome::Unresolved;
    };
    let cleaned = strip_receiver(target_name);
    let cleaned = crate::extractor::strip_generics(&cleaned).to_string();
    if cleaned.is_empty() {
        return Outcome::Unresolved;
    }

    let mut candidate_ids = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |indices: &[usize]| {
        for idx in indices {
            if seen.insert(*idx) {
                candidate_ids.push(*idx);
            }
        }
    };

    push(index.lookup(&cleaned));
    if cleaned.contains('.') {
        let segments: Vec<&str> = cleaned.split('.').collect();
        if let Some(last) = segments.last() {
            push(index.lookup(last));
        }
        if segments.len() >= 2 {
            let owner_member = segments[segments.len() - 2..].join(".");
            push(index.lookup(&owner_member));
        }
    }
    for entry in imports {
        let matches_alias = entry.alias_or_name == cleaned
            || cleaned
                .strip_prefix(&entry.alias_or_name)
                .map(|rest| rest.starts_with('.'))
                .unwrap_or(false);
        if !matches_alias {
            continue;
        }
        for idx in index.lookup(&entry.original) {
            let candidate = &index.candidates[*idx];
            if module_match(
                &entry.specifier,
                entry.is_relative,
                &source.file_path,
                &candidate.file_path,
            ) && seen.insert(*idx)
            {
                candidate_ids.push(*idx);
            }
        }
    }

    let mut scored: Vec<(&Candidate, i64)> = candidate_ids
        .into_iter()
        .map(|idx| &index.candidates[idx])
        .filter(|candidate| compatible(edge.edge_type, candidate.node_type))
        .map(|candidate| {
            let score = score_candidate(candidate, source, &cleaned, imports);
            (candidate, score)
        })
        .collect();

    if scored.is_empty() {
        return Outcome::Unresolved;
    }
    if scored.len() == 1 {
        return Outcome::Resolved(scored[0].0.node_id.clone());
    }

    scored.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| a.0.full_name.cmp(&b.0.full_name))
            .then_with(|| a.0.file_path.cmp(&b.0.file_path))
    });
    let top = scored[0].1;
    let second = scored[1].1;
    if top > second + AMBIGUITY_GAP {
        return Outcome::Resolved(scored[0].0.node_id.clone());
    }
    let candidates = scored
        .iter()
        .take(MAX_AMBIGUOUS_CANDIDATES)
        .map(|(candidate, _)| format!("{} ({})", candidate.full_name, candidate.file_path))
        .collect();
    Outcome::Ambiguous(candidates)
}

fn score_candidate(
    candidate: &Candidate,
    source: &Node,
    cleaned: &str,
    imports: &[ImportEntry],
) -> i64 {
    let mut score = 0;
    if candidate.file_path == source.file_path {
        score += 100;
    }
    if util::dirname(&candidate.file_path) == util::dirname(&source.file_path) {
        score += 50;
    }
    if candidate.language == source.language {
        score += 30;
    }
    if candidate.full_name == cleaned || candidate.name == cleaned {
        score += 40;
    }
    if candidate.exported {
        score += 20;
    }
    if imports.iter().any(|entry| {
        module_match(
            &entry.specifier,
            entry.is_relative,
            &source.file_path,
            &candidate.file_path,
        )
    }) {
        score += 60;
    }
    if cleaned.contains('.') && candidate.full_name.contains('.') {
        let target_owner = owner_of(cleaned);
        let candidate_owner = owner_of(&candidate.full_name);
        if !target_owner.is_empty() && target_owner.eq_ignore_ascii_case(candidate_owner) {
            score += 35;
        }
    }
    score
}

fn owner_of(dotted: &str) -> &str {
    match dotted.rfind('.') {
        Some(idx) => &dotted[..idx],
        None => "",
    }
}

/// Receiver prefixes never name the defining scope; strip them before
/// lookup.
fn strip_receiver(name: &str) -> String {
    let mut current = name.trim();
    loop {
        let mut stripped = false;
        for prefix in ["this.", "self.", "super."] {
            if let Some(rest) = current.strip_prefix(prefix) {
                current = rest;
                stripped = true;
            }
        }
        if !stripped {
            return current.to_string();
        }
    }
}

/// Edge-type / node-type compatibility. Unknown edge types pass.
fn compatible(edge_type: EdgeType, node_type: NodeType) -> bool {
    match edge_type {
        EdgeType::Calls => matches!(
            node_type,
            NodeType::Function | NodeType::Method | NodeType::Endpoint
        ),
        EdgeType::Uses => matches!(
            node_type,
            NodeType::Variable
                | NodeType::Class
                | NodeType::Interface
                | NodeType::Function
                | NodeType::Method
        ),
        EdgeType::Extends => matches!(node_type, NodeType::Class | NodeType::Interface),
        EdgeType::Implements => matches!(node_type, NodeType::Interface),
        EdgeType::Imports => matches!(
            node_type,
            NodeType::Module
                | NodeType::File
                | NodeType::Class
                | NodeType::Function
                | NodeType::Variable
        ),
        EdgeType::Autowires | EdgeType::Injects => matches!(
            node_type,
            NodeType::Class
                | NodeType::Interface
                | NodeType::Service
                | NodeType::Repository
                | NodeType::Component
                | NodeType::Controller
        ),
        _ => true,
    }
}

struct Candidate {
    node_id: String,
    /// Short name: last dotted segment.
    name: String,
    /// The node's name as written, dotted for members.
    full_name: String,
    node_type: NodeType,
    file_path: String,
    language: Language,
    exported: bool,
}

/// Multi-map over several textual forms of each indexable node: short
/// name, full dotted name, and Owner.member for deeper qualifications.
struct SymbolIndex {
    candidates: Vec<Candidate>,
    by_key: HashMap<String, Vec<usize>>,
}

impl SymbolIndex {
    fn build(nodes: &[Node], exports: &HashMap<String, HashSet<String>>) -> SymbolIndex {
        let mut candidates = Vec::new();
        let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
        for node in nodes {
            if matches!(node.node_type, NodeType::File | NodeType::Import) {
                continue;
            }
            let short = node
                .name
                .rsplit('.')
                .next()
                .unwrap_or(&node.name)
                .to_string();
            let exported = node.metadata.is_exported()
                || exports
                    .get(node.file_path.as_str())
                    .map(|names| names.contains(&short) || names.contains(&node.name))
                    .unwrap_or(false);
            let idx = candidates.len();
            candidates.push(Candidate {
                node_id: node.id.clone(),
                name: short.clone(),
                full_name: node.name.clone(),
                node_type: node.node_type,
                file_path: node.file_path.clone(),
                language: node.language,
                exported,
            });

            let mut keys: Vec<String> = vec![short, node.name.clone()];
            let segments: Vec<&str> = node.name.split('.').collect();
            if segments.len() > 2 {
                keys.push(segments[segments.len() - 2..].join("."));
            }
            let mut seen = HashSet::new();
            for key in keys {
                if key.is_empty() || !seen.insert(key.clone()) {
                    continue;
                }
                by_key.entry(key).or_default().push(idx);
            }
        }
        SymbolIndex { candidates, by_key }
    }

    fn lookup(&self, key: &str) -> &[usize] {
        self.by_key
            .get(key)
            .map(|indices| indices.as_slice())
            .unwrap_or(&[])
    }
}

struct ImportEntry {
    /// The local binding: alias when present, imported name otherwise.
    alias_or_name: String,
    /// The name as exported by the source module.
    original: String,
    specifier: String,
    is_relative: bool,
}

fn build_file_imports(nodes: &[Node]) -> HashMap<String, Vec<ImportEntry>> {
    let mut map: HashMap<String, Vec<ImportEntry>> = HashMap::new();
    for node in nodes {
        if node.node_type != NodeType::Import {
            continue;
        }
        let NodeMetadata::Import(meta) = &node.metadata else {
            continue;
        };
        let specifier = meta
            .module_specifier
            .clone()
            .unwrap_or_else(|| node.name.clone());
        let entries = map.entry(node.file_path.clone()).or_default();
        for named in &meta.named_imports {
            entries.push(ImportEntry {
                alias_or_name: named.alias.clone().unwrap_or_else(|| named.name.clone()),
                original: named.name.clone(),
                specifier: specifier.clone(),
                is_relative: meta.is_relative,
            });
        }
        if let Some(default) = &meta.default_import {
            entries.push(ImportEntry {
                alias_or_name: default.clone(),
                original: default.clone(),
                specifier: specifier.clone(),
                is_relative: meta.is_relative,
            });
        }
        // `import pkg.mod as alias`: the module itself is the binding.
        if meta.import_type.as_deref() == Some("module") {
            entries.push(ImportEntry {
                alias_or_name: meta.alias.clone().unwrap_or_else(|| node.name.clone()),
                original: node.name.clone(),
                specifier: specifier.clone(),
                is_relative: meta.is_relative,
            });
        }
    }
    map
}

fn build_file_exports(nodes: &[Node]) -> HashMap<String, HashSet<String>> {
    let mut map: HashMap<String, HashSet<String>> = HashMap::new();
    for node in nodes {
        if node.node_type != NodeType::Export {
            continue;
        }
        let NodeMetadata::Export(meta) = &node.metadata else {
            continue;
        };
        let entry = map.entry(node.file_path.clone()).or_default();
        for name in &meta.named_exports {
            entry.insert(name.clone());
        }
    }
    map
}

/// Does a module specifier plausibly point at a candidate file?
/// Non-relative specifiers match by substring (separators preserved,
/// dotted module paths also tried slashed). Relative specifiers are
/// normalised against the source file's directory and compared with and
/// without extension, as a prefix or a full match.
pub(crate) fn module_match(
    specifier: &str,
    is_relative: bool,
    source_file: &str,
    candidate_file: &str,
) -> bool {
    if specifier.is_empty() {
        return false;
    }
    let relative = is_relative || specifier.starts_with('.');
    if !relative {
        if candidate_file.contains(specifier) {
            return true;
        }
        if !specifier.contains('/') && specifier.contains('.') {
            let slashed = specifier.replace('.', "/");
            return candidate_file.contains(&slashed);
        }
        return false;
    }

    let Some(normalized) = normalize_relative(specifier, util::dirname(source_file)) else {
        return false;
    };
    if normalized.is_empty() {
        return false;
    }
    let candidate_no_ext = strip_extension(candidate_file);
    candidate_file == normalized
        || candidate_no_ext == normalized
        || candidate_file.starts_with(&format!("{normalized}/"))
}

fn strip_extension(path: &str) -> &str {
    match path.rfind('/') {
        Some(slash) => match path[slash..].rfind('.') {
            Some(dot) => &path[..slash + dot],
            None => path,
        },
        None => match path.rfind('.') {
            Some(dot) => &path[..dot],
            None => path,
        },
    }
}

/// Resolve `./x`, `../x`, `.m`, `..m` against a base directory.
fn normalize_relative(specifier: &str, base_dir: &str) -> Option<String> {
    let mut dir: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();

    let (updirs, remainder, separator) = if specifier.contains('/') {
        let mut rest = specifier;
        let mut ups = 0usize;
        if let Some(r) = rest.strip_prefix("./") {
            rest = r;
        }
        while let Some(r) = rest.strip_prefix("../") {
            ups += 1;
            rest = r;
        }
        (ups, rest, '/')
    } else if specifier.starts_with('.') {
        // Python-style dotted relative: one leading dot is the current
        // package, each further dot one level up.
        let dots = specifier.chars().take_while(|ch| *ch == '.').count();
        (dots - 1, &specifier[dots..], '.')
    } else {
        (0, specifier, '/')
    };

    for _ in 0..updirs {
        dir.pop()?;
    }
    for segment in remainder.split(separator) {
        match segment {
            "" | "." => {}
            ".." => {
                dir.pop()?;
            }
            other => dir.push(other),
        }
    }
    Some(dir.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receiver_prefixes_are_stripped() {
        assert_eq!(strip_receiver("this.repo.save"), "repo.save");
        assert_eq!(strip_receiver("self.compute"), "compute");
        assert_eq!(strip_receiver("super.init"), "init");
        assert_eq!(strip_receiver("plain"), "plain");
    }

    #[test]
    fn relative_specifiers_normalize_against_source_dir() {
        assert_eq!(
            normalize_relative("./util", "src/api").as_deref(),
            Some("src/api/util")
        );
        assert_eq!(
            normalize_relative("../shared/types", "src/api").as_deref(),
            Some("src/shared/types")
        );
        assert_eq!(normalize_relative(".m", "pkg").as_deref(), Some("pkg/m"));
        assert_eq!(normalize_relative("..m", "pkg/sub").as_deref(), Some("pkg/m"));
        assert_eq!(normalize_relative(".", "pkg").as_deref(), Some("pkg"));
        assert_eq!(normalize_relative("../../x", "a").as_deref(), None);
    }

    #[test]
    fn module_match_covers_both_styles() {
        assert!(module_match("./m", true, "pkg/n.ts", "pkg/m.ts"));
        assert!(module_match(".m", true, "pkg/n.py", "pkg/m.py"));
        assert!(module_match("pkg.m", false, "other/x.py", "src/pkg/m.py"));
        assert!(module_match("shared/util", false, "a.ts", "src/shared/util.ts"));
        assert!(!module_match("./m", true, "pkg/n.ts", "other/m.ts"));
        assert!(!module_match("missing", false, "a.ts", "src/b.ts"));
    }

    #[test]
    fn compatibility_filters_by_edge_type() {
        assert!(compatible(EdgeType::Calls, NodeType::Function));
        assert!(compatible(EdgeType::Calls, NodeType::Endpoint));
        assert!(!compatible(EdgeType::Calls, NodeType::Class));
        assert!(compatible(EdgeType::Implements, NodeType::Interface));
        assert!(!compatible(EdgeType::Implements, NodeType::Class));
        assert!(compatible(EdgeType::Autowires, NodeType::Service));
        assert!(!compatible(EdgeType::Autowires, NodeType::Function));
        // Unknown pairings pass through.
        assert!(compatible(EdgeType::MapsTo, NodeType::Endpoint));
    }

    #[test]
    fn extension_stripping_ignores_directory_dots() {
        assert_eq!(strip_extension("pkg/m.py"), "pkg/m");
        assert_eq!(strip_extension("a.ts"), "a");
        assert_eq!(strip_extension("v1.2/mod"), "v1.2/mod");
    }
}
