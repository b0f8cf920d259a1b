use crate::model::{
    ContextSnippet, EditingContext, Node, NodeMetadata, NodeType, TargetSlice,
};
use crate::resolver;
use crate::store::Store;
use crate::util;
use anyhow::{bail, Result};
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_MAX_TOKENS: usize = 8000;

const TRUNCATION_INDICATOR: &str = "\n/* ... truncated ... */";

/// Budget shares, applied in order against the remaining budget.
const TARGET_SHARE: usize = 60;
const IMPORTS_SHARE: usize = 30;
const DEPENDENTS_SHARE: usize = 30;
const RELATED_SHARE: usize = 50;

const SIMILAR_MAX_WORDS: usize = 3;
const SIMILAR_PER_WORD: usize = 2;
const SIMILAR_MIN_WORD_LEN: usize = 3;

pub struct ContextRequest<'a> {
    pub file_path: &'a str,
    pub task: Option<&'a str>,
    pub max_tokens: usize,
    pub include_tests: bool,
}

/// Assemble an edit-ready context for a file under a token budget:
/// the target file first, then inlined imported symbols, dependent-file
/// usage snippets, related types, and task-matched similar functions,
/// each slot taking its share of whatever budget is left.
pub fn assemble(
    store: &Store,
    project_root: &Path,
    request: &ContextRequest<'_>,
) -> Result<EditingContext> {
    let abs_path = project_root.join(request.file_path);
    if !abs_path.is_file() {
        bail!("file not found: {}", request.file_path);
    }
    let content = util::read_to_string(&abs_path)?;
    let budget = request.max_tokens;

    let target_budget = budget * TARGET_SHARE / 100;
    let target_file = fit_target(request.file_path, &content, target_budget);
    let mut remaining = budget.saturating_sub(target_file.token_estimate);

    let file_context = store.file_context(request.file_path)?;
    let mut seen_nodes: HashSet<String> = file_context
        .nodes
        .iter()
        .map(|node| node.id.clone())
        .collect();

    let imports_budget = remaining * IMPORTS_SHARE / 100;
    let imports = collect_imports(
        store,
        project_root,
        &file_context.nodes,
        request.file_path,
        imports_budget,
        &mut seen_nodes,
    )?;
    remaining = remaining.saturating_sub(used_tokens(&imports));

    let dependents_budget = remaining * DEPENDENTS_SHARE / 100;
    let dependents = collect_dependents(
        store,
        project_root,
        &file_context.incoming,
        request.include_tests,
        dependents_budget,
    )?;
    remaining = remaining.saturating_sub(used_tokens(&dependents));

    let related_budget = remaining * RELATED_SHARE / 100;
    let related_types = collect_related(
        store,
        project_root,
        &file_context.outgoing,
        related_budget,
        &mut seen_nodes,
    )?;
    remaining = remaining.saturating_sub(used_tokens(&related_types));

    let similar_functions = match request.task {
        Some(task) => collect_similar(
            store,
            project_root,
            task,
            request.file_path,
            remaining,
            &mut seen_nodes,
        )?,
        None => Vec::new(),
    };

    let token_estimate = target_file.token_estimate
        + used_tokens(&imports)
        + used_tokens(&dependents)
        + used_tokens(&related_types)
        + used_tokens(&similar_functions);

    Ok(EditingContext {
        target_file,
        imports,
        dependents,
        related_types,
        similar_functions,
        token_estimate,
        max_tokens: budget,
    })
}

/// The target file gets its slot whole; when over budget it is cut at
/// the last newline within 80% of the char limit and marked.
fn fit_target(file_path: &str, content: &str, token_budget: usize) -> TargetSlice {
    let tokens = util::estimate_tokens(content);
    if tokens <= token_budget {
        return TargetSlice {
            path: file_path.to_string(),
            content: content.to_string(),
            truncated: false,
            token_estimate: tokens,
        };
    }
    let char_limit = token_budget * 4;
    let window = char_limit * 80 / 100;
    let prefix: String = content.chars().take(window).collect();
    let cut = prefix.rfind('\n').unwrap_or(prefix.len());
    let mut truncated = prefix[..cut].to_string();
    truncated.push_str(TRUNCATION_INDICATOR);
    let token_estimate = util::estimate_tokens(&truncated);
    TargetSlice {
        path: file_path.to_string(),
        content: truncated,
        truncated: true,
        token_estimate,
    }
}

fn used_tokens(snippets: &[ContextSnippet]) -> usize {
    snippets.iter().map(|snippet| snippet.token_estimate).sum()
}

/// Inline the source of symbols the target file imports.
fn collect_imports(
    store: &Store,
    project_root: &Path,
    file_nodes: &[Node],
    target_path: &str,
    budget: usize,
    seen: &mut HashSet<String>,
) -> Result<Vec<ContextSnippet>> {
    let mut snippets = Vec::new();
    let mut remaining = budget;
    for node in file_nodes {
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
        let mut imported_names: Vec<String> = meta
            .named_imports
            .iter()
            .map(|named| named.name.clone())
            .collect();
        if let Some(default) = &meta.default_import {
            imported_names.push(default.clone());
        }
        for name in imported_names {
            if name == "*" {
                continue;
            }
            for candidate in store.search_by_name(&name, 20)? {
                if candidate.file_path == target_path || candidate.name != name {
                    continue;
                }
                if !resolver::module_match(
                    &specifier,
                    meta.is_relative,
                    target_path,
                    &candidate.file_path,
                ) {
                    continue;
                }
                if !seen.insert(candidate.id.clone()) {
                    continue;
                }
                if let Some(snippet) =
                    admit_node_snippet(project_root, &candidate, &mut remaining)?
                {
                    snippets.push(snippet);
                }
            }
        }
    }
    Ok(snippets)
}

/// Snippets showing how other files use this one.
fn collect_dependents(
    store: &Store,
    project_root: &Path,
    incoming: &[crate::model::Edge],
    include_tests: bool,
    budget: usize,
) -> Result<Vec<ContextSnippet>> {
    let mut snippets = Vec::new();
    let mut remaining = budget;
    let mut seen_files = HashSet::new();
    for edge in incoming {
        let Some(source) = store.get_node(&edge.source_id)? else {
            continue;
        };
        if !include_tests && is_test_path(&source.file_path) {
            continue;
        }
        if !seen_files.insert(source.file_path.clone()) {
            continue;
        }
        let abs = project_root.join(&source.file_path);
        let Ok(content) = util::read_to_string(&abs) else {
            continue;
        };
        let (start, end) = match edge.metadata.line {
            Some(line) => (line - 3, line + 3),
            None => (source.line_start, (source.line_start + 10).min(source.line_end)),
        };
        let text = util::slice_lines(&content, start, end);
        if text.is_empty() {
            continue;
        }
        let tokens = util::estimate_tokens(&text);
        if tokens > remaining {
            continue;
        }
        remaining -= tokens;
        snippets.push(ContextSnippet {
            name: source.name.clone(),
            path: source.file_path.clone(),
            content: text,
            token_estimate: tokens,
        });
    }
    Ok(snippets)
}

/// Resolved extends/implements/uses targets of the file's nodes.
fn collect_related(
    store: &Store,
    project_root: &Path,
    outgoing: &[crate::model::Edge],
    budget: usize,
    seen: &mut HashSet<String>,
) -> Result<Vec<ContextSnippet>> {
    let mut snippets = Vec::new();
    let mut remaining = budget;
    for edge in outgoing {
        if !matches!(
            edge.edge_type,
            crate::model::EdgeType::Extends
                | crate::model::EdgeType::Implements
                | crate::model::EdgeType::Uses
        ) {
            continue;
        }
        if crate::ids::is_placeholder(&edge.target_id) {
            continue;
        }
        let Some(target) = store.get_node(&edge.target_id)? else {
            continue;
        };
        if !seen.insert(target.id.clone()) {
            continue;
        }
        if let Some(snippet) = admit_node_snippet(project_root, &target, &mut remaining)? {
            snippets.push(snippet);
        }
    }
    Ok(snippets)
}

/// Task keywords drive a name search for comparable functions
/// elsewhere in the project.
fn collect_similar(
    store: &Store,
    project_root: &Path,
    task: &str,
    target_path: &str,
    budget: usize,
    seen: &mut HashSet<String>,
) -> Result<Vec<ContextSnippet>> {
    let words: Vec<&str> = task
        .split_whitespace()
        .filter(|word| word.len() > SIMILAR_MIN_WORD_LEN)
        .take(SIMILAR_MAX_WORDS)
        .collect();
    let mut snippets = Vec::new();
    let mut remaining = budget;
    for word in words {
        let mut admitted = 0;
        for candidate in store.search_by_name(word, 50)? {
            if admitted >= SIMILAR_PER_WORD {
                break;
            }
            if candidate.file_path == target_path {
                continue;
            }
            if !matches!(
                candidate.node_type,
                NodeType::Function | NodeType::Method
            ) {
                continue;
            }
            if !seen.insert(candidate.id.clone()) {
                continue;
            }
            if let Some(snippet) = admit_node_snippet(project_root, &candidate, &mut remaining)? {
                snippets.push(snippet);
                admitted += 1;
            }
        }
    }
    Ok(snippets)
}

fn admit_node_snippet(
    project_root: &Path,
    node: &Node,
    remaining: &mut usize,
) -> Result<Option<ContextSnippet>> {
    let abs = project_root.join(&node.file_path);
    let Ok(content) = util::read_to_string(&abs) else {
        return Ok(None);
    };
    let text = util::slice_lines(&content, node.line_start, node.line_end);
    if text.is_empty() {
        return Ok(None);
    }
    let tokens = util::estimate_tokens(&text);
    if tokens > *remaining {
        return Ok(None);
    }
    *remaining -= tokens;
    Ok(Some(ContextSnippet {
        name: node.name.clone(),
        path: node.file_path.clone(),
        content: text,
        token_estimate: tokens,
    }))
}

pub fn is_test_path(path: &str) -> bool {
    path.contains(".test.") || path.contains(".spec.") || path.contains("__tests__")
}
