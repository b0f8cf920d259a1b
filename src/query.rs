use crate::model::{
    CallGraph, ImpactReport, Node, NodeType, RiskLevel, SourceLookup, SourceSlice,
    SymbolReferences, Usage, UsageExample,
};
use crate::store::Store;
use crate::util;
use anyhow::Result;
use std::path::Path;

pub const SEARCH_LIMIT: usize = 100;
pub const DEFAULT_CONTEXT_LINES: i64 = 5;
pub const DEFAULT_MAX_EXAMPLES: usize = 5;

const SUGGESTION_LIMIT: usize = 5;

/// Definitions matching a symbol name plus every edge pointing at them.
pub fn find_references(store: &Store, symbol: &str) -> Result<Vec<SymbolReferences>> {
    let mut results = Vec::new();
    for definition in definitions_for(store, symbol)? {
        let mut usages = Vec::new();
        for edge in store.edges_to(&definition.id)? {
            let Some(source) = store.get_node(&edge.source_id)? else {
                continue;
            };
            usages.push(Usage {
                node: source,
                line: edge.metadata.line,
                edge_type: edge.edge_type,
            });
        }
        results.push(SymbolReferences { definition, usages });
    }
    Ok(results)
}

/// Callers and callees of the first function-like match for the name.
pub fn call_graph(store: &Store, function_name: &str) -> Result<Option<CallGraph>> {
    let matches = definitions_for(store, function_name)?;
    let Some(function) = matches
        .iter()
        .find(|node| node.node_type.is_callable())
        .or_else(|| matches.first())
        .cloned()
    else {
        return Ok(None);
    };
    let callers = store.resolved_callers_of(&function.id)?;
    let callees = store.resolved_callees_of(&function.id)?;
    Ok(Some(CallGraph {
        function,
        callers,
        callees,
    }))
}

/// What breaks when this file changes: exported symbols, files that
/// depend on it, and a coarse risk bucket from the dependent count.
pub fn impact_analysis(store: &Store, file_path: &str) -> Result<ImpactReport> {
    let context = store.file_context(file_path)?;
    let exports: Vec<Node> = context
        .nodes
        .iter()
        .filter(|node| node.metadata.is_exported())
        .cloned()
        .collect();

    let mut dependent_files = Vec::new();
    for edge in &context.incoming {
        let Some(source) = store.get_node(&edge.source_id)? else {
            continue;
        };
        if !dependent_files.contains(&source.file_path) {
            dependent_files.push(source.file_path);
        }
    }
    dependent_files.sort();

    Ok(ImpactReport {
        file_path: file_path.to_string(),
        risk: RiskLevel::from_dependents(dependent_files.len()),
        exports,
        dependent_files,
    })
}

/// Source text of a symbol with surrounding context lines. An unknown
/// name yields suggestions instead of an error.
pub fn source_code(
    store: &Store,
    project_root: &Path,
    symbol_name: Option<&str>,
    node_id: Option<&str>,
    context_lines: i64,
) -> Result<SourceLookup> {
    let node = match node_id {
        Some(id) => store.get_node(id)?,
        None => match symbol_name {
            Some(name) => definitions_for(store, name)?.into_iter().next(),
            None => None,
        },
    };
    let Some(node) = node else {
        let wanted = symbol_name.or(node_id).unwrap_or_default();
        let suggestions = store
            .search_by_name(wanted, SUGGESTION_LIMIT)?
            .into_iter()
            .map(|candidate| format!("{} ({})", candidate.name, candidate.file_path))
            .collect();
        return Ok(SourceLookup::NotFound {
            error: format!("symbol not found: {wanted}"),
            suggestions,
        });
    };

    let content = util::read_to_string(&project_root.join(&node.file_path))?;
    let source = util::slice_lines(&content, node.line_start, node.line_end);
    let context_before = if node.line_start > 1 {
        util::slice_lines(&content, node.line_start - context_lines, node.line_start - 1)
    } else {
        String::new()
    };
    let context_after =
        util::slice_lines(&content, node.line_end + 1, node.line_end + context_lines);
    Ok(SourceLookup::Found(Box::new(SourceSlice {
        start_line: node.line_start,
        end_line: node.line_end,
        symbol: node,
        source,
        context_before,
        context_after,
    })))
}

/// Snippets around each place a symbol is referenced.
pub fn usage_examples(
    store: &Store,
    project_root: &Path,
    symbol_name: &str,
    max_examples: usize,
    context_lines: i64,
) -> Result<Vec<UsageExample>> {
    let Some(definition) = definitions_for(store, symbol_name)?.into_iter().next() else {
        return Ok(Vec::new());
    };
    let mut examples = Vec::new();
    for edge in store.edges_to(&definition.id)? {
        if examples.len() >= max_examples {
            break;
        }
        let Some(source) = store.get_node(&edge.source_id)? else {
            continue;
        };
        if source.node_type == NodeType::File {
            continue;
        }
        let abs = project_root.join(&source.file_path);
        let Ok(content) = util::read_to_string(&abs) else {
            continue;
        };
        let line = edge.metadata.line.unwrap_or(source.line_start);
        let snippet = util::slice_lines(&content, line - context_lines, line + context_lines);
        if snippet.is_empty() {
            continue;
        }
        examples.push(UsageExample {
            file_path: source.file_path.clone(),
            line,
            snippet,
            used_by: source.name.clone(),
        });
    }
    Ok(examples)
}

/// Exact-name definitions: the bare name or any `Owner.name` member.
/// Containers (file/import/export) never count as definitions.
fn definitions_for(store: &Store, symbol: &str) -> Result<Vec<Node>> {
    let suffix = format!(".{symbol}");
    let nodes = store
        .search_by_name(symbol, SEARCH_LIMIT)?
        .into_iter()
        .filter(|node| node.name == symbol || node.name.ends_with(&suffix))
        .filter(|node| {
            !matches!(
                node.node_type,
                NodeType::File | NodeType::Import | NodeType::Export
            )
        })
        .collect();
    Ok(nodes)
}
