use code_graph::ids::{self, RefKind};
use code_graph::model::{
    Edge, EdgeMetadata, EdgeType, FunctionMeta, Language, Node, NodeMetadata, NodeType,
};
use code_graph::store::Store;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn temp_store(label: &str) -> (Store, PathBuf) {
    let mut dir = std::env::temp_dir();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("code-graph-{label}-{nanos}-{counter}"));
    std::fs::create_dir_all(&dir).unwrap();
    let store = Store::open(&dir.join("graph.db")).unwrap();
    (store, dir)
}

fn node(file: &str, node_type: NodeType, name: &str, line: i64) -> Node {
    Node {
        id: ids::node_id(file, node_type.as_str(), name, line),
        node_type,
        name: name.to_string(),
        file_path: file.to_string(),
        line_start: line,
        line_end: line + 2,
        language: Language::Typescript,
        metadata: match node_type {
            NodeType::File => NodeMetadata::File,
            NodeType::Function => NodeMetadata::Function(FunctionMeta::default()),
            _ => NodeMetadata::File,
        },
    }
}

fn edge(source: &Node, target_id: &str, edge_type: EdgeType, metadata: EdgeMetadata) -> Edge {
    Edge {
        id: ids::edge_id(&source.id, target_id, edge_type.as_str()),
        source_id: source.id.clone(),
        target_id: target_id.to_string(),
        edge_type,
        metadata,
    }
}

fn call_ref(source: &Node, name: &str) -> Edge {
    edge(
        source,
        &ids::ref_target(RefKind::Function, name),
        EdgeType::Calls,
        EdgeMetadata {
            unresolved: true,
            target_name: Some(name.to_string()),
            line: Some(source.line_start),
            ..Default::default()
        },
    )
}

#[test]
fn upsert_round_trips_nodes_with_metadata() {
    let (store, dir) = temp_store("roundtrip");
    let function = Node {
        metadata: NodeMetadata::Function(FunctionMeta {
            is_exported: true,
            is_async: true,
            ..Default::default()
        }),
        ..node("src/a.ts", NodeType::Function, "go", 3)
    };
    store.upsert_nodes(std::slice::from_ref(&function)).unwrap();

    let loaded = store.get_node(&function.id).unwrap().unwrap();
    assert_eq!(loaded, function);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn delete_by_file_leaves_no_orphan_edges() {
    let (store, dir) = temp_store("orphans");
    let file_a = node("src/a.ts", NodeType::File, "a.ts", 1);
    let func_a = node("src/a.ts", NodeType::Function, "fa", 2);
    let file_b = node("src/b.ts", NodeType::File, "b.ts", 1);
    let func_b = node("src/b.ts", NodeType::Function, "fb", 2);
    store
        .upsert_nodes(&[file_a.clone(), func_a.clone(), file_b.clone(), func_b.clone()])
        .unwrap();
    store
        .upsert_edges(&[
            edge(&file_a, &func_a.id, EdgeType::Contains, EdgeMetadata::default()),
            edge(&file_b, &func_b.id, EdgeType::Contains, EdgeMetadata::default()),
            // Cross-file resolved edge into a.ts and out of a.ts.
            edge(&func_b, &func_a.id, EdgeType::Calls, EdgeMetadata::default()),
            edge(&func_a, &func_b.id, EdgeType::Calls, EdgeMetadata::default()),
        ])
        .unwrap();

    store.delete_by_file("src/a.ts").unwrap();

    assert!(store.get_node(&func_a.id).unwrap().is_none());
    assert!(store.get_node(&file_a.id).unwrap().is_none());
    let remaining = store.all_edges().unwrap();
    for edge in &remaining {
        assert_ne!(edge.source_id, func_a.id);
        assert_ne!(edge.target_id, func_a.id);
        assert_ne!(edge.source_id, file_a.id);
        assert_ne!(edge.target_id, file_a.id);
    }
    // b.ts's own contains edge survives.
    assert_eq!(remaining.len(), 1);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn placeholder_accounting_holds() {
    let (store, dir) = temp_store("accounting");
    let file = node("src/a.ts", NodeType::File, "a.ts", 1);
    let caller = node("src/a.ts", NodeType::Function, "caller", 2);
    let callee = node("src/a.ts", NodeType::Function, "callee", 8);
    store
        .upsert_nodes(&[file.clone(), caller.clone(), callee.clone()])
        .unwrap();
    store
        .upsert_edges(&[
            edge(&file, &caller.id, EdgeType::Contains, EdgeMetadata::default()),
            edge(&file, &callee.id, EdgeType::Contains, EdgeMetadata::default()),
            call_ref(&caller, "callee"),
            call_ref(&caller, "external"),
        ])
        .unwrap();

    let stats = store.resolution_stats().unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.unresolved, 2);
    assert_eq!(stats.resolved, stats.total - stats.unresolved);

    // Resolving one placeholder moves the counter and records the
    // prior target.
    let pending = store.unresolved_edges().unwrap();
    let target = pending
        .iter()
        .find(|e| e.metadata.target_name.as_deref() == Some("callee"))
        .unwrap();
    store
        .update_edge_target(&target.id, &callee.id, false)
        .unwrap();

    let stats = store.resolution_stats().unwrap();
    assert_eq!(stats.unresolved, 1);
    let updated = store.get_edge(&target.id).unwrap().unwrap();
    assert_eq!(updated.target_id, callee.id);
    assert!(!updated.metadata.unresolved);
    assert_eq!(
        updated.metadata.resolved_from.as_deref(),
        Some("ref:function:callee")
    );
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn replace_file_is_idempotent() {
    let (store, dir) = temp_store("idempotent");
    let file = node("src/a.ts", NodeType::File, "a.ts", 1);
    let func = node("src/a.ts", NodeType::Function, "go", 2);
    let nodes = vec![file.clone(), func.clone()];
    let edges = vec![
        edge(&file, &func.id, EdgeType::Contains, EdgeMetadata::default()),
        call_ref(&func, "helper"),
    ];

    store
        .replace_file("src/a.ts", &nodes, &edges, "hash1", 100)
        .unwrap();
    let nodes_after_first = store.all_nodes().unwrap();
    let edges_after_first = store.all_edges().unwrap();

    store
        .replace_file("src/a.ts", &nodes, &edges, "hash1", 100)
        .unwrap();
    assert_eq!(store.all_nodes().unwrap(), nodes_after_first);
    assert_eq!(store.all_edges().unwrap(), edges_after_first);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn search_is_case_sensitive_ordered_and_capped() {
    let (store, dir) = temp_store("search");
    let mut nodes = Vec::new();
    for i in 0..120 {
        nodes.push(node(
            "src/many.ts",
            NodeType::Function,
            &format!("widget{i:03}"),
            i + 1,
        ));
    }
    nodes.push(node("src/many.ts", NodeType::Function, "Gadget", 500));
    store.upsert_nodes(&nodes).unwrap();

    let hits = store.search_by_name("widget", 100).unwrap();
    assert_eq!(hits.len(), 100);
    let mut names: Vec<_> = hits.iter().map(|n| n.name.clone()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);

    names = store
        .search_by_name("adget", 100)
        .unwrap()
        .iter()
        .map(|n| n.name.clone())
        .collect();
    assert_eq!(names, vec!["Gadget"]);
    assert!(store.search_by_name("WIDGET", 100).unwrap().is_empty());
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn file_context_excludes_in_file_edges() {
    let (store, dir) = temp_store("context");
    let file_a = node("src/a.ts", NodeType::File, "a.ts", 1);
    let func_a = node("src/a.ts", NodeType::Function, "fa", 2);
    let func_b = node("src/b.ts", NodeType::Function, "fb", 2);
    store
        .upsert_nodes(&[file_a.clone(), func_a.clone(), func_b.clone()])
        .unwrap();
    store
        .upsert_edges(&[
            edge(&file_a, &func_a.id, EdgeType::Contains, EdgeMetadata::default()),
            edge(&func_b, &func_a.id, EdgeType::Calls, EdgeMetadata::default()),
            edge(&func_a, &func_b.id, EdgeType::Calls, EdgeMetadata::default()),
            call_ref(&func_a, "elsewhere"),
        ])
        .unwrap();

    let context = store.file_context("src/a.ts").unwrap();
    assert_eq!(context.nodes.len(), 2);
    // contains is entirely in-file: excluded from both directions.
    assert_eq!(context.incoming.len(), 1);
    assert_eq!(context.incoming[0].source_id, func_b.id);
    // Outgoing includes the resolved cross-file call and the pending
    // placeholder.
    assert_eq!(context.outgoing.len(), 2);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn callers_and_callees_skip_placeholders() {
    let (store, dir) = temp_store("calls");
    let func_a = node("src/a.ts", NodeType::Function, "fa", 2);
    let func_b = node("src/b.ts", NodeType::Function, "fb", 2);
    store
        .upsert_nodes(&[func_a.clone(), func_b.clone()])
        .unwrap();
    store
        .upsert_edges(&[
            edge(&func_a, &func_b.id, EdgeType::Calls, EdgeMetadata::default()),
            call_ref(&func_a, "ghost"),
        ])
        .unwrap();

    let callees = store.resolved_callees_of(&func_a.id).unwrap();
    assert_eq!(callees.len(), 1);
    assert_eq!(callees[0].id, func_b.id);

    let callers = store.resolved_callers_of(&func_b.id).unwrap();
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].id, func_a.id);
    std::fs::remove_dir_all(dir).ok();
}
