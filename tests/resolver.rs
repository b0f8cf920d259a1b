use code_graph::ids::{self, RefKind};
use code_graph::model::{
    ClassMeta, Edge, EdgeMetadata, EdgeType, FunctionMeta, ImportMeta, Language, NamedImport,
    Node, NodeMetadata, NodeType,
};
use code_graph::resolver;
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
    dir.push(format!("code-graph-resolver-{label}-{nanos}-{counter}"));
    std::fs::create_dir_all(&dir).unwrap();
    let store = Store::open(&dir.join("graph.db")).unwrap();
    (store, dir)
}

fn function(file: &str, name: &str, line: i64, exported: bool) -> Node {
    Node {
        id: ids::node_id(file, "function", name, line),
        node_type: NodeType::Function,
        name: name.to_string(),
        file_path: file.to_string(),
        line_start: line,
        line_end: line + 3,
        language: Language::Typescript,
        metadata: NodeMetadata::Function(FunctionMeta {
            is_exported: exported,
            ..Default::default()
        }),
    }
}

fn class(file: &str, name: &str, line: i64) -> Node {
    Node {
        id: ids::node_id(file, "class", name, line),
        node_type: NodeType::Class,
        name: name.to_string(),
        file_path: file.to_string(),
        line_start: line,
        line_end: line + 10,
        language: Language::Typescript,
        metadata: NodeMetadata::Class(ClassMeta {
            is_exported: true,
            ..Default::default()
        }),
    }
}

fn import_node(file: &str, specifier: &str, names: &[&str], line: i64, relative: bool) -> Node {
    Node {
        id: ids::node_id(file, "import", specifier, line),
        node_type: NodeType::Import,
        name: specifier.to_string(),
        file_path: file.to_string(),
        line_start: line,
        line_end: line,
        language: Language::Typescript,
        metadata: NodeMetadata::Import(ImportMeta {
            module_specifier: Some(specifier.to_string()),
            named_imports: names
                .iter()
                .map(|name| NamedImport {
                    name: name.to_string(),
                    alias: None,
                })
                .collect(),
            is_relative: relative,
            ..Default::default()
        }),
    }
}

fn call_ref(source: &Node, name: &str) -> Edge {
    let target_id = ids::ref_target(RefKind::Function, name);
    Edge {
        id: ids::edge_id(&source.id, &target_id, "calls"),
        source_id: source.id.clone(),
        target_id,
        edge_type: EdgeType::Calls,
        metadata: EdgeMetadata {
            unresolved: true,
            target_name: Some(name.to_string()),
            line: Some(source.line_start),
            ..Default::default()
        },
    }
}

#[test]
fn unique_candidate_resolves() {
    let (store, dir) = temp_store("unique");
    let compute = function("pkg/m.ts", "compute", 1, true);
    let run = function("pkg/n.ts", "run", 1, true);
    store
        .upsert_nodes(&[compute.clone(), run.clone()])
        .unwrap();
    let pending = call_ref(&run, "compute");
    store.upsert_edges(std::slice::from_ref(&pending)).unwrap();

    let report = resolver::resolve(&store).unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(report.ambiguous, 0);
    assert_eq!(report.unresolved, 0);

    let resolved = store.get_edge(&pending.id).unwrap().unwrap();
    assert_eq!(resolved.target_id, compute.id);
    assert!(!resolved.metadata.unresolved);
    assert_eq!(
        resolved.metadata.resolved_from.as_deref(),
        Some("ref:function:compute")
    );
    assert_eq!(store.resolution_stats().unwrap().unresolved, 0);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn dotted_member_call_binds_to_method() {
    let (store, dir) = temp_store("dotted");
    let owner = class("src/a.ts", "A", 1);
    let greet = Node {
        id: ids::node_id("src/a.ts", "method", "A.greet", 2),
        node_type: NodeType::Method,
        name: "A.greet".to_string(),
        file_path: "src/a.ts".to_string(),
        line_start: 2,
        line_end: 4,
        language: Language::Typescript,
        metadata: NodeMetadata::Method(Default::default()),
    };
    let user = function("src/a.ts", "use", 6, true);
    store
        .upsert_nodes(&[owner, greet.clone(), user.clone()])
        .unwrap();
    let pending = call_ref(&user, "a.greet");
    store.upsert_edges(std::slice::from_ref(&pending)).unwrap();

    let report = resolver::resolve(&store).unwrap();
    assert_eq!(report.resolved, 1);
    let resolved = store.get_edge(&pending.id).unwrap().unwrap();
    assert_eq!(resolved.target_id, greet.id);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn symmetric_candidates_stay_ambiguous() {
    let (store, dir) = temp_store("ambiguous");
    let helper_one = function("src/u1.ts", "helper", 1, false);
    let helper_two = function("src/u2.ts", "helper", 1, false);
    let caller = function("src/main.ts", "main", 1, false);
    store
        .upsert_nodes(&[helper_one.clone(), helper_two.clone(), caller.clone()])
        .unwrap();
    let pending = call_ref(&caller, "helper");
    store.upsert_edges(std::slice::from_ref(&pending)).unwrap();

    let before = store.resolution_stats().unwrap();
    let report = resolver::resolve(&store).unwrap();
    assert_eq!(report.resolved, 0);
    assert_eq!(report.ambiguous, 1);

    let after = store.resolution_stats().unwrap();
    assert_eq!(after.unresolved, before.unresolved);

    let edge = store.get_edge(&pending.id).unwrap().unwrap();
    assert!(edge.metadata.unresolved);
    assert!(ids::is_placeholder(&edge.target_id));
    let candidates = edge.metadata.ambiguous_candidates.unwrap();
    assert_eq!(candidates.len(), 2);
    assert!(candidates.iter().any(|c| c.contains("src/u1.ts")));
    assert!(candidates.iter().any(|c| c.contains("src/u2.ts")));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn import_breaks_the_tie() {
    let (store, dir) = temp_store("import-tie");
    let helper_one = function("src/u1.ts", "helper", 1, false);
    let helper_two = function("src/u2.ts", "helper", 1, false);
    let caller = function("src/main.ts", "main", 2, false);
    let import = import_node("src/main.ts", "./u1", &["helper"], 1, true);
    store
        .upsert_nodes(&[
            helper_one.clone(),
            helper_two.clone(),
            caller.clone(),
            import,
        ])
        .unwrap();
    let pending = call_ref(&caller, "helper");
    store.upsert_edges(std::slice::from_ref(&pending)).unwrap();

    let report = resolver::resolve(&store).unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(report.ambiguous, 0);
    let resolved = store.get_edge(&pending.id).unwrap().unwrap();
    assert_eq!(resolved.target_id, helper_one.id);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn compatibility_filter_rejects_wrong_kinds() {
    let (store, dir) = temp_store("filter");
    // Only a class named `helper` exists; a calls edge must not bind
    // to it.
    let class_node = class("src/u1.ts", "helper", 1);
    let caller = function("src/main.ts", "main", 1, false);
    store
        .upsert_nodes(&[class_node, caller.clone()])
        .unwrap();
    let pending = call_ref(&caller, "helper");
    store.upsert_edges(std::slice::from_ref(&pending)).unwrap();

    let report = resolver::resolve(&store).unwrap();
    assert_eq!(report.resolved, 0);
    assert_eq!(report.unresolved, 1);
    let edge = store.get_edge(&pending.id).unwrap().unwrap();
    assert!(ids::is_placeholder(&edge.target_id));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn receiver_prefix_is_stripped_before_lookup() {
    let (store, dir) = temp_store("receiver");
    let owner = class("src/svc.ts", "Svc", 1);
    let method = Node {
        id: ids::node_id("src/svc.ts", "method", "Svc.ping", 2),
        node_type: NodeType::Method,
        name: "Svc.ping".to_string(),
        file_path: "src/svc.ts".to_string(),
        line_start: 2,
        line_end: 3,
        language: Language::Typescript,
        metadata: NodeMetadata::Method(Default::default()),
    };
    let caller = Node {
        id: ids::node_id("src/svc.ts", "method", "Svc.run", 5),
        node_type: NodeType::Method,
        name: "Svc.run".to_string(),
        file_path: "src/svc.ts".to_string(),
        line_start: 5,
        line_end: 7,
        language: Language::Typescript,
        metadata: NodeMetadata::Method(Default::default()),
    };
    store
        .upsert_nodes(&[owner, method.clone(), caller.clone()])
        .unwrap();
    let pending = call_ref(&caller, "this.ping");
    store.upsert_edges(std::slice::from_ref(&pending)).unwrap();

    let report = resolver::resolve(&store).unwrap();
    assert_eq!(report.resolved, 1);
    let resolved = store.get_edge(&pending.id).unwrap().unwrap();
    assert_eq!(resolved.target_id, method.id);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn missing_target_name_stays_unresolved() {
    let (store, dir) = temp_store("no-name");
    let caller = function("src/main.ts", "main", 1, false);
    store.upsert_nodes(std::slice::from_ref(&caller)).unwrap();
    let target_id = ids::ref_target(RefKind::Function, "mystery");
    let pending = Edge {
        id: ids::edge_id(&caller.id, &target_id, "calls"),
        source_id: caller.id.clone(),
        target_id,
        edge_type: EdgeType::Calls,
        metadata: EdgeMetadata {
            unresolved: true,
            ..Default::default()
        },
    };
    store.upsert_edges(std::slice::from_ref(&pending)).unwrap();

    let report = resolver::resolve(&store).unwrap();
    assert_eq!(report.resolved, 0);
    assert_eq!(report.unresolved, 1);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn repeated_resolution_is_stable() {
    let (store, dir) = temp_store("monotonic");
    let compute = function("pkg/m.ts", "compute", 1, true);
    let run = function("pkg/n.ts", "run", 1, true);
    let helper_one = function("src/u1.ts", "helper", 1, false);
    let helper_two = function("src/u2.ts", "helper", 1, false);
    store
        .upsert_nodes(&[compute, run.clone(), helper_one, helper_two])
        .unwrap();
    store
        .upsert_edges(&[call_ref(&run, "compute"), call_ref(&run, "helper")])
        .unwrap();

    resolver::resolve(&store).unwrap();
    let first = store.all_edges().unwrap();
    let second_report = resolver::resolve(&store).unwrap();
    let second = store.all_edges().unwrap();
    assert_eq!(first, second);
    assert_eq!(second_report.resolved, 0);
    std::fs::remove_dir_all(dir).ok();
}
