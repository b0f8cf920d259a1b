use code_graph::extractor::typescript::TypeScriptExtractor;
use code_graph::model::{EdgeType, Language, NodeMetadata, NodeType};

#[test]
fn single_file_class_and_function() {
    let source = r#"export class A { greet(){ return "hi"; } }
export function use(){ const a = new A(); return a.greet(); }
"#;
    let mut extractor = TypeScriptExtractor::new().unwrap();
    let extracted = extractor.extract("src/a.ts", source).unwrap();

    let names: Vec<_> = extracted
        .nodes
        .iter()
        .map(|n| (n.node_type, n.name.as_str()))
        .collect();
    assert!(names.contains(&(NodeType::File, "a.ts")));
    assert!(names.contains(&(NodeType::Class, "A")));
    assert!(names.contains(&(NodeType::Method, "A.greet")));
    assert!(names.contains(&(NodeType::Function, "use")));

    let file = extracted
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::File)
        .unwrap();
    assert_eq!(file.line_start, 1);
    assert_eq!(file.language, Language::Typescript);

    let class = extracted
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::Class)
        .unwrap();
    let method = extracted
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::Method)
        .unwrap();
    let function = extracted
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::Function)
        .unwrap();

    let contains: Vec<_> = extracted
        .edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Contains)
        .map(|e| (e.source_id.as_str(), e.target_id.as_str()))
        .collect();
    assert!(contains.contains(&(file.id.as_str(), class.id.as_str())));
    assert!(contains.contains(&(file.id.as_str(), function.id.as_str())));
    assert!(contains.contains(&(class.id.as_str(), method.id.as_str())));

    let calls: Vec<_> = extracted
        .edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Calls)
        .collect();
    assert_eq!(calls.len(), 1);
    let call = calls[0];
    assert_eq!(call.source_id, function.id);
    assert_eq!(call.target_id, "ref:function:a.greet");
    assert!(call.metadata.unresolved);
    assert_eq!(call.metadata.target_name.as_deref(), Some("a.greet"));
    assert_eq!(call.metadata.line, Some(2));

    let exported = match &class.metadata {
        NodeMetadata::Class(meta) => meta.is_exported,
        other => panic!("unexpected class metadata: {other:?}"),
    };
    assert!(exported);
}

#[test]
fn ids_are_deterministic_across_runs() {
    let source = "export function go(){ return helper(); }\nfunction helper(){}\n";
    let mut extractor = TypeScriptExtractor::new().unwrap();
    let first = extractor.extract("src/x.ts", source).unwrap();
    let second = extractor.extract("src/x.ts", source).unwrap();

    let mut ids_a: Vec<_> = first.nodes.iter().map(|n| n.id.clone()).collect();
    let mut ids_b: Vec<_> = second.nodes.iter().map(|n| n.id.clone()).collect();
    ids_a.sort();
    ids_b.sort();
    assert_eq!(ids_a, ids_b);

    let mut edge_a: Vec<_> = first.edges.iter().map(|e| e.id.clone()).collect();
    let mut edge_b: Vec<_> = second.edges.iter().map(|e| e.id.clone()).collect();
    edge_a.sort();
    edge_b.sort();
    assert_eq!(edge_a, edge_b);
}

#[test]
fn imports_capture_specifier_names_and_default() {
    let source = r#"import { Foo as Bar, Baz } from "./foo";
import React from "react";
import * as path from "node:path";
export { Widget } from "./widget";
"#;
    let mut extractor = TypeScriptExtractor::new().unwrap();
    let extracted = extractor.extract("src/deps.ts", source).unwrap();

    let imports: Vec<_> = extracted
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Import)
        .collect();
    assert_eq!(imports.len(), 3);

    let foo = imports.iter().find(|n| n.name == "./foo").unwrap();
    let NodeMetadata::Import(meta) = &foo.metadata else {
        panic!("expected import metadata");
    };
    assert!(meta.is_relative);
    assert_eq!(meta.named_imports.len(), 2);
    assert_eq!(meta.named_imports[0].name, "Foo");
    assert_eq!(meta.named_imports[0].alias.as_deref(), Some("Bar"));
    assert_eq!(meta.named_imports[1].name, "Baz");
    assert_eq!(meta.named_imports[1].alias, None);

    let react = imports.iter().find(|n| n.name == "react").unwrap();
    let NodeMetadata::Import(meta) = &react.metadata else {
        panic!("expected import metadata");
    };
    assert_eq!(meta.default_import.as_deref(), Some("React"));
    assert!(!meta.is_relative);

    let exports: Vec<_> = extracted
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Export)
        .collect();
    assert_eq!(exports.len(), 1);
    let NodeMetadata::Export(meta) = &exports[0].metadata else {
        panic!("expected export metadata");
    };
    assert_eq!(meta.named_exports, vec!["Widget".to_string()]);
}

#[test]
fn heritage_strips_generic_arguments() {
    let source = r#"interface IBar {}
export abstract class Svc extends Base<Config> implements IFoo<T>, IBar {
  private count: number = 0;
  static create(): Svc { return null as any; }
}
"#;
    let mut extractor = TypeScriptExtractor::new().unwrap();
    let extracted = extractor.extract("src/svc.ts", source).unwrap();

    let class = extracted
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::Class)
        .unwrap();
    let NodeMetadata::Class(meta) = &class.metadata else {
        panic!("expected class metadata");
    };
    assert!(meta.is_abstract);

    let extends: Vec<_> = extracted
        .edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Extends && e.source_id == class.id)
        .map(|e| e.target_id.as_str())
        .collect();
    assert_eq!(extends, vec!["ref:class:Base"]);

    let mut implements: Vec<_> = extracted
        .edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Implements)
        .map(|e| e.target_id.as_str())
        .collect();
    implements.sort();
    assert_eq!(implements, vec!["ref:interface:IBar", "ref:interface:IFoo"]);

    let base_edge = extracted
        .edges
        .iter()
        .find(|e| e.target_id == "ref:class:Base")
        .unwrap();
    assert!(base_edge.metadata.unresolved);

    let property = extracted
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::Variable)
        .unwrap();
    assert_eq!(property.name, "Svc.count");
    let NodeMetadata::Variable(meta) = &property.metadata else {
        panic!("expected variable metadata");
    };
    assert_eq!(meta.visibility.as_deref(), Some("private"));

    let create = extracted
        .nodes
        .iter()
        .find(|n| n.name == "Svc.create")
        .unwrap();
    let NodeMetadata::Method(meta) = &create.metadata else {
        panic!("expected method metadata");
    };
    assert!(meta.is_static);
}

#[test]
fn interface_members_and_extends() {
    let source = r#"export interface Greeter extends Named {
  greeting: string;
  greet(name: string): void;
}
"#;
    let mut extractor = TypeScriptExtractor::new().unwrap();
    let extracted = extractor.extract("src/types.ts", source).unwrap();

    let interface = extracted
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::Interface)
        .unwrap();
    let NodeMetadata::Interface(meta) = &interface.metadata else {
        panic!("expected interface metadata");
    };
    assert!(meta.is_exported);
    assert_eq!(meta.properties, vec!["greeting".to_string()]);
    assert_eq!(meta.methods, vec!["greet".to_string()]);

    assert!(extracted
        .edges
        .iter()
        .any(|e| e.edge_type == EdgeType::Extends && e.target_id == "ref:interface:Named"));
}

#[test]
fn arrow_functions_become_function_nodes() {
    let source = r#"export const add = async (a: number, b: number) => a + b;
const ignored = 42;
const wrap = function(x: number) { return add(x, 1); };
"#;
    let mut extractor = TypeScriptExtractor::new().unwrap();
    let extracted = extractor.extract("src/fn.ts", source).unwrap();

    let functions: Vec<_> = extracted
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Function)
        .collect();
    assert_eq!(functions.len(), 2);

    let add = functions.iter().find(|n| n.name == "add").unwrap();
    let NodeMetadata::Function(meta) = &add.metadata else {
        panic!("expected function metadata");
    };
    assert!(meta.is_arrow_function);
    assert!(meta.is_async);
    assert!(meta.is_exported);
    assert_eq!(meta.parameters.len(), 2);
    assert_eq!(meta.parameters[0].name, "a");
    assert_eq!(meta.parameters[0].param_type.as_deref(), Some("number"));

    let wrap = functions.iter().find(|n| n.name == "wrap").unwrap();
    assert!(extracted
        .edges
        .iter()
        .any(|e| e.source_id == wrap.id && e.target_id == "ref:function:add"));
}

#[test]
fn duplicate_calls_collapse_but_receivers_stay_distinct() {
    let source = r#"class C {
  m() {}
  run(obj: C) {
    this.m();
    obj.m();
    obj.m();
    fetchData();
    fetchData();
  }
}
"#;
    let mut extractor = TypeScriptExtractor::new().unwrap();
    let extracted = extractor.extract("src/c.ts", source).unwrap();

    let run = extracted.nodes.iter().find(|n| n.name == "C.run").unwrap();
    let mut call_targets: Vec<_> = extracted
        .edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Calls && e.source_id == run.id)
        .map(|e| e.target_id.as_str())
        .collect();
    call_targets.sort();
    assert_eq!(
        call_targets,
        vec![
            "ref:function:fetchData",
            "ref:function:obj.m",
            "ref:function:this.m",
        ]
    );
}

#[test]
fn js_extensions_force_javascript_language() {
    let source = "function hello(){ return 1; }\n";
    let mut extractor = TypeScriptExtractor::new().unwrap();
    for path in ["src/a.js", "src/b.jsx", "src/c.mjs", "src/d.cjs"] {
        let extracted = extractor.extract(path, source).unwrap();
        let file = extracted
            .nodes
            .iter()
            .find(|n| n.node_type == NodeType::File)
            .unwrap();
        assert_eq!(file.language, Language::Javascript, "{path}");
    }
    let extracted = extractor.extract("src/e.ts", source).unwrap();
    let file = extracted
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::File)
        .unwrap();
    assert_eq!(file.language, Language::Typescript);
}
