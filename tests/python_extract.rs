use code_graph::extractor::python::PythonExtractor;
use code_graph::model::{EdgeType, Language, NodeMetadata, NodeType};

#[test]
fn imports_and_from_imports() {
    let source = r#"import os, json as j
from .m import compute
from pkg.util import first, second as two
from legacy import *
"#;
    let mut extractor = PythonExtractor::new().unwrap();
    let extracted = extractor.extract("pkg/n.py", source).unwrap();

    let imports: Vec<_> = extracted
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Import)
        .collect();
    assert_eq!(imports.len(), 5);

    let os_import = imports.iter().find(|n| n.name == "os").unwrap();
    let NodeMetadata::Import(meta) = &os_import.metadata else {
        panic!("expected import metadata");
    };
    assert_eq!(meta.import_type.as_deref(), Some("module"));
    assert_eq!(meta.alias, None);

    let json_import = imports.iter().find(|n| n.name == "json").unwrap();
    let NodeMetadata::Import(meta) = &json_import.metadata else {
        panic!("expected import metadata");
    };
    assert_eq!(meta.alias.as_deref(), Some("j"));

    let relative = imports.iter().find(|n| n.name == ".m").unwrap();
    let NodeMetadata::Import(meta) = &relative.metadata else {
        panic!("expected import metadata");
    };
    assert_eq!(meta.import_type.as_deref(), Some("from"));
    assert!(meta.is_relative);
    assert_eq!(meta.named_imports.len(), 1);
    assert_eq!(meta.named_imports[0].name, "compute");
    assert_eq!(meta.named_imports[0].alias, None);

    let util = imports.iter().find(|n| n.name == "pkg.util").unwrap();
    let NodeMetadata::Import(meta) = &util.metadata else {
        panic!("expected import metadata");
    };
    assert!(!meta.is_relative);
    assert_eq!(meta.named_imports.len(), 2);
    assert_eq!(meta.named_imports[1].alias.as_deref(), Some("two"));

    let wildcard = imports.iter().find(|n| n.name == "legacy").unwrap();
    let NodeMetadata::Import(meta) = &wildcard.metadata else {
        panic!("expected import metadata");
    };
    assert!(meta.is_wildcard);
}

#[test]
fn classes_methods_and_decorators() {
    let source = r#"from abc import ABC


class Repo(ABC):
    """Storage interface."""

    @staticmethod
    def make():
        return None

    @property
    def size(self):
        return 0

    def _internal(self, value, *args, **kwargs):
        return value

    def __len__(self):
        return 0


class Plain(object):
    pass
"#;
    let mut extractor = PythonExtractor::new().unwrap();
    let extracted = extractor.extract("pkg/repo.py", source).unwrap();

    let repo = extracted.nodes.iter().find(|n| n.name == "Repo").unwrap();
    assert_eq!(repo.node_type, NodeType::Class);
    let NodeMetadata::Class(meta) = &repo.metadata else {
        panic!("expected class metadata");
    };
    assert_eq!(meta.bases, vec!["ABC".to_string()]);
    assert!(meta.is_abstract);
    assert_eq!(meta.docstring.as_deref(), Some("Storage interface."));

    assert!(extracted
        .edges
        .iter()
        .any(|e| e.edge_type == EdgeType::Extends
            && e.source_id == repo.id
            && e.target_id == "ref:class:ABC"));

    // `object` never produces an extends edge.
    let plain = extracted.nodes.iter().find(|n| n.name == "Plain").unwrap();
    assert!(!extracted
        .edges
        .iter()
        .any(|e| e.edge_type == EdgeType::Extends && e.source_id == plain.id));

    let make = extracted.nodes.iter().find(|n| n.name == "Repo.make").unwrap();
    assert_eq!(make.node_type, NodeType::Method);
    let NodeMetadata::Method(meta) = &make.metadata else {
        panic!("expected method metadata");
    };
    assert!(meta.is_static);

    let size = extracted.nodes.iter().find(|n| n.name == "Repo.size").unwrap();
    let NodeMetadata::Method(meta) = &size.metadata else {
        panic!("expected method metadata");
    };
    assert!(meta.is_property);

    let internal = extracted
        .nodes
        .iter()
        .find(|n| n.name == "Repo._internal")
        .unwrap();
    let NodeMetadata::Method(meta) = &internal.metadata else {
        panic!("expected method metadata");
    };
    assert!(meta.is_private);
    assert!(!meta.is_dunder);
    // self filtered; splats keep their markers.
    let params: Vec<_> = meta.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(params, vec!["value", "*args", "**kwargs"]);

    let dunder = extracted
        .nodes
        .iter()
        .find(|n| n.name == "Repo.__len__")
        .unwrap();
    let NodeMetadata::Method(meta) = &dunder.metadata else {
        panic!("expected method metadata");
    };
    assert!(meta.is_dunder);
    assert!(!meta.is_private);
}

#[test]
fn module_constants_only() {
    let source = r#"MAX_RETRIES = 3
TIMEOUT_SECS: int = 30
lowercase = 5
_PRIVATE = 1
X9_FLAG = True
"#;
    let mut extractor = PythonExtractor::new().unwrap();
    let extracted = extractor.extract("pkg/settings.py", source).unwrap();

    let mut constants: Vec<_> = extracted
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Variable)
        .map(|n| n.name.as_str())
        .collect();
    constants.sort();
    assert_eq!(constants, vec!["MAX_RETRIES", "TIMEOUT_SECS", "X9_FLAG"]);

    let timeout = extracted
        .nodes
        .iter()
        .find(|n| n.name == "TIMEOUT_SECS")
        .unwrap();
    let NodeMetadata::Variable(meta) = &timeout.metadata else {
        panic!("expected variable metadata");
    };
    assert_eq!(meta.var_type.as_deref(), Some("int"));
}

#[test]
fn calls_skip_builtins_and_nested_scopes() {
    let source = r#"def run(items):
    print(items)
    total = len(items)
    value = compute(total)
    handler.process(value)
    handler.process(value)

    def nested():
        hidden_call()

    return value
"#;
    let mut extractor = PythonExtractor::new().unwrap();
    let extracted = extractor.extract("pkg/run.py", source).unwrap();

    let run = extracted.nodes.iter().find(|n| n.name == "run").unwrap();
    assert_eq!(run.node_type, NodeType::Function);
    let file = extracted
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::File)
        .unwrap();
    assert_eq!(file.language, Language::Python);

    let mut targets: Vec<_> = extracted
        .edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Calls && e.source_id == run.id)
        .map(|e| e.target_id.as_str())
        .collect();
    targets.sort();
    assert_eq!(
        targets,
        vec!["ref:function:compute", "ref:function:handler.process"]
    );
    // Nested defs produce no nodes and contribute no calls.
    assert!(!extracted
        .edges
        .iter()
        .any(|e| e.target_id == "ref:function:hidden_call"));
    assert!(!extracted.nodes.iter().any(|n| n.name == "nested"));
}

#[test]
fn async_functions_and_return_types() {
    let source = r#"async def fetch(url: str) -> bytes:
    return await session.get(url)
"#;
    let mut extractor = PythonExtractor::new().unwrap();
    let extracted = extractor.extract("pkg/client.py", source).unwrap();

    let fetch = extracted.nodes.iter().find(|n| n.name == "fetch").unwrap();
    let NodeMetadata::Function(meta) = &fetch.metadata else {
        panic!("expected function metadata");
    };
    assert!(meta.is_async);
    assert_eq!(meta.return_type.as_deref(), Some("bytes"));
    assert_eq!(meta.parameters[0].name, "url");
    assert_eq!(meta.parameters[0].param_type.as_deref(), Some("str"));
}
