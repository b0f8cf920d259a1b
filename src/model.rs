use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    File,
    Class,
    Interface,
    Function,
    Method,
    Variable,
    Import,
    Export,
    Module,
    Controller,
    Service,
    Repository,
    Component,
    Bean,
    Endpoint,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Class => "class",
            NodeType::Interface => "interface",
            NodeType::Function => "function",
            NodeType::Method => "method",
            NodeType::Variable => "variable",
            NodeType::Import => "import",
            NodeType::Export => "export",
            NodeType::Module => "module",
            NodeType::Controller => "controller",
            NodeType::Service => "service",
            NodeType::Repository => "repository",
            NodeType::Component => "component",
            NodeType::Bean => "bean",
            NodeType::Endpoint => "endpoint",
        }
    }

    pub fn parse(value: &str) -> Option<NodeType> {
        Some(match value {
            "file" => NodeType::File,
            "class" => NodeType::Class,
            "interface" => NodeType::Interface,
            "function" => NodeType::Function,
            "method" => NodeType::Method,
            "variable" => NodeType::Variable,
            "import" => NodeType::Import,
            "export" => NodeType::Export,
            "module" => NodeType::Module,
            "controller" => NodeType::Controller,
            "service" => NodeType::Service,
            "repository" => NodeType::Repository,
            "component" => NodeType::Component,
            "bean" => NodeType::Bean,
            "endpoint" => NodeType::Endpoint,
            _ => return None,
        })
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            NodeType::Function | NodeType::Method | NodeType::Endpoint
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Contains,
    Calls,
    Imports,
    Exports,
    Extends,
    Implements,
    Uses,
    Injects,
    Returns,
    ParameterOf,
    MapsTo,
    Autowires,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Contains => "contains",
            EdgeType::Calls => "calls",
            EdgeType::Imports => "imports",
            EdgeType::Exports => "exports",
            EdgeType::Extends => "extends",
            EdgeType::Implements => "implements",
            EdgeType::Uses => "uses",
            EdgeType::Injects => "injects",
            EdgeType::Returns => "returns",
            EdgeType::ParameterOf => "parameter_of",
            EdgeType::MapsTo => "maps_to",
            EdgeType::Autowires => "autowires",
        }
    }

    pub fn parse(value: &str) -> Option<EdgeType> {
        Some(match value {
            "contains" => EdgeType::Contains,
            "calls" => EdgeType::Calls,
            "imports" => EdgeType::Imports,
            "exports" => EdgeType::Exports,
            "extends" => EdgeType::Extends,
            "implements" => EdgeType::Implements,
            "uses" => EdgeType::Uses,
            "injects" => EdgeType::Injects,
            "returns" => EdgeType::Returns,
            "parameter_of" => EdgeType::ParameterOf,
            "maps_to" => EdgeType::MapsTo,
            "autowires" => EdgeType::Autowires,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Typescript,
    Javascript,
    Python,
    Java,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Typescript => "typescript",
            Language::Javascript => "javascript",
            Language::Python => "python",
            Language::Java => "java",
        }
    }

    pub fn parse(value: &str) -> Option<Language> {
        Some(match value {
            "typescript" => Language::Typescript,
            "javascript" => Language::Javascript,
            "python" => Language::Python,
            "java" => Language::Java,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub param_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedImport {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportMeta {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub module_specifier: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub named_imports: Vec<NamedImport>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_import: Option<String>,
    /// "module" for `import X`, "from" for `from M import ...`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub import_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_relative: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_static: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_wildcard: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMeta {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub module_specifier: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub named_exports: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMeta {
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_exported: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_abstract: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_final: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub decorators: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub bases: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub annotations: Vec<Annotation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub modifiers: Vec<String>,
    /// Class-level @RequestMapping path, when present.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_mapping: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceMeta {
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_exported: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub properties: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionMeta {
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_exported: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_async: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_arrow_function: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub decorators: Vec<String>,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_private: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_dunder: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodMeta {
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_static: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_async: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_abstract: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_constructor: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_class_method: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_property: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_private: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_dunder: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub decorators: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub annotations: Vec<Annotation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub modifiers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointMeta {
    pub http_method: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub full_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub annotations: Vec<Annotation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub modifiers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableMeta {
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_static: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub visibility: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub var_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub decorators: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub annotations: Vec<Annotation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub modifiers: Vec<String>,
    /// Property placeholder from @Value("${...}").
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value_property: Option<String>,
}

/// Per-node-type metadata, serialised as a tagged union into the store's
/// metadata column. Extractors get compile-time checked fields; the
/// column stays a single document so variants can grow without schema
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeMetadata {
    File,
    Module,
    Import(ImportMeta),
    Export(ExportMeta),
    Class(ClassMeta),
    Interface(InterfaceMeta),
    Function(FunctionMeta),
    Method(MethodMeta),
    Endpoint(EndpointMeta),
    Variable(VariableMeta),
}

impl NodeMetadata {
    /// Whether the node is visible outside its file. Drives the
    /// resolver's exported bonus and impact analysis.
    pub fn is_exported(&self) -> bool {
        match self {
            NodeMetadata::Class(meta) => meta.is_exported || meta.modifiers.iter().any(|m| m == "public"),
            NodeMetadata::Interface(meta) => meta.is_exported,
            NodeMetadata::Function(meta) => meta.is_exported,
            NodeMetadata::Method(meta) => meta.modifiers.iter().any(|m| m == "public"),
            NodeMetadata::Endpoint(meta) => meta.modifiers.iter().any(|m| m == "public"),
            NodeMetadata::Export(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeMetadata {
    #[serde(skip_serializing_if = "is_false", default)]
    pub unresolved: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub line: Option<i64>,
    /// The `ref:` placeholder this edge carried before it resolved.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resolved_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ambiguous_candidates: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    pub file_path: String,
    pub line_start: i64,
    pub line_end: i64,
    pub language: Language,
    pub metadata: NodeMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub metadata: EdgeMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHash {
    pub path: String,
    pub hash: String,
    pub last_modified: i64,
}

// Query projections

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContext {
    pub file_path: String,
    pub nodes: Vec<Node>,
    /// Cross-file edges whose target lives in this file.
    pub incoming: Vec<Edge>,
    /// Cross-file edges whose source lives in this file.
    pub outgoing: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionStats {
    pub total: i64,
    pub unresolved: i64,
    pub resolved: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub nodes: i64,
    pub edges: i64,
    pub files: i64,
    pub by_type: BTreeMap<String, i64>,
    pub by_language: BTreeMap<String, i64>,
    pub resolution: ResolutionStats,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub processed: usize,
    pub errors: usize,
    pub deleted: usize,
    pub skipped: usize,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReport {
    pub resolved: usize,
    pub ambiguous: usize,
    pub unresolved: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub node: Node,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    pub edge_type: EdgeType,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolReferences {
    pub definition: Node,
    pub usages: Vec<Usage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallGraph {
    pub function: Node,
    pub callers: Vec<Node>,
    pub callees: Vec<Node>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReport {
    pub file_path: String,
    pub exports: Vec<Node>,
    pub dependent_files: Vec<String>,
    pub risk: RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_dependents(count: usize) -> RiskLevel {
        if count > 10 {
            RiskLevel::High
        } else if count > 3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSlice {
    pub symbol: Node,
    pub source: String,
    pub context_before: String,
    pub context_after: String,
    pub start_line: i64,
    pub end_line: i64,
}

/// `get_source_code` answers with suggestions rather than an error when
/// the symbol is unknown.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SourceLookup {
    Found(Box<SourceSlice>),
    NotFound { error: String, suggestions: Vec<String> },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageExample {
    pub file_path: String,
    pub line: i64,
    pub snippet: String,
    pub used_by: String,
}

// Editing context (token-budgeted assembler)

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSlice {
    pub path: String,
    pub content: String,
    pub truncated: bool,
    pub token_estimate: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnippet {
    pub name: String,
    pub path: String,
    pub content: String,
    pub token_estimate: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditingContext {
    pub target_file: TargetSlice,
    pub imports: Vec<ContextSnippet>,
    pub dependents: Vec<ContextSnippet>,
    pub related_types: Vec<ContextSnippet>,
    pub similar_functions: Vec<ContextSnippet>,
    pub token_estimate: usize,
    pub max_tokens: usize,
}
