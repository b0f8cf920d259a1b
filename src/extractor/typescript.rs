use crate::extractor::{
    contains_edge, file_node, make_node, ref_edge, strip_generics, CallSink, Extraction,
};
use crate::ids::RefKind;
use crate::model::{
    ClassMeta, EdgeType, ExportMeta, FunctionMeta, ImportMeta, InterfaceMeta, Language,
    MethodMeta, NamedImport, NodeMetadata, NodeType, Parameter, VariableMeta,
};
use anyhow::Result;
use tree_sitter::{Node, Parser};

/// Shared extractor for TypeScript and JavaScript. The grammar differs
/// per extension; the emitted shapes do not, beyond the `language` tag.
pub struct TypeScriptExtractor {
    ts_parser: Parser,
    tsx_parser: Parser,
    js_parser: Parser,
}

impl TypeScriptExtractor {
    pub fn new() -> Result<Self> {
        let mut ts_parser = Parser::new();
        ts_parser.set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())?;
        let mut tsx_parser = Parser::new();
        tsx_parser.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())?;
        let mut js_parser = Parser::new();
        js_parser.set_language(&tree_sitter_javascript::LANGUAGE.into())?;
        Ok(Self {
            ts_parser,
            tsx_parser,
            js_parser,
        })
    }

    pub fn extract(&mut self, file_path: &str, source: &str) -> Result<Extraction> {
        let language = language_for_path(file_path);
        let parser = if language == Language::Javascript {
            &mut self.js_parser
        } else if file_path.ends_with(".tsx") {
            &mut self.tsx_parser
        } else {
            &mut self.ts_parser
        };

        let mut output = Extraction::default();
        let file = file_node(file_path, source, language);
        let file_id = file.id.clone();
        output.nodes.push(file);

        let Some(tree) = parser.parse(source, None) else {
            return Ok(output);
        };
        let root = tree.root_node();

        let ctx = Context {
            file_path,
            file_id: &file_id,
            language,
        };
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            handle_statement(child, &ctx, source, false, &mut output);
        }
        Ok(output)
    }
}

pub fn language_for_path(file_path: &str) -> Language {
    for ext in [".js", ".jsx", ".mjs", ".cjs"] {
        if file_path.ends_with(ext) {
            return Language::Javascript;
        }
    }
    Language::Typescript
}

struct Context<'a> {
    file_path: &'a str,
    file_id: &'a str,
    language: Language,
}

fn handle_statement(
    node: Node<'_>,
    ctx: &Context<'_>,
    source: &str,
    exported: bool,
    output: &mut Extraction,
) {
    match node.kind() {
        "import_statement" => handle_import(node, ctx, source, output),
        "export_statement" => handle_export(node, ctx, source, output),
        "class_declaration" | "abstract_class_declaration" => {
            handle_class(node, ctx, source, exported, output)
        }
        "interface_declaration" => handle_interface(node, ctx, source, exported, output),
        "function_declaration" | "generator_function_declaration" => {
            handle_function(node, ctx, source, exported, output)
        }
        "lexical_declaration" | "variable_declaration" => {
            handle_variable_statement(node, ctx, source, exported, output)
        }
        _ => {}
    }
}

fn handle_import(node: Node<'_>, ctx: &Context<'_>, source: &str, output: &mut Extraction) {
    let Some(specifier) = node
        .child_by_field_name("source")
        .map(|n| unquote(&node_text(n, source)))
    else {
        return;
    };

    let mut named_imports = Vec::new();
    let mut default_import = None;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "import_clause" {
            continue;
        }
        let mut inner = child.walk();
        for part in child.named_children(&mut inner) {
            match part.kind() {
                "identifier" => default_import = Some(node_text(part, source)),
                "namespace_import" => {
                    if let Some(alias) = first_child_of_kind(part, "identifier") {
                        named_imports.push(NamedImport {
                            name: "*".to_string(),
                            alias: Some(node_text(alias, source)),
                        });
                    }
                }
                "named_imports" => {
                    let mut specs = part.walk();
                    for spec in part.named_children(&mut specs) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(name) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        named_imports.push(NamedImport {
                            name: node_text(name, source),
                            alias: spec
                                .child_by_field_name("alias")
                                .map(|n| node_text(n, source)),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    let (line_start, line_end) = span(node);
    let is_relative = specifier.starts_with('.');
    let import = make_node(
        ctx.file_path,
        NodeType::Import,
        &specifier,
        line_start,
        line_end,
        ctx.language,
        NodeMetadata::Import(ImportMeta {
            module_specifier: Some(specifier.clone()),
            named_imports,
            default_import,
            is_relative,
            ..Default::default()
        }),
    );
    output.edges.push(contains_edge(ctx.file_id, &import.id));
    output.nodes.push(import);
}

fn handle_export(node: Node<'_>, ctx: &Context<'_>, source: &str, output: &mut Extraction) {
    // Re-export: export { a, b } from "./mod" gets its own node.
    if let Some(source_node) = node.child_by_field_name("source") {
        let specifier = unquote(&node_text(source_node, source));
        let mut named_exports = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "export_clause" {
                continue;
            }
            let mut specs = child.walk();
            for spec in child.named_children(&mut specs) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                if let Some(name) = spec.child_by_field_name("name") {
                    named_exports.push(node_text(name, source));
                }
            }
        }
        let (line_start, line_end) = span(node);
        let export = make_node(
            ctx.file_path,
            NodeType::Export,
            &specifier,
            line_start,
            line_end,
            ctx.language,
            NodeMetadata::Export(ExportMeta {
                module_specifier: Some(specifier.clone()),
                named_exports,
            }),
        );
        output.edges.push(contains_edge(ctx.file_id, &export.id));
        output.nodes.push(export);
        return;
    }

    // export <declaration>: unwrap and mark exported.
    if let Some(decl) = node.child_by_field_name("declaration") {
        handle_statement(decl, ctx, source, true, output);
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        handle_statement(child, ctx, source, true, output);
    }
}

fn handle_class(
    node: Node<'_>,
    ctx: &Context<'_>,
    source: &str,
    exported: bool,
    output: &mut Extraction,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let class_name = node_text(name_node, source);
    if class_name.is_empty() {
        return;
    }
    let (line_start, line_end) = span(node);
    let class = make_node(
        ctx.file_path,
        NodeType::Class,
        &class_name,
        line_start,
        line_end,
        ctx.language,
        NodeMetadata::Class(ClassMeta {
            is_exported: exported,
            is_abstract: node.kind() == "abstract_class_declaration",
            decorators: decorator_names(node, source),
            ..Default::default()
        }),
    );
    let class_id = class.id.clone();
    output.edges.push(contains_edge(ctx.file_id, &class_id));
    output.nodes.push(class);

    for base in heritage_targets(node, &["extends_clause"], source) {
        let stripped = strip_generics(&base).to_string();
        output.edges.push(ref_edge(
            &class_id,
            RefKind::Class,
            &stripped,
            &base,
            EdgeType::Extends,
            Some(line_start),
        ));
    }
    for iface in heritage_targets(node, &["implements_clause"], source) {
        let stripped = strip_generics(&iface).to_string();
        output.edges.push(ref_edge(
            &class_id,
            RefKind::Interface,
            &stripped,
            &iface,
            EdgeType::Implements,
            Some(line_start),
        ));
    }

    let Some(body) = node.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        match member.kind() {
            "method_definition" => {
                handle_method(member, ctx, &class_name, &class_id, source, output)
            }
            "public_field_definition" | "field_definition" => {
                handle_class_property(member, ctx, &class_name, &class_id, source, output)
            }
            _ => {}
        }
    }
}

fn handle_method(
    node: Node<'_>,
    ctx: &Context<'_>,
    class_name: &str,
    class_id: &str,
    source: &str,
    output: &mut Extraction,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let method_name = node_text(name_node, source);
    if method_name.is_empty() {
        return;
    }
    let full_name = format!("{class_name}.{method_name}");
    let (line_start, line_end) = span(node);
    let method = make_node(
        ctx.file_path,
        NodeType::Method,
        &full_name,
        line_start,
        line_end,
        ctx.language,
        NodeMetadata::Method(MethodMeta {
            is_static: has_keyword_child(node, "static"),
            is_async: has_keyword_child(node, "async"),
            visibility: accessibility(node, source),
            parameters: parameters_of(node, source),
            return_type: return_type_of(node, source),
            decorators: decorator_names(node, source),
            ..Default::default()
        }),
    );
    let method_id = method.id.clone();
    output.edges.push(contains_edge(class_id, &method_id));
    output.nodes.push(method);

    if let Some(body) = node.child_by_field_name("body") {
        let mut sink = CallSink::new(&method_id, RefKind::Function);
        collect_calls(body, source, &mut sink);
        output.edges.extend(sink.edges);
    }
}

fn handle_class_property(
    node: Node<'_>,
    ctx: &Context<'_>,
    class_name: &str,
    class_id: &str,
    source: &str,
    output: &mut Extraction,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let prop_name = node_text(name_node, source);
    if prop_name.is_empty() {
        return;
    }
    let full_name = format!("{class_name}.{prop_name}");
    let (line_start, line_end) = span(node);
    let property = make_node(
        ctx.file_path,
        NodeType::Variable,
        &full_name,
        line_start,
        line_end,
        ctx.language,
        NodeMetadata::Variable(VariableMeta {
            is_static: has_keyword_child(node, "static"),
            visibility: accessibility(node, source),
            var_type: node
                .child_by_field_name("type")
                .map(|n| type_annotation_text(n, source)),
            decorators: decorator_names(node, source),
            ..Default::default()
        }),
    );
    output.edges.push(contains_edge(class_id, &property.id));
    output.nodes.push(property);
}

fn handle_interface(
    node: Node<'_>,
    ctx: &Context<'_>,
    source: &str,
    exported: bool,
    output: &mut Extraction,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, source);
    if name.is_empty() {
        return;
    }

    let mut properties = Vec::new();
    let mut methods = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            let Some(member_name) = member.child_by_field_name("name") else {
                continue;
            };
            match member.kind() {
                "property_signature" => properties.push(node_text(member_name, source)),
                "method_signature" => methods.push(node_text(member_name, source)),
                _ => {}
            }
        }
    }

    let (line_start, line_end) = span(node);
    let interface = make_node(
        ctx.file_path,
        NodeType::Interface,
        &name,
        line_start,
        line_end,
        ctx.language,
        NodeMetadata::Interface(InterfaceMeta {
            is_exported: exported,
            properties,
            methods,
        }),
    );
    let interface_id = interface.id.clone();
    output.edges.push(contains_edge(ctx.file_id, &interface_id));
    output.nodes.push(interface);

    for base in heritage_targets(node, &["extends_clause", "extends_type_clause"], source) {
        let stripped = strip_generics(&base).to_string();
        output.edges.push(ref_edge(
            &interface_id,
            RefKind::Interface,
            &stripped,
            &base,
            EdgeType::Extends,
            Some(line_start),
        ));
    }
}

fn handle_function(
    node: Node<'_>,
    ctx: &Context<'_>,
    source: &str,
    exported: bool,
    output: &mut Extraction,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, source);
    if name.is_empty() {
        return;
    }
    let (line_start, line_end) = span(node);
    let function = make_node(
        ctx.file_path,
        NodeType::Function,
        &name,
        line_start,
        line_end,
        ctx.language,
        NodeMetadata::Function(FunctionMeta {
            is_exported: exported,
            is_async: has_keyword_child(node, "async"),
            parameters: parameters_of(node, source),
            return_type: return_type_of(node, source),
            ..Default::default()
        }),
    );
    let function_id = function.id.clone();
    output.edges.push(contains_edge(ctx.file_id, &function_id));
    output.nodes.push(function);

    if let Some(body) = node.child_by_field_name("body") {
        let mut sink = CallSink::new(&function_id, RefKind::Function);
        collect_calls(body, source, &mut sink);
        output.edges.extend(sink.edges);
    }
}

/// `const f = () => ...` and `const f = function () {}` become function
/// nodes named after the variable.
fn handle_variable_statement(
    node: Node<'_>,
    ctx: &Context<'_>,
    source: &str,
    exported: bool,
    output: &mut Extraction,
) {
    let mut cursor = node.walk();
    for declarator in node.named_children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = declarator.child_by_field_name("name") else {
            continue;
        };
        if name_node.kind() != "identifier" {
            continue;
        }
        let Some(value) = declarator.child_by_field_name("value") else {
            continue;
        };
        let value = unwrap_expression(value);
        let is_arrow = value.kind() == "arrow_function";
        let is_function = matches!(
            value.kind(),
            "function_expression" | "function" | "generator_function"
        );
        if !is_arrow && !is_function {
            continue;
        }
        let name = node_text(name_node, source);
        let (line_start, line_end) = span(declarator);
        let function = make_node(
            ctx.file_path,
            NodeType::Function,
            &name,
            line_start,
            line_end,
            ctx.language,
            NodeMetadata::Function(FunctionMeta {
                is_exported: exported,
                is_async: has_keyword_child(value, "async"),
                is_arrow_function: is_arrow,
                parameters: parameters_of(value, source),
                return_type: return_type_of(value, source),
                ..Default::default()
            }),
        );
        let function_id = function.id.clone();
        output.edges.push(contains_edge(ctx.file_id, &function_id));
        output.nodes.push(function);

        if let Some(body) = value.child_by_field_name("body") {
            let mut sink = CallSink::new(&function_id, RefKind::Function);
            collect_calls(body, source, &mut sink);
            output.edges.extend(sink.edges);
        }
    }
}

fn unwrap_expression(node: Node<'_>) -> Node<'_> {
    let mut current = node;
    loop {
        match current.kind() {
            "parenthesized_expression" | "as_expression" | "satisfies_expression"
            | "non_null_expression" => {
                let Some(inner) = current.named_child(0) else {
                    return current;
                };
                current = inner;
            }
            _ => return current,
        }
    }
}

/// Recursively gather call expressions below a body node. Dotted
/// receivers keep their full textual form (`this.foo.bar`); computed or
/// call-valued receivers are skipped.
fn collect_calls(node: Node<'_>, source: &str, sink: &mut CallSink<'_>) {
    if node.kind() == "call_expression" {
        if let Some(function) = node.child_by_field_name("function") {
            if let Some(name) = call_name(function, source) {
                sink.add(&name, function.start_position().row as i64 + 1);
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_calls(child, source, sink);
    }
}

fn call_name(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source)),
        "member_expression" => {
            let object = node.child_by_field_name("object")?;
            let property = node.child_by_field_name("property")?;
            if property.kind() != "property_identifier" {
                return None;
            }
            let base = call_name(object, source)?;
            Some(format!("{base}.{}", node_text(property, source)))
        }
        "this" | "super" => Some(node_text(node, source)),
        _ => None,
    }
}

// -- small node helpers -------------------------------------------------

fn node_text(node: Node<'_>, source: &str) -> String {
    source
        .get(node.start_byte()..node.end_byte())
        .unwrap_or("")
        .to_string()
}

fn span(node: Node<'_>) -> (i64, i64) {
    (
        node.start_position().row as i64 + 1,
        node.end_position().row as i64 + 1,
    )
}

fn first_child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|c| c.kind() == kind);
    found
}

/// Anonymous keyword tokens ("static", "async", "abstract") sit between
/// named children; scan all children.
fn has_keyword_child(node: Node<'_>, keyword: &str) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).any(|c| c.kind() == keyword);
    result
}

fn accessibility(node: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .find(|c| c.kind() == "accessibility_modifier");
    found.map(|n| node_text(n, source))
}

fn decorator_names(node: Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "decorator" {
            continue;
        }
        let Some(inner) = child.named_child(0) else {
            continue;
        };
        let name = match inner.kind() {
            "call_expression" => inner
                .child_by_field_name("function")
                .map(|f| node_text(f, source))
                .unwrap_or_default(),
            _ => node_text(inner, source),
        };
        if !name.is_empty() {
            names.push(name);
        }
    }
    names
}

fn heritage_targets(node: Node<'_>, clause_kinds: &[&str], source: &str) -> Vec<String> {
    let mut targets = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let kind = child.kind();
        if clause_kinds.contains(&kind) {
            targets.extend(clause_values(child, source));
        } else if kind == "class_heritage" {
            // JS grammar: class_heritage wraps a single expression; TS
            // wraps extends/implements clauses.
            let mut saw_clause = false;
            let mut inner = child.walk();
            for clause in child.named_children(&mut inner) {
                if clause_kinds.contains(&clause.kind()) {
                    targets.extend(clause_values(clause, source));
                    saw_clause = true;
                }
            }
            if !saw_clause && clause_kinds.contains(&"extends_clause") {
                if let Some(expr) = child.named_child(0) {
                    let text = node_text(expr, source);
                    if !text.is_empty() {
                        targets.push(text);
                    }
                }
            }
        }
    }
    targets
}

fn clause_values(node: Node<'_>, source: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "type_arguments" || child.kind() == "type_parameters" {
            continue;
        }
        let text = node_text(child, source);
        if !text.is_empty() {
            values.push(text);
        }
    }
    values
}

fn parameters_of(node: Node<'_>, source: &str) -> Vec<Parameter> {
    let params_node = node
        .child_by_field_name("parameters")
        .or_else(|| node.child_by_field_name("parameter"));
    let Some(params_node) = params_node else {
        return Vec::new();
    };
    if params_node.kind() == "identifier" {
        // Single-parameter arrow function without parentheses.
        return vec![Parameter {
            name: node_text(params_node, source),
            ..Default::default()
        }];
    }
    let mut parameters = Vec::new();
    let mut cursor = params_node.walk();
    for param in params_node.named_children(&mut cursor) {
        match param.kind() {
            "required_parameter" | "optional_parameter" => {
                let Some(pattern) = param.child_by_field_name("pattern") else {
                    continue;
                };
                parameters.push(Parameter {
                    name: node_text(pattern, source),
                    param_type: param
                        .child_by_field_name("type")
                        .map(|t| type_annotation_text(t, source)),
                    default: param
                        .child_by_field_name("value")
                        .map(|v| node_text(v, source)),
                });
            }
            "identifier" => parameters.push(Parameter {
                name: node_text(param, source),
                ..Default::default()
            }),
            "assignment_pattern" => {
                let Some(left) = param.child_by_field_name("left") else {
                    continue;
                };
                parameters.push(Parameter {
                    name: node_text(left, source),
                    param_type: None,
                    default: param
                        .child_by_field_name("right")
                        .map(|v| node_text(v, source)),
                });
            }
            "rest_pattern" => parameters.push(Parameter {
                name: node_text(param, source),
                ..Default::default()
            }),
            _ => {}
        }
    }
    parameters
}

fn return_type_of(node: Node<'_>, source: &str) -> Option<String> {
    node.child_by_field_name("return_type")
        .map(|t| type_annotation_text(t, source))
}

fn type_annotation_text(node: Node<'_>, source: &str) -> String {
    let text = node_text(node, source);
    text.trim_start_matches(':').trim().to_string()
}

fn unquote(raw: &str) -> String {
    raw.trim_matches(|ch| ch == '"' || ch == '\'' || ch == '`')
        .to_string()
}
