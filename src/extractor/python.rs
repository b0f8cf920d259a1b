use crate::extractor::{
    contains_edge, file_node, make_node, ref_edge, CallSink, Extraction, PYTHON_BUILTINS,
};
use crate::ids::RefKind;
use crate::model::{
    ClassMeta, EdgeType, FunctionMeta, ImportMeta, Language, MethodMeta, NamedImport,
    NodeMetadata, NodeType, Parameter, VariableMeta,
};
use anyhow::Result;
use tree_sitter::{Node, Parser};

pub struct PythonExtractor {
    parser: Parser,
}

impl PythonExtractor {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into())?;
        Ok(Self { parser })
    }

    pub fn extract(&mut self, file_path: &str, source: &str) -> Result<Extraction> {
        let mut output = Extraction::default();
        let file = file_node(file_path, source, Language::Python);
        let file_id = file.id.clone();
        output.nodes.push(file);

        let Some(tree) = self.parser.parse(source, None) else {
            return Ok(output);
        };
        let root = tree.root_node();

        let ctx = Context {
            file_path,
            file_id: &file_id,
            class: None,
        };
        walk_block(root, &ctx, source, &mut output);
        Ok(output)
    }
}

struct Context<'a> {
    file_path: &'a str,
    file_id: &'a str,
    /// Enclosing class, when walking a class body.
    class: Option<(&'a str, &'a str)>,
}

fn walk_block(block: Node<'_>, ctx: &Context<'_>, source: &str, output: &mut Extraction) {
    let mut cursor = block.walk();
    for child in block.named_children(&mut cursor) {
        match child.kind() {
            "decorated_definition" => {
                let decorators = decorator_names(child, source);
                if let Some(definition) = child.child_by_field_name("definition") {
                    handle_definition(definition, ctx, source, &decorators, output);
                }
            }
            "class_definition" | "function_definition" => {
                handle_definition(child, ctx, source, &[], output)
            }
            "expression_statement" => {
                if ctx.class.is_none() {
                    handle_module_assignment(child, ctx, source, output);
                }
            }
            "import_statement" => handle_import(child, ctx, source, output),
            "import_from_statement" => handle_from_import(child, ctx, source, output),
            _ => {}
        }
    }
}

fn handle_definition(
    node: Node<'_>,
    ctx: &Context<'_>,
    source: &str,
    decorators: &[String],
    output: &mut Extraction,
) {
    match node.kind() {
        "class_definition" => handle_class(node, ctx, source, decorators, output),
        "function_definition" => handle_function(node, ctx, source, decorators, output),
        _ => {}
    }
}

/// `import X [as Y]` - one import node per target.
fn handle_import(node: Node<'_>, ctx: &Context<'_>, source: &str, output: &mut Extraction) {
    let (line_start, line_end) = span(node);
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let (module, alias) = match child.kind() {
            "dotted_name" => (node_text(child, source), None),
            "aliased_import" => {
                let Some(name) = child.child_by_field_name("name") else {
                    continue;
                };
                (
                    node_text(name, source),
                    child
                        .child_by_field_name("alias")
                        .map(|a| node_text(a, source)),
                )
            }
            _ => continue,
        };
        if module.is_empty() {
            continue;
        }
        let import = make_node(
            ctx.file_path,
            NodeType::Import,
            &module,
            line_start,
            line_end,
            Language::Python,
            NodeMetadata::Import(ImportMeta {
                module_specifier: Some(module.clone()),
                import_type: Some("module".to_string()),
                alias,
                ..Default::default()
            }),
        );
        output.edges.push(contains_edge(ctx.file_id, &import.id));
        output.nodes.push(import);
    }
}

/// `from M import a, b [as c], *` - a single import node named after the
/// module (or "." when relative with no module part). Named imports are
/// de-duplicated by (name, alias).
fn handle_from_import(node: Node<'_>, ctx: &Context<'_>, source: &str, output: &mut Extraction) {
    let (module, is_relative) = match node.child_by_field_name("module_name") {
        Some(module_node) => {
            let text = node_text(module_node, source);
            let relative = module_node.kind() == "relative_import" || text.starts_with('.');
            (text, relative)
        }
        None => (".".to_string(), true),
    };
    let module = if module.is_empty() {
        ".".to_string()
    } else {
        module
    };

    let mut named_imports: Vec<NamedImport> = Vec::new();
    let mut is_wildcard = false;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if node
            .child_by_field_name("module_name")
            .map(|m| m.id() == child.id())
            .unwrap_or(false)
        {
            continue;
        }
        let entry = match child.kind() {
            "dotted_name" | "identifier" => Some(NamedImport {
                name: node_text(child, source),
                alias: None,
            }),
            "aliased_import" => child.child_by_field_name("name").map(|name| NamedImport {
                name: node_text(name, source),
                alias: child
                    .child_by_field_name("alias")
                    .map(|a| node_text(a, source)),
            }),
            "wildcard_import" => {
                is_wildcard = true;
                None
            }
            _ => None,
        };
        let Some(entry) = entry else {
            continue;
        };
        if entry.name.is_empty() {
            continue;
        }
        if !named_imports
            .iter()
            .any(|existing| existing.name == entry.name && existing.alias == entry.alias)
        {
            named_imports.push(entry);
        }
    }

    let (line_start, line_end) = span(node);
    let import = make_node(
        ctx.file_path,
        NodeType::Import,
        &module,
        line_start,
        line_end,
        Language::Python,
        NodeMetadata::Import(ImportMeta {
            module_specifier: Some(module.clone()),
            named_imports,
            import_type: Some("from".to_string()),
            is_relative,
            is_wildcard,
            ..Default::default()
        }),
    );
    output.edges.push(contains_edge(ctx.file_id, &import.id));
    output.nodes.push(import);
}

fn handle_class(
    node: Node<'_>,
    ctx: &Context<'_>,
    source: &str,
    decorators: &[String],
    output: &mut Extraction,
) {
    // Nested classes inside classes are not modelled.
    if ctx.class.is_some() {
        return;
    }
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let class_name = node_text(name_node, source);
    if class_name.is_empty() {
        return;
    }

    let mut bases = Vec::new();
    let mut is_abstract = false;
    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut cursor = superclasses.walk();
        for base in superclasses.named_children(&mut cursor) {
            if base.kind() == "keyword_argument" {
                let text = node_text(base, source);
                if text.contains("ABCMeta") {
                    is_abstract = true;
                }
                continue;
            }
            let text = node_text(base, source);
            if text.is_empty() {
                continue;
            }
            if text == "ABC" || text == "abc.ABC" || text.ends_with("ABCMeta") {
                is_abstract = true;
            }
            bases.push(text);
        }
    }

    let (line_start, line_end) = span(node);
    let docstring = node
        .child_by_field_name("body")
        .and_then(|body| block_docstring(body, source));
    let class = make_node(
        ctx.file_path,
        NodeType::Class,
        &class_name,
        line_start,
        line_end,
        Language::Python,
        NodeMetadata::Class(ClassMeta {
            bases: bases.clone(),
            decorators: decorators.to_vec(),
            is_abstract,
            docstring,
            ..Default::default()
        }),
    );
    let class_id = class.id.clone();
    output.edges.push(contains_edge(ctx.file_id, &class_id));
    output.nodes.push(class);

    for base in &bases {
        if base == "object" {
            continue;
        }
        output.edges.push(ref_edge(
            &class_id,
            RefKind::Class,
            base,
            base,
            EdgeType::Extends,
            Some(line_start),
        ));
    }

    if let Some(body) = node.child_by_field_name("body") {
        let class_ctx = Context {
            file_path: ctx.file_path,
            file_id: ctx.file_id,
            class: Some((class_name.as_str(), class_id.as_str())),
        };
        walk_block(body, &class_ctx, source, output);
    }
}

fn handle_function(
    node: Node<'_>,
    ctx: &Context<'_>,
    source: &str,
    decorators: &[String],
    output: &mut Extraction,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let bare_name = node_text(name_node, source);
    if bare_name.is_empty() {
        return;
    }

    let is_async = has_keyword_child(node, "async");
    let parameters = parameters_of(node, source);
    let return_type = node
        .child_by_field_name("return_type")
        .map(|t| node_text(t, source));
    let docstring = node
        .child_by_field_name("body")
        .and_then(|body| block_docstring(body, source));
    let is_dunder = bare_name.starts_with("__") && bare_name.ends_with("__");
    let is_private = !is_dunder && bare_name.starts_with('_');
    let has_decorator = |name: &str| decorators.iter().any(|d| d == name);

    let (line_start, line_end) = span(node);
    let (node_type, name, metadata) = match ctx.class {
        Some((class_name, _)) => (
            NodeType::Method,
            format!("{class_name}.{bare_name}"),
            NodeMetadata::Method(MethodMeta {
                is_static: has_decorator("staticmethod"),
                is_async,
                is_class_method: has_decorator("classmethod"),
                is_property: has_decorator("property"),
                is_abstract: has_decorator("abstractmethod"),
                is_private,
                is_dunder,
                parameters,
                return_type,
                decorators: decorators.to_vec(),
                docstring,
                ..Default::default()
            }),
        ),
        None => (
            NodeType::Function,
            bare_name.clone(),
            NodeMetadata::Function(FunctionMeta {
                is_async,
                parameters,
                return_type,
                decorators: decorators.to_vec(),
                is_private,
                is_dunder,
                docstring,
                ..Default::default()
            }),
        ),
    };

    let function = make_node(
        ctx.file_path,
        node_type,
        &name,
        line_start,
        line_end,
        Language::Python,
        metadata,
    );
    let function_id = function.id.clone();
    let parent_id = ctx.class.map(|(_, id)| id).unwrap_or(ctx.file_id);
    output.edges.push(contains_edge(parent_id, &function_id));
    output.nodes.push(function);

    if let Some(body) = node.child_by_field_name("body") {
        let mut sink = CallSink::new(&function_id, RefKind::Function);
        collect_calls(body, source, &mut sink);
        output.edges.extend(sink.edges);
    }
}

/// Only SCREAMING_CASE module-level assignments become variable nodes.
fn handle_module_assignment(
    node: Node<'_>,
    ctx: &Context<'_>,
    source: &str,
    output: &mut Extraction,
) {
    let Some(assignment) = node.named_child(0) else {
        return;
    };
    if assignment.kind() != "assignment" {
        return;
    }
    let Some(left) = assignment.child_by_field_name("left") else {
        return;
    };
    if left.kind() != "identifier" {
        return;
    }
    let name = node_text(left, source);
    if !is_constant_name(&name) {
        return;
    }
    let (line_start, line_end) = span(assignment);
    let variable = make_node(
        ctx.file_path,
        NodeType::Variable,
        &name,
        line_start,
        line_end,
        Language::Python,
        NodeMetadata::Variable(VariableMeta {
            var_type: assignment
                .child_by_field_name("type")
                .map(|t| node_text(t, source)),
            ..Default::default()
        }),
    );
    output.edges.push(contains_edge(ctx.file_id, &variable.id));
    output.nodes.push(variable);
}

fn is_constant_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_uppercase() {
        return false;
    }
    chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
}

/// Walk a function body for calls, skipping nested def/class scopes.
fn collect_calls(node: Node<'_>, source: &str, sink: &mut CallSink<'_>) {
    if matches!(node.kind(), "function_definition" | "class_definition") {
        return;
    }
    if node.kind() == "call" {
        if let Some(function) = node.child_by_field_name("function") {
            if let Some(name) = call_name(function, source) {
                if !(function.kind() == "identifier"
                    && PYTHON_BUILTINS.contains(&name.as_str()))
                {
                    sink.add(&name, function.start_position().row as i64 + 1);
                }
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
        "attribute" => {
            let object = node.child_by_field_name("object")?;
            let attribute = node.child_by_field_name("attribute")?;
            let base = call_name(object, source)?;
            Some(format!("{base}.{}", node_text(attribute, source)))
        }
        _ => None,
    }
}

/// Trailing identifier of the decorator expression: `@app.route("/x")`
/// and `@functools.lru_cache` both yield the last attribute name.
fn decorator_names(node: Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "decorator" {
            continue;
        }
        let Some(expr) = child.named_child(0) else {
            continue;
        };
        if let Some(name) = decorator_trailing_name(expr, source) {
            names.push(name);
        }
    }
    names
}

fn decorator_trailing_name(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source)),
        "attribute" => node
            .child_by_field_name("attribute")
            .map(|n| node_text(n, source)),
        "call" => node
            .child_by_field_name("function")
            .and_then(|f| decorator_trailing_name(f, source)),
        _ => None,
    }
}

fn parameters_of(node: Node<'_>, source: &str) -> Vec<Parameter> {
    let Some(params_node) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut parameters = Vec::new();
    let mut cursor = params_node.walk();
    for param in params_node.named_children(&mut cursor) {
        let entry = match param.kind() {
            "identifier" => Some(Parameter {
                name: node_text(param, source),
                ..Default::default()
            }),
            "typed_parameter" => {
                let name = param
                    .named_child(0)
                    .map(|n| node_text(n, source))
                    .unwrap_or_default();
                Some(Parameter {
                    name,
                    param_type: param
                        .child_by_field_name("type")
                        .map(|t| node_text(t, source)),
                    default: None,
                })
            }
            "default_parameter" => param.child_by_field_name("name").map(|name| Parameter {
                name: node_text(name, source),
                param_type: None,
                default: param
                    .child_by_field_name("value")
                    .map(|v| node_text(v, source)),
            }),
            "typed_default_parameter" => {
                param.child_by_field_name("name").map(|name| Parameter {
                    name: node_text(name, source),
                    param_type: param
                        .child_by_field_name("type")
                        .map(|t| node_text(t, source)),
                    default: param
                        .child_by_field_name("value")
                        .map(|v| node_text(v, source)),
                })
            }
            "list_splat_pattern" => Some(Parameter {
                name: format!("*{}", inner_identifier(param, source)),
                ..Default::default()
            }),
            "dictionary_splat_pattern" => Some(Parameter {
                name: format!("**{}", inner_identifier(param, source)),
                ..Default::default()
            }),
            _ => None,
        };
        let Some(entry) = entry else {
            continue;
        };
        if entry.name.is_empty() || entry.name == "self" || entry.name == "cls" {
            continue;
        }
        parameters.push(entry);
    }
    parameters
}

fn inner_identifier(node: Node<'_>, source: &str) -> String {
    node.named_child(0)
        .map(|n| node_text(n, source))
        .unwrap_or_default()
}

fn block_docstring(block: Node<'_>, source: &str) -> Option<String> {
    let first = block.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let raw = node_text(string, source);
    Some(unquote_string(&raw))
}

fn unquote_string(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = trimmed.trim_start_matches(|ch: char| {
        matches!(ch, 'r' | 'R' | 'b' | 'B' | 'u' | 'U' | 'f' | 'F')
    });
    for quote in ["\"\"\"", "'''"] {
        if without_prefix.starts_with(quote) && without_prefix.len() >= 6 {
            return without_prefix
                .trim_start_matches(quote)
                .trim_end_matches(quote)
                .trim()
                .to_string();
        }
    }
    without_prefix
        .trim_matches(|ch| ch == '"' || ch == '\'')
        .to_string()
}

fn has_keyword_child(node: Node<'_>, keyword: &str) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).any(|c| c.kind() == keyword);
    result
}

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
