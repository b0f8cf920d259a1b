use crate::extractor::{
    contains_edge, file_node, make_node, ref_edge, strip_generics, CallSink, Extraction,
};
use crate::ids::RefKind;
use crate::model::{
    Annotation, ClassMeta, EdgeType, EndpointMeta, ImportMeta, InterfaceMeta, Language,
    MethodMeta, NodeMetadata, NodeType, Parameter, VariableMeta,
};
use anyhow::Result;
use tree_sitter::{Node, Parser};

const MAPPING_ANNOTATIONS: &[(&str, &str)] = &[
    ("GetMapping", "GET"),
    ("PostMapping", "POST"),
    ("PutMapping", "PUT"),
    ("DeleteMapping", "DELETE"),
    ("PatchMapping", "PATCH"),
    ("RequestMapping", "GET"),
];

const INJECTION_ANNOTATIONS: &[&str] = &["Autowired", "Inject", "Resource"];

pub struct JavaExtractor {
    parser: Parser,
}

impl JavaExtractor {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_java::LANGUAGE.into())?;
        Ok(Self { parser })
    }

    pub fn extract(&mut self, file_path: &str, source: &str) -> Result<Extraction> {
        let mut output = Extraction::default();
        let file = file_node(file_path, source, Language::Java);
        let file_id = file.id.clone();
        output.nodes.push(file);

        let Some(tree) = self.parser.parse(source, None) else {
            return Ok(output);
        };
        let root = tree.root_node();

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "package_declaration" => handle_package(child, file_path, &file_id, source, &mut output),
                "import_declaration" => handle_import(child, file_path, &file_id, source, &mut output),
                "class_declaration" => {
                    handle_class(child, file_path, &file_id, source, &mut output)
                }
                "interface_declaration" => {
                    handle_interface(child, file_path, &file_id, source, &mut output)
                }
                _ => {}
            }
        }
        Ok(output)
    }
}

fn handle_package(
    node: Node<'_>,
    file_path: &str,
    file_id: &str,
    source: &str,
    output: &mut Extraction,
) {
    let Some(name_node) = node.named_child(0) else {
        return;
    };
    let package = node_text(name_node, source);
    if package.is_empty() {
        return;
    }
    let (line_start, line_end) = span(node);
    let module = make_node(
        file_path,
        NodeType::Module,
        &package,
        line_start,
        line_end,
        Language::Java,
        NodeMetadata::Module,
    );
    output.edges.push(contains_edge(file_id, &module.id));
    output.nodes.push(module);
}

fn handle_import(
    node: Node<'_>,
    file_path: &str,
    file_id: &str,
    source: &str,
    output: &mut Extraction,
) {
    let mut is_static = false;
    let mut is_wildcard = false;
    let mut path = String::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "static" => is_static = true,
            "asterisk" => is_wildcard = true,
            "scoped_identifier" | "identifier" => path = node_text(child, source),
            _ => {}
        }
    }
    if path.is_empty() {
        return;
    }
    let (line_start, line_end) = span(node);
    let import = make_node(
        file_path,
        NodeType::Import,
        &path,
        line_start,
        line_end,
        Language::Java,
        NodeMetadata::Import(ImportMeta {
            module_specifier: Some(path.clone()),
            is_static,
            is_wildcard,
            ..Default::default()
        }),
    );
    output.edges.push(contains_edge(file_id, &import.id));
    output.nodes.push(import);
}

fn handle_class(
    node: Node<'_>,
    file_path: &str,
    file_id: &str,
    source: &str,
    output: &mut Extraction,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let class_name = node_text(name_node, source);
    if class_name.is_empty() {
        return;
    }

    let annotations = annotations_of(node, source);
    let modifiers = modifier_keywords(node, source);
    let node_type = stereotype(&annotations);
    let request_mapping = annotations
        .iter()
        .find(|a| a.name == "RequestMapping")
        .and_then(|a| a.value.clone());

    let (line_start, line_end) = span(node);
    let class = make_node(
        file_path,
        node_type,
        &class_name,
        line_start,
        line_end,
        Language::Java,
        NodeMetadata::Class(ClassMeta {
            annotations: annotations.clone(),
            modifiers: modifiers.clone(),
            is_abstract: modifiers.iter().any(|m| m == "abstract"),
            is_final: modifiers.iter().any(|m| m == "final"),
            request_mapping: request_mapping.clone(),
            ..Default::default()
        }),
    );
    let class_id = class.id.clone();
    output.edges.push(contains_edge(file_id, &class_id));
    output.nodes.push(class);

    if let Some(superclass) = node.child_by_field_name("superclass") {
        if let Some(base) = superclass.named_child(0) {
            let text = node_text(base, source);
            if !text.is_empty() {
                let stripped = strip_generics(&text).to_string();
                output.edges.push(ref_edge(
                    &class_id,
                    RefKind::Class,
                    &stripped,
                    &text,
                    EdgeType::Extends,
                    Some(line_start),
                ));
            }
        }
    }
    if let Some(interfaces) = node.child_by_field_name("interfaces") {
        for text in type_list_entries(interfaces, source) {
            let stripped = strip_generics(&text).to_string();
            output.edges.push(ref_edge(
                &class_id,
                RefKind::Interface,
                &stripped,
                &text,
                EdgeType::Implements,
                Some(line_start),
            ));
        }
    }

    let Some(body) = node.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        match member.kind() {
            "method_declaration" => handle_method(
                member,
                file_path,
                &class_name,
                &class_id,
                request_mapping.as_deref(),
                source,
                output,
            ),
            "field_declaration" => {
                handle_field(member, file_path, &class_name, &class_id, source, output)
            }
            "constructor_declaration" => handle_constructor(
                member,
                file_path,
                &class_name,
                &class_id,
                source,
                output,
            ),
            _ => {}
        }
    }
}

fn handle_interface(
    node: Node<'_>,
    file_path: &str,
    file_id: &str,
    source: &str,
    output: &mut Extraction,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, source);
    if name.is_empty() {
        return;
    }
    let mut methods = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            if member.kind() == "method_declaration" {
                if let Some(method_name) = member.child_by_field_name("name") {
                    methods.push(node_text(method_name, source));
                }
            }
        }
    }
    let (line_start, line_end) = span(node);
    let interface = make_node(
        file_path,
        NodeType::Interface,
        &name,
        line_start,
        line_end,
        Language::Java,
        NodeMetadata::Interface(InterfaceMeta {
            methods,
            ..Default::default()
        }),
    );
    let interface_id = interface.id.clone();
    output.edges.push(contains_edge(file_id, &interface_id));
    output.nodes.push(interface);

    if let Some(extends) = first_child_of_kind(node, "extends_interfaces") {
        for text in type_list_entries(extends, source) {
            let stripped = strip_generics(&text).to_string();
            output.edges.push(ref_edge(
                &interface_id,
                RefKind::Interface,
                &stripped,
                &text,
                EdgeType::Extends,
                Some(line_start),
            ));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_method(
    node: Node<'_>,
    file_path: &str,
    class_name: &str,
    class_id: &str,
    class_mapping: Option<&str>,
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
    let annotations = annotations_of(node, source);
    let modifiers = modifier_keywords(node, source);
    let parameters = parameters_of(node, source);
    let return_type = node
        .child_by_field_name("type")
        .map(|t| node_text(t, source));
    let (line_start, line_end) = span(node);

    let metadata = match endpoint_mapping(node, &annotations, class_mapping, source) {
        Some((http_method, path, full_path)) => NodeMetadata::Endpoint(EndpointMeta {
            http_method,
            path,
            full_path,
            parameters: parameters.clone(),
            return_type,
            annotations: annotations.clone(),
            modifiers: modifiers.clone(),
        }),
        None => NodeMetadata::Method(MethodMeta {
            is_static: modifiers.iter().any(|m| m == "static"),
            is_abstract: modifiers.iter().any(|m| m == "abstract"),
            visibility: visibility_of(&modifiers),
            parameters: parameters.clone(),
            return_type,
            annotations: annotations.clone(),
            modifiers: modifiers.clone(),
            ..Default::default()
        }),
    };
    let node_type = if matches!(metadata, NodeMetadata::Endpoint(_)) {
        NodeType::Endpoint
    } else {
        NodeType::Method
    };

    let method = make_node(
        file_path,
        node_type,
        &full_name,
        line_start,
        line_end,
        Language::Java,
        metadata,
    );
    let method_id = method.id.clone();
    output.edges.push(contains_edge(class_id, &method_id));
    output.nodes.push(method);

    // Setter injection: parameters annotated @Autowired / @Inject.
    for (param_type, param_annotations) in annotated_parameter_types(node, source) {
        if param_annotations
            .iter()
            .any(|a| a == "Autowired" || a == "Inject")
        {
            let stripped = strip_generics(&param_type).to_string();
            output.edges.push(ref_edge(
                &method_id,
                RefKind::Class,
                &stripped,
                &param_type,
                EdgeType::Autowires,
                Some(line_start),
            ));
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        let mut sink = CallSink::new(&method_id, RefKind::Method);
        collect_invocations(body, source, &mut sink);
        output.edges.extend(sink.edges);
    }
}

fn handle_field(
    node: Node<'_>,
    file_path: &str,
    class_name: &str,
    class_id: &str,
    source: &str,
    output: &mut Extraction,
) {
    let annotations = annotations_of(node, source);
    let modifiers = modifier_keywords(node, source);
    let field_type = node
        .child_by_field_name("type")
        .map(|t| node_text(t, source));
    let value_property = annotations
        .iter()
        .find(|a| a.name == "Value")
        .and_then(|a| a.value.clone());

    let mut cursor = node.walk();
    for declarator in node.named_children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = declarator.child_by_field_name("name") else {
            continue;
        };
        let field_name = node_text(name_node, source);
        if field_name.is_empty() {
            continue;
        }
        let full_name = format!("{class_name}.{field_name}");
        let (line_start, line_end) = span(node);
        let field = make_node(
            file_path,
            NodeType::Variable,
            &full_name,
            line_start,
            line_end,
            Language::Java,
            NodeMetadata::Variable(VariableMeta {
                is_static: modifiers.iter().any(|m| m == "static"),
                is_final: modifiers.iter().any(|m| m == "final"),
                visibility: visibility_of(&modifiers),
                var_type: field_type.clone(),
                annotations: annotations.clone(),
                modifiers: modifiers.clone(),
                value_property: value_property.clone(),
                ..Default::default()
            }),
        );
        let field_id = field.id.clone();
        output.edges.push(contains_edge(class_id, &field_id));
        output.nodes.push(field);

        let injected = annotations
            .iter()
            .any(|a| INJECTION_ANNOTATIONS.contains(&a.name.as_str()));
        if injected {
            if let Some(field_type) = &field_type {
                let stripped = strip_generics(field_type).to_string();
                output.edges.push(ref_edge(
                    &field_id,
                    RefKind::Class,
                    &stripped,
                    field_type,
                    EdgeType::Autowires,
                    Some(line_start),
                ));
            }
        }
    }
}

fn handle_constructor(
    node: Node<'_>,
    file_path: &str,
    class_name: &str,
    class_id: &str,
    source: &str,
    output: &mut Extraction,
) {
    let full_name = format!("{class_name}.<init>");
    let modifiers = modifier_keywords(node, source);
    let parameters = parameters_of(node, source);
    let (line_start, line_end) = span(node);
    let constructor = make_node(
        file_path,
        NodeType::Method,
        &full_name,
        line_start,
        line_end,
        Language::Java,
        NodeMetadata::Method(MethodMeta {
            is_constructor: true,
            visibility: visibility_of(&modifiers),
            parameters: parameters.clone(),
            annotations: annotations_of(node, source),
            modifiers,
            ..Default::default()
        }),
    );
    let constructor_id = constructor.id.clone();
    output.edges.push(contains_edge(class_id, &constructor_id));
    output.nodes.push(constructor);

    // Constructor injection: every parameter type is a dependency.
    for parameter in &parameters {
        let Some(param_type) = &parameter.param_type else {
            continue;
        };
        let stripped = strip_generics(param_type).to_string();
        output.edges.push(ref_edge(
            &constructor_id,
            RefKind::Class,
            &stripped,
            param_type,
            EdgeType::Injects,
            Some(line_start),
        ));
    }

    if let Some(body) = node.child_by_field_name("body") {
        let mut sink = CallSink::new(&constructor_id, RefKind::Method);
        collect_invocations(body, source, &mut sink);
        output.edges.extend(sink.edges);
    }
}

fn stereotype(annotations: &[Annotation]) -> NodeType {
    for annotation in annotations {
        match annotation.name.as_str() {
            "RestController" | "Controller" => return NodeType::Controller,
            "Service" => return NodeType::Service,
            "Repository" => return NodeType::Repository,
            "Component" => return NodeType::Component,
            _ => {}
        }
    }
    NodeType::Class
}

/// Endpoint detection: any HTTP-mapping annotation elevates the method.
/// Returns (httpMethod, path, fullPath).
fn endpoint_mapping(
    node: Node<'_>,
    annotations: &[Annotation],
    class_mapping: Option<&str>,
    source: &str,
) -> Option<(String, Option<String>, Option<String>)> {
    let mapping = annotations.iter().find_map(|annotation| {
        MAPPING_ANNOTATIONS
            .iter()
            .find(|(name, _)| *name == annotation.name)
            .map(|(name, default_method)| (*name, *default_method, annotation))
    })?;
    let (annotation_name, default_method, annotation) = mapping;

    let mut http_method = default_method.to_string();
    if annotation_name == "RequestMapping" {
        if let Some(explicit) = request_method_attribute(node, source) {
            http_method = explicit;
        }
    }

    let path = annotation.value.clone();
    let full_path = join_paths(class_mapping, path.as_deref());
    Some((http_method, path, full_path))
}

/// `@RequestMapping(method = RequestMethod.POST)` - the attribute wins
/// over the GET default.
fn request_method_attribute(node: Node<'_>, source: &str) -> Option<String> {
    let modifiers = first_child_of_kind(node, "modifiers")?;
    let mut cursor = modifiers.walk();
    for child in modifiers.named_children(&mut cursor) {
        if child.kind() != "annotation" {
            continue;
        }
        let Some(name_node) = child.child_by_field_name("name") else {
            continue;
        };
        if last_segment(&node_text(name_node, source)) != "RequestMapping" {
            continue;
        }
        let Some(args) = child.child_by_field_name("arguments") else {
            continue;
        };
        let mut args_cursor = args.walk();
        for arg in args.named_children(&mut args_cursor) {
            if arg.kind() != "element_value_pair" {
                continue;
            }
            let key = arg
                .child_by_field_name("key")
                .map(|k| node_text(k, source))
                .unwrap_or_default();
            if key != "method" {
                continue;
            }
            let value = arg
                .child_by_field_name("value")
                .map(|v| node_text(v, source))
                .unwrap_or_default();
            if let Some(method) = value.rsplit('.').next() {
                if !method.is_empty() {
                    return Some(method.to_string());
                }
            }
        }
    }
    None
}

/// Join the class-level mapping and the method path with exactly one
/// slash. A single present side passes through unchanged.
fn join_paths(base: Option<&str>, path: Option<&str>) -> Option<String> {
    match (base, path) {
        (None, None) => None,
        (Some(base), None) => Some(base.to_string()),
        (None, Some(path)) => Some(path.to_string()),
        (Some(base), Some(path)) => {
            let base = base.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            Some(format!("{base}/{path}"))
        }
    }
}

/// Annotations from the declaration's modifiers, with their primary
/// value extracted: a direct string literal, the first element of an
/// array initializer, or the value/path attribute.
fn annotations_of(node: Node<'_>, source: &str) -> Vec<Annotation> {
    let Some(modifiers) = first_child_of_kind(node, "modifiers") else {
        return Vec::new();
    };
    let mut annotations = Vec::new();
    let mut cursor = modifiers.walk();
    for child in modifiers.named_children(&mut cursor) {
        match child.kind() {
            "marker_annotation" => {
                if let Some(name) = child.child_by_field_name("name") {
                    annotations.push(Annotation {
                        name: last_segment(&node_text(name, source)),
                        value: None,
                    });
                }
            }
            "annotation" => {
                let Some(name) = child.child_by_field_name("name") else {
                    continue;
                };
                let value = child
                    .child_by_field_name("arguments")
                    .and_then(|args| annotation_value(args, source));
                annotations.push(Annotation {
                    name: last_segment(&node_text(name, source)),
                    value,
                });
            }
            _ => {}
        }
    }
    annotations
}

fn annotation_value(args: Node<'_>, source: &str) -> Option<String> {
    let mut fallback = None;
    let mut cursor = args.walk();
    for arg in args.named_children(&mut cursor) {
        match arg.kind() {
            "string_literal" => return Some(unquote(&node_text(arg, source))),
            "element_value_array_initializer" => {
                let mut inner = arg.walk();
                for element in arg.named_children(&mut inner) {
                    if element.kind() == "string_literal" {
                        return Some(unquote(&node_text(element, source)));
                    }
                }
            }
            "element_value_pair" => {
                let key = arg
                    .child_by_field_name("key")
                    .map(|k| node_text(k, source))
                    .unwrap_or_default();
                if key == "value" || key == "path" {
                    if let Some(value) = arg.child_by_field_name("value") {
                        if value.kind() == "string_literal" {
                            return Some(unquote(&node_text(value, source)));
                        }
                        if value.kind() == "element_value_array_initializer" {
                            let mut inner = value.walk();
                            for element in value.named_children(&mut inner) {
                                if element.kind() == "string_literal" {
                                    return Some(unquote(&node_text(element, source)));
                                }
                            }
                        }
                        if fallback.is_none() {
                            fallback = Some(node_text(value, source));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    fallback
}

fn modifier_keywords(node: Node<'_>, source: &str) -> Vec<String> {
    let Some(modifiers) = first_child_of_kind(node, "modifiers") else {
        return Vec::new();
    };
    let mut keywords = Vec::new();
    let mut cursor = modifiers.walk();
    for child in modifiers.children(&mut cursor) {
        if child.kind() == "annotation" || child.kind() == "marker_annotation" {
            continue;
        }
        let text = node_text(child, source);
        if !text.is_empty() {
            keywords.push(text);
        }
    }
    keywords
}

fn visibility_of(modifiers: &[String]) -> Option<String> {
    modifiers
        .iter()
        .find(|m| matches!(m.as_str(), "public" | "private" | "protected"))
        .cloned()
}

fn parameters_of(node: Node<'_>, source: &str) -> Vec<Parameter> {
    let Some(params_node) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut parameters = Vec::new();
    let mut cursor = params_node.walk();
    for param in params_node.named_children(&mut cursor) {
        if param.kind() != "formal_parameter" && param.kind() != "spread_parameter" {
            continue;
        }
        let name = param
            .child_by_field_name("name")
            .map(|n| node_text(n, source))
            .unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        parameters.push(Parameter {
            name,
            param_type: param
                .child_by_field_name("type")
                .map(|t| node_text(t, source)),
            default: None,
        });
    }
    parameters
}

/// Parameter types paired with their annotation names, for setter
/// injection detection.
fn annotated_parameter_types(node: Node<'_>, source: &str) -> Vec<(String, Vec<String>)> {
    let Some(params_node) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut cursor = params_node.walk();
    for param in params_node.named_children(&mut cursor) {
        if param.kind() != "formal_parameter" {
            continue;
        }
        let Some(param_type) = param
            .child_by_field_name("type")
            .map(|t| node_text(t, source))
        else {
            continue;
        };
        let mut names = Vec::new();
        if let Some(modifiers) = first_child_of_kind(param, "modifiers") {
            let mut inner = modifiers.walk();
            for annotation in modifiers.named_children(&mut inner) {
                if annotation.kind() == "annotation" || annotation.kind() == "marker_annotation" {
                    if let Some(name) = annotation.child_by_field_name("name") {
                        names.push(last_segment(&node_text(name, source)));
                    }
                }
            }
        }
        out.push((param_type, names));
    }
    out
}

fn collect_invocations(node: Node<'_>, source: &str, sink: &mut CallSink<'_>) {
    if node.kind() == "method_invocation" {
        if let Some(name) = invocation_name(node, source) {
            sink.add(&name, node.start_position().row as i64 + 1);
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_invocations(child, source, sink);
    }
}

fn invocation_name(node: Node<'_>, source: &str) -> Option<String> {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source))?;
    if name.is_empty() {
        return None;
    }
    match node.child_by_field_name("object") {
        Some(object) => {
            let base = receiver_name(object, source)?;
            Some(format!("{base}.{name}"))
        }
        None => Some(name),
    }
}

fn receiver_name(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" | "this" | "super" => Some(node_text(node, source)),
        "field_access" => {
            let object = node.child_by_field_name("object")?;
            let field = node.child_by_field_name("field")?;
            let base = receiver_name(object, source)?;
            Some(format!("{base}.{}", node_text(field, source)))
        }
        _ => None,
    }
}

fn type_list_entries(node: Node<'_>, source: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() == "type_list" {
            let mut cursor = current.walk();
            for child in current.named_children(&mut cursor) {
                let text = node_text(child, source);
                if !text.is_empty() {
                    entries.push(text);
                }
            }
            continue;
        }
        let mut cursor = current.walk();
        for child in current.named_children(&mut cursor) {
            stack.push(child);
        }
    }
    entries
}

fn first_child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let result = node.named_children(&mut cursor).find(|c| c.kind() == kind);
    result
}

fn last_segment(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_string()
}

fn unquote(raw: &str) -> String {
    raw.trim_matches('"').to_string()
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
