use crate::config;
use crate::context::{self, ContextRequest};
use crate::logging::RequestLogger;
use crate::model::NodeType;
use crate::query;
use crate::store::Store;
use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

/// Line-delimited JSON-RPC 2.0 tool server over stdin/stdout. One
/// request, one response, produced synchronously; malformed lines get a
/// parse error, unknown tools an error payload with isError.
pub fn serve(default_project: PathBuf) -> Result<()> {
    // autoSync keeps the graph fresh while the server runs; a watcher
    // that cannot start is not fatal.
    let _watcher = match config::ProjectConfig::load(&default_project) {
        Ok(project_config) if project_config.auto_sync => {
            crate::watch::start(default_project.clone(), true)
                .map_err(|err| eprintln!("code-graph: watcher unavailable: {err}"))
                .ok()
        }
        _ => None,
    };

    let mut state = State::new(default_project);
    let logger = RequestLogger::from_env();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(value) => value,
            Err(err) => {
                eprintln!("code-graph: stdin error: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(&line) {
            Ok(message) => handle_message(message, &mut state, &logger),
            Err(err) => Some(jsonrpc_error(
                Value::Null,
                -32700,
                &format!("parse error: {err}"),
            )),
        };

        if let Some(payload) = response {
            writeln!(stdout, "{}", serde_json::to_string(&payload)?)?;
            stdout.flush()?;
        }
    }

    Ok(())
}

struct State {
    default_project: PathBuf,
    stores: HashMap<PathBuf, Store>,
}

impl State {
    fn new(default_project: PathBuf) -> Self {
        Self {
            default_project,
            stores: HashMap::new(),
        }
    }

    fn project_root(&self, args: &Value) -> PathBuf {
        let requested = args
            .get("project_path")
            .and_then(|value| value.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.default_project.clone());
        std::fs::canonicalize(&requested).unwrap_or(requested)
    }

    fn store_for(&mut self, project_root: &PathBuf) -> Result<&Store> {
        if !config::is_initialized(project_root) {
            return Err(anyhow!(
                "project not initialised at {} (run `code-graph init` first)",
                project_root.display()
            ));
        }
        if !self.stores.contains_key(project_root) {
            let store = Store::open(&config::db_path(project_root))?;
            self.stores.insert(project_root.clone(), store);
        }
        Ok(self.stores.get(project_root).expect("store cache"))
    }
}

fn handle_message(message: Value, state: &mut State, logger: &RequestLogger) -> Option<Value> {
    let id = message.get("id").cloned();
    let method = message.get("method").and_then(|value| value.as_str());

    let Some(method) = method else {
        return id.map(|id| jsonrpc_error(id, -32600, "invalid request"));
    };

    match method {
        "initialize" => {
            let id = id?;
            Some(jsonrpc_result(id, initialize_result(&message)))
        }
        "notifications/initialized" => None,
        "ping" => id.map(|id| jsonrpc_result(id, json!({}))),
        "tools/list" => {
            let id = id?;
            Some(jsonrpc_result(id, json!({ "tools": tool_specs() })))
        }
        "tools/call" => {
            let id = id?;
            Some(handle_tool_call(id, &message, state, logger))
        }
        "resources/list" => id.map(|id| jsonrpc_result(id, json!({ "resources": [] }))),
        "prompts/list" => id.map(|id| jsonrpc_result(id, json!({ "prompts": [] }))),
        _ => id.map(|id| jsonrpc_error(id, -32601, "method not found")),
    }
}

fn initialize_result(message: &Value) -> Value {
    let protocol = message
        .get("params")
        .and_then(|params| params.get("protocolVersion"))
        .cloned()
        .unwrap_or_else(|| Value::String("2024-11-05".to_string()));
    json!({
        "protocolVersion": protocol,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": "code-graph",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "instructions": "Query the project's symbol graph: get_file_context for a file's \
symbols and cross-file edges, search_symbols for substring lookup, find_references and \
get_call_graph for usages, get_impact_analysis before risky edits, get_source_code and \
get_usage_examples for reading, get_editing_context for an edit-ready, token-budgeted \
bundle. Run `code-graph sync` first to build the graph.",
    })
}

fn handle_tool_call(
    id: Value,
    message: &Value,
    state: &mut State,
    logger: &RequestLogger,
) -> Value {
    let params = message.get("params").cloned().unwrap_or(Value::Null);
    let tool = params
        .get("name")
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string();
    let args = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    logger.log_request(&tool, &args);
    let started = Instant::now();
    let outcome = dispatch_tool(&tool, &args, state);
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(result) => {
            let text = serde_json::to_string_pretty(&result)
                .unwrap_or_else(|err| format!("{{\"error\":\"serialise: {err}\"}}"));
            logger.log_response(&tool, Some(&text), None, duration_ms);
            jsonrpc_result(
                id,
                json!({
                    "content": [{ "type": "text", "text": text }],
                }),
            )
        }
        Err(err) => {
            let text = json!({ "error": err.to_string() }).to_string();
            logger.log_response(&tool, None, Some(&err.to_string()), duration_ms);
            jsonrpc_result(
                id,
                json!({
                    "content": [{ "type": "text", "text": text }],
                    "isError": true,
                }),
            )
        }
    }
}

fn dispatch_tool(tool: &str, args: &Value, state: &mut State) -> Result<Value> {
    let project_root = state.project_root(args);
    match tool {
        "get_file_context" => {
            let file_path = require_str(args, "file_path")?;
            let store = state.store_for(&project_root)?;
            let context = store.file_context(file_path)?;
            Ok(serde_json::to_value(context)?)
        }
        "search_symbols" => {
            let query_text = require_str(args, "query")?;
            let store = state.store_for(&project_root)?;
            let nodes = store.search_by_name(query_text, query::SEARCH_LIMIT)?;
            Ok(json!({
                "query": query_text,
                "truncated": nodes.len() == query::SEARCH_LIMIT,
                "symbols": nodes,
            }))
        }
        "find_references" => {
            let symbol = require_str(args, "symbol")?;
            let store = state.store_for(&project_root)?;
            let references = query::find_references(store, symbol)?;
            Ok(serde_json::to_value(references)?)
        }
        "get_call_graph" => {
            let function_name = require_str(args, "function_name")?;
            let store = state.store_for(&project_root)?;
            match query::call_graph(store, function_name)? {
                Some(graph) => Ok(serde_json::to_value(graph)?),
                None => Err(anyhow!("function not found: {function_name}")),
            }
        }
        "get_by_type" => {
            let type_name = require_str(args, "node_type")?;
            let node_type = NodeType::parse(type_name)
                .ok_or_else(|| anyhow!("unknown node type: {type_name}"))?;
            let store = state.store_for(&project_root)?;
            Ok(serde_json::to_value(store.get_by_type(node_type)?)?)
        }
        "get_graph_stats" => {
            let store = state.store_for(&project_root)?;
            Ok(serde_json::to_value(store.stats()?)?)
        }
        "get_impact_analysis" => {
            let file_path = require_str(args, "file_path")?;
            let store = state.store_for(&project_root)?;
            Ok(serde_json::to_value(query::impact_analysis(
                store, file_path,
            )?)?)
        }
        "get_source_code" => {
            let symbol_name = args.get("symbol_name").and_then(|v| v.as_str());
            let node_id = args.get("node_id").and_then(|v| v.as_str());
            if symbol_name.is_none() && node_id.is_none() {
                return Err(anyhow!("symbol_name or node_id is required"));
            }
            let context_lines = args
                .get("context_lines")
                .and_then(|v| v.as_i64())
                .unwrap_or(query::DEFAULT_CONTEXT_LINES);
            let store = state.store_for(&project_root)?;
            let lookup =
                query::source_code(store, &project_root, symbol_name, node_id, context_lines)?;
            Ok(serde_json::to_value(lookup)?)
        }
        "get_usage_examples" => {
            let symbol_name = require_str(args, "symbol_name")?;
            let max_examples = args
                .get("max_examples")
                .and_then(|v| v.as_u64())
                .unwrap_or(query::DEFAULT_MAX_EXAMPLES as u64) as usize;
            let context_lines = args
                .get("context_lines")
                .and_then(|v| v.as_i64())
                .unwrap_or(2);
            let store = state.store_for(&project_root)?;
            let examples = query::usage_examples(
                store,
                &project_root,
                symbol_name,
                max_examples,
                context_lines,
            )?;
            Ok(serde_json::to_value(examples)?)
        }
        "get_editing_context" => {
            let file_path = require_str(args, "file_path")?;
            let request = ContextRequest {
                file_path,
                task: args.get("task").and_then(|v| v.as_str()),
                max_tokens: args
                    .get("max_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(context::DEFAULT_MAX_TOKENS as u64)
                    as usize,
                include_tests: args
                    .get("include_tests")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            };
            let store = state.store_for(&project_root)?;
            let assembled = context::assemble(store, &project_root, &request)?;
            Ok(serde_json::to_value(assembled)?)
        }
        _ => Err(anyhow!("unknown tool: {tool}")),
    }
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|value| value.as_str())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("missing required argument: {key}"))
}

fn project_path_schema() -> Value {
    json!({
        "type": "string",
        "description": "Project root; defaults to the server's working project"
    })
}

fn tool_specs() -> Vec<Value> {
    vec![
        json!({
            "name": "get_file_context",
            "description": "Symbols in a file plus its cross-file dependency edges",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" },
                    "project_path": project_path_schema(),
                },
                "required": ["file_path"],
            },
        }),
        json!({
            "name": "search_symbols",
            "description": "Substring search over symbol names, capped at 100 results",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "project_path": project_path_schema(),
                },
                "required": ["query"],
            },
        }),
        json!({
            "name": "find_references",
            "description": "Definitions of a symbol and every edge pointing at them",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "symbol": { "type": "string" },
                    "project_path": project_path_schema(),
                },
                "required": ["symbol"],
            },
        }),
        json!({
            "name": "get_call_graph",
            "description": "Callers and callees of the first matching function",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "function_name": { "type": "string" },
                    "project_path": project_path_schema(),
                },
                "required": ["function_name"],
            },
        }),
        json!({
            "name": "get_by_type",
            "description": "All nodes of a type (class, endpoint, service, ...)",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "node_type": { "type": "string" },
                    "project_path": project_path_schema(),
                },
                "required": ["node_type"],
            },
        }),
        json!({
            "name": "get_graph_stats",
            "description": "Node/edge totals with per-type, per-language and resolution breakdowns",
            "inputSchema": {
                "type": "object",
                "properties": { "project_path": project_path_schema() },
            },
        }),
        json!({
            "name": "get_impact_analysis",
            "description": "Exported symbols, dependent files and a risk level for a file",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" },
                    "project_path": project_path_schema(),
                },
                "required": ["file_path"],
            },
        }),
        json!({
            "name": "get_source_code",
            "description": "Source of a symbol with context lines; suggests names on a miss",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "project_path": project_path_schema(),
                    "symbol_name": { "type": "string" },
                    "node_id": { "type": "string" },
                    "context_lines": { "type": "integer" },
                },
            },
        }),
        json!({
            "name": "get_usage_examples",
            "description": "Snippets showing where and how a symbol is used",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "project_path": project_path_schema(),
                    "symbol_name": { "type": "string" },
                    "max_examples": { "type": "integer", "default": 5 },
                    "context_lines": { "type": "integer", "default": 2 },
                },
                "required": ["symbol_name"],
            },
        }),
        json!({
            "name": "get_editing_context",
            "description": "Token-budgeted editing context: target file, imports, dependents, related types",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "project_path": project_path_schema(),
                    "file_path": { "type": "string" },
                    "task": { "type": "string" },
                    "max_tokens": { "type": "integer", "default": 8000 },
                    "include_tests": { "type": "boolean", "default": false },
                },
                "required": ["file_path"],
            },
        }),
    ]
}

fn jsonrpc_result(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

fn jsonrpc_error(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message,
        },
    })
}
