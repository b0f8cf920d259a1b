use anyhow::{bail, Result};
use clap::Parser;
use code_graph::{
    cli, config, logging, query, reconciler::Reconciler, resolver, server, store::Store, watch,
};
use serde_json::json;
use std::path::Path;

fn main() {
    let args = cli::Args::parse();
    if let Err(err) = run(args) {
        eprintln!("code-graph: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: cli::Args) -> Result<()> {
    match args.command {
        cli::Command::Init { project, force } => {
            let config = config::ProjectConfig::init(&project, force)?;
            println!(
                "initialised {} ({} languages)",
                config::project_dir(&project).display(),
                config.languages.len()
            );
            Ok(())
        }
        cli::Command::Sync {
            project,
            quiet,
            full,
            skip_resolve,
        } => {
            let mut reconciler = Reconciler::open(&project)?;
            if full {
                reset_graph(reconciler.store())?;
            }
            let report = reconciler.full_sync(quiet)?;
            if !skip_resolve && (report.processed > 0 || report.deleted > 0) {
                let resolved = resolver::resolve(reconciler.store())?;
                if !quiet {
                    eprintln!(
                        "code-graph: resolve resolved={} ambiguous={} unresolved={}",
                        resolved.resolved, resolved.ambiguous, resolved.unresolved
                    );
                }
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        cli::Command::Update {
            project,
            file,
            files,
        } => {
            let mut paths = Vec::new();
            if let Some(file) = file {
                paths.push(file);
            }
            if let Some(files) = files {
                paths.extend(
                    files
                        .lines()
                        .map(|line| line.trim().to_string())
                        .filter(|line| !line.is_empty()),
                );
            }
            if paths.is_empty() {
                bail!("update requires --file <path> or --files <newline-list>");
            }
            let mut reconciler = Reconciler::open(&project)?;
            let report = reconciler.update(&paths)?;
            if report.processed > 0 || report.deleted > 0 {
                resolver::resolve(reconciler.store())?;
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        cli::Command::Query {
            project,
            json,
            query,
        } => run_query(&project, query, json),
        cli::Command::Serve { project, mcp: _ } => server::serve(project),
        cli::Command::Watch { project, quiet } => watch::run(project, quiet),
        cli::Command::Resolve { project, quiet } => {
            let reconciler = Reconciler::open(&project)?;
            let report = resolver::resolve(reconciler.store())?;
            if !quiet {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(())
        }
        cli::Command::Status { project } => {
            if !config::is_initialized(&project) {
                bail!(
                    "project not initialised at {} (run `code-graph init` first)",
                    project.display()
                );
            }
            let store = Store::open(&config::db_path(&project))?;
            let stats = store.stats()?;
            let last_sync = store.get_meta_i64("last_sync")?;
            let status = json!({
                "project": project.display().to_string(),
                "initialised": true,
                "lastSync": last_sync,
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        cli::Command::Logs { action } => run_logs(action),
    }
}

fn run_query(project: &Path, command: cli::QueryCommand, json: bool) -> Result<()> {
    if !config::is_initialized(project) {
        bail!(
            "project not initialised at {} (run `code-graph init` first)",
            project.display()
        );
    }
    let store = Store::open(&config::db_path(project))?;
    match command {
        cli::QueryCommand::Stats => {
            let stats = store.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "{} nodes, {} edges across {} files ({} unresolved edges)",
                    stats.nodes, stats.edges, stats.files, stats.resolution.unresolved
                );
                for (kind, count) in &stats.by_type {
                    println!("  {kind:12} {count}");
                }
            }
        }
        cli::QueryCommand::File { path } => {
            let context = store.file_context(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&context)?);
            } else {
                println!(
                    "{}: {} symbols, {} incoming, {} outgoing",
                    context.file_path,
                    context.nodes.len(),
                    context.incoming.len(),
                    context.outgoing.len()
                );
                for node in &context.nodes {
                    println!(
                        "  {:10} {} [{}-{}]",
                        node.node_type.as_str(),
                        node.name,
                        node.line_start,
                        node.line_end
                    );
                }
            }
        }
        cli::QueryCommand::Search { query: term } => {
            let nodes = store.search_by_name(&term, query::SEARCH_LIMIT)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                for node in &nodes {
                    println!(
                        "{:10} {} ({}:{})",
                        node.node_type.as_str(),
                        node.name,
                        node.file_path,
                        node.line_start
                    );
                }
                println!("{} match(es)", nodes.len());
            }
        }
        cli::QueryCommand::Refs { symbol } => {
            let references = query::find_references(&store, &symbol)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&references)?);
            } else {
                for reference in &references {
                    println!(
                        "{} ({}:{}), {} usage(s)",
                        reference.definition.name,
                        reference.definition.file_path,
                        reference.definition.line_start,
                        reference.usages.len()
                    );
                    for usage in &reference.usages {
                        println!(
                            "  {} {} ({})",
                            usage.edge_type.as_str(),
                            usage.node.name,
                            usage.node.file_path
                        );
                    }
                }
            }
        }
        cli::QueryCommand::Callers { function } => {
            let Some(graph) = query::call_graph(&store, &function)? else {
                bail!("function not found: {function}");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&graph.callers)?);
            } else {
                for node in &graph.callers {
                    println!("{} ({}:{})", node.name, node.file_path, node.line_start);
                }
                println!("{} caller(s) of {}", graph.callers.len(), graph.function.name);
            }
        }
        cli::QueryCommand::Callees { function } => {
            let Some(graph) = query::call_graph(&store, &function)? else {
                bail!("function not found: {function}");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&graph.callees)?);
            } else {
                for node in &graph.callees {
                    println!("{} ({}:{})", node.name, node.file_path, node.line_start);
                }
                println!("{} callee(s) of {}", graph.callees.len(), graph.function.name);
            }
        }
        cli::QueryCommand::Type { node_type } => {
            let Some(parsed) = code_graph::model::NodeType::parse(&node_type) else {
                bail!("unknown node type: {node_type}");
            };
            let nodes = store.get_by_type(parsed)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                for node in &nodes {
                    println!("{} ({}:{})", node.name, node.file_path, node.line_start);
                }
                println!("{} node(s)", nodes.len());
            }
        }
    }
    Ok(())
}

fn run_logs(action: cli::LogsCommand) -> Result<()> {
    let dir = logging::log_dir();
    match action {
        cli::LogsCommand::List { json } => {
            let files = logging::list_log_files(&dir)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                for info in &files {
                    println!("{}  {} bytes", info.name, info.size_bytes);
                }
                println!("{} file(s) in {}", files.len(), dir.display());
            }
        }
        cli::LogsCommand::Summary { date, json } => {
            let path = logging::log_file_for_date(&dir, date.as_deref());
            let summary = logging::summarize(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "{} request(s), {} response(s), {} error(s)",
                    summary.requests, summary.responses, summary.errors
                );
                for (tool, stats) in &summary.by_tool {
                    println!(
                        "  {tool:22} {} call(s), avg {}ms, {} error(s)",
                        stats.count, stats.avg_duration_ms, stats.errors
                    );
                }
            }
        }
        cli::LogsCommand::Tail { date, tail } => {
            let path = logging::log_file_for_date(&dir, date.as_deref());
            for line in logging::tail(&path, tail)? {
                println!("{line}");
            }
        }
        cli::LogsCommand::Clear => {
            let removed = logging::clear(&dir)?;
            println!("removed {removed} log file(s)");
        }
        cli::LogsCommand::Path => {
            println!("{}", dir.display());
        }
    }
    Ok(())
}

/// `sync --full` drops every indexed file so the whole tree re-parses.
fn reset_graph(store: &Store) -> Result<()> {
    for record in store.all_file_hashes()? {
        store.delete_by_file(&record.path)?;
    }
    Ok(())
}
