use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "code-graph",
    version,
    about = "Persistent symbol graph for multi-language repositories",
    after_help = r#"Examples:
  code-graph init
  code-graph sync
  code-graph update --file src/api/users.ts
  code-graph query stats
  code-graph query search UserService --json
  code-graph query callers handleRequest
  code-graph serve --mcp
  code-graph watch
  code-graph logs summary --date 2025-03-09
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create .code-graph/ with a default configuration.
    Init {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// Overwrite an existing configuration.
        #[arg(long)]
        force: bool,
    },
    /// Scan the project and reconcile the graph with disk.
    Sync {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        quiet: bool,
        /// Rebuild everything, ignoring stored file hashes.
        #[arg(long)]
        full: bool,
        /// Skip the reference-resolution pass after reconciling.
        #[arg(long)]
        skip_resolve: bool,
    },
    /// Reindex specific files (missing paths are removed from the graph).
    Update {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// A single project-relative path.
        #[arg(long)]
        file: Option<String>,
        /// Newline-separated list of project-relative paths.
        #[arg(long)]
        files: Option<String>,
    },
    /// Read-only queries over the stored graph.
    Query {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// Emit raw JSON instead of a readable summary.
        #[arg(long, global = true)]
        json: bool,
        #[command(subcommand)]
        query: QueryCommand,
    },
    /// Run the tool server over stdin/stdout.
    Serve {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// MCP-compatible framing (the default; kept for hooks).
        #[arg(long)]
        mcp: bool,
    },
    /// Watch the project and reindex changed files continuously.
    Watch {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        quiet: bool,
    },
    /// Run the reference-resolution pass by itself.
    Resolve {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        quiet: bool,
    },
    /// Show project and graph status.
    Status {
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
    /// Inspect the tool server's request logs.
    Logs {
        #[command(subcommand)]
        action: LogsCommand,
    },
}

#[derive(Subcommand)]
pub enum QueryCommand {
    /// Totals plus per-type / per-language breakdowns.
    Stats,
    /// Symbols in a file and its cross-file edges.
    File { path: String },
    /// Substring search over symbol names.
    Search { query: String },
    /// Definitions and usages of a symbol.
    Refs { symbol: String },
    /// Resolved callers of a function.
    Callers { function: String },
    /// Resolved callees of a function.
    Callees { function: String },
    /// All nodes of a given type.
    Type { node_type: String },
}

#[derive(Subcommand)]
pub enum LogsCommand {
    /// List log files with sizes.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Aggregate per-tool counts and durations for one day.
    Summary {
        /// YYYY-MM-DD; defaults to today.
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Print the last N records for one day.
    Tail {
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value_t = 20)]
        tail: usize,
    },
    /// Delete all log files.
    Clear,
    /// Print the log directory path.
    Path,
}
