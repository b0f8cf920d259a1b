use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const PROJECT_DIR: &str = ".code-graph";
pub const CONFIG_FILE: &str = "config.json";
pub const DB_FILE: &str = "graph.db";

/// Per-project configuration persisted at `.code-graph/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub languages: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    #[serde(default = "default_auto_sync")]
    pub auto_sync: bool,
}

fn default_auto_sync() -> bool {
    true
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            languages: vec![
                "typescript".to_string(),
                "javascript".to_string(),
                "python".to_string(),
                "java".to_string(),
            ],
            include: vec!["**/*".to_string()],
            exclude: vec![
                "**/node_modules/**".to_string(),
                "**/dist/**".to_string(),
                "**/build/**".to_string(),
                "**/target/**".to_string(),
                "**/__pycache__/**".to_string(),
                "**/.git/**".to_string(),
                "**/*.min.js".to_string(),
            ],
            auto_sync: true,
        }
    }
}

pub fn project_dir(root: &Path) -> PathBuf {
    root.join(PROJECT_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    project_dir(root).join(CONFIG_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    project_dir(root).join(DB_FILE)
}

pub fn is_initialized(root: &Path) -> bool {
    config_path(root).is_file()
}

impl ProjectConfig {
    pub fn load(root: &Path) -> Result<ProjectConfig> {
        let path = config_path(root);
        if !path.is_file() {
            bail!(
                "project not initialised at {} (run `code-graph init` first)",
                root.display()
            );
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let dir = project_dir(root);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let path = config_path(root);
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(&path, raw).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Create `.code-graph/` with a default config and a .gitignore that
    /// keeps the store file (and its WAL side files) out of version
    /// control. Fails when already initialised unless `force` is set.
    pub fn init(root: &Path, force: bool) -> Result<ProjectConfig> {
        if is_initialized(root) && !force {
            bail!(
                "project already initialised at {} (use --force to overwrite)",
                root.display()
            );
        }
        let config = ProjectConfig::default();
        config.save(root)?;
        let gitignore = project_dir(root).join(".gitignore");
        fs::write(&gitignore, "graph.db\ngraph.db-wal\ngraph.db-shm\n")
            .with_context(|| format!("write {}", gitignore.display()))?;
        Ok(config)
    }
}

/// Process tuning read from environment variables once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Read pool size (CODE_GRAPH_POOL_SIZE)
    pub pool_size: u32,
    /// Read pool minimum idle connections (CODE_GRAPH_POOL_MIN_IDLE)
    pub pool_min_idle: u32,
    /// Request/response JSONL logging (CODE_GRAPH_LOG=true)
    pub log_requests: bool,
    /// Mirror log records to stderr (CODE_GRAPH_LOG_CONSOLE=true)
    pub log_console: bool,
}

static CONFIG: OnceLock<Config> = OnceLock::new();

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 8,
            pool_min_idle: 2,
            log_requests: false,
            log_console: false,
        }
    }
}

impl Config {
    fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(val) = env::var("CODE_GRAPH_POOL_SIZE") {
            if let Ok(parsed) = val.parse() {
                config.pool_size = parsed;
            } else {
                eprintln!(
                    "code-graph: invalid CODE_GRAPH_POOL_SIZE value: {}, using default: {}",
                    val, config.pool_size
                );
            }
        }

        if let Ok(val) = env::var("CODE_GRAPH_POOL_MIN_IDLE") {
            if let Ok(parsed) = val.parse() {
                config.pool_min_idle = parsed;
            } else {
                eprintln!(
                    "code-graph: invalid CODE_GRAPH_POOL_MIN_IDLE value: {}, using default: {}",
                    val, config.pool_min_idle
                );
            }
        }

        config.log_requests = env_flag("CODE_GRAPH_LOG");
        config.log_console = env_flag("CODE_GRAPH_LOG_CONSOLE");

        config
    }

    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|value| {
            let value = value.trim().to_ascii_lowercase();
            value == "true" || value == "1"
        })
        .unwrap_or(false)
}
