use crate::config::Config;
use crate::util;
use anyhow::{Context, Result};
use chrono::Local;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

const RESULT_TRUNCATE_CHARS: usize = 2000;

/// JSONL request/response logger for the tool server. Disabled unless
/// CODE_GRAPH_LOG=true; a failing log write is reported to stderr and
/// swallowed so it can never take the server down.
pub struct RequestLogger {
    enabled: bool,
    console: bool,
    dir: PathBuf,
}

impl RequestLogger {
    pub fn from_env() -> Self {
        let config = Config::get();
        Self {
            enabled: config.log_requests,
            console: config.log_console,
            dir: log_dir(),
        }
    }

    pub fn log_request(&self, tool: &str, arguments: &Value) {
        if !self.enabled {
            return;
        }
        self.append(json!({
            "timestamp": Local::now().to_rfc3339(),
            "type": "request",
            "tool": tool,
            "arguments": arguments,
        }));
    }

    pub fn log_response(
        &self,
        tool: &str,
        result: Option<&str>,
        error: Option<&str>,
        duration_ms: u64,
    ) {
        if !self.enabled {
            return;
        }
        let mut record = json!({
            "timestamp": Local::now().to_rfc3339(),
            "type": "response",
            "tool": tool,
            "tokenEstimate": result.map(util::estimate_tokens).unwrap_or(0),
            "durationMs": duration_ms,
        });
        if let Some(result) = result {
            record["result"] = Value::String(util::truncate_str_bytes(
                result,
                RESULT_TRUNCATE_CHARS,
            ));
        }
        if let Some(error) = error {
            record["error"] = Value::String(error.to_string());
        }
        self.append(record);
    }

    fn append(&self, record: Value) {
        let line = record.to_string();
        if self.console {
            eprintln!("{line}");
        }
        if let Err(err) = self.write_line(&line) {
            eprintln!("code-graph: log write failed: {err}");
        }
    }

    fn write_line(&self, line: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create {}", self.dir.display()))?;
        let path = self.dir.join(log_file_name(&Local::now().date_naive()));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

pub fn log_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".code-graph").join("logs")
}

fn log_file_name(date: &chrono::NaiveDate) -> String {
    format!("mcp-{}.jsonl", date.format("%Y-%m-%d"))
}

// -- CLI support for `code-graph logs` ----------------------------------

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFileInfo {
    pub name: String,
    pub size_bytes: u64,
}

pub fn list_log_files(dir: &PathBuf) -> Result<Vec<LogFileInfo>> {
    let mut files = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(files),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with("mcp-") || !name.ends_with(".jsonl") {
            continue;
        }
        files.push(LogFileInfo {
            size_bytes: entry.metadata().map(|m| m.len()).unwrap_or(0),
            name,
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

pub fn log_file_for_date(dir: &PathBuf, date: Option<&str>) -> PathBuf {
    match date {
        Some(date) => dir.join(format!("mcp-{date}.jsonl")),
        None => dir.join(log_file_name(&Local::now().date_naive())),
    }
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
    pub count: usize,
    pub errors: usize,
    pub avg_duration_ms: u64,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSummary {
    pub requests: usize,
    pub responses: usize,
    pub errors: usize,
    pub by_tool: BTreeMap<String, ToolStats>,
}

pub fn summarize(path: &PathBuf) -> Result<LogSummary> {
    let mut summary = LogSummary::default();
    let Ok(raw) = fs::read_to_string(path) else {
        return Ok(summary);
    };
    let mut durations: BTreeMap<String, (u64, usize)> = BTreeMap::new();
    for line in raw.lines() {
        let Ok(record) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let tool = record
            .get("tool")
            .and_then(|t| t.as_str())
            .unwrap_or("unknown")
            .to_string();
        match record.get("type").and_then(|t| t.as_str()) {
            Some("request") => summary.requests += 1,
            Some("response") => {
                summary.responses += 1;
                let stats = summary.by_tool.entry(tool.clone()).or_default();
                stats.count += 1;
                if record.get("error").is_some() {
                    stats.errors += 1;
                    summary.errors += 1;
                }
                let duration = record
                    .get("durationMs")
                    .and_then(|d| d.as_u64())
                    .unwrap_or(0);
                let entry = durations.entry(tool).or_default();
                entry.0 += duration;
                entry.1 += 1;
            }
            _ => {}
        }
    }
    for (tool, (total, count)) in durations {
        if let Some(stats) = summary.by_tool.get_mut(&tool) {
            stats.avg_duration_ms = if count > 0 { total / count as u64 } else { 0 };
        }
    }
    Ok(summary)
}

pub fn tail(path: &PathBuf, count: usize) -> Result<Vec<String>> {
    let Ok(raw) = fs::read_to_string(path) else {
        return Ok(Vec::new());
    };
    let lines: Vec<&str> = raw.lines().collect();
    let start = lines.len().saturating_sub(count);
    Ok(lines[start..].iter().map(|line| line.to_string()).collect())
}

pub fn clear(dir: &PathBuf) -> Result<usize> {
    let files = list_log_files(dir)?;
    let mut removed = 0;
    for info in &files {
        if fs::remove_file(dir.join(&info.name)).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_names_are_dated() {
        let date = chrono::NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(log_file_name(&date), "mcp-2025-03-09.jsonl");
    }

    #[test]
    fn summarize_counts_tools_and_errors() {
        let dir = std::env::temp_dir().join(format!(
            "code-graph-logtest-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mcp-2025-01-01.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"type\":\"request\",\"tool\":\"search_symbols\"}\n",
                "{\"type\":\"response\",\"tool\":\"search_symbols\",\"durationMs\":10}\n",
                "{\"type\":\"response\",\"tool\":\"search_symbols\",\"durationMs\":30}\n",
                "{\"type\":\"response\",\"tool\":\"get_graph_stats\",\"durationMs\":4,\"error\":\"boom\"}\n",
            ),
        )
        .unwrap();
        let summary = summarize(&path).unwrap();
        assert_eq!(summary.requests, 1);
        assert_eq!(summary.responses, 3);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.by_tool["search_symbols"].count, 2);
        assert_eq!(summary.by_tool["search_symbols"].avg_duration_ms, 20);
        fs::remove_dir_all(&dir).ok();
    }
}
