use crate::config;
use crate::reconciler::Reconciler;
use crate::resolver;
use crate::scan;
use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// Per-path coalescing window: a path reindexes only after it has been
/// quiet this long.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STABILITY_POLL: Duration = Duration::from_millis(50);
const STABILITY_ATTEMPTS: usize = 10;

pub struct WatchHandle {
    stop: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(());
    }
}

/// Watch in the background; used by `serve` when autoSync is on.
pub fn start(project_root: PathBuf, quiet: bool) -> Result<WatchHandle> {
    let (stop_tx, stop_rx) = mpsc::channel();
    let thread = thread::spawn(move || {
        if let Err(err) = watch_loop(&project_root, quiet, stop_rx) {
            eprintln!("code-graph: watcher stopped: {err}");
        }
    });
    Ok(WatchHandle {
        stop: stop_tx,
        thread: Some(thread),
    })
}

/// Blocking watch for the `watch` CLI command.
pub fn run(project_root: PathBuf, quiet: bool) -> Result<()> {
    let (_stop_tx, stop_rx) = mpsc::channel();
    watch_loop(&project_root, quiet, stop_rx)
}

fn watch_loop(project_root: &Path, quiet: bool, stop: Receiver<()>) -> Result<()> {
    let mut reconciler = Reconciler::open(project_root)?;
    let project_root = reconciler.project_root().to_path_buf();

    let (event_tx, event_rx) = mpsc::channel();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |result| {
        let _ = event_tx.send(result);
    })
    .context("create filesystem watcher")?;
    watcher
        .watch(&project_root, RecursiveMode::Recursive)
        .with_context(|| format!("watch {}", project_root.display()))?;

    if !quiet {
        eprintln!("code-graph: watching {}", project_root.display());
    }

    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    loop {
        match stop.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        match event_rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(event)) => {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    let now = Instant::now();
                    for path in event.paths {
                        if is_relevant(&project_root, &path) {
                            pending.insert(path, now);
                        }
                    }
                }
            }
            Ok(Err(err)) => eprintln!("code-graph: watch event error: {err}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, seen)| seen.elapsed() >= DEBOUNCE)
            .map(|(path, _)| path.clone())
            .collect();
        if ready.is_empty() {
            continue;
        }
        for path in &ready {
            pending.remove(path);
            await_write_stability(path);
        }

        match reconciler.update_abs_paths(&ready) {
            Ok(report) => {
                if report.processed > 0 || report.deleted > 0 {
                    if !quiet {
                        eprintln!(
                            "code-graph: reindexed {} path(s) ({} deleted)",
                            report.processed, report.deleted
                        );
                    }
                    match resolver::resolve(reconciler.store()) {
                        Ok(resolved) => {
                            if !quiet && resolved.resolved > 0 {
                                eprintln!(
                                    "code-graph: resolved {} edge(s)",
                                    resolved.resolved
                                );
                            }
                        }
                        Err(err) => eprintln!("code-graph: resolve failed: {err}"),
                    }
                }
            }
            Err(err) => eprintln!("code-graph: update failed: {err}"),
        }
    }

    Ok(())
}

fn is_relevant(project_root: &Path, path: &Path) -> bool {
    if path
        .components()
        .any(|comp| comp.as_os_str() == config::PROJECT_DIR || comp.as_os_str() == ".git")
    {
        return false;
    }
    if !path.starts_with(project_root) {
        return false;
    }
    scan::detect_language(path).is_some()
}

/// Editors write in bursts; wait until size and mtime settle before
/// reading. A vanished file is stable too - deletion is a valid state.
fn await_write_stability(path: &Path) {
    let mut last: Option<(u64, std::time::SystemTime)> = None;
    for _ in 0..STABILITY_ATTEMPTS {
        let current = match std::fs::metadata(path) {
            Ok(meta) => (
                meta.len(),
                meta.modified().unwrap_or(std::time::UNIX_EPOCH),
            ),
            Err(_) => return,
        };
        if last == Some(current) {
            return;
        }
        last = Some(current);
        thread::sleep(STABILITY_POLL);
    }
}
