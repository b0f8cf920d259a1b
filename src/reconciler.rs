use crate::config::{self, ProjectConfig};
use crate::extractor::ExtractorSet;
use crate::model::SyncReport;
use crate::scan::{self, ScannedFile};
use crate::store::Store;
use crate::util;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Drives extraction: diffs disk against stored hashes, re-parses
/// changed files (always delete-then-insert), removes deleted files.
/// Per-file failures are isolated; a bad file never aborts the run.
pub struct Reconciler {
    project_root: PathBuf,
    config: ProjectConfig,
    store: Store,
    extractors: ExtractorSet,
}

impl Reconciler {
    pub fn open(project_root: &Path) -> Result<Self> {
        let project_root = std::fs::canonicalize(project_root)
            .unwrap_or_else(|_| project_root.to_path_buf());
        let config = ProjectConfig::load(&project_root)?;
        let store = Store::open(&config::db_path(&project_root))?;
        store.set_config_value("project_config", &serde_json::to_string(&config)?)?;
        Ok(Self {
            project_root,
            config,
            store,
            extractors: ExtractorSet::new()?,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Walk the whole project: new/changed files re-parse, unchanged
    /// files are skipped on hash equality, files gone from disk are
    /// deleted from the store.
    pub fn full_sync(&mut self, quiet: bool) -> Result<SyncReport> {
        let scanned = scan::scan_project(&self.project_root, &self.config)?;
        let stored: HashMap<String, String> = self
            .store
            .all_file_hashes()?
            .into_iter()
            .map(|record| (record.path, record.hash))
            .collect();

        let mut report = SyncReport::default();
        let mut seen = HashSet::new();
        for file in &scanned {
            seen.insert(file.rel_path.clone());
            if stored.get(&file.rel_path) == Some(&file.hash) {
                report.skipped += 1;
                continue;
            }
            match self.reparse(file) {
                Ok(()) => report.processed += 1,
                Err(err) => {
                    eprintln!("code-graph: parse error {}: {err}", file.rel_path);
                    report.errors += 1;
                }
            }
        }

        for path in stored.keys() {
            if !seen.contains(path) {
                self.store.delete_by_file(path)?;
                report.deleted += 1;
            }
        }

        if report.processed > 0 || report.deleted > 0 {
            self.mark_synced()?;
        }
        if !quiet {
            eprintln!(
                "code-graph: sync processed={} skipped={} deleted={} errors={}",
                report.processed, report.skipped, report.deleted, report.errors
            );
        }
        Ok(report)
    }

    /// Per-path variant of full_sync without the enumeration phase. A
    /// path missing from disk is treated as a deletion.
    pub fn update(&mut self, rel_paths: &[String]) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for rel_path in rel_paths {
            let abs_path = self.project_root.join(rel_path);
            if !abs_path.exists() {
                if self.store.get_file_hash(rel_path)?.is_some()
                    || !self.store.get_by_file(rel_path)?.is_empty()
                {
                    self.store.delete_by_file(rel_path)?;
                }
                report.deleted += 1;
                continue;
            }
            let Some(file) = scan::scan_path(&self.project_root, &abs_path, &self.config)? else {
                report.skipped += 1;
                continue;
            };
            if self
                .store
                .get_file_hash(&file.rel_path)?
                .map(|stored| stored.hash == file.hash)
                .unwrap_or(false)
            {
                report.skipped += 1;
                continue;
            }
            match self.reparse(&file) {
                Ok(()) => report.processed += 1,
                Err(err) => {
                    eprintln!("code-graph: parse error {}: {err}", file.rel_path);
                    report.errors += 1;
                }
            }
        }
        if report.processed > 0 || report.deleted > 0 {
            self.mark_synced()?;
        }
        Ok(report)
    }

    /// Absolute-path entry point used by the watcher.
    pub fn update_abs_paths(&mut self, paths: &[PathBuf]) -> Result<SyncReport> {
        let mut rel_paths = Vec::new();
        for path in paths {
            match util::normalize_rel_path(&self.project_root, path) {
                Ok(rel) => rel_paths.push(rel),
                Err(_) => continue,
            }
        }
        self.update(&rel_paths)
    }

    fn reparse(&mut self, file: &ScannedFile) -> Result<()> {
        let source = util::read_to_string(&file.abs_path)?;
        let extraction = self
            .extractors
            .extract(file.language, &file.rel_path, &source)?;
        self.store.replace_file(
            &file.rel_path,
            &extraction.nodes,
            &extraction.edges,
            &file.hash,
            file.last_modified,
        )?;
        Ok(())
    }

    fn mark_synced(&self) -> Result<()> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        self.store.set_meta_i64("last_sync", now)
    }
}
