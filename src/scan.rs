use crate::config::ProjectConfig;
use crate::model::Language;
use anyhow::{Context, Result};
use blake3::Hasher;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub hash: String,
    pub last_modified: i64,
    pub language: Language,
}

#[derive(Debug, Clone)]
struct LanguageSpec {
    language: Language,
    extensions: &'static [&'static str],
}

static LANGUAGE_SPECS: &[LanguageSpec] = &[
    LanguageSpec {
        language: Language::Javascript,
        extensions: &["js", "jsx", "mjs", "cjs"],
    },
    LanguageSpec {
        language: Language::Typescript,
        extensions: &["ts", "tsx", "mts", "cts"],
    },
    LanguageSpec {
        language: Language::Python,
        extensions: &["py", "pyi"],
    },
    LanguageSpec {
        language: Language::Java,
        extensions: &["java"],
    },
];

pub fn detect_language(path: &Path) -> Option<Language> {
    let ext = path.extension().and_then(|ext| ext.to_str())?;
    for spec in LANGUAGE_SPECS {
        if spec.extensions.iter().any(|candidate| *candidate == ext) {
            return Some(spec.language);
        }
    }
    None
}

fn language_enabled(config: &ProjectConfig, language: Language) -> bool {
    config
        .languages
        .iter()
        .any(|name| name == language.as_str())
}

struct PatternFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl PatternFilter {
    fn build(config: &ProjectConfig) -> Result<Self> {
        Ok(Self {
            include: build_globset(&config.include).context("build include patterns")?,
            exclude: build_globset(&config.exclude).context("build exclude patterns")?,
        })
    }

    fn matches(&self, rel_path: &str) -> bool {
        if self.exclude.is_match(rel_path) {
            return false;
        }
        self.include.is_empty() || self.include.is_match(rel_path)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob =
            Glob::new(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;
        builder.add(glob);
    }
    builder.build().map_err(Into::into)
}

/// Enumerate indexable files under the project root: gitignore-aware
/// walk, include/exclude patterns from the project config, extension
/// filter for enabled languages. Results are sorted by relative path so
/// sync runs process files in a stable order.
pub fn scan_project(project_root: &Path, config: &ProjectConfig) -> Result<Vec<ScannedFile>> {
    let filter = PatternFilter::build(config)?;
    let mut files = Vec::new();
    let walker = WalkBuilder::new(project_root)
        .hidden(false)
        .ignore(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .parents(true)
        .require_git(false)
        .filter_entry(|entry| !is_ignored_entry(entry))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                eprintln!("code-graph: walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let Some(language) = detect_language(path) else {
            continue;
        };
        if !language_enabled(config, language) {
            continue;
        }
        let rel_path = match crate::util::normalize_rel_path(project_root, path) {
            Ok(value) => value,
            Err(_) => continue,
        };
        if !filter.matches(&rel_path) {
            continue;
        }
        match scan_file(path, &rel_path, language) {
            Ok(file) => files.push(file),
            Err(err) => eprintln!("code-graph: scan error {rel_path}: {err}"),
        }
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

/// Scan a single path. Returns None for paths the project does not
/// index (unsupported extension, excluded pattern, not a file).
pub fn scan_path(
    project_root: &Path,
    path: &Path,
    config: &ProjectConfig,
) -> Result<Option<ScannedFile>> {
    if !path.is_file() {
        return Ok(None);
    }
    let Some(language) = detect_language(path) else {
        return Ok(None);
    };
    if !language_enabled(config, language) {
        return Ok(None);
    }
    let rel_path = match crate::util::normalize_rel_path(project_root, path) {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };
    let filter = PatternFilter::build(config)?;
    if !filter.matches(&rel_path) {
        return Ok(None);
    }
    scan_file(path, &rel_path, language).map(Some)
}

fn scan_file(path: &Path, rel_path: &str, language: Language) -> Result<ScannedFile> {
    let metadata = fs::metadata(path)?;
    let last_modified = metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let hash = hash_file(path).with_context(|| format!("hash {}", path.display()))?;
    Ok(ScannedFile {
        rel_path: rel_path.to_string(),
        abs_path: path.to_path_buf(),
        hash,
        last_modified,
        language,
    })
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    match entry.file_name() {
        name if name == OsStr::new(crate::config::PROJECT_DIR) => true,
        name if name == OsStr::new(".git") => true,
        _ => false,
    }
}

pub fn hash_file(path: &Path) -> Result<String> {
    let data = fs::read(path)?;
    Ok(hash_bytes(&data))
}

pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_languages_by_extension() {
        assert_eq!(
            detect_language(Path::new("a.ts")),
            Some(Language::Typescript)
        );
        assert_eq!(
            detect_language(Path::new("a.tsx")),
            Some(Language::Typescript)
        );
        assert_eq!(
            detect_language(Path::new("a.mjs")),
            Some(Language::Javascript)
        );
        assert_eq!(detect_language(Path::new("a.py")), Some(Language::Python));
        assert_eq!(detect_language(Path::new("A.java")), Some(Language::Java));
        assert_eq!(detect_language(Path::new("a.rs")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
    }

    #[test]
    fn exclude_patterns_win_over_include() {
        let config = ProjectConfig::default();
        let filter = PatternFilter::build(&config).unwrap();
        assert!(filter.matches("src/a.ts"));
        assert!(!filter.matches("node_modules/pkg/index.js"));
        assert!(!filter.matches("web/dist/bundle.min.js"));
    }

    #[test]
    fn hash_is_content_derived() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
    }
}
