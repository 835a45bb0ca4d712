//! On-demand queries against the source tree itself.
//!
//! These read files directly instead of going through the store, so they
//! see edits that have not been indexed yet. All paths in results are
//! relative to the source root and use `/` separators.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobMatcher};
use regex::Regex;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::lint::{self, LintIssue};
use crate::models::{Complexity, FileType};
use crate::scanner::{self, ClassBlock, FunctionFact, Scanner};

/// Glob used by [`search_code`] when the caller does not give one.
pub const DEFAULT_CODE_GLOB: &str = "**/*.{h,cpp}";

/// Default cap on the number of hits returned by a search.
pub const DEFAULT_MATCH_LIMIT: usize = 100;

/// One word-bounded occurrence of an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub file: String,
    pub line_number: usize,
    pub context: String,
}

/// One line matching a [`search_code`] pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeMatch {
    pub file: String,
    pub line_number: usize,
    pub line: String,
}

/// Files under `root` whose relative path satisfies `keep`, sorted by path.
/// Hidden files and directories are never visited.
pub fn source_files(root: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<(PathBuf, String)>> {
    if !root.is_dir() {
        bail!("Source root is not a directory: {}", root.display());
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = relative(root, entry.path());
        if keep(&rel) {
            files.push((entry.path().to_path_buf(), rel));
        }
    }
    Ok(files)
}

/// Every word-bounded occurrence of `identifier` in files with one of
/// `extensions`, up to `limit` hits.
pub fn find_references(
    root: &Path,
    extensions: &[String],
    identifier: &str,
    limit: usize,
) -> Result<Vec<Reference>> {
    if identifier.is_empty() || !identifier.chars().all(|c| c.is_alphanumeric() || c == '_') {
        bail!("'{}' is not an identifier", identifier);
    }
    let re = Regex::new(&format!(r"\b{}\b", regex::escape(identifier)))?;
    let files = source_files(root, |rel| {
        extensions.iter().any(|ext| rel.ends_with(ext.as_str()))
    })?;

    let mut refs = Vec::new();
    for (path, rel) in files {
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        for (idx, line) in text.lines().enumerate() {
            if re.is_match(line) {
                refs.push(Reference {
                    file: rel.clone(),
                    line_number: idx + 1,
                    context: line.trim().to_string(),
                });
                if refs.len() == limit {
                    return Ok(refs);
                }
            }
        }
    }
    Ok(refs)
}

/// Lines matching the regex `pattern` in files matching `glob`.
pub fn search_code(root: &Path, pattern: &str, glob: &str, limit: usize) -> Result<Vec<CodeMatch>> {
    let re = Regex::new(pattern).with_context(|| format!("invalid regex: {}", pattern))?;
    let matcher: GlobMatcher = Glob::new(glob)
        .with_context(|| format!("invalid glob: {}", glob))?
        .compile_matcher();
    let files = source_files(root, |rel| matcher.is_match(rel))?;

    let mut hits = Vec::new();
    for (path, rel) in files {
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        for (idx, line) in text.lines().enumerate() {
            if re.is_match(line) {
                hits.push(CodeMatch {
                    file: rel.clone(),
                    line_number: idx + 1,
                    line: line.trim().to_string(),
                });
                if hits.len() == limit {
                    return Ok(hits);
                }
            }
        }
    }
    Ok(hits)
}

/// Full scan of a single file, with class bodies and lint findings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysis {
    pub file: String,
    pub file_type: FileType,
    pub line_count: usize,
    pub complexity: Complexity,
    pub purpose: String,
    pub classes: Vec<ClassBlock>,
    pub functions: Vec<FunctionFact>,
    pub dependencies: Vec<String>,
    pub patterns: Vec<String>,
    pub key_features: Vec<String>,
    pub issues: Vec<LintIssue>,
}

pub fn analyze_file(
    root: &Path,
    file: &str,
    scanner: &Scanner,
    long_function_lines: usize,
) -> Result<FileAnalysis> {
    let path = resolve_under(root, file)?;
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let rel = relative(root, &path);
    let facts = scanner.scan(&text, &rel);

    let classes = facts
        .classes
        .iter()
        .filter_map(|c| scanner::extract_class_block(&text, &c.name))
        .collect();

    Ok(FileAnalysis {
        file: rel,
        file_type: facts.file_type,
        line_count: facts.line_count,
        complexity: facts.complexity,
        purpose: facts.purpose,
        classes,
        functions: facts.functions,
        dependencies: facts.dependencies,
        patterns: facts.patterns,
        key_features: facts.key_features,
        issues: lint::check(&text, long_function_lines),
    })
}

/// Join `file` onto `root`, refusing paths that climb out of it.
pub fn resolve_under(root: &Path, file: &str) -> Result<PathBuf> {
    let candidate = Path::new(file);
    if candidate.is_absolute() {
        if candidate.starts_with(root) {
            return Ok(candidate.to_path_buf());
        }
        bail!("{} is outside the source root", file);
    }
    if candidate.components().any(|c| matches!(c, Component::ParentDir)) {
        bail!("{} is outside the source root", file);
    }
    Ok(root.join(candidate))
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
