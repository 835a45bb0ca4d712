//! Source tree indexer.
//!
//! Walks a directory, scans every tracked file with [`Scanner`], and writes
//! the derived [`ClassRecord`]s, [`FileRecord`]s, pattern sightings and
//! insights into the [`MemoryStore`].
//!
//! # Failure semantics
//!
//! - An unreadable traversal root fails the whole run before anything is written.
//! - A file that cannot be read (or is not UTF-8) is recorded in
//!   [`IndexStats::errors`] and the walk continues.
//!
//! # Pipeline
//!
//! ```text
//! walkdir(root, sorted) → ignore globs → extension filter
//!     → read → Scanner::scan + lint::check
//!     → remember_class / remember_file / observe_pattern / file insight
//! → project insights → optional source-index artifact
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::export::{self, SourceIndex};
use crate::lint;
use crate::models::{ClassRecord, FileRecord, FileType, Impact};
use crate::progress::{IndexProgressEvent, IndexProgressReporter};
use crate::scanner::{self, FileFacts, ScanLimits, Scanner};
use crate::store::MemoryStore;

/// Files longer than this always get a `file-analysis` insight.
const LARGE_FILE_LINES: usize = 1000;

/// Average lines per file above which the project is rated `high` / `medium`.
const HIGH_AVG_LINES: f64 = 500.0;
const MEDIUM_AVG_LINES: f64 = 200.0;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IndexError {
    pub file: String,
    pub error: String,
}

/// Counters for one indexing run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total_files: usize,
    pub processed_files: usize,
    pub skipped_files: usize,
    pub header_files: usize,
    pub implementation_files: usize,
    pub build_files: usize,
    pub total_lines: usize,
    pub classes_found: usize,
    pub errors: Vec<IndexError>,
}

impl IndexStats {
    fn count_type(&mut self, file_type: FileType) {
        if file_type.is_header() {
            self.header_files += 1;
        } else if file_type.is_implementation() {
            self.implementation_files += 1;
        } else if file_type == FileType::BuildScript {
            self.build_files += 1;
        }
    }

    /// Average lines per processed file, 0 when nothing was processed.
    pub fn average_lines(&self) -> f64 {
        if self.processed_files == 0 {
            0.0
        } else {
            self.total_lines as f64 / self.processed_files as f64
        }
    }
}

/// `low` / `medium` / `high` from average lines per file.
pub fn complexity_label(average_lines: f64) -> &'static str {
    if average_lines > HIGH_AVG_LINES {
        "high"
    } else if average_lines > MEDIUM_AVG_LINES {
        "medium"
    } else {
        "low"
    }
}

/// Result of rescanning a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum FileOutcome {
    /// Scanned and written.
    Indexed { file: String, classes: Vec<String> },
    /// Contents hash matches the stored record; nothing written.
    Unchanged { file: String },
    /// Ignored or not a tracked extension.
    Skipped { file: String },
}

pub struct Indexer {
    scanner: Scanner,
    ignore: GlobSet,
    extensions: Vec<String>,
    follow_symlinks: bool,
    long_function_lines: usize,
    project_name: String,
    engine_version: String,
    tech_stack: serde_json::Value,
    index_file: Option<PathBuf>,
}

impl Indexer {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            scanner: Scanner::new(ScanLimits::from(&config.scanner)),
            ignore: build_globset(&config.indexer.ignore_globs)?,
            extensions: config.indexer.extensions.clone(),
            follow_symlinks: config.indexer.follow_symlinks,
            long_function_lines: config.scanner.long_function_lines,
            project_name: config.project.name.clone(),
            engine_version: config.project.engine_version.clone(),
            tech_stack: serde_json::to_value(&config.project.tech_stack)?,
            index_file: config.store.index_file.clone(),
        })
    }

    fn is_tracked(&self, rel: &str) -> bool {
        self.extensions.iter().any(|ext| rel.ends_with(ext.as_str()))
    }

    fn is_ignored(&self, rel: &str) -> bool {
        self.ignore.is_match(rel)
    }

    /// Index every tracked file under `root`.
    ///
    /// Opens a session for the run when none is current and closes it
    /// afterwards; otherwise the run is logged into the current session.
    pub fn index_tree(
        &self,
        store: &mut MemoryStore,
        root: &Path,
        reporter: &dyn IndexProgressReporter,
    ) -> Result<IndexStats> {
        let meta = std::fs::metadata(root)
            .with_context(|| format!("Cannot read source root: {}", root.display()))?;
        if !meta.is_dir() {
            anyhow::bail!("Source root is not a directory: {}", root.display());
        }

        reporter.report(IndexProgressEvent::Discovering {
            root: root.display().to_string(),
        });

        let mut stats = IndexStats::default();
        let mut candidates: Vec<(PathBuf, String)> = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) if e.depth() == 0 => {
                    return Err(e).with_context(|| {
                        format!("Failed to walk source root: {}", root.display())
                    });
                }
                Err(e) => {
                    let file = e
                        .path()
                        .map(|p| relative(root, p))
                        .unwrap_or_else(|| "<unknown>".to_string());
                    stats.errors.push(IndexError {
                        file,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            stats.total_files += 1;
            let rel = relative(root, entry.path());
            if self.is_ignored(&rel) || !self.is_tracked(&rel) {
                stats.skipped_files += 1;
                continue;
            }
            candidates.push((entry.path().to_path_buf(), rel));
        }

        let owns_session = store.current_session().is_none();
        if owns_session {
            store.start_session(&format!("Codebase indexing: {}", root.display()))?;
        }

        let outcome = self.index_candidates(store, root, &candidates, &mut stats, reporter);
        let closed = if owns_session {
            let summary = match &outcome {
                Ok(()) => format!(
                    "Indexed {} files ({} lines, {} errors)",
                    stats.processed_files,
                    stats.total_lines,
                    stats.errors.len()
                ),
                Err(e) => format!(
                    "Indexing failed after {} files: {:#}",
                    stats.processed_files, e
                ),
            };
            store.end_session(&summary).map(|_| ())
        } else {
            Ok(())
        };
        outcome?;
        closed?;

        reporter.report(IndexProgressEvent::Finished {
            processed: stats.processed_files as u64,
            skipped: stats.skipped_files as u64,
            errors: stats.errors.len() as u64,
        });
        tracing::info!(
            processed = stats.processed_files,
            skipped = stats.skipped_files,
            errors = stats.errors.len(),
            "indexing finished"
        );

        Ok(stats)
    }

    /// Scan and record each candidate, then write the run's summary
    /// insights, event and optional source-index artifact.
    fn index_candidates(
        &self,
        store: &mut MemoryStore,
        root: &Path,
        candidates: &[(PathBuf, String)],
        stats: &mut IndexStats,
        reporter: &dyn IndexProgressReporter,
    ) -> Result<()> {
        let total = candidates.len() as u64;
        let mut index_entries: Vec<(String, FileType, Vec<String>)> = Vec::new();

        for (n, (path, rel)) in candidates.iter().enumerate() {
            reporter.report(IndexProgressEvent::Scanning {
                file: rel.clone(),
                n: n as u64 + 1,
                total,
            });

            let text = match std::fs::read_to_string(path) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(file = %rel, error = %e, "skipping unreadable file");
                    stats.errors.push(IndexError {
                        file: rel.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let facts = self.record_file(store, rel, &text)?;
            store.log_action(
                "file_indexed",
                json!({ "file": rel, "classes": facts.classes.len(), "lines": facts.line_count }),
            )?;

            stats.processed_files += 1;
            stats.total_lines += facts.line_count;
            stats.classes_found += facts.classes.len();
            stats.count_type(facts.file_type);
            index_entries.push((
                rel.clone(),
                facts.file_type,
                facts.classes.iter().map(|c| c.name.clone()).collect(),
            ));
        }

        self.record_project_insights(store, stats)?;
        store.add_development_event(
            "codebase_indexed",
            &format!(
                "Indexed {} of {} files under {}",
                stats.processed_files,
                stats.total_files,
                root.display()
            ),
            Vec::new(),
            Impact::Low,
        )?;

        if let Some(path) = &self.index_file {
            export::write_source_index(&self.source_index(&index_entries), path)?;
        }
        Ok(())
    }

    /// Rescan one file after an external change notification.
    ///
    /// Unlike [`index_tree`](Self::index_tree), a read failure is returned
    /// to the caller. The file is recorded as modified in the current session.
    pub fn index_file(
        &self,
        store: &mut MemoryStore,
        root: &Path,
        path: &Path,
    ) -> Result<FileOutcome> {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let rel = relative(root, &full);
        if self.is_ignored(&rel) || !self.is_tracked(&rel) {
            return Ok(FileOutcome::Skipped { file: rel });
        }

        let text = std::fs::read_to_string(&full)
            .with_context(|| format!("Failed to read {}", full.display()))?;
        let hash = content_hash(&text);
        if store
            .get_file_info(&rel)
            .is_some_and(|existing| existing.content_hash == hash)
        {
            return Ok(FileOutcome::Unchanged { file: rel });
        }

        let facts = self.record_file(store, &rel, &text)?;
        store.track_file_modified(&rel)?;
        store.log_action("file_reindexed", json!({ "file": rel }))?;

        Ok(FileOutcome::Indexed {
            classes: facts.classes.into_iter().map(|c| c.name).collect(),
            file: rel,
        })
    }

    /// Scan `text` and write everything derived from it into the store.
    fn record_file(&self, store: &mut MemoryStore, rel: &str, text: &str) -> Result<FileFacts> {
        let facts = self.scanner.scan(text, rel);
        let issues = lint::check(text, self.long_function_lines);
        let now = Utc::now();

        for class in &facts.classes {
            store.remember_class(
                &class.name,
                ClassRecord {
                    file: rel.to_string(),
                    line_count: facts.line_count,
                    file_type: facts.file_type,
                    inheritance: class.parent.clone(),
                    is_framework_class: class.is_framework_class,
                    has_class_annotation: class.has_class_annotation,
                    functions: facts.functions.len(),
                    dependencies: facts.dependencies.clone(),
                    purpose: facts.purpose.clone(),
                    complexity: facts.complexity,
                    patterns: facts.patterns.clone(),
                    key_features: facts.key_features.clone(),
                    has_components: !facts.framework.components.is_empty(),
                    last_updated: now,
                },
            )?;
        }

        store.remember_file(
            rel,
            FileRecord {
                file_name: facts.file_name.clone(),
                file_type: facts.file_type,
                line_count: facts.line_count,
                size: text.len() as u64,
                content_hash: content_hash(text),
                classes: facts.classes.iter().map(|c| c.name.clone()).collect(),
                functions: facts.functions.iter().map(|f| f.name.clone()).collect(),
                includes: facts.includes.clone(),
                dependencies: facts.dependencies.clone(),
                patterns: facts.patterns.clone(),
                complexity: facts.complexity,
                purpose: facts.purpose.clone(),
                key_features: facts.key_features.clone(),
                framework_features: facts.framework.clone(),
                issue_count: issues.len(),
                indexed: now,
                last_updated: now,
            },
        )?;

        for pattern in &facts.patterns {
            let description = scanner::naming_rule_description(pattern).unwrap_or(pattern.as_str());
            store.observe_pattern(pattern, description, &facts.file_name)?;
        }

        if facts.line_count > LARGE_FILE_LINES || !facts.classes.is_empty() {
            store.add_insight(
                "file-analysis",
                &format!(
                    "Analyzed {}: {} classes, {} lines, {}",
                    facts.file_name,
                    facts.classes.len(),
                    facts.line_count,
                    facts.purpose
                ),
                json!({
                    "file": rel,
                    "classes": facts.classes.iter().map(|c| &c.name).collect::<Vec<_>>(),
                    "complexity": facts.complexity,
                    "keyFeatures": facts.key_features,
                }),
            )?;
        }

        Ok(facts)
    }

    fn record_project_insights(&self, store: &mut MemoryStore, stats: &IndexStats) -> Result<()> {
        let framework_classes = store
            .document()
            .key_classes
            .values()
            .filter(|c| c.is_framework_class)
            .count();
        store.add_insight(
            "architecture-analysis",
            &format!(
                "Project has {} known classes ({} framework classes) across {} indexed files",
                store.document().key_classes.len(),
                framework_classes,
                store.document().important_files.len()
            ),
            json!({
                "classes": store.document().key_classes.len(),
                "frameworkClasses": framework_classes,
                "headerFiles": stats.header_files,
                "implementationFiles": stats.implementation_files,
                "buildFiles": stats.build_files,
            }),
        )?;

        let average = stats.average_lines();
        let label = complexity_label(average);
        store.add_insight(
            "complexity-analysis",
            &format!(
                "Average file size is {:.0} lines ({} complexity)",
                average, label
            ),
            json!({
                "averageLinesPerFile": average.round(),
                "totalLines": stats.total_lines,
                "complexity": label,
            }),
        )?;

        store.add_insight(
            "technology-stack",
            &format!("Technology stack for {}", self.project_name),
            self.tech_stack.clone(),
        )?;

        store.add_insight(
            "indexing-summary",
            &format!(
                "Indexed {} of {} files ({} skipped, {} errors)",
                stats.processed_files,
                stats.total_files,
                stats.skipped_files,
                stats.errors.len()
            ),
            serde_json::to_value(stats)?,
        )?;
        Ok(())
    }

    fn source_index(&self, entries: &[(String, FileType, Vec<String>)]) -> SourceIndex {
        SourceIndex {
            project_name: self.project_name.clone(),
            engine_version: self.engine_version.clone(),
            indexed: Utc::now(),
            source_files: entries.iter().map(|(f, _, _)| f.clone()).collect(),
            header_files: entries
                .iter()
                .filter(|(_, t, _)| t.is_header())
                .map(|(f, _, _)| f.clone())
                .collect(),
            implementation_files: entries
                .iter()
                .filter(|(_, t, _)| t.is_implementation())
                .map(|(f, _, _)| f.clone())
                .collect(),
            classes: entries.iter().flat_map(|(_, _, c)| c.clone()).collect(),
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// `path` relative to `root`, with `/` separators.
fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Config, MemoryStore) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.store.dir = tmp.path().join("data");
        config.indexer.root = tmp.path().join("Source");
        fs::create_dir_all(&config.indexer.root).unwrap();
        let store = MemoryStore::open(&config).unwrap();
        (tmp, config, store)
    }

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn indexes_class_with_parent_and_annotated_function() {
        let (_tmp, config, mut store) = setup();
        let root = config.indexer.root.clone();
        write(
            &root,
            "Game/Foo.h",
            "class AFoo : public ABar {\n  UFUNCTION()\n  void DoThing();\n};\n",
        );

        let indexer = Indexer::new(&config).unwrap();
        let stats = indexer.index_tree(&mut store, &root, &NoProgress).unwrap();
        assert_eq!(stats.processed_files, 1);
        assert_eq!(stats.header_files, 1);

        let class = store.get_class_info("AFoo").unwrap();
        assert_eq!(class.inheritance.as_deref(), Some("ABar"));
        assert!(class.is_framework_class);
        assert_eq!(class.file, "Game/Foo.h");

        let file = store.get_file_info("Game/Foo.h").unwrap();
        assert_eq!(file.functions, vec!["DoThing"]);
        assert_eq!(file.classes, vec!["AFoo"]);
    }

    #[test]
    fn skips_ignored_and_untracked_files() {
        let (_tmp, config, mut store) = setup();
        let root = config.indexer.root.clone();
        write(&root, "A.h", "class AOne {};\n");
        write(&root, "A.h.original", "class AOld {};\n");
        write(&root, ".DS_Store", "junk");
        write(&root, "README.md", "# readme");
        write(&root, "Game.Build.cs", "public class Game : ModuleRules {}\n");

        let indexer = Indexer::new(&config).unwrap();
        let stats = indexer.index_tree(&mut store, &root, &NoProgress).unwrap();
        assert_eq!(stats.total_files, 5);
        assert_eq!(stats.processed_files, 2);
        assert_eq!(stats.skipped_files, 3);
        assert_eq!(stats.build_files, 1);
        assert!(store.get_class_info("AOld").is_none());
    }

    #[test]
    fn unreadable_file_is_recorded_and_walk_continues() {
        let (_tmp, config, mut store) = setup();
        let root = config.indexer.root.clone();
        write(&root, "Good.h", "class AGood {};\n");
        fs::write(root.join("Bad.h"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let indexer = Indexer::new(&config).unwrap();
        let stats = indexer.index_tree(&mut store, &root, &NoProgress).unwrap();
        assert_eq!(stats.processed_files, 1);
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].file, "Bad.h");
        assert!(store.get_class_info("AGood").is_some());
    }

    #[test]
    fn missing_root_fails_fast() {
        let (tmp, config, mut store) = setup();
        let indexer = Indexer::new(&config).unwrap();
        let err = indexer
            .index_tree(&mut store, &tmp.path().join("nope"), &NoProgress)
            .unwrap_err();
        assert!(err.to_string().contains("Cannot read source root"));
        assert_eq!(store.document().total_items(), 0);
    }

    #[test]
    fn patterns_and_project_insights_are_recorded() {
        let (_tmp, config, mut store) = setup();
        let root = config.indexer.root.clone();
        write(&root, "HealthComponent.h", "class UHealthComponent {};\n");
        write(&root, "AmmoComponent.h", "class UAmmoComponent {};\n");

        let indexer = Indexer::new(&config).unwrap();
        indexer.index_tree(&mut store, &root, &NoProgress).unwrap();

        let pattern = store
            .document()
            .patterns
            .iter()
            .find(|p| p.name == "Component_Pattern")
            .unwrap();
        assert_eq!(pattern.frequency, 2);
        assert_eq!(pattern.examples, vec!["AmmoComponent.h", "HealthComponent.h"]);

        for kind in [
            "architecture-analysis",
            "complexity-analysis",
            "technology-stack",
            "indexing-summary",
        ] {
            assert_eq!(store.get_insights(Some(kind), 0.0).len(), 1, "{}", kind);
        }
        assert_eq!(store.get_insights(Some("file-analysis"), 0.0).len(), 2);
    }

    #[test]
    fn run_owns_a_session_only_when_none_is_current() {
        let (_tmp, config, mut store) = setup();
        let root = config.indexer.root.clone();
        write(&root, "A.h", "class AOne {};\n");
        let indexer = Indexer::new(&config).unwrap();

        indexer.index_tree(&mut store, &root, &NoProgress).unwrap();
        assert!(store.current_session().is_none());
        assert_eq!(store.sessions().len(), 1);
        assert!(store.sessions()[0].summary.is_some());

        let sid = store.start_session("manual").unwrap();
        indexer.index_tree(&mut store, &root, &NoProgress).unwrap();
        assert_eq!(store.current_session_id(), Some(sid.as_str()));
        assert_eq!(store.sessions().len(), 2);
        assert!(store
            .current_session()
            .unwrap()
            .actions
            .iter()
            .any(|a| a.action == "file_indexed"));
    }

    #[test]
    fn rescan_detects_unchanged_and_changed_files() {
        let (_tmp, config, mut store) = setup();
        let root = config.indexer.root.clone();
        write(&root, "A.h", "class AOne {};\n");
        let indexer = Indexer::new(&config).unwrap();
        indexer.index_tree(&mut store, &root, &NoProgress).unwrap();

        let outcome = indexer.index_file(&mut store, &root, Path::new("A.h")).unwrap();
        assert_eq!(outcome, FileOutcome::Unchanged { file: "A.h".into() });

        store.start_session("edit").unwrap();
        write(&root, "A.h", "class AOne {};\nclass ATwo {};\n");
        let outcome = indexer.index_file(&mut store, &root, Path::new("A.h")).unwrap();
        assert_eq!(
            outcome,
            FileOutcome::Indexed {
                file: "A.h".into(),
                classes: vec!["AOne".into(), "ATwo".into()]
            }
        );
        assert_eq!(
            store.current_session().unwrap().files_modified,
            vec!["A.h"]
        );

        let outcome = indexer
            .index_file(&mut store, &root, Path::new("notes.txt"))
            .unwrap();
        assert!(matches!(outcome, FileOutcome::Skipped { .. }));
    }

    #[test]
    fn source_index_artifact_is_written() {
        let (tmp, mut config, mut store) = setup();
        let artifact = tmp.path().join("data/.mcp-index.json");
        config.store.index_file = Some(artifact.clone());
        let root = config.indexer.root.clone();
        write(&root, "A.h", "class AOne {};\n");
        write(&root, "A.cpp", "void AOne::Tick() {}\n");

        Indexer::new(&config)
            .unwrap()
            .index_tree(&mut store, &root, &NoProgress)
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(artifact).unwrap()).unwrap();
        assert_eq!(raw["engineVersion"], "5.5");
        assert_eq!(raw["headerFiles"], json!(["A.h"]));
        assert_eq!(raw["implementationFiles"], json!(["A.cpp"]));
        assert_eq!(raw["classes"], json!(["AOne"]));
    }

    #[test]
    fn failed_run_still_closes_its_session() {
        let (tmp, mut config, mut store) = setup();
        // A directory in the artifact's place makes the final write fail.
        let artifact = tmp.path().join("blocked");
        write(&artifact, "keep.txt", "x");
        config.store.index_file = Some(artifact);
        let root = config.indexer.root.clone();
        write(&root, "A.h", "class AOne {};\n");

        let err = Indexer::new(&config)
            .unwrap()
            .index_tree(&mut store, &root, &NoProgress)
            .unwrap_err();
        assert!(!err.to_string().is_empty());

        assert!(store.current_session().is_none());
        let session = store.sessions().last().unwrap();
        assert!(session.ended.is_some());
        assert!(session
            .summary
            .as_deref()
            .unwrap()
            .starts_with("Indexing failed after 1 files"));
        store.start_session("next").unwrap();
    }

    #[test]
    fn failed_run_leaves_adopted_session_open() {
        let (tmp, mut config, mut store) = setup();
        let artifact = tmp.path().join("blocked");
        write(&artifact, "keep.txt", "x");
        config.store.index_file = Some(artifact);
        let root = config.indexer.root.clone();
        write(&root, "A.h", "class AOne {};\n");
        let outer = store.start_session("editor session").unwrap();

        assert!(Indexer::new(&config)
            .unwrap()
            .index_tree(&mut store, &root, &NoProgress)
            .is_err());
        assert_eq!(store.current_session_id(), Some(outer.as_str()));
    }

    #[test]
    fn complexity_labels() {
        assert_eq!(complexity_label(0.0), "low");
        assert_eq!(complexity_label(200.0), "low");
        assert_eq!(complexity_label(201.0), "medium");
        assert_eq!(complexity_label(501.0), "high");
    }
}
