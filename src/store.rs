//! Persistent project memory.
//!
//! [`MemoryStore`] owns one [`MemoryDocument`] and its file on disk. Every
//! mutating call rewrites the whole document before returning (write to a
//! sibling temp file, then rename), so a caller never observes a state that
//! is not also on disk.
//!
//! # Sessions
//!
//! At most one session is current. The pointer is part of the document, so
//! it survives across CLI invocations:
//!
//! | State | `start_session` | `end_session` / `log_action` |
//! |-------|-----------------|------------------------------|
//! | no current session | opens one | no-op |
//! | session current | [`StoreError::SessionAlreadyActive`] | applies to it |
//!
//! Insights, problems, context windows and events created while a session is
//! current record its id; otherwise their `sessionId` is `null`.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::Config;
use crate::error::StoreError;
use crate::export;
use crate::models::{
    ActionRecord, ClassRecord, ContextPayload, ContextWindow, DevelopmentEvent, FileRecord,
    Impact, Insight, MemoryDocument, MemoryStats, Pattern, Problem, ProblemStatus, Session,
    SolutionAttempt, SolutionRef,
};
use crate::relevance::{self, RelevanceScorer};

/// Insights at or below this relevance are eligible for cleanup.
pub const CLEANUP_RELEVANCE_FLOOR: f64 = 0.3;

/// Problems must be strictly more similar than this to be returned.
pub const SIMILAR_PROBLEM_THRESHOLD: f64 = 0.5;

/// Collections that [`MemoryStore::search`] can look in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCategory {
    Insights,
    Patterns,
    Problems,
    History,
    Contexts,
}

impl SearchCategory {
    /// Categories searched when the caller does not name any.
    pub const DEFAULT: &'static [SearchCategory] = &[
        SearchCategory::Insights,
        SearchCategory::Patterns,
        SearchCategory::Problems,
        SearchCategory::History,
    ];
}

impl std::str::FromStr for SearchCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "insights" => Ok(SearchCategory::Insights),
            "patterns" => Ok(SearchCategory::Patterns),
            "problems" => Ok(SearchCategory::Problems),
            "history" => Ok(SearchCategory::History),
            "contexts" => Ok(SearchCategory::Contexts),
            other => anyhow::bail!(
                "unknown search category '{}'; expected insights, patterns, problems, history or contexts",
                other
            ),
        }
    }
}

/// Per-category search hits. Categories that were not requested stay empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub insights: Vec<Insight>,
    pub patterns: Vec<Pattern>,
    pub problems: Vec<Problem>,
    pub history: Vec<DevelopmentEvent>,
    pub contexts: Vec<ContextWindow>,
}

impl SearchResults {
    pub fn total(&self) -> usize {
        self.insights.len()
            + self.patterns.len()
            + self.problems.len()
            + self.history.len()
            + self.contexts.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarProblem {
    #[serde(flatten)]
    pub problem: Problem,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub sessions_removed: usize,
    pub context_windows_removed: usize,
    pub insights_removed: usize,
}

pub struct MemoryStore {
    path: PathBuf,
    doc: MemoryDocument,
    scorer: RelevanceScorer,
    context_window_cap: usize,
}

impl MemoryStore {
    /// Open the store described by `config`, creating its directory.
    ///
    /// A missing document starts fresh. An unreadable or corrupt document is
    /// logged and replaced by a fresh one on the next write. Failure to
    /// create the storage directory is fatal.
    pub fn open(config: &Config) -> Result<Self> {
        let mut store = Self::open_at(
            &config.store.document_path(),
            &config.project.name,
            RelevanceScorer::new(&config.relevance.keywords),
            config.store.context_window_cap,
        )?;
        if !config.project.key_classes.is_empty() {
            store.doc.architecture.key_system_classes = config.project.key_classes.clone();
        }
        if store.doc.architecture.tech_stack.is_empty() {
            store.doc.architecture.tech_stack = config.project.tech_stack.clone();
        }
        Ok(store)
    }

    pub fn open_at(
        path: &Path,
        project_name: &str,
        scorer: RelevanceScorer,
        context_window_cap: usize,
    ) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create storage directory: {}", dir.display())
            })?;
        }

        let doc = match load_document(path) {
            Ok(Some(doc)) => doc,
            Ok(None) => MemoryDocument::new(project_name),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "memory document unreadable, starting with an empty store"
                );
                MemoryDocument::new(project_name)
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            doc,
            scorer,
            context_window_cap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the document and default export snapshots.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn document(&self) -> &MemoryDocument {
        &self.doc
    }

    /// Write the document now, even if nothing changed.
    pub fn save(&mut self) -> Result<(), StoreError> {
        self.persist()
    }

    /// Write the document. On failure the in-memory document is rolled back
    /// to `previous`, so a change the caller saw fail is never written later.
    fn commit(&mut self, previous: MemoryDocument) -> Result<(), StoreError> {
        if let Err(e) = self.persist() {
            self.doc = previous;
            return Err(e);
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        self.doc.last_updated = Utc::now();
        let json = serde_json::to_string_pretty(&self.doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|source| StoreError::Persist {
                path: self.path.clone(),
                source,
            })
    }

    // ── Sessions ────────────────────────────────────────────────────────

    pub fn current_session_id(&self) -> Option<&str> {
        self.doc.current_session_id.as_deref()
    }

    pub fn current_session(&self) -> Option<&Session> {
        let id = self.current_session_id()?;
        self.doc.sessions.iter().find(|s| s.id == id)
    }

    fn current_session_mut(&mut self) -> Option<&mut Session> {
        let id = self.doc.current_session_id.clone()?;
        self.doc.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn sessions(&self) -> &[Session] {
        &self.doc.sessions
    }

    /// Open a new session. Fails if one is already current.
    pub fn start_session(&mut self, description: &str) -> Result<String, StoreError> {
        if let Some(active) = self.current_session() {
            return Err(StoreError::SessionAlreadyActive(active.id.clone()));
        }
        let previous = self.doc.clone();
        let id = Uuid::new_v4().to_string();
        self.doc.sessions.push(Session {
            id: id.clone(),
            description: description.to_string(),
            started: Utc::now(),
            ended: None,
            summary: None,
            actions: Vec::new(),
            files_modified: Vec::new(),
            insights: Vec::new(),
            problems: Vec::new(),
            solutions: Vec::new(),
        });
        self.doc.current_session_id = Some(id.clone());
        self.commit(previous)?;
        tracing::info!(session = %id, "session started");
        Ok(id)
    }

    /// Close the current session. Returns its id, or `None` when no session
    /// was current.
    pub fn end_session(&mut self, summary: &str) -> Result<Option<String>, StoreError> {
        if self.current_session().is_none() {
            self.doc.current_session_id = None;
            return Ok(None);
        }
        let previous = self.doc.clone();
        let Some(session) = self.current_session_mut() else {
            return Ok(None);
        };
        session.ended = Some(Utc::now());
        session.summary = Some(summary.to_string());
        let id = session.id.clone();
        self.doc.current_session_id = None;
        self.commit(previous)?;
        tracing::info!(session = %id, "session ended");
        Ok(Some(id))
    }

    /// Append an action to the current session. Returns `false` (and writes
    /// nothing) when no session is current.
    pub fn log_action(&mut self, action: &str, details: Value) -> Result<bool, StoreError> {
        if self.current_session().is_none() {
            return Ok(false);
        }
        let previous = self.doc.clone();
        let Some(session) = self.current_session_mut() else {
            return Ok(false);
        };
        session.actions.push(ActionRecord {
            timestamp: Utc::now(),
            action: action.to_string(),
            details,
        });
        self.commit(previous)?;
        Ok(true)
    }

    /// Record that `file` changed during the current session.
    pub fn track_file_modified(&mut self, file: &str) -> Result<bool, StoreError> {
        match self.current_session() {
            None => return Ok(false),
            Some(session) if session.files_modified.iter().any(|f| f == file) => return Ok(true),
            Some(_) => {}
        }
        let previous = self.doc.clone();
        if let Some(session) = self.current_session_mut() {
            session.files_modified.push(file.to_string());
        }
        self.commit(previous)?;
        Ok(true)
    }

    // ── Context windows ─────────────────────────────────────────────────

    pub fn save_context_window(&mut self, data: ContextPayload) -> Result<String, StoreError> {
        let serialized = serde_json::to_string(&data)?;
        let previous = self.doc.clone();
        let id = Uuid::new_v4().to_string();
        self.doc.context_windows.push(ContextWindow {
            id: id.clone(),
            timestamp: Utc::now(),
            session_id: self.doc.current_session_id.clone(),
            summary: data.summary(),
            tags: relevance::extract_tags(&serialized),
            data,
        });
        let len = self.doc.context_windows.len();
        if len > self.context_window_cap {
            self.doc
                .context_windows
                .drain(..len - self.context_window_cap);
        }
        self.commit(previous)?;
        Ok(id)
    }

    /// Windows matching `query`, newest first, at most `limit`.
    pub fn get_relevant_context(&self, query: &str, limit: usize) -> Vec<ContextWindow> {
        let mut hits: Vec<ContextWindow> = self
            .doc
            .context_windows
            .iter()
            .rev()
            .filter(|w| relevance::context_matches(w, query))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        hits.truncate(limit);
        hits
    }

    // ── Insights ────────────────────────────────────────────────────────

    pub fn add_insight(
        &mut self,
        kind: &str,
        description: &str,
        context: Value,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let relevance = self.scorer.score(description, &context);
        let previous = self.doc.clone();
        let session_id = self.doc.current_session_id.clone();
        self.doc.insights.push(Insight {
            id: id.clone(),
            timestamp: Utc::now(),
            session_id,
            kind: kind.to_string(),
            description: description.to_string(),
            context,
            relevance,
        });
        if let Some(session) = self.current_session_mut() {
            session.insights.push(id.clone());
        }
        self.commit(previous)?;
        Ok(id)
    }

    /// Insights of `kind` (any kind when `None`) with relevance at least
    /// `min_relevance`, most relevant first.
    pub fn get_insights(&self, kind: Option<&str>, min_relevance: f64) -> Vec<Insight> {
        let mut insights: Vec<Insight> = self
            .doc
            .insights
            .iter()
            .filter(|i| kind.is_none_or(|k| i.kind == k))
            .filter(|i| i.relevance >= min_relevance)
            .cloned()
            .collect();
        insights.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        insights
    }

    // ── Patterns ────────────────────────────────────────────────────────

    pub fn add_pattern(
        &mut self,
        name: &str,
        description: &str,
        examples: Vec<String>,
        frequency: u32,
    ) -> Result<String, StoreError> {
        let pattern = new_pattern(name, description, examples, frequency);
        let id = pattern.id.clone();
        let previous = self.doc.clone();
        self.doc.patterns.push(pattern);
        self.commit(previous)?;
        Ok(id)
    }

    /// Increment the first pattern named exactly `name`. Returns the updated
    /// pattern, or `None` when no pattern has that name.
    pub fn update_pattern_frequency(&mut self, name: &str) -> Result<Option<Pattern>, StoreError> {
        let Some(idx) = self.doc.patterns.iter().position(|p| p.name == name) else {
            return Ok(None);
        };
        let previous = self.doc.clone();
        bump(&mut self.doc.patterns[idx]);
        let updated = self.doc.patterns[idx].clone();
        self.commit(previous)?;
        Ok(Some(updated))
    }

    /// Bump `name` if it exists, otherwise create it with frequency 1.
    /// `example` is added to the pattern's examples when not already listed.
    pub fn observe_pattern(
        &mut self,
        name: &str,
        description: &str,
        example: &str,
    ) -> Result<Pattern, StoreError> {
        let previous = self.doc.clone();
        let idx = match self.doc.patterns.iter().position(|p| p.name == name) {
            Some(idx) => {
                let pattern = &mut self.doc.patterns[idx];
                bump(pattern);
                if !pattern.examples.iter().any(|e| e == example) {
                    pattern.examples.push(example.to_string());
                }
                idx
            }
            None => {
                self.doc.patterns.push(new_pattern(
                    name,
                    description,
                    vec![example.to_string()],
                    1,
                ));
                self.doc.patterns.len() - 1
            }
        };
        let observed = self.doc.patterns[idx].clone();
        self.commit(previous)?;
        Ok(observed)
    }

    /// Patterns with confidence at least `min_confidence`, most confident first.
    pub fn get_patterns(&self, min_confidence: f64) -> Vec<Pattern> {
        let mut patterns: Vec<Pattern> = self
            .doc
            .patterns
            .iter()
            .filter(|p| p.confidence >= min_confidence)
            .cloned()
            .collect();
        patterns.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        patterns
    }

    // ── Class and file records ──────────────────────────────────────────

    pub fn remember_class(&mut self, name: &str, record: ClassRecord) -> Result<(), StoreError> {
        let previous = self.doc.clone();
        self.doc.key_classes.insert(name.to_string(), record);
        self.commit(previous)
    }

    pub fn get_class_info(&self, name: &str) -> Option<&ClassRecord> {
        self.doc.key_classes.get(name)
    }

    pub fn remember_file(&mut self, path: &str, record: FileRecord) -> Result<(), StoreError> {
        let previous = self.doc.clone();
        self.doc.important_files.insert(path.to_string(), record);
        self.commit(previous)
    }

    pub fn get_file_info(&self, path: &str) -> Option<&FileRecord> {
        self.doc.important_files.get(path)
    }

    // ── Problems ────────────────────────────────────────────────────────

    pub fn add_problem(&mut self, description: &str, context: Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let previous = self.doc.clone();
        let session_id = self.doc.current_session_id.clone();
        self.doc.problems.push(Problem {
            id: id.clone(),
            timestamp: Utc::now(),
            session_id,
            description: description.to_string(),
            context,
            status: ProblemStatus::Open,
            attempts: Vec::new(),
            solution: None,
        });
        if let Some(session) = self.current_session_mut() {
            session.problems.push(id.clone());
        }
        self.commit(previous)?;
        Ok(id)
    }

    pub fn get_problem(&self, id: &str) -> Option<&Problem> {
        self.doc.problems.iter().find(|p| p.id == id)
    }

    /// Record a solution attempt. Returns `false` when `problem_id` is unknown.
    ///
    /// The first successful attempt marks the problem solved; status never
    /// reverts, but every attempt is kept.
    pub fn add_solution(
        &mut self,
        problem_id: &str,
        solution: &str,
        successful: bool,
    ) -> Result<bool, StoreError> {
        if self.get_problem(problem_id).is_none() {
            return Ok(false);
        }
        let previous = self.doc.clone();
        let Some(problem) = self.doc.problems.iter_mut().find(|p| p.id == problem_id) else {
            return Ok(false);
        };
        problem.attempts.push(SolutionAttempt {
            timestamp: Utc::now(),
            solution: solution.to_string(),
            successful,
        });
        if successful {
            problem.status = ProblemStatus::Solved;
            problem.solution = Some(solution.to_string());
        }
        if let Some(session) = self.current_session_mut() {
            session.solutions.push(SolutionRef {
                problem_id: problem_id.to_string(),
                solution: solution.to_string(),
                successful,
            });
        }
        self.commit(previous)?;
        Ok(true)
    }

    /// Problems whose description overlaps `description` by more than
    /// [`SIMILAR_PROBLEM_THRESHOLD`], most similar first.
    pub fn get_similar_problems(&self, description: &str) -> Vec<SimilarProblem> {
        let mut similar: Vec<SimilarProblem> = self
            .doc
            .problems
            .iter()
            .map(|p| SimilarProblem {
                similarity: relevance::similarity(description, &p.description),
                problem: p.clone(),
            })
            .filter(|s| s.similarity > SIMILAR_PROBLEM_THRESHOLD)
            .collect();
        similar.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        similar
    }

    // ── Development history ─────────────────────────────────────────────

    pub fn add_development_event(
        &mut self,
        kind: &str,
        description: &str,
        files: Vec<String>,
        impact: Impact,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let previous = self.doc.clone();
        self.doc.development_history.push(DevelopmentEvent {
            id: id.clone(),
            timestamp: Utc::now(),
            session_id: self.doc.current_session_id.clone(),
            kind: kind.to_string(),
            description: description.to_string(),
            files,
            impact,
        });
        self.commit(previous)?;
        Ok(id)
    }

    /// Most recent `limit` events of `kind` (any kind when `None`), newest first.
    pub fn get_development_history(&self, kind: Option<&str>, limit: usize) -> Vec<DevelopmentEvent> {
        self.doc
            .development_history
            .iter()
            .rev()
            .filter(|e| kind.is_none_or(|k| e.kind == k))
            .take(limit)
            .cloned()
            .collect()
    }

    // ── Search ──────────────────────────────────────────────────────────

    /// Case-insensitive substring search over the requested categories.
    pub fn search(&self, query: &str, categories: &[SearchCategory]) -> SearchResults {
        self.search_since(query, categories, None)
    }

    /// Like [`search`](Self::search), keeping only items stamped at or after `since`.
    pub fn search_since(
        &self,
        query: &str,
        categories: &[SearchCategory],
        since: Option<DateTime<Utc>>,
    ) -> SearchResults {
        let q = query.to_lowercase();
        let recent = |ts: &DateTime<Utc>| since.is_none_or(|cutoff| *ts >= cutoff);
        let hit = |s: &str| contains_folded(s, &q);
        let mut results = SearchResults::default();

        for category in categories {
            match category {
                SearchCategory::Insights => {
                    results.insights = self
                        .doc
                        .insights
                        .iter()
                        .filter(|i| recent(&i.timestamp))
                        .filter(|i| hit(i.description.as_str()) || hit(i.context.to_string().as_str()))
                        .cloned()
                        .collect();
                }
                SearchCategory::Patterns => {
                    results.patterns = self
                        .doc
                        .patterns
                        .iter()
                        .filter(|p| recent(&p.last_seen))
                        .filter(|p| hit(p.name.as_str()) || hit(p.description.as_str()))
                        .cloned()
                        .collect();
                }
                SearchCategory::Problems => {
                    results.problems = self
                        .doc
                        .problems
                        .iter()
                        .filter(|p| recent(&p.timestamp))
                        .filter(|p| hit(p.description.as_str()) || hit(p.context.to_string().as_str()))
                        .cloned()
                        .collect();
                }
                SearchCategory::History => {
                    results.history = self
                        .doc
                        .development_history
                        .iter()
                        .filter(|e| recent(&e.timestamp))
                        .filter(|e| hit(e.description.as_str()) || e.files.iter().any(|f| hit(f.as_str())))
                        .cloned()
                        .collect();
                }
                SearchCategory::Contexts => {
                    results.contexts = self
                        .get_relevant_context(query, 10)
                        .into_iter()
                        .filter(|w| recent(&w.timestamp))
                        .collect();
                }
            }
        }

        results
    }

    // ── Import / export / maintenance ───────────────────────────────────

    /// Write a snapshot of the document. Defaults to
    /// `memory-export-<millis>.json` next to the live document.
    pub fn export_memory(&self, path: Option<&Path>) -> Result<PathBuf> {
        let target = match path {
            Some(p) => p.to_path_buf(),
            None => export::default_export_path(self.dir()),
        };
        export::write_snapshot(&self.doc, &target)?;
        Ok(target)
    }

    /// Shallow-merge the top-level collections of the document at `path`
    /// into the live store. The current-session pointer is not imported.
    pub fn import_memory(&mut self, path: &Path) -> Result<(), StoreError> {
        let import_err = |reason: String| StoreError::Import {
            path: path.to_path_buf(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| import_err(e.to_string()))?;
        let incoming: Value = serde_json::from_str(&text).map_err(|e| import_err(e.to_string()))?;
        let Value::Object(incoming) = incoming else {
            return Err(import_err("top-level value is not an object".to_string()));
        };

        let mut merged = serde_json::to_value(&self.doc)?;
        if let Value::Object(live) = &mut merged {
            for (key, value) in incoming {
                if key == "currentSessionId" {
                    continue;
                }
                live.insert(key, value);
            }
        }
        let mut doc: MemoryDocument =
            serde_json::from_value(merged).map_err(|e| import_err(e.to_string()))?;

        doc.current_session_id = self.doc.current_session_id.clone();
        if let Some(active) = self.current_session().cloned() {
            if !doc.sessions.iter().any(|s| s.id == active.id) {
                doc.sessions.push(active);
            }
        }
        let previous = std::mem::replace(&mut self.doc, doc);
        self.commit(previous)
    }

    /// Drop sessions and context windows older than `days_old` days, and
    /// insights that are both older than that and at or below
    /// [`CLEANUP_RELEVANCE_FLOOR`]. The current session is always kept.
    ///
    /// A negative age, or one too large to subtract from the current time,
    /// is rejected with [`StoreError::InvalidAge`] and nothing is removed.
    pub fn cleanup(&mut self, days_old: i64) -> Result<CleanupReport, StoreError> {
        let cutoff = (days_old >= 0)
            .then(|| TimeDelta::try_days(days_old))
            .flatten()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or(StoreError::InvalidAge(days_old))?;
        let previous = self.doc.clone();
        let current = self.doc.current_session_id.clone();
        let before = (
            self.doc.sessions.len(),
            self.doc.context_windows.len(),
            self.doc.insights.len(),
        );

        self.doc
            .sessions
            .retain(|s| s.started > cutoff || current.as_deref() == Some(s.id.as_str()));
        self.doc.context_windows.retain(|w| w.timestamp > cutoff);
        self.doc
            .insights
            .retain(|i| i.relevance > CLEANUP_RELEVANCE_FLOOR || i.timestamp > cutoff);

        let report = CleanupReport {
            sessions_removed: before.0 - self.doc.sessions.len(),
            context_windows_removed: before.1 - self.doc.context_windows.len(),
            insights_removed: before.2 - self.doc.insights.len(),
        };
        self.commit(previous)?;
        Ok(report)
    }

    pub fn get_memory_stats(&self) -> MemoryStats {
        let doc = &self.doc;
        MemoryStats {
            total_sessions: doc.sessions.len(),
            total_insights: doc.insights.len(),
            total_patterns: doc.patterns.len(),
            total_problems: doc.problems.len(),
            solved_problems: doc
                .problems
                .iter()
                .filter(|p| p.status == ProblemStatus::Solved)
                .count(),
            context_windows: doc.context_windows.len(),
            key_classes: doc.key_classes.len(),
            important_files: doc.important_files.len(),
            development_events: doc.development_history.len(),
            total_items: doc.total_items(),
            memory_size: serde_json::to_string(doc).map(|s| s.len()).unwrap_or(0),
            last_updated: doc.last_updated,
        }
    }
}

fn new_pattern(name: &str, description: &str, examples: Vec<String>, frequency: u32) -> Pattern {
    let now = Utc::now();
    Pattern {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: description.to_string(),
        examples,
        frequency,
        first_seen: now,
        last_seen: now,
        confidence: Pattern::confidence_for(frequency),
    }
}

fn bump(pattern: &mut Pattern) {
    pattern.frequency = pattern.frequency.saturating_add(1);
    pattern.confidence = Pattern::confidence_for(pattern.frequency);
    pattern.last_seen = Utc::now();
}

fn contains_folded(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn load_document(path: &Path) -> Result<Option<MemoryDocument>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn keywords() -> Vec<String> {
        crate::config::RelevanceConfig::default().keywords
    }

    fn open(tmp: &TempDir) -> MemoryStore {
        MemoryStore::open_at(
            &tmp.path().join("data/project-memory.json"),
            "Arena",
            RelevanceScorer::new(&keywords()),
            50,
        )
        .unwrap()
    }

    fn reopen(tmp: &TempDir) -> MemoryStore {
        open(tmp)
    }

    #[test]
    fn insight_ids_are_unique_and_relevance_bounded() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        let a = store
            .add_insight("perf", "Character inventory performance", json!({}))
            .unwrap();
        let b = store.add_insight("perf", "", Value::Null).unwrap();
        assert_ne!(a, b);
        for insight in &store.document().insights {
            assert!((0.0..=1.0).contains(&insight.relevance));
        }
        assert!((store.document().insights[0].relevance - 3.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn insights_filter_and_sort_by_relevance() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        store.add_insight("arch", "memory layout", json!({})).unwrap();
        store
            .add_insight("arch", "character damage ui input", json!({}))
            .unwrap();
        store.add_insight("other", "character", json!({})).unwrap();

        let arch = store.get_insights(Some("arch"), 0.0);
        assert_eq!(arch.len(), 2);
        assert_eq!(arch[0].description, "character damage ui input");

        let strong = store.get_insights(None, 0.3);
        assert_eq!(strong.len(), 1);
    }

    #[test]
    fn pattern_frequency_increments_and_confidence_saturates() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        store
            .add_pattern("component-pattern", "Actor components", vec![], 1)
            .unwrap();

        let mut last = 1;
        for _ in 0..12 {
            let p = store
                .update_pattern_frequency("component-pattern")
                .unwrap()
                .unwrap();
            assert!(p.frequency > last);
            assert_eq!(p.confidence, (f64::from(p.frequency) / 10.0).min(1.0));
            last = p.frequency;
        }
        assert_eq!(store.get_patterns(0.0)[0].confidence, 1.0);
        assert!(store.update_pattern_frequency("missing").unwrap().is_none());
    }

    #[test]
    fn observe_pattern_creates_then_bumps() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        let p = store
            .observe_pattern("Component_Pattern", "Actor components", "HealthComponent.h")
            .unwrap();
        assert_eq!(p.frequency, 1);
        let p = store
            .observe_pattern("Component_Pattern", "Actor components", "AmmoComponent.h")
            .unwrap();
        assert_eq!(p.frequency, 2);
        assert_eq!(p.examples, vec!["HealthComponent.h", "AmmoComponent.h"]);
        assert_eq!(store.document().patterns.len(), 1);
    }

    #[test]
    fn context_windows_are_capped_fifo() {
        let tmp = TempDir::new().unwrap();
        let mut store = MemoryStore::open_at(
            &tmp.path().join("m.json"),
            "Arena",
            RelevanceScorer::new(&keywords()),
            50,
        )
        .unwrap();
        let mut ids = Vec::new();
        for i in 0..60 {
            ids.push(
                store
                    .save_context_window(ContextPayload::Blob {
                        data: json!({ "step": i }),
                    })
                    .unwrap(),
            );
            assert!(store.document().context_windows.len() <= 50);
        }
        let kept: Vec<&str> = store
            .document()
            .context_windows
            .iter()
            .map(|w| w.id.as_str())
            .collect();
        let expected: Vec<&str> = ids[10..].iter().map(|s| s.as_str()).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn relevant_context_is_newest_first_and_limited() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        for i in 0..4 {
            store
                .save_context_window(ContextPayload::CodeSnippet {
                    file: Some(format!("Inventory{}.cpp", i)),
                    language: None,
                    code: "void AddItem();".into(),
                })
                .unwrap();
        }
        store
            .save_context_window(ContextPayload::Blob {
                data: json!({ "unrelated": true }),
            })
            .unwrap();

        let hits = store.get_relevant_context("inventory", 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].summary, "Code snippet from Inventory3.cpp");
        assert_eq!(hits[1].summary, "Code snippet from Inventory2.cpp");
        assert_eq!(hits[0].tags, vec!["AddItem"]);
    }

    #[test]
    fn solution_marks_problem_solved_and_stays_solved() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        let id = store.add_problem("Crash on pickup", json!({})).unwrap();
        assert!(store.add_solution(&id, "guess", false).unwrap());
        assert_eq!(store.get_problem(&id).unwrap().status, ProblemStatus::Open);

        assert!(store.add_solution(&id, "null check", true).unwrap());
        assert_eq!(store.get_problem(&id).unwrap().status, ProblemStatus::Solved);

        assert!(store.add_solution(&id, "worse idea", false).unwrap());
        assert!(store.add_solution(&id, "refactor", true).unwrap());
        let problem = store.get_problem(&id).unwrap();
        assert_eq!(problem.status, ProblemStatus::Solved);
        assert_eq!(problem.attempts.len(), 4);
        assert_eq!(problem.solution.as_deref(), Some("refactor"));

        assert!(!store.add_solution("nope", "x", true).unwrap());
    }

    #[test]
    fn similar_problems_above_threshold() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        store
            .add_problem("inventory crash on item pickup", json!({}))
            .unwrap();
        store.add_problem("widget not visible", json!({})).unwrap();

        let similar = store.get_similar_problems("inventory crash on item drop");
        assert_eq!(similar.len(), 1);
        assert!(similar[0].similarity > 0.5);
        assert!(store.get_similar_problems("").is_empty());
    }

    #[test]
    fn history_is_recent_first_and_filtered() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        store
            .add_development_event("code_change", "one", vec![], Impact::default())
            .unwrap();
        store
            .add_development_event("release", "two", vec![], Impact::High)
            .unwrap();
        store
            .add_development_event("code_change", "three", vec!["A.cpp".into()], Impact::Low)
            .unwrap();

        let all = store.get_development_history(None, 20);
        assert_eq!(all[0].description, "three");
        assert_eq!(all[0].impact, Impact::Low);
        assert_eq!(all[2].impact, Impact::Medium);

        let changes = store.get_development_history(Some("code_change"), 1);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].description, "three");
    }

    #[test]
    fn search_only_fills_requested_categories() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        store
            .add_pattern(
                "inventory-item-pattern",
                "Items live in inventory slots",
                vec!["UInventoryComponent".into()],
                1,
            )
            .unwrap();
        store
            .add_insight("note", "inventory slots are fixed", json!({}))
            .unwrap();
        store.add_problem("inventory overflow", json!({})).unwrap();

        let results = store.search("inventory", &[SearchCategory::Patterns]);
        assert_eq!(results.patterns.len(), 1);
        assert_eq!(results.patterns[0].name, "inventory-item-pattern");
        assert!(results.insights.is_empty());
        assert!(results.problems.is_empty());
        assert!(results.history.is_empty());
        assert!(results.contexts.is_empty());

        let all = store.search("INVENTORY", SearchCategory::DEFAULT);
        assert_eq!(all.total(), 3);
    }

    #[test]
    fn cleanup_keeps_recent_or_relevant_insights() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        store.add_insight("a", "keep me", json!({})).unwrap();
        store.add_insight("b", "drop me", json!({})).unwrap();
        store.add_insight("c", "fresh", json!({})).unwrap();
        let old = Utc::now() - TimeDelta::days(60);
        store.doc.insights[0].relevance = 0.9;
        store.doc.insights[0].timestamp = old;
        store.doc.insights[1].relevance = 0.1;
        store.doc.insights[1].timestamp = old;

        let report = store.cleanup(30).unwrap();
        assert_eq!(report.insights_removed, 1);
        let left: Vec<&str> = store
            .document()
            .insights
            .iter()
            .map(|i| i.description.as_str())
            .collect();
        assert_eq!(left, vec!["keep me", "fresh"]);
    }

    #[test]
    fn cleanup_rejects_negative_or_overflowing_age() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        store.start_session("current").unwrap();
        store.add_insight("note", "fresh low relevance", json!({})).unwrap();
        let before = store.get_memory_stats();

        for days in [-1, 200_000_000, i64::MAX, i64::MIN] {
            match store.cleanup(days) {
                Err(StoreError::InvalidAge(d)) => assert_eq!(d, days),
                other => panic!("expected InvalidAge for {}, got {:?}", days, other),
            }
        }
        assert_eq!(store.get_memory_stats(), before);

        let reopened = open(&tmp);
        assert_eq!(reopened.document().insights.len(), 1);
        assert_eq!(reopened.document().sessions.len(), 1);
    }

    #[test]
    fn failed_write_leaves_no_trace() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        store.add_insight("ui", "kept", json!({})).unwrap();

        let data = tmp.path().join("data");
        std::fs::remove_dir_all(&data).unwrap();
        match store.add_insight("ui", "lost", json!({})) {
            Err(StoreError::Persist { .. }) => {}
            other => panic!("expected a persist failure, got {:?}", other),
        }
        assert!(store.add_problem("lost too", json!({})).is_err());
        assert_eq!(store.document().insights.len(), 1);
        assert!(store.document().problems.is_empty());

        std::fs::create_dir_all(&data).unwrap();
        store.add_insight("ui", "after", json!({})).unwrap();
        let reopened = open(&tmp);
        let descriptions: Vec<&str> = reopened
            .document()
            .insights
            .iter()
            .map(|i| i.description.as_str())
            .collect();
        assert_eq!(descriptions, vec!["kept", "after"]);
        assert!(reopened.document().problems.is_empty());
    }

    #[test]
    fn cleanup_drops_old_sessions_but_not_current() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        store.start_session("old").unwrap();
        store.end_session("done").unwrap();
        store.start_session("current").unwrap();
        let old = Utc::now() - TimeDelta::days(90);
        for s in &mut store.doc.sessions {
            s.started = old;
        }
        let report = store.cleanup(30).unwrap();
        assert_eq!(report.sessions_removed, 1);
        assert_eq!(store.current_session().unwrap().description, "current");
    }

    #[test]
    fn second_start_session_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        let first = store.start_session("first").unwrap();

        match store.start_session("second") {
            Err(StoreError::SessionAlreadyActive(id)) => assert_eq!(id, first),
            other => panic!("expected SessionAlreadyActive, got {:?}", other),
        }
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.current_session_id(), Some(first.as_str()));

        assert_eq!(store.end_session("wrap").unwrap(), Some(first));
        assert!(store.start_session("second").is_ok());
    }

    #[test]
    fn session_scoped_logging() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        assert!(!store.log_action("noop", json!({})).unwrap());
        assert_eq!(store.end_session("nothing").unwrap(), None);

        let sid = store.start_session("work").unwrap();
        assert!(store.log_action("edit", json!({ "file": "A.cpp" })).unwrap());
        let iid = store.add_insight("t", "d", json!({})).unwrap();
        let pid = store.add_problem("p", json!({})).unwrap();
        store.add_solution(&pid, "fix", true).unwrap();

        let session = store.current_session().unwrap();
        assert_eq!(session.actions.len(), 1);
        assert_eq!(session.insights, vec![iid]);
        assert_eq!(session.problems, vec![pid]);
        assert_eq!(session.solutions.len(), 1);
        assert_eq!(
            store.document().insights[0].session_id.as_deref(),
            Some(sid.as_str())
        );

        store.end_session("done").unwrap();
        let iid2 = store.add_insight("t", "after", json!({})).unwrap();
        let late = store
            .document()
            .insights
            .iter()
            .find(|i| i.id == iid2)
            .unwrap();
        assert!(late.session_id.is_none());
    }

    #[test]
    fn writes_are_persisted_and_reloaded() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = open(&tmp);
            store.start_session("persisted").unwrap();
            store.add_insight("t", "memory", json!({})).unwrap();
        }
        let store = reopen(&tmp);
        assert_eq!(store.document().insights.len(), 1);
        assert_eq!(store.current_session().unwrap().description, "persisted");
        assert!(!tmp.path().join("data/project-memory.json.tmp").exists());
    }

    #[test]
    fn corrupt_document_falls_back_to_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data/project-memory.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let store = open(&tmp);
        assert_eq!(store.document().total_items(), 0);
        assert_eq!(store.document().project_name, "Arena");
    }

    #[test]
    fn unusable_storage_directory_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let result = MemoryStore::open_at(
            &blocker.join("sub/memory.json"),
            "Arena",
            RelevanceScorer::new(&keywords()),
            50,
        );
        let err = result.err().unwrap();
        assert!(err.to_string().contains("Failed to create storage directory"));
    }

    #[test]
    fn export_then_import_keeps_counts() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        store.start_session("s").unwrap();
        store.add_insight("t", "character", json!({})).unwrap();
        store.add_pattern("p", "d", vec![], 3).unwrap();
        let pid = store.add_problem("bug", json!({})).unwrap();
        store.add_solution(&pid, "fix", true).unwrap();
        store
            .save_context_window(ContextPayload::Blob { data: json!({ "k": 1 }) })
            .unwrap();

        let before = store.get_memory_stats();
        let exported = store.export_memory(None).unwrap();
        assert!(exported
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("memory-export-"));

        store.import_memory(&exported).unwrap();
        let after = store.get_memory_stats();
        assert_eq!(before.total_sessions, after.total_sessions);
        assert_eq!(before.total_insights, after.total_insights);
        assert_eq!(before.total_patterns, after.total_patterns);
        assert_eq!(before.total_problems, after.total_problems);
        assert_eq!(before.solved_problems, after.solved_problems);
        assert_eq!(before.context_windows, after.context_windows);
        assert_eq!(before.total_items, after.total_items);
    }

    #[test]
    fn import_replaces_named_collections_only() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(&tmp);
        store.add_insight("t", "live insight", json!({})).unwrap();
        store.add_pattern("live", "d", vec![], 1).unwrap();

        let incoming = tmp.path().join("incoming.json");
        std::fs::write(&incoming, r#"{ "patterns": [] }"#).unwrap();
        store.import_memory(&incoming).unwrap();
        assert!(store.document().patterns.is_empty());
        assert_eq!(store.document().insights.len(), 1);

        std::fs::write(&incoming, "[1, 2]").unwrap();
        assert!(matches!(
            store.import_memory(&incoming),
            Err(StoreError::Import { .. })
        ));
    }
}
