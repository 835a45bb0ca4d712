//! Derived views over the memory document.
//!
//! Everything here is read-only with respect to the store except
//! [`create_snapshot`], which saves its result as a context window.
//! The query service keeps a [`KnowledgeCache`] that is refreshed on a timer;
//! readers fall back to the live store when the cache has not been filled.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::Path;

use crate::code_search;
use crate::config::Config;
use crate::models::{
    Architecture, ClassRecord, ContextPayload, ContextWindow, Insight, MemoryDocument,
    MemoryStats, Pattern, Problem, ProblemStatus, Session,
};
use crate::scanner;
use crate::store::MemoryStore;

/// Classes with more direct dependencies than this are flagged as highly coupled.
pub const HIGH_COUPLING_THRESHOLD: usize = 10;
/// Classes with more dependents than this are flagged as on the critical path.
pub const CRITICAL_PATH_THRESHOLD: usize = 5;
/// Classes longer than this get a "break it up" recommendation.
const LARGE_CLASS_LINES: usize = 2000;
/// Stored item count above which the health score is penalised.
const LARGE_MEMORY_ITEMS: usize = 10_000;
/// Upper bound on the depth of the cycle search.
const MAX_CYCLE_DEPTH: usize = 64;

// ── Knowledge graph ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub label: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relation: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub generated: DateTime<Utc>,
    pub total_nodes: usize,
    pub total_edges: usize,
}

/// Classes, insights and patterns as graph nodes. No edges are derived yet.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: GraphMetadata,
}

impl KnowledgeGraph {
    pub fn build(doc: &MemoryDocument) -> Self {
        let mut nodes = Vec::new();
        for (name, record) in &doc.key_classes {
            nodes.push(GraphNode {
                id: name.clone(),
                kind: "class",
                label: name.clone(),
                data: serde_json::to_value(record).unwrap_or(Value::Null),
            });
        }
        for (i, insight) in doc.insights.iter().enumerate() {
            nodes.push(GraphNode {
                id: format!("insight_{}", i),
                kind: "insight",
                label: insight.kind.clone(),
                data: serde_json::to_value(insight).unwrap_or(Value::Null),
            });
        }
        for (i, pattern) in doc.patterns.iter().enumerate() {
            nodes.push(GraphNode {
                id: format!("pattern_{}", i),
                kind: "pattern",
                label: pattern.name.clone(),
                data: serde_json::to_value(pattern).unwrap_or(Value::Null),
            });
        }
        let edges = Vec::new();
        Self {
            metadata: GraphMetadata {
                generated: Utc::now(),
                total_nodes: nodes.len(),
                total_edges: 0,
            },
            nodes,
            edges,
        }
    }
}

// ── Cache and health ────────────────────────────────────────────────────

struct CacheEntry {
    document: MemoryDocument,
    stats: MemoryStats,
    graph: KnowledgeGraph,
    last_sync: DateTime<Utc>,
}

/// Soft-refreshed copy of the store plus its knowledge graph.
#[derive(Default)]
pub struct KnowledgeCache {
    entry: Option<CacheEntry>,
}

impl KnowledgeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached copy with the current store contents.
    pub fn sync(&mut self, store: &MemoryStore) -> MemoryStats {
        let document = store.document().clone();
        let stats = store.get_memory_stats();
        let graph = KnowledgeGraph::build(&document);
        tracing::debug!(items = stats.total_items, "memory cache synced");
        self.entry = Some(CacheEntry {
            document,
            stats: stats.clone(),
            graph,
            last_sync: Utc::now(),
        });
        stats
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    /// Number of cached slices (document, stats, graph, sync time).
    pub fn cached_items(&self) -> usize {
        if self.entry.is_some() {
            4
        } else {
            0
        }
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.entry.as_ref().map(|e| e.last_sync)
    }

    pub fn stats(&self) -> Option<&MemoryStats> {
        self.entry.as_ref().map(|e| &e.stats)
    }

    pub fn graph(&self) -> Option<&KnowledgeGraph> {
        self.entry.as_ref().map(|e| &e.graph)
    }

    /// The cached document, or the live one when the cache is empty.
    pub fn document<'a>(&'a self, store: &'a MemoryStore) -> &'a MemoryDocument {
        match &self.entry {
            Some(entry) => &entry.document,
            None => store.document(),
        }
    }

    /// True when never synced or last synced more than `stale_after` ago.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.last_sync().is_none_or(|t| now - t > stale_after)
    }

    pub fn health(&self, stats: &MemoryStats, stale_after_secs: u64) -> MemoryHealth {
        let mut health = MemoryHealth {
            score: 100,
            status: "",
            issues: Vec::new(),
            recommendations: Vec::new(),
        };
        if stats.total_items > LARGE_MEMORY_ITEMS {
            health.penalise(
                20,
                "Large memory size may impact performance",
                "Consider running memory cleanup",
            );
        }
        if self.is_empty() {
            health.penalise(30, "Memory cache is empty", "Run memory sync to populate cache");
        }
        let stale_after = Duration::seconds(stale_after_secs.min(u32::MAX as u64) as i64);
        if self.is_stale(Utc::now(), stale_after) {
            health.penalise(15, "Memory cache is stale", "Sync memory cache");
        }
        health.status = health_status(health.score);
        health
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryHealth {
    pub score: i32,
    pub status: &'static str,
    pub issues: Vec<&'static str>,
    pub recommendations: Vec<&'static str>,
}

impl MemoryHealth {
    fn penalise(&mut self, points: i32, issue: &'static str, recommendation: &'static str) {
        self.score -= points;
        self.issues.push(issue);
        self.recommendations.push(recommendation);
    }
}

pub fn health_status(score: i32) -> &'static str {
    match score {
        s if s >= 80 => "excellent",
        s if s >= 60 => "good",
        s if s >= 40 => "fair",
        _ => "poor",
    }
}

// ── Time ranges ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Today,
    Week,
    Month,
    All,
}

impl TimeRange {
    /// Earliest timestamp inside the range, `None` for [`TimeRange::All`].
    pub fn cutoff(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeRange::Today => now.date_naive().and_hms_opt(0, 0, 0).map(|t| t.and_utc()),
            TimeRange::Week => Some(now - Duration::days(7)),
            TimeRange::Month => Some(now - Duration::days(30)),
            TimeRange::All => None,
        }
    }
}

impl std::str::FromStr for TimeRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "today" => Ok(TimeRange::Today),
            "week" => Ok(TimeRange::Week),
            "month" => Ok(TimeRange::Month),
            "all" => Ok(TimeRange::All),
            other => anyhow::bail!("unknown time range '{}'", other),
        }
    }
}

// ── Class analysis ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAnalysis {
    pub class_name: String,
    pub class_info: Option<ClassRecord>,
    pub relevant_context: Vec<ContextWindow>,
    pub recommendations: Vec<String>,
}

pub fn analyze_class(store: &MemoryStore, class_name: &str) -> ClassAnalysis {
    let class_info = store.get_class_info(class_name).cloned();
    let relevant_context = store.get_relevant_context(class_name, 3);
    let recommendations =
        class_recommendations(class_name, class_info.as_ref(), relevant_context.len());
    ClassAnalysis {
        class_name: class_name.to_string(),
        class_info,
        relevant_context,
        recommendations,
    }
}

fn class_recommendations(
    class_name: &str,
    info: Option<&ClassRecord>,
    context_count: usize,
) -> Vec<String> {
    let Some(info) = info else {
        return vec![format!(
            "Class {} not found in memory. Consider analyzing it first.",
            class_name
        )];
    };
    let mut recs = Vec::new();
    if info.line_count > LARGE_CLASS_LINES {
        recs.push(
            "Consider breaking down this large class into smaller, more focused components."
                .to_string(),
        );
    }
    if class_name.contains("Character") && !info.has_components {
        recs.push(
            "Character classes typically benefit from component-based architecture.".to_string(),
        );
    }
    if context_count > 0 {
        recs.push(format!(
            "Found {} relevant context entries that might be helpful.",
            context_count
        ));
    }
    recs
}

// ── Dependency analysis ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub cyclic_dependencies: bool,
    pub high_coupling: bool,
    pub critical_path: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyReport {
    pub system: String,
    pub depth: usize,
    pub direct_dependencies: Vec<String>,
    pub indirect_dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub risk_assessment: RiskAssessment,
}

fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.split('.').next().unwrap_or(name)
}

/// Stored dependencies of `record` plus its superclass.
fn direct_dependencies(record: &ClassRecord) -> Vec<String> {
    let mut deps = record.dependencies.clone();
    if let Some(parent) = &record.inheritance {
        if !deps.contains(parent) {
            deps.push(parent.clone());
        }
    }
    deps
}

/// Map a dependency name (class name or header stem) to a known class.
fn resolve<'a>(doc: &'a MemoryDocument, dep: &str) -> Option<&'a str> {
    if let Some((name, _)) = doc.key_classes.get_key_value(dep) {
        return Some(name.as_str());
    }
    doc.key_classes
        .iter()
        .find(|(_, r)| file_stem(&r.file) == dep)
        .map(|(name, _)| name.as_str())
}

/// Known classes `class` depends on, excluding itself.
fn neighbours<'a>(doc: &'a MemoryDocument, class: &str) -> Vec<&'a str> {
    let Some(record) = doc.key_classes.get(class) else {
        return Vec::new();
    };
    let mut out: Vec<&str> = Vec::new();
    for dep in direct_dependencies(record) {
        if let Some(target) = resolve(doc, &dep) {
            if target != class && !out.contains(&target) {
                out.push(target);
            }
        }
    }
    out
}

pub fn system_dependencies(doc: &MemoryDocument, system: &str, depth: usize) -> DependencyReport {
    let direct = doc
        .key_classes
        .get(system)
        .map(direct_dependencies)
        .unwrap_or_default();

    let own_stem = doc.key_classes.get(system).map(|r| file_stem(&r.file));
    let dependents: Vec<String> = doc
        .key_classes
        .iter()
        .filter(|(name, _)| name.as_str() != system)
        .filter(|(_, r)| {
            r.inheritance.as_deref() == Some(system)
                || r.dependencies
                    .iter()
                    .any(|d| d == system || Some(d.as_str()) == own_stem)
        })
        .map(|(name, _)| name.clone())
        .collect();

    let indirect = indirect_dependencies(doc, system, &direct, depth);
    let cyclic = has_cycle(doc, system);

    DependencyReport {
        system: system.to_string(),
        depth,
        risk_assessment: RiskAssessment {
            cyclic_dependencies: cyclic,
            high_coupling: direct.len() > HIGH_COUPLING_THRESHOLD,
            critical_path: dependents.len() > CRITICAL_PATH_THRESHOLD,
        },
        direct_dependencies: direct,
        indirect_dependencies: indirect,
        dependents,
    }
}

/// Breadth-first walk from the direct dependencies, up to `depth` levels
/// from `system`. Level 1 is the direct set and is not repeated here.
fn indirect_dependencies(
    doc: &MemoryDocument,
    system: &str,
    direct: &[String],
    depth: usize,
) -> Vec<String> {
    let mut seen: HashSet<String> = direct.iter().cloned().collect();
    seen.insert(system.to_string());
    let mut found = Vec::new();
    let mut queue: VecDeque<(&str, usize)> = direct
        .iter()
        .filter_map(|d| resolve(doc, d))
        .map(|c| (c, 1))
        .collect();

    while let Some((class, level)) = queue.pop_front() {
        if level >= depth {
            continue;
        }
        let Some(record) = doc.key_classes.get(class) else {
            continue;
        };
        for dep in direct_dependencies(record) {
            if !seen.insert(dep.clone()) {
                continue;
            }
            if resolve(doc, &dep) == Some(system) {
                continue;
            }
            if let Some(next) = resolve(doc, &dep) {
                queue.push_back((next, level + 1));
            }
            found.push(dep);
        }
    }
    found
}

/// Bounded depth-first walk over known classes; true when some path from
/// `start` leads back to `start`.
fn has_cycle(doc: &MemoryDocument, start: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
    while let Some((node, depth)) = stack.pop() {
        for next in neighbours(doc, node) {
            if next == start {
                return true;
            }
            if depth < MAX_CYCLE_DEPTH && visited.insert(next) {
                stack.push((next, depth + 1));
            }
        }
    }
    false
}

// ── Class hierarchy ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct HierarchyLink {
    pub name: String,
    pub parent: Option<String>,
    /// Declaring file, when known.
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassHierarchy {
    pub class_name: String,
    /// The class itself followed by each ancestor, nearest first.
    pub chain: Vec<HierarchyLink>,
    /// Known classes whose direct superclass is `class_name`.
    pub children: Vec<String>,
    /// Set when the chain loops back onto itself.
    pub cycle: bool,
}

/// Superclass chain for `class_name`, read from stored records and, for
/// classes the store does not know, from headers under `root`.
pub fn class_hierarchy(doc: &MemoryDocument, root: &Path, class_name: &str) -> ClassHierarchy {
    let mut scanned: Option<BTreeMap<String, (Option<String>, String)>> = None;
    let mut chain: Vec<HierarchyLink> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut cycle = false;
    let mut current = Some(class_name.to_string());

    while let Some(name) = current.take() {
        if !seen.insert(name.clone()) {
            cycle = true;
            break;
        }
        let (parent, file) = match doc.key_classes.get(&name) {
            Some(record) => (record.inheritance.clone(), Some(record.file.clone())),
            None => {
                let headers = scanned.get_or_insert_with(|| scan_headers(root));
                match headers.get(&name) {
                    Some((parent, file)) => (parent.clone(), Some(file.clone())),
                    None => (None, None),
                }
            }
        };
        current = parent.clone();
        chain.push(HierarchyLink { name, parent, file });
    }

    let children = doc
        .key_classes
        .iter()
        .filter(|(_, r)| r.inheritance.as_deref() == Some(class_name))
        .map(|(name, _)| name.clone())
        .collect();

    ClassHierarchy {
        class_name: class_name.to_string(),
        chain,
        children,
        cycle,
    }
}

/// Class → (superclass, file) for every header under `root`.
fn scan_headers(root: &Path) -> BTreeMap<String, (Option<String>, String)> {
    let mut map = BTreeMap::new();
    let files = match code_search::source_files(root, |rel| rel.ends_with(".h")) {
        Ok(files) => files,
        Err(e) => {
            tracing::debug!(error = %e, "header scan skipped");
            return map;
        }
    };
    for (path, rel) in files {
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        for class in scanner::extract_classes(&text) {
            map.entry(class.name)
                .or_insert_with(|| (class.parent, rel.clone()));
        }
    }
    map
}

// ── Project overview ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct OverviewOptions {
    pub include_architecture: bool,
    pub include_recent_changes: bool,
    pub include_issues: bool,
}

impl Default for OverviewOptions {
    fn default() -> Self {
        Self {
            include_architecture: true,
            include_recent_changes: true,
            include_issues: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchitectureOverview {
    pub key_classes: Vec<String>,
    pub knowledge_graph: Option<KnowledgeGraph>,
    pub core_systems_map: Architecture,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentChanges {
    pub sessions: Vec<Session>,
    pub insights: Vec<Insight>,
    pub patterns: Vec<Pattern>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSummary {
    pub open_problems: Vec<Problem>,
    pub recently_solved: Vec<Problem>,
    pub total_tracked: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewSummary {
    pub total_sessions: usize,
    pub total_insights: usize,
    pub total_patterns: usize,
    pub memory_health: MemoryHealth,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOverview {
    pub project_name: String,
    pub engine_version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<ArchitectureOverview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_changes: Option<RecentChanges>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<IssueSummary>,
    pub summary: OverviewSummary,
}

pub fn architecture_overview(store: &MemoryStore, cache: &KnowledgeCache) -> ArchitectureOverview {
    let doc = store.document();
    ArchitectureOverview {
        key_classes: doc.key_classes.keys().cloned().collect(),
        knowledge_graph: cache.graph().cloned(),
        core_systems_map: doc.architecture.clone(),
    }
}

pub fn issue_summary(doc: &MemoryDocument, solved_limit: usize) -> IssueSummary {
    let (solved, open): (Vec<&Problem>, Vec<&Problem>) = doc
        .problems
        .iter()
        .partition(|p| p.status == ProblemStatus::Solved);
    let skip = solved.len().saturating_sub(solved_limit);
    IssueSummary {
        open_problems: open.into_iter().cloned().collect(),
        recently_solved: solved.into_iter().skip(skip).cloned().collect(),
        total_tracked: doc.problems.len(),
    }
}

pub fn project_overview(
    store: &MemoryStore,
    cache: &KnowledgeCache,
    config: &Config,
    opts: OverviewOptions,
) -> ProjectOverview {
    let doc = store.document();
    let recent_changes = opts.include_recent_changes.then(|| {
        let skip = doc.sessions.len().saturating_sub(5);
        let mut insights = store.get_insights(None, 0.3);
        insights.truncate(10);
        let mut patterns = store.get_patterns(0.5);
        patterns.truncate(5);
        RecentChanges {
            sessions: doc.sessions.iter().skip(skip).cloned().collect(),
            insights,
            patterns,
        }
    });

    ProjectOverview {
        project_name: config.project.name.clone(),
        engine_version: config.project.engine_version.clone(),
        timestamp: Utc::now(),
        architecture: opts
            .include_architecture
            .then(|| architecture_overview(store, cache)),
        recent_changes,
        issues: opts.include_issues.then(|| issue_summary(doc, 5)),
        summary: OverviewSummary {
            total_sessions: doc.sessions.len(),
            total_insights: doc.insights.len(),
            total_patterns: doc.patterns.len(),
            memory_health: cache.health(&store.get_memory_stats(), config.server.stale_after_secs),
        },
    }
}

// ── Snapshots ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotOutcome {
    pub snapshot_id: String,
    pub summary: String,
}

/// Save a snapshot of the current project state as a context window.
///
/// The snapshot records stats, optionally a code summary (tracked files
/// under the source root, known classes, recent `code_change` events) and
/// the cached knowledge graph. It does not embed the whole document.
pub fn create_snapshot(
    store: &mut MemoryStore,
    cache: &KnowledgeCache,
    config: &Config,
    description: Option<&str>,
    include_code: bool,
    include_architecture: bool,
) -> Result<SnapshotOutcome> {
    let stats = store.get_memory_stats();
    let mut data = serde_json::Map::new();

    if include_code {
        let extensions = &config.indexer.extensions;
        let total_files = code_search::source_files(&config.indexer.root, |rel| {
            extensions.iter().any(|ext| rel.ends_with(ext.as_str()))
        })
        .map(|files| files.len())
        .unwrap_or(0);
        data.insert(
            "codeAnalysis".to_string(),
            json!({
                "totalFiles": total_files,
                "lastAnalyzed": Utc::now(),
                "keyClasses": store.document().key_classes.keys().collect::<Vec<_>>(),
                "recentChanges": store.get_development_history(Some("code_change"), 10),
            }),
        );
    }
    if include_architecture {
        data.insert(
            "architecture".to_string(),
            match cache.graph() {
                Some(graph) => serde_json::to_value(graph)?,
                None => json!({}),
            },
        );
    }
    data.insert("stats".to_string(), serde_json::to_value(&stats)?);

    let snapshot = json!({
        "timestamp": Utc::now(),
        "sessionId": store.current_session_id(),
        "options": {
            "includeCode": include_code,
            "includeArchitecture": include_architecture,
        },
        "data": data,
    });
    let snapshot_id = store.save_context_window(ContextPayload::Snapshot {
        description: description.unwrap_or("Automated memory snapshot").to_string(),
        snapshot,
    })?;

    Ok(SnapshotOutcome {
        snapshot_id,
        summary: format!("Created memory snapshot with {} items", stats.total_items),
    })
}
