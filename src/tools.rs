//! Built-in query-service tools.
//!
//! | Tool | Intent |
//! |------|--------|
//! | `save_context` | store a context window |
//! | `search_memory` | substring search with category and time filters |
//! | `create_memory_snapshot` | save a state snapshot as a context window |
//! | `sync_project_knowledge` | refresh the cache, optionally re-index first |
//! | `add_insight` / `add_pattern` | record knowledge |
//! | `track_problem` / `add_solution` | problem lifecycle |
//! | `analyze_class_with_memory` | stored class record plus recommendations |
//! | `get_relevant_context` | newest matching context windows |
//! | `memory_stats` / `get_project_overview` | aggregates and health |
//! | `analyze_system_dependencies` / `find_class_hierarchy` | class relationships |
//! | `find_references` / `search_code` / `analyze_file` | live source queries |
//! | `index_project` / `index_file` | run the indexer |
//! | `add_development_event` / `get_development_history` | event log |
//!
//! Mutating tools refresh the knowledge cache before returning.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tokio::sync::OwnedMutexGuard;

use crate::code_search::{self, DEFAULT_CODE_GLOB, DEFAULT_MATCH_LIMIT};
use crate::indexer::Indexer;
use crate::knowledge::{self, OverviewOptions, TimeRange};
use crate::models::{ContextPayload, Impact};
use crate::progress::NoProgress;
use crate::scanner::{ScanLimits, Scanner};
use crate::store::{MemoryStore, SearchCategory};
use crate::traits::{Tool, ToolContext};

/// Every built-in tool, in `tools/list` order.
pub fn builtin_tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(SaveContextTool),
        Box::new(SearchMemoryTool),
        Box::new(CreateSnapshotTool),
        Box::new(SyncKnowledgeTool),
        Box::new(AddInsightTool),
        Box::new(AddPatternTool),
        Box::new(TrackProblemTool),
        Box::new(AddSolutionTool),
        Box::new(AnalyzeClassTool),
        Box::new(RelevantContextTool),
        Box::new(MemoryStatsTool),
        Box::new(ProjectOverviewTool),
        Box::new(SystemDependenciesTool),
        Box::new(ClassHierarchyTool),
        Box::new(FindReferencesTool),
        Box::new(SearchCodeTool),
        Box::new(AnalyzeFileTool),
        Box::new(IndexProjectTool),
        Box::new(IndexFileTool),
        Box::new(AddEventTool),
        Box::new(HistoryTool),
    ]
}

// ── Blocking work ───────────────────────────────────────────────────────

/// Run filesystem-bound work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("source task panicked")?
}

/// Run `work` against the locked store on the blocking pool and hand the
/// guard back, so the caller can refresh the cache before releasing it.
async fn with_store_blocking<T, F>(
    ctx: &ToolContext,
    work: F,
) -> Result<(OwnedMutexGuard<MemoryStore>, T)>
where
    F: FnOnce(&mut MemoryStore) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let mut store = ctx.store_owned().await;
    let (store, outcome) = tokio::task::spawn_blocking(move || {
        let outcome = work(&mut store);
        (store, outcome)
    })
    .await
    .context("indexing task panicked")?;
    Ok((store, outcome?))
}

// ── Argument helpers ────────────────────────────────────────────────────

fn str_arg<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing required parameter: {}", key))
}

fn opt_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn bool_arg(params: &Value, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn usize_arg(params: &Value, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(default)
}

fn string_list(params: &Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// `base` (when an object) with the listed optional arguments copied in.
fn with_extras(base: Option<&Value>, params: &Value, keys: &[&str]) -> Value {
    let mut map = match base {
        Some(Value::Object(m)) => m.clone(),
        _ => Map::new(),
    };
    for key in keys {
        if let Some(v) = params.get(*key).filter(|v| !v.is_null()) {
            map.insert(key.to_string(), v.clone());
        }
    }
    Value::Object(map)
}

const IMPACT_LEVELS: [&str; 4] = ["low", "medium", "high", "critical"];

// ── Memory tools ────────────────────────────────────────────────────────

pub struct SaveContextTool;

#[async_trait]
impl Tool for SaveContextTool {
    fn name(&self) -> &str {
        "save_context"
    }

    fn description(&self) -> &str {
        "Save current context for future reference"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "contextData": { "type": "object", "description": "Context data to save; a 'kind' field selects a typed payload" },
                "description": { "type": "string", "description": "Description of the context" },
                "tags": { "type": "array", "items": { "type": "string" }, "description": "Caller-supplied tags" },
                "category": {
                    "type": "string",
                    "description": "Context category",
                    "enum": ["development", "debugging", "architecture", "implementation", "analysis"]
                }
            },
            "required": ["contextData"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let data = &params["contextData"];
        let payload = if data.get("kind").is_some() {
            ContextPayload::from_value(data.clone())
        } else {
            ContextPayload::from_value(with_extras(
                Some(data),
                &params,
                &["description", "tags", "category"],
            ))
        };

        let mut store = ctx.store().await;
        let context_id = store.save_context_window(payload)?;
        ctx.sync_cache(&store).await;
        Ok(json!({
            "contextId": context_id,
            "message": "Context saved successfully",
        }))
    }
}

pub struct SearchMemoryTool;

#[async_trait]
impl Tool for SearchMemoryTool {
    fn name(&self) -> &str {
        "search_memory"
    }

    fn description(&self) -> &str {
        "Search through saved memories"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "categories": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Categories to search: insights, patterns, problems, history, contexts"
                },
                "timeRange": {
                    "type": "string",
                    "description": "Only items from this range",
                    "enum": ["today", "week", "month", "all"],
                    "default": "all"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = str_arg(&params, "query")?;
        let categories = string_list(&params, "categories")
            .iter()
            .map(|c| c.parse::<SearchCategory>())
            .collect::<Result<Vec<_>>>()?;
        let categories: &[SearchCategory] = if categories.is_empty() {
            SearchCategory::DEFAULT
        } else {
            &categories
        };
        let range: TimeRange = opt_str(&params, "timeRange").unwrap_or("all").parse()?;

        let store = ctx.store().await;
        let results = store.search_since(query, categories, range.cutoff(Utc::now()));
        Ok(json!({
            "totalFound": results.total(),
            "results": results,
            "filters": { "timeRange": params["timeRange"] },
        }))
    }
}

pub struct CreateSnapshotTool;

#[async_trait]
impl Tool for CreateSnapshotTool {
    fn name(&self) -> &str {
        "create_memory_snapshot"
    }

    fn description(&self) -> &str {
        "Create a memory snapshot of the current project state"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "includeCode": { "type": "boolean", "description": "Include code analysis", "default": true },
                "includeArchitecture": { "type": "boolean", "description": "Include architecture mapping", "default": true },
                "description": { "type": "string", "description": "Snapshot description" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let mut store = ctx.store().await;
        let outcome = {
            let cache = ctx.cache().await;
            knowledge::create_snapshot(
                &mut store,
                &cache,
                ctx.config(),
                opt_str(&params, "description"),
                bool_arg(&params, "includeCode", true),
                bool_arg(&params, "includeArchitecture", true),
            )?
        };
        ctx.sync_cache(&store).await;
        Ok(serde_json::to_value(outcome)?)
    }
}

pub struct SyncKnowledgeTool;

#[async_trait]
impl Tool for SyncKnowledgeTool {
    fn name(&self) -> &str {
        "sync_project_knowledge"
    }

    fn description(&self) -> &str {
        "Sync the knowledge cache with the memory store"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "force": { "type": "boolean", "description": "Re-index the source root before syncing", "default": false }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let store = if bool_arg(&params, "force", false) {
            let indexer = Indexer::new(ctx.config())?;
            let root = ctx.config().indexer.root.clone();
            let (store, _) = with_store_blocking(ctx, move |store| {
                indexer.index_tree(store, &root, &NoProgress)
            })
            .await?;
            store
        } else {
            ctx.store_owned().await
        };
        let stats = ctx.sync_cache(&store).await;
        Ok(json!({
            "message": format!(
                "Project knowledge synced. Current memory contains {} items.",
                stats.total_items
            ),
            "stats": stats,
        }))
    }
}

pub struct AddInsightTool;

#[async_trait]
impl Tool for AddInsightTool {
    fn name(&self) -> &str {
        "add_insight"
    }

    fn description(&self) -> &str {
        "Add a development insight"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": { "type": "string", "description": "Type of insight" },
                "description": { "type": "string", "description": "Insight description" },
                "context": { "type": "object", "description": "Additional context" },
                "impact": { "type": "string", "enum": IMPACT_LEVELS, "description": "Expected impact" },
                "implementationStatus": { "type": "string", "description": "Where the insight stands" }
            },
            "required": ["type", "description"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let kind = str_arg(&params, "type")?;
        let description = str_arg(&params, "description")?;
        let context = with_extras(
            params.get("context"),
            &params,
            &["impact", "implementationStatus"],
        );

        let mut store = ctx.store().await;
        let insight_id = store.add_insight(kind, description, context)?;
        let relevance = store
            .document()
            .insights
            .iter()
            .find(|i| i.id == insight_id)
            .map(|i| i.relevance)
            .unwrap_or_default();
        ctx.sync_cache(&store).await;
        Ok(json!({
            "insightId": insight_id,
            "relevance": relevance,
            "message": "Insight added successfully",
        }))
    }
}

pub struct AddPatternTool;

#[async_trait]
impl Tool for AddPatternTool {
    fn name(&self) -> &str {
        "add_pattern"
    }

    fn description(&self) -> &str {
        "Record a code pattern"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Pattern name" },
                "description": { "type": "string", "description": "Pattern description" },
                "examples": { "type": "array", "items": { "type": "string" }, "description": "Code examples" },
                "usageCount": { "type": "integer", "description": "Times the pattern has been seen", "default": 1 }
            },
            "required": ["name", "description"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let name = str_arg(&params, "name")?;
        let description = str_arg(&params, "description")?;
        let frequency = u32::try_from(usize_arg(&params, "usageCount", 1)).unwrap_or(u32::MAX);

        let mut store = ctx.store().await;
        let pattern_id =
            store.add_pattern(name, description, string_list(&params, "examples"), frequency)?;
        ctx.sync_cache(&store).await;
        Ok(json!({
            "patternId": pattern_id,
            "message": "Pattern recorded successfully",
        }))
    }
}

pub struct TrackProblemTool;

#[async_trait]
impl Tool for TrackProblemTool {
    fn name(&self) -> &str {
        "track_problem"
    }

    fn description(&self) -> &str {
        "Track a development problem"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": { "type": "string", "description": "Problem description" },
                "context": { "type": "object", "description": "Problem context" },
                "severity": { "type": "string", "enum": IMPACT_LEVELS, "description": "Problem severity" },
                "affectedSystems": { "type": "array", "items": { "type": "string" }, "description": "Systems affected" }
            },
            "required": ["description"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let description = str_arg(&params, "description")?;
        let context = with_extras(
            params.get("context"),
            &params,
            &["severity", "affectedSystems"],
        );

        let mut store = ctx.store().await;
        let similar = store.get_similar_problems(description);
        let problem_id = store.add_problem(description, context)?;
        ctx.sync_cache(&store).await;
        Ok(json!({
            "problemId": problem_id,
            "similarProblems": similar,
            "message": "Problem tracked successfully",
        }))
    }
}

pub struct AddSolutionTool;

#[async_trait]
impl Tool for AddSolutionTool {
    fn name(&self) -> &str {
        "add_solution"
    }

    fn description(&self) -> &str {
        "Add solution to a tracked problem"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "problemId": { "type": "string", "description": "Problem ID" },
                "solution": { "type": "string", "description": "Solution description" },
                "successful": { "type": "boolean", "description": "Whether solution was successful", "default": true }
            },
            "required": ["problemId", "solution"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let problem_id = str_arg(&params, "problemId")?;
        let solution = str_arg(&params, "solution")?;
        let successful = bool_arg(&params, "successful", true);

        let mut store = ctx.store().await;
        if !store.add_solution(problem_id, solution, successful)? {
            anyhow::bail!("Problem not found: {}", problem_id);
        }
        let status = store.get_problem(problem_id).map(|p| p.status);
        ctx.sync_cache(&store).await;
        Ok(json!({
            "problemId": problem_id,
            "status": status,
            "message": "Solution added successfully",
        }))
    }
}

pub struct AnalyzeClassTool;

#[async_trait]
impl Tool for AnalyzeClassTool {
    fn name(&self) -> &str {
        "analyze_class_with_memory"
    }

    fn description(&self) -> &str {
        "Analyze a class with memory context"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "className": { "type": "string", "description": "Class name to analyze" }
            },
            "required": ["className"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let class_name = str_arg(&params, "className")?;
        let store = ctx.store().await;
        Ok(serde_json::to_value(knowledge::analyze_class(&store, class_name))?)
    }
}

pub struct RelevantContextTool;

#[async_trait]
impl Tool for RelevantContextTool {
    fn name(&self) -> &str {
        "get_relevant_context"
    }

    fn description(&self) -> &str {
        "Get relevant context for the current task"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Context query" },
                "limit": { "type": "integer", "description": "Max results", "default": 5 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = str_arg(&params, "query")?;
        let limit = usize_arg(&params, "limit", 5);
        let store = ctx.store().await;
        let context = store.get_relevant_context(query, limit);
        Ok(json!({ "count": context.len(), "context": context }))
    }
}

pub struct MemoryStatsTool;

#[async_trait]
impl Tool for MemoryStatsTool {
    fn name(&self) -> &str {
        "memory_stats"
    }

    fn description(&self) -> &str {
        "Get memory system statistics"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "includeDetails": { "type": "boolean", "description": "Separate store and cache figures", "default": false }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let store = ctx.store().await;
        let cache = ctx.cache().await;
        let memory = serde_json::to_value(store.get_memory_stats())?;
        let cache_stats = json!({
            "lastSync": cache.last_sync(),
            "cachedItems": cache.cached_items(),
            "knowledgeGraphNodes": cache.graph().map(|g| g.metadata.total_nodes).unwrap_or(0),
        });

        let stats = if bool_arg(&params, "includeDetails", false) {
            json!({ "memory": memory, "cache": cache_stats })
        } else {
            let mut merged = memory.as_object().cloned().unwrap_or_default();
            if let Value::Object(extra) = cache_stats {
                merged.extend(extra);
            }
            Value::Object(merged)
        };
        Ok(json!({
            "stats": stats,
            "sessionId": store.current_session_id(),
        }))
    }
}

pub struct ProjectOverviewTool;

#[async_trait]
impl Tool for ProjectOverviewTool {
    fn name(&self) -> &str {
        "get_project_overview"
    }

    fn description(&self) -> &str {
        "Get a project overview from memory"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "includeArchitecture": { "type": "boolean", "description": "Include architecture overview", "default": true },
                "includeRecentChanges": { "type": "boolean", "description": "Include recent changes", "default": true },
                "includeIssues": { "type": "boolean", "description": "Include current issues", "default": true }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let opts = OverviewOptions {
            include_architecture: bool_arg(&params, "includeArchitecture", true),
            include_recent_changes: bool_arg(&params, "includeRecentChanges", true),
            include_issues: bool_arg(&params, "includeIssues", true),
        };
        let store = ctx.store().await;
        let cache = ctx.cache().await;
        let overview = knowledge::project_overview(&store, &cache, ctx.config(), opts);
        Ok(json!({ "overview": overview }))
    }
}

pub struct SystemDependenciesTool;

#[async_trait]
impl Tool for SystemDependenciesTool {
    fn name(&self) -> &str {
        "analyze_system_dependencies"
    }

    fn description(&self) -> &str {
        "Analyze class dependencies, dependents and cycle risk"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "systemName": { "type": "string", "description": "System or class name" },
                "depth": { "type": "integer", "description": "Dependency depth", "default": 3 }
            },
            "required": ["systemName"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let system = str_arg(&params, "systemName")?;
        let depth = usize_arg(&params, "depth", 3);
        let store = ctx.store().await;
        let cache = ctx.cache().await;
        let report = knowledge::system_dependencies(cache.document(&store), system, depth);
        Ok(json!({ "dependencies": report }))
    }
}

pub struct ClassHierarchyTool;

#[async_trait]
impl Tool for ClassHierarchyTool {
    fn name(&self) -> &str {
        "find_class_hierarchy"
    }

    fn description(&self) -> &str {
        "Walk a class's superclass chain"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "className": { "type": "string", "description": "Class to start from" }
            },
            "required": ["className"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let class_name = str_arg(&params, "className")?;
        let store = ctx.store().await;
        let hierarchy =
            knowledge::class_hierarchy(store.document(), &ctx.config().indexer.root, class_name);
        Ok(json!({ "hierarchy": hierarchy }))
    }
}

// ── Source tools ────────────────────────────────────────────────────────

pub struct FindReferencesTool;

#[async_trait]
impl Tool for FindReferencesTool {
    fn name(&self) -> &str {
        "find_references"
    }

    fn description(&self) -> &str {
        "Find word-bounded uses of an identifier in the source tree"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "identifier": { "type": "string", "description": "Class, function or variable name" },
                "limit": { "type": "integer", "description": "Max results", "default": DEFAULT_MATCH_LIMIT }
            },
            "required": ["identifier"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let identifier = str_arg(&params, "identifier")?.to_string();
        let limit = usize_arg(&params, "limit", DEFAULT_MATCH_LIMIT);
        let root = ctx.config().indexer.root.clone();
        let extensions = ctx.config().indexer.extensions.clone();
        let references = blocking(move || {
            code_search::find_references(&root, &extensions, &identifier, limit)
        })
        .await?;
        Ok(json!({ "count": references.len(), "references": references }))
    }
}

pub struct SearchCodeTool;

#[async_trait]
impl Tool for SearchCodeTool {
    fn name(&self) -> &str {
        "search_code"
    }

    fn description(&self) -> &str {
        "Regex search over source files"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression" },
                "glob": { "type": "string", "description": "File filter", "default": DEFAULT_CODE_GLOB },
                "limit": { "type": "integer", "description": "Max results", "default": DEFAULT_MATCH_LIMIT }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let pattern = str_arg(&params, "pattern")?.to_string();
        let glob = opt_str(&params, "glob").unwrap_or(DEFAULT_CODE_GLOB).to_string();
        let limit = usize_arg(&params, "limit", DEFAULT_MATCH_LIMIT);
        let root = ctx.config().indexer.root.clone();
        let matches =
            blocking(move || code_search::search_code(&root, &pattern, &glob, limit)).await?;
        Ok(json!({ "count": matches.len(), "matches": matches }))
    }
}

pub struct AnalyzeFileTool;

#[async_trait]
impl Tool for AnalyzeFileTool {
    fn name(&self) -> &str {
        "analyze_file"
    }

    fn description(&self) -> &str {
        "Scan and lint one source file"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file": { "type": "string", "description": "Path relative to the source root" }
            },
            "required": ["file"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let config = ctx.config();
        let scanner = Scanner::new(ScanLimits::from(&config.scanner));
        let file = str_arg(&params, "file")?.to_string();
        let root = config.indexer.root.clone();
        let long_function_lines = config.scanner.long_function_lines;
        let analysis = blocking(move || {
            code_search::analyze_file(&root, &file, &scanner, long_function_lines)
        })
        .await?;
        Ok(json!({ "analysis": analysis }))
    }
}

pub struct IndexProjectTool;

#[async_trait]
impl Tool for IndexProjectTool {
    fn name(&self) -> &str {
        "index_project"
    }

    fn description(&self) -> &str {
        "Index the source tree into memory"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "root": { "type": "string", "description": "Directory to index (defaults to the configured root)" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let root = opt_str(&params, "root")
            .map(PathBuf::from)
            .unwrap_or_else(|| ctx.config().indexer.root.clone());
        let indexer = Indexer::new(ctx.config())?;

        let (store, stats) =
            with_store_blocking(ctx, move |store| indexer.index_tree(store, &root, &NoProgress))
                .await?;
        ctx.sync_cache(&store).await;
        Ok(json!({ "stats": stats }))
    }
}

pub struct IndexFileTool;

#[async_trait]
impl Tool for IndexFileTool {
    fn name(&self) -> &str {
        "index_file"
    }

    fn description(&self) -> &str {
        "Rescan one changed file"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file": { "type": "string", "description": "Path relative to the source root" }
            },
            "required": ["file"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let root = ctx.config().indexer.root.clone();
        let path = code_search::resolve_under(&root, str_arg(&params, "file")?)?;
        let indexer = Indexer::new(ctx.config())?;

        let (store, outcome) =
            with_store_blocking(ctx, move |store| indexer.index_file(store, &root, &path)).await?;
        ctx.sync_cache(&store).await;
        Ok(json!({ "result": outcome }))
    }
}

// ── History tools ───────────────────────────────────────────────────────

pub struct AddEventTool;

#[async_trait]
impl Tool for AddEventTool {
    fn name(&self) -> &str {
        "add_development_event"
    }

    fn description(&self) -> &str {
        "Record a development event"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": { "type": "string", "description": "Event type, e.g. code_change" },
                "description": { "type": "string", "description": "What happened" },
                "files": { "type": "array", "items": { "type": "string" }, "description": "Files involved" },
                "impact": { "type": "string", "enum": IMPACT_LEVELS, "default": "medium" }
            },
            "required": ["type", "description"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let kind = str_arg(&params, "type")?;
        let description = str_arg(&params, "description")?;
        let impact: Impact = opt_str(&params, "impact").unwrap_or("medium").parse()?;

        let mut store = ctx.store().await;
        let event_id =
            store.add_development_event(kind, description, string_list(&params, "files"), impact)?;
        ctx.sync_cache(&store).await;
        Ok(json!({ "eventId": event_id, "message": "Event recorded" }))
    }
}

pub struct HistoryTool;

#[async_trait]
impl Tool for HistoryTool {
    fn name(&self) -> &str {
        "get_development_history"
    }

    fn description(&self) -> &str {
        "List recent development events"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": { "type": "string", "description": "Only events of this type" },
                "limit": { "type": "integer", "description": "Max results", "default": 10 }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let store = ctx.store().await;
        let history =
            store.get_development_history(opt_str(&params, "type"), usize_arg(&params, "limit", 10));
        Ok(json!({ "count": history.len(), "history": history }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::knowledge::KnowledgeCache;
    use crate::store::MemoryStore;
    use crate::traits::ToolRegistry;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::{Mutex, RwLock};

    fn context(tmp: &TempDir) -> ToolContext {
        let mut config = Config::minimal();
        config.store.dir = tmp.path().join("data");
        config.indexer.root = tmp.path().join("Source");
        fs::create_dir_all(config.indexer.root.join("Game")).unwrap();
        fs::write(
            config.indexer.root.join("Game/HealthComponent.h"),
            "class UHealthComponent : public UActorComponent {\n  float Health;\n};\n",
        )
        .unwrap();
        let store = MemoryStore::open(&config).unwrap();
        ToolContext::new(
            Arc::new(config),
            Arc::new(Mutex::new(store)),
            Arc::new(RwLock::new(KnowledgeCache::new())),
        )
    }

    #[tokio::test]
    async fn save_context_merges_extras_into_untyped_data() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let registry = ToolRegistry::with_builtins();

        let out = registry
            .call(
                "save_context",
                json!({ "contextData": { "note": "x" }, "category": "debugging" }),
                &ctx,
            )
            .await;
        assert_eq!(out["success"], true);
        assert_eq!(out["message"], "Context saved successfully");

        let store = ctx.store().await;
        let window = &store.document().context_windows[0];
        assert_eq!(
            window.data,
            ContextPayload::Blob {
                data: json!({ "note": "x", "category": "debugging" })
            }
        );
        drop(store);
        assert_eq!(ctx.cache().await.cached_items(), 4);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn source_tools_interleave_on_one_runtime_thread() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let registry = ToolRegistry::with_builtins();

        let (indexed, refs, analysis) = tokio::join!(
            registry.call("index_project", json!({}), &ctx),
            registry.call("find_references", json!({ "identifier": "Health" }), &ctx),
            registry.call("analyze_file", json!({ "file": "Game/HealthComponent.h" }), &ctx),
        );
        assert_eq!(indexed["success"], true);
        assert_eq!(indexed["stats"]["processedFiles"], 1);
        assert_eq!(refs["count"], 1);
        assert_eq!(analysis["success"], true);

        let missing = registry
            .call("index_project", json!({ "root": tmp.path().join("nope") }), &ctx)
            .await;
        assert_eq!(missing["success"], false);

        // The guard went back after both runs; the cache saw the indexed class.
        let store = ctx.store().await;
        assert!(store.get_class_info("UHealthComponent").is_some());
        assert!(store.current_session().is_none());
        drop(store);
        assert!(ctx.cache().await.graph().is_some());
    }

    #[tokio::test]
    async fn problem_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let registry = ToolRegistry::with_builtins();

        let first = registry
            .call("track_problem", json!({ "description": "crash on save game" }), &ctx)
            .await;
        assert_eq!(first["similarProblems"], json!([]));
        let second = registry
            .call("track_problem", json!({ "description": "crash on save game load" }), &ctx)
            .await;
        assert_eq!(second["similarProblems"].as_array().unwrap().len(), 1);

        let id = first["problemId"].as_str().unwrap();
        let solved = registry
            .call("add_solution", json!({ "problemId": id, "solution": "flush" }), &ctx)
            .await;
        assert_eq!(solved["success"], true);
        assert_eq!(solved["status"], "solved");

        let missing = registry
            .call("add_solution", json!({ "problemId": "nope", "solution": "x" }), &ctx)
            .await;
        assert_eq!(missing["success"], false);
        assert_eq!(missing["error"], "Problem not found: nope");
    }

    #[tokio::test]
    async fn search_memory_reports_filters() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let registry = ToolRegistry::with_builtins();
        registry
            .call(
                "add_insight",
                json!({ "type": "performance", "description": "Tick is hot", "impact": "high" }),
                &ctx,
            )
            .await;

        let out = registry
            .call("search_memory", json!({ "query": "tick" }), &ctx)
            .await;
        assert_eq!(out["totalFound"], 1);
        assert_eq!(out["filters"]["timeRange"], "all");
        assert_eq!(out["results"]["insights"][0]["context"]["impact"], "high");

        let bad = registry
            .call("search_memory", json!({ "query": "tick", "categories": ["bogus"] }), &ctx)
            .await;
        assert_eq!(bad["success"], false);
    }

    #[tokio::test]
    async fn memory_stats_merges_unless_detailed() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let registry = ToolRegistry::with_builtins();
        registry.call("sync_project_knowledge", json!({}), &ctx).await;

        let flat = registry.call("memory_stats", json!({}), &ctx).await;
        assert!(flat["stats"].get("totalItems").is_some());
        assert!(flat["stats"].get("cachedItems").is_some());

        let detailed = registry
            .call("memory_stats", json!({ "includeDetails": true }), &ctx)
            .await;
        assert!(detailed["stats"]["memory"].get("totalItems").is_some());
        assert_eq!(detailed["stats"]["cache"]["cachedItems"], 4);
    }

    #[tokio::test]
    async fn index_then_query_classes() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let registry = ToolRegistry::with_builtins();

        let indexed = registry.call("index_project", json!({}), &ctx).await;
        assert_eq!(indexed["stats"]["processedFiles"], 1);

        let analysis = registry
            .call("analyze_class_with_memory", json!({ "className": "UHealthComponent" }), &ctx)
            .await;
        assert_eq!(analysis["classInfo"]["inheritance"], "UActorComponent");

        let hierarchy = registry
            .call("find_class_hierarchy", json!({ "className": "UHealthComponent" }), &ctx)
            .await;
        assert_eq!(hierarchy["hierarchy"]["chain"][0]["name"], "UHealthComponent");

        let refs = registry
            .call("find_references", json!({ "identifier": "Health" }), &ctx)
            .await;
        assert_eq!(refs["count"], 1);

        let escaped = registry
            .call("analyze_file", json!({ "file": "../secret.h" }), &ctx)
            .await;
        assert_eq!(escaped["success"], false);
    }

    #[tokio::test]
    async fn history_round_trip_and_impact_validation() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let registry = ToolRegistry::with_builtins();

        registry
            .call(
                "add_development_event",
                json!({ "type": "code_change", "description": "split inventory", "files": ["Inv.h"] }),
                &ctx,
            )
            .await;
        let rejected = registry
            .call(
                "add_development_event",
                json!({ "type": "code_change", "description": "x", "impact": "huge" }),
                &ctx,
            )
            .await;
        assert_eq!(rejected["success"], false);

        let history = registry
            .call("get_development_history", json!({ "type": "code_change" }), &ctx)
            .await;
        assert_eq!(history["count"], 1);
        assert_eq!(history["history"][0]["impact"], "medium");
    }
}
