//! Tool extension point for the query service.
//!
//! Every operation the service exposes through `tools/call` is a [`Tool`]
//! registered in a [`ToolRegistry`]. Built-in tools live in
//! [`crate::tools`]; embedders can register their own alongside them.
//!
//! ```text
//! tools/call {name, arguments}
//!     → ToolRegistry::find(name)          (miss → {success:false, error})
//!     → validate_params(schema, args)     (fail → {success:false, error}, no mutation)
//!     → log "tool_call" in current session
//!     → Tool::execute(params, &ToolContext)
//!     → {success:true, ...result}
//! ```
//!
//! # Usage
//!
//! ```rust
//! use project_memory::traits::ToolRegistry;
//!
//! let mut tools = ToolRegistry::with_builtins();
//! // tools.register(Box::new(MyTool::new()));
//! assert!(tools.find("search_memory").is_some());
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard, RwLock, RwLockReadGuard};

use crate::config::Config;
use crate::knowledge::KnowledgeCache;
use crate::models::MemoryStats;
use crate::store::MemoryStore;

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A named operation callers can discover with `tools/list` and invoke
/// with `tools/call`.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use project_memory::traits::{Tool, ToolContext};
///
/// pub struct OpenProblemsTool;
///
/// #[async_trait]
/// impl Tool for OpenProblemsTool {
///     fn name(&self) -> &str { "open_problems" }
///     fn description(&self) -> &str { "Count unsolved problems" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///
///     async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
///         let store = ctx.store().await;
///         let stats = store.get_memory_stats();
///         Ok(json!({ "open": stats.total_problems - stats.solved_problems }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name used in `tools/call`. Lowercase with underscores.
    fn name(&self) -> &str;

    /// One-line description for discovery.
    fn description(&self) -> &str;

    /// Whether the tool ships with the crate. Defaults to `false`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema for the arguments: `type: "object"`, `properties`, and
    /// optionally `required`. Property `default`s are injected before
    /// [`execute`](Tool::execute) runs.
    fn parameters_schema(&self) -> Value;

    /// Run the tool with validated arguments.
    ///
    /// Return a JSON object; the registry adds `success: true`. An `Err`
    /// becomes `{success: false, error}` for the caller.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Shared state handed to every tool invocation.
///
/// All store access goes through one async mutex. When both locks are
/// needed, take the store first, then the cache.
#[derive(Clone)]
pub struct ToolContext {
    config: Arc<Config>,
    store: Arc<Mutex<MemoryStore>>,
    cache: Arc<RwLock<KnowledgeCache>>,
}

impl ToolContext {
    pub fn new(
        config: Arc<Config>,
        store: Arc<Mutex<MemoryStore>>,
        cache: Arc<RwLock<KnowledgeCache>>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Lock the store for the duration of the returned guard.
    pub async fn store(&self) -> MutexGuard<'_, MemoryStore> {
        self.store.lock().await
    }

    /// Lock the store with a guard that can be moved onto a blocking thread.
    pub async fn store_owned(&self) -> OwnedMutexGuard<MemoryStore> {
        Arc::clone(&self.store).lock_owned().await
    }

    pub async fn cache(&self) -> RwLockReadGuard<'_, KnowledgeCache> {
        self.cache.read().await
    }

    /// Refresh the cache from an already-locked store.
    pub async fn sync_cache(&self, store: &MemoryStore) -> MemoryStats {
        self.cache.write().await.sync(store)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parameter validation
// ═══════════════════════════════════════════════════════════════════════

/// Serializable tool description for `tools/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub input_schema: Value,
}

/// Check `params` against `schema` and return them with defaults filled in.
///
/// Checks, in order: required keys present, declared `type` matches,
/// value is one of the declared `enum` entries. Absent optional keys with
/// a `default` get that default.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("arguments must be an object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<String> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    for req_field in &required {
        if params_obj.get(req_field).is_none_or(Value::is_null) {
            bail!("missing required parameter: {}", req_field);
        }
    }

    let mut result = params_obj.clone();

    for (prop_name, prop_schema) in &properties {
        match params_obj.get(prop_name) {
            Some(value) if !value.is_null() => {
                if let Some(expected_type) = prop_schema.get("type").and_then(|t| t.as_str()) {
                    let type_ok = match expected_type {
                        "string" => value.is_string(),
                        "integer" => value.is_i64() || value.is_u64(),
                        "number" => value.is_number(),
                        "boolean" => value.is_boolean(),
                        "array" => value.is_array(),
                        "object" => value.is_object(),
                        _ => true,
                    };
                    if !type_ok {
                        bail!(
                            "parameter '{}' must be of type '{}', got {}",
                            prop_name,
                            expected_type,
                            json_type_name(value)
                        );
                    }
                }

                if let Some(enum_values) = prop_schema.get("enum").and_then(|e| e.as_array()) {
                    if !enum_values.contains(value) {
                        let allowed: Vec<String> =
                            enum_values.iter().map(|v| v.to_string()).collect();
                        bail!(
                            "parameter '{}' must be one of [{}], got {}",
                            prop_name,
                            allowed.join(", "),
                            value
                        );
                    }
                }
            }
            _ => {
                if let Some(default) = prop_schema.get("default") {
                    result.insert(prop_name.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn failure(message: impl Into<String>) -> Value {
    json!({ "success": false, "error": message.into() })
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry for tools (built-in and custom).
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Create a registry pre-loaded with every built-in tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for tool in crate::tools::builtin_tools() {
            registry.register(tool);
        }
        registry
    }

    /// Register a tool. Names are not checked for duplicates;
    /// [`find`](Self::find) returns the first match.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                builtin: t.is_builtin(),
                input_schema: t.parameters_schema(),
            })
            .collect()
    }

    /// Look up, validate and run `name`. Never fails: every problem is
    /// reported as `{success: false, error}` in the returned value.
    pub async fn call(&self, name: &str, args: Value, ctx: &ToolContext) -> Value {
        let Some(tool) = self.find(name) else {
            return failure(format!("Unknown tool: {}", name));
        };
        let params = match validate_params(&tool.parameters_schema(), &args) {
            Ok(p) => p,
            Err(e) => return failure(e.to_string()),
        };

        {
            let mut store = ctx.store().await;
            if let Err(e) = store.log_action("tool_call", json!({ "name": name, "args": args })) {
                tracing::warn!(tool = name, error = %e, "failed to log tool call");
            }
        }

        match tool.execute(params, ctx).await {
            Ok(Value::Object(mut map)) => {
                map.insert("success".to_string(), Value::Bool(true));
                Value::Object(map)
            }
            Ok(other) => json!({ "success": true, "result": other }),
            Err(e) => {
                tracing::warn!(tool = name, error = %format!("{:#}", e), "tool failed");
                failure(format!("{:#}", e))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer", "default": 5 },
                "timeRange": { "type": "string", "enum": ["today", "week", "month", "all"], "default": "all" },
                "flag": { "type": "boolean" }
            },
            "required": ["query"]
        })
    }

    #[test]
    fn defaults_are_injected() {
        let out = validate_params(&schema(), &json!({ "query": "inv" })).unwrap();
        assert_eq!(out["limit"], 5);
        assert_eq!(out["timeRange"], "all");
        assert!(out.get("flag").is_none());
    }

    #[test]
    fn missing_required_is_rejected() {
        let err = validate_params(&schema(), &json!({ "limit": 3 })).unwrap_err();
        assert_eq!(err.to_string(), "missing required parameter: query");

        let err = validate_params(&schema(), &json!({ "query": null })).unwrap_err();
        assert_eq!(err.to_string(), "missing required parameter: query");
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = validate_params(&schema(), &json!({ "query": "x", "limit": "ten" })).unwrap_err();
        assert_eq!(
            err.to_string(),
            "parameter 'limit' must be of type 'integer', got string"
        );
        assert!(validate_params(&schema(), &json!({ "query": "x", "limit": 2.5 })).is_err());
    }

    #[test]
    fn enum_is_enforced() {
        let err =
            validate_params(&schema(), &json!({ "query": "x", "timeRange": "year" })).unwrap_err();
        assert!(err.to_string().contains("must be one of"));
    }

    #[test]
    fn null_arguments_mean_empty_object() {
        let empty = json!({ "type": "object", "properties": {} });
        assert_eq!(validate_params(&empty, &Value::Null).unwrap(), json!({}));
        assert!(validate_params(&empty, &json!([1])).is_err());
    }

    #[test]
    fn builtins_are_registered_once() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 21);
        let mut names: Vec<_> = registry.tools().iter().map(|t| t.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 21);
        assert!(registry.infos().iter().all(|i| i.builtin));
    }
}
