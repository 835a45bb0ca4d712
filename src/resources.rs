//! Read-only `memory://` resources.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ProtocolError;
use crate::knowledge;
use crate::models::ProblemStatus;
use crate::traits::ToolContext;

/// Most relevant insights returned by `memory://insights/recent`.
const RECENT_INSIGHT_LIMIT: usize = 20;

/// Entry in `resources/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

const RESOURCES: &[(&str, &str, &str)] = &[
    (
        "memory://project",
        "Project Memory",
        "Complete project memory and context",
    ),
    (
        "memory://sessions",
        "Session History",
        "Development sessions and their outcomes",
    ),
    (
        "memory://knowledge-graph",
        "Project Knowledge Graph",
        "Classes, insights and patterns as graph nodes",
    ),
    (
        "memory://architecture",
        "Architecture Overview",
        "Known classes and the core systems map",
    ),
    (
        "memory://insights/recent",
        "Recent Insights",
        "Most relevant development insights",
    ),
    (
        "memory://problems",
        "Problem Tracking",
        "Open and resolved problems",
    ),
    (
        "memory://patterns",
        "Code Patterns",
        "Recorded code patterns and conventions",
    ),
];

pub fn list() -> Vec<ResourceInfo> {
    RESOURCES
        .iter()
        .map(|&(uri, name, description)| ResourceInfo {
            uri,
            name,
            description,
            mime_type: "application/json",
        })
        .collect()
}

/// Current content of the resource at `uri`.
pub async fn read(uri: &str, ctx: &ToolContext) -> Result<Value, ProtocolError> {
    let store = ctx.store().await;
    let cache = ctx.cache().await;
    let doc = store.document();

    let value = match uri {
        "memory://project" => to_json(cache.document(&store))?,
        "memory://sessions" => to_json(&doc.sessions)?,
        "memory://knowledge-graph" => match cache.graph() {
            Some(graph) => to_json(graph)?,
            None => json!({}),
        },
        "memory://architecture" => to_json(knowledge::architecture_overview(&store, &cache))?,
        "memory://insights/recent" => {
            let mut insights = store.get_insights(None, 0.3);
            insights.truncate(RECENT_INSIGHT_LIMIT);
            to_json(insights)?
        }
        "memory://problems" => {
            let (resolved, open): (Vec<_>, Vec<_>) = doc
                .problems
                .iter()
                .partition(|p| p.status == ProblemStatus::Solved);
            json!({
                "openProblems": open,
                "resolvedProblems": resolved,
                "totalTracked": doc.problems.len(),
                "lastUpdated": doc.last_updated,
            })
        }
        "memory://patterns" => to_json(&doc.patterns)?,
        other => return Err(ProtocolError::UnknownResource(other.to_string())),
    };
    Ok(value)
}

fn to_json(value: impl Serialize) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(|e| ProtocolError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::knowledge::KnowledgeCache;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::{Mutex, RwLock};

    fn context(tmp: &TempDir) -> ToolContext {
        let mut config = Config::minimal();
        config.store.dir = tmp.path().join("data");
        let store = MemoryStore::open(&config).unwrap();
        ToolContext::new(
            Arc::new(config),
            Arc::new(Mutex::new(store)),
            Arc::new(RwLock::new(KnowledgeCache::new())),
        )
    }

    #[test]
    fn lists_seven_json_resources() {
        let resources = list();
        assert_eq!(resources.len(), 7);
        assert!(resources.iter().all(|r| r.mime_type == "application/json"));
        assert_eq!(resources[0].name, "Project Memory");
    }

    #[tokio::test]
    async fn problems_are_split_by_status() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        {
            let mut store = ctx.store().await;
            let id = store.add_problem("crash on load", json!({})).unwrap();
            store.add_problem("leak in pool", json!({})).unwrap();
            store.add_solution(&id, "reset pointer", true).unwrap();
        }
        let value = read("memory://problems", &ctx).await.unwrap();
        assert_eq!(value["totalTracked"], 2);
        assert_eq!(value["openProblems"].as_array().unwrap().len(), 1);
        assert_eq!(value["resolvedProblems"][0]["description"], "crash on load");
    }

    #[tokio::test]
    async fn unsynced_graph_is_empty_object() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        assert_eq!(read("memory://knowledge-graph", &ctx).await.unwrap(), json!({}));

        let project = read("memory://project", &ctx).await.unwrap();
        assert!(project.get("sessions").is_some());
    }

    #[tokio::test]
    async fn unknown_uri_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let err = read("memory://nope", &ctx).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownResource(_)));
    }
}
