//! Prompt templates that splice stored memory into a request.
//!
//! Two prompts are served:
//!
//! - `analyze_with_context` wraps a code fragment with the newest context
//!   windows matching an optional query.
//! - `suggest_solution` wraps a problem description with similar problems
//!   already tracked.

use serde::Serialize;
use serde_json::Value;

use crate::error::ProtocolError;
use crate::models::ProblemStatus;
use crate::traits::ToolContext;

/// An argument a prompt accepts.
#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// Entry in `prompts/list`.
#[derive(Debug, Clone, Serialize)]
pub struct PromptInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
}

/// A rendered prompt, ready to hand to a model.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedPrompt {
    pub description: String,
    pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: PromptContent,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

/// Context windows pulled into `analyze_with_context`.
const ANALYZE_CONTEXT_LIMIT: usize = 3;

pub fn list() -> Vec<PromptInfo> {
    vec![
        PromptInfo {
            name: "analyze_with_context",
            description: "Analyze code with historical project context",
            arguments: vec![
                PromptArgument {
                    name: "code_snippet",
                    description: "Code to analyze",
                    required: true,
                },
                PromptArgument {
                    name: "context_query",
                    description: "Query used to find relevant context",
                    required: false,
                },
            ],
        },
        PromptInfo {
            name: "suggest_solution",
            description: "Suggest a solution informed by similar past problems",
            arguments: vec![PromptArgument {
                name: "problem_description",
                description: "Description of the problem",
                required: true,
            }],
        },
    ]
}

/// Render `name` with `args`. Missing required arguments are rejected.
pub async fn get(name: &str, args: &Value, ctx: &ToolContext) -> Result<RenderedPrompt, ProtocolError> {
    let info = list()
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| ProtocolError::UnknownPrompt(name.to_string()))?;
    for arg in info.arguments.iter().filter(|a| a.required) {
        if args.get(arg.name).and_then(Value::as_str).is_none() {
            return Err(ProtocolError::InvalidParams(format!(
                "prompt '{}' requires argument '{}'",
                name, arg.name
            )));
        }
    }

    let store = ctx.store().await;
    let text = match name {
        "analyze_with_context" => {
            let context = match args.get("context_query").and_then(Value::as_str) {
                Some(query) => store.get_relevant_context(query, ANALYZE_CONTEXT_LIMIT),
                None => Vec::new(),
            };
            let context_lines = if context.is_empty() {
                "No relevant context found".to_string()
            } else {
                context
                    .iter()
                    .map(|c| format!("- {}", c.summary))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            format!(
                "Analyze the following code with the provided context:\n\n\
                 Code:\n{}\n\n\
                 Relevant Context:\n{}\n\n\
                 Please provide analysis considering the historical context and patterns from this project.",
                text_arg(args, "code_snippet"),
                context_lines
            )
        }
        _ => {
            let similar = store.get_similar_problems(text_arg(args, "problem_description"));
            let similar_lines = if similar.is_empty() {
                "No similar problems found".to_string()
            } else {
                similar
                    .iter()
                    .map(|s| {
                        let status = match s.problem.status {
                            ProblemStatus::Open => "open",
                            ProblemStatus::Solved => "solved",
                        };
                        format!("- {} ({})", s.problem.description, status)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            format!(
                "Suggest a solution for the following problem:\n\n\
                 Problem: {}\n\n\
                 Similar problems solved in the past:\n{}\n\n\
                 Based on the project's history and patterns, what would you recommend?",
                text_arg(args, "problem_description"),
                similar_lines
            )
        }
    };

    Ok(RenderedPrompt {
        description: format!("Generated prompt for {}", name),
        messages: vec![PromptMessage {
            role: "user",
            content: PromptContent { kind: "text", text },
        }],
    })
}

fn text_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::config::Config;
    use crate::knowledge::KnowledgeCache;
    use crate::models::ContextPayload;
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

    #[tokio::test]
    async fn analyze_without_query_has_placeholder() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let prompt = get("analyze_with_context", &json!({ "code_snippet": "int x;" }), &ctx)
            .await
            .unwrap();
        assert_eq!(prompt.description, "Generated prompt for analyze_with_context");
        let text = &prompt.messages[0].content.text;
        assert!(text.contains("Code:\nint x;"));
        assert!(text.contains("Relevant Context:\nNo relevant context found"));
    }

    #[tokio::test]
    async fn analyze_lists_matching_context() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        ctx.store()
            .await
            .save_context_window(ContextPayload::FileReference {
                path: "Source/Inventory.cpp".into(),
                line: Some(12),
            })
            .unwrap();
        let prompt = get(
            "analyze_with_context",
            &json!({ "code_snippet": "x", "context_query": "inventory" }),
            &ctx,
        )
        .await
        .unwrap();
        assert!(prompt.messages[0]
            .content
            .text
            .contains("Relevant Context:\n- File reference: Source/Inventory.cpp:12\n"));
    }

    #[tokio::test]
    async fn suggest_lists_similar_problems_with_status() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        ctx.store()
            .await
            .add_problem("save game fails to load", json!({}))
            .unwrap();
        let prompt = get(
            "suggest_solution",
            &json!({ "problem_description": "save game fails to load again" }),
            &ctx,
        )
        .await
        .unwrap();
        assert!(prompt.messages[0]
            .content
            .text
            .contains("- save game fails to load (open)"));
    }

    #[tokio::test]
    async fn missing_argument_and_unknown_prompt() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let err = get("suggest_solution", &json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidParams(_)));
        let err = get("nope", &json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownPrompt(_)));
    }
}
