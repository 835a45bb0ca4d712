//! Request/response envelope for the knowledge query service.
//!
//! Every request is `{ "method": string, "params": object }`. A successful
//! call returns the method-specific result; failures are reported as
//! `{ "error": string, "code": string }` by the transport.
//!
//! | Method | Result |
//! |--------|--------|
//! | `initialize` | protocol version, capabilities, server info |
//! | `tools/list` | `{ tools: [...] }` |
//! | `tools/call` | `{ content: [{ type: "text", text }] }` |
//! | `resources/list` | `{ resources: [...] }` |
//! | `resources/read` | `{ contents: [{ uri, mimeType, text }] }` |
//! | `prompts/list` | `{ prompts: [...] }` |
//! | `prompts/get` | `{ description, messages }` |

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ProtocolError;
use crate::traits::{ToolContext, ToolRegistry};
use crate::{prompts, resources};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Decode a raw request body.
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(body).map_err(|e| ProtocolError::Parse(e.to_string()))
    }
}

/// The tool registry plus the shared state every method reads.
#[derive(Clone)]
pub struct QueryService {
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
}

impl QueryService {
    pub fn new(registry: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self { registry, ctx }
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Parse and dispatch a raw body.
    pub async fn handle(&self, body: &[u8]) -> Result<Value, ProtocolError> {
        let request = Request::parse(body)?;
        self.dispatch(request).await
    }

    pub async fn dispatch(&self, request: Request) -> Result<Value, ProtocolError> {
        tracing::debug!(method = %request.method, "dispatching request");
        let params = &request.params;
        match request.method.as_str() {
            "initialize" => Ok(initialize()),
            "tools/list" => Ok(json!({ "tools": self.registry.infos() })),
            "tools/call" => {
                let name = required_str(params, "name")?;
                let args = params.get("arguments").cloned().unwrap_or(Value::Null);
                let result = self.registry.call(name, args, &self.ctx).await;
                Ok(text_content(&result)?)
            }
            "resources/list" => Ok(json!({ "resources": resources::list() })),
            "resources/read" => {
                let uri = required_str(params, "uri")?;
                let value = resources::read(uri, &self.ctx).await?;
                Ok(json!({
                    "contents": [{
                        "uri": uri,
                        "mimeType": "application/json",
                        "text": pretty(&value)?,
                    }]
                }))
            }
            "prompts/list" => Ok(json!({ "prompts": prompts::list() })),
            "prompts/get" => {
                let name = required_str(params, "name")?;
                let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                let prompt = prompts::get(name, &args, &self.ctx).await?;
                serde_json::to_value(prompt).map_err(|e| ProtocolError::Internal(e.to_string()))
            }
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }
}

fn initialize() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": true },
            "resources": { "subscribe": true, "listChanged": true },
            "prompts": { "listChanged": true },
        },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ProtocolError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::InvalidParams(format!("missing required param '{}'", key)))
}

fn pretty(value: &Value) -> Result<String, ProtocolError> {
    serde_json::to_string_pretty(value).map_err(|e| ProtocolError::Internal(e.to_string()))
}

fn text_content(value: &Value) -> Result<Value, ProtocolError> {
    Ok(json!({ "content": [{ "type": "text", "text": pretty(value)? }] }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::knowledge::KnowledgeCache;
    use crate::store::MemoryStore;
    use tempfile::TempDir;
    use tokio::sync::{Mutex, RwLock};

    fn service(tmp: &TempDir) -> QueryService {
        let mut config = Config::minimal();
        config.store.dir = tmp.path().join("data");
        let store = MemoryStore::open(&config).unwrap();
        let ctx = ToolContext::new(
            Arc::new(config),
            Arc::new(Mutex::new(store)),
            Arc::new(RwLock::new(KnowledgeCache::new())),
        );
        QueryService::new(Arc::new(ToolRegistry::with_builtins()), ctx)
    }

    #[tokio::test]
    async fn initialize_reports_capabilities() {
        let tmp = TempDir::new().unwrap();
        let out = service(&tmp)
            .handle(br#"{"method":"initialize"}"#)
            .await
            .unwrap();
        assert_eq!(out["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(out["capabilities"]["resources"]["subscribe"], true);
        assert_eq!(out["serverInfo"]["name"], "project-memory");
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let err = service(&tmp).handle(b"{not json").await.unwrap_err();
        assert_eq!(err.code(), "parse_error");
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = service(&tmp)
            .handle(br#"{"method":"tools/destroy","params":{}}"#)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown method: tools/destroy");
    }

    #[tokio::test]
    async fn tool_results_are_wrapped_as_text() {
        let tmp = TempDir::new().unwrap();
        let out = service(&tmp)
            .handle(br#"{"method":"tools/call","params":{"name":"get_development_history"}}"#)
            .await
            .unwrap();
        assert_eq!(out["content"][0]["type"], "text");
        let inner: Value =
            serde_json::from_str(out["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(inner["success"], true);
        assert_eq!(inner["count"], 0);
    }

    #[tokio::test]
    async fn tools_call_requires_name() {
        let tmp = TempDir::new().unwrap();
        let err = service(&tmp)
            .handle(br#"{"method":"tools/call","params":{}}"#)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[tokio::test]
    async fn resources_read_wraps_json_text() {
        let tmp = TempDir::new().unwrap();
        let out = service(&tmp)
            .handle(br#"{"method":"resources/read","params":{"uri":"memory://patterns"}}"#)
            .await
            .unwrap();
        assert_eq!(out["contents"][0]["mimeType"], "application/json");
        assert_eq!(out["contents"][0]["text"], "[]");
    }
}
