//! Tool trait and registry.
//!
//! Every typed client operation is exposed as a [`Tool`] with an OpenAI
//! function-calling parameter schema. The same registry backs the MCP
//! bridge, the HTTP wrapper, and the CLI, so a tool behaves identically
//! however it is invoked.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::client::{ArenaClient, SearchParams};
use crate::config::Config;
use crate::error::{user_message, ArenaError, ErrorContext};
use crate::models::SearchEntityType;
use crate::render;
use crate::resolver::resolve_channel;

/// Execution context handed to every tool call.
#[derive(Clone)]
pub struct ToolContext {
    pub config: Arc<Config>,
    pub client: Arc<ArenaClient>,
}

impl ToolContext {
    pub fn new(config: Arc<Config>, client: Arc<ArenaClient>) -> Self {
        Self { config, client }
    }
}

/// A callable tool backed by the Are.na client.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// OpenAI function-calling style JSON schema for the parameters.
    fn parameters_schema(&self) -> Value;

    /// Whether the tool mutates upstream state. Write tools fail hard on
    /// permission errors; there is no legacy fallback for them.
    fn is_write(&self) -> bool {
        false
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Registry of tools, searchable by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every built-in tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchTool));
        registry.register(Box::new(GetChannelTool));
        registry.register(Box::new(GetChannelContentsTool));
        registry.register(Box::new(GetBlockTool));
        registry.register(Box::new(GetBlockConnectionsTool));
        registry.register(Box::new(GetUserTool));
        registry.register(Box::new(GetUserContentsTool));
        registry.register(Box::new(ResolveChannelTool));
        registry.register(Box::new(CreateChannelTool));
        registry.register(Box::new(CreateBlockTool));
        registry.register(Box::new(ConnectBlockTool));
        registry.register(Box::new(DisconnectConnectionTool));
        registry.register(Box::new(MoveConnectionTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ── Parameter helpers ────────────────────────────────────────────────────

fn req_str(params: &Value, key: &str) -> Result<String> {
    match params.get(key).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => bail!("parameter \"{key}\" is required and must be a non-empty string"),
    }
}

fn opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn opt_u32(params: &Value, key: &str) -> Option<u32> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| n.min(u32::MAX as u64) as u32)
}

fn opt_i64(params: &Value, key: &str) -> Option<i64> {
    params.get(key).and_then(Value::as_i64)
}

/// Reads the `type` parameter as a single entity name or an array of them.
/// `"All"` and unrecognized names mean no filter, as does omission.
fn entity_filters(params: &Value) -> Vec<SearchEntityType> {
    let parse = |s: &str| match s {
        "Block" => Some(SearchEntityType::Block),
        "Channel" => Some(SearchEntityType::Channel),
        "User" => Some(SearchEntityType::User),
        "Group" => Some(SearchEntityType::Group),
        _ => None,
    };
    match params.get("type") {
        Some(Value::String(s)) => parse(s).into_iter().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(parse)
            .collect(),
        _ => Vec::new(),
    }
}

/// Converts a client error into a human-readable tool failure.
fn tool_err(err: ArenaError, operation: &str, target: Option<&str>) -> anyhow::Error {
    anyhow::anyhow!(user_message(&err, ErrorContext { operation, target }))
}

fn page_schema() -> Value {
    json!({
        "page": {"type": "integer", "minimum": 1, "description": "Page number (1-based)"},
        "per": {"type": "integer", "minimum": 1, "maximum": 100, "description": "Results per page"}
    })
}

/// Standard tool result: rendered markdown plus the structured entity.
fn result(text: String, data: impl serde::Serialize) -> Result<Value> {
    Ok(json!({"text": text, "data": serde_json::to_value(data)?}))
}

// ── Read tools ───────────────────────────────────────────────────────────

struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search Are.na for channels, blocks, users, or groups"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search terms"},
                "type": {
                    "anyOf": [
                        {"type": "string", "enum": ["All", "Block", "Channel", "User", "Group"]},
                        {"type": "array", "items": {"type": "string", "enum": ["Block", "Channel", "User", "Group"]}}
                    ],
                    "description": "Restrict results to one or more entity types"
                },
                "scope": {"type": "string", "enum": ["my"], "description": "Limit to your own content"},
                "page": {"type": "integer", "minimum": 1},
                "per": {"type": "integer", "minimum": 1, "maximum": 100}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = req_str(&params, "query")?;
        let found = ctx
            .client
            .search(&SearchParams {
                query: query.clone(),
                entities: entity_filters(&params),
                scope: opt_str(&params, "scope"),
                page: opt_u32(&params, "page"),
                per: opt_u32(&params, "per"),
            })
            .await
            .map_err(|e| tool_err(e, "search", Some(&query)))?;
        result(render::render_search(&found), &found)
    }
}

struct GetChannelTool;

#[async_trait]
impl Tool for GetChannelTool {
    fn name(&self) -> &str {
        "get_channel"
    }

    fn description(&self) -> &str {
        "Fetch a channel by id, slug, owner/slug, or Are.na URL"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "channel": {"type": "string", "description": "Channel id, slug, owner/slug, or URL"}
            },
            "required": ["channel"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let reference = req_str(&params, "channel")?;
        let resolved = resolve_channel(&ctx.client, &reference)
            .await
            .map_err(|e| tool_err(e, "get-channel", Some(&reference)))?;
        result(render::render_channel(&resolved.channel), &resolved)
    }
}

struct GetChannelContentsTool;

#[async_trait]
impl Tool for GetChannelContentsTool {
    fn name(&self) -> &str {
        "get_channel_contents"
    }

    fn description(&self) -> &str {
        "List the contents of a channel (blocks and nested channels), paginated"
    }

    fn parameters_schema(&self) -> Value {
        let mut props = json!({
            "channel": {"type": "string", "description": "Channel id, slug, owner/slug, or URL"}
        });
        merge(&mut props, page_schema());
        json!({"type": "object", "properties": props, "required": ["channel"]})
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let reference = req_str(&params, "channel")?;
        let resolved = resolve_channel(&ctx.client, &reference)
            .await
            .map_err(|e| tool_err(e, "get-channel-contents", Some(&reference)))?;
        let list = ctx
            .client
            .get_channel_contents(
                &resolved.canonical,
                opt_u32(&params, "page"),
                opt_u32(&params, "per"),
            )
            .await
            .map_err(|e| tool_err(e, "get-channel-contents", Some(&resolved.canonical)))?;
        result(render::render_list(&list), &list)
    }
}

struct GetBlockTool;

#[async_trait]
impl Tool for GetBlockTool {
    fn name(&self) -> &str {
        "get_block"
    }

    fn description(&self) -> &str {
        "Fetch a single block by id"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Block id"}
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let id = req_str(&params, "id")?;
        let block = ctx
            .client
            .get_block(&id)
            .await
            .map_err(|e| tool_err(e, "get-block", Some(&id)))?;
        result(render::render_block(&block), &block)
    }
}

struct GetBlockConnectionsTool;

#[async_trait]
impl Tool for GetBlockConnectionsTool {
    fn name(&self) -> &str {
        "get_block_connections"
    }

    fn description(&self) -> &str {
        "List the channels a block is connected into, paginated"
    }

    fn parameters_schema(&self) -> Value {
        let mut props = json!({
            "id": {"type": "string", "description": "Block id"}
        });
        merge(&mut props, page_schema());
        json!({"type": "object", "properties": props, "required": ["id"]})
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let id = req_str(&params, "id")?;
        let list = ctx
            .client
            .get_block_connections(&id, opt_u32(&params, "page"), opt_u32(&params, "per"))
            .await
            .map_err(|e| tool_err(e, "get-block-connections", Some(&id)))?;
        result(render::render_list(&list), &list)
    }
}

struct GetUserTool;

#[async_trait]
impl Tool for GetUserTool {
    fn name(&self) -> &str {
        "get_user"
    }

    fn description(&self) -> &str {
        "Fetch a user profile by id or slug"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user": {"type": "string", "description": "User id or slug"}
            },
            "required": ["user"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let user = req_str(&params, "user")?;
        let profile = ctx
            .client
            .get_user(&user)
            .await
            .map_err(|e| tool_err(e, "get-user", Some(&user)))?;
        result(render::render_user(&profile), &profile)
    }
}

struct GetUserContentsTool;

#[async_trait]
impl Tool for GetUserContentsTool {
    fn name(&self) -> &str {
        "get_user_contents"
    }

    fn description(&self) -> &str {
        "List a user's channels and blocks, paginated"
    }

    fn parameters_schema(&self) -> Value {
        let mut props = json!({
            "user": {"type": "string", "description": "User id or slug"}
        });
        merge(&mut props, page_schema());
        json!({"type": "object", "properties": props, "required": ["user"]})
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let user = req_str(&params, "user")?;
        let list = ctx
            .client
            .get_user_contents(&user, opt_u32(&params, "page"), opt_u32(&params, "per"))
            .await
            .map_err(|e| tool_err(e, "get-user-contents", Some(&user)))?;
        result(render::render_list(&list), &list)
    }
}

struct ResolveChannelTool;

#[async_trait]
impl Tool for ResolveChannelTool {
    fn name(&self) -> &str {
        "resolve_channel"
    }

    fn description(&self) -> &str {
        "Resolve a free-form channel reference (title, slug, owner/slug, URL) to its canonical slug"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": {"type": "string", "description": "Free-form channel reference"}
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let input = req_str(&params, "input")?;
        let resolved = resolve_channel(&ctx.client, &input)
            .await
            .map_err(|e| tool_err(e, "resolve-channel", Some(&input)))?;
        result(render::render_resolved(&resolved), &resolved)
    }
}

// ── Write tools ──────────────────────────────────────────────────────────

struct CreateChannelTool;

#[async_trait]
impl Tool for CreateChannelTool {
    fn name(&self) -> &str {
        "create_channel"
    }

    fn description(&self) -> &str {
        "Create a new channel. Requires premium access; fails hard on 403."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Channel title"},
                "description": {"type": "string"},
                "visibility": {"type": "string", "enum": ["public", "closed", "private"]}
            },
            "required": ["title"]
        })
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let title = req_str(&params, "title")?;
        let mut payload = json!({"title": title});
        if let Some(desc) = opt_str(&params, "description") {
            payload["description"] = json!(desc);
        }
        if let Some(vis) = opt_str(&params, "visibility") {
            payload["visibility"] = json!(vis);
        }
        let channel = ctx
            .client
            .create_channel(payload)
            .await
            .map_err(|e| tool_err(e, "create-channel", Some(&title)))?;
        result(render::render_channel(&channel), &channel)
    }
}

struct CreateBlockTool;

#[async_trait]
impl Tool for CreateBlockTool {
    fn name(&self) -> &str {
        "create_block"
    }

    fn description(&self) -> &str {
        "Create a block in a channel from text content or a source URL"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "channel": {"type": "string", "description": "Target channel (free-form reference)"},
                "content": {"type": "string", "description": "Markdown content for a text block"},
                "source_url": {"type": "string", "description": "URL to save as a link block"},
                "title": {"type": "string"},
                "description": {"type": "string"}
            },
            "required": ["channel"]
        })
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let reference = req_str(&params, "channel")?;
        let content = opt_str(&params, "content");
        let source_url = opt_str(&params, "source_url");
        if content.is_none() && source_url.is_none() {
            bail!("one of \"content\" or \"source_url\" is required");
        }
        let resolved = resolve_channel(&ctx.client, &reference)
            .await
            .map_err(|e| tool_err(e, "create-block", Some(&reference)))?;
        let mut payload = json!({});
        if let Some(content) = content {
            payload["content"] = json!(content);
        }
        if let Some(url) = source_url {
            payload["source_url"] = json!(url);
        }
        if let Some(title) = opt_str(&params, "title") {
            payload["title"] = json!(title);
        }
        if let Some(desc) = opt_str(&params, "description") {
            payload["description"] = json!(desc);
        }
        let block = ctx
            .client
            .create_block(&resolved.canonical, payload)
            .await
            .map_err(|e| tool_err(e, "create-block", Some(&resolved.canonical)))?;
        result(render::render_block(&block), &block)
    }
}

struct ConnectBlockTool;

#[async_trait]
impl Tool for ConnectBlockTool {
    fn name(&self) -> &str {
        "connect_block"
    }

    fn description(&self) -> &str {
        "Connect an existing block into a channel"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "channel": {"type": "string", "description": "Target channel (free-form reference)"},
                "block_id": {"type": "string", "description": "Id of the block to connect"}
            },
            "required": ["channel", "block_id"]
        })
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let reference = req_str(&params, "channel")?;
        let block_id = req_str(&params, "block_id")?;
        let resolved = resolve_channel(&ctx.client, &reference)
            .await
            .map_err(|e| tool_err(e, "connect-block", Some(&reference)))?;
        let connection = ctx
            .client
            .connect_block(
                &resolved.canonical,
                json!({"connectable_id": block_id, "connectable_type": "Block"}),
            )
            .await
            .map_err(|e| tool_err(e, "connect-block", Some(&block_id)))?;
        result(
            format!(
                "connected block {block_id} into `{}`\n",
                resolved.canonical
            ),
            &connection,
        )
    }
}

struct DisconnectConnectionTool;

#[async_trait]
impl Tool for DisconnectConnectionTool {
    fn name(&self) -> &str {
        "disconnect_connection"
    }

    fn description(&self) -> &str {
        "Remove a connection between a connectable and a channel"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "connection_id": {"type": "string", "description": "Id of the connection to remove"}
            },
            "required": ["connection_id"]
        })
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let connection_id = req_str(&params, "connection_id")?;
        ctx.client
            .disconnect_connection(&connection_id)
            .await
            .map_err(|e| tool_err(e, "disconnect-connection", Some(&connection_id)))?;
        Ok(json!({"text": format!("disconnected connection {connection_id}\n")}))
    }
}

struct MoveConnectionTool;

#[async_trait]
impl Tool for MoveConnectionTool {
    fn name(&self) -> &str {
        "move_connection"
    }

    fn description(&self) -> &str {
        "Reposition a connection within its channel"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "connection_id": {"type": "string", "description": "Id of the connection to move"},
                "position": {"type": "integer", "description": "New position (0-based)"},
                "pinned": {"type": "boolean", "description": "Pin the connection"}
            },
            "required": ["connection_id"]
        })
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let connection_id = req_str(&params, "connection_id")?;
        let mut payload = json!({});
        if let Some(position) = opt_i64(&params, "position") {
            payload["position"] = json!(position);
        }
        if let Some(pinned) = params.get("pinned").and_then(Value::as_bool) {
            payload["pinned"] = json!(pinned);
        }
        let connection = ctx
            .client
            .move_connection(&connection_id, payload)
            .await
            .map_err(|e| tool_err(e, "move-connection", Some(&connection_id)))?;
        result(
            format!("moved connection {connection_id}\n"),
            &connection,
        )
    }
}

/// Merges `extra`'s keys into the object `props`.
fn merge(props: &mut Value, extra: Value) {
    if let (Some(target), Value::Object(source)) = (props.as_object_mut(), extra) {
        for (k, v) in source {
            target.insert(k, v);
        }
    }
}
