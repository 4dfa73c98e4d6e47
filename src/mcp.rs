//! MCP JSON-RPC protocol bridge.
//!
//! Adapts the [`ToolRegistry`] into a proper MCP endpoint that Cursor,
//! Claude, and other MCP clients can speak to over stdio or streamable
//! HTTP. Tools are exposed via `list_tools` / `call_tool`; a small set of
//! workflow prompts is exposed via `list_prompts` / `get_prompt`.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};

use crate::tools::{Tool as ArenaTool, ToolContext, ToolRegistry};

/// Bridges the tool registry to the MCP JSON-RPC protocol.
///
/// Each MCP session receives a clone of this struct (everything is behind
/// `Arc`), so all sessions share the same client and its limiter.
#[derive(Clone)]
pub struct McpBridge {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
}

/// A canned workflow prompt.
struct PromptDef {
    name: &'static str,
    description: &'static str,
    argument: &'static str,
    argument_description: &'static str,
    template: &'static str,
}

const PROMPTS: &[PromptDef] = &[
    PromptDef {
        name: "explore-channel",
        description: "Walk through a channel's contents and summarize what it collects",
        argument: "channel",
        argument_description: "Channel reference (slug, owner/slug, URL, or title)",
        template: "Use the get_channel tool to fetch the channel \"{arg}\", then \
                   get_channel_contents to page through its contents. Summarize the themes, \
                   list notable blocks with their source links, and mention any nested channels.",
    },
    PromptDef {
        name: "research-topic",
        description: "Search Are.na for a topic and gather the most relevant channels and blocks",
        argument: "topic",
        argument_description: "Topic or keywords to research",
        template: "Use the search tool to find channels and blocks about \"{arg}\". Fetch the \
                   two or three most promising channels with get_channel_contents and compile \
                   an annotated reading list with links.",
    },
];

impl McpBridge {
    pub fn new(ctx: ToolContext, tools: Arc<ToolRegistry>) -> Self {
        Self { ctx, tools }
    }

    /// Convert one of our tools into an rmcp `Tool` descriptor.
    fn to_mcp_tool(tool: &dyn ArenaTool) -> Tool {
        let schema_value = tool.parameters_schema();
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> = match schema_value {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(!tool.is_write())),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    fn to_mcp_prompt(def: &PromptDef) -> Prompt {
        Prompt {
            name: def.name.to_string(),
            title: None,
            description: Some(def.description.to_string()),
            arguments: Some(vec![PromptArgument {
                name: def.argument.to_string(),
                title: None,
                description: Some(def.argument_description.to_string()),
                required: Some(true),
            }]),
            icons: None,
            meta: None,
        }
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .build(),
            server_info: Implementation {
                name: "arena-mcp".to_string(),
                title: Some("Are.na".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Are.na bridge — browse and edit the Are.na content graph. Use search to find \
                 channels and blocks, get_channel / get_channel_contents to read a channel \
                 (free-form references like URLs and owner/slug pairs are resolved for you), \
                 get_block for a single block, and the create/connect tools to add content. \
                 Write tools need premium access and fail hard without it; search degrades to \
                 the legacy endpoint automatically."
                    .to_string(),
            ),
        }
    }

    // ── Tools ────────────────────────────────────────────────────────────

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(&request.name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            )
        })?;

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        match tool.execute(params, &self.ctx).await {
            Ok(result) => {
                // Prefer the rendered markdown; fall back to the raw JSON.
                let text = result
                    .get("text")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        serde_json::to_string_pretty(&result).unwrap_or_default()
                    });
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    // ── Prompts ──────────────────────────────────────────────────────────

    fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListPromptsResult, McpError>> + Send + '_ {
        let prompts: Vec<Prompt> = PROMPTS.iter().map(Self::to_mcp_prompt).collect();
        std::future::ready(Ok(ListPromptsResult::with_all_items(prompts)))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let def = PROMPTS
            .iter()
            .find(|p| p.name == request.name)
            .ok_or_else(|| {
                McpError::new(
                    ErrorCode::METHOD_NOT_FOUND,
                    format!("no prompt registered with name: {}", request.name),
                    None,
                )
            })?;

        let arg = request
            .arguments
            .as_ref()
            .and_then(|args| args.get(def.argument))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                McpError::new(
                    ErrorCode::INVALID_PARAMS,
                    format!("prompt '{}' requires argument '{}'", def.name, def.argument),
                    None,
                )
            })?;

        let text = def.template.replace("{arg}", arg);
        Ok(GetPromptResult {
            description: Some(def.description.to_string()),
            messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
        })
    }
}
