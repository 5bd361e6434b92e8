//! MCP (Model Context Protocol) server implementation
//!
//! JSON-RPC over stdio for AI tool integration.

pub mod protocol;
pub mod tools;

pub use protocol::{
    methods, InitializeResult, McpHandler, McpRequest, McpResponse, McpServer, ToolCallResult,
    ToolContent, ToolDefinition, PROTOCOL_VERSION,
};
pub use tools::{
    get_fallback_definitions, get_tool_definitions, CatalogSource, ToolCatalog, CATALOG_VERSION,
    FALLBACK_TOOLS, TOOL_DEFINITIONS,
};
