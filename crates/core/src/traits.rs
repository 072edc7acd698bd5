//! Trait abstraction over the wire protocols.
//!
//! `RestTransport` speaks the legacy REST endpoints; `McpTransport<R>`
//! speaks JSON-RPC for one MCP revision. `Tool` and `ToolboxClient` only see
//! this trait.

use {
    async_trait::async_trait,
    reqwest::header::HeaderMap,
    serde_json::{Map, Value},
};

use crate::{error::Result, manifest::Manifest};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Base URL of the server, as given by the caller.
    fn base_url(&self) -> &str;

    /// Fetch a manifest holding the single tool `tool_name`.
    async fn tool_get(&self, tool_name: &str, headers: HeaderMap) -> Result<Manifest>;

    /// Fetch the manifest of a named toolset, or of every tool when `None`.
    async fn tools_list(&self, toolset_name: Option<&str>, headers: HeaderMap)
    -> Result<Manifest>;

    /// Invoke `tool_name` with already validated arguments.
    async fn tool_invoke(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        headers: HeaderMap,
    ) -> Result<String>;
}
