//! Config schema for the toolbox client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default request timeout applied to every HTTP call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Client configuration as read from `toolbox.{toml,yaml,json}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolboxConfig {
    /// Base URL of the toolbox server, e.g. `http://127.0.0.1:5000`.
    pub url: String,
    /// Wire protocol name: `toolbox`, `mcp`, or `mcp-<revision>`.
    /// `None` selects the latest MCP revision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub timeout_secs: u64,
    /// Static headers attached to every request.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub client_headers: BTreeMap<String, String>,
}

impl Default for ToolboxConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000".into(),
            protocol: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            client_headers: BTreeMap::new(),
        }
    }
}
