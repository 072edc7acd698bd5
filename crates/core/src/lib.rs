//! Client for tools served by a toolbox server.
//!
//! [`ToolboxClient`] fetches tool manifests and turns them into [`Tool`]s,
//! immutable callables with validated arguments, pre-bound parameter values
//! and auth token providers. Tools are invoked over one of two wire
//! protocols:
//! - MCP, JSON-RPC 2.0 over HTTP, in three revisions (`mcp_transport`)
//! - the legacy REST endpoints (`rest_transport`)

pub mod auth;
pub mod client;
pub mod convert;
pub mod error;
mod headers;
pub mod manifest;
pub mod mcp_transport;
pub mod protocol;
pub mod rest_transport;
pub mod schema;
pub mod tool;
pub mod traits;
pub mod types;
pub mod value;

pub use {
    auth::{AuthTokenGetter, AuthTokenGetters},
    client::{ToolboxClient, ToolboxClientBuilder},
    error::{Error, Result},
    manifest::{Manifest, ParameterSchema, ParameterType, ToolSchema},
    protocol::Protocol,
    schema::{ArgumentValidator, ValidationErrors},
    tool::{Built, Tool},
    traits::Transport,
    value::{BoundParams, BoundValue, ClientHeaders, HeaderSource},
};
