//! MCP transport over streamable HTTP.
//!
//! JSON-RPC requests are POSTed to `{base}/mcp/`. The first discovery or
//! invocation call performs the `initialize` / `notifications/initialized`
//! handshake; every later call waits on that same handshake. The protocol
//! revisions differ only in the headers described by [`McpRevision`].

use std::{marker::PhantomData, sync::Arc};

use {
    async_trait::async_trait,
    reqwest::{
        Client,
        header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
    },
    serde::{Serialize, de::DeserializeOwned},
    serde_json::{Map, Value},
    tokio::sync::OnceCell,
    tracing::{debug, info},
};

use crate::{
    convert::{manifest_from_tools, merge_text_content},
    error::{Context, Error, Result},
    headers,
    manifest::Manifest,
    traits::Transport,
    types::{
        ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, JsonRpcError,
        JsonRpcNotification, JsonRpcRequest, ToolsCallParams, ToolsCallResult, ToolsListResult,
    },
};

const MCP_PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
const STREAMABLE_ACCEPT_HEADER: &str = "application/json, text/event-stream";

/// Whether a revision tracks the server-issued session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionIdPolicy {
    /// Never read or sent.
    Ignored,
    /// Echoed when the server hands one out.
    Optional,
    /// Must be present on the `initialize` response, echoed afterwards.
    Required,
}

/// Wire details of one MCP protocol revision.
pub trait McpRevision: Send + Sync + 'static {
    const PROTOCOL_VERSION: &'static str;
    const SESSION_ID: SessionIdPolicy = SessionIdPolicy::Ignored;
    /// Send `MCP-Protocol-Version` on every post-handshake request.
    const SENDS_VERSION_HEADER: bool = false;
}

/// Revision 2024-11-05: no session, no version header.
#[derive(Debug, Clone, Copy)]
pub struct V20241105;

impl McpRevision for V20241105 {
    const PROTOCOL_VERSION: &'static str = "2024-11-05";
}

/// Revision 2025-03-26: session id required.
#[derive(Debug, Clone, Copy)]
pub struct V20250326;

impl McpRevision for V20250326 {
    const PROTOCOL_VERSION: &'static str = "2025-03-26";
    const SESSION_ID: SessionIdPolicy = SessionIdPolicy::Required;
}

/// Revision 2025-06-18: version header, session id when offered.
#[derive(Debug, Clone, Copy)]
pub struct V20250618;

impl McpRevision for V20250618 {
    const PROTOCOL_VERSION: &'static str = "2025-06-18";
    const SENDS_VERSION_HEADER: bool = true;
    const SESSION_ID: SessionIdPolicy = SessionIdPolicy::Optional;
}

/// Negotiated state of a ready transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpSession {
    pub server_version: String,
    pub session_id: Option<String>,
}

/// JSON-RPC over HTTP transport for one MCP revision.
pub struct McpTransport<R: McpRevision> {
    client: Client,
    base_url: String,
    mcp_base_url: String,
    /// Written once by the first caller; a failed handshake stays failed.
    session: OnceCell<std::result::Result<McpSession, Arc<Error>>>,
    _revision: PhantomData<fn() -> R>,
}

impl<R: McpRevision> McpTransport<R> {
    pub fn new(base_url: &str, client: Client) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            client,
            mcp_base_url: format!("{base_url}/mcp/"),
            base_url,
            session: OnceCell::new(),
            _revision: PhantomData,
        }
    }

    pub fn protocol_version(&self) -> &'static str {
        R::PROTOCOL_VERSION
    }

    /// Session state once the handshake has completed successfully.
    pub fn session(&self) -> Option<&McpSession> {
        self.session.get().and_then(|s| s.as_ref().ok())
    }

    /// Run the handshake once; concurrent and later callers share its outcome.
    pub async fn ensure_initialized(&self) -> Result<&McpSession> {
        let outcome = self
            .session
            .get_or_init(|| async { self.initialize().await.map_err(Arc::new) })
            .await;
        outcome.as_ref().map_err(|e| Error::Handshake(Arc::clone(e)))
    }

    async fn initialize(&self) -> Result<McpSession> {
        let params = InitializeParams {
            protocol_version: R::PROTOCOL_VERSION.into(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: env!("CARGO_PKG_NAME").into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };

        let request = JsonRpcRequest::new("initialize", Some(params));
        let http_resp = self
            .post(&self.mcp_base_url, &request, HeaderMap::new(), None)
            .await?;
        let offered_session_id = Self::offered_session_id(&http_resp);
        let result: InitializeResult = Self::read_result(http_resp, "initialize").await?;
        let session_id = Self::negotiate_session_id(offered_session_id)?;

        if result.protocol_version != R::PROTOCOL_VERSION {
            return Err(Error::Protocol(format!(
                "MCP version mismatch: client requested {}, server responded {}",
                R::PROTOCOL_VERSION,
                result.protocol_version
            )));
        }
        if result.capabilities.tools.is_none() {
            return Err(Error::Protocol(
                "Server does not support the 'tools' capability".into(),
            ));
        }

        let session = McpSession {
            server_version: result
                .server_info
                .version
                .clone()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "unknown".into()),
            session_id,
        };

        let notification = JsonRpcNotification::new("notifications/initialized", None::<Value>);
        self.post(
            &self.mcp_base_url,
            &notification,
            HeaderMap::new(),
            Some(&session),
        )
        .await?;

        info!(
            url = %self.base_url,
            protocol = %R::PROTOCOL_VERSION,
            server = %result.server_info.name,
            server_version = %session.server_version,
            session = session.session_id.is_some(),
            "MCP session initialized"
        );
        Ok(session)
    }

    fn offered_session_id(response: &reqwest::Response) -> Option<String> {
        response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    }

    /// Apply the revision's session policy to the id offered on `initialize`.
    fn negotiate_session_id(found: Option<String>) -> Result<Option<String>> {
        match (R::SESSION_ID, found) {
            (SessionIdPolicy::Ignored, _) => Ok(None),
            (SessionIdPolicy::Required, None) => Err(Error::Protocol(
                "Server did not return a Mcp-Session-Id during initialization".into(),
            )),
            (_, found) => Ok(found),
        }
    }

    /// POST a JSON-RPC message, attaching the session headers of `session`.
    ///
    /// Fails with [`Error::Http`] on non-success status.
    async fn post(
        &self,
        url: &str,
        body: &(impl Serialize + Sync),
        mut headers: HeaderMap,
        session: Option<&McpSession>,
    ) -> Result<reqwest::Response> {
        if let Some(session) = session {
            if R::SENDS_VERSION_HEADER {
                headers.insert(
                    HeaderName::from_static(MCP_PROTOCOL_VERSION_HEADER),
                    HeaderValue::from_static(R::PROTOCOL_VERSION),
                );
            }
            if let Some(id) = &session.session_id {
                headers::insert(&mut headers, MCP_SESSION_ID_HEADER, id, false)?;
            }
        }

        let http_resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, STREAMABLE_ACCEPT_HEADER)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body = http_resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(http_resp)
    }

    /// Send a request and decode its `result`.
    async fn request<P, T>(
        &self,
        url: &str,
        method: &str,
        params: Option<P>,
        headers: HeaderMap,
        session: &McpSession,
    ) -> Result<T>
    where
        P: Serialize + Send + Sync,
        T: DeserializeOwned,
    {
        let request = JsonRpcRequest::new(method, params);
        debug!(method = %method, id = %request.id, url = %url, "MCP client -> server");
        let http_resp = self.post(url, &request, headers, Some(session)).await?;
        Self::read_result(http_resp, method).await
    }

    async fn read_result<T: DeserializeOwned>(
        http_resp: reqwest::Response,
        method: &str,
    ) -> Result<T> {
        let envelope = Self::read_envelope(http_resp, method).await?;

        if let Some(err) = envelope.get("error") {
            return Err(match serde_json::from_value::<JsonRpcError>(err.clone()) {
                Ok(err) => Error::Rpc {
                    code: err.code,
                    message: err.message,
                },
                Err(_) => Error::MalformedRpcError(envelope.to_string()),
            });
        }

        let result = envelope
            .get("result")
            .cloned()
            .with_context(|| format!("MCP response for '{method}' has no result"))?;
        serde_json::from_value(result)
            .map_err(|e| Error::Protocol(format!("unexpected '{method}' result: {e}")))
    }

    async fn read_envelope(http_resp: reqwest::Response, method: &str) -> Result<Value> {
        let is_event_stream = http_resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|base| base.trim() == "text/event-stream");
        let body = http_resp
            .text()
            .await
            .with_context(|| format!("failed to read response body for '{method}'"))?;

        if is_event_stream {
            return parse_event_stream(&body).with_context(|| {
                format!("failed to parse JSON-RPC response from event stream for '{method}'")
            });
        }
        serde_json::from_str(&body).map_err(|e| {
            Error::Protocol(format!("malformed JSON-RPC response for '{method}': {e}"))
        })
    }

    fn url_for(&self, toolset_name: Option<&str>) -> String {
        match toolset_name {
            Some(name) if !name.is_empty() => format!("{}{name}", self.mcp_base_url),
            _ => self.mcp_base_url.clone(),
        }
    }
}

/// First `data:` event of an SSE body that is a JSON-RPC response.
fn parse_event_stream(body: &str) -> Option<Value> {
    let parse = |data: &str| {
        serde_json::from_str::<Value>(data)
            .ok()
            .filter(|v| v.get("result").is_some() || v.get("error").is_some())
    };
    let mut data = String::new();

    for line in body.lines() {
        let trimmed = line.trim_end();
        if let Some(rest) = trimmed.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
            continue;
        }
        if trimmed.is_empty() && !data.is_empty() {
            if let Some(envelope) = parse(&data) {
                return Some(envelope);
            }
            data.clear();
        }
    }

    (!data.is_empty()).then(|| parse(&data)).flatten()
}

#[async_trait]
impl<R: McpRevision> Transport for McpTransport<R> {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn tool_get(&self, tool_name: &str, headers: HeaderMap) -> Result<Manifest> {
        let mut manifest = self.tools_list(None, headers).await?;
        let tool = manifest
            .tools
            .remove(tool_name)
            .ok_or_else(|| Error::ToolNotFound {
                name: tool_name.to_string(),
            })?;
        manifest.tools = [(tool_name.to_string(), tool)].into();
        Ok(manifest)
    }

    async fn tools_list(
        &self,
        toolset_name: Option<&str>,
        headers: HeaderMap,
    ) -> Result<Manifest> {
        let session = self.ensure_initialized().await?;
        let url = self.url_for(toolset_name);
        let result: ToolsListResult = self
            .request(&url, "tools/list", None::<Value>, headers, session)
            .await
            .map_err(|e| match e {
                Error::Protocol(msg) => Error::ManifestStructure(msg),
                other => other,
            })?;

        debug!(url = %url, count = result.tools.len(), "fetched MCP tools");
        let manifest = manifest_from_tools(&session.server_version, &result.tools);
        manifest.validate()?;
        Ok(manifest)
    }

    async fn tool_invoke(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        headers: HeaderMap,
    ) -> Result<String> {
        let session = self.ensure_initialized().await?;
        let params = ToolsCallParams {
            name: tool_name.to_string(),
            arguments: Value::Object(arguments),
        };
        let result: ToolsCallResult = self
            .request(
                &self.mcp_base_url,
                "tools/call",
                Some(params),
                headers,
                session,
            )
            .await?;
        if result.is_error {
            debug!(tool = %tool_name, "MCP tool reported an error result");
        }
        Ok(merge_text_content(&result.content))
    }
}
