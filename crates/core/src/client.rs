//! Toolbox client: loads tools and toolsets from a server and checks that
//! every supplied binding was consumed.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use {
    reqwest::{Client, header::HeaderMap},
    toolbox_config::ToolboxConfig,
    tracing::{debug, info},
    url::Url,
};

use crate::{
    auth::AuthTokenGetters,
    error::{Error, Result},
    headers,
    mcp_transport::{McpTransport, V20241105, V20250326, V20250618},
    protocol::Protocol,
    rest_transport::RestTransport,
    tool::{Built, Tool},
    traits::Transport,
    value::{BoundParams, ClientHeaders, HeaderSource},
};

/// Entry point for loading tools from one toolbox server.
#[derive(Clone)]
pub struct ToolboxClient {
    transport: Arc<dyn Transport>,
    client_headers: Arc<ClientHeaders>,
}

impl ToolboxClient {
    /// A client speaking the latest MCP revision, with default settings.
    pub fn new(url: &str) -> Result<Self> {
        Self::builder(url).build()
    }

    pub fn builder(url: &str) -> ToolboxClientBuilder {
        ToolboxClientBuilder {
            url: url.to_string(),
            protocol: Protocol::default(),
            client_headers: ClientHeaders::new(),
            http_client: None,
            timeout: None,
        }
    }

    pub fn from_config(config: &ToolboxConfig) -> Result<Self> {
        let protocol = config
            .protocol
            .as_deref()
            .map(str::parse::<Protocol>)
            .transpose()?
            .unwrap_or_default();
        Self::builder(&config.url)
            .protocol(protocol)
            .timeout(Duration::from_secs(config.timeout_secs))
            .client_headers(
                config
                    .client_headers
                    .iter()
                    .map(|(name, value)| (name.clone(), HeaderSource::from(value.as_str()))),
            )
            .build()
    }

    /// A client configured from `toolbox.{toml,yaml,json}` and the
    /// `TOOLBOX_*` environment variables.
    pub fn discover() -> Result<Self> {
        Self::from_config(&toolbox_config::discover_and_load()?)
    }

    /// A client over an already constructed transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            client_headers: Arc::new(ClientHeaders::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    /// Load one tool. Every supplied auth token getter and bound parameter
    /// must be used by it.
    pub async fn load_tool(
        &self,
        name: &str,
        auth_token_getters: AuthTokenGetters,
        bound_params: BoundParams,
    ) -> Result<Tool> {
        self.check_header_conflicts(&auth_token_getters, name)?;

        let manifest = self.transport.tool_get(name, self.request_headers().await?).await?;
        let schema = manifest
            .tools
            .get(name)
            .ok_or_else(|| Error::ToolNotFound {
                name: name.to_string(),
            })?;

        let built = Tool::build(
            name,
            schema,
            &bound_params,
            &auth_token_getters,
            Arc::clone(&self.transport),
            Arc::clone(&self.client_headers),
        )?;
        check_unused(
            &format!("tool '{name}'"),
            &auth_token_getters,
            &bound_params,
            &built.used_auth,
            &built.used_bound,
        )?;

        debug!(tool = %name, server_version = %manifest.server_version, "loaded tool");
        Ok(built.tool)
    }

    /// Load every tool of a toolset, or of the server when `name` is `None`.
    ///
    /// With `strict`, each tool must use every supplied binding. Otherwise a
    /// binding only has to be used by at least one tool.
    pub async fn load_toolset(
        &self,
        name: Option<&str>,
        auth_token_getters: AuthTokenGetters,
        bound_params: BoundParams,
        strict: bool,
    ) -> Result<Vec<Tool>> {
        let label = format!("toolset '{}'", name.unwrap_or("default"));
        self.check_header_conflicts(&auth_token_getters, &label)?;

        let manifest = self
            .transport
            .tools_list(name, self.request_headers().await?)
            .await?;

        let mut tools = Vec::with_capacity(manifest.tools.len());
        let mut used_auth = BTreeSet::new();
        let mut used_bound = BTreeSet::new();
        for (tool_name, schema) in &manifest.tools {
            let Built {
                tool,
                used_auth: tool_auth,
                used_bound: tool_bound,
            } = Tool::build(
                tool_name,
                schema,
                &bound_params,
                &auth_token_getters,
                Arc::clone(&self.transport),
                Arc::clone(&self.client_headers),
            )?;

            if strict {
                check_unused(
                    &format!("tool '{tool_name}'"),
                    &auth_token_getters,
                    &bound_params,
                    &tool_auth,
                    &tool_bound,
                )?;
            } else {
                used_auth.extend(tool_auth);
                used_bound.extend(tool_bound);
            }
            tools.push(tool);
        }

        if !strict {
            check_unused(
                &label,
                &auth_token_getters,
                &bound_params,
                &used_auth,
                &used_bound,
            )?;
        }

        info!(
            toolset = name.unwrap_or("default"),
            count = tools.len(),
            server_version = %manifest.server_version,
            "loaded toolset"
        );
        Ok(tools)
    }

    async fn request_headers(&self) -> Result<HeaderMap> {
        let request_headers = headers::resolve_client_headers(&self.client_headers).await?;
        headers::warn_if_insecure(self.transport.base_url(), &request_headers);
        Ok(request_headers)
    }

    fn check_header_conflicts(&self, getters: &AuthTokenGetters, target: &str) -> Result<()> {
        let conflicts = headers::conflicting_sources(getters.keys(), &self.client_headers);
        if conflicts.is_empty() {
            return Ok(());
        }
        Err(Error::HeaderConflict {
            headers: conflicts.join(", "),
            tool: target.to_string(),
        })
    }
}

fn check_unused(
    target: &str,
    auth_token_getters: &AuthTokenGetters,
    bound_params: &BoundParams,
    used_auth: &BTreeSet<String>,
    used_bound: &BTreeSet<String>,
) -> Result<()> {
    let unused_auth: Vec<&str> = auth_token_getters
        .keys()
        .filter(|source| !used_auth.contains(*source))
        .map(String::as_str)
        .collect();
    let unused_bound: Vec<&str> = bound_params
        .keys()
        .filter(|param| !used_bound.contains(*param))
        .map(String::as_str)
        .collect();

    let mut details = Vec::new();
    if !unused_auth.is_empty() {
        details.push(format!("unused auth tokens: {}", unused_auth.join(", ")));
    }
    if !unused_bound.is_empty() {
        details.push(format!(
            "unused bound parameters: {}",
            unused_bound.join(", ")
        ));
    }
    if details.is_empty() {
        return Ok(());
    }
    Err(Error::UnusedBindings {
        target: target.to_string(),
        details: details.join("; "),
    })
}

pub struct ToolboxClientBuilder {
    url: String,
    protocol: Protocol,
    client_headers: ClientHeaders,
    http_client: Option<Client>,
    timeout: Option<Duration>,
}

impl ToolboxClientBuilder {
    #[must_use]
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    #[must_use]
    pub fn client_header(mut self, name: impl Into<String>, value: impl Into<HeaderSource>) -> Self {
        self.client_headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn client_headers<I>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (String, HeaderSource)>,
    {
        self.client_headers.extend(headers);
        self
    }

    /// Use a preconfigured HTTP client. Overrides [`Self::timeout`].
    #[must_use]
    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ToolboxClient> {
        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::message(format!(
                "unsupported URL scheme '{}', expected http or https",
                url.scheme()
            )));
        }

        let http = match self.http_client {
            Some(client) => client,
            None => {
                let mut builder = Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build()?
            },
        };

        let base_url = self.url.as_str();
        let transport: Arc<dyn Transport> = match self.protocol {
            Protocol::Toolbox => Arc::new(RestTransport::new(base_url, http)),
            Protocol::McpV20241105 => Arc::new(McpTransport::<V20241105>::new(base_url, http)),
            Protocol::McpV20250326 => Arc::new(McpTransport::<V20250326>::new(base_url, http)),
            Protocol::McpV20250618 => Arc::new(McpTransport::<V20250618>::new(base_url, http)),
        };
        debug!(url = %base_url, protocol = %self.protocol, "toolbox client ready");

        Ok(ToolboxClient {
            transport,
            client_headers: Arc::new(self.client_headers),
        })
    }
}
