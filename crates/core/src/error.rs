use std::sync::Arc;

use crate::schema::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid manifest structure received: {0}")]
    ManifestStructure(String),
    #[error("tool '{name}' not found in manifest")]
    ToolNotFound { name: String },
    #[error("validation failed for {target}: {details}")]
    UnusedBindings { target: String, details: String },
    #[error("cannot re-bind parameter: parameter '{param}' is already bound in tool '{tool}'")]
    AlreadyBound { param: String, tool: String },
    #[error("unable to bind parameter: no parameter named '{param}' in tool '{tool}'")]
    UnknownParameter { param: String, tool: String },
    #[error("authentication source(s) `{sources}` already registered in tool '{tool}'")]
    AuthAlreadyRegistered { sources: String, tool: String },
    #[error("authentication source(s) `{sources}` unused by tool '{tool}'")]
    AuthUnused { sources: String, tool: String },
    #[error(
        "client header(s) `{headers}` already registered in client, cannot register the same \
         headers on tool '{tool}'"
    )]
    HeaderConflict { headers: String, tool: String },
    #[error("invalid arguments: {0}")]
    ArgumentValidation(ValidationErrors),
    #[error("one or more of the following authn services are required to invoke this tool: {sources}")]
    AuthRequired { sources: String },
    #[error("{0}")]
    Protocol(String),
    #[error("MCP request failed with code {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("failed to parse JSON-RPC error: {0}")]
    MalformedRpcError(String),
    #[error("API request failed with status {status}. Server response: {body}")]
    Http { status: u16, body: String },
    /// A failed MCP handshake, shared by every caller of the transport.
    #[error(transparent)]
    Handshake(Arc<Error>),
    #[error("invalid header `{name}`: {message}")]
    InvalidHeader { name: String, message: String },
    #[error(transparent)]
    Config(#[from] toolbox_config::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// The error as first raised, looking through a shared handshake failure.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Handshake(inner) => inner.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// `.context()` / `.with_context()` for `Result` and `Option`, producing
/// [`Error::Message`].
pub trait Context<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        let ctx = context.into();
        self.map_err(|source| Error::message(format!("{ctx}: {source}")))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|source| Error::message(format!("{}: {source}", f().into())))
    }
}

impl<T> Context<T> for Option<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| Error::message(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::message(f()))
    }
}
