//! Wire protocols a client can speak.

use std::{fmt, str::FromStr};

use crate::error::Error;

/// The legacy REST protocol or one MCP revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// `GET /api/tool/{name}`, `POST /api/tool/{name}/invoke`.
    Toolbox,
    McpV20241105,
    McpV20250326,
    #[default]
    McpV20250618,
}

impl Protocol {
    /// Latest supported MCP revision.
    pub const MCP: Self = Self::McpV20250618;

    pub fn is_mcp(self) -> bool {
        !matches!(self, Self::Toolbox)
    }

    /// MCP protocol version string, `None` for the REST protocol.
    pub fn mcp_version(self) -> Option<&'static str> {
        match self {
            Self::Toolbox => None,
            Self::McpV20241105 => Some("2024-11-05"),
            Self::McpV20250326 => Some("2025-03-26"),
            Self::McpV20250618 => Some("2025-06-18"),
        }
    }

    pub fn supported_mcp_versions() -> [&'static str; 3] {
        ["2025-06-18", "2025-03-26", "2024-11-05"]
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mcp_version() {
            Some(version) => write!(f, "mcp-{version}"),
            None => f.write_str("toolbox"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "toolbox" => Ok(Self::Toolbox),
            "mcp" => Ok(Self::MCP),
            "mcp-2024-11-05" => Ok(Self::McpV20241105),
            "mcp-2025-03-26" => Ok(Self::McpV20250326),
            "mcp-2025-06-18" => Ok(Self::McpV20250618),
            other => Err(Error::message(format!(
                "unknown protocol '{other}', expected one of: toolbox, mcp, {}",
                Self::supported_mcp_versions().map(|v| format!("mcp-{v}")).join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_round_trips_display() {
        assert_eq!("mcp".parse::<Protocol>().unwrap(), Protocol::MCP);
        assert_eq!(" Toolbox ".parse::<Protocol>().unwrap(), Protocol::Toolbox);
        for protocol in [
            Protocol::McpV20241105,
            Protocol::McpV20250326,
            Protocol::McpV20250618,
        ] {
            assert_eq!(protocol.to_string().parse::<Protocol>().unwrap(), protocol);
        }
    }

    #[test]
    fn unknown_name_lists_choices() {
        let err = "grpc".parse::<Protocol>().unwrap_err();
        assert!(err.to_string().contains("mcp-2025-03-26"));
    }

    #[test]
    fn default_is_latest_mcp() {
        assert_eq!(Protocol::default(), Protocol::MCP);
        assert!(Protocol::default().is_mcp());
        assert!(!Protocol::Toolbox.is_mcp());
        assert_eq!(Protocol::Toolbox.mcp_version(), None);
    }
}
