use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::ToolboxConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["toolbox.toml", "toolbox.yaml", "toolbox.yml", "toolbox.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<ToolboxConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations, then apply
/// `TOOLBOX_*` environment overrides.
///
/// Search order:
/// 1. `./toolbox.{toml,yaml,yml,json}`
/// 2. `~/.config/toolbox/toolbox.{toml,yaml,yml,json}`
///
/// Falls back to [`ToolboxConfig::default`] when no file is found or the
/// file fails to load.
pub fn discover_and_load() -> Result<ToolboxConfig> {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading toolbox config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                ToolboxConfig::default()
            })
        },
        None => {
            debug!("no toolbox config file found, using defaults");
            ToolboxConfig::default()
        },
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Override file values with `TOOLBOX_URL`, `TOOLBOX_PROTOCOL` and
/// `TOOLBOX_TIMEOUT_SECS` when set.
pub fn apply_env_overrides(config: &mut ToolboxConfig) -> Result<()> {
    apply_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_overrides_with(
    config: &mut ToolboxConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(url) = lookup("TOOLBOX_URL").filter(|v| !v.trim().is_empty()) {
        config.url = url;
    }
    if let Some(protocol) = lookup("TOOLBOX_PROTOCOL").filter(|v| !v.trim().is_empty()) {
        config.protocol = Some(protocol);
    }
    if let Some(raw) = lookup("TOOLBOX_TIMEOUT_SECS") {
        config.timeout_secs = raw.trim().parse().map_err(|e| Error::InvalidValue {
            key: "TOOLBOX_TIMEOUT_SECS",
            message: format!("{raw:?}: {e}"),
        })?;
    }
    Ok(())
}

/// Returns the user-global config directory (`~/.config/toolbox/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "toolbox").map(|d| d.config_dir().to_path_buf())
}

fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

fn parse_config(raw: &str, path: &Path) -> Result<ToolboxConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let parse_err = |message: String| Error::Parse {
        path: path.to_path_buf(),
        message,
    };

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| parse_err(e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| parse_err(e.to_string())),
        "json" => serde_json::from_str(raw).map_err(|e| parse_err(e.to_string())),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toolbox.toml");
        std::fs::write(
            &path,
            "url = \"http://localhost:5000\"\nprotocol = \"toolbox\"\ntimeout_secs = 5\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.url, "http://localhost:5000");
        assert_eq!(cfg.protocol.as_deref(), Some("toolbox"));
        assert_eq!(cfg.timeout_secs, 5);
    }

    #[test]
    fn loads_json_and_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("toolbox.json");
        std::fs::write(&json, r#"{"url": "http://json:1", "client_headers": {"a": "b"}}"#)
            .unwrap();
        let yaml = dir.path().join("toolbox.yaml");
        std::fs::write(&yaml, "url: http://yaml:2\nprotocol: mcp\n").unwrap();

        let cfg = load_config(&json).unwrap();
        assert_eq!(cfg.url, "http://json:1");
        assert_eq!(cfg.client_headers["a"], "b");

        let cfg = load_config(&yaml).unwrap();
        assert_eq!(cfg.url, "http://yaml:2");
        assert_eq!(cfg.protocol.as_deref(), Some("mcp"));
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toolbox.ini");
        std::fs::write(&path, "url=x").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat(ext)) if ext == "ini"
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_config(Path::new("/nonexistent/toolbox.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut cfg = ToolboxConfig::default();
        apply_overrides_with(&mut cfg, |name| match name {
            "TOOLBOX_URL" => Some("https://override:443".into()),
            "TOOLBOX_PROTOCOL" => Some("mcp-2024-11-05".into()),
            "TOOLBOX_TIMEOUT_SECS" => Some(" 12 ".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.url, "https://override:443");
        assert_eq!(cfg.protocol.as_deref(), Some("mcp-2024-11-05"));
        assert_eq!(cfg.timeout_secs, 12);
    }

    #[test]
    fn invalid_timeout_override_is_rejected() {
        let mut cfg = ToolboxConfig::default();
        let err = apply_overrides_with(&mut cfg, |name| {
            (name == "TOOLBOX_TIMEOUT_SECS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("TOOLBOX_TIMEOUT_SECS"));
    }
}
