//! Configuration for the toolbox client.
//!
//! Config files: `toolbox.toml`, `toolbox.yaml` or `toolbox.json`,
//! searched in `./` then the user config directory (`~/.config/toolbox/`).
//!
//! `${ENV_VAR}` placeholders are substituted in the raw file text, and the
//! `TOOLBOX_*` environment variables override file values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::ToolboxConfig,
};
