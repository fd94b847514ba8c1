//! Configuration loading and env substitution for the relaychat backend.
//!
//! Config files: `relaychat.toml`, `relaychat.yaml`, or `relaychat.json`,
//! searched in the given directory. Supports `${ENV_VAR}` substitution in
//! all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use loader::{discover_and_load, find_config_path, load_from_path};
pub use schema::{AvatarConfig, DatabaseConfig, PolicyConfig, RelaychatConfig, SessionConfig};
