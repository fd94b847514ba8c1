//! Discover and load `relaychat.toml` / `.yaml` / `.json`, applying
//! `${ENV_VAR}` substitution.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{env_subst, schema::RelaychatConfig};

const CANDIDATES: &[&str] = &["relaychat.toml", "relaychat.yaml", "relaychat.json"];

/// Search `dir` for a recognized config file name.
pub fn find_config_path(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Load and parse the config at `path`, applying env substitution to every
/// string value before deserializing into [`RelaychatConfig`].
pub fn load_from_path(path: &Path) -> Result<RelaychatConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("toml");

    let mut value: serde_json::Value = match ext {
        "toml" => {
            let toml_value: toml::Value =
                toml::from_str(&raw).context("parsing config as TOML")?;
            serde_json::to_value(toml_value).context("converting TOML config to JSON")?
        },
        "yaml" | "yml" => serde_yaml::from_str(&raw).context("parsing config as YAML")?,
        "json" => serde_json::from_str(&raw).context("parsing config as JSON")?,
        other => anyhow::bail!("unrecognized config extension: {other}"),
    };

    env_subst::substitute_json(&mut value);

    serde_json::from_value(value).context("deserializing config")
}

/// Discover a config file starting at `dir`, falling back to
/// [`RelaychatConfig::default`] if none is found.
pub fn discover_and_load(dir: &Path) -> Result<RelaychatConfig> {
    match find_config_path(dir) {
        Some(path) => load_from_path(&path),
        None => {
            tracing::debug!(dir = %dir.display(), "no config file found, using defaults");
            Ok(RelaychatConfig::default())
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = discover_and_load(dir.path()).unwrap();
        assert_eq!(cfg.database.table_prefix, "im_");
    }

    #[test]
    fn loads_toml_with_env_substitution() {
        unsafe {
            std::env::set_var("RELAYCHAT_TEST_DB_URL", "sqlite://from-env.db");
        }
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("relaychat.toml"),
            r#"
            [database]
            url = "${RELAYCHAT_TEST_DB_URL}"
            table_prefix = "custom_"
            "#,
        )
        .unwrap();

        let cfg = discover_and_load(dir.path()).unwrap();
        assert_eq!(cfg.database.url, "sqlite://from-env.db");
        assert_eq!(cfg.database.table_prefix, "custom_");
    }

    #[test]
    fn loads_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("relaychat.json"),
            r#"{"policy": {"recall_window_secs": 60}}"#,
        )
        .unwrap();

        let cfg = discover_and_load(dir.path()).unwrap();
        assert_eq!(cfg.policy.recall_window_secs, 60);
    }
}
