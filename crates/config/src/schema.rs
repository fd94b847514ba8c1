//! Config schema: table prefix, mute/recall defaults, avatar composition
//! settings.

use serde::{Deserialize, Serialize};

/// Top-level `relaychat.toml` / `.yaml` / `.json` schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaychatConfig {
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub policy: PolicyConfig,
    pub avatar: AvatarConfig,
}

impl Default for RelaychatConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            session: SessionConfig::default(),
            policy: PolicyConfig::default(),
            avatar: AvatarConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite://relaychat.db` or `sqlite::memory:`.
    pub url: String,
    /// Prefix applied to every table name (default `im_`).
    pub table_prefix: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".into(),
            table_prefix: "im_".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_frame_bytes: usize,
    pub outbound_queue_depth: usize,
    pub read_deadline_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub write_deadline_secs: u64,
    /// Period between read-cursor flush ticks.
    pub read_flush_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: relaychat_protocol::DEFAULT_MAX_FRAME_BYTES,
            outbound_queue_depth: relaychat_protocol::OUTBOUND_QUEUE_DEPTH,
            read_deadline_secs: relaychat_protocol::READ_DEADLINE_SECS,
            heartbeat_interval_secs: relaychat_protocol::HEARTBEAT_INTERVAL_SECS,
            write_deadline_secs: relaychat_protocol::WRITE_DEADLINE_SECS,
            read_flush_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Recall window in seconds.
    pub recall_window_secs: i64,
    /// Timezone used to evaluate the daily mute window ("server local time").
    pub daily_mute_timezone: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            recall_window_secs: relaychat_protocol::RECALL_WINDOW_SECS,
            daily_mute_timezone: "UTC".into(),
        }
    }
}

impl PolicyConfig {
    /// Resolve the configured timezone, falling back to UTC and logging a
    /// warning if it doesn't parse (never panics on a bad config value).
    pub fn resolved_timezone(&self) -> chrono_tz::Tz {
        self.daily_mute_timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(
                tz = %self.daily_mute_timezone,
                "unknown daily_mute_timezone, falling back to UTC"
            );
            chrono_tz::UTC
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Root directory local avatar paths are resolved against.
    pub source_root: String,
    /// Directory composed group avatars are written to.
    pub output_dir: String,
    /// URL prefix prepended to the content-addressed output filename.
    pub url_prefix: String,
    pub tile_px: u32,
    pub gap_px: u32,
    pub padding_px: u32,
    /// Fail the composition outright if every input source fails to
    /// resolve.
    pub strict: bool,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            source_root: ".".into(),
            output_dir: "avatars".into(),
            url_prefix: "/avatars/".into(),
            tile_px: 256,
            gap_px: 4,
            padding_px: 8,
            strict: false,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = RelaychatConfig::default();
        assert_eq!(cfg.database.table_prefix, "im_");
        assert_eq!(cfg.policy.recall_window_secs, 120);
        assert_eq!(cfg.avatar.tile_px, 256);
        assert_eq!(cfg.avatar.gap_px, 4);
        assert_eq!(cfg.avatar.padding_px, 8);
    }

    #[test]
    fn bad_timezone_falls_back_to_utc() {
        let cfg = PolicyConfig {
            daily_mute_timezone: "Not/AZone".into(),
            ..Default::default()
        };
        assert_eq!(cfg.resolved_timezone(), chrono_tz::UTC);
    }
}
