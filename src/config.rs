use serde::Deserialize;
use std::path::Path;

/// Top-level config loaded from `cardinality.toml`, overridable by
/// environment variables for the fields spec §6 calls out explicitly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CardinalityConfig {
    pub hll_precision: u8,
    pub value_sample_cap: usize,
    pub template_cap: usize,
    pub template_example_max_len: usize,
    pub high_cardinality_threshold: u64,
    pub shard_count: usize,
    pub session: SessionConfig,
}

impl Default for CardinalityConfig {
    fn default() -> Self {
        Self {
            hll_precision: 14,
            value_sample_cap: 20,
            template_cap: 200,
            template_example_max_len: 512,
            high_cardinality_threshold: 100,
            shard_count: 32,
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub dir: String,
    pub max_sessions: usize,
    pub max_session_size_bytes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: "./sessions".to_string(),
            max_sessions: 50,
            max_session_size_bytes: 100 * 1024 * 1024,
        }
    }
}

impl CardinalityConfig {
    /// Load config from a TOML file, falling back to defaults if it
    /// doesn't exist, then layer environment variable overrides on top.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            Self::default()
        } else {
            let contents = std::fs::read_to_string(path)?;
            let config: CardinalityConfig = toml::from_str(&contents)?;
            tracing::info!("loaded config from {}", path.display());
            config
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply the environment variable overrides documented in spec §6.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("SESSION_DIR") {
            self.session.dir = dir;
        }
        if let Ok(max_size) = std::env::var("MAX_SESSION_SIZE") {
            if let Ok(v) = max_size.parse() {
                self.session.max_session_size_bytes = v;
            }
        }
        if let Ok(max_sessions) = std::env::var("MAX_SESSIONS") {
            if let Ok(v) = max_sessions.parse() {
                self.session.max_sessions = v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_apply_over_defaults() {
        let mut config = CardinalityConfig::default();
        // SAFETY: single-threaded access to these env keys within this test.
        unsafe {
            std::env::set_var("SESSION_DIR", "/tmp/custom-sessions");
            std::env::set_var("MAX_SESSIONS", "7");
        }
        config.apply_env_overrides();
        assert_eq!(config.session.dir, "/tmp/custom-sessions");
        assert_eq!(config.session.max_sessions, 7);
        unsafe {
            std::env::remove_var("SESSION_DIR");
            std::env::remove_var("MAX_SESSIONS");
        }
    }

    #[test]
    fn defaults_match_spec() {
        let config = CardinalityConfig::default();
        assert_eq!(config.hll_precision, 14);
        assert_eq!(config.value_sample_cap, 20);
        assert_eq!(config.template_cap, 200);
        assert_eq!(config.session.max_sessions, 50);
        assert_eq!(config.session.max_session_size_bytes, 100 * 1024 * 1024);
    }
}
