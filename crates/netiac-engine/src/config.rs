use std::path::PathBuf;

/// Tunables the engine needs at construction time. The host process (a CLI,
/// a service wrapper — out of scope here) is responsible for reading them
/// from the environment and building this struct; `from_env` is provided as
/// the seam such a host would call.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub state_dir: PathBuf,
    pub state_encryption_key: Option<String>,
    pub max_concurrency: usize,
    pub lock_timeout_ms: u64,
    pub apply_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            state_dir: PathBuf::from("./state"),
            state_encryption_key: None,
            max_concurrency: 1,
            lock_timeout_ms: 30_000,
            apply_retries: 3,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let default = EngineConfig::default();
        EngineConfig {
            state_dir: std::env::var("STATE_DIR").map(PathBuf::from).unwrap_or(default.state_dir),
            state_encryption_key: std::env::var("STATE_ENCRYPTION_KEY").ok(),
            max_concurrency: std::env::var("MAX_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_concurrency),
            lock_timeout_ms: std::env::var("LOCK_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.lock_timeout_ms),
            apply_retries: std::env::var("APPLY_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.apply_retries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.lock_timeout_ms, 30_000);
        assert_eq!(config.apply_retries, 3);
    }
}
