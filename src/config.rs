//! Engine configuration
//!
//! One explicitly constructed object passed into the engine, scheduler and
//! sweeper at startup. Environment variables override the defaults; nothing
//! in the crate reads the environment after construction.

use std::time::Duration;

/// Operational knobs for the debate engine and its background sweeps.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a debate waits for a human opponent before the scheduler
    /// may assign an AI one.
    pub auto_match_after: Duration,
    /// Matchmaking sweep interval.
    pub match_interval: Duration,
    /// Max debates matched per scheduler tick.
    pub match_batch_size: usize,
    /// Cleanup sweep interval.
    pub cleanup_interval: Duration,
    /// Waiting debates older than this are abandoned by the sweeper.
    pub waiting_timeout: Duration,
    /// Active debates idle longer than this are abandoned by the sweeper.
    pub idle_timeout: Duration,
    /// Personality assigned to auto-matched AI opponents.
    pub default_personality: String,
    pub generator: GeneratorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_match_after: Duration::from_secs(60),
            match_interval: Duration::from_secs(30),
            match_batch_size: 10,
            cleanup_interval: Duration::from_secs(300),
            waiting_timeout: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(24 * 3600),
            default_personality: "measured analyst".to_string(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `ROSTRUM_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(secs) = env_u64("ROSTRUM_AUTO_MATCH_AFTER_SECS") {
            cfg.auto_match_after = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("ROSTRUM_MATCH_INTERVAL_SECS") {
            cfg.match_interval = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("ROSTRUM_MATCH_BATCH_SIZE") {
            cfg.match_batch_size = n as usize;
        }
        if let Some(secs) = env_u64("ROSTRUM_CLEANUP_INTERVAL_SECS") {
            cfg.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("ROSTRUM_WAITING_TIMEOUT_SECS") {
            cfg.waiting_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("ROSTRUM_IDLE_TIMEOUT_SECS") {
            cfg.idle_timeout = Duration::from_secs(secs);
        }
        if let Ok(p) = std::env::var("ROSTRUM_AI_PERSONALITY") {
            if !p.is_empty() {
                cfg.default_personality = p;
            }
        }
        cfg.generator = GeneratorConfig::from_env();
        cfg
    }
}

/// AI argument generator settings.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    /// Hard bound on one generation call.
    pub request_timeout: Duration,
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: "claude-3-haiku-20240307".to_string(),
            request_timeout: Duration::from_secs(25),
            max_tokens: 300,
        }
    }
}

impl GeneratorConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("ROSTRUM_AI_API_URL") {
            if !url.is_empty() {
                cfg.api_url = url;
            }
        }
        if let Ok(model) = std::env::var("ROSTRUM_AI_MODEL") {
            if !model.is_empty() {
                cfg.model = model;
            }
        }
        if let Some(secs) = env_u64("ROSTRUM_AI_TIMEOUT_SECS") {
            cfg.request_timeout = Duration::from_secs(secs);
        }
        if let Some(tokens) = env_u64("ROSTRUM_AI_MAX_TOKENS") {
            cfg.max_tokens = tokens as u32;
        }
        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_knobs() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.auto_match_after, Duration::from_secs(60));
        assert_eq!(cfg.match_interval, Duration::from_secs(30));
        assert_eq!(cfg.match_batch_size, 10);
        assert_eq!(cfg.waiting_timeout, Duration::from_secs(300));
        assert_eq!(cfg.idle_timeout, Duration::from_secs(86400));
        assert_eq!(cfg.generator.request_timeout, Duration::from_secs(25));
    }
}
