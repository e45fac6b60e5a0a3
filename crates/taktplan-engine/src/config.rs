//! Operational engine configuration from the environment.

/// Process-level defaults, read once at startup.
///
/// | Variable | Default |
/// |---|---|
/// | `TAKTPLAN_SOLVER_BUDGET_SECS` | 300 |
/// | `TAKTPLAN_WORKERS` | 8 |
/// | `TAKTPLAN_GAP_LIMIT` | 0.01 |
/// | `TAKTPLAN_WARM_CACHE_SIZE` | 64 |
/// | `TAKTPLAN_EVENT_BUFFER_SIZE` | 10000 |
/// | `TAKTPLAN_AUTO_TUNE` | true |
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub default_budget_seconds: u32,
    pub default_workers: u32,
    pub default_gap_limit: f64,
    pub warm_cache_size: usize,
    pub event_buffer_size: usize,
    pub auto_tune: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_budget_seconds: 300,
            default_workers: 8,
            default_gap_limit: 0.01,
            warm_cache_size: 64,
            event_buffer_size: 10_000,
            auto_tune: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw, "unparseable environment value, using default");
            fallback
        }),
        Err(_) => fallback,
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_budget_seconds: env_parse(
                "TAKTPLAN_SOLVER_BUDGET_SECS",
                defaults.default_budget_seconds,
            ),
            default_workers: env_parse("TAKTPLAN_WORKERS", defaults.default_workers),
            default_gap_limit: env_parse("TAKTPLAN_GAP_LIMIT", defaults.default_gap_limit),
            warm_cache_size: env_parse("TAKTPLAN_WARM_CACHE_SIZE", defaults.warm_cache_size),
            event_buffer_size: env_parse(
                "TAKTPLAN_EVENT_BUFFER_SIZE",
                defaults.event_buffer_size,
            ),
            auto_tune: env_parse("TAKTPLAN_AUTO_TUNE", defaults.auto_tune),
        }
    }
}
