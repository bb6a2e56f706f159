use std::path::PathBuf;

// ---------------------------------------------------------------------------
// ScoutConfig: file-based config loader (feed-scout.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "FEED_SCOUT_CONFIG";
pub const ENV_CDP_ENDPOINT: &str = "FEED_SCOUT_CDP_ENDPOINT";
pub const ENV_SCROLL_PX: &str = "FEED_SCOUT_SCROLL_PX";
pub const ENV_SETTLE_MS: &str = "FEED_SCOUT_SETTLE_MS";
pub const ENV_IDLE_QUIET_MS: &str = "FEED_SCOUT_IDLE_QUIET_MS";
pub const ENV_IDLE_TIMEOUT_MS: &str = "FEED_SCOUT_IDLE_TIMEOUT_MS";
pub const ENV_PATIENCE: &str = "FEED_SCOUT_PATIENCE";
pub const ENV_MAX_STEPS: &str = "FEED_SCOUT_MAX_STEPS";
pub const ENV_REPORTS_DIR: &str = "FEED_SCOUT_REPORTS_DIR";
pub const ENV_BASE_URL: &str = "FEED_SCOUT_BASE_URL";

pub const DEFAULT_CDP_ENDPOINT: &str = "http://127.0.0.1:9222";

/// Top-level config loaded from `feed-scout.json`.
///
/// Every field is optional in the file; the `resolve_*` accessors apply
/// JSON field → env var → built-in default.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct ScoutConfig {
    /// Remote-debugging HTTP endpoint of the already running browser.
    pub cdp_endpoint: Option<String>,
    /// Pixels scrolled per step.
    pub scroll_px: Option<u32>,
    /// Fixed pause after each scroll before the idle wait starts.
    pub settle_ms: Option<u64>,
    /// Network must stay quiet this long to count as rendered.
    pub idle_quiet_ms: Option<u64>,
    /// Upper bound on the idle wait per scroll.
    pub idle_timeout_ms: Option<u64>,
    pub patience: Option<usize>,
    pub max_steps: Option<usize>,
    pub reports_dir: Option<String>,
    /// Base URL for resolving relative links when the page URL is unavailable.
    pub base_url: Option<String>,
}

fn env_trimmed(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_trimmed(key).and_then(|v| v.parse().ok())
}

impl ScoutConfig {
    /// CDP endpoint: JSON field → `FEED_SCOUT_CDP_ENDPOINT` → `http://127.0.0.1:9222`.
    pub fn resolve_cdp_endpoint(&self) -> String {
        if let Some(e) = &self.cdp_endpoint {
            if !e.trim().is_empty() {
                return e.trim().trim_end_matches('/').to_string();
            }
        }
        env_trimmed(ENV_CDP_ENDPOINT)
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_CDP_ENDPOINT.to_string())
    }

    pub fn resolve_scroll_px(&self) -> u32 {
        self.scroll_px
            .or_else(|| env_parsed(ENV_SCROLL_PX))
            .unwrap_or(1500)
    }

    pub fn resolve_settle_ms(&self) -> u64 {
        self.settle_ms
            .or_else(|| env_parsed(ENV_SETTLE_MS))
            .unwrap_or(1500)
    }

    pub fn resolve_idle_quiet_ms(&self) -> u64 {
        self.idle_quiet_ms
            .or_else(|| env_parsed(ENV_IDLE_QUIET_MS))
            .unwrap_or(800)
    }

    pub fn resolve_idle_timeout_ms(&self) -> u64 {
        self.idle_timeout_ms
            .or_else(|| env_parsed(ENV_IDLE_TIMEOUT_MS))
            .unwrap_or(6000)
    }

    /// Patience: JSON field → `FEED_SCOUT_PATIENCE` → 3. Zero is bumped to 1.
    pub fn resolve_patience(&self) -> usize {
        self.patience
            .or_else(|| env_parsed(ENV_PATIENCE))
            .unwrap_or(3)
            .max(1)
    }

    /// Default step count offered at the prompt: JSON field → `FEED_SCOUT_MAX_STEPS` → 10.
    pub fn resolve_max_steps(&self) -> usize {
        self.max_steps
            .or_else(|| env_parsed(ENV_MAX_STEPS))
            .unwrap_or(10)
    }

    pub fn resolve_reports_dir(&self) -> PathBuf {
        if let Some(d) = &self.reports_dir {
            if !d.trim().is_empty() {
                return PathBuf::from(d.trim());
            }
        }
        env_trimmed(ENV_REPORTS_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("reports"))
    }

    pub fn resolve_base_url(&self) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .or_else(|| env_trimmed(ENV_BASE_URL))
    }
}

/// Candidate config file locations, first found wins.
///
/// 1. `FEED_SCOUT_CONFIG` env var path
/// 2. `./feed-scout.json`
/// 3. `~/.feed-scout/config.json`
fn config_candidates() -> Vec<PathBuf> {
    let mut v = vec![PathBuf::from("feed-scout.json")];
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".feed-scout").join("config.json"));
    }
    if let Some(env_path) = env_trimmed(ENV_CONFIG_PATH) {
        v.insert(0, PathBuf::from(env_path));
    }
    v
}

/// Load `feed-scout.json` from standard locations.
///
/// Missing file → `ScoutConfig::default()` (silent, env-var fallbacks apply).
/// Parse error → log a warning, return `ScoutConfig::default()`.
pub fn load_scout_config() -> ScoutConfig {
    for path in config_candidates() {
        let Ok(contents) = std::fs::read_to_string(&path) else {
            continue;
        };
        return match parse_scout_config(&contents) {
            Ok(cfg) => {
                tracing::info!("feed-scout config loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    "feed-scout config parse error at {}: {} - using defaults",
                    path.display(),
                    e
                );
                ScoutConfig::default()
            }
        };
    }
    ScoutConfig::default()
}

pub fn parse_scout_config(contents: &str) -> Result<ScoutConfig, serde_json::Error> {
    serde_json::from_str::<ScoutConfig>(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fields_win_over_defaults() {
        let cfg = parse_scout_config(
            r#"{"cdp_endpoint": "http://10.0.0.5:9333/", "scroll_px": 900, "patience": 0}"#,
        )
        .unwrap();
        assert_eq!(cfg.resolve_cdp_endpoint(), "http://10.0.0.5:9333");
        assert_eq!(cfg.resolve_scroll_px(), 900);
        // zero patience would stop before the first pass could count
        assert_eq!(cfg.resolve_patience(), 1);
    }

    #[test]
    fn unknown_and_missing_fields_are_tolerated() {
        let cfg = parse_scout_config(r#"{"something_else": true}"#).unwrap();
        assert!(cfg.cdp_endpoint.is_none());
        assert!(cfg.resolve_idle_timeout_ms() > 0);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_scout_config("{ not json").is_err());
    }

    #[test]
    fn blank_reports_dir_falls_through() {
        let cfg = ScoutConfig {
            reports_dir: Some("   ".into()),
            ..Default::default()
        };
        if std::env::var(ENV_REPORTS_DIR).is_err() {
            assert_eq!(cfg.resolve_reports_dir(), PathBuf::from("reports"));
        }
    }
}
