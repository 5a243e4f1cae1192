use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DOCK_REGION: &str = "main";
const DEFAULT_INITIAL_DELAY_MS: u64 = 150;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_FACTOR: u32 = 2;
const DEFAULT_MAX_DELAY_MS: u64 = 1_000;

/// How long the resolver waits for a created widget to show up in the
/// tab strip before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPolicy {
    pub initial_delay: Duration,
    pub max_attempts: u32,
    pub backoff_factor: u32,
    pub max_delay: Duration,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl ResolutionPolicy {
    pub fn next_delay(&self, current: Duration) -> Duration {
        current
            .saturating_mul(self.backoff_factor.max(1))
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffPolicy {
    #[default]
    Positional,
    Keyed,
}

impl DiffPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            DiffPolicy::Positional => "positional",
            DiffPolicy::Keyed => "keyed",
        }
    }
}

impl FromStr for DiffPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "positional" => Ok(DiffPolicy::Positional),
            "keyed" => Ok(DiffPolicy::Keyed),
            other => Err(format!("unknown diff policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub dock_region: String,
    pub resolution: ResolutionPolicy,
    pub diff_policy: DiffPolicy,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            dock_region: DEFAULT_DOCK_REGION.to_string(),
            resolution: ResolutionPolicy::default(),
            diff_policy: DiffPolicy::default(),
        }
    }
}

impl NotifierConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolves each field from `lookup`, keeping the default when a value
    /// is missing, blank or unparseable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(region) = lookup("PROMPTML_DOCK_REGION") {
            if !region.trim().is_empty() {
                config.dock_region = region.trim().to_string();
            }
        }
        if let Some(ms) = lookup("PROMPTML_RESOLVE_DELAY_MS").and_then(|v| parse_u64(&v)) {
            config.resolution.initial_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = lookup("PROMPTML_RESOLVE_ATTEMPTS").and_then(|v| parse_attempts(&v))
        {
            config.resolution.max_attempts = attempts;
        }
        if let Some(ms) = lookup("PROMPTML_RESOLVE_MAX_DELAY_MS").and_then(|v| parse_u64(&v)) {
            config.resolution.max_delay = Duration::from_millis(ms);
        }
        if let Some(policy) = lookup("PROMPTML_DIFF_POLICY").and_then(|v| v.parse().ok()) {
            config.diff_policy = policy;
        }
        config
    }
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" | "off" | "OFF" => Some(false),
        _ => None,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

fn parse_attempts(value: &str) -> Option<u32> {
    value.trim().parse().ok().filter(|attempts| *attempts > 0)
}
