//! Engine configuration
//!
//! Loaded from `pathwarden.toml` in the working directory (or a path given
//! on the command line), falling back to `~/.config/pathwarden/config.toml`.
//!
//! ```toml
//! [search]
//! max_hops = 4
//! candidate_cap = 500
//! top_k = 5
//!
//! [scoring]
//! weights = { weighted_cost = 0.4, centrality = 0.3, motif = 0.3, learned = 0.25 }
//! motif_penalty = 0.25
//!
//! [scoring.learned]
//! enabled = true
//! bias = -2.0
//! exploitability = 2.5
//!
//! [timeouts]
//! call_ms = 5000
//! deadline_ms = 2000
//!
//! [cache]
//! ttl_secs = 300
//! max_entries = 256
//!
//! [workers]
//! count = 0  # auto
//!
//! [advisor]
//! backend = "none"  # anthropic | openai | ollama
//! confidence_threshold = 0.6
//!
//! [remediation]
//! max_actions = 5
//! ```
//!
//! Environment variables override the file: `PATHWARDEN_ADVISOR`,
//! `PATHWARDEN_DEADLINE_MS`, `PATHWARDEN_CALL_TIMEOUT_MS`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::advisors::{LlmBackend, LlmConfig};
use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::deadline::{DEFAULT_CALL_TIMEOUT, DEFAULT_DEADLINE};
use crate::paths::{DEFAULT_CANDIDATE_CAP, DEFAULT_TOP_K};
use crate::remediation::DEFAULT_MAX_ACTIONS;
use crate::scoring::motif::DEFAULT_MOTIF_PENALTY;
use crate::scoring::{LinearEdgeModel, ScoringWeights};

pub const CONFIG_FILE: &str = "pathwarden.toml";
pub const DEFAULT_MAX_HOPS: usize = 4;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub search: SearchConfig,
    pub scoring: ScoringConfig,
    pub timeouts: TimeoutConfig,
    pub cache: CacheConfig,
    pub workers: WorkersConfig,
    pub advisor: AdvisorSettings,
    pub remediation: RemediationSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_hops: usize,
    pub candidate_cap: usize,
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            candidate_cap: DEFAULT_CANDIDATE_CAP,
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub motif_penalty: f64,
    pub learned: LearnedConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            motif_penalty: DEFAULT_MOTIF_PENALTY,
            learned: LearnedConfig::default(),
        }
    }
}

/// Coefficients for the built-in [`LinearEdgeModel`]; off unless enabled
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnedConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub model: LinearEdgeModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub call_ms: u64,
    pub deadline_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            call_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            deadline_ms: DEFAULT_DEADLINE.as_millis() as u64,
        }
    }
}

impl TimeoutConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL.as_secs(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// 0 = one per core, capped at 16
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorSettings {
    /// `none`, `anthropic`, `openai` or `ollama`
    pub backend: String,
    pub model: Option<String>,
    pub confidence_threshold: f64,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            backend: "none".to_string(),
            model: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl AdvisorSettings {
    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend.trim().to_lowercase().as_str(), "" | "none" | "off")
    }

    /// Client settings for the configured backend, `None` when disabled
    pub fn llm_config(&self, call_timeout: Duration) -> anyhow::Result<Option<LlmConfig>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let backend: LlmBackend = self
            .backend
            .parse()
            .with_context(|| format!("invalid [advisor] backend '{}'", self.backend))?;
        Ok(Some(LlmConfig {
            backend,
            model: self.model.clone(),
            timeout: call_timeout,
            ..Default::default()
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationSettings {
    pub max_actions: usize,
}

impl Default for RemediationSettings {
    fn default() -> Self {
        Self {
            max_actions: DEFAULT_MAX_ACTIONS,
        }
    }
}

impl EngineConfig {
    /// Load configuration with priority:
    /// 1. Environment variables (highest)
    /// 2. `explicit` path, or `pathwarden.toml` in the working directory
    /// 3. User config (`~/.config/pathwarden/config.toml`)
    ///
    /// A file that cannot be read or parsed is skipped with a warning.
    pub fn load(explicit: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => std::iter::once(PathBuf::from(CONFIG_FILE))
                .chain(Self::user_config_path())
                .collect(),
        };

        let mut config = EngineConfig::default();
        for path in candidates {
            if explicit.is_none() && !path.exists() {
                continue;
            }
            match load_toml_config(&path) {
                Ok(loaded) => {
                    debug!("Loaded config from {}", path.display());
                    config = loaded;
                    break;
                }
                Err(e) => {
                    warn!("Failed to load {}: {:#}, using defaults", path.display(), e);
                    break;
                }
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pathwarden").join("config.toml"))
    }

    /// Apply environment overrides; `lookup` stands in for `std::env::var`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("PATHWARDEN_ADVISOR") {
            self.advisor.backend = backend;
        }
        if let Some(ms) = lookup("PATHWARDEN_DEADLINE_MS") {
            match ms.trim().parse() {
                Ok(ms) => self.timeouts.deadline_ms = ms,
                Err(_) => warn!("Ignoring PATHWARDEN_DEADLINE_MS={}: not a number", ms),
            }
        }
        if let Some(ms) = lookup("PATHWARDEN_CALL_TIMEOUT_MS") {
            match ms.trim().parse() {
                Ok(ms) => self.timeouts.call_ms = ms,
                Err(_) => warn!("Ignoring PATHWARDEN_CALL_TIMEOUT_MS={}: not a number", ms),
            }
        }
    }
}

fn load_toml_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let config: EngineConfig = toml::from_str(&content).context("malformed TOML")?;
    Ok(config)
}
