//! Resolved control-plane configuration (ambient, SPEC_FULL.md §9).
//! Grounded on `storage/config.rs`'s serde-struct-with-per-field-defaults
//! shape. Loaded from TOML via [`GateConfig::load`]; every field has a
//! default so a missing config file still produces a usable instance.

use crate::queue::rollout::RolloutMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_max_concurrent_runs() -> usize {
    4
}

fn default_max_queue_size() -> usize {
    64
}

fn default_event_buffer_size() -> usize {
    crate::events::DEFAULT_BUFFER_SIZE
}

fn default_runs_root() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".agentgate")
}

fn default_agent_timeout() -> Duration {
    Duration::from_secs(900)
}

fn default_retry_policy() -> RetryPolicyName {
    RetryPolicyName::Default
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicyName {
    Default,
    Aggressive,
    None,
}

impl RetryPolicyName {
    pub fn resolve(self) -> crate::retry::RetryPolicy {
        match self {
            RetryPolicyName::Default => crate::retry::RetryPolicy::default_policy(),
            RetryPolicyName::Aggressive => crate::retry::RetryPolicy::aggressive(),
            RetryPolicyName::None => crate::retry::RetryPolicy::none(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub max_concurrent_runs: usize,
    pub max_queue_size: usize,
    pub event_buffer_size: usize,
    pub runs_root: PathBuf,
    #[serde(with = "humantime_serde")]
    pub default_agent_timeout: Duration,
    pub retry_policy: RetryPolicyName,
    pub rollout: RolloutSettings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutSettings {
    pub percent_new: u8,
    pub shadow: bool,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self { percent_new: 0, shadow: false }
    }
}

impl RolloutSettings {
    pub fn mode(self) -> RolloutMode {
        if self.percent_new >= 100 && !self.shadow {
            RolloutMode::NewOnly
        } else if self.percent_new == 0 && !self.shadow {
            RolloutMode::LegacyOnly
        } else {
            RolloutMode::Shadow { percent_new: self.percent_new }
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: default_max_concurrent_runs(),
            max_queue_size: default_max_queue_size(),
            event_buffer_size: default_event_buffer_size(),
            runs_root: default_runs_root(),
            default_agent_timeout: default_agent_timeout(),
            retry_policy: default_retry_policy(),
            rollout: RolloutSettings::default(),
        }
    }
}

impl GateConfig {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let body = tokio::fs::read_to_string(path).await?;
        let config: GateConfig = toml::from_str(&body)?;
        Ok(config)
    }
}
