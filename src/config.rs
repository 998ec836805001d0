use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cost::CostModel;
use crate::types::{Subset, Tier};
use crate::utils::app_config::AppConfig;
use crate::utils::prelude::*;

/// Thread count and concurrency cap of one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    pub threads: usize,
    pub max_workers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfigs {
    pub small: TierConfig,
    pub medium: TierConfig,
    pub large: TierConfig,
}

impl TierConfigs {
    pub fn get(&self, tier: Tier) -> TierConfig {
        match tier {
            Tier::Small => self.small,
            Tier::Medium => self.medium,
            Tier::Large => self.large,
        }
    }

    pub fn get_mut(&mut self, tier: Tier) -> &mut TierConfig {
        match tier {
            Tier::Small => &mut self.small,
            Tier::Medium => &mut self.medium,
            Tier::Large => &mut self.large,
        }
    }
}

impl Default for TierConfigs {
    fn default() -> Self {
        Self {
            small: TierConfig {
                threads: 6,
                max_workers: 4,
            },
            medium: TierConfig {
                threads: 4,
                max_workers: 6,
            },
            large: TierConfig {
                threads: 1,
                max_workers: 10,
            },
        }
    }
}

/// Which tiers may admit workers at a given moment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyConfig {
    /// All tiers in parallel, each under its own cap
    Concurrent,
    /// One tier at a time, LARGE then MEDIUM then SMALL
    Sequential,
    /// Tiers take turns under one global cap
    RoundRobin { max_concurrent_workers: Option<usize> },
}

impl fmt::Display for PolicyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyConfig::Concurrent => write!(f, "concurrent"),
            PolicyConfig::Sequential => write!(f, "sequential"),
            PolicyConfig::RoundRobin { .. } => write!(f, "round_robin"),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig::Concurrent
    }
}

fn default_threshold() -> f64 {
    20.0
}

fn default_cost_per_byte() -> f64 {
    1.0
}

/// Everything a simulation run is parameterized by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub tiers: TierConfigs,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// percent above the sibling mean for a thread to count as a straggler
    #[serde(default = "default_threshold")]
    pub straggler_threshold_percent: f64,
    #[serde(default = "default_cost_per_byte")]
    pub cost_per_byte: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tiers: Default::default(),
            policy: Default::default(),
            straggler_threshold_percent: default_threshold(),
            cost_per_byte: default_cost_per_byte(),
        }
    }
}

impl SimConfig {
    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.cost_per_byte)
    }

    /// Reject configurations that can not simulate the given subsets.
    /// Caps and thread counts only matter for tiers that actually have subsets.
    pub fn validate(&self, subsets: &[Subset]) -> Result<()> {
        if !(self.cost_per_byte.is_finite() && self.cost_per_byte > 0.0) {
            return Err(Error::invalid_config(format!(
                "cost_per_byte must be a positive number, got {}",
                self.cost_per_byte
            )));
        }
        if !self.straggler_threshold_percent.is_finite() {
            return Err(Error::invalid_config(format!(
                "straggler_threshold_percent must be finite, got {}",
                self.straggler_threshold_percent
            )));
        }
        if let PolicyConfig::RoundRobin { max_concurrent_workers } = self.policy {
            match max_concurrent_workers {
                None => {
                    return Err(Error::invalid_config(
                        "round_robin policy requires max_concurrent_workers",
                    ))
                }
                Some(0) => return Err(Error::invalid_config("max_concurrent_workers must be positive")),
                Some(_) => {}
            }
        }

        for tier in Tier::PRECEDENCE.iter().copied() {
            if !subsets.iter().any(|s| s.tier == tier) {
                continue;
            }
            let cfg = self.tiers.get(tier);
            if cfg.threads == 0 {
                return Err(Error::invalid_config(format!("{} tier needs at least one thread", tier)));
            }
            let per_tier_caps = !matches!(self.policy, PolicyConfig::RoundRobin { .. });
            if per_tier_caps && cfg.max_workers == 0 {
                return Err(Error::invalid_config(format!(
                    "{} tier needs max_workers of at least one",
                    tier
                )));
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
pub struct OutputDir(PathBuf);

impl OutputDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn file(&self, name: impl AsRef<Path>) -> Result<PathBuf> {
        fs::create_dir_all(&self.0)?;
        Ok(self.0.join(name))
    }
}

pub trait AppConfigExt {
    fn output_dir(&self) -> Result<OutputDir>;
    fn sim_config(&self) -> Result<SimConfig>;
}

impl AppConfigExt for AppConfig {
    fn output_dir(&self) -> Result<OutputDir> {
        self.get("output_dir")
    }

    fn sim_config(&self) -> Result<SimConfig> {
        self.get("sim")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkItem;

    fn one_of_each() -> Vec<Subset> {
        vec![
            Subset::new(1, Tier::Small, vec![WorkItem::new("a", 1)]),
            Subset::new(2, Tier::Large, vec![WorkItem::new("b", 1)]),
        ]
    }

    #[test]
    fn defaults_are_valid() {
        SimConfig::default().validate(&one_of_each()).unwrap();
    }

    #[test]
    fn zero_workers_only_matters_for_non_empty_tiers() {
        let mut cfg = SimConfig::default();
        cfg.tiers.medium.max_workers = 0;
        cfg.tiers.medium.threads = 0;
        cfg.validate(&one_of_each()).unwrap();

        cfg.tiers.small.max_workers = 0;
        assert!(matches!(cfg.validate(&one_of_each()), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn zero_threads_is_rejected() {
        let mut cfg = SimConfig::default();
        cfg.tiers.large.threads = 0;
        assert!(matches!(cfg.validate(&one_of_each()), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn round_robin_needs_a_global_cap() {
        let mut cfg = SimConfig {
            policy: PolicyConfig::RoundRobin {
                max_concurrent_workers: None,
            },
            ..Default::default()
        };
        assert!(matches!(cfg.validate(&[]), Err(Error::InvalidConfig(_))));

        cfg.policy = PolicyConfig::RoundRobin {
            max_concurrent_workers: Some(0),
        };
        assert!(matches!(cfg.validate(&[]), Err(Error::InvalidConfig(_))));

        // per-tier caps are ignored under a global cap
        cfg.policy = PolicyConfig::RoundRobin {
            max_concurrent_workers: Some(2),
        };
        cfg.tiers.small.max_workers = 0;
        cfg.validate(&one_of_each()).unwrap();
    }

    #[test]
    fn cost_must_be_positive() {
        let cfg = SimConfig {
            cost_per_byte: 0.0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(&[]), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn policy_names() {
        assert_eq!(PolicyConfig::Concurrent.to_string(), "concurrent");
        assert_eq!(
            PolicyConfig::RoundRobin {
                max_concurrent_workers: Some(1)
            }
            .to_string(),
            "round_robin"
        );
    }
}
