use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use config::{Environment, Source};
use lazy_static::lazy_static;

use super::error::Result;

static DEFAULT_CONFIG: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/resources/default_config.toml"));

/// A new type to impl `config::Source`
#[derive(Debug, Clone, serde::Deserialize)]
struct Preset(HashMap<String, config::Value>);

impl config::Source for Preset {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> std::result::Result<HashMap<String, config::Value>, config::ConfigError> {
        let mut kv = self.0.clone();
        // make sure it's not getting endlessly recursive
        kv.remove("presets");
        Ok(kv)
    }
}

/// The main structure holding application config
pub struct AppConfig(config::Config);

impl AppConfig {
    fn new() -> Self {
        // Start with empty
        Self(config::Config::new())
    }

    pub fn setup(&mut self) -> Result<&mut Self> {
        // Merge with default config
        self.0
            .merge(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))?;

        // Merge settings with env variables, e.g. TIERSIM_SIM__COST_PER_BYTE
        self.0
            .merge(Environment::with_prefix("TIERSIM").separator("__"))?;

        Ok(self)
    }

    /// Load config from a file
    pub fn use_file(&mut self, path: &Path) -> Result<&mut Self> {
        self.0.merge(config::File::from(path))?;
        Ok(self)
    }

    /// Load preset
    pub fn use_preset(&mut self, name: &str) -> Result<&mut Self> {
        let preset: Preset = self.get(format!("presets.{}", name))?;
        self.0.merge(preset)?;
        Ok(self)
    }

    /// Override a single value, used by command line flags
    pub fn set<T>(&mut self, key: &str, value: T) -> Result<&mut Self>
    where
        T: Into<config::Value>,
    {
        self.0.set(key, value)?;
        Ok(self)
    }

    /// Get a single value and deserialize to the given type
    pub fn get<T, K>(&self, key: K) -> Result<T>
    where
        // use DeserializeOwned, because we are reading CONFIG using RWLock
        // and the lock is released before returning. So T should not borrow
        // anything from CONFIG.
        T: serde::de::DeserializeOwned,
        K: AsRef<str>,
    {
        Ok(self.0.get(key.as_ref())?)
    }

    /// Deserialize the whole config to the given type
    pub fn fetch<T>(&self) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let t = self.0.clone().try_into()?;
        Ok(t)
    }
}

lazy_static! {
    /// global AppConfig instance
    static ref CONFIG: RwLock<AppConfig> = RwLock::new(AppConfig::new());
}

pub fn setup() -> Result<()> {
    config_mut().setup()?;
    Ok(())
}

/// global AppConfig instance
pub fn config() -> RwLockReadGuard<'static, AppConfig> {
    CONFIG.read().unwrap()
}

/// mutable global AppConfig instance
pub fn config_mut() -> RwLockWriteGuard<'static, AppConfig> {
    CONFIG.write().unwrap()
}

pub mod prelude {
    pub use super::{config, config_mut};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PolicyConfig, SimConfig};

    fn test_config() -> AppConfig {
        let mut config = AppConfig::new();
        config.setup().unwrap();
        config
            .use_file(Path::new(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/resources/test_config.toml"
            )))
            .unwrap();

        config
    }

    #[test]
    fn fetch_sim_config() {
        let config = test_config();

        let sim: SimConfig = config.get("sim").unwrap();

        assert_eq!(sim.tiers.small.threads, 2);
        assert_eq!(sim.tiers.small.max_workers, 1);
        // untouched by the test file
        assert_eq!(sim.tiers.large.max_workers, 10);
        assert!(matches!(sim.policy, PolicyConfig::Concurrent));
    }

    #[test]
    fn verify_get() {
        let config = test_config();

        let threshold: f64 = config.get("sim.straggler_threshold_percent").unwrap();
        let cost: f64 = config.get("sim.cost_per_byte").unwrap();

        assert!((threshold - 50.0).abs() < f64::EPSILON);
        assert!((cost - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn preset() {
        let mut config = test_config();

        let sim: SimConfig = config.get("sim").unwrap();
        assert!(matches!(sim.policy, PolicyConfig::Concurrent));

        config.use_preset("capped").unwrap();
        let sim: SimConfig = config.get("sim").unwrap();
        assert!(matches!(
            sim.policy,
            PolicyConfig::RoundRobin {
                max_concurrent_workers: Some(3)
            }
        ));
    }

    #[test]
    fn set_overrides() {
        let mut config = test_config();
        config.set("sim.cost_per_byte", 0.5).unwrap();

        let cost: f64 = config.get("sim.cost_per_byte").unwrap();
        assert!((cost - 0.5).abs() < f64::EPSILON);
    }
}
