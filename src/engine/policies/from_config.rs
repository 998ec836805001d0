use super::*;
use crate::config::PolicyConfig;
use crate::utils::prelude::*;

pub fn from_config(cfg: &PolicyConfig) -> Result<Box<dyn Policy + 'static>> {
    info!(policy = %cfg, "using");
    Ok(match cfg {
        PolicyConfig::Concurrent => Box::new(Concurrent),
        PolicyConfig::Sequential => Box::new(Sequential),
        PolicyConfig::RoundRobin {
            max_concurrent_workers: Some(max),
        } if *max > 0 => Box::new(RoundRobin::new(*max)),
        PolicyConfig::RoundRobin { .. } => {
            return Err(Error::invalid_config(
                "round_robin policy requires a positive max_concurrent_workers",
            ))
        }
    })
}
