use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::Value;

use crate::mem::config::CacheGeometry;

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Self {
        match section {
            Some(value) => value.clone().try_into().expect("cannot deserialize config"),
            None => {
                warn!("config section not found");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    /// Number of cycles to simulate.
    pub cycles: u64,
    /// Geometry of the per-stage L1 caches held by the driver.
    pub l1: CacheGeometry,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            cycles: 100_000,
            l1: CacheGeometry {
                sets: 64,
                ways: 4,
                block_bytes: 32,
            },
        }
    }
}
