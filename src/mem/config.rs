use anyhow::{ensure, Result};
use serde::Deserialize;

use crate::mem::Cycle;
use crate::sim::config::Config;

/// Geometry of one set-associative cache. All three fields must be powers
/// of two; constructors reject anything else instead of masking it away.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct CacheGeometry {
    pub sets: usize,
    pub ways: usize,
    pub block_bytes: usize,
}

impl Default for CacheGeometry {
    fn default() -> Self {
        Self {
            sets: 256,
            ways: 8,
            block_bytes: 32,
        }
    }
}

impl CacheGeometry {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.sets.is_power_of_two(),
            "cache sets must be a power of two, got {}",
            self.sets
        );
        ensure!(
            self.ways.is_power_of_two(),
            "cache ways must be a power of two, got {}",
            self.ways
        );
        ensure!(
            self.block_bytes.is_power_of_two(),
            "cache block size must be a power of two, got {}",
            self.block_bytes
        );
        Ok(())
    }

    pub fn block_bits(&self) -> u32 {
        self.block_bytes.trailing_zeros()
    }
}

/// Bank and bus occupancies applied when a request enters service, keyed by
/// its row-buffer status.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct DramTimings {
    pub closed_bank_busy: i32,
    pub closed_data_hold: u32,
    pub hit_bank_busy: i32,
    pub hit_data_hold: u32,
    pub conflict_bank_busy: i32,
    pub conflict_data_hold: u32,
    pub command_hold: u32,
}

impl Default for DramTimings {
    fn default() -> Self {
        Self {
            closed_bank_busy: 249,
            closed_data_hold: 200,
            hit_bank_busy: 149,
            hit_data_hold: 100,
            conflict_bank_busy: 349,
            conflict_data_hold: 300,
            command_hold: 4,
        }
    }
}

impl DramTimings {
    pub fn validate(&self) -> Result<()> {
        // a non-positive bank occupancy would skip the countdown states the
        // scheduler and resolver key off of (busy > 0, 0, -1)
        for (name, busy) in [
            ("closed_bank_busy", self.closed_bank_busy),
            ("hit_bank_busy", self.hit_bank_busy),
            ("conflict_bank_busy", self.conflict_bank_busy),
        ] {
            ensure!(busy > 0, "{name} must be positive, got {busy}");
        }
        for (name, hold) in [
            ("closed_data_hold", self.closed_data_hold),
            ("hit_data_hold", self.hit_data_hold),
            ("conflict_data_hold", self.conflict_data_hold),
        ] {
            ensure!(hold > 0, "{name} must be nonzero");
        }
        Ok(())
    }
}

/// Fixed latencies reported by the L2 coordinator.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct LatencyConfig {
    /// Stall for an L2 hit.
    pub l2_hit: Cycle,
    /// Stall returned when a miss is admitted; covers the cycles before the
    /// controller can act on the new request.
    pub miss_initiate: Cycle,
    /// Added to the servicing bank's remaining countdown when a second miss
    /// coalesces onto an in-flight entry.
    pub coalesce_adjust: i64,
    /// Stall handed back when the miss tracker is full; the caller retries
    /// after this many cycles.
    pub mshr_retry: Cycle,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            l2_hit: 15,
            miss_initiate: 10,
            coalesce_adjust: 9,
            mshr_retry: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemConfig {
    pub l2: CacheGeometry,
    pub banks: usize,
    pub mshr_entries: usize,
    pub timings: DramTimings,
    pub latency: LatencyConfig,
}

impl Config for MemConfig {}

impl Default for MemConfig {
    fn default() -> Self {
        Self {
            l2: CacheGeometry::default(),
            banks: 8,
            mshr_entries: 16,
            timings: DramTimings::default(),
            latency: LatencyConfig::default(),
        }
    }
}

impl MemConfig {
    pub fn validate(&self) -> Result<()> {
        self.l2.validate()?;
        self.timings.validate()?;
        ensure!(
            self.banks.is_power_of_two(),
            "bank count must be a power of two, got {}",
            self.banks
        );
        ensure!(self.mshr_entries > 0, "mshr_entries must be > 0");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheGeometry, MemConfig};

    #[test]
    fn default_config_is_valid() {
        assert!(MemConfig::default().validate().is_ok());
    }

    #[test]
    fn non_power_of_two_geometry_rejected() {
        let bad = CacheGeometry {
            sets: 3,
            ways: 4,
            block_bytes: 32,
        };
        assert!(bad.validate().is_err());
        let bad = CacheGeometry {
            sets: 4,
            ways: 6,
            block_bytes: 32,
        };
        assert!(bad.validate().is_err());
        let bad = CacheGeometry {
            sets: 4,
            ways: 4,
            block_bytes: 48,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn non_power_of_two_banks_rejected() {
        let config = MemConfig {
            banks: 6,
            ..MemConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_bank_busy_rejected() {
        let mut config = MemConfig::default();
        config.timings.hit_bank_busy = 0;
        assert!(config.validate().is_err());
        config.timings.hit_bank_busy = -149;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_data_bus_hold_rejected() {
        let mut config = MemConfig::default();
        config.timings.closed_data_hold = 0;
        assert!(config.validate().is_err());
    }
}
