use serde::Deserialize;

use crate::sim::config::Config;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Sequential addresses walking forward by a fixed stride.
    Strided,
    /// Uniform random addresses within `[base, base + range)`.
    Random,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PatternSpec {
    pub kind: PatternKind,
    pub base: u32,
    pub stride: u32,
    pub range: u32,
}

impl Default for PatternSpec {
    fn default() -> Self {
        Self {
            kind: PatternKind::Strided,
            base: 0x0040_0000,
            stride: 4,
            range: 1 << 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficConfig {
    pub seed: u64,
    /// Instruction-side address stream: sequential pcs by default.
    pub fetch: PatternSpec,
    /// Data-side address stream: random within a 1 MiB window by default.
    pub mem: PatternSpec,
}

impl Config for TrafficConfig {}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            fetch: PatternSpec::default(),
            mem: PatternSpec {
                kind: PatternKind::Random,
                base: 0x1000_0000,
                stride: 4,
                range: 1 << 20,
            },
        }
    }
}
