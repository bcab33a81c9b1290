pub mod config;

pub use config::{PatternKind, PatternSpec, TrafficConfig};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic generator of word-aligned access addresses, standing in
/// for the pipeline stages that would normally produce the miss stream.
#[derive(Debug)]
pub struct AddressStream {
    spec: PatternSpec,
    rng: StdRng,
    cursor: u32,
}

impl AddressStream {
    pub fn new(spec: PatternSpec, seed: u64) -> Self {
        Self {
            spec,
            rng: StdRng::seed_from_u64(seed),
            cursor: 0,
        }
    }

    pub fn next_addr(&mut self) -> u32 {
        match self.spec.kind {
            PatternKind::Strided => {
                let addr = self.spec.base.wrapping_add(self.cursor);
                self.cursor = self.cursor.wrapping_add(self.spec.stride);
                addr
            }
            PatternKind::Random => {
                let range = self.spec.range.max(4);
                let offset = self.rng.gen_range(0..range) & !3;
                self.spec.base.wrapping_add(offset)
            }
        }
    }
}
