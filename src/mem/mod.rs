pub mod cache;
pub mod config;
pub mod dram;
pub mod hierarchy;
pub mod mshr;

pub use cache::SetAssocCache;
pub use config::{CacheGeometry, DramTimings, LatencyConfig, MemConfig};
pub use dram::{DramController, DramStats, Request, RowBufferStatus, StallReport};
pub use hierarchy::{MemStats, MemSubsystem};
pub use mshr::{MshrEntry, MshrTable};

pub type Cycle = u64;

/// Which pipeline stage produced a memory request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Mem,
}
