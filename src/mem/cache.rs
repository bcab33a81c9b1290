use anyhow::Result;

use crate::mem::config::CacheGeometry;

/// Set-associative tag array with move-to-front LRU.
///
/// Each set keeps its tags ordered by recency: slot 0 holds the most
/// recently used line and the last slot is the eviction victim. Valid tags
/// within a set are pairwise distinct.
#[derive(Debug)]
pub struct SetAssocCache {
    sets: usize,
    ways: usize,
    block_bits: u32,
    tags: Vec<Vec<Option<u32>>>,
}

impl SetAssocCache {
    pub fn new(geometry: CacheGeometry) -> Result<Self> {
        geometry.validate()?;
        Ok(Self {
            sets: geometry.sets,
            ways: geometry.ways,
            block_bits: geometry.block_bits(),
            tags: vec![vec![None; geometry.ways]; geometry.sets],
        })
    }

    fn index(&self, addr: u32) -> (usize, u32) {
        let block = addr >> self.block_bits;
        let set = (block as usize) & (self.sets - 1);
        (set, block)
    }

    /// Looks up `addr` and promotes the line to MRU on a hit. A miss leaves
    /// the array untouched.
    pub fn probe(&mut self, addr: u32) -> bool {
        let (set_idx, block) = self.index(addr);
        let set = &mut self.tags[set_idx];
        if let Some(slot) = set.iter().position(|tag| *tag == Some(block)) {
            set[..=slot].rotate_right(1);
            return true;
        }
        false
    }

    /// Installs or touches the line for `addr`, returning whether it was
    /// already resident. A fill lands in an empty slot if the set has one;
    /// otherwise the LRU occupant is dropped. No write-back state is
    /// modeled.
    pub fn update(&mut self, addr: u32) -> bool {
        let (set_idx, block) = self.index(addr);
        let set = &mut self.tags[set_idx];
        if let Some(slot) = set.iter().position(|tag| *tag == Some(block)) {
            set[..=slot].rotate_right(1);
            return true;
        }
        let victim = set
            .iter()
            .position(|tag| tag.is_none())
            .unwrap_or(self.ways - 1);
        set[..=victim].rotate_right(1);
        set[0] = Some(block);
        false
    }

    /// Read-only residency check; does not touch recency order.
    pub fn contains(&self, addr: u32) -> bool {
        let (set_idx, block) = self.index(addr);
        self.tags[set_idx].iter().any(|tag| *tag == Some(block))
    }
}
