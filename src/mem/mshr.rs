use crate::mem::Stage;

/// One outstanding L2 miss being serviced by memory.
#[derive(Debug, Clone, Copy)]
pub struct MshrEntry {
    pub addr: u32,
    pub bank: usize,
    pub row: i32,
    pub stage: Stage,
    /// Set once the controller admits the request into bank service. Only
    /// scheduled entries are eligible for completion.
    pub scheduled: bool,
}

impl MshrEntry {
    pub fn new(addr: u32, bank: usize, row: i32, stage: Stage) -> Self {
        Self {
            addr,
            bank,
            row,
            stage,
            scheduled: false,
        }
    }
}

/// Fixed-capacity table of in-flight misses.
///
/// Completions free slots out of order relative to allocation, so a free
/// slot is found by scan and occupancy is the count of live entries, never a
/// high-water index. At most one entry exists per address.
#[derive(Debug)]
pub struct MshrTable {
    slots: Vec<Option<MshrEntry>>,
}

impl MshrTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn occupancy(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_some())
    }

    /// Finds the in-flight entry for `addr`, if any.
    pub fn lookup(&self, addr: u32) -> Option<&MshrEntry> {
        self.slots.iter().flatten().find(|entry| entry.addr == addr)
    }

    /// Claims any free slot for `entry`. Returns false when the table is
    /// full, leaving it unchanged.
    pub fn allocate(&mut self, entry: MshrEntry) -> bool {
        debug_assert!(self.lookup(entry.addr).is_none());
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(entry);
                true
            }
            None => false,
        }
    }

    /// Marks the entry for `addr` as admitted into bank service.
    pub fn mark_scheduled(&mut self, addr: u32) {
        if let Some(entry) = self
            .slots
            .iter_mut()
            .flatten()
            .find(|entry| entry.addr == addr)
        {
            entry.scheduled = true;
        }
    }

    /// Releases the entry for `addr`. Strictly a no-op returning false when
    /// no entry matches.
    pub fn free(&mut self, addr: u32) -> bool {
        match self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(entry) if entry.addr == addr))
        {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    /// Iterates the live entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &MshrEntry> {
        self.slots.iter().flatten()
    }
}
