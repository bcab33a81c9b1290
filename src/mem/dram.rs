use std::collections::VecDeque;

use log::debug;
use serde::Serialize;

use crate::mem::config::DramTimings;
use crate::mem::{Cycle, Stage};

/// How a request relates to its bank's open row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowBufferStatus {
    /// No row open in the bank.
    Closed,
    /// The open row matches the request.
    Hit,
    /// A different row is open and must be closed first.
    Conflict,
}

impl RowBufferStatus {
    fn bank_busy(self, timings: &DramTimings) -> i32 {
        match self {
            Self::Closed => timings.closed_bank_busy,
            Self::Hit => timings.hit_bank_busy,
            Self::Conflict => timings.conflict_bank_busy,
        }
    }

    fn data_bus_hold(self, timings: &DramTimings) -> u32 {
        match self {
            Self::Closed => timings.closed_data_hold,
            Self::Hit => timings.hit_data_hold,
            Self::Conflict => timings.conflict_data_hold,
        }
    }
}

/// A DRAM access waiting in the pending FIFO for its bank and buses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub addr: u32,
    pub bank: usize,
    pub row: i32,
    pub stage: Stage,
}

impl Request {
    /// Splits a miss address into bank and row fields. The bank index
    /// starts at bit 5 and the mask widens with the bank count; the row is
    /// the upper address half.
    pub fn parse(addr: u32, stage: Stage, banks: usize) -> Self {
        Self {
            addr,
            bank: ((addr >> 5) as usize) & (banks - 1),
            row: ((addr >> 16) & 0xFFFF) as i32,
            stage,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DramBank {
    /// Cycles of service remaining. -1 is idle; 0 means service just
    /// finished and the fill has not happened yet, which is not idle.
    pub busy: i32,
    /// Row left open by the last access, or -1. Stays open across
    /// completions until a conflicting access replaces it.
    pub active_row: i32,
}

impl Default for DramBank {
    fn default() -> Self {
        Self {
            busy: -1,
            active_row: -1,
        }
    }
}

/// Stall cycles owed to each pipeline stage after one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StallReport {
    pub fetch: Cycle,
    pub mem: Cycle,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DramStats {
    pub scheduled: u64,
    pub row_closed: u64,
    pub row_hits: u64,
    pub row_conflicts: u64,
    /// Cycles where requests were pending but none could be admitted.
    pub starved_cycles: u64,
}

/// Bank array, command/data buses, and the pending-request FIFO.
#[derive(Debug)]
pub struct DramController {
    banks: Vec<DramBank>,
    /// Cycles until the command bus is free; 0 is free.
    command_bus_busy: u32,
    /// Cycles until the data bus is free; 0 is free.
    data_bus_busy: u32,
    pending: VecDeque<Request>,
    timings: DramTimings,
    last_scheduled: Option<Request>,
    stats: DramStats,
}

impl DramController {
    pub fn new(banks: usize, timings: DramTimings) -> Self {
        Self {
            banks: vec![DramBank::default(); banks],
            command_bus_busy: 0,
            data_bus_busy: 0,
            pending: VecDeque::new(),
            timings,
            last_scheduled: None,
            stats: DramStats::default(),
        }
    }

    pub fn bank(&self, index: usize) -> &DramBank {
        &self.banks[index]
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> DramStats {
        self.stats
    }

    /// Appends a request to the pending FIFO; arrival order is the only
    /// ordering key besides row-buffer status.
    pub fn enqueue(&mut self, request: Request) {
        debug!("arrival bank{} row{}", request.bank, request.row);
        self.pending.push_back(request);
    }

    /// Classifies `request` against its bank's open row. Pure in the bank
    /// state and the requested row.
    pub fn row_buffer_status(&self, request: &Request) -> RowBufferStatus {
        let bank = &self.banks[request.bank];
        if bank.active_row < 0 {
            RowBufferStatus::Closed
        } else if bank.active_row == request.row {
            RowBufferStatus::Hit
        } else {
            RowBufferStatus::Conflict
        }
    }

    /// A request can enter service only when its bank is idle, the command
    /// bus is free this cycle, and the data bus will have drained before
    /// this request needs it.
    fn schedulable(&self, request: &Request) -> bool {
        if self.banks[request.bank].busy >= 0 {
            return false;
        }
        if self.command_bus_busy > 0 {
            return false;
        }
        let hold = self.row_buffer_status(request).data_bus_hold(&self.timings);
        self.data_bus_busy < hold
    }

    /// Returns a bank whose service just finished (`busy == 0`) to idle.
    /// The row buffer stays open.
    pub fn retire_bank(&mut self, index: usize) {
        debug_assert_eq!(self.banks[index].busy, 0);
        self.banks[index].busy = -1;
    }

    /// The request admitted by the most recent `tick`, if any.
    pub fn take_scheduled(&mut self) -> Option<Request> {
        self.last_scheduled.take()
    }

    /// Advances bank and bus timers one cycle, then admits at most one
    /// pending request into service. Must run after completions for the
    /// cycle have been resolved, so a vacated bank is reusable immediately.
    pub fn tick(&mut self) -> StallReport {
        for bank in &mut self.banks {
            if bank.busy > 0 {
                bank.busy -= 1;
            }
        }
        if self.command_bus_busy > 0 {
            self.command_bus_busy -= 1;
        }
        if self.data_bus_busy > 0 {
            self.data_bus_busy -= 1;
        }
        self.last_scheduled = None;

        if self.pending.is_empty() {
            return StallReport::default();
        }

        // Snapshot of queue positions that could go this cycle, in arrival
        // order. The chosen one is removed from the FIFO afterwards; never
        // shrink the queue while scanning it.
        let ready: Vec<usize> = (0..self.pending.len())
            .filter(|&idx| self.schedulable(&self.pending[idx]))
            .collect();

        if ready.is_empty() {
            self.stats.starved_cycles += 1;
            return StallReport { fetch: 1, mem: 1 };
        }

        // Prefer the earliest row-buffer hit; otherwise the earliest
        // arrival among the ready set.
        let chosen = ready
            .iter()
            .copied()
            .find(|&idx| self.row_buffer_status(&self.pending[idx]) == RowBufferStatus::Hit)
            .unwrap_or(ready[0]);
        let request = self
            .pending
            .remove(chosen)
            .expect("snapshot index in range");
        let busy = self.schedule(request);

        let mut report = StallReport::default();
        match request.stage {
            Stage::Fetch => report.fetch = busy,
            Stage::Mem => report.mem = busy,
        }
        report
    }

    /// Assigns the bank and both buses to `request` and opens its row.
    fn schedule(&mut self, request: Request) -> Cycle {
        let status = self.row_buffer_status(&request);
        let busy = status.bank_busy(&self.timings);
        debug!(
            "scheduled bank{} row{} ({:?}, {} cycles)",
            request.bank, request.row, status, busy
        );

        let bank = &mut self.banks[request.bank];
        bank.busy = busy;
        bank.active_row = request.row;
        self.data_bus_busy = status.data_bus_hold(&self.timings);
        self.command_bus_busy = self.timings.command_hold;

        self.stats.scheduled += 1;
        match status {
            RowBufferStatus::Closed => self.stats.row_closed += 1,
            RowBufferStatus::Hit => self.stats.row_hits += 1,
            RowBufferStatus::Conflict => self.stats.row_conflicts += 1,
        }
        self.last_scheduled = Some(request);
        busy as Cycle
    }
}
