use anyhow::{ensure, Result};

/// What the predictor believes about the instruction at a pc.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Prediction {
    pub is_branch: bool,
    pub is_conditional: bool,
    pub taken: bool,
    pub target: u32,
}

#[derive(Debug, Clone, Copy)]
struct BtbEntry {
    tag: u32,
    target: u32,
    conditional: bool,
}

/// gshare direction predictor backed by a branch-target buffer.
///
/// The BTB is indexed by the low bits of `pc / 4` and tagged by the full pc.
/// Direction comes from a table of 2-bit saturating counters indexed by the
/// pc XORed with the global history register; counters at 2 or above predict
/// taken. Unconditional BTB hits always predict taken.
#[derive(Debug)]
pub struct BranchPredictor {
    ghr_bits: u32,
    ghr: u32,
    pht: Vec<u8>,
    btb: Vec<Option<BtbEntry>>,
}

impl BranchPredictor {
    pub fn new(ghr_bits: u32, btb_entries: usize) -> Result<Self> {
        ensure!(
            ghr_bits >= 1 && ghr_bits <= 24,
            "ghr_bits must be in 1..=24, got {ghr_bits}"
        );
        ensure!(
            btb_entries.is_power_of_two(),
            "btb_entries must be a power of two, got {btb_entries}"
        );
        Ok(Self {
            ghr_bits,
            ghr: 0,
            pht: vec![0; 1 << ghr_bits],
            btb: vec![None; btb_entries],
        })
    }

    fn btb_index(&self, pc: u32) -> usize {
        ((pc >> 2) as usize) & (self.btb.len() - 1)
    }

    fn pht_index(&self, pc: u32) -> usize {
        let mask = (1 << self.ghr_bits) - 1;
        (((pc >> 2) & mask) ^ (self.ghr & mask)) as usize
    }

    pub fn predict(&self, pc: u32) -> Prediction {
        let mut prediction = Prediction::default();
        if let Some(entry) = self.btb[self.btb_index(pc)] {
            if entry.tag == pc {
                prediction.is_branch = true;
                prediction.is_conditional = entry.conditional;
                prediction.target = entry.target;
            }
        }
        if prediction.is_branch && prediction.is_conditional {
            prediction.taken = self.pht[self.pht_index(pc)] >= 2;
        } else if prediction.is_branch {
            prediction.taken = true;
        }
        prediction
    }

    /// Trains the predictor with a resolved instruction. Non-branches clear
    /// any stale BTB entry aliasing this pc; the direction tables move only
    /// for resolved conditional branches.
    pub fn update(&mut self, pc: u32, is_branch: bool, is_conditional: bool, taken: bool, target: u32) {
        let idx = self.btb_index(pc);
        if is_branch {
            self.btb[idx] = Some(BtbEntry {
                tag: pc,
                target,
                conditional: is_conditional,
            });
        } else {
            self.btb[idx] = None;
        }

        if is_branch && is_conditional {
            let pht_idx = self.pht_index(pc);
            let counter = &mut self.pht[pht_idx];
            if taken {
                *counter = (*counter + 1).min(3);
            } else {
                *counter = counter.saturating_sub(1);
            }
            let mask = (1 << self.ghr_bits) - 1;
            self.ghr = ((self.ghr << 1) | u32::from(taken)) & mask;
        }
    }
}
