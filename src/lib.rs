/*
Cycle-level timing model of a two-level memory subsystem.

The `mem` module holds the core: a set-associative L2 tag array, a table of
outstanding-miss trackers (MSHRs), and a DRAM memory controller that
arbitrates banks and buses with row-buffer-aware latency.  Given an address
that missed in an (external) L1 cache it answers how many cycles the pipeline
should stall, and installs the fetched block into L2 once service completes.

`sim` drives the subsystem cycle by cycle under the resolve-then-tick
contract, `traffic` generates the miss address streams, and `bp` is the
gshare/BTB branch predictor that lives at the boundary of the surrounding
pipeline simulator.
*/

pub mod bp;
pub mod mem;
pub mod sim;
pub mod traffic;
