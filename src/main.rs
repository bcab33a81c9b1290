use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use toml::Table;

use memflow::mem::config::MemConfig;
use memflow::sim::config::{Config, SimConfig};
use memflow::sim::top::Sim;
use memflow::traffic::TrafficConfig;

#[derive(Parser)]
#[command(version, about)]
struct MemflowArgs {
    #[arg(help = "Path to config.toml; defaults apply when omitted")]
    config_path: Option<PathBuf>,
    #[arg(long, help = "Override number of cycles to simulate")]
    cycles: Option<u64>,
    #[arg(long, help = "Override L2 set count")]
    sets: Option<usize>,
    #[arg(long, help = "Override L2 associativity")]
    ways: Option<usize>,
    #[arg(long, help = "Override L2 block size in bytes")]
    block: Option<usize>,
    #[arg(long, help = "Override number of DRAM banks")]
    banks: Option<usize>,
    #[arg(long, help = "Override traffic seed")]
    seed: Option<u64>,
}

pub fn main() -> Result<()> {
    env_logger::init();

    let argv = MemflowArgs::parse();
    let config_table: Table = match &argv.config_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&text).context("cannot parse config toml")?
        }
        None => Table::new(),
    };

    let mut sim_config = SimConfig::from_section(config_table.get("sim"));
    let mut mem_config = MemConfig::from_section(config_table.get("mem"));
    let mut traffic_config = TrafficConfig::from_section(config_table.get("traffic"));

    // override toml configs with argv
    sim_config.cycles = argv.cycles.unwrap_or(sim_config.cycles);
    mem_config.l2.sets = argv.sets.unwrap_or(mem_config.l2.sets);
    mem_config.l2.ways = argv.ways.unwrap_or(mem_config.l2.ways);
    mem_config.l2.block_bytes = argv.block.unwrap_or(mem_config.l2.block_bytes);
    mem_config.banks = argv.banks.unwrap_or(mem_config.banks);
    traffic_config.seed = argv.seed.unwrap_or(traffic_config.seed);

    let mut sim = Sim::new(&sim_config, &mem_config, &traffic_config)?;
    let summary = sim.run();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
