use std::num::NonZeroU64;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::info;

use lockstep::{logging, run_rounds, FixedRounds, RoundOutput, RoundPool, RoundPoolConfig};
use lockstep::{Work, WorkResult, WorkerId};

const WORKERS: usize = 4;
const ROUNDS: u64 = 8;

// Stand-in for one accelerator round trip: a transmit and a receive counter
#[derive(Debug, Default, Clone)]
struct Counters {
    data1: u64,
    data2: u64,
}

struct TransferWork;

impl Work for TransferWork {
    type Item = Counters;

    fn execute(&self, worker: WorkerId, item: &mut Counters) -> WorkResult {
        info!(%worker, "Processing data");
        item.data1 += 1;
        item.data2 += 1;
        info!(%worker, "Completed processing");
        Ok(())
    }

    fn on_worker_start(&self, worker: WorkerId) {
        info!(%worker, "Worker started");
    }
}

fn report(output: &RoundOutput<Counters>) {
    for slot in &output.slots {
        println!(
            "Round {} - {}: data1 = {}, data2 = {}",
            output.round, slot.worker, slot.item.data1, slot.item.data2
        );
    }
}

fn main() -> Result<()> {
    logging::init_development();

    let config = RoundPoolConfig::with_pool_size(WORKERS).round_timeout(Duration::from_secs(5));
    let pool = RoundPool::with_config(config, TransferWork)?;
    info!(workers = pool.size(), "Got callback from accelerator, dispatching rounds");

    let rounds = NonZeroU64::new(ROUNDS).ok_or_else(|| anyhow!("round count must be positive"))?;
    let mut policy = FixedRounds::new(rounds, vec![Counters::default(); WORKERS]).inspect(report);

    let summary = run_rounds(pool, &mut policy)?;
    report(&summary.final_output);

    info!(rounds = summary.rounds, "All workers stopped");
    Ok(())
}
