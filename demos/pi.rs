//! Midpoint rule for the integral of 4 / (1 + x^2) over [0, 1], split across ranks, with the
//! partial sums collected under each reduction policy.
use std::time::Instant;

use fanout::partition::block_range;
use fanout::reduce::{ordered_sum, ReductionPolicy};
use fanout::traits::*;
use tracing_subscriber::EnvFilter;

const N: usize = 1_000_000;
const REPEAT: usize = 20;

fn partial_sum(rank: fanout::Rank, size: fanout::Rank) -> f64 {
    block_range(N, rank, size)
        .map(|i| {
            let x = (i as f64 + 0.5) / N as f64;
            1.0 / (1.0 + x * x)
        })
        .sum()
}

fn main() -> fanout::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let universe = fanout::initialize_from_env()?;
    for policy in [
        ReductionPolicy::RankAddressed,
        ReductionPolicy::WildcardSorted,
        ReductionPolicy::TagAddressed,
    ] {
        let start = Instant::now();
        let estimates = universe.run(|world| {
            let (rank, size) = world.rank_and_size();
            let mut estimate = None;
            for _ in 0..REPEAT {
                estimate = ordered_sum(world, 0, partial_sum(rank, size), policy)?
                    .map(|sum| sum * 4.0 / N as f64);
            }
            Ok(estimate)
        })?;
        if let Some(pi) = estimates[0] {
            println!(
                "{:?}: pi ~ {:.12} (error {:.3e}) in {:?}",
                policy,
                pi,
                (pi - std::f64::consts::PI).abs(),
                start.elapsed() / REPEAT as u32
            );
        }
    }
    Ok(())
}
