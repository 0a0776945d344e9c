//! Broadcast to every other rank, once with point to point messages and once through a
//! sub-communicator and the native broadcast.
use std::time::{Duration, Instant};

use fanout::fanout::{broadcast, broadcast_collective, Destinations};
use fanout::traits::*;
use tracing_subscriber::EnvFilter;

const REPEAT: u32 = 200;
const LEN: usize = 1024;

fn main() -> fanout::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let universe = fanout::initialize_from_env()?;
    let destinations: Destinations = (1..universe.size()).step_by(2).collect();
    println!("source 0, destinations {}", destinations);

    for collective in [false, true] {
        let elapsed = universe.run(|world| {
            let mut buf = vec![0.0f64; LEN];
            if world.rank() == 0 {
                buf.iter_mut().enumerate().for_each(|(i, x)| *x = i as f64);
            }
            world.barrier()?;
            let start = Instant::now();
            for _ in 0..REPEAT {
                if collective {
                    broadcast_collective(world, &mut buf, 0, &destinations)?;
                } else {
                    broadcast(world, &mut buf, 0, &destinations)?;
                }
            }
            world.barrier()?;
            let received = destinations.contains(world.rank(), 0);
            assert_eq!(buf[LEN - 1] != 0.0, received || world.rank() == 0);
            Ok(start.elapsed())
        })?;
        let slowest = elapsed.into_iter().max().unwrap_or(Duration::ZERO);
        println!(
            "{}: {:?} per broadcast",
            if collective { "collective" } else { "fan-out" },
            slowest / REPEAT
        );
    }
    Ok(())
}
