use fanout::reduce::ring_sum;
use fanout::traits::*;
use tracing_subscriber::EnvFilter;

fn main() -> fanout::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let universe = fanout::initialize_from_env()?;
    let sums = universe.run(|world| {
        let value = 2i64.pow(world.rank() as u32 + 1);
        ring_sum(world, value)
    })?;

    let expected = (1i64 << (universe.size() + 1)) - 2;
    for (rank, sum) in sums.iter().enumerate() {
        println!("rank {}: sum {}", rank, sum);
        assert_eq!(*sum, expected);
    }
    Ok(())
}
