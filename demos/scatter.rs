use fanout::fanout::{scatter, scatter_collective, SCATTER_ROOT};
use fanout::traits::*;
use tracing_subscriber::EnvFilter;

const SECTION: usize = 5;

fn main() -> fanout::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let universe = fanout::initialize_from_env()?;
    let data: Vec<u32> = (0..universe.size() as u32 * SECTION as u32).collect();

    let sections = universe.run(|world| {
        let send = if world.rank() == SCATTER_ROOT {
            Some(&data[..])
        } else {
            None
        };
        let mut mine = [0u32; SECTION];
        let mut native = [0u32; SECTION];
        scatter(world, send, SECTION, &mut mine)?;
        scatter_collective(world, send, SECTION, &mut native)?;
        assert_eq!(mine, native);
        Ok(mine)
    })?;

    for (rank, section) in sections.iter().enumerate() {
        println!("rank {}: {:?}", rank, section);
    }
    Ok(())
}
