use fanout::traits::*;
use tracing_subscriber::EnvFilter;

fn main() -> fanout::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let universe = fanout::initialize_from_env()?;
    universe.run(|world| {
        println!(
            "Hello parallel world from process {} of {}!",
            world.rank(),
            world.size()
        );
        Ok(())
    })?;
    Ok(())
}
