//! Broadcast complex valued data
use fanout::fanout::{broadcast, Destinations};
use fanout::traits::*;
use num_complex::Complex;
use tracing_subscriber::EnvFilter;

fn main() -> fanout::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let expected = [
        Complex::<f64>::new(1., -2.),
        Complex::<f64>::new(8., -4.),
        Complex::<f64>::new(3., -9.),
        Complex::<f64>::new(7., -5.),
    ];

    let universe = fanout::initialize_from_env()?;
    universe.run(|world| {
        let mut data = if world.rank() == 0 {
            expected
        } else {
            [Complex::<f64>::new(0., 0.); 4]
        };
        broadcast(world, &mut data, 0, &Destinations::all())?;
        assert_eq!(data, expected);
        Ok(())
    })?;
    Ok(())
}
