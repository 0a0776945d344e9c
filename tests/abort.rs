use std::time::Duration;

use fanout::fanout::{broadcast_collective, scatter, Destinations};
use fanout::traits::*;
use fanout::{Error, ErrorKind, Universe, UniverseConfig};

#[test]
fn failure_before_a_collective_releases_the_others() {
    let universe = fanout::initialize(4).unwrap();
    let result = universe.run(|world| {
        if world.rank() == 3 {
            return Err(Error::InvalidConfig {
                key: "input",
                value: String::from("missing"),
            });
        }
        let mut buf = [0u16; 4];
        broadcast_collective(world, &mut buf, 0, &Destinations::ranks(&[1, 2]))
    });
    let error = result.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Configuration);
    assert!(matches!(error, Error::InvalidConfig { key: "input", .. }));
}

#[test]
fn rank_missing_from_a_barrier_times_out() {
    let config = UniverseConfig::new(3).receive_timeout(Duration::from_millis(100));
    let result = Universe::new(config).unwrap().run(|world| {
        if world.rank() != 2 {
            world.barrier()?;
        }
        Ok(())
    });
    let error = result.unwrap_err();
    assert!(matches!(error, Error::Timeout { .. }), "{error}");
    assert_eq!(error.kind(), ErrorKind::Substrate);
}

#[test]
fn panic_in_a_scatter_aborts_the_universe() {
    let universe = fanout::initialize(3).unwrap();
    let result = universe.run(|world| {
        if world.rank() == 0 {
            panic!("no data");
        }
        let mut recv = [0u32; 2];
        scatter(world, None, 2, &mut recv)
    });
    assert_eq!(
        result,
        Err(Error::RankPanicked {
            rank: 0,
            message: String::from("no data")
        })
    );
}
