use std::time::Duration;

use fanout::fanout::{broadcast, broadcast_collective, Destinations, TERMINATOR};
use fanout::traits::*;
use fanout::{Error, Rank, Universe, UniverseConfig};
use proptest::prelude::*;

fn universe(size: usize) -> Universe {
    Universe::new(UniverseConfig::new(size).receive_timeout(Duration::from_secs(20))).unwrap()
}

fn initial(rank: Rank) -> [f64; 3] {
    let r = f64::from(rank);
    [r + 0.1, -r, 1.0 / (r + 3.0)]
}

fn run_broadcast(size: usize, src: Rank, destinations: &Destinations, collective: bool) -> Vec<[f64; 3]> {
    universe(size)
        .run(|world| {
            let mut buf = initial(world.rank());
            if collective {
                broadcast_collective(world, &mut buf, src, destinations)?;
            } else {
                broadcast(world, &mut buf, src, destinations)?;
            }
            Ok(buf)
        })
        .unwrap()
}

#[test]
fn broadcast_to_all_ranks() {
    for collective in [false, true] {
        let values = run_broadcast(5, 3, &Destinations::all(), collective);
        assert_eq!(values, vec![initial(3); 5]);
    }
}

#[test]
fn subset_broadcast_leaves_other_ranks_alone() {
    for collective in [false, true] {
        let values = run_broadcast(6, 1, &Destinations::ranks(&[4, 0]), collective);
        assert_eq!(values[0], initial(1));
        assert_eq!(values[1], initial(1));
        assert_eq!(values[4], initial(1));
        for rank in [2, 3, 5] {
            assert_eq!(values[rank as usize], initial(rank));
        }
    }
}

#[test]
fn source_alone_is_a_no_op() {
    for collective in [false, true] {
        let values = run_broadcast(4, 2, &Destinations::ranks(&[2]), collective);
        let untouched: Vec<_> = (0..4).map(initial).collect();
        assert_eq!(values, untouched);
    }
}

#[test]
fn empty_subset_is_a_no_op() {
    for collective in [false, true] {
        let values = run_broadcast(3, 0, &Destinations::ranks(&[]), collective);
        let untouched: Vec<_> = (0..3).map(initial).collect();
        assert_eq!(values, untouched);
    }
}

#[test]
fn single_rank_universe() {
    for collective in [false, true] {
        assert_eq!(
            run_broadcast(1, 0, &Destinations::all(), collective),
            vec![initial(0)]
        );
    }
}

#[test]
fn sentinel_encoded_destinations() {
    let raw = [3, 1, TERMINATOR, 2];
    let values = run_broadcast(4, 0, &Destinations::from_terminated(&raw), false);
    assert_eq!(values[1], initial(0));
    assert_eq!(values[2], initial(2));
    assert_eq!(values[3], initial(0));
}

#[test]
fn source_listed_among_others_is_rejected() {
    let result = universe(4).run(|world| {
        let mut buf = initial(world.rank());
        broadcast(world, &mut buf, 1, &Destinations::ranks(&[0, 1, 2]))
    });
    assert_eq!(result, Err(Error::SourceListed(1)));
}

#[test]
fn collective_broadcast_does_not_add_a_listed_source_twice() {
    let values = run_broadcast(4, 1, &Destinations::ranks(&[0, 1, 2]), true);
    assert_eq!(values[0], initial(1));
    assert_eq!(values[2], initial(1));
    assert_eq!(values[3], initial(3));
}

#[test]
fn invalid_destinations_are_rejected_on_every_rank() {
    for collective in [false, true] {
        let result = universe(3).run(|world| {
            let mut buf = initial(world.rank());
            let destinations = Destinations::ranks(&[1, 3]);
            let outcome = if collective {
                broadcast_collective(world, &mut buf, 0, &destinations)
            } else {
                broadcast(world, &mut buf, 0, &destinations)
            };
            // Nobody was left waiting for a message.
            assert_eq!(outcome, Err(Error::InvalidRank { rank: 3, size: 3 }));
            Ok(())
        });
        assert_eq!(result, Ok(vec![(); 3]));
    }
}

#[test]
fn duplicate_destinations_are_rejected() {
    let result = universe(4).run(|world| {
        let mut buf = initial(world.rank());
        broadcast(world, &mut buf, 0, &Destinations::ranks(&[2, 3, 2]))
    });
    assert_eq!(result, Err(Error::DuplicateRank(2)));
}

#[test]
fn receive_buffer_of_wrong_length_is_detected() {
    for collective in [false, true] {
        for destinations in [Destinations::all(), Destinations::ranks(&[1])] {
            let result = universe(2).run(|world| {
                let mut buf = vec![7u32; if world.rank() == 0 { 2 } else { 3 }];
                if collective {
                    broadcast_collective(world, &mut buf, 0, &destinations)
                } else {
                    broadcast(world, &mut buf, 0, &destinations)
                }
            });
            assert_eq!(
                result,
                Err(Error::CountMismatch {
                    expected: 3,
                    actual: 2
                }),
                "collective: {collective}, destinations: {destinations}"
            );
        }
    }
}

#[test]
fn consecutive_broadcasts_from_different_sources() {
    let values = universe(5)
        .run(|world| {
            let mut first = [world.rank()];
            let mut second = [world.rank() * 100];
            broadcast(world, &mut first, 4, &Destinations::ranks(&[0, 1]))?;
            broadcast_collective(world, &mut second, 0, &Destinations::ranks(&[3, 4]))?;
            broadcast(world, &mut first, 1, &Destinations::all())?;
            Ok((first[0], second[0]))
        })
        .unwrap();
    assert_eq!(values, vec![(4, 0), (4, 100), (4, 200), (4, 0), (4, 0)]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn fanout_and_collective_broadcast_agree(
        size in 2usize..=16,
        src_seed in any::<u32>(),
        picks in proptest::collection::vec(any::<bool>(), 16),
        reversed in any::<bool>(),
    ) {
        let src = (src_seed % size as u32) as Rank;
        let mut listed: Vec<Rank> = (0..size as Rank)
            .filter(|&r| r != src && picks[r as usize])
            .collect();
        if reversed {
            listed.reverse();
        }
        let destinations = Destinations::ranks(&listed);

        let fanned = run_broadcast(size, src, &destinations, false);
        let collected = run_broadcast(size, src, &destinations, true);
        prop_assert_eq!(&fanned, &collected);

        for (rank, value) in (0..).zip(&fanned) {
            let expected = if rank == src || listed.contains(&rank) {
                initial(src)
            } else {
                initial(rank)
            };
            let bits: Vec<u64> = value.iter().map(|x| x.to_bits()).collect();
            let expected_bits: Vec<u64> = expected.iter().map(|x| x.to_bits()).collect();
            prop_assert_eq!(bits, expected_bits);
        }
    }
}
