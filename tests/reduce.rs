use std::thread;
use std::time::Duration;

use fanout::reduce::{gather_ordered, ordered_sum, ring_sum, ReductionPolicy};
use fanout::traits::*;
use fanout::{Rank, Universe, UniverseConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const POLICIES: [ReductionPolicy; 3] = [
    ReductionPolicy::RankAddressed,
    ReductionPolicy::WildcardSorted,
    ReductionPolicy::TagAddressed,
];

fn universe(size: usize) -> Universe {
    Universe::new(UniverseConfig::new(size).receive_timeout(Duration::from_secs(20))).unwrap()
}

fn power_of_two(rank: Rank) -> i64 {
    2i64.pow(rank as u32 + 1)
}

#[test]
fn four_ranks_sum_to_thirty() {
    for policy in POLICIES {
        let sums = universe(4)
            .run(|world| ordered_sum(world, 0, power_of_two(world.rank()) as f64, policy))
            .unwrap();
        assert_eq!(sums, vec![Some(30.0), None, None, None], "{policy:?}");
    }
}

#[test]
fn ring_sum_reaches_every_rank() {
    for size in [1usize, 2, 4, 8, 16] {
        let sums = universe(size)
            .run(|world| ring_sum(world, power_of_two(world.rank())))
            .unwrap();
        let expected = (1i64 << (size + 1)) - 2;
        assert_eq!(sums, vec![expected; size], "size {size}");
    }
}

#[test]
fn any_rank_can_be_root() {
    for policy in POLICIES {
        let gathered = universe(5)
            .run(|world| {
                let slots = gather_ordered(world, 3, world.rank() * 11, policy)?;
                slots.map(|s| s.into_values()).transpose()
            })
            .unwrap();
        assert_eq!(gathered[3], Some(vec![0, 11, 22, 33, 44]));
        assert!(gathered.iter().enumerate().all(|(r, g)| r == 3 || g.is_none()));
    }
}

#[test]
fn slots_are_complete_at_the_root() {
    let complete = universe(6)
        .run(|world| {
            let slots = gather_ordered(world, 0, 1u8, ReductionPolicy::WildcardSorted)?;
            Ok(slots.map(|s| s.is_complete()))
        })
        .unwrap();
    assert_eq!(complete[0], Some(true));
}

#[test]
fn back_to_back_wildcard_sums_keep_their_contributions_apart() {
    let sums = universe(3)
        .run(|world| {
            if world.rank() == 2 {
                thread::sleep(Duration::from_millis(200));
            }
            let rank = f64::from(world.rank());
            let first = ordered_sum(world, 0, rank + 1.0, ReductionPolicy::WildcardSorted)?;
            let second = ordered_sum(world, 0, 10.0 * rank, ReductionPolicy::WildcardSorted)?;
            Ok((first, second))
        })
        .unwrap();
    assert_eq!(sums[0], (Some(6.0), Some(30.0)));
    assert_eq!(sums[1], (None, None));
}

// Values of wildly different magnitude, so that every summation order rounds differently.
fn contributions(size: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    (0..size)
        .map(|_| {
            let exponent = rng.gen_range(-8..16);
            rng.gen_range(-1.0..1.0) * 10f64.powi(exponent)
        })
        .collect()
}

#[test]
fn sums_are_reproducible_under_random_arrival_order() {
    let size = 8;
    let values = contributions(size);
    let reference = values.iter().fold(0.0, |acc, x| acc + x);

    for policy in POLICIES {
        for _ in 0..10 {
            let sums = universe(size)
                .run(|world| {
                    let delay = rand::thread_rng().gen_range(0..3000);
                    thread::sleep(Duration::from_micros(delay));
                    ordered_sum(world, 0, values[world.rank() as usize], policy)
                })
                .unwrap();
            let sum = sums[0].unwrap();
            assert_eq!(sum.to_bits(), reference.to_bits(), "{policy:?}");
        }
    }
}
