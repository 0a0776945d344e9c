use std::time::Duration;

use fanout::fanout::{scatter, scatter_collective, SCATTER_ROOT};
use fanout::traits::*;
use fanout::{Error, Universe, UniverseConfig};
use proptest::prelude::*;

fn universe(size: usize) -> Universe {
    Universe::new(UniverseConfig::new(size).receive_timeout(Duration::from_secs(20))).unwrap()
}

fn run_scatter(size: usize, data: &[i64], k: usize, collective: bool) -> Vec<Vec<i64>> {
    universe(size)
        .run(|world| {
            let send = if world.rank() == SCATTER_ROOT {
                Some(data)
            } else {
                None
            };
            let mut recv = vec![-1i64; k];
            if collective {
                scatter_collective(world, send, k, &mut recv)?;
            } else {
                scatter(world, send, k, &mut recv)?;
            }
            Ok(recv)
        })
        .unwrap()
}

#[test]
fn twenty_elements_over_four_ranks() {
    let data: Vec<i64> = (0..20).collect();
    for collective in [false, true] {
        let sections = run_scatter(4, &data, 5, collective);
        assert_eq!(sections[2], vec![10, 11, 12, 13, 14]);
        assert_eq!(sections.concat(), data);
    }
}

#[test]
fn remainder_is_not_distributed() {
    let data: Vec<i64> = (0..11).collect();
    for collective in [false, true] {
        let sections = run_scatter(3, &data, 3, collective);
        assert_eq!(sections, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8]]);
    }
}

#[test]
fn single_rank_copies_locally() {
    let sections = run_scatter(1, &[7, 8], 2, false);
    assert_eq!(sections, vec![vec![7, 8]]);
}

#[test]
fn root_without_send_buffer() {
    let result = universe(3).run(|world| {
        let mut recv = [0u8; 2];
        scatter(world, None, 2, &mut recv)
    });
    assert_eq!(result, Err(Error::MissingSendBuffer));
}

#[test]
fn root_with_short_send_buffer() {
    for collective in [false, true] {
        let result = universe(4).run(|world| {
            let data = [0u8; 7];
            let send = if world.rank() == 0 { Some(&data[..]) } else { None };
            let mut recv = [0u8; 2];
            if collective {
                scatter_collective(world, send, 2, &mut recv)
            } else {
                scatter(world, send, 2, &mut recv)
            }
        });
        assert_eq!(
            result,
            Err(Error::SendBufferTooShort {
                required: 8,
                actual: 7
            })
        );
    }
}

#[test]
fn receive_buffer_must_match_the_section_size() {
    let result = universe(2).run(|world| {
        let data = [1.0f32; 4];
        let send = if world.rank() == 0 { Some(&data[..]) } else { None };
        let mut recv = vec![0.0f32; if world.rank() == 1 { 3 } else { 2 }];
        scatter(world, send, 2, &mut recv)
    });
    assert_eq!(
        result,
        Err(Error::CountMismatch {
            expected: 2,
            actual: 3
        })
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_rank_receives_its_section(
        size in 1usize..=16,
        k in 0usize..6,
        extra in 0usize..4,
        collective in any::<bool>(),
    ) {
        let data: Vec<i64> = (0..(size * k + extra) as i64).map(|x| x * 3 - 7).collect();
        let sections = run_scatter(size, &data, k, collective);
        for (r, section) in sections.iter().enumerate() {
            prop_assert_eq!(&section[..], &data[r * k..(r + 1) * k]);
        }
    }
}
