//! Broadcast and scatter built from point to point messages
//!
//! `broadcast()` and `scatter()` move data with one blocking send per destination and one
//! blocking receive on every receiving rank. Their `_collective` twins reach the same result
//! through the substrate's native collectives; `broadcast_collective()` first narrows the
//! communicator down to the source and the destination set.
//!
//! Every rank of the communicator calls these functions with the same arguments (apart from the
//! send buffer of `scatter()`, which only the root supplies). Arguments are validated before any
//! message leaves. For the broadcasts validation only looks at the shared arguments, so all ranks
//! reach the same verdict. The send buffer checks of the scatters happen at the root alone; the
//! other ranks are then left in their receive until the substrate aborts them, which `Universe`
//! does when any rank fails.

use std::fmt;

use smallvec::SmallVec;
use tracing::debug;

use crate::collective::Root;
use crate::datatype::Equivalence;
use crate::error::{Error, Result};
use crate::point_to_point::{Destination, Source, Status};
use crate::topology::{rank_count, rank_index, Communicator, Rank, RankList};
use crate::{Count, Tag};

/// Tag of the point to point messages sent by `broadcast()` and `scatter()`
pub const FANOUT_TAG: Tag = 0;

/// The root of `scatter()` and `scatter_collective()`
pub const SCATTER_ROOT: Rank = 0;

/// Ends a destination list in the sentinel encoding read by `Destinations::from_terminated()`.
pub const TERMINATOR: Rank = -1;

/// The ranks a broadcast is addressed to
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Destinations {
    /// Every rank of the communicator except the source
    All,
    /// The listed ranks, in list order
    Ranks(SmallVec<[Rank; 8]>),
}

impl Destinations {
    /// Every rank except the source
    pub fn all() -> Destinations {
        Destinations::All
    }

    /// An explicit list of ranks
    pub fn ranks(ranks: &[Rank]) -> Destinations {
        Destinations::Ranks(SmallVec::from_slice(ranks))
    }

    /// Reads a list in the sentinel encoding: ranks up to, not including, the first
    /// `TERMINATOR`. Without a terminator the whole slice is used.
    ///
    /// ```
    /// use fanout::fanout::Destinations;
    ///
    /// assert_eq!(
    ///     Destinations::from_terminated(&[3, 1, -1, 2]),
    ///     Destinations::ranks(&[3, 1])
    /// );
    /// ```
    pub fn from_terminated(ranks: &[Rank]) -> Destinations {
        ranks
            .iter()
            .copied()
            .take_while(|&r| r != TERMINATOR)
            .collect()
    }

    /// Whether `rank` is addressed, given the broadcast source `src`.
    pub fn contains(&self, rank: Rank, src: Rank) -> bool {
        match self {
            Destinations::All => rank != src,
            Destinations::Ranks(ranks) => ranks.contains(&rank),
        }
    }

    /// Checks every listed rank against a communicator of `size` processes.
    fn validate(&self, size: Rank) -> Result<()> {
        if let Destinations::Ranks(ranks) = self {
            for (i, &r) in ranks.iter().enumerate() {
                rank_index(r, size)?;
                if ranks[..i].contains(&r) {
                    return Err(Error::DuplicateRank(r));
                }
            }
        }
        Ok(())
    }
}

impl FromIterator<Rank> for Destinations {
    fn from_iter<I: IntoIterator<Item = Rank>>(iter: I) -> Destinations {
        Destinations::Ranks(iter.into_iter().collect())
    }
}

impl fmt::Display for Destinations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destinations::All => f.write_str("all"),
            Destinations::Ranks(ranks) => write!(f, "{:?}", ranks.as_slice()),
        }
    }
}

fn check_count(status: Status, expected: Count) -> Result<()> {
    if status.count() != expected {
        return Err(Error::CountMismatch {
            expected,
            actual: status.count(),
        });
    }
    Ok(())
}

/// Broadcast `buf` from `src` to `destinations`, one point to point message per destination.
///
/// The source sends to each destination in turn: in increasing rank order for
/// `Destinations::All`, in list order otherwise. Each destination posts one receive from the
/// source. Ranks that are neither the source nor addressed return immediately. `buf` is left
/// untouched on the source and on ranks that are not addressed.
///
/// A list holding nothing but the source itself is accepted and sends nothing.
///
/// # Errors
///
/// - `Error::InvalidRank` if `src` or a listed rank is not a rank of `comm`
/// - `Error::DuplicateRank` if a rank is listed twice
/// - `Error::SourceListed` if the source appears in a list of other destinations
/// - `Error::CountMismatch` if a received message does not fill `buf`
///
/// # Examples
///
/// ```
/// use fanout::traits::*;
/// use fanout::fanout::{broadcast, Destinations};
///
/// let universe = fanout::initialize(4).unwrap();
/// let values = universe
///     .run(|world| {
///         let mut x = [world.rank() * 10];
///         broadcast(world, &mut x, 2, &Destinations::ranks(&[0, 3]))?;
///         Ok(x[0])
///     })
///     .unwrap();
/// assert_eq!(values, vec![20, 10, 20, 20]);
/// ```
pub fn broadcast<C, T>(comm: &C, buf: &mut [T], src: Rank, destinations: &Destinations) -> Result<()>
where
    C: Communicator,
    T: Equivalence,
{
    let (rank, size) = comm.rank_and_size();
    rank_index(src, size)?;
    destinations.validate(size)?;

    let targets: RankList = match destinations {
        Destinations::All => (0..size).filter(|&r| r != src).collect(),
        Destinations::Ranks(ranks) if ranks.as_slice() == [src] => {
            debug!(rank, src, "broadcast to the source alone");
            return Ok(());
        }
        Destinations::Ranks(ranks) if ranks.contains(&src) => {
            return Err(Error::SourceListed(src));
        }
        Destinations::Ranks(ranks) => ranks.clone(),
    };
    debug!(
        rank,
        src,
        destinations = targets.len(),
        count = buf.len(),
        "fan-out broadcast"
    );

    if rank == src {
        for &destination in &targets {
            comm.process_at_rank(destination)
                .send_with_tag(&*buf, FANOUT_TAG)?;
        }
    } else if targets.contains(&rank) {
        let status = comm
            .process_at_rank(src)
            .receive_into_with_tag(buf, FANOUT_TAG)?;
        check_count(status, buf.len())?;
    }
    Ok(())
}

/// Broadcast `buf` from `src` to `destinations` through the substrate's native broadcast.
///
/// For `Destinations::All` this is the native broadcast over `comm`. For a list, every rank of
/// `comm` takes part in creating a sub-communicator whose members are the source, at rank 0, and
/// the listed ranks in list order (a listed source is not added twice). Members then broadcast
/// from rank 0 of the sub-communicator, which is released before returning. Everybody else only
/// takes part in the creation.
///
/// Observationally the same as `broadcast()`.
///
/// # Errors
///
/// `Error::InvalidRank` and `Error::DuplicateRank` as for `broadcast()`, plus whatever the
/// substrate reports for the split and the broadcast.
pub fn broadcast_collective<C, T>(
    comm: &C,
    buf: &mut [T],
    src: Rank,
    destinations: &Destinations,
) -> Result<()>
where
    C: Communicator,
    T: Equivalence,
{
    let (rank, size) = comm.rank_and_size();
    rank_index(src, size)?;
    destinations.validate(size)?;

    let ranks = match destinations {
        Destinations::All => {
            debug!(rank, src, count = buf.len(), "native broadcast");
            return comm.process_at_rank(src).broadcast_into(buf);
        }
        Destinations::Ranks(ranks) => ranks,
    };

    let mut members = RankList::with_capacity(ranks.len() + 1);
    members.push(src);
    members.extend(ranks.iter().copied().filter(|&r| r != src));
    debug!(
        rank,
        src,
        members = members.len(),
        count = buf.len(),
        "collective broadcast over subgroup"
    );

    let group = comm.group().include(&members)?;
    if let Some(sub) = comm.split_by_subgroup_collective(&group)? {
        sub.process_at_rank(0).broadcast_into(buf)?;
    }
    Ok(())
}

/// Checks the buffers of a scatter and returns the part of the root's send buffer that is
/// distributed.
fn scatter_sections<'b, T>(
    rank: Rank,
    size: Rank,
    send: Option<&'b [T]>,
    send_count_per_rank: Count,
    recv: &[T],
) -> Result<Option<&'b [T]>> {
    if recv.len() != send_count_per_rank {
        return Err(Error::CountMismatch {
            expected: send_count_per_rank,
            actual: recv.len(),
        });
    }
    if rank != SCATTER_ROOT {
        return Ok(None);
    }
    let send = send.ok_or(Error::MissingSendBuffer)?;
    let required = send_count_per_rank * rank_count(size);
    if send.len() < required {
        return Err(Error::SendBufferTooShort {
            required,
            actual: send.len(),
        });
    }
    Ok(Some(&send[..required]))
}

/// Scatter `send` from rank `SCATTER_ROOT`: rank `r` receives elements
/// `[r * k, (r + 1) * k)` into `recv`, where `k` is `send_count_per_rank`.
///
/// The root copies its own section and sends every other section in increasing rank order; all
/// other ranks post one receive from the root. Only the root needs to supply `send`, and
/// elements beyond `size * k` are not distributed.
///
/// # Errors
///
/// - `Error::CountMismatch` if `recv` does not hold exactly `send_count_per_rank` elements, or a
///   received message does not fill it
/// - `Error::MissingSendBuffer` if the root passes `None`
/// - `Error::SendBufferTooShort` if the root's buffer holds fewer than `size * k` elements
///
/// # Examples
///
/// ```
/// use fanout::fanout::scatter;
/// use fanout::traits::*;
///
/// let universe = fanout::initialize(4).unwrap();
/// let sections = universe
///     .run(|world| {
///         let data: Vec<u32> = (0..20).collect();
///         let send = if world.rank() == 0 { Some(&data[..]) } else { None };
///         let mut recv = [0u32; 5];
///         scatter(world, send, 5, &mut recv)?;
///         Ok(recv)
///     })
///     .unwrap();
/// assert_eq!(sections[2], [10, 11, 12, 13, 14]);
/// ```
pub fn scatter<C, T>(
    comm: &C,
    send: Option<&[T]>,
    send_count_per_rank: Count,
    recv: &mut [T],
) -> Result<()>
where
    C: Communicator,
    T: Equivalence,
{
    let (rank, size) = comm.rank_and_size();
    let sections = scatter_sections(rank, size, send, send_count_per_rank, recv)?;
    debug!(
        rank,
        root = SCATTER_ROOT,
        count = send_count_per_rank,
        "fan-out scatter"
    );

    match sections {
        Some(send) => {
            for (index, destination) in (0..size).enumerate() {
                let section = &send[index * send_count_per_rank..(index + 1) * send_count_per_rank];
                if destination == SCATTER_ROOT {
                    recv.copy_from_slice(section);
                } else {
                    comm.process_at_rank(destination)
                        .send_with_tag(section, FANOUT_TAG)?;
                }
            }
        }
        None => {
            let status = comm
                .process_at_rank(SCATTER_ROOT)
                .receive_into_with_tag(recv, FANOUT_TAG)?;
            check_count(status, send_count_per_rank)?;
        }
    }
    Ok(())
}

/// `scatter()` through the substrate's native scatter.
///
/// Same arguments, same result and same errors.
pub fn scatter_collective<C, T>(
    comm: &C,
    send: Option<&[T]>,
    send_count_per_rank: Count,
    recv: &mut [T],
) -> Result<()>
where
    C: Communicator,
    T: Equivalence,
{
    let (rank, size) = comm.rank_and_size();
    let sections = scatter_sections(rank, size, send, send_count_per_rank, recv)?;
    debug!(
        rank,
        root = SCATTER_ROOT,
        count = send_count_per_rank,
        "native scatter"
    );

    let root = comm.process_at_rank(SCATTER_ROOT);
    match sections {
        Some(send) => root.scatter_into_root(send, recv),
        None => root.scatter_into(recv),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminated_list_stops_at_sentinel() {
        assert_eq!(
            Destinations::from_terminated(&[2, 5, TERMINATOR, 7]),
            Destinations::ranks(&[2, 5])
        );
        assert_eq!(
            Destinations::from_terminated(&[TERMINATOR]),
            Destinations::ranks(&[])
        );
        assert_eq!(
            Destinations::from_terminated(&[4, 1]),
            Destinations::ranks(&[4, 1])
        );
    }

    #[test]
    fn membership() {
        let all = Destinations::all();
        assert!(all.contains(3, 0));
        assert!(!all.contains(0, 0));
        let some = Destinations::ranks(&[1, 4]);
        assert!(some.contains(4, 0));
        assert!(!some.contains(2, 0));
    }

    #[test]
    fn validation_checks_range_and_duplicates() {
        assert_eq!(Destinations::ranks(&[0, 3, 1]).validate(4), Ok(()));
        assert_eq!(
            Destinations::ranks(&[0, 4]).validate(4),
            Err(Error::InvalidRank { rank: 4, size: 4 })
        );
        assert_eq!(
            Destinations::ranks(&[TERMINATOR]).validate(4),
            Err(Error::InvalidRank { rank: -1, size: 4 })
        );
        assert_eq!(
            Destinations::ranks(&[2, 1, 2]).validate(4),
            Err(Error::DuplicateRank(2))
        );
        assert_eq!(Destinations::all().validate(1), Ok(()));
    }

    #[test]
    fn display() {
        assert_eq!(Destinations::all().to_string(), "all");
        assert_eq!(Destinations::ranks(&[3, 1]).to_string(), "[3, 1]");
    }

    #[test]
    fn scatter_sections_checks_the_root_buffer() {
        let data = [0u8; 10];
        assert_eq!(
            scatter_sections(0, 4, Some(&data[..]), 2, &[0u8; 2]),
            Ok(Some(&data[..8]))
        );
        assert_eq!(
            scatter_sections(0, 4, Some(&data[..]), 3, &[0u8; 3]),
            Err(Error::SendBufferTooShort {
                required: 12,
                actual: 10
            })
        );
        assert_eq!(
            scatter_sections::<u8>(0, 4, None, 2, &[0u8; 2]),
            Err(Error::MissingSendBuffer)
        );
        assert_eq!(scatter_sections::<u8>(3, 4, None, 2, &[0u8; 2]), Ok(None));
        assert_eq!(
            scatter_sections::<u8>(3, 4, None, 2, &[0u8; 3]),
            Err(Error::CountMismatch {
                expected: 2,
                actual: 3
            })
        );
    }
}
