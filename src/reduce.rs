//! Deterministic ordered reduction
//!
//! Floating point addition is not associative, so a sum taken in the order in which messages
//! happen to arrive can differ from run to run. The functions here collect one value per rank at
//! a root into `OrderedSlots`, indexed by sender rank, and only fold once every slot is filled.
//! The result is then independent of arrival order.
//!
//! How the root matches the incoming messages is a `ReductionPolicy`.

use std::ops::Add;
use std::slice;

use tracing::{debug, trace};

use crate::datatype::Equivalence;
use crate::error::{Error, Result};
use crate::point_to_point::{send_receive_into, Destination, Source};
use crate::topology::{rank_count, rank_index, Communicator, Rank};
use crate::Tag;

/// Tag of the contributions sent under `RankAddressed` and `WildcardSorted`
pub const REDUCTION_TAG: Tag = 0;

/// How the root of `gather_ordered()` receives the contributions
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum ReductionPolicy {
    /// One receive per sender, addressed to that sender, in ascending rank order.
    #[default]
    RankAddressed,
    /// Receives from any source; each value is filed under the sender reported by its status.
    /// All ranks meet in a barrier once the root has every value.
    WildcardSorted,
    /// Each sender tags its contribution with its own rank; the root receives from any source,
    /// one tag at a time in ascending order.
    TagAddressed,
}

/// A fixed number of slots, one per rank, each written at most once
///
/// ```
/// use fanout::reduce::OrderedSlots;
///
/// let mut slots = OrderedSlots::new(3);
/// slots.insert(2, 0.25).unwrap();
/// slots.insert(0, 1.0).unwrap();
/// assert!(!slots.is_complete());
/// slots.insert(1, 0.5).unwrap();
/// assert_eq!(slots.fold(0.0, |acc, x| acc + x), Ok(1.75));
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct OrderedSlots<T> {
    slots: Vec<Option<T>>,
    size: Rank,
}

impl<T> OrderedSlots<T> {
    /// `size` empty slots. A negative size gives no slots.
    pub fn new(size: Rank) -> OrderedSlots<T> {
        let size = size.max(0);
        OrderedSlots {
            slots: (0..rank_count(size)).map(|_| None).collect(),
            size,
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots at all
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fill the slot of `rank` with `value`.
    pub fn insert(&mut self, rank: Rank, value: T) -> Result<()> {
        let index = rank_index(rank, self.size)?;
        let slot = &mut self.slots[index];
        if slot.is_some() {
            return Err(Error::DuplicateContribution(rank));
        }
        *slot = Some(value);
        Ok(())
    }

    /// The value in the slot of `rank`, if filled
    pub fn get(&self, rank: Rank) -> Option<&T> {
        let index = rank_index(rank, self.size).ok()?;
        self.slots[index].as_ref()
    }

    /// Whether every slot is filled
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// The lowest rank whose slot is empty
    pub fn first_missing(&self) -> Option<Rank> {
        self.slots
            .iter()
            .zip(0..)
            .find(|(slot, _)| slot.is_none())
            .map(|(_, rank)| rank)
    }

    /// The values in slot order.
    ///
    /// Fails with `Error::MissingContribution` if a slot is empty.
    pub fn into_values(self) -> Result<Vec<T>> {
        if let Some(rank) = self.first_missing() {
            return Err(Error::MissingContribution(rank));
        }
        Ok(self.slots.into_iter().flatten().collect())
    }

    /// Folds the values strictly in ascending slot order.
    pub fn fold<B, F>(self, init: B, f: F) -> Result<B>
    where
        F: FnMut(B, T) -> B,
    {
        Ok(self.into_values()?.into_iter().fold(init, f))
    }
}

/// Collect `value` from every rank at `root`.
///
/// Every rank calls this with the same `root` and `policy`. The root gets `Some` slots, filled
/// with its own value and one received value per other rank; everybody else gets `None` once
/// its value is sent.
pub fn gather_ordered<C, T>(
    comm: &C,
    root: Rank,
    value: T,
    policy: ReductionPolicy,
) -> Result<Option<OrderedSlots<T>>>
where
    C: Communicator,
    T: Equivalence + Default,
{
    let (rank, size) = comm.rank_and_size();
    rank_index(root, size)?;
    debug!(rank, root, ?policy, "ordered gather");

    if rank != root {
        let tag = match policy {
            ReductionPolicy::TagAddressed => rank,
            ReductionPolicy::RankAddressed | ReductionPolicy::WildcardSorted => REDUCTION_TAG,
        };
        comm.process_at_rank(root)
            .send_with_tag(slice::from_ref(&value), tag)?;
        if policy == ReductionPolicy::WildcardSorted {
            comm.barrier()?;
        }
        return Ok(None);
    }

    let mut slots = OrderedSlots::new(size);
    slots.insert(root, value)?;
    let others = (0..size).filter(|&r| r != root);
    match policy {
        ReductionPolicy::RankAddressed => {
            for source in others {
                let (v, _) = comm
                    .process_at_rank(source)
                    .receive_with_tag::<T>(REDUCTION_TAG)?;
                slots.insert(source, v)?;
            }
        }
        ReductionPolicy::WildcardSorted => {
            for _ in others {
                let (v, status) = comm.any_process().receive_with_tag::<T>(REDUCTION_TAG)?;
                trace!(source = status.source_rank(), "contribution arrived");
                slots.insert(status.source_rank(), v)?;
            }
            // A wildcard receive would also match the next call's contributions, so nobody
            // sends again before the root has all of these.
            comm.barrier()?;
        }
        ReductionPolicy::TagAddressed => {
            for tag in others {
                let (v, status) = comm.any_process().receive_with_tag::<T>(tag)?;
                trace!(source = status.source_rank(), tag, "contribution arrived");
                slots.insert(tag, v)?;
            }
        }
    }
    Ok(Some(slots))
}

/// Sum of `value` over all ranks, at `root`, added up in ascending rank order.
///
/// # Examples
///
/// ```
/// use fanout::reduce::{ordered_sum, ReductionPolicy};
/// use fanout::traits::*;
///
/// let universe = fanout::initialize(4).unwrap();
/// let sums = universe
///     .run(|world| {
///         let value = f64::from(2i32.pow(world.rank() as u32 + 1));
///         ordered_sum(world, 0, value, ReductionPolicy::WildcardSorted)
///     })
///     .unwrap();
/// assert_eq!(sums, vec![Some(30.0), None, None, None]);
/// ```
pub fn ordered_sum<C>(
    comm: &C,
    root: Rank,
    value: f64,
    policy: ReductionPolicy,
) -> Result<Option<f64>>
where
    C: Communicator,
{
    match gather_ordered(comm, root, value, policy)? {
        Some(slots) => slots.fold(0.0, |acc, x| acc + x).map(Some),
        None => Ok(None),
    }
}

/// Every rank passes its running value to the right neighbour and adds what arrives from the
/// left, `size - 1` times; afterwards every rank holds the sum over all ranks.
///
/// Each rank adds the values in a different order, so for floating point `T` the ranks can
/// disagree in the last bits. Use `ordered_sum()` where that matters.
pub fn ring_sum<C, T>(comm: &C, value: T) -> Result<T>
where
    C: Communicator,
    T: Equivalence + Default + Add<Output = T>,
{
    let (rank, size) = comm.rank_and_size();
    debug!(rank, size, "ring sum");
    let right = comm.process_at_rank((rank + 1) % size);
    let left = comm.process_at_rank((rank + size - 1) % size);

    let mut sum = value;
    let mut passing = value;
    for _ in 1..size {
        let mut incoming = T::default();
        send_receive_into(
            slice::from_ref(&passing),
            &right,
            slice::from_mut(&mut incoming),
            &left,
        )?;
        sum = sum + incoming;
        passing = incoming;
    }
    Ok(sum)
}
