//! Organizing processes as groups and communicators
//!
//! Processes are organized in communicators. All processes initially partaking in the
//! computation are organized in a context called the 'world communicator'. From the world
//! communicator, other communicators can be created by splitting off a `Group` of its members.
//! Processes are addressed via their `Rank` within a specific communicator, which is
//! encapsulated in a `Process`.
//!
//! The `Communicator` trait is the contract between the collective layer in this crate and the
//! substrate that actually moves messages. Everything in `fanout` and `reduce` is written against
//! it.

use conv::ConvUtil;
use smallvec::SmallVec;

use crate::datatype::Equivalence;
use crate::error::{Error, Result};
use crate::point_to_point::Status;
use crate::Tag;

/// Topology traits
pub mod traits {
    pub use super::{AsCommunicator, Communicator};
}

/// Identifies a certain process within a communicator.
pub type Rank = i32;

/// Rank lists are short in practice; keep them on the stack.
pub(crate) type RankList = SmallVec<[Rank; 8]>;

/// Something that has a communicator associated with it
pub trait AsCommunicator {
    /// The type of the associated communicator
    type Out: Communicator;
    /// Returns the associated communicator.
    fn as_communicator(&self) -> &Self::Out;
}

/// Communicators are contexts for communication
///
/// The required methods are the primitives a substrate has to provide: rank and size queries,
/// blocking directed send, blocking directed or wildcard receive that reports the true sender,
/// collective sub-communicator creation and native collectives scoped to the communicator. The
/// provided methods build the addressing vocabulary on top.
pub trait Communicator: Sized {
    /// Number of processes in this communicator
    fn size(&self) -> Rank;

    /// The `Rank` that identifies the calling process within this communicator
    fn rank(&self) -> Rank;

    /// Blocking send of `buf` to `destination`, tagged with `tag`.
    ///
    /// Returns once the substrate has buffered or delivered the message.
    fn blocking_send<T: Equivalence>(&self, buf: &[T], destination: Rank, tag: Tag) -> Result<()>;

    /// Blocking receive into `buf`.
    ///
    /// `None` for `source` or `tag` accepts any source or any tag. The returned `Status`
    /// identifies the actual sender and tag of the matched message. Among the messages from one
    /// sender that match, the earliest sent is received first.
    fn blocking_receive<T: Equivalence>(
        &self,
        buf: &mut [T],
        source: Option<Rank>,
        tag: Option<Tag>,
    ) -> Result<Status>;

    /// Send `msg` to `destination` and receive into `buf` from `source` in one step, without
    /// deadlocking when every rank of a ring does the same.
    fn blocking_send_receive<S: Equivalence, R: Equivalence>(
        &self,
        msg: &[S],
        destination: Rank,
        send_tag: Tag,
        buf: &mut [R],
        source: Rank,
        receive_tag: Tag,
    ) -> Result<Status>;

    /// Split a communicator collectively by subgroup.
    ///
    /// Every process of `self` has to call this with the same `group`, including processes that
    /// are not members of it. Members receive a new communicator in which the process at
    /// position `i` of the group has rank `i`; everybody else receives `None`. The new
    /// communicator is released when it is dropped.
    fn split_by_subgroup_collective(&self, group: &Group) -> Result<Option<Self>>;

    /// The substrate's own broadcast of `buf` from `root` to all processes of `self`.
    fn native_broadcast<T: Equivalence>(&self, buf: &mut [T], root: Rank) -> Result<()>;

    /// The substrate's own scatter from `root`: section `i` of `sendbuf` (of `recvbuf.len()`
    /// elements) ends up in `recvbuf` on rank `i`. `sendbuf` is only significant at the root.
    fn native_scatter<T: Equivalence>(
        &self,
        sendbuf: Option<&[T]>,
        recvbuf: &mut [T],
        root: Rank,
    ) -> Result<()>;

    /// Barrier synchronization among all processes of `self`
    fn barrier(&self) -> Result<()>;

    /// Abort all processes partaking in the computation.
    ///
    /// Every process blocked in, or later entering, a communication call observes
    /// `Error::Aborted(errorcode)`. Substrates that cannot report that back terminate the program.
    fn abort(&self, errorcode: i32);

    /// This process' rank together with the size of the communicator.
    fn rank_and_size(&self) -> (Rank, Rank) {
        (self.rank(), self.size())
    }

    /// Bundles a reference to this communicator with a specific `Rank` into a `Process`.
    ///
    /// # Panics
    ///
    /// If `r` is not a rank of this communicator.
    fn process_at_rank(&self, r: Rank) -> Process<'_, Self> {
        assert!(
            0 <= r && r < self.size(),
            "rank {} outside of a communicator of size {}",
            r,
            self.size()
        );
        Process { comm: self, rank: r }
    }

    /// Returns an `AnyProcess` identifier that can be used, e.g. as a `Source` in point to point
    /// communication.
    fn any_process(&self) -> AnyProcess<'_, Self> {
        AnyProcess(self)
    }

    /// A `Process` for the calling process
    fn this_process(&self) -> Process<'_, Self> {
        let rank = self.rank();
        Process { comm: self, rank }
    }

    /// The group associated with this communicator
    fn group(&self) -> Group {
        Group {
            members: (0..self.size()).collect(),
            caller: self.rank(),
        }
    }
}

/// Checks `rank` against a communicator of `size` processes and turns it into an index.
pub(crate) fn rank_index(rank: Rank, size: Rank) -> Result<usize> {
    if rank < 0 || rank >= size {
        return Err(Error::InvalidRank { rank, size });
    }
    rank.value_as::<usize>()
        .map_err(|_| Error::InvalidRank { rank, size })
}

/// Number of ranks in a communicator of `size` processes, as an index bound.
pub(crate) fn rank_count(size: Rank) -> usize {
    size.value_as::<usize>().unwrap_or(0)
}

/// Converts a process count into a `Rank`.
pub(crate) fn count_as_rank(count: usize) -> Result<Rank> {
    count
        .value_as::<Rank>()
        .map_err(|_| Error::InvalidSize { requested: count })
}

/// Identifies a process by its `Rank` within a certain communicator.
#[derive(Copy, Clone, Debug)]
pub struct Process<'a, C>
where
    C: 'a + Communicator,
{
    comm: &'a C,
    rank: Rank,
}

impl<'a, C> Process<'a, C>
where
    C: 'a + Communicator,
{
    /// The process rank
    pub fn rank(&self) -> Rank {
        self.rank
    }
}

impl<'a, C> AsCommunicator for Process<'a, C>
where
    C: 'a + Communicator,
{
    type Out = C;
    fn as_communicator(&self) -> &Self::Out {
        self.comm
    }
}

/// Identifies an arbitrary process that is a member of a certain communicator, e.g. for use as a
/// `Source` in point to point communication.
#[derive(Copy, Clone, Debug)]
pub struct AnyProcess<'a, C>(&'a C)
where
    C: 'a + Communicator;

impl<'a, C> AsCommunicator for AnyProcess<'a, C>
where
    C: 'a + Communicator,
{
    type Out = C;
    fn as_communicator(&self) -> &Self::Out {
        self.0
    }
}

/// An ordered group of processes
///
/// Members are identified by their rank in the communicator the group was derived from. The
/// position of a member within the group is its rank in any communicator created from the group.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Group {
    members: RankList,
    caller: Rank,
}

impl Group {
    /// Subgroup including specified ranks
    ///
    /// Constructs a new group where the process with rank `ranks[i]` in this group has rank `i`
    /// in the new group.
    pub fn include(&self, ranks: &[Rank]) -> Result<Group> {
        let size = self.size();
        let mut members = RankList::with_capacity(ranks.len());
        for &r in ranks {
            let index = rank_index(r, size)?;
            let member = self.members[index];
            if members.contains(&member) {
                return Err(Error::DuplicateRank(r));
            }
            members.push(member);
        }
        Ok(Group {
            members,
            caller: self.caller,
        })
    }

    /// Subgroup excluding specified ranks
    ///
    /// Constructs a new group containing those processes from this group that are not mentioned
    /// in `ranks`, in their original order.
    pub fn exclude(&self, ranks: &[Rank]) -> Result<Group> {
        let size = self.size();
        for &r in ranks {
            rank_index(r, size)?;
        }
        let members = self
            .members
            .iter()
            .zip(0..)
            .filter(|&(_, r)| !ranks.contains(&r))
            .map(|(&m, _)| m)
            .collect();
        Ok(Group {
            members,
            caller: self.caller,
        })
    }

    /// Number of processes in the group.
    pub fn size(&self) -> Rank {
        // Groups are built from a communicator, whose size already fits a `Rank`.
        self.members.len() as Rank
    }

    /// Rank of the calling process within the group, `None` if it is not a member.
    pub fn rank(&self) -> Option<Rank> {
        self.position_of(self.caller)
    }

    /// The members, as ranks of the communicator this group was derived from
    pub fn members(&self) -> &[Rank] {
        &self.members
    }

    /// Find the rank in group `other` of the process that has rank `rank` in this group.
    ///
    /// If the process is not a member of the other group, returns `None`.
    pub fn translate_rank(&self, rank: Rank, other: &Group) -> Option<Rank> {
        let index = rank_index(rank, self.size()).ok()?;
        other.position_of(self.members[index])
    }

    /// Compare two groups.
    pub fn compare(&self, other: &Group) -> GroupRelation {
        if self.members == other.members {
            return GroupRelation::Identical;
        }
        let mut mine = self.members.clone();
        let mut theirs = other.members.clone();
        mine.sort_unstable();
        theirs.sort_unstable();
        if mine == theirs {
            GroupRelation::Similar
        } else {
            GroupRelation::Unequal
        }
    }

    fn position_of(&self, member: Rank) -> Option<Rank> {
        self.members
            .iter()
            .position(|&m| m == member)
            .map(|p| p as Rank)
    }
}

/// The relation between two groups.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum GroupRelation {
    /// Identical group members in identical order
    Identical,
    /// Identical group members in different order
    Similar,
    /// Otherwise
    Unequal,
}
