//! Native collective communication
//!
//! The substrate's own collectives, addressed through a `Root` process like in
//! `world.process_at_rank(0).broadcast_into(&mut buf)`. They are the baseline the hand-built
//! operations in `fanout` are measured against, and what `fanout::broadcast_collective()`
//! delegates to once it has narrowed the communicator down to the participants.
//!
//! Every process of the communicator has to take part in each of these calls, in the same order.

use crate::datatype::Equivalence;
use crate::error::Result;
use crate::topology::{AsCommunicator, Communicator, Process, Rank};

/// Collective communication traits
pub mod traits {
    pub use super::Root;
}

/// Something that can take the role of 'root' in a collective operation.
///
/// Many collective operations define a 'root' process that takes a special role in the
/// communication. These collective operations are provided methods of this trait.
pub trait Root: AsCommunicator {
    /// Rank of the root process
    fn root_rank(&self) -> Rank;

    /// Broadcast of the contents of a buffer
    ///
    /// After the call completes, `buf` on all processes in the communicator of the `Root`
    /// `&self` will contain what it contains on the `Root`.
    fn broadcast_into<T: Equivalence>(&self, buf: &mut [T]) -> Result<()> {
        self.as_communicator()
            .native_broadcast(buf, self.root_rank())
    }

    /// Scatter data from the root process to all participating processes.
    ///
    /// This function must be called on all non-root processes.
    fn scatter_into<T: Equivalence>(&self, recvbuf: &mut [T]) -> Result<()> {
        debug_assert_ne!(self.as_communicator().rank(), self.root_rank());
        self.as_communicator()
            .native_scatter(None, recvbuf, self.root_rank())
    }

    /// Scatter the contents of `sendbuf` to all participating processes.
    ///
    /// This function must be called on the root process.
    fn scatter_into_root<T: Equivalence>(&self, sendbuf: &[T], recvbuf: &mut [T]) -> Result<()> {
        debug_assert_eq!(self.as_communicator().rank(), self.root_rank());
        self.as_communicator()
            .native_scatter(Some(sendbuf), recvbuf, self.root_rank())
    }
}

impl<'a, C> Root for Process<'a, C>
where
    C: 'a + Communicator,
{
    fn root_rank(&self) -> Rank {
        self.rank()
    }
}
