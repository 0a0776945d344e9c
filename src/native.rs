//! Substrate backed by an MPI library
//!
//! Implements `Communicator` for the communicators of the `mpi` crate, so that the operations in
//! `fanout` and `reduce` run across real processes started by `mpiexec`. Every primitive maps onto
//! the MPI call of the same meaning; MPI itself matches messages, checks buffers and creates
//! sub-communicators.
//!
//! MPI reports failures by aborting the job rather than returning them, so the `Result`s produced
//! here only carry the argument checks done before calling into the library.
//!
//! # Examples
//!
//! ```no_run
//! use fanout::fanout::{broadcast_collective, Destinations};
//! use fanout::traits::*;
//!
//! let universe = fanout::native::initialize().unwrap();
//! let world = universe.world();
//! let mut x = [0u64];
//! if world.rank() == 0 {
//!     x[0] = 7;
//! }
//! broadcast_collective(&world, &mut x, 0, &Destinations::ranks(&[2, 3])).unwrap();
//! ```

use conv::ConvUtil;
use mpi::collective::CommunicatorCollectives;
use mpi::topology::{Communicator as _, Group as _, SimpleCommunicator};
use mpi::traits::{Destination as _, Root as _, Source as _};
use tracing::debug;

use crate::datatype::Equivalence;
use crate::error::{Error, Result};
use crate::point_to_point::Status;
use crate::topology::{rank_index, Group, Rank};
use crate::Tag;

/// Initialize the MPI library.
///
/// Fails with `Error::AlreadyInitialized` when called a second time within one process.
pub fn initialize() -> Result<mpi::environment::Universe> {
    mpi::initialize().ok_or(Error::AlreadyInitialized)
}

// A count MPI cannot express in whole elements means the message had another element type.
fn received<T: Equivalence>(status: mpi::point_to_point::Status) -> Result<Status> {
    let datatype = <T as mpi::datatype::Equivalence>::equivalent_datatype();
    let count = status
        .count(datatype)
        .value_as::<usize>()
        .map_err(|_| Error::TypeMismatch {
            sent: "unknown",
            expected: <T as Equivalence>::equivalent_datatype().name(),
        })?;
    Ok(Status::new(status.source_rank(), status.tag(), count))
}

impl crate::topology::Communicator for SimpleCommunicator {
    fn size(&self) -> Rank {
        mpi::topology::Communicator::size(self)
    }

    fn rank(&self) -> Rank {
        mpi::topology::Communicator::rank(self)
    }

    fn blocking_send<T: Equivalence>(&self, buf: &[T], destination: Rank, tag: Tag) -> Result<()> {
        rank_index(destination, mpi::topology::Communicator::size(self))?;
        mpi::topology::Communicator::process_at_rank(self, destination).send_with_tag(buf, tag);
        Ok(())
    }

    fn blocking_receive<T: Equivalence>(
        &self,
        buf: &mut [T],
        source: Option<Rank>,
        tag: Option<Tag>,
    ) -> Result<Status> {
        let status = match source {
            Some(source) => {
                rank_index(source, mpi::topology::Communicator::size(self))?;
                let process = mpi::topology::Communicator::process_at_rank(self, source);
                match tag {
                    Some(tag) => process.receive_into_with_tag(buf, tag),
                    None => process.receive_into(buf),
                }
            }
            None => {
                let process = mpi::topology::Communicator::any_process(self);
                match tag {
                    Some(tag) => process.receive_into_with_tag(buf, tag),
                    None => process.receive_into(buf),
                }
            }
        };
        received::<T>(status)
    }

    fn blocking_send_receive<S: Equivalence, R: Equivalence>(
        &self,
        msg: &[S],
        destination: Rank,
        send_tag: Tag,
        buf: &mut [R],
        source: Rank,
        receive_tag: Tag,
    ) -> Result<Status> {
        let size = mpi::topology::Communicator::size(self);
        rank_index(destination, size)?;
        rank_index(source, size)?;
        let status = mpi::point_to_point::send_receive_into_with_tags(
            msg,
            &mpi::topology::Communicator::process_at_rank(self, destination),
            send_tag,
            buf,
            &mpi::topology::Communicator::process_at_rank(self, source),
            receive_tag,
        );
        received::<R>(status)
    }

    fn split_by_subgroup_collective(&self, group: &Group) -> Result<Option<Self>> {
        let size = mpi::topology::Communicator::size(self);
        for &member in group.members() {
            rank_index(member, size)?;
        }
        debug!(members = group.size(), "MPI subgroup split");
        let subgroup = mpi::topology::Communicator::group(self).include(group.members());
        Ok(mpi::topology::Communicator::split_by_subgroup_collective(
            self, &subgroup,
        ))
    }

    fn native_broadcast<T: Equivalence>(&self, buf: &mut [T], root: Rank) -> Result<()> {
        rank_index(root, mpi::topology::Communicator::size(self))?;
        mpi::topology::Communicator::process_at_rank(self, root).broadcast_into(buf);
        Ok(())
    }

    fn native_scatter<T: Equivalence>(
        &self,
        sendbuf: Option<&[T]>,
        recvbuf: &mut [T],
        root: Rank,
    ) -> Result<()> {
        let size = mpi::topology::Communicator::size(self);
        rank_index(root, size)?;
        let root_process = mpi::topology::Communicator::process_at_rank(self, root);
        if mpi::topology::Communicator::rank(self) != root {
            root_process.scatter_into(recvbuf);
            return Ok(());
        }
        let sendbuf = sendbuf.ok_or(Error::MissingSendBuffer)?;
        let required = recvbuf.len() * crate::topology::rank_count(size);
        if sendbuf.len() < required {
            return Err(Error::SendBufferTooShort {
                required,
                actual: sendbuf.len(),
            });
        }
        root_process.scatter_into_root(&sendbuf[..required], recvbuf);
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        CommunicatorCollectives::barrier(self);
        Ok(())
    }

    fn abort(&self, errorcode: i32) {
        mpi::topology::Communicator::abort(self, errorcode)
    }
}
