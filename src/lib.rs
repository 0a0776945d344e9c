//! Collective operations hand-built from point-to-point message passing
//!
//! Message passing libraries in the style of [MPI] offer collective operations such as broadcast
//! and scatter as native calls. This crate rebuilds a few of them directly on blocking
//! send/receive primitives, which makes the message matching, participant subsetting and
//! aggregation order explicit:
//!
//! - `fanout::broadcast()` sends a buffer from one source rank to all ranks or to an explicit
//!   subset, one send per destination.
//! - `fanout::broadcast_collective()` builds an ephemeral sub-communicator around the source and
//!   the subset and hands the transfer to the substrate's native broadcast.
//! - `fanout::scatter()` cuts a buffer at the root into equal sections and sends one per rank.
//! - `reduce::gather_ordered()` collects one value per rank at a root in rank order, so floating
//!   point sums come out bit-identical regardless of arrival order.
//!
//! [MPI]: http://www.mpi-forum.org
//!
//! # Substrates
//!
//! Everything is written against the `Communicator` trait. Two implementations exist:
//!
//! - `local::LocalCommunicator`: every rank is a thread of the current process, started through
//!   a `Universe`. This is the default and what the tests run on.
//! - `native` (feature `mpi`): `Communicator` for the communicators of an installed MPI library,
//!   through the `mpi` crate.
//!
//! # Usage
//!
//! ```no_run
//! use fanout::traits::*;
//! use fanout::fanout::{broadcast, Destinations};
//!
//! let universe = fanout::initialize(4).unwrap();
//! let values = universe
//!     .run(|world| {
//!         let mut x = if world.rank() == 0 { [42u64] } else { [0] };
//!         broadcast(world, &mut x, 0, &Destinations::ranks(&[1, 3]))?;
//!         Ok(x[0])
//!     })
//!     .unwrap();
//!
//! assert_eq!(values, vec![42, 0, 0, 42]);
//! ```
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod collective;
pub mod datatype;
pub mod environment;
pub mod error;
pub mod fanout;
pub mod local;
#[cfg(feature = "mpi")]
pub mod native;
pub mod partition;
pub mod point_to_point;
pub mod reduce;
pub mod topology;

/// Re-exports all traits needed to call methods on communicators, processes and buffers.
pub mod traits {
    pub use crate::collective::traits::*;
    pub use crate::datatype::traits::*;
    pub use crate::point_to_point::traits::*;
    pub use crate::topology::traits::*;
}

pub use crate::environment::{initialize, initialize_from_env, Universe, UniverseConfig};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::topology::Rank;

/// Encodes number of values in multi-value messages.
pub type Count = usize;
/// Can be used to tag messages on the sender side and match on the receiver side.
pub type Tag = i32;
