//! Point to point communication
//!
//! Endpoints of communication are described by types that implement the `Source` and
//! `Destination` traits. Communication operations are provided methods of those traits and
//! forward to the primitives of the underlying `Communicator`.
//!
//! All operations here are blocking: a send returns once the substrate has buffered or delivered
//! the message, a receive returns once a matching message has arrived.

use std::slice;

use crate::datatype::Equivalence;
use crate::error::Result;
use crate::topology::{AnyProcess, AsCommunicator, Communicator, Process, Rank};
use crate::{Count, Tag};

/// Point to point communication traits
pub mod traits {
    pub use super::{Destination, Source};
}

/// Describes the result of a point to point receive operation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Status {
    source_rank: Rank,
    tag: Tag,
    count: Count,
}

impl Status {
    /// Status of a received message, as reported by a substrate.
    pub fn new(source_rank: Rank, tag: Tag, count: Count) -> Status {
        Status {
            source_rank,
            tag,
            count,
        }
    }

    /// The rank of the message source
    pub fn source_rank(&self) -> Rank {
        self.source_rank
    }

    /// The message tag
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Number of elements contained in the message
    pub fn count(&self) -> Count {
        self.count
    }
}

/// Something that can be used as the source in a point to point receive operation
///
/// # Examples
///
/// - A `Process` used as a source for a receive operation will receive data only from the
///   identified process.
/// - An `AnyProcess` will receive data from any process in the communicator, the `Status`
///   tells which one.
pub trait Source: AsCommunicator {
    /// `Rank` that identifies the source, `None` for any source
    fn source_rank(&self) -> Option<Rank>;

    /// Receive a message containing a single instance of type `Msg` with a certain tag.
    fn receive_with_tag<Msg>(&self, tag: Tag) -> Result<(Msg, Status)>
    where
        Msg: Equivalence + Default,
    {
        let mut res = Msg::default();
        let status = self.receive_into_with_tag(slice::from_mut(&mut res), tag)?;
        Ok((res, status))
    }

    /// Receive a message containing a single instance of type `Msg` with any tag.
    fn receive<Msg>(&self) -> Result<(Msg, Status)>
    where
        Msg: Equivalence + Default,
    {
        let mut res = Msg::default();
        let status = self.receive_into(slice::from_mut(&mut res))?;
        Ok((res, status))
    }

    /// Receive a message with a certain tag into a buffer.
    fn receive_into_with_tag<T: Equivalence>(&self, buf: &mut [T], tag: Tag) -> Result<Status> {
        self.as_communicator()
            .blocking_receive(buf, self.source_rank(), Some(tag))
    }

    /// Receive a message with any tag into a buffer.
    fn receive_into<T: Equivalence>(&self, buf: &mut [T]) -> Result<Status> {
        self.as_communicator()
            .blocking_receive(buf, self.source_rank(), None)
    }
}

impl<'a, C> Source for AnyProcess<'a, C>
where
    C: 'a + Communicator,
{
    fn source_rank(&self) -> Option<Rank> {
        None
    }
}

impl<'a, C> Source for Process<'a, C>
where
    C: 'a + Communicator,
{
    fn source_rank(&self) -> Option<Rank> {
        Some(self.rank())
    }
}

/// Something that can be used as the destination in a point to point send operation
///
/// # Examples
/// - Using a `Process` as the destination will send data to that specific process.
pub trait Destination: AsCommunicator {
    /// `Rank` that identifies the destination
    fn destination_rank(&self) -> Rank;

    /// Blocking send of the contents of `buf` to the `Destination` `&self`, tagged with `tag`.
    fn send_with_tag<T: Equivalence>(&self, buf: &[T], tag: Tag) -> Result<()> {
        self.as_communicator()
            .blocking_send(buf, self.destination_rank(), tag)
    }

    /// Blocking send of the contents of `buf` to the `Destination` `&self`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fanout::traits::*;
    ///
    /// let universe = fanout::initialize(2).unwrap();
    /// universe.run(|world| {
    ///     if world.rank() == 0 {
    ///         world.process_at_rank(1).send(&[1.0f64, 2.0, 3.0])?;
    ///     } else {
    ///         let mut v = [0.0f64; 3];
    ///         world.process_at_rank(0).receive_into(&mut v)?;
    ///     }
    ///     Ok(())
    /// }).unwrap();
    /// ```
    fn send<T: Equivalence>(&self, buf: &[T]) -> Result<()> {
        self.send_with_tag(buf, Tag::default())
    }
}

impl<'a, C> Destination for Process<'a, C>
where
    C: 'a + Communicator,
{
    fn destination_rank(&self) -> Rank {
        self.rank()
    }
}

/// Sends `msg` to `destination` and receives into `buf` from `source`, with explicit tags.
///
/// Both endpoints have to belong to the same communicator.
pub fn send_receive_into_with_tags<'a, C, S, R>(
    msg: &[S],
    destination: &Process<'a, C>,
    sendtag: Tag,
    buf: &mut [R],
    source: &Process<'a, C>,
    receivetag: Tag,
) -> Result<Status>
where
    C: 'a + Communicator,
    S: Equivalence,
    R: Equivalence,
{
    debug_assert!(std::ptr::eq(
        source.as_communicator(),
        destination.as_communicator()
    ));
    source.as_communicator().blocking_send_receive(
        msg,
        destination.destination_rank(),
        sendtag,
        buf,
        source.rank(),
        receivetag,
    )
}

/// Sends `msg` to `destination` and receives into `buf` from `source`.
pub fn send_receive_into<'a, C, S, R>(
    msg: &[S],
    destination: &Process<'a, C>,
    buf: &mut [R],
    source: &Process<'a, C>,
) -> Result<Status>
where
    C: 'a + Communicator,
    S: Equivalence,
    R: Equivalence,
{
    send_receive_into_with_tags(msg, destination, Tag::default(), buf, source, Tag::default())
}
