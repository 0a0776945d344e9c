//! In-process substrate
//!
//! Every rank is a thread of the current process, started by a `Universe`. Each rank owns a
//! mailbox. A send places an envelope (communicator context, traffic channel, source rank, tag,
//! element type and payload) in the mailbox of the destination and returns immediately; a receive
//! scans its own mailbox in arrival order for the first envelope that matches and blocks on a
//! condition variable until one shows up. Since envelopes from one sender arrive in the order they
//! were sent, messages between a pair of ranks never overtake each other.
//!
//! Point to point traffic and the substrate's own collectives travel on separate channels, so a
//! native collective can never consume a message meant for a user receive. Communicators created
//! by `split_by_subgroup_collective()` get a fresh context and carry their own rank numbering.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use conv::ConvUtil;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::datatype::{Datatype, Equivalence};
use crate::error::{Error, Result};
use crate::point_to_point::Status;
use crate::topology::{count_as_rank, rank_index, Communicator, Group, Rank};
use crate::Tag;

type ContextId = u64;

const WORLD_CONTEXT: ContextId = 0;

// Tags on the collective channel.
const BROADCAST_TAG: Tag = 1;
const SCATTER_TAG: Tag = 2;
const BARRIER_TAG: Tag = 3;
const SPLIT_TAG: Tag = 4;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Channel {
    PointToPoint,
    Collective,
}

struct Envelope {
    context: ContextId,
    channel: Channel,
    source: Rank,
    tag: Tag,
    datatype: Datatype,
    count: usize,
    payload: Box<dyn Any + Send>,
}

impl Envelope {
    fn matches(
        &self,
        context: ContextId,
        channel: Channel,
        source: Option<Rank>,
        tag: Option<Tag>,
    ) -> bool {
        self.context == context
            && self.channel == channel
            && source.map_or(true, |s| s == self.source)
            && tag.map_or(true, |t| t == self.tag)
    }

    fn unpack_into<T: Equivalence>(self, buf: &mut [T]) -> Result<Status> {
        let Envelope {
            source,
            tag,
            datatype,
            count,
            payload,
            ..
        } = self;
        let expected = T::equivalent_datatype();
        let mismatch = Error::TypeMismatch {
            sent: datatype.name(),
            expected: expected.name(),
        };
        if datatype != expected {
            return Err(mismatch);
        }
        if count > buf.len() {
            return Err(Error::Truncated {
                message: count,
                buffer: buf.len(),
            });
        }
        let values = payload.downcast::<Vec<T>>().map_err(|_| mismatch)?;
        buf[..count].copy_from_slice(&values);
        Ok(Status::new(source, tag, count))
    }
}

#[derive(Default)]
struct Mailbox {
    queue: Mutex<VecDeque<Envelope>>,
    arrived: Condvar,
}

/// The shared state of all ranks of one universe
pub(crate) struct Fabric {
    mailboxes: Vec<Mailbox>,
    next_context: AtomicU64,
    aborted: AtomicBool,
    abort_code: AtomicI32,
    receive_timeout: Option<Duration>,
}

impl Fabric {
    pub(crate) fn new(size: usize, receive_timeout: Option<Duration>) -> Fabric {
        Fabric {
            mailboxes: (0..size).map(|_| Mailbox::default()).collect(),
            next_context: AtomicU64::new(WORLD_CONTEXT + 1),
            aborted: AtomicBool::new(false),
            abort_code: AtomicI32::new(0),
            receive_timeout,
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.mailboxes.len()
    }

    /// Wakes every rank blocked in a receive; all of them, and everybody who tries to
    /// communicate afterwards, see `Error::Aborted`.
    pub(crate) fn abort(&self, code: i32) {
        if self.aborted.load(Ordering::SeqCst) {
            return;
        }
        self.abort_code.store(code, Ordering::SeqCst);
        if !self.aborted.swap(true, Ordering::SeqCst) {
            warn!(code, "aborting all ranks");
        }
        for mailbox in &self.mailboxes {
            // Taking the lock orders the wake-up after any waiter's last check of the flag.
            let _queue = mailbox.queue.lock();
            mailbox.arrived.notify_all();
        }
    }

    fn check_aborted(&self) -> Result<()> {
        if self.aborted.load(Ordering::SeqCst) {
            Err(Error::Aborted(self.abort_code.load(Ordering::SeqCst)))
        } else {
            Ok(())
        }
    }

    fn allocate_context(&self) -> ContextId {
        self.next_context.fetch_add(1, Ordering::Relaxed)
    }

    fn deliver(&self, world_rank: usize, envelope: Envelope) {
        let mailbox = &self.mailboxes[world_rank];
        mailbox.queue.lock().push_back(envelope);
        mailbox.arrived.notify_all();
    }

    /// Blocks until an envelope accepted by `pred` is in the mailbox of `world_rank`, then
    /// removes and returns the earliest such envelope.
    fn wait_for<P>(&self, world_rank: usize, rank: Rank, pred: P) -> Result<Envelope>
    where
        P: Fn(&Envelope) -> bool,
    {
        let mailbox = &self.mailboxes[world_rank];
        let deadline = self.receive_timeout.map(|after| (after, Instant::now() + after));
        let mut queue = mailbox.queue.lock();
        loop {
            self.check_aborted()?;
            let found = queue.iter().position(&pred);
            if let Some(envelope) = found.and_then(|pos| queue.remove(pos)) {
                return Ok(envelope);
            }
            match deadline {
                Some((after, deadline)) => {
                    if mailbox.arrived.wait_until(&mut queue, deadline).timed_out() {
                        self.check_aborted()?;
                        let found = queue.iter().position(&pred);
                        return found
                            .and_then(|pos| queue.remove(pos))
                            .ok_or(Error::Timeout { rank, after });
                    }
                }
                None => mailbox.arrived.wait(&mut queue),
            }
        }
    }

    /// Drops envelopes of a released communicator from the mailbox of `world_rank`.
    fn discard(&self, world_rank: usize, context: ContextId) -> usize {
        let mut queue = self.mailboxes[world_rank].queue.lock();
        let before = queue.len();
        queue.retain(|envelope| envelope.context != context);
        before - queue.len()
    }
}

/// A communicator of the in-process substrate
///
/// The world communicator of a rank is handed to the closure passed to `Universe::run()`;
/// further communicators come from `split_by_subgroup_collective()`.
pub struct LocalCommunicator {
    fabric: Arc<Fabric>,
    context: ContextId,
    // World rank of each member, indexed by rank in this communicator.
    members: Arc<[usize]>,
    rank: Rank,
    size: Rank,
}

impl LocalCommunicator {
    pub(crate) fn world(fabric: Arc<Fabric>, rank: Rank) -> Result<LocalCommunicator> {
        let size = count_as_rank(fabric.size())?;
        rank_index(rank, size)?;
        let members = (0..fabric.size()).collect();
        Ok(LocalCommunicator {
            fabric,
            context: WORLD_CONTEXT,
            members,
            rank,
            size,
        })
    }

    fn world_rank_of(&self, rank: Rank) -> Result<usize> {
        let index = rank_index(rank, self.size)?;
        Ok(self.members[index])
    }

    fn own_world_rank(&self) -> usize {
        // `rank` was validated on construction.
        self.members[self.rank as usize]
    }

    fn post<T: Equivalence>(
        &self,
        channel: Channel,
        buf: &[T],
        destination: Rank,
        tag: Tag,
    ) -> Result<()> {
        self.fabric.check_aborted()?;
        let target = self.world_rank_of(destination)?;
        trace!(
            context = self.context,
            ?channel,
            source = self.rank,
            destination,
            tag,
            count = buf.len(),
            "send"
        );
        self.fabric.deliver(
            target,
            Envelope {
                context: self.context,
                channel,
                source: self.rank,
                tag,
                datatype: T::equivalent_datatype(),
                count: buf.len(),
                payload: Box::new(buf.to_vec()),
            },
        );
        Ok(())
    }

    fn take<T: Equivalence>(
        &self,
        channel: Channel,
        buf: &mut [T],
        source: Option<Rank>,
        tag: Option<Tag>,
    ) -> Result<Status> {
        if let Some(source) = source {
            rank_index(source, self.size)?;
        }
        let context = self.context;
        let envelope = self
            .fabric
            .wait_for(self.own_world_rank(), self.rank, |envelope| {
                envelope.matches(context, channel, source, tag)
            })?;
        let status = envelope.unpack_into(buf)?;
        trace!(
            context,
            ?channel,
            destination = self.rank,
            source = status.source_rank(),
            tag = status.tag(),
            count = status.count(),
            "receive"
        );
        Ok(status)
    }

    /// Binomial tree broadcast: `ceil(log2(size))` rounds, each process receives once from its
    /// parent and then forwards to its children, largest subtree first.
    fn tree_broadcast<T: Equivalence>(&self, buf: &mut [T], root: Rank, tag: Tag) -> Result<()> {
        rank_index(root, self.size)?;
        let size = self.size;
        let relative = (self.rank - root + size) % size;

        let mut mask = 1;
        while mask < size {
            if relative & mask != 0 {
                let parent = (relative - mask + root) % size;
                let status = self.take(Channel::Collective, buf, Some(parent), Some(tag))?;
                filled(status, buf.len())?;
                break;
            }
            mask <<= 1;
        }
        mask >>= 1;
        while mask > 0 {
            if relative + mask < size {
                let child = (relative + mask + root) % size;
                self.post(Channel::Collective, buf, child, tag)?;
            }
            mask >>= 1;
        }
        Ok(())
    }
}

// Collective receives must fill the whole buffer, a shorter message is a mismatch between ranks.
fn filled(status: Status, expected: usize) -> Result<()> {
    if status.count() != expected {
        return Err(Error::CountMismatch {
            expected,
            actual: status.count(),
        });
    }
    Ok(())
}

impl fmt::Debug for LocalCommunicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCommunicator")
            .field("context", &self.context)
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl Communicator for LocalCommunicator {
    fn size(&self) -> Rank {
        self.size
    }

    fn rank(&self) -> Rank {
        self.rank
    }

    fn blocking_send<T: Equivalence>(&self, buf: &[T], destination: Rank, tag: Tag) -> Result<()> {
        self.post(Channel::PointToPoint, buf, destination, tag)
    }

    fn blocking_receive<T: Equivalence>(
        &self,
        buf: &mut [T],
        source: Option<Rank>,
        tag: Option<Tag>,
    ) -> Result<Status> {
        self.take(Channel::PointToPoint, buf, source, tag)
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
        // Sends never block here, so sending first cannot deadlock a ring.
        self.post(Channel::PointToPoint, msg, destination, send_tag)?;
        self.take(Channel::PointToPoint, buf, Some(source), Some(receive_tag))
    }

    fn split_by_subgroup_collective(&self, group: &Group) -> Result<Option<Self>> {
        debug!(
            context = self.context,
            rank = self.rank,
            members = group.size(),
            "collective subgroup split"
        );
        // Rank 0 picks the context of the new communicator and publishes its view of the group;
        // everybody checks it against their own.
        let mut header = [0u64; 2];
        if self.rank == 0 {
            header = [self.fabric.allocate_context(), group.members().len() as u64];
        }
        self.tree_broadcast(&mut header, 0, SPLIT_TAG)?;
        let [context, len] = header;
        let len = len.value_as::<usize>().map_err(|_| Error::GroupMismatch)?;

        let mut members = if self.rank == 0 {
            group.members().to_vec()
        } else {
            vec![0 as Rank; len]
        };
        self.tree_broadcast(&mut members, 0, SPLIT_TAG)?;
        if members.as_slice() != group.members() {
            return Err(Error::GroupMismatch);
        }

        let position = match members.iter().position(|&m| m == self.rank) {
            Some(position) => position,
            None => return Ok(None),
        };
        let world_members = members
            .iter()
            .map(|&m| self.world_rank_of(m))
            .collect::<Result<Arc<[usize]>>>()?;
        Ok(Some(LocalCommunicator {
            fabric: Arc::clone(&self.fabric),
            context,
            members: world_members,
            rank: count_as_rank(position)?,
            size: count_as_rank(members.len())?,
        }))
    }

    fn native_broadcast<T: Equivalence>(&self, buf: &mut [T], root: Rank) -> Result<()> {
        self.tree_broadcast(buf, root, BROADCAST_TAG)
    }

    fn native_scatter<T: Equivalence>(
        &self,
        sendbuf: Option<&[T]>,
        recvbuf: &mut [T],
        root: Rank,
    ) -> Result<()> {
        rank_index(root, self.size)?;
        let count = recvbuf.len();
        if self.rank != root {
            let status = self.take(Channel::Collective, recvbuf, Some(root), Some(SCATTER_TAG))?;
            return filled(status, count);
        }

        let sendbuf = sendbuf.ok_or(Error::MissingSendBuffer)?;
        let required = count * self.members.len();
        if sendbuf.len() < required {
            return Err(Error::SendBufferTooShort {
                required,
                actual: sendbuf.len(),
            });
        }
        for (index, destination) in (0..self.size).enumerate() {
            let section = &sendbuf[index * count..(index + 1) * count];
            if destination == root {
                recvbuf.copy_from_slice(section);
            } else {
                self.post(Channel::Collective, section, destination, SCATTER_TAG)?;
            }
        }
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        let mut token: [u8; 0] = [];
        if self.rank == 0 {
            for source in 1..self.size {
                self.take(Channel::Collective, &mut token[..], Some(source), Some(BARRIER_TAG))?;
            }
            for destination in 1..self.size {
                self.post(Channel::Collective, &token[..], destination, BARRIER_TAG)?;
            }
        } else {
            self.post(Channel::Collective, &token[..], 0, BARRIER_TAG)?;
            self.take(Channel::Collective, &mut token[..], Some(0), Some(BARRIER_TAG))?;
        }
        Ok(())
    }

    fn abort(&self, errorcode: i32) {
        self.fabric.abort(errorcode);
    }
}

impl Drop for LocalCommunicator {
    fn drop(&mut self) {
        if self.context == WORLD_CONTEXT {
            return;
        }
        let stale = self.fabric.discard(self.own_world_rank(), self.context);
        if stale > 0 {
            debug!(context = self.context, stale, "released communicator with undelivered messages");
        } else {
            trace!(context = self.context, "released communicator");
        }
    }
}
