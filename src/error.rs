//! Error handling
//!
//! Failures fall in two classes, see `ErrorKind`. Neither is retried: a mismatched or lost
//! message is a defect of the program, and a failed substrate call leaves the other participants
//! blocked in a collective, so the right response is to abort the whole participant set.

use std::time::Duration;

use thiserror::Error;

use crate::topology::Rank;

/// Result type of all fallible operations in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// The class of an `Error`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    /// The caller broke a precondition: bad rank, mismatched counts or types, bad settings.
    Configuration,
    /// The substrate failed underneath the operation, or the participant set was aborted.
    Substrate,
}

/// Errors reported by communicators and the collective layer
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// A rank outside of `[0, size)` of the communicator it is used with
    #[error("invalid rank {rank} for a communicator of size {size}")]
    InvalidRank {
        /// The offending rank
        rank: Rank,
        /// Size of the communicator
        size: Rank,
    },

    /// A rank that appears twice in a destination set or group rank list
    #[error("rank {0} appears more than once")]
    DuplicateRank(Rank),

    /// The source rank of a fan-out broadcast listed among its own destinations
    #[error("source rank {0} is listed among its own broadcast destinations")]
    SourceListed(Rank),

    /// A receive buffer that does not hold the per-rank element count
    #[error("receive buffer holds {actual} elements, expected {expected}")]
    CountMismatch {
        /// Elements expected per rank
        expected: usize,
        /// Elements in the buffer
        actual: usize,
    },

    /// A send buffer at the root too short for one section per rank
    #[error("send buffer holds {actual} elements, at least {required} are needed")]
    SendBufferTooShort {
        /// `size * count_per_rank`
        required: usize,
        /// Elements in the buffer
        actual: usize,
    },

    /// The root of a scatter did not supply a send buffer
    #[error("the root rank must supply a send buffer")]
    MissingSendBuffer,

    /// A message received into a buffer of a different element type
    #[error("message of {sent} elements received into a buffer of {expected} elements")]
    TypeMismatch {
        /// Element type of the message
        sent: &'static str,
        /// Element type of the receive buffer
        expected: &'static str,
    },

    /// A message longer than the buffer it was received into
    #[error("message of {message} elements does not fit a buffer of {buffer} elements")]
    Truncated {
        /// Elements in the message
        message: usize,
        /// Elements in the buffer
        buffer: usize,
    },

    /// Ranks that passed different groups to a collective sub-communicator split
    #[error("ranks disagree on the group passed to a collective split")]
    GroupMismatch,

    /// A second contribution from the same rank during an ordered gather
    #[error("rank {0} contributed more than once")]
    DuplicateContribution(Rank),

    /// A slot of an ordered gather that was never written
    #[error("no contribution from rank {0}")]
    MissingContribution(Rank),

    /// A universe with an unusable number of ranks
    #[error("a universe needs between 1 and {max} ranks, got {requested}", max = Rank::MAX)]
    InvalidSize {
        /// Requested number of ranks
        requested: usize,
    },

    /// A configuration value that could not be parsed
    #[error("invalid value {value:?} for {key}")]
    InvalidConfig {
        /// Name of the setting
        key: &'static str,
        /// The raw value
        value: String,
    },

    /// A blocking receive that did not match a message within the configured timeout
    #[error("receive on rank {rank} timed out after {after:?}")]
    Timeout {
        /// The rank that was waiting
        rank: Rank,
        /// The configured timeout
        after: Duration,
    },

    /// The participant set was aborted, possibly by another rank
    #[error("communication aborted with error code {0}")]
    Aborted(i32),

    /// A rank panicked while running its part of the program
    #[error("rank {rank} panicked: {message}")]
    RankPanicked {
        /// The rank that panicked
        rank: Rank,
        /// The panic payload, if it was a string
        message: String,
    },

    /// The thread for a rank could not be started
    #[error("could not start rank {rank}: {message}")]
    Spawn {
        /// The rank that could not be started
        rank: Rank,
        /// The OS error
        message: String,
    },

    /// The native substrate was already initialized in this process
    #[error("the message passing library has already been initialized")]
    AlreadyInitialized,
}

impl Error {
    /// The class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use self::Error::*;
        match *self {
            InvalidRank { .. }
            | DuplicateRank(_)
            | SourceListed(_)
            | CountMismatch { .. }
            | SendBufferTooShort { .. }
            | MissingSendBuffer
            | TypeMismatch { .. }
            | Truncated { .. }
            | GroupMismatch
            | DuplicateContribution(_)
            | MissingContribution(_)
            | InvalidSize { .. }
            | InvalidConfig { .. } => ErrorKind::Configuration,
            Timeout { .. }
            | Aborted(_)
            | RankPanicked { .. }
            | Spawn { .. }
            | AlreadyInitialized => ErrorKind::Substrate,
        }
    }

    /// True for the error every other rank observes once some rank aborted.
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted(_))
    }
}
