//! Environmental management
//!
//! A `Universe` describes one computation over a fixed number of ranks on the in-process
//! substrate. `Universe::run()` starts one thread per rank, hands each its world communicator and
//! collects the results in rank order.
//!
//! Failure of one rank is failure of all of them: when a rank returns an error or panics, the
//! universe is aborted, every rank blocked in a receive wakes up with `Error::Aborted` and
//! `run()` reports the error that started it.

use std::any::Any;
use std::env;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, debug_span, warn};

use crate::error::{Error, Result};
use crate::local::{Fabric, LocalCommunicator};
use crate::topology::{count_as_rank, Rank};

/// Number of ranks used by `UniverseConfig::from_env()` when `FANOUT_NUM_RANKS` is not set
pub const DEFAULT_NUM_RANKS: usize = 4;

const NUM_RANKS_VAR: &str = "FANOUT_NUM_RANKS";
const RECV_TIMEOUT_VAR: &str = "FANOUT_RECV_TIMEOUT_MS";

// Error code used when a rank fails on its own.
const FAILURE_CODE: i32 = 1;

/// Settings of a `Universe`
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fanout::UniverseConfig;
///
/// let config = UniverseConfig::new(8)
///     .receive_timeout(Duration::from_secs(5))
///     .thread_name_prefix("worker-");
/// assert_eq!(config.size(), 8);
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UniverseConfig {
    size: usize,
    receive_timeout: Option<Duration>,
    thread_name_prefix: String,
}

impl UniverseConfig {
    /// A universe of `size` ranks, receives wait forever.
    pub fn new(size: usize) -> UniverseConfig {
        UniverseConfig {
            size,
            receive_timeout: None,
            thread_name_prefix: String::from("rank-"),
        }
    }

    /// Fail a blocking receive with `Error::Timeout` after waiting for `timeout`.
    pub fn receive_timeout(mut self, timeout: Duration) -> UniverseConfig {
        self.receive_timeout = Some(timeout);
        self
    }

    /// Name rank threads `<prefix><rank>`.
    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> UniverseConfig {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Read the settings from the environment.
    ///
    /// - `FANOUT_NUM_RANKS`: number of ranks, `DEFAULT_NUM_RANKS` if unset
    /// - `FANOUT_RECV_TIMEOUT_MS`: receive timeout in milliseconds, none if unset
    pub fn from_env() -> Result<UniverseConfig> {
        UniverseConfig::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<L>(lookup: L) -> Result<UniverseConfig>
    where
        L: Fn(&str) -> Option<String>,
    {
        let size = match lookup(NUM_RANKS_VAR) {
            Some(raw) => raw.trim().parse().map_err(|_| Error::InvalidConfig {
                key: NUM_RANKS_VAR,
                value: raw,
            })?,
            None => DEFAULT_NUM_RANKS,
        };
        let mut config = UniverseConfig::new(size);
        if let Some(raw) = lookup(RECV_TIMEOUT_VAR) {
            let millis = raw.trim().parse().map_err(|_| Error::InvalidConfig {
                key: RECV_TIMEOUT_VAR,
                value: raw,
            })?;
            config = config.receive_timeout(Duration::from_millis(millis));
        }
        config.validate()?;
        Ok(config)
    }

    /// Number of ranks
    pub fn size(&self) -> usize {
        self.size
    }

    /// The receive timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.receive_timeout
    }

    fn validate(&self) -> Result<Rank> {
        if self.size == 0 {
            return Err(Error::InvalidSize {
                requested: self.size,
            });
        }
        count_as_rank(self.size)
    }
}

/// A computation over a fixed set of ranks
#[derive(Debug)]
pub struct Universe {
    config: UniverseConfig,
    size: Rank,
}

impl Universe {
    /// Check `config` and set up a universe with it.
    pub fn new(config: UniverseConfig) -> Result<Universe> {
        let size = config.validate()?;
        Ok(Universe { config, size })
    }

    /// The settings this universe was created with
    pub fn config(&self) -> &UniverseConfig {
        &self.config
    }

    /// Number of ranks
    pub fn size(&self) -> Rank {
        self.size
    }

    /// Run `f` on every rank, each with its own world communicator.
    ///
    /// Returns the results of all ranks, indexed by rank. If any rank fails, returns the error of
    /// the lowest failing rank that did not merely observe the abort.
    ///
    /// # Examples
    ///
    /// ```
    /// use fanout::traits::*;
    ///
    /// let universe = fanout::initialize(3).unwrap();
    /// let ranks = universe.run(|world| Ok(world.rank())).unwrap();
    /// assert_eq!(ranks, vec![0, 1, 2]);
    /// ```
    pub fn run<F, R>(&self, f: F) -> Result<Vec<R>>
    where
        F: Fn(&LocalCommunicator) -> Result<R> + Sync,
        R: Send,
    {
        let fabric = Arc::new(Fabric::new(self.config.size, self.config.receive_timeout));
        debug!(
            size = self.size,
            timeout = ?self.config.receive_timeout,
            "starting universe"
        );

        let outcomes: Vec<Result<R>> = thread::scope(|scope| {
            let f = &f;
            let mut handles = Vec::with_capacity(self.config.size);
            for rank in 0..self.size {
                let rank_fabric = Arc::clone(&fabric);
                let spawned = thread::Builder::new()
                    .name(format!("{}{}", self.config.thread_name_prefix, rank))
                    .spawn_scoped(scope, move || run_rank(rank_fabric, rank, f));
                match spawned {
                    Ok(handle) => handles.push(Ok(handle)),
                    Err(e) => {
                        fabric.abort(FAILURE_CODE);
                        handles.push(Err(Error::Spawn {
                            rank,
                            message: e.to_string(),
                        }));
                    }
                }
            }
            handles
                .into_iter()
                .zip(0..)
                .map(|(handle, rank)| match handle {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or_else(|payload| Err(panicked(rank, payload))),
                    Err(e) => Err(e),
                })
                .collect()
        });

        let mut values = Vec::with_capacity(outcomes.len());
        let mut abort = None;
        let mut origin = None;
        for outcome in outcomes {
            match outcome {
                Ok(value) => values.push(value),
                Err(e) if e.is_abort() => {
                    abort.get_or_insert(e);
                }
                Err(e) => {
                    origin.get_or_insert(e);
                }
            }
        }
        match origin.or(abort) {
            Some(e) => Err(e),
            None => {
                debug!(size = self.size, "universe finished");
                Ok(values)
            }
        }
    }
}

fn run_rank<F, R>(fabric: Arc<Fabric>, rank: Rank, f: &F) -> Result<R>
where
    F: Fn(&LocalCommunicator) -> Result<R>,
{
    let span = debug_span!("rank", rank);
    let _entered = span.enter();

    let outcome = LocalCommunicator::world(Arc::clone(&fabric), rank).and_then(|world| {
        panic::catch_unwind(AssertUnwindSafe(|| f(&world)))
            .unwrap_or_else(|payload| Err(panicked(rank, payload)))
    });
    if let Err(ref error) = outcome {
        if !error.is_abort() {
            warn!(%error, "rank failed");
            fabric.abort(FAILURE_CODE);
        }
    }
    outcome
}

fn panicked(rank: Rank, payload: Box<dyn Any + Send>) -> Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("non-string panic payload"));
    Error::RankPanicked { rank, message }
}

/// Set up a universe of `size` ranks with default settings.
pub fn initialize(size: usize) -> Result<Universe> {
    Universe::new(UniverseConfig::new(size))
}

/// Set up a universe as described by `UniverseConfig::from_env()`.
pub fn initialize_from_env() -> Result<Universe> {
    Universe::new(UniverseConfig::from_env()?)
}
