//! Collective communication between SPMD workers.
//!
//! The as-of path needs two blocking collectives: an all-gather of each
//! worker's left key range and a variable-size all-to-all of right rows.
//! [`Communicator`] names exactly those. [`SingleProcess`] is the trivial
//! one-worker group; [`LocalCluster`] runs a group of workers as threads in
//! one process, exchanging values through a shared mailbox.
//!
//! Collectives have no timeout. A worker that leaves the group (its handle
//! is dropped) while peers wait in a collective it will never enter makes
//! each of them fail with [`FrameError::DistributedCollectiveFailure`].

use std::any::Any;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use fframe_error::{FrameError, Result};

/// One member of a fixed-size worker group.
///
/// Every worker must enter the same collectives in the same order.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Contribute `value`; returns every worker's value in rank order.
    fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> Result<Vec<T>>;

    /// Send `outgoing[d]` to worker `d`; returns what each worker sent here,
    /// in rank order. `outgoing` must hold exactly `size()` entries.
    fn all_to_all<T: Send + 'static>(&self, outgoing: Vec<T>) -> Result<Vec<T>>;
}

/// A group of one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> Result<Vec<T>> {
        Ok(vec![value])
    }

    fn all_to_all<T: Send + 'static>(&self, outgoing: Vec<T>) -> Result<Vec<T>> {
        check_outgoing("all_to_all", 0, 1, outgoing.len())?;
        Ok(outgoing)
    }
}

fn check_outgoing(op: &'static str, rank: usize, size: usize, got: usize) -> Result<()> {
    if got == size {
        Ok(())
    } else {
        Err(FrameError::collective(
            op,
            rank,
            format!("expected {size} outgoing slots, got {got}"),
        ))
    }
}

type Payload = Box<dyn Any + Send>;

struct MailboxState {
    /// `slots[src][dst]`, filled during deposit, drained during collect.
    slots: Vec<Vec<Option<Payload>>>,
    deposited: usize,
    collected: usize,
    /// True between the last deposit of a round and its last collect.
    collecting: bool,
    /// Bumped when every worker has deposited.
    generation: u64,
    departed: Option<usize>,
}

struct Mailbox {
    size: usize,
    state: Mutex<MailboxState>,
    turn: Condvar,
}

impl Mailbox {
    fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(MailboxState {
                slots: (0..size).map(|_| (0..size).map(|_| None).collect()).collect(),
                deposited: 0,
                collected: 0,
                collecting: false,
                generation: 0,
                departed: None,
            }),
            turn: Condvar::new(),
        }
    }

    fn exchange(&self, rank: usize, outgoing: Vec<Payload>) -> Result<Vec<Payload>> {
        let op = "all_to_all";
        let mut state = self.state.lock();

        // A new round starts only once the previous one is fully collected.
        while state.collecting {
            self.turn.wait(&mut state);
        }
        if let Some(gone) = state.departed {
            return Err(FrameError::collective(
                op,
                rank,
                format!("worker {gone} left the group"),
            ));
        }

        for (dst, payload) in outgoing.into_iter().enumerate() {
            state.slots[rank][dst] = Some(payload);
        }
        state.deposited += 1;
        let generation = state.generation;
        if state.deposited == self.size {
            state.deposited = 0;
            state.collecting = true;
            state.generation += 1;
            self.turn.notify_all();
        } else {
            while state.generation == generation {
                if let Some(gone) = state.departed {
                    return Err(FrameError::collective(
                        op,
                        rank,
                        format!("worker {gone} left the group before depositing"),
                    ));
                }
                self.turn.wait(&mut state);
            }
        }

        let mut received = Vec::with_capacity(self.size);
        for src in 0..self.size {
            let payload = state.slots[src][rank].take().ok_or_else(|| {
                FrameError::collective(op, rank, format!("no payload from worker {src}"))
            })?;
            received.push(payload);
        }
        state.collected += 1;
        if state.collected == self.size {
            state.collected = 0;
            state.collecting = false;
            self.turn.notify_all();
        }
        Ok(received)
    }

    fn depart(&self, rank: usize) {
        let mut state = self.state.lock();
        state.departed.get_or_insert(rank);
        self.turn.notify_all();
    }
}

/// An in-process worker group; see [`LocalCluster::run`].
pub struct LocalCluster {
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for LocalCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCluster")
            .field("size", &self.mailbox.size)
            .finish_non_exhaustive()
    }
}

impl LocalCluster {
    /// # Errors
    ///
    /// Returns a configuration error for an empty group.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(FrameError::configuration(
                "size = 0",
                "a worker group needs at least one worker",
            ));
        }
        Ok(Self {
            mailbox: Arc::new(Mailbox::new(size)),
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.mailbox.size
    }

    /// One handle per rank, in rank order.
    #[must_use]
    pub fn into_workers(self) -> Vec<LocalWorker> {
        (0..self.mailbox.size)
            .map(|rank| LocalWorker {
                rank,
                mailbox: Arc::clone(&self.mailbox),
            })
            .collect()
    }

    /// Run `f` once per rank, each on its own scoped thread, and return the
    /// results in rank order. A panicking worker re-raises its panic here.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty group, or an internal
    /// error when a thread cannot be spawned.
    pub fn run<F, R>(size: usize, f: F) -> Result<Vec<R>>
    where
        F: Fn(LocalWorker) -> R + Sync,
        R: Send,
    {
        let workers = Self::new(size)?.into_workers();
        let f = &f;
        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(size);
            for worker in workers {
                let handle = std::thread::Builder::new()
                    .name(format!("fframe-rank-{}", worker.rank))
                    .spawn_scoped(scope, move || f(worker))
                    .map_err(|e| FrameError::internal(format!("spawn worker thread: {e}")))?;
                handles.push(handle);
            }
            Ok(handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect())
        })
    }
}

/// One rank of a [`LocalCluster`]. Dropping it leaves the group.
pub struct LocalWorker {
    rank: usize,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for LocalWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWorker")
            .field("rank", &self.rank)
            .field("size", &self.mailbox.size)
            .finish()
    }
}

impl Communicator for LocalWorker {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.mailbox.size
    }

    fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> Result<Vec<T>> {
        let outgoing = vec![value; self.mailbox.size];
        self.all_to_all(outgoing).map_err(|e| match e {
            FrameError::DistributedCollectiveFailure { rank, detail, .. } => {
                FrameError::collective("all_gather", rank, detail)
            }
            other => other,
        })
    }

    fn all_to_all<T: Send + 'static>(&self, outgoing: Vec<T>) -> Result<Vec<T>> {
        check_outgoing("all_to_all", self.rank, self.mailbox.size, outgoing.len())?;
        let boxed = outgoing.into_iter().map(|v| Box::new(v) as Payload).collect();
        let received = self.mailbox.exchange(self.rank, boxed)?;
        received
            .into_iter()
            .enumerate()
            .map(|(src, payload)| {
                payload.downcast::<T>().map(|v| *v).map_err(|_| {
                    FrameError::collective(
                        "all_to_all",
                        self.rank,
                        format!("worker {src} entered a different collective"),
                    )
                })
            })
            .collect()
    }
}

impl Drop for LocalWorker {
    fn drop(&mut self) {
        tracing::trace!(rank = self.rank, "worker leaving group");
        self.mailbox.depart(self.rank);
    }
}
