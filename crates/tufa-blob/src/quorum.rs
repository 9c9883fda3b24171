//! Quorum-replicated append path
//!
//! A [`QuorumWriter`] appends to one object replicated on a fixed set of
//! blob servers. Each replica gets a persistent worker thread with its own
//! dedicated connection (not pooled) and a FIFO queue. A write fans out to
//! every queue and returns as soon as a majority acknowledges; the slower
//! minority keeps working through its queue in the background.
//!
//! ```text
//!                    write_and_sync(data)
//!                           │ epoch = next round, offset = cursor
//!          ┌────────────────┼────────────────┐
//!          ▼                ▼                ▼
//!     [queue] w0       [queue] w1       [queue] w2      one thread each
//!          │ AppendSync     │ AppendSync     │ AppendSync
//!          ▼                ▼                ▼
//!     report(epoch)    report(epoch)    report(epoch)   stale epochs dropped
//!          └────────────────┴───────┬────────┘
//!                                   ▼
//!               successes >= quorum  or  failures > n - quorum
//! ```
//!
//! A replica whose worker has exited (closed or panicked) without
//! answering the current round counts as a failure for that round.
//!
//! Only one round may be in flight; a second concurrent call is rejected
//! with [`BlobError::ConcurrentWrite`].

use crate::data::{DataClient, DataOptions};
use crate::error::{BlobError, BlobResult};
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tufa_common::config::QuorumConfig;
use tufa_common::{ObjectId, ReplicaInfo, majority};

/// Connection used by a replica worker.
///
/// [`DataClient`] is the production implementation; tests substitute
/// scripted doubles through [`QuorumWriter::with_factory`].
pub trait ReplicaConnection: Send {
    fn append_sync(&mut self, id: ObjectId, offset: u64, data: &[u8]) -> BlobResult<()>;

    fn close(&mut self);
}

impl ReplicaConnection for DataClient {
    fn append_sync(&mut self, id: ObjectId, offset: u64, data: &[u8]) -> BlobResult<()> {
        DataClient::append_sync(self, id, offset, data)
    }

    fn close(&mut self) {
        DataClient::close(self);
    }
}

#[derive(Clone)]
struct QuorumRequest {
    epoch: u64,
    offset: u64,
    data: Bytes,
}

struct WriterState {
    /// Next append position
    offset: u64,
    /// Round whose results are currently counted
    epoch: u64,
    successes: usize,
    failures: usize,
    last_error: Option<BlobError>,
    in_flight: bool,
    closed: bool,
    /// Per replica: answered the current round
    reported: Vec<bool>,
    /// Per replica: worker has exited
    exited: Vec<bool>,
    senders: Vec<Sender<QuorumRequest>>,
}

impl WriterState {
    /// Failures in the current round, counting replicas that can no longer
    /// answer it
    fn failed(&self) -> usize {
        let silent = self
            .exited
            .iter()
            .zip(&self.reported)
            .filter(|&(&exited, &reported)| exited && !reported)
            .count();
        self.failures + silent
    }
}

struct Shared {
    state: Mutex<WriterState>,
    cond: Condvar,
}

impl Shared {
    fn report_result(&self, replica: usize, epoch: u64, result: BlobResult<()>) {
        let mut state = self.state.lock();
        if epoch != state.epoch {
            debug!(replica, epoch, current = state.epoch, "discarding late replica result");
            return;
        }
        state.reported[replica] = true;
        match result {
            Ok(()) => state.successes += 1,
            Err(e) => {
                state.failures += 1;
                state.last_error = Some(e);
            }
        }
        self.cond.notify_one();
    }

    fn mark_exited(&self, replica: usize) {
        let mut state = self.state.lock();
        if !state.exited[replica] {
            state.exited[replica] = true;
            self.cond.notify_one();
        }
    }
}

/// Marks a replica's worker as exited when its thread ends, including by
/// panic. Runs before the worker's queue is dropped.
struct WorkerExit {
    shared: Arc<Shared>,
    replica: usize,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        self.shared.mark_exited(self.replica);
    }
}

/// Majority-quorum writer for one replicated object
pub struct QuorumWriter {
    object_id: ObjectId,
    quorum: usize,
    replicas: usize,
    default_timeout: Option<Duration>,
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl QuorumWriter {
    /// Create a writer with a dedicated [`DataClient`] per replica
    pub fn new(object_id: ObjectId, replicas: &[ReplicaInfo]) -> BlobResult<Self> {
        Self::with_options(object_id, replicas, &QuorumConfig::default(), &DataOptions::default())
    }

    /// Create a writer from configuration
    pub fn with_options(
        object_id: ObjectId,
        replicas: &[ReplicaInfo],
        config: &QuorumConfig,
        options: &DataOptions,
    ) -> BlobResult<Self> {
        let mut writer = Self::with_factory(object_id, replicas, |addr| {
            DataClient::with_options(addr, options.clone())
        })?;
        writer.default_timeout = config.write_timeout();
        Ok(writer)
    }

    /// Create a writer whose replica connections come from `factory`
    pub fn with_factory<F, C>(
        object_id: ObjectId,
        replicas: &[ReplicaInfo],
        mut factory: F,
    ) -> BlobResult<Self>
    where
        F: FnMut(&str) -> C,
        C: ReplicaConnection + 'static,
    {
        if replicas.is_empty() {
            return Err(BlobError::NoReplicas);
        }

        let writer = Self {
            object_id,
            quorum: majority(replicas.len()),
            replicas: replicas.len(),
            default_timeout: None,
            shared: Arc::new(Shared {
                state: Mutex::new(WriterState {
                    offset: 0,
                    epoch: 0,
                    successes: 0,
                    failures: 0,
                    last_error: None,
                    in_flight: false,
                    closed: false,
                    reported: vec![false; replicas.len()],
                    exited: vec![false; replicas.len()],
                    senders: Vec::with_capacity(replicas.len()),
                }),
                cond: Condvar::new(),
            }),
            handles: Mutex::new(Vec::with_capacity(replicas.len())),
        };

        for (index, replica) in replicas.iter().enumerate() {
            let conn = factory(&replica.addr);
            writer.spawn_worker(index, &replica.addr, Box::new(conn))?;
        }

        info!(
            object = %object_id,
            replicas = writer.replicas,
            quorum = writer.quorum,
            "started quorum writer"
        );
        Ok(writer)
    }

    fn spawn_worker(
        &self,
        replica: usize,
        addr: &str,
        conn: Box<dyn ReplicaConnection>,
    ) -> BlobResult<()> {
        let (tx, rx) = unbounded();
        let exit = WorkerExit {
            shared: Arc::clone(&self.shared),
            replica,
        };
        let object_id = self.object_id;
        let worker_addr = addr.to_string();

        let handle = thread::Builder::new()
            .name(format!("quorum-{addr}"))
            .spawn(move || run_worker(object_id, &worker_addr, conn, &rx, exit))
            .map_err(BlobError::Spawn)?;

        self.shared.state.lock().senders.push(tx);
        self.handles.lock().push(handle);
        Ok(())
    }

    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// Acknowledgments needed per round
    #[must_use]
    pub fn quorum(&self) -> usize {
        self.quorum
    }

    #[must_use]
    pub fn replica_count(&self) -> usize {
        self.replicas
    }

    /// Offset the next write will be appended at
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.shared.state.lock().offset
    }

    /// Append `data` on every replica and wait for a majority to sync it.
    ///
    /// Waits without a deadline unless the writer was configured with a
    /// write timeout. Returns the last replica error once quorum can no
    /// longer be reached.
    pub fn write_and_sync(&self, data: impl Into<Bytes>) -> BlobResult<()> {
        let deadline = self.default_timeout.map(|t| Instant::now() + t);
        self.write_round(data.into(), deadline)
    }

    /// Like [`write_and_sync`](Self::write_and_sync) but gives up with
    /// [`BlobError::Timeout`] after `timeout`. Replicas still finish the
    /// write in the background.
    pub fn write_and_sync_timeout(
        &self,
        data: impl Into<Bytes>,
        timeout: Duration,
    ) -> BlobResult<()> {
        self.write_round(data.into(), Some(Instant::now() + timeout))
    }

    fn write_round(&self, data: Bytes, deadline: Option<Instant>) -> BlobResult<()> {
        let (request, senders) = self.begin_round(data)?;

        for (replica, tx) in senders.iter().enumerate() {
            if tx.send(request.clone()).is_err() {
                warn!(object = %self.object_id, replica, "replica worker is gone");
                self.shared.mark_exited(replica);
            }
        }
        drop(senders);

        self.wait_for_quorum(deadline)
    }

    fn begin_round(
        &self,
        data: Bytes,
    ) -> BlobResult<(QuorumRequest, Vec<Sender<QuorumRequest>>)> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(BlobError::Closed);
        }
        if state.in_flight {
            return Err(BlobError::ConcurrentWrite);
        }

        let offset = state.offset;
        state.offset += data.len() as u64;
        state.epoch += 1;
        state.successes = 0;
        state.failures = 0;
        state.last_error = None;
        state.reported.fill(false);
        state.in_flight = true;

        debug!(
            object = %self.object_id,
            epoch = state.epoch,
            offset,
            len = data.len(),
            "starting write round"
        );
        let request = QuorumRequest {
            epoch: state.epoch,
            offset,
            data,
        };
        Ok((request, state.senders.clone()))
    }

    fn wait_for_quorum(&self, deadline: Option<Instant>) -> BlobResult<()> {
        let max_failures = self.replicas - self.quorum;
        let mut state = self.shared.state.lock();
        let mut timed_out = false;

        let outcome = loop {
            if state.successes >= self.quorum {
                break Ok(());
            }
            if state.failed() > max_failures {
                // Only exited workers, no replica error: the writer is gone.
                break Err(state.last_error.take().unwrap_or(BlobError::Closed));
            }
            if timed_out {
                break Err(BlobError::Timeout);
            }
            match deadline {
                None => self.shared.cond.wait(&mut state),
                Some(deadline) => {
                    timed_out = self.shared.cond.wait_until(&mut state, deadline).timed_out();
                }
            }
        };

        state.in_flight = false;
        if let Err(e) = &outcome {
            warn!(
                object = %self.object_id,
                epoch = state.epoch,
                successes = state.successes,
                failures = state.failed(),
                error = %e,
                "write round failed"
            );
        }
        outcome
    }

    /// Stop all workers. Requests already queued are still sent before each
    /// worker closes its connection and exits. Blocks until every worker has
    /// exited; idempotent.
    pub fn close(&self) {
        let senders = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.senders)
        };
        drop(senders);

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if handle.join().is_err() {
                error!(object = %self.object_id, "replica worker panicked");
            }
        }
        info!(object = %self.object_id, "closed quorum writer");
    }
}

impl Drop for QuorumWriter {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for QuorumWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuorumWriter")
            .field("object_id", &self.object_id)
            .field("replicas", &self.replicas)
            .field("quorum", &self.quorum)
            .finish_non_exhaustive()
    }
}

fn run_worker(
    object_id: ObjectId,
    addr: &str,
    mut conn: Box<dyn ReplicaConnection>,
    queue: &Receiver<QuorumRequest>,
    exit: WorkerExit,
) {
    debug!(addr, object = %object_id, "replica worker started");

    // Ends once every sender is gone and the queue is drained.
    for request in queue.iter() {
        let result = conn.append_sync(object_id, request.offset, &request.data);
        if let Err(e) = &result {
            warn!(
                addr,
                object = %object_id,
                offset = request.offset,
                error = %e,
                "replica append failed"
            );
        }
        exit.shared.report_result(exit.replica, request.epoch, result);
    }

    conn.close();
    debug!(addr, object = %object_id, "replica worker stopped");
}
