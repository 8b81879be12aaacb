//! Admission control and priority scheduling of request programs.
//!
//! At most `worker_count` requests are Live (running on a worker) at once.
//! Arrivals beyond that wait in a priority queue ordered by `(qos desc,
//! ordinal asc)`; arrivals that would push `live + queued` past
//! `max_in_flight` are refused at the connection level.
//!
//! Every piece of admission state (queue, slot count, statistics) lives in one
//! [`SchedulerState`] behind one lock, so counts and queue order never
//! disagree. Workers and I/O callback threads reach it through [`Shared`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::core::context::{ContextState, RequestContext};
use crate::core::error::SchedulerError;
use crate::core::qos::{Qos, QosClassifier};
use crate::core::sensor::Sensor;
use crate::core::step::Step;
use crate::core::worker::spawn_worker;
use crate::infra::queue::{InMemoryQueue, QueueKey};
use crate::transport::{ErrorFormatter, Exchange, Response};
use crate::util::panic_message;

/// Snapshot of scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Worker pool size.
    pub worker_count: usize,
    /// Hard cap on `live + queued`.
    pub max_in_flight: usize,
    /// Requests holding a worker slot.
    pub live: usize,
    /// Requests waiting for a worker slot.
    pub queued: usize,
    /// `live + queued`.
    pub active: usize,
    /// Requests accepted by [`Scheduler::submit`].
    pub submitted: u64,
    /// Requests finalized after sending a response.
    pub completed: u64,
    /// Requests refused at the connection level.
    pub rejected: u64,
    /// Requests that hit an internal or I/O error.
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// New arrival; subject to the in-flight cap.
    Fresh,
    /// Coming back from I/O; ranked by its original ordinal under the same cap.
    Resumed,
}

struct SchedulerState {
    queue: InMemoryQueue<Box<RequestContext>>,
    live: usize,
    /// Admitted and not yet finalized, including requests suspended for I/O.
    outstanding: usize,
    stopped: bool,
    job_tx: Option<Sender<Box<RequestContext>>>,
    submitted: u64,
    completed: u64,
    rejected: u64,
    failed: u64,
}

impl SchedulerState {
    fn is_idle(&self) -> bool {
        self.live == 0 && self.queue.is_empty() && self.outstanding == 0
    }

    fn start_live(&mut self, mut ctx: Box<RequestContext>) -> Result<(), (Box<RequestContext>, SchedulerError)> {
        let Some(job_tx) = self.job_tx.as_ref() else {
            return Err((ctx, SchedulerError::Shutdown));
        };
        ctx.set_state(ContextState::Live);
        match job_tx.send(ctx) {
            Ok(()) => {
                self.live += 1;
                Ok(())
            }
            Err(returned) => Err((returned.into_inner(), SchedulerError::Shutdown)),
        }
    }
}

/// State shared by the scheduler handle, its workers and the I/O bridge.
pub(crate) struct Shared {
    pub(crate) config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    idle: Condvar,
    next_ordinal: AtomicU64,
    pub(crate) sensor: Arc<dyn Sensor>,
    pub(crate) formatter: Arc<dyn ErrorFormatter>,
    classifier: Arc<dyn QosClassifier>,
}

impl Shared {
    fn classify(&self, exchange: &dyn Exchange) -> Qos {
        panic::catch_unwind(AssertUnwindSafe(|| self.classifier.classify(exchange.metadata())))
            .unwrap_or_else(|payload| {
                warn!(panic = %panic_message(payload.as_ref()), "qos classifier panicked");
                self.config.default_qos
            })
    }

    /// Make `ctx` Live if a slot is free, otherwise queue it.
    pub(crate) fn admit(
        &self,
        mut ctx: Box<RequestContext>,
        admission: Admission,
    ) -> Result<(), (Box<RequestContext>, SchedulerError)> {
        let mut state = self.state.lock();
        if state.stopped {
            return Err((ctx, SchedulerError::Shutdown));
        }
        let ordinal = ctx.ordinal();
        let qos = ctx.qos();

        if state.live < self.config.worker_count {
            state.start_live(ctx)?;
            debug!(ordinal, qos = %qos, live = state.live, ?admission, "admitted live");
        } else {
            if state.live + state.queue.len() >= self.config.max_in_flight {
                return Err((ctx, SchedulerError::CapacityExceeded {
                    max_in_flight: self.config.max_in_flight,
                }));
            }
            ctx.set_state(ContextState::Queued);
            state.queue.enqueue(QueueKey::new(qos, ordinal), ctx)?;
            debug!(ordinal, qos = %qos, queued = state.queue.len(), ?admission, "queued");
        }

        if admission == Admission::Fresh {
            state.outstanding += 1;
            state.submitted += 1;
        }
        Ok(())
    }

    /// Give back a worker slot and promote the best queued request into it.
    pub(crate) fn release_slot(&self) {
        let mut refused = Vec::new();
        {
            let mut state = self.state.lock();
            state.live = state.live.saturating_sub(1);
            while !state.stopped && state.live < self.config.worker_count {
                let Some((key, ctx)) = state.queue.dequeue() else {
                    break;
                };
                match state.start_live(ctx) {
                    Ok(()) => debug!(ordinal = key.ordinal, qos = %key.qos, "promoted"),
                    Err(failed) => refused.push(failed),
                }
            }
            if state.is_idle() {
                self.idle.notify_all();
            }
        }
        for (ctx, err) in refused {
            self.refuse(ctx, &err, true);
        }
    }

    /// Re-admit a request whose body read finished.
    ///
    /// Subject to the same pool and cap rules as an arrival; a refused request
    /// is rejected at the connection level and its cleaners are swept.
    pub(crate) fn readmit(&self, ctx: Box<RequestContext>) {
        if let Err((ctx, err)) = self.admit(ctx, Admission::Resumed) {
            self.refuse(ctx, &err, true);
        }
    }

    /// Reject `ctx` at the connection level. `admitted` requests also leave the
    /// outstanding count.
    pub(crate) fn refuse(&self, mut ctx: Box<RequestContext>, err: &SchedulerError, admitted: bool) {
        warn!(ordinal = ctx.ordinal(), qos = %ctx.qos(), error = %err, "request rejected");
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| ctx.reject(err))) {
            warn!(ordinal = ctx.ordinal(), panic = %panic_message(payload.as_ref()), "reject panicked");
        }
        let mut state = self.state.lock();
        state.rejected += 1;
        if admitted {
            state.outstanding = state.outstanding.saturating_sub(1);
            if state.is_idle() {
                self.idle.notify_all();
            }
        }
    }

    /// Count an internal or I/O failure.
    pub(crate) fn note_failure(&self) {
        self.state.lock().failed += 1;
    }

    /// A request left the system; `completed` if it was finalized normally.
    pub(crate) fn retire(&self, completed: bool) {
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        if completed {
            state.completed += 1;
        }
        if state.is_idle() {
            self.idle.notify_all();
        }
    }
}

/// Priority scheduler driving request programs on a fixed pool of worker threads.
///
/// # Example
///
/// ```rust,ignore
/// let scheduler = Scheduler::new(
///     SchedulerConfig::new().with_worker_count(4).with_max_in_flight(256),
///     Arc::new(TracingSensor),
///     Arc::new(DefaultErrorFormatter),
///     Arc::new(FixedQos(Qos::Normal)),
/// )?;
///
/// let ordinal = scheduler.submit(exchange, get_method().map(|m| Response::text(200, m)))?;
/// scheduler.stop();
/// ```
pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Validate `config` and spawn the worker pool.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidConfig` if the configuration is invalid
    /// - `SchedulerError::WorkerSpawn` if a worker thread could not be started
    pub fn new(
        config: SchedulerConfig,
        sensor: Arc<dyn Sensor>,
        formatter: Arc<dyn ErrorFormatter>,
        classifier: Arc<dyn QosClassifier>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let (job_tx, job_rx) = unbounded::<Box<RequestContext>>();
        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState {
                queue: InMemoryQueue::new(config.max_in_flight),
                live: 0,
                outstanding: 0,
                stopped: false,
                job_tx: Some(job_tx),
                submitted: 0,
                completed: 0,
                rejected: 0,
                failed: 0,
            }),
            config,
            idle: Condvar::new(),
            next_ordinal: AtomicU64::new(0),
            sensor,
            formatter,
            classifier,
        });

        let mut workers = Vec::with_capacity(shared.config.worker_count);
        for worker_id in 0..shared.config.worker_count {
            match spawn_worker(worker_id, job_rx.clone(), Arc::clone(&shared)) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Closing the channel lets the workers already started exit.
                    shared.state.lock().job_tx = None;
                    return Err(SchedulerError::WorkerSpawn(e));
                }
            }
        }

        info!(
            worker_count = shared.config.worker_count,
            max_in_flight = shared.config.max_in_flight,
            max_body_bytes = shared.config.max_body_bytes,
            "Scheduler started"
        );

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Admit a request and its program.
    ///
    /// Returns the request's arrival ordinal. A refused request has already
    /// been rejected on its exchange when this returns an error.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::CapacityExceeded` if `live + queued` is at `max_in_flight`
    /// - `SchedulerError::Shutdown` if the scheduler has been stopped
    pub fn submit(&self, exchange: Box<dyn Exchange>, program: Step<Response>) -> Result<u64, SchedulerError> {
        let ordinal = self.shared.next_ordinal.fetch_add(1, Ordering::Relaxed);
        let qos = self.shared.classify(&*exchange);
        let ctx = Box::new(RequestContext::new(
            ordinal,
            qos,
            exchange,
            program.into_routine(),
            Arc::clone(&self.shared.sensor),
        ));
        match self.shared.admit(ctx, Admission::Fresh) {
            Ok(()) => Ok(ordinal),
            Err((ctx, err)) => {
                self.shared.refuse(ctx, &err, false);
                Err(err)
            }
        }
    }

    /// Move a queued request to the position for `qos`.
    ///
    /// Returns `false` if `ordinal` is not currently queued.
    pub fn reprioritize(&self, ordinal: u64, qos: Qos) -> bool {
        let mut state = self.shared.state.lock();
        match state.queue.reprioritize(ordinal, qos) {
            Some(ctx) => {
                ctx.set_qos(qos);
                debug!(ordinal, qos = %qos, "requeued with new qos");
                true
            }
            None => false,
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock();
        SchedulerStats {
            worker_count: self.shared.config.worker_count,
            max_in_flight: self.shared.config.max_in_flight,
            live: state.live,
            queued: state.queue.len(),
            active: state.live + state.queue.len(),
            submitted: state.submitted,
            completed: state.completed,
            rejected: state.rejected,
            failed: state.failed,
        }
    }

    /// Block until no request is live, queued or suspended for I/O.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.is_idle() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    /// Configuration the scheduler runs with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Stop admitting, reject queued requests and join the workers.
    ///
    /// Live requests run to their next suspension; requests still waiting on
    /// I/O finish writing, but any that would need a worker again are
    /// rejected. Calling `stop` again does nothing.
    pub fn stop(&self) {
        let Some(drained) = self.begin_shutdown() else {
            return;
        };
        info!(rejected = drained, "Shutting down scheduler");

        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for (worker_id, worker) in workers.drain(..).enumerate() {
            match worker.join() {
                Ok(()) => debug!(worker_id, "worker joined"),
                Err(payload) => warn!(worker_id, panic = %panic_message(payload.as_ref()), "worker panicked"),
            }
        }
        info!(worker_count, "Scheduler shut down complete");
    }

    /// Flip to stopped, close the worker channel and reject the queue.
    ///
    /// Returns the number of queued requests rejected, or `None` if already stopped.
    fn begin_shutdown(&self) -> Option<usize> {
        let drained = {
            let mut state = self.shared.state.lock();
            if state.stopped {
                return None;
            }
            state.stopped = true;
            state.job_tx = None;
            state.queue.drain()
        };
        let count = drained.len();
        for ctx in drained {
            self.shared.refuse(ctx, &SchedulerError::Shutdown, true);
        }
        // Wake waiters even if the queue was already empty.
        let _state = self.shared.state.lock();
        self.shared.idle.notify_all();
        Some(count)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Workers are not joined here; call `stop` for that.
        if self.begin_shutdown().is_some() {
            debug!("Scheduler dropped without explicit stop - workers will be detached");
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}
