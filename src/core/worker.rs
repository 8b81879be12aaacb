//! Worker threads executing Live requests.
//!
//! A worker blocks on the scheduler's channel, then runs the received request
//! until it finishes or suspends for I/O. In-place tokens are answered by the
//! context without leaving the worker; anything that needs the transport hands
//! the request to the I/O bridge and gives the slot back.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::{debug, error, trace};

use crate::core::bridge;
use crate::core::context::{Dispatch, RequestContext};
use crate::core::scheduler::Shared;
use crate::core::trampoline::{run, RunResult};
use crate::transport::Response;
use crate::util::panic_message;

/// Spawn a named worker thread with the configured stack size.
pub(crate) fn spawn_worker(
    worker_id: usize,
    jobs: Receiver<Box<RequestContext>>,
    shared: Arc<Shared>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("{}-{worker_id}", shared.config.thread_name_prefix))
        .stack_size(shared.config.thread_stack_size)
        .spawn(move || {
            debug!(worker_id, "Worker thread started");

            // Blocking recv; exits once the scheduler drops its sender and the
            // channel is empty.
            loop {
                let ctx = match jobs.recv() {
                    Ok(ctx) => ctx,
                    Err(_) => {
                        debug!(worker_id, "Worker channel closed, exiting");
                        break;
                    }
                };

                let ordinal = ctx.ordinal();
                let slot = LiveSlot::new(&shared);
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| drive(worker_id, &shared, slot, ctx))) {
                    // Unwinding dropped the slot, which gave it back.
                    error!(worker_id, ordinal, panic = %panic_message(payload.as_ref()), "worker lost a request");
                    shared.note_failure();
                    shared.retire(false);
                }
            }

            debug!(worker_id, "Worker thread exiting");
        })
}

/// The worker slot held by a Live request.
///
/// Given back by [`LiveSlot::release`], or on drop if the worker unwinds first.
pub(crate) struct LiveSlot<'a> {
    shared: &'a Shared,
    held: bool,
}

impl<'a> LiveSlot<'a> {
    pub(crate) const fn new(shared: &'a Shared) -> Self {
        Self { shared, held: true }
    }

    pub(crate) fn release(mut self) {
        self.give_back();
    }

    fn give_back(&mut self) {
        if std::mem::replace(&mut self.held, false) {
            self.shared.release_slot();
        }
    }
}

impl Drop for LiveSlot<'_> {
    fn drop(&mut self) {
        self.give_back();
    }
}

/// Run `ctx` until it leaves the worker.
fn drive(worker_id: usize, shared: &Arc<Shared>, slot: LiveSlot<'_>, mut ctx: Box<RequestContext>) {
    debug!(worker_id, ordinal = ctx.ordinal(), qos = %ctx.qos(), "running request");
    loop {
        match step(&mut ctx) {
            Ok(Dispatch::Resume(routine)) => ctx.set_routine(routine),
            Ok(Dispatch::Respond(response)) => {
                slot.release();
                bridge::start_write(shared, ctx, response);
                return;
            }
            Ok(Dispatch::ReadBody { limit, resume }) => {
                slot.release();
                bridge::start_read(shared, ctx, limit, resume);
                return;
            }
            Err(message) => {
                slot.release();
                bridge::fail(shared, ctx, &message);
                return;
            }
        }
    }
}

/// Run the routine to its next suspension and interpret the token.
fn step(ctx: &mut RequestContext) -> Result<Dispatch, String> {
    let routine = ctx
        .take_routine()
        .ok_or_else(|| "request has no program to run".to_string())?;

    panic::catch_unwind(AssertUnwindSafe(|| match run(routine) {
        RunResult::Finished(value) => value
            .downcast::<Response>()
            .map(|response| Dispatch::Respond(*response))
            .map_err(|_| "request program finished without a Response".to_string()),
        RunResult::Suspended(op, k) => {
            trace!(ordinal = ctx.ordinal(), token = op.name(), "suspended");
            Ok(ctx.handle(op, k))
        }
    }))
    .unwrap_or_else(|payload| Err(format!("request program panicked: {}", panic_message(payload.as_ref()))))
}
