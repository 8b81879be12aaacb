//! Bridge between callback-driven transport I/O and suspended requests.
//!
//! When a request reads its body or writes its response it gives up its worker
//! slot and is parked in a conduit. The transport reports progress through an
//! [`IoHandle`] from its own threads; events are queued and applied to the
//! parked request one at a time by whichever thread gets to it, so a request
//! is never touched by two threads at once and no callback blocks on another.
//!
//! The per-phase logic lives in two plain state machines, [`BodyReader`] and
//! [`ResponseWriter`], each driven by `advance(event)`.
//!
//! Every path out of a conduit ends in exactly one of: re-admission to the
//! scheduler, another I/O phase, or finalize.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::core::context::{ContextState, RequestContext};
use crate::core::effect::Operation;
use crate::core::scheduler::Shared;
use crate::core::sensor::{report, SensorEvent};
use crate::core::trampoline::{Continuation, Routine};
use crate::transport::{Exchange, Response};
use crate::util::panic_message;

/// Progress reported by the transport.
#[derive(Debug)]
pub enum IoEvent {
    /// A chunk of the request body arrived.
    DataAvailable(Vec<u8>),
    /// The request body is complete.
    AllDataRead,
    /// The response may be written without blocking.
    WritePossible,
    /// The connection failed.
    Error(io::Error),
}

/// Where a transport delivers [`IoEvent`]s for one I/O phase of one request.
///
/// Cheap to clone and safe to call from any thread. Events arriving after the
/// phase ended are ignored.
#[derive(Clone)]
pub struct IoHandle {
    conduit: Arc<Conduit>,
}

impl IoHandle {
    /// Deliver an event. Dropped if the phase has already ended.
    pub fn notify(&self, event: IoEvent) {
        {
            let mut inbox = self.conduit.inbox.lock();
            if inbox.closed {
                trace!("event after phase end dropped");
                return;
            }
            inbox.events.push_back(event);
        }
        self.conduit.pump();
    }

    /// Whether the phase this handle belongs to has ended.
    pub fn is_closed(&self) -> bool {
        self.conduit.inbox.lock().closed
    }

    /// Events delivered but not yet applied.
    pub fn pending_events(&self) -> usize {
        self.conduit.inbox.lock().events.len()
    }

    /// Shorthand for [`IoEvent::DataAvailable`].
    pub fn on_data_available(&self, chunk: impl Into<Vec<u8>>) {
        self.notify(IoEvent::DataAvailable(chunk.into()));
    }

    /// Shorthand for [`IoEvent::AllDataRead`].
    pub fn on_all_data_read(&self) {
        self.notify(IoEvent::AllDataRead);
    }

    /// Shorthand for [`IoEvent::WritePossible`].
    pub fn on_write_possible(&self) {
        self.notify(IoEvent::WritePossible);
    }

    /// Shorthand for [`IoEvent::Error`].
    pub fn on_error(&self, error: io::Error) {
        self.notify(IoEvent::Error(error));
    }
}

impl fmt::Debug for IoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inbox = self.conduit.inbox.lock();
        f.debug_struct("IoHandle")
            .field("pending_events", &inbox.events.len())
            .field("closed", &inbox.closed)
            .finish()
    }
}

/// Result of feeding an event to a [`BodyReader`].
#[derive(Debug)]
pub enum ReadProgress {
    /// Need more events.
    Pending,
    /// The whole body.
    Complete(Vec<u8>),
    /// The body grew past the limit (carried here).
    LimitExceeded(usize),
    /// The transport failed.
    Failed(io::Error),
}

/// Accumulates a request body up to a limit.
#[derive(Debug)]
pub struct BodyReader {
    limit: usize,
    buffer: Vec<u8>,
}

impl BodyReader {
    /// Reader accepting at most `limit` bytes.
    pub const fn new(limit: usize) -> Self {
        Self {
            limit,
            buffer: Vec::new(),
        }
    }

    /// Bytes buffered so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Apply one transport event.
    pub fn advance(&mut self, event: IoEvent) -> ReadProgress {
        match event {
            IoEvent::DataAvailable(chunk) => {
                if self.buffer.len() + chunk.len() > self.limit {
                    return ReadProgress::LimitExceeded(self.limit);
                }
                self.buffer.extend_from_slice(&chunk);
                ReadProgress::Pending
            }
            IoEvent::AllDataRead => ReadProgress::Complete(std::mem::take(&mut self.buffer)),
            IoEvent::WritePossible => ReadProgress::Pending,
            IoEvent::Error(e) => ReadProgress::Failed(e),
        }
    }
}

/// Result of feeding an event to a [`ResponseWriter`].
#[derive(Debug)]
pub enum WriteProgress {
    /// Wait for the next `WritePossible`.
    Pending,
    /// Every byte has been written.
    Done,
    /// The transport failed.
    Failed(io::Error),
}

/// Writes a response body in bounded chunks while the transport is ready.
#[derive(Debug)]
pub struct ResponseWriter {
    body: Vec<u8>,
    written: usize,
    chunk_size: usize,
}

impl ResponseWriter {
    /// Writer for `body` issuing writes of at most `chunk_size` bytes.
    pub fn new(body: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            body,
            written: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Bytes not yet written.
    pub fn remaining(&self) -> usize {
        self.body.len() - self.written
    }

    /// Apply one transport event, writing through `exchange` if possible.
    pub fn advance(&mut self, event: IoEvent, exchange: &mut dyn Exchange) -> WriteProgress {
        match event {
            IoEvent::WritePossible => {
                while self.written < self.body.len() {
                    match panic::catch_unwind(AssertUnwindSafe(|| exchange.is_ready())) {
                        Ok(true) => {}
                        Ok(false) => return WriteProgress::Pending,
                        Err(payload) => return WriteProgress::Failed(transport_panic(payload.as_ref())),
                    }
                    let end = (self.written + self.chunk_size).min(self.body.len());
                    let chunk = &self.body[self.written..end];
                    if let Err(e) = guarded(|| exchange.write(chunk)) {
                        return WriteProgress::Failed(e);
                    }
                    self.written = end;
                }
                WriteProgress::Done
            }
            IoEvent::Error(e) => WriteProgress::Failed(e),
            IoEvent::DataAvailable(_) | IoEvent::AllDataRead => WriteProgress::Pending,
        }
    }
}

enum Phase {
    Reading {
        reader: BodyReader,
        resume: Continuation<Operation>,
    },
    Writing(ResponseWriter),
}

struct Parked {
    ctx: Box<RequestContext>,
    phase: Phase,
}

#[derive(Default)]
struct Inbox {
    events: VecDeque<IoEvent>,
    /// Set once the phase ends; later events are dropped on arrival.
    closed: bool,
}

struct Conduit {
    inbox: Mutex<Inbox>,
    parked: Mutex<Option<Parked>>,
    shared: Arc<Shared>,
}

impl Conduit {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            inbox: Mutex::new(Inbox::default()),
            parked: Mutex::new(None),
            shared,
        }
    }

    fn close(&self) {
        let mut inbox = self.inbox.lock();
        inbox.closed = true;
        inbox.events.clear();
    }

    fn park(&self, parked: Parked) {
        *self.parked.lock() = Some(parked);
        self.pump();
    }

    /// Apply queued events to the parked request.
    ///
    /// Whoever takes the request out of `parked` drains the queue; after putting
    /// it back the queue is checked again so an event pushed in between is not
    /// stranded.
    fn pump(&self) {
        loop {
            let Some(mut parked) = self.parked.lock().take() else {
                return;
            };
            loop {
                let event = self.inbox.lock().events.pop_front();
                let Some(event) = event else {
                    break;
                };
                match self.apply(parked, event) {
                    Some(still_parked) => parked = still_parked,
                    None => {
                        self.close();
                        return;
                    }
                }
            }
            *self.parked.lock() = Some(parked);
            if self.inbox.lock().events.is_empty() {
                return;
            }
        }
    }

    fn apply(&self, parked: Parked, event: IoEvent) -> Option<Parked> {
        let ordinal = parked.ctx.ordinal();
        match panic::catch_unwind(AssertUnwindSafe(|| advance(self, parked, event))) {
            Ok(next) => next,
            Err(payload) => {
                // The context was dropped while unwinding; its Drop swept the cleaners.
                error!(ordinal, panic = %panic_message(payload.as_ref()), "i/o callback panicked");
                self.shared.note_failure();
                self.shared.retire(false);
                None
            }
        }
    }
}

/// Apply one event. Once the phase ends the conduit is closed before the
/// request moves on, so nothing queued behind it is kept.
fn advance(conduit: &Conduit, parked: Parked, event: IoEvent) -> Option<Parked> {
    let shared = &conduit.shared;
    let Parked { mut ctx, phase } = parked;
    match phase {
        Phase::Reading { mut reader, resume } => match reader.advance(event) {
            ReadProgress::Pending => Some(Parked {
                ctx,
                phase: Phase::Reading { reader, resume },
            }),
            ReadProgress::Complete(body) => {
                conduit.close();
                debug!(ordinal = ctx.ordinal(), bytes = body.len(), "body read, re-admitting");
                // The continuation runs on a worker after re-admission, not here.
                ctx.set_routine(Routine::FlatMap(Box::new(Routine::Pure(Box::new(body))), resume));
                shared.readmit(ctx);
                None
            }
            ReadProgress::LimitExceeded(limit) => {
                conduit.close();
                warn!(ordinal = ctx.ordinal(), limit, "request body too large");
                start_write(shared, ctx, Response::payload_too_large(limit));
                None
            }
            ReadProgress::Failed(err) => {
                conduit.close();
                fail(shared, ctx, &format!("body read failed: {err}"));
                None
            }
        },
        Phase::Writing(mut writer) => match writer.advance(event, ctx.exchange_mut()) {
            WriteProgress::Pending => Some(Parked {
                ctx,
                phase: Phase::Writing(writer),
            }),
            WriteProgress::Done => {
                conduit.close();
                finalize(shared, ctx);
                None
            }
            WriteProgress::Failed(err) => {
                conduit.close();
                fail(shared, ctx, &format!("response write failed: {err}"));
                None
            }
        },
    }
}

fn transport_panic(payload: &(dyn Any + Send)) -> io::Error {
    io::Error::other(format!("transport panicked: {}", panic_message(payload)))
}

/// Run a transport call, turning a panic into an I/O error.
fn guarded(call: impl FnOnce() -> io::Result<()>) -> io::Result<()> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| Err(transport_panic(payload.as_ref())))
}

/// Park `ctx` until its body has been read, then re-admit it with the body.
pub(crate) fn start_read(
    shared: &Arc<Shared>,
    mut ctx: Box<RequestContext>,
    limit: usize,
    resume: Continuation<Operation>,
) {
    let limit = limit.min(shared.config.max_body_bytes);
    ctx.set_state(ContextState::SuspendedForIo);
    debug!(ordinal = ctx.ordinal(), limit, "suspended for body read");

    let conduit = Arc::new(Conduit::new(Arc::clone(shared)));
    let io = IoHandle {
        conduit: Arc::clone(&conduit),
    };
    if let Err(err) = guarded(|| ctx.exchange_mut().read_body(io)) {
        conduit.close();
        fail(shared, ctx, &format!("failed to start body read: {err}"));
        return;
    }
    conduit.park(Parked {
        ctx,
        phase: Phase::Reading {
            reader: BodyReader::new(limit),
            resume,
        },
    });
}

/// Send `response` (plus headers and cookies the program added), then finalize.
pub(crate) fn start_write(shared: &Arc<Shared>, mut ctx: Box<RequestContext>, response: Response) {
    let Response { status, headers, body } = ctx.assemble(response);
    ctx.set_state(ContextState::SuspendedForIo);
    debug!(ordinal = ctx.ordinal(), status, bytes = body.len(), "writing response");

    let conduit = Arc::new(Conduit::new(Arc::clone(shared)));
    let io = IoHandle {
        conduit: Arc::clone(&conduit),
    };
    if let Err(err) = guarded(|| ctx.exchange_mut().start_response(status, &headers, io)) {
        conduit.close();
        fail(shared, ctx, &format!("failed to start response: {err}"));
        return;
    }
    conduit.park(Parked {
        ctx,
        phase: Phase::Writing(ResponseWriter::new(body, shared.config.write_chunk_size)),
    });
}

/// Best-effort internal-error response, then finalize no matter what.
pub(crate) fn fail(shared: &Shared, mut ctx: Box<RequestContext>, message: &str) {
    let ordinal = ctx.ordinal();
    error!(ordinal, error = %message, "request failed");
    report(
        ctx.sensor(),
        SensorEvent::ConnectionError {
            ordinal,
            message: message.to_string(),
        },
    );
    shared.note_failure();

    let formatter = Arc::clone(&shared.formatter);
    let response = panic::catch_unwind(AssertUnwindSafe(|| formatter.format(ctx.metadata())))
        .unwrap_or_else(|payload| {
            warn!(ordinal, panic = %panic_message(payload.as_ref()), "error formatter panicked");
            Response::minimal_internal_error()
        });

    if let Err(err) = guarded(|| ctx.exchange_mut().send_fallback(&response)) {
        warn!(ordinal, error = %err, "error response failed, sending minimal fallback");
        let minimal = Response::minimal_internal_error();
        if let Err(err) = guarded(|| ctx.exchange_mut().send_fallback(&minimal)) {
            warn!(ordinal, error = %err, "minimal fallback response failed too");
        }
    }
    finalize(shared, ctx);
}

/// Sweep cleaners and complete the exchange.
pub(crate) fn finalize(shared: &Shared, mut ctx: Box<RequestContext>) {
    let ordinal = ctx.ordinal();
    match panic::catch_unwind(AssertUnwindSafe(|| ctx.finalize())) {
        Ok(true) => shared.retire(true),
        Ok(false) => {}
        Err(payload) => {
            error!(ordinal, panic = %panic_message(payload.as_ref()), "finalize panicked");
            shared.retire(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::InMemoryExchange;
    use crate::transport::RequestMetadata;

    #[test]
    fn test_reader_accumulates_until_end() {
        let mut reader = BodyReader::new(10);
        assert!(matches!(reader.advance(IoEvent::DataAvailable(b"abc".to_vec())), ReadProgress::Pending));
        assert!(matches!(reader.advance(IoEvent::WritePossible), ReadProgress::Pending));
        assert!(matches!(reader.advance(IoEvent::DataAvailable(b"de".to_vec())), ReadProgress::Pending));
        assert_eq!(reader.len(), 5);
        match reader.advance(IoEvent::AllDataRead) {
            ReadProgress::Complete(body) => assert_eq!(body, b"abcde"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reader_limit() {
        let mut reader = BodyReader::new(4);
        assert!(matches!(reader.advance(IoEvent::DataAvailable(b"abcd".to_vec())), ReadProgress::Pending));
        assert!(matches!(
            reader.advance(IoEvent::DataAvailable(b"e".to_vec())),
            ReadProgress::LimitExceeded(4)
        ));
    }

    #[test]
    fn test_reader_error() {
        let mut reader = BodyReader::new(4);
        let progress = reader.advance(IoEvent::Error(io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
        assert!(matches!(progress, ReadProgress::Failed(e) if e.kind() == io::ErrorKind::ConnectionReset));
    }

    #[test]
    fn test_writer_chunks_and_waits_when_not_ready() {
        let mut exchange = InMemoryExchange::new(RequestMetadata::new("GET", "/")).with_writes_per_ready(2);
        let probe = exchange.probe();
        exchange.prime_write_budget();

        let mut writer = ResponseWriter::new(vec![7_u8; 5000], 2048);
        assert!(matches!(writer.advance(IoEvent::WritePossible, &mut exchange), WriteProgress::Pending));
        assert_eq!(writer.remaining(), 5000 - 4096);

        exchange.prime_write_budget();
        assert!(matches!(writer.advance(IoEvent::WritePossible, &mut exchange), WriteProgress::Done));
        assert_eq!(probe.snapshot().writes, vec![2048, 2048, 904]);
    }

    #[test]
    fn test_writer_empty_body_is_done_immediately() {
        let mut exchange = InMemoryExchange::new(RequestMetadata::new("GET", "/"));
        let mut writer = ResponseWriter::new(Vec::new(), 2048);
        assert!(matches!(writer.advance(IoEvent::WritePossible, &mut exchange), WriteProgress::Done));
    }

    #[test]
    fn test_writer_reports_write_failure() {
        let mut exchange = InMemoryExchange::new(RequestMetadata::new("GET", "/"))
            .failing_write(io::ErrorKind::BrokenPipe);
        exchange.prime_write_budget();
        let mut writer = ResponseWriter::new(b"hello".to_vec(), 2);
        assert!(matches!(
            writer.advance(IoEvent::WritePossible, &mut exchange),
            WriteProgress::Failed(e) if e.kind() == io::ErrorKind::BrokenPipe
        ));
    }
}
