//! In-memory exchange for tests and local development.
//!
//! Delivers I/O callbacks from its own short-lived threads, the way a real
//! transport would, and records everything the scheduler sends into an
//! [`ExchangeProbe`] that tests can block on.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::{IoHandle, SchedulerError};
use crate::transport::{Exchange, RequestMetadata, Response};

/// Everything an [`InMemoryExchange`] was asked to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recorded {
    /// Status passed to `start_response`.
    pub status: Option<u16>,
    /// Headers passed to `start_response`.
    pub headers: Vec<(String, String)>,
    /// Concatenation of every body write.
    pub body: Vec<u8>,
    /// Size of each body write, in order.
    pub writes: Vec<usize>,
    /// Response sent through `send_fallback`, if any.
    pub fallback: Option<Response>,
    /// Reason passed to `reject`, if any.
    pub rejected: Option<String>,
    /// How many times `complete` was called.
    pub completions: usize,
}

impl Recorded {
    /// Whether the exchange was completed or rejected.
    pub fn is_done(&self) -> bool {
        self.completions > 0 || self.rejected.is_some()
    }

    /// Body as UTF-8, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Values of a response header, case-insensitively.
    pub fn header(&self, name: &str) -> Vec<String> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// Shared view of an [`InMemoryExchange`]'s recording.
#[derive(Clone, Default)]
pub struct ExchangeProbe {
    inner: Arc<(Mutex<Recorded>, Condvar)>,
}

impl ExchangeProbe {
    /// Current recording.
    pub fn snapshot(&self) -> Recorded {
        self.inner.0.lock().clone()
    }

    /// Block until the exchange is completed or rejected.
    ///
    /// Returns `None` on timeout.
    pub fn wait(&self, timeout: Duration) -> Option<Recorded> {
        let deadline = Instant::now() + timeout;
        let (recorded, done) = self.inner.as_ref();
        let mut recorded = recorded.lock();
        while !recorded.is_done() {
            if done.wait_until(&mut recorded, deadline).timed_out() {
                return recorded.is_done().then(|| recorded.clone());
            }
        }
        Some(recorded.clone())
    }

    fn update(&self, f: impl FnOnce(&mut Recorded)) {
        let (recorded, done) = self.inner.as_ref();
        f(&mut *recorded.lock());
        done.notify_all();
    }
}

impl std::fmt::Debug for ExchangeProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ExchangeProbe").field(&*self.inner.0.lock()).finish()
    }
}

/// Scripted transport exchange.
pub struct InMemoryExchange {
    metadata: RequestMetadata,
    body_chunks: Vec<Vec<u8>>,
    read_failure: Option<io::ErrorKind>,
    read_delay: Duration,
    write_failure: Option<io::ErrorKind>,
    fallback_failures: usize,
    writes_per_ready: Option<usize>,
    budget: Arc<AtomicUsize>,
    io: Option<IoHandle>,
    probe: ExchangeProbe,
}

impl InMemoryExchange {
    /// Exchange with an empty body that accepts every write.
    pub fn new(metadata: RequestMetadata) -> Self {
        Self {
            metadata,
            body_chunks: Vec::new(),
            read_failure: None,
            read_delay: Duration::ZERO,
            write_failure: None,
            fallback_failures: 0,
            writes_per_ready: None,
            budget: Arc::new(AtomicUsize::new(usize::MAX)),
            io: None,
            probe: ExchangeProbe::default(),
        }
    }

    /// Deliver `body` as a single chunk.
    #[must_use]
    pub fn with_body(self, body: impl Into<Vec<u8>>) -> Self {
        self.with_body_chunks(vec![body.into()])
    }

    /// Deliver the body as these chunks, in order.
    #[must_use]
    pub fn with_body_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.body_chunks = chunks;
        self
    }

    /// Report `kind` after the body chunks instead of end-of-data.
    #[must_use]
    pub fn failing_read(mut self, kind: io::ErrorKind) -> Self {
        self.read_failure = Some(kind);
        self
    }

    /// Wait `delay` before delivering the first body event.
    #[must_use]
    pub const fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Fail every body write with `kind`.
    #[must_use]
    pub fn failing_write(mut self, kind: io::ErrorKind) -> Self {
        self.write_failure = Some(kind);
        self
    }

    /// Fail the first `count` fallback responses.
    #[must_use]
    pub const fn failing_fallback(mut self, count: usize) -> Self {
        self.fallback_failures = count;
        self
    }

    /// Stop being ready after `count` writes until the next `WritePossible`.
    #[must_use]
    pub fn with_writes_per_ready(mut self, count: usize) -> Self {
        self.writes_per_ready = Some(count.max(1));
        self
    }

    /// Probe sharing this exchange's recording.
    pub fn probe(&self) -> ExchangeProbe {
        self.probe.clone()
    }

    /// Box as a trait object for [`Scheduler::submit`](crate::core::Scheduler::submit).
    pub fn boxed(self) -> Box<dyn Exchange> {
        Box::new(self)
    }

    /// Make the exchange ready for a fresh round of writes.
    pub fn prime_write_budget(&self) {
        self.budget
            .store(self.writes_per_ready.unwrap_or(usize::MAX), Ordering::SeqCst);
    }
}

impl Exchange for InMemoryExchange {
    fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    fn read_body(&mut self, io: IoHandle) -> io::Result<()> {
        let chunks = self.body_chunks.clone();
        let failure = self.read_failure;
        let delay = self.read_delay;
        thread::Builder::new().name("exchange-read".into()).spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            for chunk in chunks {
                io.on_data_available(chunk);
            }
            match failure {
                Some(kind) => io.on_error(io::Error::new(kind, "scripted read failure")),
                None => io.on_all_data_read(),
            }
        })?;
        Ok(())
    }

    fn start_response(&mut self, status: u16, headers: &[(String, String)], io: IoHandle) -> io::Result<()> {
        self.probe.update(|r| {
            r.status = Some(status);
            r.headers = headers.to_vec();
        });
        self.prime_write_budget();
        self.io = Some(io.clone());
        thread::Builder::new()
            .name("exchange-write".into())
            .spawn(move || io.on_write_possible())?;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.budget.load(Ordering::SeqCst) > 0
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        if let Some(kind) = self.write_failure {
            return Err(io::Error::new(kind, "scripted write failure"));
        }
        self.probe.update(|r| {
            r.writes.push(chunk.len());
            r.body.extend_from_slice(chunk);
        });
        let Some(per_ready) = self.writes_per_ready else {
            return Ok(());
        };
        if self.budget.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Some(io) = self.io.clone() {
                let budget = Arc::clone(&self.budget);
                thread::Builder::new().name("exchange-drain".into()).spawn(move || {
                    thread::sleep(Duration::from_millis(1));
                    budget.store(per_ready, Ordering::SeqCst);
                    io.on_write_possible();
                })?;
            }
        }
        Ok(())
    }

    fn send_fallback(&mut self, response: &Response) -> io::Result<()> {
        if self.fallback_failures > 0 {
            self.fallback_failures -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted fallback failure"));
        }
        let response = response.clone();
        self.probe.update(|r| r.fallback = Some(response));
        Ok(())
    }

    fn complete(&mut self) {
        self.io = None;
        self.probe.update(|r| r.completions += 1);
    }

    fn reject(&mut self, reason: &SchedulerError) {
        self.io = None;
        let reason = reason.to_string();
        self.probe.update(|r| r.rejected = Some(reason));
    }
}

impl std::fmt::Debug for InMemoryExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryExchange")
            .field("metadata", &self.metadata)
            .field("chunks", &self.body_chunks.len())
            .field("writes_per_ready", &self.writes_per_ready)
            .finish_non_exhaustive()
    }
}
