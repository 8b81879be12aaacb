//! Per-request state and the in-place token interpreter.
//!
//! A [`RequestContext`] travels between the scheduler queue, worker threads and
//! the I/O bridge; exactly one of them owns it at any time. Tokens that only
//! touch data the context already holds are answered here without leaving the
//! worker; the rest are handed back to the caller as a [`Dispatch`].

use std::sync::Arc;

use crate::core::cleanup::CleanupChain;
use crate::core::effect::Operation;
use crate::core::qos::Qos;
use crate::core::sensor::{report, Sensor, SensorEvent};
use crate::core::trampoline::{Continuation, Routine, Value};
use crate::core::SchedulerError;
use crate::transport::{Cookie, Exchange, RequestMetadata, Response};

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ContextState {
    /// Waiting in the priority queue for a worker slot.
    Queued,
    /// Holding a worker slot.
    Live,
    /// Waiting on the transport without a worker slot.
    SuspendedForIo,
    /// Finalized; cleaners have been swept.
    Finished,
}

/// What the worker must do after a token has been interpreted.
pub(crate) enum Dispatch {
    /// Keep running this routine on the current worker.
    Resume(Routine<Operation>),
    /// The program is done; send this response.
    Respond(Response),
    /// Release the worker and read the body.
    ReadBody {
        limit: usize,
        resume: Continuation<Operation>,
    },
}

/// Mutable record of one request.
pub struct RequestContext {
    ordinal: u64,
    qos: Qos,
    state: ContextState,
    routine: Option<Routine<Operation>>,
    cleaners: CleanupChain,
    extra_headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    remaining_path: String,
    exchange: Box<dyn Exchange>,
    sensor: Arc<dyn Sensor>,
    finalized: bool,
}

impl RequestContext {
    pub(crate) fn new(
        ordinal: u64,
        qos: Qos,
        exchange: Box<dyn Exchange>,
        routine: Routine<Operation>,
        sensor: Arc<dyn Sensor>,
    ) -> Self {
        let remaining_path = exchange.metadata().path().to_string();
        Self {
            ordinal,
            qos,
            state: ContextState::Queued,
            routine: Some(routine),
            cleaners: CleanupChain::new(),
            extra_headers: Vec::new(),
            cookies: Vec::new(),
            remaining_path,
            exchange,
            sensor,
            finalized: false,
        }
    }

    /// Arrival ordinal; never changes.
    pub const fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Current QoS.
    pub const fn qos(&self) -> Qos {
        self.qos
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> ContextState {
        self.state
    }

    /// Path not yet consumed by routing.
    pub fn remaining_path(&self) -> &str {
        &self.remaining_path
    }

    /// Request metadata from the transport.
    pub fn metadata(&self) -> &RequestMetadata {
        self.exchange.metadata()
    }

    /// Whether the request has been finalized or rejected.
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn set_qos(&mut self, qos: Qos) {
        self.qos = qos;
    }

    pub(crate) fn set_state(&mut self, state: ContextState) {
        self.state = state;
    }

    pub(crate) fn take_routine(&mut self) -> Option<Routine<Operation>> {
        self.routine.take()
    }

    pub(crate) fn set_routine(&mut self, routine: Routine<Operation>) {
        self.routine = Some(routine);
    }

    pub(crate) fn exchange_mut(&mut self) -> &mut dyn Exchange {
        &mut *self.exchange
    }

    pub(crate) fn sensor(&self) -> &dyn Sensor {
        &*self.sensor
    }

    /// Interpret one token.
    ///
    /// Resumptions are returned lazily as `FlatMap(Pure(value), k)` so that the
    /// continuation runs inside the engine, not here.
    pub(crate) fn handle(&mut self, op: Operation, k: Continuation<Operation>) -> Dispatch {
        let meta = self.exchange.metadata();
        match op {
            Operation::Abort(response) => Dispatch::Respond(response),
            Operation::AddHeaders(headers) => {
                self.extra_headers.extend(headers);
                resume(k, Box::new(()))
            }
            Operation::AddCookie(cookie) => {
                self.cookies.push(cookie);
                resume(k, Box::new(()))
            }
            Operation::AddCleaner(action) => {
                let handle = self.cleaners.register(action);
                resume(k, Box::new(handle))
            }
            Operation::InvokeCleaner(handle) => {
                handle.invoke();
                resume(k, Box::new(()))
            }
            Operation::GetMethod => resume(k, Box::new(meta.method().to_string())),
            Operation::GetHeaderNames => resume(k, Box::new(meta.header_names())),
            Operation::GetHeader(name) => resume(k, Box::new(meta.header(&name))),
            Operation::GetCookies(name) => resume(k, Box::new(meta.cookies(&name))),
            Operation::GetParameterNames => resume(k, Box::new(meta.parameter_names())),
            Operation::GetParameter(name) => resume(k, Box::new(meta.parameter(&name))),
            Operation::ReadBody(limit) => Dispatch::ReadBody { limit, resume: k },
            Operation::GetQos => resume(k, Box::new(self.qos)),
            Operation::SetQos(qos) => {
                tracing::debug!(ordinal = self.ordinal, from = %self.qos, to = %qos, "qos changed");
                self.qos = qos;
                resume(k, Box::new(()))
            }
            Operation::RoutePath(matcher) => match matcher(self.remaining_path.as_str()) {
                Some((rest, next)) => {
                    self.remaining_path = rest;
                    Dispatch::Resume(Routine::FlatMap(Box::new(next), k))
                }
                None => {
                    tracing::debug!(ordinal = self.ordinal, path = %self.remaining_path, "no route matched");
                    Dispatch::Respond(Response::not_found())
                }
            },
            Operation::Continue(rest, next) => {
                self.remaining_path = rest;
                Dispatch::Resume(Routine::FlatMap(next, k))
            }
        }
    }

    /// Merge headers and cookies added by the program into `response`.
    pub(crate) fn assemble(&mut self, mut response: Response) -> Response {
        response.headers.append(&mut self.extra_headers);
        for cookie in self.cookies.drain(..) {
            response.headers.push(("set-cookie".to_string(), cookie.to_header_value()));
        }
        response
    }

    /// Sweep cleaners and complete the exchange. Only the first call does anything.
    pub(crate) fn finalize(&mut self) -> bool {
        if self.finalized {
            return false;
        }
        self.finalized = true;
        self.state = ContextState::Finished;
        let ran = self.cleaners.sweep(self.ordinal, &*self.sensor);
        self.exchange.complete();
        tracing::debug!(ordinal = self.ordinal, cleaners = ran, "request finalized");
        true
    }

    /// Refuse the exchange at the connection level and sweep cleaners.
    pub(crate) fn reject(&mut self, reason: &SchedulerError) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        self.state = ContextState::Finished;
        report(
            &*self.sensor,
            SensorEvent::Rejected {
                ordinal: self.ordinal,
                reason: reason.to_string(),
            },
        );
        self.exchange.reject(reason);
        self.cleaners.sweep(self.ordinal, &*self.sensor);
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        if !self.finalized {
            self.finalized = true;
            tracing::warn!(ordinal = self.ordinal, state = ?self.state, "request dropped before finalize");
            self.cleaners.sweep(self.ordinal, &*self.sensor);
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("ordinal", &self.ordinal)
            .field("qos", &self.qos)
            .field("state", &self.state)
            .field("remaining_path", &self.remaining_path)
            .field("finalized", &self.finalized)
            .finish_non_exhaustive()
    }
}

fn resume(k: Continuation<Operation>, value: Value) -> Dispatch {
    Dispatch::Resume(Routine::FlatMap(Box::new(Routine::Pure(value)), k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sensor::InMemorySensor;
    use crate::core::trampoline::{run, RunResult};
    use crate::infra::InMemoryExchange;

    fn context(meta: RequestMetadata) -> RequestContext {
        let exchange = InMemoryExchange::new(meta).boxed();
        RequestContext::new(7, Qos::Low, exchange, Routine::pure(()), Arc::new(InMemorySensor::new(8)))
    }

    fn answer(ctx: &mut RequestContext, op: Operation) -> Value {
        match ctx.handle(op, Box::new(Routine::<Operation>::Pure)) {
            Dispatch::Resume(routine) => match run(routine) {
                RunResult::Finished(value) => value,
                RunResult::Suspended(op, _) => panic!("unexpected suspension on {op:?}"),
            },
            Dispatch::Respond(response) => panic!("unexpected response {}", response.status),
            Dispatch::ReadBody { .. } => panic!("unexpected body read"),
        }
    }

    #[test]
    fn test_metadata_tokens_resume_in_place() {
        let mut ctx = context(RequestMetadata::new("PUT", "/items").with_header("X-Id", "9"));
        let method = answer(&mut ctx, Operation::GetMethod);
        assert_eq!(*method.downcast::<String>().unwrap(), "PUT");
        let header = answer(&mut ctx, Operation::GetHeader("x-id".into()));
        assert_eq!(*header.downcast::<Vec<String>>().unwrap(), vec!["9"]);
    }

    #[test]
    fn test_set_qos_updates_key() {
        let mut ctx = context(RequestMetadata::new("GET", "/"));
        answer(&mut ctx, Operation::SetQos(Qos::Critical));
        assert_eq!(ctx.qos(), Qos::Critical);
        let qos = answer(&mut ctx, Operation::GetQos);
        assert_eq!(*qos.downcast::<Qos>().unwrap(), Qos::Critical);
    }

    #[test]
    fn test_route_path_consumes_prefix_or_404s() {
        let mut ctx = context(RequestMetadata::new("GET", "/api/users"));
        let matched = answer(
            &mut ctx,
            Operation::RoutePath(Box::new(|path: &str| {
                path.strip_prefix("/api").map(|rest| (rest.to_string(), Routine::pure(1_u8)))
            })),
        );
        assert_eq!(*matched.downcast::<u8>().unwrap(), 1);
        assert_eq!(ctx.remaining_path(), "/users");

        let miss = ctx.handle(Operation::RoutePath(Box::new(|_: &str| None)), Box::new(Routine::<Operation>::Pure));
        assert!(matches!(miss, Dispatch::Respond(r) if r.status == 404));
    }

    #[test]
    fn test_assemble_merges_headers_and_cookies() {
        let mut ctx = context(RequestMetadata::new("GET", "/"));
        answer(&mut ctx, Operation::AddHeaders(vec![("x-trace".into(), "abc".into())]));
        answer(&mut ctx, Operation::AddCookie(Cookie::new("session", "s1").with_path("/")));
        let response = ctx.assemble(Response::text(200, "ok"));
        assert!(response.headers.contains(&("x-trace".to_string(), "abc".to_string())));
        assert!(response
            .headers
            .iter()
            .any(|(n, v)| n == "set-cookie" && v.starts_with("session=s1")));
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut ctx = context(RequestMetadata::new("GET", "/"));
        let ran = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        answer(
            &mut ctx,
            Operation::AddCleaner(Box::new(move || {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })),
        );
        assert!(ctx.finalize());
        assert!(!ctx.finalize());
        drop(ctx);
        assert_eq!(ran.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_without_finalize_sweeps() {
        let mut ctx = context(RequestMetadata::new("GET", "/"));
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        answer(
            &mut ctx,
            Operation::AddCleaner(Box::new(move || flag.store(true, std::sync::atomic::Ordering::SeqCst))),
        );
        drop(ctx);
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
