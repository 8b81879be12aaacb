//! The suspension tokens request programs use to talk to the server.
//!
//! Every token documents the type its continuation is resumed with. The typed
//! constructors below are the only way programs should build them, which keeps
//! the resume types honest.

use std::any::Any;
use std::fmt;

use crate::core::cleanup::{CleanerAction, CleanerHandle};
use crate::core::qos::Qos;
use crate::core::step::Step;
use crate::core::trampoline::Routine;
use crate::transport::{Cookie, Response};

/// Path matcher for [`Operation::RoutePath`]: given the unconsumed path, return
/// the path left after the match and the routine to continue with.
pub type PathMatcher = Box<dyn FnOnce(&str) -> Option<(String, Routine<Operation>)> + Send>;

/// Suspension token of a request program.
pub enum Operation {
    /// Stop and send this response. Never resumes.
    Abort(Response),
    /// Add response headers. Resumes with `()`.
    AddHeaders(Vec<(String, String)>),
    /// Add a response cookie. Resumes with `()`.
    AddCookie(Cookie),
    /// Register a cleaner. Resumes with [`CleanerHandle`].
    AddCleaner(CleanerAction),
    /// Run a cleaner early. Resumes with `()`.
    InvokeCleaner(CleanerHandle),
    /// Resumes with the request method as `String`.
    GetMethod,
    /// Resumes with `Vec<String>` of header names.
    GetHeaderNames,
    /// Resumes with `Vec<String>` of the header's values.
    GetHeader(String),
    /// Resumes with `Vec<String>` of the cookie's values.
    GetCookies(String),
    /// Resumes with `Vec<String>` of query parameter names.
    GetParameterNames,
    /// Resumes with `Vec<String>` of the parameter's values.
    GetParameter(String),
    /// Read the whole body, at most `limit` bytes. Resumes with `Vec<u8>`.
    ReadBody(usize),
    /// Resumes with the current [`Qos`].
    GetQos,
    /// Change the request's QoS. Resumes with `()`.
    SetQos(Qos),
    /// Dispatch on the unconsumed path. Resumes with the matched routine's value.
    RoutePath(PathMatcher),
    /// Replace the unconsumed path and run the routine. Resumes with its value.
    Continue(String, Box<Routine<Operation>>),
}

impl Operation {
    /// Token name, for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Abort(_) => "abort",
            Self::AddHeaders(_) => "add_headers",
            Self::AddCookie(_) => "add_cookie",
            Self::AddCleaner(_) => "add_cleaner",
            Self::InvokeCleaner(_) => "invoke_cleaner",
            Self::GetMethod => "get_method",
            Self::GetHeaderNames => "get_header_names",
            Self::GetHeader(_) => "get_header",
            Self::GetCookies(_) => "get_cookies",
            Self::GetParameterNames => "get_parameter_names",
            Self::GetParameter(_) => "get_parameter",
            Self::ReadBody(_) => "read_body",
            Self::GetQos => "get_qos",
            Self::SetQos(_) => "set_qos",
            Self::RoutePath(_) => "route_path",
            Self::Continue(..) => "continue",
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort(response) => f.debug_tuple("Abort").field(&response.status).finish(),
            Self::AddHeaders(headers) => f.debug_tuple("AddHeaders").field(headers).finish(),
            Self::AddCookie(cookie) => f.debug_tuple("AddCookie").field(cookie).finish(),
            Self::InvokeCleaner(handle) => f.debug_tuple("InvokeCleaner").field(handle).finish(),
            Self::GetHeader(name) => f.debug_tuple("GetHeader").field(name).finish(),
            Self::GetCookies(name) => f.debug_tuple("GetCookies").field(name).finish(),
            Self::GetParameter(name) => f.debug_tuple("GetParameter").field(name).finish(),
            Self::ReadBody(limit) => f.debug_tuple("ReadBody").field(limit).finish(),
            Self::SetQos(qos) => f.debug_tuple("SetQos").field(qos).finish(),
            Self::Continue(path, _) => f.debug_tuple("Continue").field(path).finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Stop the program and send `response`.
pub fn abort<T>(response: Response) -> Step<T> {
    Step::suspend(Operation::Abort(response))
}

/// Add headers to the eventual response.
pub fn add_headers(headers: Vec<(String, String)>) -> Step<()> {
    Step::suspend(Operation::AddHeaders(headers))
}

/// Add a cookie to the eventual response.
pub fn add_cookie(cookie: Cookie) -> Step<()> {
    Step::suspend(Operation::AddCookie(cookie))
}

/// Register `action` to run when the request is finalized.
pub fn add_cleaner<F>(action: F) -> Step<CleanerHandle>
where
    F: FnOnce() + Send + 'static,
{
    Step::suspend(Operation::AddCleaner(Box::new(action)))
}

/// Run a registered cleaner now instead of at finalize.
pub fn invoke_cleaner(handle: CleanerHandle) -> Step<()> {
    Step::suspend(Operation::InvokeCleaner(handle))
}

/// Request method.
pub fn get_method() -> Step<String> {
    Step::suspend(Operation::GetMethod)
}

/// Request header names.
pub fn get_header_names() -> Step<Vec<String>> {
    Step::suspend(Operation::GetHeaderNames)
}

/// Values of one request header.
pub fn get_header(name: impl Into<String>) -> Step<Vec<String>> {
    Step::suspend(Operation::GetHeader(name.into()))
}

/// Values of one request cookie.
pub fn get_cookies(name: impl Into<String>) -> Step<Vec<String>> {
    Step::suspend(Operation::GetCookies(name.into()))
}

/// Query parameter names.
pub fn get_parameter_names() -> Step<Vec<String>> {
    Step::suspend(Operation::GetParameterNames)
}

/// Values of one query parameter.
pub fn get_parameter(name: impl Into<String>) -> Step<Vec<String>> {
    Step::suspend(Operation::GetParameter(name.into()))
}

/// Read the request body, aborting with 413 past `limit` bytes.
pub fn read_body(limit: usize) -> Step<Vec<u8>> {
    Step::suspend(Operation::ReadBody(limit))
}

/// Current QoS of the request.
pub fn get_qos() -> Step<Qos> {
    Step::suspend(Operation::GetQos)
}

/// Change the QoS of the request.
pub fn set_qos(qos: Qos) -> Step<()> {
    Step::suspend(Operation::SetQos(qos))
}

/// Dispatch on the unconsumed request path.
///
/// `matcher` returns the path remaining after its match and the program to
/// run; `None` aborts with 404.
pub fn route_path<T, F>(matcher: F) -> Step<T>
where
    T: Any + Send,
    F: FnOnce(&str) -> Option<(String, Step<T>)> + Send + 'static,
{
    Step::suspend(Operation::RoutePath(Box::new(move |path: &str| {
        matcher(path).map(|(rest, next)| (rest, next.into_routine()))
    })))
}

/// Continue with `next`, treating `remaining` as the unconsumed path.
pub fn continue_with<T: Any + Send>(remaining: impl Into<String>, next: Step<T>) -> Step<T> {
    Step::suspend(Operation::Continue(remaining.into(), Box::new(next.into_routine())))
}
