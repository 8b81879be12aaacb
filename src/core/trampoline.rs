//! Stack-safe interpreter for suspendable programs.
//!
//! A [`Routine`] is a chain of pure values, suspension tokens and binds. [`run`]
//! reduces it with a single loop: every iteration either finishes, suspends, or
//! rotates one left-nested bind to the right, so native stack usage stays
//! constant no matter how many binds a program contains.
//!
//! The engine knows nothing about what tokens mean. It is generic over the token
//! type `Op`; callers answer a [`RunResult::Suspended`] by feeding a value back
//! into its continuation and running the result again.

use std::any::Any;
use std::fmt;

/// Type-erased value flowing between steps of a routine.
pub type Value = Box<dyn Any + Send>;

/// Continuation waiting for the value a suspension resumes with.
pub type Continuation<Op> = Box<dyn FnOnce(Value) -> Routine<Op> + Send>;

/// A suspendable program over suspension tokens of type `Op`.
pub enum Routine<Op> {
    /// A finished computation.
    Pure(Value),
    /// Stop and ask the caller to handle `Op`.
    Suspend(Op),
    /// Run the base routine, then feed its value to the continuation.
    FlatMap(Box<Routine<Op>>, Continuation<Op>),
}

/// Outcome of running a routine until it can no longer make progress on its own.
pub enum RunResult<Op> {
    /// The routine produced its final value.
    Finished(Value),
    /// The routine is waiting on a token; resume by calling the continuation.
    Suspended(Op, Continuation<Op>),
}

impl<Op: 'static> Routine<Op> {
    /// Lift a value into a finished routine.
    pub fn pure<T: Any + Send>(value: T) -> Self {
        Self::Pure(Box::new(value))
    }

    /// Sequence `f` after this routine.
    ///
    /// Construction is O(1): the bind is recorded as-is and re-associated lazily
    /// by [`run`], so building a chain of any length never recurses.
    #[must_use]
    pub fn bind<F>(self, f: F) -> Self
    where
        F: FnOnce(Value) -> Self + Send + 'static,
    {
        Self::FlatMap(Box::new(self), Box::new(f))
    }

    /// Name of the outermost variant, for logging.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Pure(_) => "pure",
            Self::Suspend(_) => "suspend",
            Self::FlatMap(..) => "flat_map",
        }
    }
}

/// Run `routine` until it finishes or suspends.
///
/// Safe to call concurrently on different routines; no state is shared.
pub fn run<Op: 'static>(mut routine: Routine<Op>) -> RunResult<Op> {
    loop {
        routine = match routine {
            Routine::Pure(value) => return RunResult::Finished(value),
            Routine::Suspend(op) => return RunResult::Suspended(op, Box::new(Routine::Pure)),
            Routine::FlatMap(base, k) => match *base {
                Routine::Pure(value) => k(value),
                Routine::Suspend(op) => return RunResult::Suspended(op, k),
                // (m >>= f) >>= g  ==>  m >>= (x -> f(x) >>= g)
                Routine::FlatMap(inner, k1) => Routine::FlatMap(
                    inner,
                    Box::new(move |x| Routine::FlatMap(Box::new(k1(x)), k)),
                ),
            },
        };
    }
}

impl<Op: fmt::Debug> fmt::Debug for Routine<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pure(_) => f.write_str("Pure(..)"),
            Self::Suspend(op) => f.debug_tuple("Suspend").field(op).finish(),
            Self::FlatMap(base, _) => f.debug_tuple("FlatMap").field(base).field(&"..").finish(),
        }
    }
}

impl<Op: fmt::Debug> fmt::Debug for RunResult<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished(_) => f.write_str("Finished(..)"),
            Self::Suspended(op, _) => f.debug_tuple("Suspended").field(op).field(&"..").finish(),
        }
    }
}
