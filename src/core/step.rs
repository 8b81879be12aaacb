//! Typed request programs.
//!
//! [`Step<T>`] is a [`Routine`] over [`Operation`] tagged with the type it
//! finishes with. The tag is compile-time only; a `Step<T>` has the same
//! layout as the routine it wraps.

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;

use crate::core::effect::Operation;
use crate::core::trampoline::{Routine, Value};

/// A suspendable request program producing a `T`.
pub struct Step<T> {
    routine: Routine<Operation>,
    _output: PhantomData<fn() -> T>,
}

impl<T: Any + Send> Step<T> {
    /// A program that immediately yields `value`.
    pub fn pure(value: T) -> Self {
        Self::from_routine(Routine::pure(value))
    }

    /// Run `f` on the result of this program.
    pub fn flat_map<U, F>(self, f: F) -> Step<U>
    where
        U: Any + Send,
        F: FnOnce(T) -> Step<U> + Send + 'static,
    {
        Step::from_routine(self.routine.bind(move |value| f(downcast::<T>(value)).routine))
    }

    /// Transform the result of this program.
    pub fn map<U, F>(self, f: F) -> Step<U>
    where
        U: Any + Send,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.flat_map(move |value| Step::pure(f(value)))
    }

    /// Run `next` after this program, discarding this program's result.
    pub fn then<U: Any + Send>(self, next: Step<U>) -> Step<U> {
        self.flat_map(move |_| next)
    }
}

impl<T> Step<T> {
    /// Wrap a routine whose final value is a `T`.
    ///
    /// The caller vouches for the type; a mismatch surfaces as a panic when the
    /// value is consumed.
    pub const fn from_routine(routine: Routine<Operation>) -> Self {
        Self {
            routine,
            _output: PhantomData,
        }
    }

    /// Erase the result type.
    pub fn into_routine(self) -> Routine<Operation> {
        self.routine
    }

    pub(crate) fn suspend(op: Operation) -> Self {
        Self::from_routine(Routine::Suspend(op))
    }
}

impl<T> fmt::Debug for Step<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("output", &type_name::<T>())
            .field("routine", &self.routine.tag())
            .finish()
    }
}

/// Recover a typed value from the engine.
///
/// # Panics
///
/// Panics if a continuation was resumed with a value of another type. That is
/// an interpreter bug, contained by the worker like any continuation panic.
pub fn downcast<T: Any>(value: Value) -> T {
    match value.downcast::<T>() {
        Ok(value) => *value,
        Err(_) => panic!("continuation resumed with a value that is not a {}", type_name::<T>()),
    }
}
