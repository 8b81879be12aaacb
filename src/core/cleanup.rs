//! Per-request cleanup chain.
//!
//! Cleaners form a singly linked list with the newest registration at the head,
//! so the final sweep releases resources in the reverse order they were
//! acquired. Each cleaner runs at most once: either through its
//! [`CleanerHandle`] or during the sweep, whichever comes first.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::sensor::{report, Sensor, SensorEvent};
use crate::util::panic_message;

/// Action released by a cleaner.
pub type CleanerAction = Box<dyn FnOnce() + Send>;

struct CleanerNode {
    action: Mutex<Option<CleanerAction>>,
    dropped: AtomicBool,
    next: Option<Arc<CleanerNode>>,
}

impl CleanerNode {
    /// Run the action unless it already ran. `dropped` is set before the call.
    fn fire(&self) -> bool {
        if self.dropped.swap(true, Ordering::AcqRel) {
            return false;
        }
        let action = self.action.lock().take();
        match action {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }
}

/// Handle to one registered cleaner.
#[derive(Clone)]
pub struct CleanerHandle {
    node: Arc<CleanerNode>,
}

impl CleanerHandle {
    /// Run the cleaner now. Returns `false` if it had already run.
    pub fn invoke(&self) -> bool {
        self.node.fire()
    }

    /// Whether the cleaner has run (or is running).
    pub fn is_dropped(&self) -> bool {
        self.node.dropped.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CleanerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanerHandle")
            .field("dropped", &self.is_dropped())
            .finish()
    }
}

/// LIFO chain of cleaners owned by one request.
#[derive(Default)]
pub struct CleanupChain {
    head: Option<Arc<CleanerNode>>,
    len: usize,
    swept: bool,
}

impl CleanupChain {
    /// Empty chain.
    pub const fn new() -> Self {
        Self {
            head: None,
            len: 0,
            swept: false,
        }
    }

    /// Push `action` at the head of the chain.
    pub fn register(&mut self, action: CleanerAction) -> CleanerHandle {
        let node = Arc::new(CleanerNode {
            action: Mutex::new(Some(action)),
            dropped: AtomicBool::new(false),
            next: self.head.take(),
        });
        self.head = Some(Arc::clone(&node));
        self.len += 1;
        CleanerHandle { node }
    }

    /// Number of registered cleaners, run or not.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing was ever registered.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the final sweep has happened.
    pub const fn is_swept(&self) -> bool {
        self.swept
    }

    /// Run every cleaner that has not run yet, newest first.
    ///
    /// A panicking cleaner is reported to `sensor` and the sweep carries on.
    /// Only the first call does anything; it returns how many cleaners ran.
    pub fn sweep(&mut self, ordinal: u64, sensor: &dyn Sensor) -> usize {
        if self.swept {
            return 0;
        }
        self.swept = true;

        let mut ran = 0;
        let mut cursor = self.head.as_ref();
        while let Some(node) = cursor {
            match panic::catch_unwind(AssertUnwindSafe(|| node.fire())) {
                Ok(true) => ran += 1,
                Ok(false) => {}
                Err(payload) => report(
                    sensor,
                    SensorEvent::CleanupFailed {
                        ordinal,
                        message: panic_message(payload.as_ref()),
                    },
                ),
            }
            cursor = node.next.as_ref();
        }
        ran
    }
}

impl Drop for CleanupChain {
    fn drop(&mut self) {
        // Unlink iteratively; long chains would otherwise drop recursively.
        let mut next = self.head.take();
        while let Some(node) = next {
            next = match Arc::try_unwrap(node) {
                Ok(mut node) => node.next.take(),
                Err(_) => None,
            };
        }
    }
}
