//! Path-prefix routing built on [`route_path`].

use std::any::Any;

use crate::core::effect::route_path;
use crate::core::step::Step;

type Handler<T> = Box<dyn FnOnce() -> Step<T> + Send>;

/// Ordered list of path prefixes and the programs they dispatch to.
///
/// Prefixes match whole segments: `/api` matches `/api` and `/api/users` but
/// not `/apix`. The first matching prefix wins and the remainder of the path
/// becomes the unconsumed path for the chosen program, so routers nest.
pub struct Router<T> {
    routes: Vec<(String, Handler<T>)>,
}

impl<T: Any + Send> Router<T> {
    /// Router with no routes; every path is a 404.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Dispatch paths under `prefix` to the program built by `handler`.
    #[must_use]
    pub fn prefix<F>(mut self, prefix: impl Into<String>, handler: F) -> Self
    where
        F: FnOnce() -> Step<T> + Send + 'static,
    {
        self.routes.push((prefix.into(), Box::new(handler)));
        self
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route has been added.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// The dispatching program.
    pub fn into_step(self) -> Step<T> {
        let routes = self.routes;
        route_path(move |path: &str| {
            routes.into_iter().find_map(|(prefix, handler)| {
                strip_segment_prefix(path, &prefix).map(|rest| (rest.to_string(), handler()))
            })
        })
    }
}

impl<T: Any + Send> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip `prefix` from `path` if it matches on a segment boundary.
pub fn strip_segment_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
