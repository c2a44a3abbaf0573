//! Core type definitions for registered resources and handles.
//!
//! This module defines the opaque tokens used to address nodes in a closer's graph
//! and the [`Dependency`] handle handed back to callers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque node identifier, unique within one closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId(pub(crate) usize);

/// Identity of one [`Closer`](crate::Closer) instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CloserId(pub(crate) u64);

static NEXT_CLOSER_ID: AtomicU64 = AtomicU64::new(0);

impl CloserId {
    pub(crate) fn next() -> Self {
        CloserId(NEXT_CLOSER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opaque handle to a resource registered with a [`Closer`](crate::Closer).
///
/// A `Dependency` is returned by [`Registration::register`](crate::Registration::register)
/// and [`Registration::depends_on`](crate::Registration::depends_on). Pass it as a
/// prerequisite of later registrations to declare that the later resource must be
/// released first.
///
/// Handles are cheap to copy. Two handles compare equal only when they are copies of
/// the same registration; a handle is tied to the closer that issued it.
///
/// # Examples
///
/// ```
/// use closer::Closer;
///
/// let closer = Closer::new();
/// let pool = closer.add(None).register();
/// let server = closer.add(None).depends_on([pool]).unwrap();
///
/// assert_ne!(pool, server);
/// assert_eq!(closer.len(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub(crate) closer: CloserId,
    pub(crate) id: NodeId,
}

impl Dependency {
    /// Numeric token of this dependency, unique within its closer.
    ///
    /// Useful for diagnostics; errors reported by the closer carry the same number.
    pub fn id(&self) -> usize {
        self.id.0
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency #{}", self.id.0)
    }
}
