//! Error types for registration and shutdown.
//!
//! This module defines the errors returned while registering dependencies and the
//! errors streamed out of [`Closer::close`](crate::Closer::close).

use crate::release::ReleaseError;

/// Errors that can occur while registering dependencies or releasing them
#[derive(Debug)]
#[non_exhaustive]
pub enum CloserError {
    /// A prerequisite passed to registration was absent
    NilDependency,
    /// A prerequisite belongs to another closer or has already been released
    UnknownDependency { dependency: usize },
    /// A release action returned an error
    ReleaseFailed {
        dependency: usize,
        source: ReleaseError,
    },
    /// A release action panicked
    ReleasePanicked {
        dependency: usize,
        panic_message: String,
    },
    /// `close` was called while another shutdown of the same closer was in flight
    ConcurrentClose,
}

impl CloserError {
    /// The dependency this error is about, if any.
    pub fn dependency(&self) -> Option<usize> {
        match self {
            CloserError::UnknownDependency { dependency }
            | CloserError::ReleaseFailed { dependency, .. }
            | CloserError::ReleasePanicked { dependency, .. } => Some(*dependency),
            _ => None,
        }
    }
}

impl std::fmt::Display for CloserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloserError::NilDependency => write!(f, "adding dependency: dependency is nil"),
            CloserError::UnknownDependency { dependency } => write!(
                f,
                "adding dependency: dependency #{} not associated with this closer",
                dependency
            ),
            CloserError::ReleaseFailed { dependency, source } => {
                write!(f, "releasing dependency #{}: {}", dependency, source)
            }
            CloserError::ReleasePanicked {
                dependency,
                panic_message,
            } => write!(
                f,
                "releasing dependency #{}: release panicked: {}",
                dependency, panic_message
            ),
            CloserError::ConcurrentClose => {
                write!(f, "closer is already shutting down - concurrent close not supported")
            }
        }
    }
}

impl std::error::Error for CloserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CloserError::ReleaseFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type for closer operations
pub type CloserResult<T> = Result<T, CloserError>;
