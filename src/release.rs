//! Release actions and decorators.
//!
//! A release action is the user-supplied shutdown function for one resource. This
//! module defines the [`Releaser`] type, the [`releaser`] constructor for closures,
//! and, with the `tracing` feature, [`with_logging`], which wraps a release action
//! with a log event.

#[cfg(feature = "tracing")]
use std::borrow::Cow;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "tracing")]
use tracing::{info, warn, Span};

/// Error returned by a release action.
pub type ReleaseError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a release action.
pub type ReleaseResult = Result<(), ReleaseError>;

/// Type-erased release action.
///
/// The closer invokes each releaser at most once, passing a clone of the
/// [`CancellationToken`] handed to [`Closer::close`](crate::Closer::close). Long-running
/// releasers should watch the token and give up once it is cancelled; the closer
/// itself never aborts a release that has started.
///
/// Build one with [`releaser`].
pub type Releaser = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ReleaseResult> + Send>;

/// Convert an async closure into a [`Releaser`].
///
/// # Examples
///
/// ```
/// use closer::{releaser, Closer};
///
/// let closer = Closer::new();
/// closer
///     .add(Some(releaser(|_token| async move {
///         // flush buffers, close sockets, ...
///         Ok(())
///     })))
///     .register();
/// ```
pub fn releaser<F, Fut>(f: F) -> Releaser
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ReleaseResult> + Send + 'static,
{
    Box::new(move |token| f(token).boxed())
}

/// Wrap a release action so that a log event is emitted once it has run.
///
/// The event is recorded with `span` as its parent, so fields attached to the span
/// (resource name, address, ...) show up next to `message`. Exactly one event is
/// emitted per invocation: `INFO` when the release succeeds or `release` is `None`,
/// `WARN` with the error attached when it fails. The wrapped error is returned
/// unchanged.
///
/// # Examples
///
/// ```
/// use closer::{releaser, with_logging, Closer};
/// use tracing::info_span;
///
/// let closer = Closer::new();
/// let db = closer
///     .add(Some(with_logging(
///         info_span!("database", url = "postgres://localhost"),
///         "database pool closed",
///         Some(releaser(|_| async { Ok(()) })),
///     )))
///     .register();
/// # let _ = db;
/// ```
#[cfg(feature = "tracing")]
pub fn with_logging(
    span: Span,
    message: impl Into<Cow<'static, str>>,
    release: Option<Releaser>,
) -> Releaser {
    let message = message.into();
    Box::new(move |token| {
        async move {
            let result = match release {
                Some(release) => release(token).await,
                None => Ok(()),
            };
            match &result {
                Ok(()) => info!(parent: &span, "{}", message),
                Err(err) => warn!(parent: &span, error = %err, "{}", message),
            }
            result
        }
        .boxed()
    })
}
