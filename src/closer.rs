//! Dependency registry and layered release engine.
//!
//! Provides [`Closer`]: register resources with [`Closer::add`], then release all of them
//! with [`Closer::close`] in dependency order, concurrently within each layer.
//!
//! Uses a single Mutex around the graph so registration and layer extraction never
//! observe each other half-done.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::channel::mpsc;
use futures::future::{self, BoxFuture, Either};
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "tracing")]
use tracing::{debug, error, info, info_span, trace, warn, Instrument, Span};

use crate::builder::Registration;
use crate::error::{CloserError, CloserResult};
use crate::graph::{Graph, Layer};
use crate::release::Releaser;
use crate::types::{CloserId, Dependency, NodeId};

// Guard to ensure close_lock is released when the shutdown stream finishes or is dropped
struct CloseGuard<'a> {
    lock: &'a AtomicBool,
}

impl<'a> Drop for CloseGuard<'a> {
    fn drop(&mut self) {
        self.lock.store(false, Ordering::SeqCst);
    }
}

/// Registry of releasable resources for graceful shutdown.
///
/// A `Closer` owns a dependency graph. Each registered resource carries an optional
/// release action and the set of resources it needs while it is running (its
/// *prerequisites*). On shutdown the closer releases every resource exactly once,
/// never releasing a prerequisite before all resources that depend on it.
///
/// # Workflow
///
/// 1. Create a closer with [`Closer::new`]
/// 2. Register resources with [`Closer::add`], finishing each registration with
///    [`Registration::register`] or [`Registration::depends_on`]
/// 3. On shutdown, call [`Closer::close`] and drain the returned error stream
///
/// # Examples
///
/// ```
/// use closer::{releaser, Closer};
/// use futures::StreamExt;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main] async fn main() {
/// let closer = Closer::new();
///
/// let pool = closer
///     .add(Some(releaser(|_| async { Ok(()) })))
///     .register();
/// let server = closer
///     .add(Some(releaser(|_| async { Ok(()) })))
///     .depends_on([pool])
///     .unwrap();
/// # let _ = server;
///
/// // The server is released first, then the pool
/// let errors: Vec<_> = closer
///     .close(CancellationToken::new(), |fut| {
///         tokio::spawn(fut);
///     })
///     .collect()
///     .await;
///
/// assert!(errors.is_empty());
/// assert!(closer.is_empty());
/// # }
/// ```
pub struct Closer {
    id: CloserId,
    pub(crate) graph: Mutex<Graph>,
    close_lock: AtomicBool, // Ensures only one close() at a time
}

impl Default for Closer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Closer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closer")
            .field("id", &self.id.0)
            .field("dependencies", &self.len())
            .finish()
    }
}

impl Closer {
    /// Create a new empty closer.
    pub fn new() -> Self {
        Self {
            id: CloserId::next(),
            graph: Mutex::new(Graph::default()),
            close_lock: AtomicBool::new(false),
        }
    }

    /// Start registering a resource with an optional release action.
    ///
    /// A resource without a release action still takes part in ordering; releasing it
    /// does nothing and never fails.
    pub fn add(&self, release: Option<Releaser>) -> Registration<'_> {
        Registration {
            closer: self,
            releaser: release,
        }
    }

    /// Number of registered dependencies not yet released.
    pub fn len(&self) -> usize {
        self.graph.lock().len()
    }

    /// Whether every registered dependency has been released.
    pub fn is_empty(&self) -> bool {
        self.graph.lock().is_empty()
    }

    pub(crate) fn insert(&self, releaser: Option<Releaser>) -> Dependency {
        let id = self.graph.lock().insert(releaser, HashSet::new());

        #[cfg(feature = "tracing")]
        debug!(closer = self.id.0, dependency = id.0, "registered dependency");

        Dependency {
            closer: self.id,
            id,
        }
    }

    pub(crate) fn insert_with(
        &self,
        releaser: Option<Releaser>,
        prerequisites: Vec<Option<Dependency>>,
    ) -> CloserResult<Dependency> {
        let mut graph = self.graph.lock();

        if prerequisites.iter().any(Option::is_none) {
            return Err(CloserError::NilDependency);
        }

        let mut ids = HashSet::with_capacity(prerequisites.len());
        for dep in prerequisites.into_iter().flatten() {
            if dep.closer != self.id || !graph.contains(dep.id) {
                return Err(CloserError::UnknownDependency { dependency: dep.id.0 });
            }
            ids.insert(dep.id);
        }

        #[cfg(feature = "tracing")]
        let prerequisite_count = ids.len();
        let id = graph.insert(releaser, ids);
        drop(graph);

        #[cfg(feature = "tracing")]
        debug!(
            closer = self.id.0,
            dependency = id.0,
            prerequisite_count,
            "registered dependency"
        );

        Ok(Dependency {
            closer: self.id,
            id,
        })
    }

    /// Release every registered dependency, layer by layer.
    ///
    /// Returns a stream of the errors produced by release actions. The stream drives the
    /// shutdown: each layer is extracted and released as the stream is polled, so the
    /// caller must drain it. It ends when every dependency has been released or once
    /// `token` is cancelled.
    ///
    /// - Release actions of one layer run concurrently, each spawned with `spawner`
    /// - The next layer starts only after every release of the current layer finished,
    ///   so all errors of one layer are yielded before any error of the next
    /// - Release failures never stop the shutdown; panics are reported as
    ///   [`CloserError::ReleasePanicked`]
    /// - Cancelling `token` stops the shutdown: no further layer is extracted and
    ///   in-flight releases are no longer awaited, though they are not aborted. The
    ///   same token is passed to every release action, so deadlines reach them too
    ///
    /// # Parameters
    ///
    /// - `spawner`: A function that spawns futures on the async runtime. Examples:
    ///   - Tokio: `|fut| { tokio::spawn(fut); }`
    ///   - Smol: `|fut| smol::spawn(fut).detach()`
    ///
    /// # Errors
    ///
    /// Yields [`CloserError::ConcurrentClose`] and ends if another shutdown of this
    /// closer is in flight.
    ///
    /// If the remaining dependencies require each other as prerequisites, no layer can
    /// be extracted: the stream logs the stall and ends without an item, leaving those
    /// dependencies registered.
    ///
    /// Calling `close` again after a completed shutdown releases whatever was registered
    /// since; on an empty closer the stream ends immediately.
    pub fn close<'a, S>(&'a self, token: CancellationToken, spawner: S) -> BoxStream<'a, CloserError>
    where
        S: Fn(BoxFuture<'static, ()>) + Send + 'a,
    {
        // Acquire close lock to prevent concurrent shutdowns
        if self
            .close_lock
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            #[cfg(feature = "tracing")]
            error!(
                closer = self.id.0,
                "closer is already shutting down - concurrent close not supported"
            );
            return stream::once(future::ready(CloserError::ConcurrentClose)).boxed();
        }

        #[cfg(feature = "tracing")]
        let span = info_span!("close", closer = self.id.0);
        #[cfg(feature = "tracing")]
        span.in_scope(|| info!(dependencies = self.len(), "starting shutdown"));

        let state = CloseState {
            closer: self,
            token,
            spawner,
            #[cfg(feature = "tracing")]
            span,
            layer: None,
            layer_index: 0,
            _guard: CloseGuard {
                lock: &self.close_lock,
            },
        };

        #[cfg(feature = "tracing")]
        let errors = stream::unfold(state, |state| {
            let span = state.span.clone();
            state.next_error().instrument(span)
        });
        #[cfg(not(feature = "tracing"))]
        let errors = stream::unfold(state, CloseState::next_error);

        errors.boxed()
    }
}

struct CloseState<'a, S> {
    closer: &'a Closer,
    token: CancellationToken,
    spawner: S,
    #[cfg(feature = "tracing")]
    span: Span,
    layer: Option<mpsc::UnboundedReceiver<CloserError>>,
    layer_index: usize,
    _guard: CloseGuard<'a>,
}

impl<'a, S> CloseState<'a, S>
where
    S: Fn(BoxFuture<'static, ()>),
{
    async fn next_error(mut self) -> Option<(CloserError, Self)> {
        loop {
            if let Some(mut layer) = self.layer.take() {
                let token = self.token.clone();
                let next = {
                    let cancelled = pin!(token.cancelled());
                    let outcome = future::select(layer.next(), cancelled).await;
                    match outcome {
                        Either::Left((next, _)) => Some(next),
                        Either::Right(_) => None,
                    }
                };

                match next {
                    Some(Some(err)) => {
                        self.layer = Some(layer);
                        return Some((err, self));
                    }
                    Some(None) => {
                        #[cfg(feature = "tracing")]
                        debug!(layer = self.layer_index, "layer released");
                    }
                    None => {
                        self.interrupted();
                        return None;
                    }
                }
            }

            if self.token.is_cancelled() {
                self.interrupted();
                return None;
            }

            let layer = self.closer.graph.lock().take_layer();
            match layer {
                None => {
                    #[cfg(feature = "tracing")]
                    info!(layers = self.layer_index, "all dependencies released");
                    return None;
                }
                Some(layer) if layer.is_empty() => {
                    // Only a cycle leaves a non-empty graph without a layer
                    #[cfg(feature = "tracing")]
                    error!(
                        remaining = self.closer.len(),
                        "shutdown stalled: remaining dependencies require each other"
                    );
                    return None;
                }
                Some(layer) => {
                    self.layer_index += 1;
                    #[cfg(feature = "tracing")]
                    debug!(layer = self.layer_index, size = layer.len(), "releasing layer");
                    self.layer = Some(self.dispatch(layer));
                }
            }
        }
    }

    fn dispatch(&self, layer: Layer) -> mpsc::UnboundedReceiver<CloserError> {
        // The receiver ends once every spawned release dropped its sender
        let (tx, rx) = mpsc::unbounded();

        for (id, releaser) in layer.members {
            let Some(releaser) = releaser else {
                #[cfg(feature = "tracing")]
                trace!(dependency = id.0, "no release action");
                continue;
            };

            #[cfg(feature = "tracing")]
            trace!(dependency = id.0, "spawning release");
            let release = release_one(id, releaser, self.token.clone(), tx.clone());
            #[cfg(feature = "tracing")]
            let release = release.instrument(self.span.clone());
            (self.spawner)(release.boxed());
        }

        rx
    }

    fn interrupted(&self) {
        #[cfg(feature = "tracing")]
        warn!(
            layer = self.layer_index,
            unreleased = self.closer.len(),
            "shutdown interrupted by cancellation"
        );
    }
}

async fn release_one(
    id: NodeId,
    releaser: Releaser,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<CloserError>,
) {
    // Call inside the guarded future so panics before the first await are caught too
    let result = AssertUnwindSafe(async move { releaser(token).await })
        .catch_unwind()
        .await;

    let err = match result {
        Ok(Ok(())) => {
            #[cfg(feature = "tracing")]
            trace!(dependency = id.0, "dependency released");
            return;
        }
        Ok(Err(source)) => {
            #[cfg(feature = "tracing")]
            warn!(dependency = id.0, error = %source, "release failed");
            CloserError::ReleaseFailed {
                dependency: id.0,
                source,
            }
        }
        Err(payload) => {
            let panic_message = panic_message(payload);
            #[cfg(feature = "tracing")]
            error!(dependency = id.0, panic_message = %panic_message, "release panicked");
            CloserError::ReleasePanicked {
                dependency: id.0,
                panic_message,
            }
        }
    };

    // Ignore send errors - the stream is gone once shutdown was interrupted
    let _ = tx.unbounded_send(err);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
