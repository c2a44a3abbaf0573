//! Dependency-Ordered Graceful Shutdown
//!
//! A small, runtime-agnostic *closer*: register the resources of a process (servers,
//! connections, pools, caches) together with a release action and the resources they
//! depend on, then release all of them on shutdown in an order that never pulls a
//! resource out from under something still using it.
//!
//! # Features
//!
//! - **Dependency ordering**: A resource is released only after every resource that
//!   lists it as a prerequisite has been released.
//! - **Layered concurrency**: Resources that do not depend on each other are released
//!   concurrently. Layers are strictly sequential.
//! - **Exactly once**: Each release action is an `FnOnce` and runs at most once; every
//!   registered resource is released exactly once when shutdown completes.
//! - **Errors as a stream**: Release failures never stop the shutdown. They are streamed
//!   back to the caller, layer by layer, and panics become errors too.
//! - **Cooperative cancellation**: A [`CancellationToken`](tokio_util::sync::CancellationToken)
//!   bounds the shutdown. Cancel it (or let [`CloserConfig::deadline`] cancel it) and no
//!   further layer is released.
//! - **Runtime-agnostic**: Works with any async runtime via a spawner closure.
//!
//! # Quick Start
//!
//! ```
//! use closer::{releaser, Closer};
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main] async fn main() {
//! let closer = Closer::new();
//!
//! // Registered first, released last
//! let db = closer.add(Some(releaser(|_| async { Ok(()) }))).register();
//!
//! // Both use the database, so both are released before it
//! let http = closer
//!     .add(Some(releaser(|_| async { Ok(()) })))
//!     .depends_on([db])
//!     .unwrap();
//! let jobs = closer
//!     .add(Some(releaser(|_| async { Err("queue not drained".into()) })))
//!     .depends_on([db])
//!     .unwrap();
//! # let _ = http;
//!
//! let mut errors = closer.close(CancellationToken::new(), |fut| {
//!     tokio::spawn(fut);
//! });
//! while let Some(err) = errors.next().await {
//!     assert_eq!(err.dependency(), Some(jobs.id()));
//! }
//! # }
//! ```
//!
//! # Core Concepts
//!
//! ## Closer
//!
//! The [`Closer`] owns the dependency graph. [`Closer::add`] registers a resource and
//! [`Closer::close`] releases everything.
//!
//! ## Dependency
//!
//! A [`Dependency`] is the opaque handle of a registered resource. Pass it to
//! [`Registration::depends_on`] when registering resources that use it.
//!
//! ## Layers
//!
//! On shutdown the closer repeatedly takes every resource that no remaining resource
//! lists as a prerequisite, releases those concurrently and waits for all of them before
//! taking the next layer. For the graph
//!
//! ```text
//! A          (no prerequisites)
//! B -> A
//! C -> B, A
//! D -> B
//! ```
//!
//! the layers are `{C, D}`, then `{B}`, then `{A}`.
//!
//! ## Cycles
//!
//! A prerequisite must already be registered, and a resource cannot name itself, so the
//! public API cannot build a cycle. Should the remaining graph ever have no releasable
//! layer, [`Closer::close`] logs the stall and ends its stream without reporting an
//! error; the stuck dependencies stay registered.
//!
//! # Cancellation
//!
//! The token passed to [`Closer::close`] is also handed to every release action.
//! Cancelling it ends the error stream: resources not yet reached stay unreleased and
//! release actions already running are no longer awaited. They are not aborted; watching
//! the token is their own job.
//!
//! # Logging
//!
//! With the default `tracing` feature the closer logs through the `tracing` crate, and
//! [`with_logging`] decorates release actions with a log event. Without the feature all
//! logging code is removed at compile time.
//!
//! - **INFO**: Shutdown start and completion
//! - **DEBUG**: Registrations, layer extraction and completion
//! - **TRACE**: Individual releases being spawned and finishing
//! - **WARN**: Release failures, interrupted shutdowns
//! - **ERROR**: Panicking releases, stalled graphs, concurrent `close` calls
//!
//! ```bash
//! RUST_LOG=closer=debug cargo run
//! ```

#![allow(private_bounds, private_interfaces)]

// Module declarations
mod builder;
mod closer;
mod config;
mod error;
mod graph;
mod prerequisite;
mod release;
mod types;

// Public re-exports
pub use builder::Registration;
pub use closer::Closer;
pub use config::{CloserConfig, ConfigError, SHUTDOWN_TIMEOUT_ENV};
pub use error::{CloserError, CloserResult};
#[cfg(feature = "tracing")]
pub use release::with_logging;
pub use release::{releaser, ReleaseError, ReleaseResult, Releaser};
pub use types::Dependency;
