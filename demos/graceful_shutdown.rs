//! Graceful shutdown of a small TCP service.
//!
//! Starts a TCP listener backed by a (fake) connection pool and cache, then waits for
//! Ctrl-C. On shutdown the listener is stopped first, then the pool and cache are
//! released concurrently. `APP_SHUTDOWN_TIMEOUT` bounds the whole shutdown.
//!
//! ```bash
//! RUST_LOG=info,closer=debug cargo run --example graceful_shutdown
//! ```

use std::error::Error;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use closer::{releaser, with_logging, Closer, CloserConfig};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span};
use tracing_subscriber::EnvFilter;

/// Stand-in for a database connection pool.
#[derive(Default)]
struct Pool {
    checked_out: AtomicUsize,
}

impl Pool {
    async fn query(&self) {
        self.checked_out.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.checked_out.fetch_sub(1, Ordering::SeqCst);
    }

    // Waits for checked out connections, giving up once the token is cancelled
    async fn close(&self, token: CancellationToken) -> io::Result<()> {
        while self.checked_out.load(Ordering::SeqCst) > 0 {
            tokio::select! {
                _ = token.cancelled() => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "connections still checked out"));
                }
                _ = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}

/// Stand-in for a write-behind cache whose flush always fails.
struct Cache;

impl Cache {
    async fn flush(&self) -> io::Result<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "cache backend unreachable"))
    }
}

async fn serve(listener: TcpListener, pool: Arc<Pool>, stop: CancellationToken) {
    loop {
        let (mut socket, peer) = tokio::select! {
            _ = stop.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(err) => {
                    error!(error = %err, "accept failed");
                    continue;
                }
            },
        };

        let pool = pool.clone();
        tokio::spawn(async move {
            pool.query().await;
            if let Err(err) = socket.write_all(b"hello\n").await {
                error!(%peer, error = %err, "write failed");
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CloserConfig::from_env()?;
    let closer = Closer::new();

    let pool = Arc::new(Pool::default());
    let pool_dep = {
        let pool = pool.clone();
        closer
            .add(Some(with_logging(
                info_span!("pool"),
                "connection pool closed",
                Some(releaser(move |token| async move {
                    pool.close(token).await?;
                    Ok(())
                })),
            )))
            .register()
    };

    let cache = Cache;
    let cache_dep = closer
        .add(Some(with_logging(
            info_span!("cache"),
            "cache flushed",
            Some(releaser(move |_| async move {
                cache.flush().await?;
                Ok(())
            })),
        )))
        .register();

    let listener = TcpListener::bind("127.0.0.1:8080").await?;
    let addr = listener.local_addr()?;
    let stop = CancellationToken::new();
    let server = tokio::spawn(serve(listener, pool.clone(), stop.clone()));
    closer
        .add(Some(with_logging(
            info_span!("server", %addr),
            "server stopped accepting connections",
            Some(releaser(move |_| async move {
                stop.cancel();
                server.await?;
                Ok(())
            })),
        )))
        .depends_on([pool_dep, cache_dep])?;

    info!(%addr, "server is running");
    tokio::signal::ctrl_c().await?;
    info!(
        timeout_secs = config.shutdown_timeout.as_secs_f64(),
        "shutdown requested"
    );

    let token = CancellationToken::new();
    tokio::spawn(config.deadline(token.clone(), tokio::time::sleep));

    let mut errors = closer.close(token.clone(), |fut| {
        tokio::spawn(fut);
    });
    let mut failed = 0;
    while let Some(err) = errors.next().await {
        failed += 1;
        error!(error = %err, "shutdown error");
    }
    drop(errors);

    // Stop the deadline timer
    token.cancel();

    if failed == 0 && closer.is_empty() {
        info!("server gracefully shutdown");
    } else {
        error!(
            failed,
            unreleased = closer.len(),
            "server shutdown incomplete"
        );
    }
    Ok(())
}
