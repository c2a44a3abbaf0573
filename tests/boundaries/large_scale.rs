//! Large scale tests - deep chains and wide layers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use closer::{releaser, Closer};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::common::{drain, spawn};

#[tokio::test]
async fn test_deep_chain_releases_in_reverse() {
    const DEPTH: usize = 200;
    let order = Arc::new(Mutex::new(Vec::with_capacity(DEPTH)));
    let closer = Closer::new();

    let mut previous = None;
    for i in 0..DEPTH {
        let order = order.clone();
        let release = Some(releaser(move |_| async move {
            order.lock().push(i);
            Ok(())
        }));
        let dep = match previous {
            None => closer.add(release).register(),
            Some(prev) => closer.add(release).depends_on([prev]).unwrap(),
        };
        previous = Some(dep);
    }

    let errors = drain(closer.close(CancellationToken::new(), spawn)).await;

    assert!(errors.is_empty());
    let expected: Vec<usize> = (0..DEPTH).rev().collect();
    assert_eq!(*order.lock(), expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wide_fan_on_single_root() {
    const WIDTH: usize = 500;
    let released = Arc::new(AtomicUsize::new(0));
    let root_saw = Arc::new(AtomicUsize::new(usize::MAX));
    let closer = Closer::new();

    let root = {
        let released = released.clone();
        let root_saw = root_saw.clone();
        closer
            .add(Some(releaser(move |_| async move {
                root_saw.store(released.load(Ordering::SeqCst), Ordering::SeqCst);
                Ok(())
            })))
            .register()
    };

    for _ in 0..WIDTH {
        let released = released.clone();
        closer
            .add(Some(releaser(move |_| async move {
                released.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })))
            .depends_on([root])
            .unwrap();
    }
    assert_eq!(closer.len(), WIDTH + 1);

    let errors = drain(closer.close(CancellationToken::new(), spawn)).await;

    assert!(errors.is_empty());
    assert_eq!(released.load(Ordering::SeqCst), WIDTH);
    // Every dependent finished before the root started
    assert_eq!(root_saw.load(Ordering::SeqCst), WIDTH);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_many_failures_in_one_layer() {
    const WIDTH: usize = 300;
    let closer = Closer::new();

    for _ in 0..WIDTH {
        closer
            .add(Some(releaser(|_| async { Err("boom".into()) })))
            .register();
    }

    let errors = drain(closer.close(CancellationToken::new(), spawn)).await;

    assert_eq!(errors.len(), WIDTH);
    let mut ids: Vec<_> = errors.iter().filter_map(|e| e.dependency()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), WIDTH);
}
