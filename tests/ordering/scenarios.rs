//! Dependency-ordering scenarios

use std::time::Duration;

use closer::Closer;
use tokio_util::sync::CancellationToken;

use crate::common::{drain, spawn, Recorder};

#[tokio::test]
async fn test_chain_releases_in_reverse() {
    let r = Recorder::new();
    let closer = Closer::new();

    let r1 = closer.add(Some(r.release("1"))).register();
    let r2 = closer.add(Some(r.release("2"))).depends_on([r1]).unwrap();
    closer.add(Some(r.release("3"))).depends_on([r2]).unwrap();

    let errors = drain(closer.close(CancellationToken::new(), spawn)).await;

    assert!(errors.is_empty());
    assert_eq!(r.order(), vec!["3", "2", "1"]);
}

#[tokio::test]
async fn test_diamond_respects_all_edges() {
    // A (no deps), B -> A, C -> B, A, D -> B
    let r = Recorder::new();
    let closer = Closer::new();

    let a = closer.add(Some(r.release("A"))).register();
    let b = closer.add(Some(r.release("B"))).depends_on([a]).unwrap();
    closer.add(Some(r.release("C"))).depends_on([b, a]).unwrap();
    closer.add(Some(r.release("D"))).depends_on([b]).unwrap();

    let errors = drain(closer.close(CancellationToken::new(), spawn)).await;

    assert!(errors.is_empty());
    r.assert_before("C", "B");
    r.assert_before("D", "B");
    r.assert_before("B", "A");
    assert_eq!(r.order().len(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_dependents_still_go_first() {
    // Prerequisites finish fast, dependents slowly; ordering must not follow speed
    let r = Recorder::new();
    let closer = Closer::new();

    let r1 = closer
        .add(Some(r.release_after("1", Duration::from_millis(100))))
        .register();
    let r2 = closer
        .add(Some(r.release_after("2", Duration::from_millis(10))))
        .depends_on([r1])
        .unwrap();
    closer
        .add(Some(r.release_after("3", Duration::from_millis(80))))
        .depends_on([r2, r1])
        .unwrap();
    closer
        .add(Some(r.release_after("4", Duration::from_millis(30))))
        .depends_on([r2])
        .unwrap();

    let errors = drain(closer.close(CancellationToken::new(), spawn)).await;

    assert!(errors.is_empty());
    // 3 and 4 share a layer, so the faster one finishes first
    assert_eq!(r.order(), vec!["4", "3", "2", "1"]);
}

#[tokio::test]
async fn test_every_subgraph_is_released() {
    let r = Recorder::new();
    let closer = Closer::new();

    // Subgraph 1: layers 3 <- 2 <- 1
    let g1r1 = closer.add(Some(r.release("g1-layer3"))).register();
    let g1r2 = closer
        .add(Some(r.release("g1-layer2")))
        .depends_on([g1r1])
        .unwrap();
    closer
        .add(Some(r.release("g1-layer1")))
        .depends_on([g1r2, g1r1])
        .unwrap();

    // Subgraph 2: one root, two dependents
    let g2r1 = closer.add(Some(r.release("g2-layer2"))).register();
    closer
        .add(Some(r.release("g2-layer1a")))
        .depends_on([g2r1])
        .unwrap();
    closer
        .add(Some(r.release("g2-layer1b")))
        .depends_on([g2r1])
        .unwrap();

    // Subgraph 3: single resource
    closer.add(Some(r.release("g3-layer1"))).register();

    let errors = drain(closer.close(CancellationToken::new(), spawn)).await;
    assert!(errors.is_empty());

    let layer_of = |name: &str| -> u32 {
        name.rsplit("layer")
            .next()
            .and_then(|s| s[..1].parse().ok())
            .unwrap()
    };
    let layers: Vec<u32> = r.order().iter().map(|name| layer_of(*name)).collect();

    // Layers never interleave
    assert_eq!(layers, vec![1, 1, 1, 1, 2, 2, 3]);
}

#[tokio::test]
async fn test_resources_without_release_action_keep_ordering() {
    let r = Recorder::new();
    let closer = Closer::new();

    let pool = closer.add(Some(r.release("pool"))).register();
    // Pure ordering node: nothing to release, but it sits between server and pool
    let gate = closer.add(None).depends_on([pool]).unwrap();
    closer
        .add(Some(r.release("server")))
        .depends_on([gate])
        .unwrap();

    let errors = drain(closer.close(CancellationToken::new(), spawn)).await;

    assert!(errors.is_empty());
    assert_eq!(r.order(), vec!["server", "pool"]);
    assert!(closer.is_empty());
}

#[tokio::test]
async fn test_random_acyclic_graph_releases_each_node_once_in_order() {
    const NODES: usize = 60;
    let names: Vec<&'static str> = (0..NODES)
        .map(|i| &*Box::leak(format!("n{}", i).into_boxed_str()))
        .collect();

    let r = Recorder::new();
    let closer = Closer::new();
    let mut handles = Vec::new();
    let mut edges = Vec::new();

    // Deterministic pseudo-random edges, always pointing at earlier nodes
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    for i in 0..NODES {
        let mut prerequisites = Vec::new();
        for j in 0..i {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            if seed % 7 == 0 {
                prerequisites.push(handles[j]);
                edges.push((i, j));
            }
        }
        let handle = closer
            .add(Some(r.release(names[i])))
            .depends_on(prerequisites)
            .unwrap();
        handles.push(handle);
    }

    let errors = drain(closer.close(CancellationToken::new(), spawn)).await;
    assert!(errors.is_empty());

    for name in &names {
        assert_eq!(r.count(name), 1, "{} must be released exactly once", name);
    }
    for (dependent, prerequisite) in edges {
        r.assert_before(names[dependent], names[prerequisite]);
    }
}
