use super::*;

#[test]
fn rotation_keeps_a_bounded_window() {
    let dir = tempfile::tempdir().unwrap();
    let graph = Graph::new(10, 1, 0);
    graph.add_transaction(&[1, 2], 1);

    let mut rotator = SnapshotRotator::new(dir.path(), "graph", 3);
    let mut paths = Vec::new();
    for _ in 0..5 {
        paths.push(rotator.save_graph(&graph).unwrap());
    }

    assert_eq!(rotator.saved_files().len(), 3);
    // the two oldest files are gone, the three newest remain
    assert!(!paths[0].exists());
    assert!(!paths[1].exists());
    for path in &paths[2..] {
        assert!(path.exists());
    }
}

#[test]
fn latest_snapshot_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let graph = Graph::new(10, 1, 0);
    graph.add_transaction(&[1, 2, 3], 2);

    let mut rotator = SnapshotRotator::new(dir.path(), "graph", 2);
    let path = rotator.save_graph(&graph).unwrap();
    let loaded = Graph::load(&path).unwrap();
    assert_eq!(loaded.vertex_weight(2), 2);
    assert_eq!(loaded.edge_weight(1, 3), 20);
}

#[test]
fn snapshot_loop_writes_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let graph = std::sync::Arc::new(Graph::new(10, 1, 0));
    graph.add_transaction(&[1], 1);

    let settings = SnapshotSettings {
        enabled: true,
        interval_ms: 50,
        window: 2,
        dir: dir.path().to_string_lossy().to_string(),
    };
    let snapshot_loop = start_graph_snapshots(graph.clone(), &settings);
    std::thread::sleep(Duration::from_millis(300));
    snapshot_loop.stop();
    // let an in-flight save finish before counting
    std::thread::sleep(Duration::from_millis(100));

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.path().extension().map(|x| x == "bin").unwrap_or(false))
        .collect();
    assert!(!files.is_empty(), "expected at least one snapshot file");
    assert!(files.len() <= 2, "window should bound the file count, got {}", files.len());
}
