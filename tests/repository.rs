//! Persistence round trips through the JSON file repository.

mod common;

use std::collections::HashMap;

use artclust::{
    ClusterRepository, ClusterStore, ClusteringOrchestrator, Embedding, ItemId,
    JsonFileRepository, RepositoryError,
};
use common::{at, config, item, topical_feed};
use tempfile::TempDir;

#[tokio::test]
async fn missing_file_loads_as_empty() {
    let dir = TempDir::new().unwrap();
    let repo = JsonFileRepository::new(dir.path().join("clusters.json"));
    assert!(repo.load().await.unwrap().is_none());
}

#[tokio::test]
async fn saved_snapshot_loads_back_unchanged() {
    let dir = TempDir::new().unwrap();
    let repo = JsonFileRepository::new(dir.path().join("nested/state/clusters.json"));

    let cfg = config(8);
    let items = topical_feed(1, cfg.dimension, 3, 6, 2);
    let orchestrator = ClusteringOrchestrator::new(cfg.clone()).unwrap();
    let out = orchestrator
        .run(&ClusterStore::from_config(&cfg), &items, at(4))
        .unwrap();
    let mut store = out.store;
    let first = store.all_active().next().unwrap().id().clone();
    store.set_name(&first, Some("Topic zero".into())).unwrap();

    repo.save(&store.snapshot()).await.unwrap();
    let loaded = repo.load().await.unwrap().unwrap();

    assert_eq!(loaded, store.snapshot());
    assert!(!dir.path().join("nested/state/clusters.json.tmp").exists());
}

#[tokio::test]
async fn overwrite_replaces_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clusters.json");
    let repo = JsonFileRepository::new(&path);

    let cfg = config(2);
    let mut store = ClusterStore::from_config(&cfg);
    repo.save(&store.snapshot()).await.unwrap();

    let v = Embedding::new(vec![1.0, 0.0]).unwrap();
    store
        .create_cluster(&[(ItemId::new("a"), &v), (ItemId::new("b"), &v)], at(1))
        .unwrap();
    repo.save(&store.snapshot()).await.unwrap();

    let loaded = repo.load().await.unwrap().unwrap();
    assert_eq!(loaded.clusters.len(), 1);
    assert_eq!(
        loaded.clusters[0].article_ids,
        vec![ItemId::new("a"), ItemId::new("b")]
    );
}

#[tokio::test]
async fn unknown_version_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clusters.json");
    tokio::fs::write(&path, br#"{"version":99,"dimension":2,"clusters":[]}"#)
        .await
        .unwrap();

    let err = JsonFileRepository::new(&path).load().await.unwrap_err();
    assert!(matches!(err, RepositoryError::UnsupportedVersion { found: 99 }));
}

#[tokio::test]
async fn corrupt_file_is_a_json_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clusters.json");
    tokio::fs::write(&path, b"{ not json").await.unwrap();

    let err = JsonFileRepository::new(&path).load().await.unwrap_err();
    assert!(matches!(err, RepositoryError::Json(_)));
}

#[tokio::test]
async fn restored_store_continues_clustering() {
    let dir = TempDir::new().unwrap();
    let repo = JsonFileRepository::new(dir.path().join("clusters.json"));
    let cfg = config(2);
    let orchestrator = ClusteringOrchestrator::new(cfg.clone()).unwrap();

    let day_one = vec![item("a", &[1.0, 0.0]), item("b", &[0.99, 0.05])];
    let out = orchestrator
        .run(&ClusterStore::from_config(&cfg), &day_one, at(1))
        .unwrap();
    repo.save(&out.store.snapshot()).await.unwrap();

    let mut day_two = day_one.clone();
    day_two.push(item("c", &[0.98, 0.1]));
    let embeddings: HashMap<ItemId, Embedding> = day_two
        .iter()
        .filter_map(|i| i.embedding.clone().map(|e| (i.id.clone(), e)))
        .collect();

    let snapshot = repo.load().await.unwrap().unwrap();
    let restored = ClusterStore::restore(&cfg, &snapshot, &embeddings).unwrap();
    assert_eq!(restored.clustered_item_count(), 2);

    let next = orchestrator.run(&restored, &day_two, at(2)).unwrap();
    assert_eq!(next.store.active_count(), 1);
    assert_eq!(next.diagnostics.assigned_count(), 1);
    assert_eq!(
        next.store.cluster_of(&ItemId::new("c")),
        out.store.cluster_of(&ItemId::new("a"))
    );
}

#[tokio::test]
async fn restore_falls_back_to_persisted_centroid() {
    let cfg = config(2);
    let orchestrator = ClusteringOrchestrator::new(cfg.clone()).unwrap();
    let items = vec![item("a", &[1.0, 0.0]), item("b", &[0.1, 1.0])];
    let cfg_wide = artclust::ClusteringConfig {
        discovery_epsilon: 1.0,
        ..cfg.clone()
    };
    let wide = ClusteringOrchestrator::new(cfg_wide.clone()).unwrap();
    let out = wide
        .run(&ClusterStore::from_config(&cfg_wide), &items, at(1))
        .unwrap();
    let snapshot = out.store.snapshot();
    let persisted = snapshot.clusters[0].centroid.clone().unwrap();

    // No member embeddings on hand: the stored centroid is used as is.
    let restored = ClusterStore::restore(&cfg, &snapshot, &HashMap::new()).unwrap();
    let cluster = restored.all_active().next().unwrap();
    assert_eq!(cluster.centroid(), &persisted);

    let arriving = vec![item("p", &[0.7, 0.7])];
    let next = orchestrator.run(&restored, &arriving, at(2)).unwrap();
    assert_eq!(next.diagnostics.assigned_count(), 1);
}
