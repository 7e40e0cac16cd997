//! Full pipeline from a source directory into a filesystem store

use std::sync::Arc;

use iconforge_core::{Manifest, MANIFEST_KEY};
use iconforge_deploy::{
    DistributionEngine, FsStore, NoopEdgeCache, ObjectStore, Pipeline, RollbackManager,
    RollbackOutcome, HISTORY_INDEX_KEY,
};
use iconforge_test_utils::{icon, test_config, two_section_tree, write_tree};

fn setup() -> (tempfile::TempDir, tempfile::TempDir, Pipeline, Arc<DistributionEngine>, Arc<FsStore>) {
    let sources = tempfile::tempdir().unwrap();
    let bucket = tempfile::tempdir().unwrap();
    write_tree(sources.path(), &two_section_tree());

    let config = test_config().with_source_dir(sources.path());
    let store = Arc::new(FsStore::new(bucket.path()));
    let engine = Arc::new(DistributionEngine::new(
        store.clone(),
        Arc::new(NoopEdgeCache),
        &config,
    ));
    (sources, bucket, Pipeline::new(config), engine, store)
}

#[tokio::test]
async fn deploys_from_disk_into_bucket_layout() {
    let (_sources, bucket, pipeline, engine, store) = setup();

    let record = pipeline.deploy(&engine).await.unwrap();
    assert!(record.is_committed());
    assert_eq!(record.uploaded.len(), 6);

    let raw = std::fs::read(bucket.path().join(MANIFEST_KEY)).unwrap();
    let manifest = Manifest::from_json(&raw).unwrap();
    assert_eq!(
        manifest.sections.keys().collect::<Vec<_>>(),
        vec!["core", "social"]
    );
    for file in manifest.file_names() {
        assert!(bucket.path().join(file).is_file());
        assert!(bucket.path().join(format!("{file}.gz")).is_file());
        assert!(bucket.path().join(format!("{file}.br")).is_file());
    }

    let head = store.head(MANIFEST_KEY).await.unwrap().unwrap();
    assert_eq!(head.options.cache_control, "public, max-age=300");
    assert!(store.get(HISTORY_INDEX_KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn edit_on_disk_then_roll_back() {
    let (sources, _bucket, pipeline, engine, _store) = setup();
    pipeline.deploy(&engine).await.unwrap();
    let a = engine.current_manifest().await.unwrap().unwrap();

    write_tree(
        sources.path(),
        &[icon("social", "heart")].into_iter().collect(),
    );
    let record = pipeline.deploy(&engine).await.unwrap();
    assert_eq!(record.unchanged_sections, vec!["core".to_string()]);
    let b = engine.current_manifest().await.unwrap().unwrap();
    assert_ne!(a.entry("social"), b.entry("social"));
    assert_eq!(a.entry("core"), b.entry("core"));

    let outcome = RollbackManager::new(engine.clone())
        .rollback(a.version)
        .await
        .unwrap();
    assert!(matches!(outcome, RollbackOutcome::RolledBack(_)));
    assert_eq!(engine.current_manifest().await.unwrap().unwrap(), a);
}
