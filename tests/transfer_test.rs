mod helpers;

use std::sync::Arc;

use engram::config::EngramConfig;
use engram::engine::Engine;
use engram::error::WriteError;
use engram::memory::relations::relate;
use engram::memory::transfer::{export, import, ImportStrategy};
use engram::memory::types::{MemoryRelation, RelationType, Session};
use engram::state::{scope, MemoryStateStore, StateKv};
use helpers::{
    aged_obs, days_ago, get_memory, make_memory, make_obs, make_session, make_summary, obs_ids,
    put_memory, put_obs, put_session, test_kv,
};

async fn populated() -> StateKv {
    let kv = test_kv();
    put_session(&kv, &make_session("s1", "proj", days_ago(1))).await;
    put_obs(&kv, &aged_obs("o1", "s1", 1, 6)).await;
    put_obs(&kv, &aged_obs("o2", "s1", 1, 3)).await;
    put_memory(&kv, &make_memory("m1", "prefer tracing over println")).await;
    put_memory(&kv, &make_memory("m2", "errors use thiserror")).await;
    kv.set(scope::SUMMARIES, "s1", make_summary("s1")).await.unwrap();
    relate(&kv, "m1", "m2", RelationType::Related, Some(0.7))
        .await
        .unwrap();
    kv
}

#[tokio::test]
async fn export_then_import_into_empty_store() {
    let source = populated().await;
    let data = export(&source).await.unwrap();
    assert_eq!(data.sessions.len(), 1);
    assert_eq!(data.observations["s1"].len(), 2);
    assert_eq!(data.memories.len(), 2);
    assert_eq!(data.relations.len(), 1);

    // Through JSON, as the CLI does
    let json = serde_json::to_string(&data).unwrap();
    let data = serde_json::from_str(&json).unwrap();

    let target = test_kv();
    let stats = import(&target, &data, ImportStrategy::Merge).await.unwrap();
    assert_eq!(stats.sessions, 1);
    assert_eq!(stats.observations, 2);
    assert_eq!(stats.memories, 2);
    assert_eq!(stats.summaries, 1);
    assert_eq!(stats.relations, 1);
    assert_eq!(stats.skipped, 0);

    let mut ids = obs_ids(&target, "s1").await;
    ids.sort();
    assert_eq!(ids, vec!["o1", "o2"]);
    assert_eq!(get_memory(&target, "m1").await, get_memory(&source, "m1").await);
}

#[tokio::test]
async fn reimporting_does_not_duplicate_relations() {
    let kv = populated().await;
    let data = export(&kv).await.unwrap();

    let stats = import(&kv, &data, ImportStrategy::Merge).await.unwrap();
    assert_eq!(stats.relations, 0);
    assert_eq!(stats.skipped, 1);

    let relations: Vec<MemoryRelation> = kv.list(scope::RELATIONS).await.unwrap();
    assert_eq!(relations.len(), 1);
}

#[tokio::test]
async fn skip_keeps_existing_records() {
    let kv = populated().await;
    let mut data = export(&kv).await.unwrap();
    data.memories[0].content = "changed in the export".into();
    let changed_id = data.memories[0].id.clone();

    let stats = import(&kv, &data, ImportStrategy::Skip).await.unwrap();
    assert_eq!(stats.memories, 0);
    assert_eq!(stats.sessions, 0);
    assert_eq!(stats.observations, 0);
    assert!(stats.skipped >= 6);
    assert_ne!(
        get_memory(&kv, &changed_id).await.unwrap().content,
        "changed in the export"
    );

    let merged = import(&kv, &data, ImportStrategy::Merge).await.unwrap();
    assert_eq!(merged.memories, 2);
    assert_eq!(
        get_memory(&kv, &changed_id).await.unwrap().content,
        "changed in the export"
    );
}

#[tokio::test]
async fn replace_clears_records_not_in_the_export() {
    let source = populated().await;
    let data = export(&source).await.unwrap();

    let target = test_kv();
    put_session(&target, &make_session("local", "proj", days_ago(1))).await;
    put_obs(&target, &aged_obs("local-obs", "local", 1, 5)).await;
    put_memory(&target, &make_memory("local-mem", "only here")).await;

    import(&target, &data, ImportStrategy::Replace).await.unwrap();

    let sessions: Vec<Session> = target.list(scope::SESSIONS).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, "s1");
    assert!(obs_ids(&target, "local").await.is_empty());
    assert!(get_memory(&target, "local-mem").await.is_none());
    assert!(get_memory(&target, "m1").await.is_some());
}

#[tokio::test]
async fn rejected_payload_leaves_store_untouched() {
    let kv = populated().await;
    let mut data = export(&kv).await.unwrap();
    data.version = "9.9.9".into();
    data.memories.push(make_memory("new", "should never land"));

    let err = import(&kv, &data, ImportStrategy::Replace).await.unwrap_err();
    assert!(matches!(err, WriteError::Invalid(_)));

    // Replace would have cleared everything had validation run late
    assert!(get_memory(&kv, "m1").await.is_some());
    assert!(get_memory(&kv, "new").await.is_none());
    assert_eq!(obs_ids(&kv, "s1").await.len(), 2);
}

#[tokio::test]
async fn engine_import_makes_observations_searchable() {
    let source = test_kv();
    put_session(&source, &make_session("s1", "proj", days_ago(1))).await;
    put_obs(
        &source,
        &make_obs("o1", "s1", "Migrate to tokio", "Replaced the async-std runtime with tokio"),
    )
    .await;
    let data = export(&source).await.unwrap();

    let engine = Engine::open(Arc::new(MemoryStateStore::new()), None, &EngramConfig::default())
        .await
        .unwrap();
    assert!(engine.search("tokio", None).await.is_empty());

    engine.import(&data, ImportStrategy::Merge).await.unwrap();
    let results = engine.search("tokio", None).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].observation.id, "o1");
    engine.shutdown().await.unwrap();
}
