mod helpers;

use engram::config::EvictionConfig;
use engram::memory::maintenance::{effective_config, evict, EvictionOverride};
use engram::memory::types::Session;
use engram::state::scope;
use helpers::{aged_obs, days_ago, make_session, make_summary, obs_ids, put_obs, put_session, test_kv};

#[tokio::test]
async fn stale_unsummarized_sessions_are_evicted() {
    let kv = test_kv();
    put_session(&kv, &make_session("stale", "proj", days_ago(45))).await;
    put_session(&kv, &make_session("summarized", "proj", days_ago(45))).await;
    put_session(&kv, &make_session("fresh", "proj", days_ago(2))).await;
    kv.set(scope::SUMMARIES, "summarized", make_summary("summarized"))
        .await
        .unwrap();

    let stats = evict(&kv, &EvictionConfig::default(), false).await.unwrap();
    assert_eq!(stats.stale_sessions, 1);

    let sessions: Vec<Session> = kv.list(scope::SESSIONS).await.unwrap();
    let mut ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["fresh", "summarized"]);
}

#[tokio::test]
async fn old_low_importance_observations_are_evicted() {
    let kv = test_kv();
    put_session(&kv, &make_session("s1", "proj", days_ago(1))).await;
    put_obs(&kv, &aged_obs("old-low", "s1", 120, 2)).await;
    put_obs(&kv, &aged_obs("old-keep", "s1", 120, 3)).await;
    put_obs(&kv, &aged_obs("young-low", "s1", 5, 1)).await;

    let stats = evict(&kv, &EvictionConfig::default(), false).await.unwrap();
    assert_eq!(stats.low_importance_obs, 1);

    let mut remaining = obs_ids(&kv, "s1").await;
    remaining.sort();
    assert_eq!(remaining, vec!["old-keep", "young-low"]);
}

#[tokio::test]
async fn project_cap_evicts_least_important_oldest_first() {
    let kv = test_kv();
    put_session(&kv, &make_session("a", "proj", days_ago(1))).await;
    put_session(&kv, &make_session("b", "proj", days_ago(1))).await;
    put_session(&kv, &make_session("other", "elsewhere", days_ago(1))).await;

    put_obs(&kv, &aged_obs("a-imp9", "a", 3, 9)).await;
    put_obs(&kv, &aged_obs("a-imp4-old", "a", 4, 4)).await;
    put_obs(&kv, &aged_obs("b-imp4-new", "b", 1, 4)).await;
    put_obs(&kv, &aged_obs("b-imp7", "b", 2, 7)).await;
    put_obs(&kv, &aged_obs("o1", "other", 1, 1)).await;
    put_obs(&kv, &aged_obs("o2", "other", 1, 1)).await;

    let defaults = EvictionConfig {
        max_observations_per_project: 2,
        ..EvictionConfig::default()
    };
    let stats = evict(&kv, &defaults, false).await.unwrap();
    assert_eq!(stats.cap_evictions, 2);

    assert_eq!(obs_ids(&kv, "a").await, vec!["a-imp9"]);
    assert_eq!(obs_ids(&kv, "b").await, vec!["b-imp7"]);
    // A project at the cap is untouched
    assert_eq!(obs_ids(&kv, "other").await.len(), 2);
}

#[tokio::test]
async fn dry_run_counts_without_deleting() {
    let kv = test_kv();
    put_session(&kv, &make_session("stale", "proj", days_ago(60))).await;
    put_obs(&kv, &aged_obs("old-low", "stale", 120, 1)).await;

    let stats = evict(&kv, &EvictionConfig::default(), true).await.unwrap();
    assert!(stats.dry_run);
    assert_eq!(stats.stale_sessions, 1);
    assert_eq!(stats.low_importance_obs, 1);

    let sessions: Vec<Session> = kv.list(scope::SESSIONS).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(obs_ids(&kv, "stale").await, vec!["old-low"]);
}

#[tokio::test]
async fn stored_override_wins_over_defaults() {
    let kv = test_kv();
    kv.set(
        scope::CONFIG,
        scope::EVICTION_KEY,
        EvictionOverride {
            stale_session_days: Some(7),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    put_session(&kv, &make_session("week-old", "proj", days_ago(10))).await;

    let cfg = effective_config(&kv, &EvictionConfig::default()).await;
    assert_eq!(cfg.stale_session_days, 7);
    assert_eq!(cfg.low_importance_threshold, 3);

    let stats = evict(&kv, &EvictionConfig::default(), false).await.unwrap();
    assert_eq!(stats.stale_sessions, 1);
}

#[tokio::test]
async fn malformed_override_falls_back_to_defaults() {
    let kv = test_kv();
    kv.set(
        scope::CONFIG,
        scope::EVICTION_KEY,
        serde_json::json!({"staleSessionDays": "soon"}),
    )
    .await
    .unwrap();

    let cfg = effective_config(&kv, &EvictionConfig::default()).await;
    assert_eq!(cfg, EvictionConfig::default());
}

#[tokio::test]
async fn oversized_override_evicts_nothing_by_age() {
    let kv = test_kv();
    kv.set(
        scope::CONFIG,
        scope::EVICTION_KEY,
        EvictionOverride {
            stale_session_days: Some(200_000_000),
            low_importance_max_days: Some(i64::MAX),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    put_session(&kv, &make_session("ancient", "proj", days_ago(3650))).await;
    put_obs(&kv, &aged_obs("old-low", "ancient", 3650, 1)).await;

    let stats = evict(&kv, &EvictionConfig::default(), false).await.unwrap();
    assert_eq!(stats.stale_sessions, 0);
    assert_eq!(stats.low_importance_obs, 0);
    assert_eq!(obs_ids(&kv, "ancient").await, vec!["old-low"]);
}
