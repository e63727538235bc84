// search-core/tests/coordinator.rs
//! 协调器端到端场景：本地分页、失败、取消、跨实例读取与接手

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use search_core::{
    CacheControlDirective, CoordinatorConfig, MemorySearchCache, PersistentSearchCache,
    RequestContext, SearchError, SearchRecordStore, SearchResultStore, SearchResults, SearchStatus,
};
use tempfile::TempDir;

async fn register(
    coordinator: &search_core::SearchCoordinator<Patient>,
    query: &search_core::SearchQuery,
) -> SearchResults<Patient> {
    coordinator
        .register_search(
            query,
            RESOURCE_TYPE,
            &CacheControlDirective::default(),
            &RequestContext::default(),
        )
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_async_search_large_result_set() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::from_millis(1)));
    let cache = Arc::new(MemorySearchCache::new());
    let coordinator = coordinator(test_config(), engine.clone(), cache.clone());

    let results = register(&coordinator, &query()).await;
    assert!(results.uuid().is_some());

    let patients = results.get_resources(0, 100_000).await.unwrap();
    assert_eq!(patients.len(), 790);
    assert_eq!(patients[0].id.as_i64(), 10);
    assert_eq!(patients[789].id.as_i64(), 799);
    assert_eq!(patient_ids(&patients), (10..800).collect::<Vec<_>>());
    assert_eq!(results.size().await.unwrap(), Some(790));

    let record = cache.fetch_by_uuid(results.uuid().unwrap()).unwrap().unwrap();
    assert_eq!(record.status, SearchStatus::Finished);
    assert_eq!(record.total_count, Some(790));
    assert_eq!(engine.create_calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_first_page_while_still_loading() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::from_millis(5)));
    let cache = Arc::new(MemorySearchCache::new());
    let coordinator = coordinator(test_config(), engine.clone(), cache);

    let results = register(&coordinator, &query()).await;
    let first = results.get_resources(0, 30).await.unwrap();
    assert_eq!(patient_ids(&first), (10..40).collect::<Vec<_>>());
    assert_eq!(results.size().await.unwrap(), None);

    // 第二个句柄只凭 uuid 读取同一个搜索
    let uuid = results.uuid().unwrap().to_string();
    let second = coordinator.open(&uuid, &RequestContext::default());
    let page = second.get_resources(10, 20).await.unwrap();
    assert_eq!(patient_ids(&page), (20..30).collect::<Vec<_>>());

    coordinator.cancel_all_active_searches().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_small_result_set_size_known_immediately() {
    let engine = Arc::new(TestEngine::sequence(100, Duration::ZERO));
    let cache = Arc::new(MemorySearchCache::new());
    let config = CoordinatorConfig {
        batch_size: 500,
        ..test_config()
    };
    let coordinator = coordinator(config, engine, cache);

    let results = register(&coordinator, &query()).await;
    assert!(results.uuid().is_some());
    assert_eq!(results.size().await.unwrap(), Some(90));

    let patients = results.get_resources(0, 30).await.unwrap();
    assert_eq!(patient_ids(&patients), (10..40).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_synchronous_search() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::ZERO));
    let cache = Arc::new(MemorySearchCache::new());
    let coordinator = coordinator(test_config(), engine.clone(), cache.clone());

    let query = query().with_load_synchronous(true);
    let results = register(&coordinator, &query).await;
    assert!(results.uuid().is_none());
    assert_eq!(results.size().await.unwrap(), Some(790));

    let patients = results.get_resources(0, 10_000).await.unwrap();
    assert_eq!(patients.len(), 790);
    assert_eq!(patients[0].id.as_i64(), 10);
    assert_eq!(engine.closes(), 1);
    assert!(cache.list().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_synchronous_search_up_to() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::ZERO));
    let cache = Arc::new(MemorySearchCache::new());
    let coordinator = coordinator(test_config(), engine.clone(), cache);

    let query = query().with_load_synchronous_up_to(100);
    let results = register(&coordinator, &query).await;
    assert!(results.uuid().is_none());
    assert_eq!(results.size().await.unwrap(), Some(100));
    assert_eq!(engine.loaded(), ids(10..110));

    let patients = results.get_resources(0, 100).await.unwrap();
    assert_eq!(patient_ids(&patients), (10..110).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_store_runs_synchronously() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::ZERO));
    let cache = Arc::new(MemorySearchCache::new());
    let coordinator = coordinator(test_config(), engine, cache.clone());

    let results = coordinator
        .register_search(
            &query(),
            RESOURCE_TYPE,
            &CacheControlDirective::no_store(Some(25)),
            &RequestContext::default(),
        )
        .await
        .unwrap();
    assert!(results.uuid().is_none());
    assert_eq!(results.size().await.unwrap(), Some(25));
    assert!(cache.list().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_synchronous_failure_propagates() {
    let engine = Arc::new(TestEngine::failing_after(800, 5));
    let cache = Arc::new(MemorySearchCache::new());
    let coordinator = coordinator(test_config(), engine, cache);

    let err = coordinator
        .register_search(
            &query().with_load_synchronous(true),
            RESOURCE_TYPE,
            &CacheControlDirective::default(),
            &RequestContext::default(),
        )
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SearchError::Iteration(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failure_during_search() {
    let engine = Arc::new(TestEngine::failing_after(800, 25));
    let cache = Arc::new(MemorySearchCache::new());
    let coordinator = coordinator(test_config(), engine.clone(), cache.clone());

    let results = register(&coordinator, &query()).await;
    let err = results.get_resources(0, 100).await.err().unwrap();
    assert!(matches!(err, SearchError::SearchFailed(_)));
    let message = err.to_string();
    assert!(message.contains("FAILED"), "{message}");
    assert!(message.contains("common/mod.rs"), "{message}");

    let record = cache.fetch_by_uuid(results.uuid().unwrap()).unwrap().unwrap();
    assert_eq!(record.status, SearchStatus::Failed);
    assert_eq!(record.num_found, 20);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_active_searches() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::from_millis(10)));
    let cache = Arc::new(MemorySearchCache::new());
    let coordinator = coordinator(test_config(), engine.clone(), cache.clone());

    let results = register(&coordinator, &query()).await;
    let first = results.get_resources(0, 10).await.unwrap();
    assert_eq!(first.len(), 10);

    coordinator.cancel_all_active_searches().await;
    assert_eq!(engine.closes(), 1);

    let err = results.get_resources(10, 20).await.err().unwrap();
    assert!(err.is_aborted(), "{err}");
    let message = err.to_string();
    assert!(message.contains("Abort has been requested"), "{message}");
    assert!(message.contains("src/task.rs"), "{message}");

    let record = cache.fetch_by_uuid(results.uuid().unwrap()).unwrap().unwrap();
    assert_eq!(record.status, SearchStatus::Failed);
    assert!(engine.returned.load(std::sync::atomic::Ordering::SeqCst) < 790);
    assert_eq!(engine.closes(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_load_from_different_coordinator() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::ZERO));
    let cache = Arc::new(MemorySearchCache::new());
    let reader = coordinator(test_config(), engine.clone(), cache.clone());

    let record = loading_record(&*cache, "remote-1");
    let writer = cache.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        writer.store_results("remote-1", &[], &id_sequence(800)).unwrap();
        let mut finished = record;
        finished.record_progress(790).unwrap();
        finished.finish().unwrap();
        writer.save(&finished).unwrap();
    });

    let results = reader.open("remote-1", &RequestContext::default());
    let page = results.get_resources(10, 20).await.unwrap();
    assert_eq!(patient_ids(&page), (20..30).collect::<Vec<_>>());
    assert_eq!(results.size().await.unwrap(), Some(790));
    // 只读取，不重新执行查询
    assert_eq!(engine.create_calls(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_record_deleted_while_loading() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::from_millis(2)));
    let cache = Arc::new(FaultyCache::default());
    let coordinator = coordinator(test_config(), engine, cache.clone());

    let results = register(&coordinator, &query()).await;
    let uuid = results.uuid().unwrap().to_string();
    cache.lose_records();

    let err = results.get_resources(0, 20).await.err().unwrap();
    assert!(err.is_gone());
    assert_eq!(
        err.to_string(),
        format!("Search ID \"{uuid}\" does not exist and may have expired")
    );

    let err = coordinator
        .open("1234-5678", &RequestContext::default())
        .get_resources(0, 10)
        .await
        .err()
        .unwrap();
    assert_eq!(
        err.to_string(),
        "Search ID \"1234-5678\" does not exist and may have expired"
    );

    coordinator.cancel_all_active_searches().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_search_times_out() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::ZERO));
    let cache = Arc::new(MemorySearchCache::new());
    let config = CoordinatorConfig {
        max_wait_for_results_ms: 300,
        ..test_config()
    };
    let reader = coordinator(config, engine, cache.clone());
    loading_record(&*cache, "stuck");

    let err = reader
        .open("stuck", &RequestContext::default())
        .get_resources(0, 10)
        .await
        .err()
        .unwrap();
    assert!(err.is_timeout());
    assert!(err.to_string().contains("Request timed out"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_result_entry_is_gone() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::ZERO));
    let cache = Arc::new(FaultyCache::default());
    let reader = coordinator(test_config(), engine, cache.clone());

    let mut record = loading_record(&*cache, "finished-1");
    record.record_progress(100).unwrap();
    record.finish().unwrap();
    cache.save(&record).unwrap();
    cache.store_results("finished-1", &[], &ids(0..100)).unwrap();
    cache.lose_results();

    let err = reader
        .open("finished-1", &RequestContext::default())
        .get_resources(0, 10)
        .await
        .err()
        .unwrap();
    assert!(err.is_gone(), "{err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_prior_results_on_takeover_is_gone() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::ZERO));
    let cache = Arc::new(FaultyCache::default());
    let reader = coordinator(test_config(), engine.clone(), cache.clone());

    let mut record = pass_complete_record("takeover-1");
    record.num_found = 5;
    cache.save(&record).unwrap();
    cache.lose_results();

    let err = reader
        .open("takeover-1", &RequestContext::default())
        .get_resources(0, 10)
        .await
        .err()
        .unwrap();
    assert!(err.is_gone(), "{err}");
    assert_eq!(engine.create_calls(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_takeover_resumes_after_cached_prefix() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::ZERO));
    let cache = Arc::new(MemorySearchCache::new());
    let reader = coordinator(test_config(), engine.clone(), cache.clone());

    let mut record = pass_complete_record("takeover-2");
    record.num_found = 30;
    cache.save(&record).unwrap();
    cache.store_results("takeover-2", &[], &ids(10..40)).unwrap();

    let results = reader.open("takeover-2", &RequestContext::default());
    let page = results.get_resources(0, 100).await.unwrap();
    assert_eq!(patient_ids(&page), (10..110).collect::<Vec<_>>());

    let all = results.get_resources(0, 10_000).await.unwrap();
    assert_eq!(all.len(), 790);
    assert_eq!(cache.fetch_all_result_ids("takeover-2").unwrap(), Some(id_sequence(800)));
    assert_eq!(engine.create_calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_readers_claim_once() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::ZERO));
    let cache = Arc::new(MemorySearchCache::new());
    let first = coordinator(test_config(), engine.clone(), cache.clone());
    let second = coordinator(test_config(), engine.clone(), cache.clone());
    cache.save(&pass_complete_record("shared")).unwrap();
    cache.store_results("shared", &[], &[]).unwrap();

    let ctx = RequestContext::default();
    let (a, b) = tokio::join!(
        first.get_resources("shared", 0, 1000, &ctx),
        second.get_resources("shared", 100, 200, &ctx),
    );
    assert_eq!(a.unwrap(), id_sequence(800));
    assert_eq!(b.unwrap(), ids(110..210));
    assert_eq!(engine.create_calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_num_found_tracks_cached_results() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::from_millis(1)));
    let cache = Arc::new(MemorySearchCache::new());
    let coordinator = coordinator(test_config(), engine, cache.clone());

    let results = register(&coordinator, &query()).await;
    let uuid = results.uuid().unwrap().to_string();

    let mut last = 0;
    loop {
        let record = cache.fetch_by_uuid(&uuid).unwrap().unwrap();
        let cached = cache.fetch_all_result_ids(&uuid).unwrap().unwrap().len();
        assert!(record.num_found >= last);
        assert!(cached >= record.num_found);
        last = record.num_found;
        if record.status.is_terminal() {
            assert_eq!(record.num_found, cached);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(last, 790);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reuse_recent_search() {
    let engine = Arc::new(TestEngine::sequence(100, Duration::ZERO));
    let cache = Arc::new(MemorySearchCache::new());
    let config = CoordinatorConfig {
        reuse_cached_results_for_ms: Some(60_000),
        ..test_config()
    };
    let coordinator = coordinator(config, engine.clone(), cache);

    let first = register(&coordinator, &query()).await;
    let second = register(&coordinator, &query()).await;
    assert_eq!(first.uuid(), second.uuid());
    assert_eq!(engine.create_calls(), 1);

    let fresh = coordinator
        .register_search(
            &query(),
            RESOURCE_TYPE,
            &CacheControlDirective::no_cache(),
            &RequestContext::default(),
        )
        .await
        .unwrap();
    assert_ne!(fresh.uuid(), first.uuid());
    assert_eq!(engine.create_calls(), 2);

    let other = register(&coordinator, &query().add("family", "SMITH")).await;
    assert_ne!(other.uuid(), first.uuid());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_capped_search_is_not_reused_without_cap() {
    let engine = Arc::new(TestEngine::sequence(800, Duration::ZERO));
    let cache = Arc::new(MemorySearchCache::new());
    let config = CoordinatorConfig {
        synchronous_threshold: 50,
        reuse_cached_results_for_ms: Some(60_000),
        ..test_config()
    };
    let coordinator = coordinator(config, engine.clone(), cache);

    let capped = register(&coordinator, &query().with_load_synchronous_up_to(60)).await;
    assert!(capped.uuid().is_some());
    assert_eq!(capped.get_resources(0, 1000).await.unwrap().len(), 60);

    let uncapped = register(&coordinator, &query()).await;
    assert_ne!(uncapped.uuid(), capped.uuid());
    assert_eq!(uncapped.get_resources(0, 1000).await.unwrap().len(), 790);
    assert_eq!(uncapped.size().await.unwrap(), Some(790));
    assert_eq!(engine.create_calls(), 2);

    let again = register(&coordinator, &query().with_load_synchronous_up_to(60)).await;
    assert_eq!(again.uuid(), capped.uuid());
    assert_eq!(engine.create_calls(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_persistent_cache_shared_between_instances() {
    let dir = TempDir::new().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let engine = Arc::new(TestEngine::sequence(800, Duration::ZERO));

    let writer_cache = Arc::new(PersistentSearchCache::from_db(db.clone()).unwrap());
    let writer = coordinator(test_config(), engine.clone(), writer_cache);
    let results = register(&writer, &query()).await;
    let uuid = results.uuid().unwrap().to_string();
    assert_eq!(results.get_resources(0, 10_000).await.unwrap().len(), 790);

    let reader_cache = Arc::new(PersistentSearchCache::from_db(db).unwrap());
    let reader = coordinator(test_config(), engine.clone(), reader_cache);
    let handle = reader.open(&uuid, &RequestContext::default());
    let page = handle.get_resources(100, 110).await.unwrap();
    assert_eq!(patient_ids(&page), (110..120).collect::<Vec<_>>());
    assert_eq!(handle.get_resources(100, 110).await.unwrap(), page);
    assert_eq!(handle.size().await.unwrap(), Some(790));
    assert!(handle.get_resources(790, 800).await.unwrap().is_empty());
    assert_eq!(engine.create_calls(), 1);
}
