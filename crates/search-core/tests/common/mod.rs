// search-core/tests/common/mod.rs
//! 集成测试共用的查询引擎、迭代器和缓存包装
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use search_core::{
    CoordinatorConfig, EngineRegistry, IdResult, IdentifierIterator, IterationError,
    MemorySearchCache, PageRange, QueryEngine, RequestContext, ResourceId, Result, SearchCoordinator,
    SearchQuery, SearchRecord, SearchRecordStore, SearchResultStore, SearchStatus,
};

pub const RESOURCE_TYPE: &str = "Patient";

#[derive(Debug, Clone, PartialEq)]
pub struct Patient {
    pub id: ResourceId,
}

/// 与底层存储一致：前 10 个标识符被过滤掉，产出 `10..count`
pub fn id_sequence(count: i64) -> Vec<ResourceId> {
    (10..count).map(ResourceId).collect()
}

pub fn ids(range: std::ops::Range<i64>) -> Vec<ResourceId> {
    range.map(ResourceId).collect()
}

pub fn patient_ids(patients: &[Patient]) -> Vec<i64> {
    patients.iter().map(|p| p.id.as_i64()).collect()
}

/// 每个元素之间有固定延迟的迭代器
pub struct SlowIterator {
    ids: std::vec::IntoIter<ResourceId>,
    delay: Duration,
    skipped: usize,
    returned: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl Iterator for SlowIterator {
    type Item = IdResult;

    fn next(&mut self) -> Option<IdResult> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let id = self.ids.next()?;
        self.returned.fetch_add(1, Ordering::SeqCst);
        Some(Ok(id))
    }
}

impl IdentifierIterator for SlowIterator {
    fn skipped_count(&self) -> usize {
        self.skipped
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// 产出 `n` 个标识符后报错
pub struct FailAfterNIterator {
    inner: SlowIterator,
    remaining: usize,
}

impl Iterator for FailAfterNIterator {
    type Item = IdResult;

    fn next(&mut self) -> Option<IdResult> {
        if self.remaining == 0 {
            return Some(Err(IterationError::new("FAILED")));
        }
        self.remaining -= 1;
        self.inner.next()
    }
}

impl IdentifierIterator for FailAfterNIterator {
    fn close(&mut self) {
        self.inner.close();
    }
}

#[derive(Clone, Copy)]
enum Source {
    Sequence,
    FailAfter(usize),
}

/// 测试用查询引擎：每次 `create_query` 都从头产出 `10..count`
pub struct TestEngine {
    count: i64,
    delay: Duration,
    source: Source,
    pub create_calls: AtomicUsize,
    pub returned: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub loaded: Mutex<Vec<ResourceId>>,
}

impl TestEngine {
    pub fn sequence(count: i64, delay: Duration) -> Self {
        Self {
            count,
            delay,
            source: Source::Sequence,
            create_calls: AtomicUsize::new(0),
            returned: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            loaded: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_after(count: i64, fail_after: usize) -> Self {
        Self {
            source: Source::FailAfter(fail_after),
            ..Self::sequence(count, Duration::ZERO)
        }
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn loaded(&self) -> Vec<ResourceId> {
        self.loaded.lock().clone()
    }

    fn slow_iterator(&self) -> SlowIterator {
        SlowIterator {
            ids: id_sequence(self.count).into_iter(),
            delay: self.delay,
            skipped: 10,
            returned: self.returned.clone(),
            closes: self.closes.clone(),
        }
    }
}

impl QueryEngine<Patient> for TestEngine {
    fn create_query(
        &self,
        _query: &SearchQuery,
        _ctx: &RequestContext,
    ) -> Result<Box<dyn IdentifierIterator>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let iterator: Box<dyn IdentifierIterator> = match self.source {
            Source::Sequence => Box::new(self.slow_iterator()),
            Source::FailAfter(n) => Box::new(FailAfterNIterator {
                inner: self.slow_iterator(),
                remaining: n,
            }),
        };
        Ok(iterator)
    }

    fn load_resources(&self, ids: &[ResourceId], _ctx: &RequestContext) -> Result<Vec<Patient>> {
        self.loaded.lock().extend_from_slice(ids);
        Ok(ids.iter().map(|id| Patient { id: *id }).collect())
    }
}

/// 小批量、短超时、关闭复用的测试配置
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        batch_size: 10,
        initial_sync_wait_ms: 1000,
        max_wait_for_results_ms: 10_000,
        remote_poll_interval_ms: 20,
        reuse_cached_results_for_ms: None,
        ..Default::default()
    }
}

pub fn coordinator<C>(
    config: CoordinatorConfig,
    engine: Arc<TestEngine>,
    cache: Arc<C>,
) -> SearchCoordinator<Patient>
where
    C: SearchRecordStore + SearchResultStore + 'static,
{
    let engines = EngineRegistry::new().register(RESOURCE_TYPE, engine);
    SearchCoordinator::with_cache(config, engines, cache)
}

pub fn query() -> SearchQuery {
    SearchQuery::new().add("name", "ANAME")
}

/// 模拟另一个实例登记、但尚未开始执行的搜索
pub fn pass_complete_record(uuid: &str) -> SearchRecord {
    let mut record = SearchRecord::new(uuid, RESOURCE_TYPE, &query(), None).unwrap();
    record.transition(SearchStatus::PassComplete).unwrap();
    record
}

/// 模拟另一个实例正在执行的搜索
pub fn loading_record(cache: &dyn SearchRecordStore, uuid: &str) -> SearchRecord {
    let record = cache.save(&pass_complete_record(uuid)).unwrap();
    cache.try_to_mark_in_progress(&record).unwrap().unwrap()
}

/// 可以模拟缓存条目过期的包装
#[derive(Default)]
pub struct FaultyCache {
    pub inner: MemorySearchCache,
    pub records_missing: AtomicBool,
    pub results_missing: AtomicBool,
}

impl FaultyCache {
    pub fn lose_records(&self) {
        self.records_missing.store(true, Ordering::SeqCst);
    }

    pub fn lose_results(&self) {
        self.results_missing.store(true, Ordering::SeqCst);
    }

    fn records_lost(&self) -> bool {
        self.records_missing.load(Ordering::SeqCst)
    }

    fn results_lost(&self) -> bool {
        self.results_missing.load(Ordering::SeqCst)
    }
}

impl SearchRecordStore for FaultyCache {
    fn fetch_by_uuid(&self, uuid: &str) -> Result<Option<SearchRecord>> {
        if self.records_lost() {
            return Ok(None);
        }
        self.inner.fetch_by_uuid(uuid)
    }

    fn save(&self, record: &SearchRecord) -> Result<SearchRecord> {
        self.inner.save(record)
    }

    fn try_to_mark_in_progress(&self, record: &SearchRecord) -> Result<Option<SearchRecord>> {
        self.inner.try_to_mark_in_progress(record)
    }

    fn find_reusable(
        &self,
        resource_type: &str,
        query_string: &str,
        max_results: Option<usize>,
        created_after: DateTime<Utc>,
    ) -> Result<Option<SearchRecord>> {
        self.inner
            .find_reusable(resource_type, query_string, max_results, created_after)
    }

    fn list(&self) -> Result<Vec<SearchRecord>> {
        self.inner.list()
    }

    fn remove(&self, uuid: &str) -> Result<bool> {
        self.inner.remove(uuid)
    }
}

impl SearchResultStore for FaultyCache {
    fn store_results(&self, uuid: &str, prior: &[ResourceId], new: &[ResourceId]) -> Result<()> {
        self.inner.store_results(uuid, prior, new)
    }

    fn fetch_result_ids(&self, uuid: &str, page: PageRange) -> Result<Option<Vec<ResourceId>>> {
        if self.results_lost() {
            return Ok(None);
        }
        self.inner.fetch_result_ids(uuid, page)
    }

    fn fetch_all_result_ids(&self, uuid: &str) -> Result<Option<Vec<ResourceId>>> {
        if self.results_lost() {
            return Ok(None);
        }
        self.inner.fetch_all_result_ids(uuid)
    }

    fn remove_results(&self, uuid: &str) -> Result<()> {
        self.inner.remove_results(uuid)
    }
}
