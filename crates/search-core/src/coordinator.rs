// search-core/src/coordinator.rs
//! 搜索协调器
//!
//! 负责：
//! - 登记搜索，决定同步还是异步执行
//! - 维护本进程内正在运行的搜索任务（取消令牌 + 进度通道）
//! - 按 uuid 读取结果页：本地任务用 `watch` 通道等待，
//!   其他实例启动的搜索则轮询搜索记录缓存，必要时认领并接手
//! - 广播取消

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::{SearchRecordStore, SearchResultStore};
use crate::config::CoordinatorConfig;
use crate::engine::EngineRegistry;
use crate::error::{Result, SearchError};
use crate::iterator::ClosingIterator;
use crate::models::{CacheControlDirective, RequestContext, ResourceId, SearchQuery, to_page};
use crate::provider::{LoadedResults, PersistedResults, SearchResults};
use crate::record::{FailureKind, SearchRecord, SearchStatus};
use crate::task::{SearchTask, TaskState};

/// 执行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// 在调用方一次性读取并加载，最多 `cap` 条
    Synchronous { cap: usize },
    /// 后台任务写入缓存，`cap` 为结果上限
    Asynchronous { cap: Option<usize> },
}

struct ActiveSearch {
    cancel: CancellationToken,
    progress: watch::Receiver<TaskState>,
}

type ActiveSearches = Arc<Mutex<HashMap<String, ActiveSearch>>>;

struct Inner<R> {
    config: CoordinatorConfig,
    engines: EngineRegistry<R>,
    records: Arc<dyn SearchRecordStore>,
    results: Arc<dyn SearchResultStore>,
    active: ActiveSearches,
}

pub struct SearchCoordinator<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for SearchCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Send + 'static> SearchCoordinator<R> {
    pub fn new(
        config: CoordinatorConfig,
        engines: EngineRegistry<R>,
        records: Arc<dyn SearchRecordStore>,
        results: Arc<dyn SearchResultStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                engines,
                records,
                results,
                active: Arc::new(Mutex::new(HashMap::new())),
            }),
        }
    }

    /// 记录和结果放在同一个缓存里
    pub fn with_cache<C>(config: CoordinatorConfig, engines: EngineRegistry<R>, cache: Arc<C>) -> Self
    where
        C: SearchRecordStore + SearchResultStore + 'static,
    {
        Self::new(config, engines, cache.clone(), cache)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn execution_mode(
        &self,
        query: &SearchQuery,
        directive: &CacheControlDirective,
    ) -> ExecutionMode {
        let config = &self.inner.config;
        let upper_bound = config.synchronous_upper_bound;

        if query.load_synchronous {
            let cap = query
                .load_synchronous_up_to
                .map_or(upper_bound, |up_to| up_to.min(upper_bound));
            return ExecutionMode::Synchronous { cap };
        }
        if directive.no_store {
            // 取所有已指定上限中最小的一个
            let cap = [query.load_synchronous_up_to, directive.max_results]
                .into_iter()
                .flatten()
                .fold(upper_bound, usize::min);
            return ExecutionMode::Synchronous { cap };
        }
        match query.load_synchronous_up_to {
            Some(up_to) if up_to <= config.synchronous_threshold => {
                ExecutionMode::Synchronous { cap: up_to }
            }
            cap => ExecutionMode::Asynchronous { cap },
        }
    }

    /// 登记搜索并立即返回结果句柄
    pub async fn register_search(
        &self,
        query: &SearchQuery,
        resource_type: &str,
        directive: &CacheControlDirective,
        ctx: &RequestContext,
    ) -> Result<SearchResults<R>> {
        match self.execution_mode(query, directive) {
            ExecutionMode::Synchronous { cap } => {
                tracing::info!(
                    "[搜索协调] 同步执行 {}?{} (上限 {})",
                    resource_type,
                    query.to_query_string(),
                    cap
                );
                self.execute_synchronously(query, resource_type, cap, ctx)
                    .await
            }
            ExecutionMode::Asynchronous { cap } => {
                self.register_async(query, resource_type, cap, directive, ctx)
                    .await
            }
        }
    }

    async fn execute_synchronously(
        &self,
        query: &SearchQuery,
        resource_type: &str,
        cap: usize,
        ctx: &RequestContext,
    ) -> Result<SearchResults<R>> {
        let engine = self.inner.engines.get(resource_type)?;
        let batch_size = self.inner.config.effective_batch_size();
        let query = query.clone();
        let ctx = ctx.clone();

        let resources = tokio::task::spawn_blocking(move || -> Result<Vec<R>> {
            let mut iterator = ClosingIterator::new(engine.create_query(&query, &ctx)?);
            let mut ids = Vec::new();
            while ids.len() < cap {
                match iterator.next() {
                    Some(id) => ids.push(id?),
                    None => break,
                }
            }
            iterator.close();

            let mut resources = Vec::with_capacity(ids.len());
            for chunk in ids.chunks(batch_size) {
                resources.extend(engine.load_resources(chunk, &ctx)?);
            }
            Ok(resources)
        })
        .await??;

        tracing::debug!("[搜索协调] 同步搜索返回 {} 条", resources.len());
        Ok(SearchResults::Loaded(LoadedResults::new(resources)))
    }

    async fn register_async(
        &self,
        query: &SearchQuery,
        resource_type: &str,
        cap: Option<usize>,
        directive: &CacheControlDirective,
        ctx: &RequestContext,
    ) -> Result<SearchResults<R>> {
        if !directive.no_cache {
            if let Some(existing) = self.find_reusable(query, resource_type, cap)? {
                tracing::info!(
                    "[搜索协调] 复用搜索 {} ({:?}, 已有 {} 条)",
                    existing.uuid,
                    existing.status,
                    existing.num_found
                );
                return Ok(SearchResults::Persisted(self.open(&existing.uuid, ctx)));
            }
        }

        let engine = self.inner.engines.get(resource_type)?;
        let iterator = ClosingIterator::new(engine.create_query(query, ctx)?);

        let uuid = Uuid::new_v4().to_string();
        let mut record = SearchRecord::new(&uuid, resource_type, query, cap)?;
        record.transition(SearchStatus::PassComplete)?;
        let record = self.inner.records.save(&record)?;
        self.inner.results.store_results(&uuid, &[], &[])?;
        tracing::info!(
            "[搜索协调] 登记异步搜索 {} -> {}?{}",
            uuid,
            resource_type,
            record.query_string
        );

        let Some(claimed) = self.inner.records.try_to_mark_in_progress(&record)? else {
            tracing::warn!("[搜索协调] 搜索 {} 已被其他任务认领", uuid);
            return Ok(SearchResults::Persisted(self.open(&uuid, ctx)));
        };
        let mut progress = self.start_task(claimed, iterator, Vec::new());

        // 小结果集在返回前就能知道总数
        let _ = tokio::time::timeout(self.inner.config.initial_sync_wait(), async {
            progress
                .wait_for(|s| s.status.is_terminal() || s.num_found > 0)
                .await
                .map(|_| ())
        })
        .await;

        Ok(SearchResults::Persisted(self.open(&uuid, ctx)))
    }

    fn find_reusable(
        &self,
        query: &SearchQuery,
        resource_type: &str,
        cap: Option<usize>,
    ) -> Result<Option<SearchRecord>> {
        let Some(window) = self.inner.config.reuse_window() else {
            return Ok(None);
        };
        let created_after = chrono::Duration::from_std(window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        self.inner.records.find_reusable(
            resource_type,
            &query.to_query_string(),
            cap,
            created_after,
        )
    }

    /// 为已有搜索创建结果句柄，不检查搜索是否存在
    pub fn open(&self, uuid: &str, ctx: &RequestContext) -> PersistedResults<R> {
        PersistedResults::new(self.clone(), uuid.to_string(), ctx.clone())
    }

    fn start_task(
        &self,
        record: SearchRecord,
        iterator: ClosingIterator,
        prior: Vec<ResourceId>,
    ) -> watch::Receiver<TaskState> {
        let config = &self.inner.config;
        let uuid = record.uuid.clone();
        let cancel = CancellationToken::new();
        let (task, progress) = SearchTask::new(
            record,
            iterator,
            prior,
            config.effective_batch_size(),
            config.capture_backtrace,
            self.inner.records.clone(),
            self.inner.results.clone(),
            cancel.clone(),
        );

        self.inner.active.lock().insert(
            uuid.clone(),
            ActiveSearch {
                cancel,
                progress: progress.clone(),
            },
        );

        let active = Arc::clone(&self.inner.active);
        tokio::spawn(async move {
            if let Err(e) = tokio::task::spawn_blocking(move || task.run()).await {
                tracing::error!("[搜索协调] 搜索任务 {} 异常退出: {}", uuid, e);
            }
            active.lock().remove(&uuid);
        });

        progress
    }

    /// 读取 `[start, end)` 范围内的标识符
    ///
    /// 结果不足时阻塞等待，直到结果足够、搜索终止或超时。
    pub async fn get_resources(
        &self,
        uuid: &str,
        start: usize,
        end: usize,
        ctx: &RequestContext,
    ) -> Result<Vec<ResourceId>> {
        if end < start {
            return Err(SearchError::InvalidRange { start, end });
        }
        let started = Instant::now();
        let deadline = started + self.inner.config.max_wait_for_results();

        let local = self.local_progress(uuid);
        let ready = match local {
            Some(progress) => self.wait_for_task(uuid, progress, end, started, deadline).await?,
            None => false,
        };
        if !ready {
            self.poll_until_available(uuid, end, ctx, started, deadline)
                .await?;
        }

        self.read_page(uuid, start, end)
    }

    fn local_progress(&self, uuid: &str) -> Option<watch::Receiver<TaskState>> {
        self.inner
            .active
            .lock()
            .get(uuid)
            .map(|search| search.progress.clone())
    }

    /// 等待本地任务；返回 `false` 表示任务已退出但没有发布终止状态
    async fn wait_for_task(
        &self,
        uuid: &str,
        mut progress: watch::Receiver<TaskState>,
        end: usize,
        started: Instant,
        deadline: Instant,
    ) -> Result<bool> {
        let waited = tokio::time::timeout_at(deadline, async {
            progress
                .wait_for(|s| s.is_ready_for(end))
                .await
                .map(|state| state.clone())
        })
        .await;

        match waited {
            Err(_) => Err(Self::timed_out(uuid, started)),
            Ok(Err(_)) => Ok(false),
            Ok(Ok(state)) => match state.failure {
                Some(failure) if state.status == SearchStatus::Failed => Err(failure.to_error()),
                _ => Ok(true),
            },
        }
    }

    /// 远程搜索：轮询搜索记录直到覆盖 `end` 或终止
    async fn poll_until_available(
        &self,
        uuid: &str,
        end: usize,
        ctx: &RequestContext,
        started: Instant,
        deadline: Instant,
    ) -> Result<()> {
        let poll_interval = self.inner.config.remote_poll_interval();
        loop {
            let record = self
                .inner
                .records
                .fetch_by_uuid(uuid)?
                .ok_or_else(|| SearchError::gone(uuid))?;
            if let Some(err) = record.failure_error() {
                return Err(err);
            }
            if record.covers(end) {
                return Ok(());
            }

            if record.status == SearchStatus::PassComplete {
                if let Some(progress) = self.try_resume(&record, ctx)? {
                    if self
                        .wait_for_task(uuid, progress, end, started, deadline)
                        .await?
                    {
                        return Ok(());
                    }
                    continue;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Self::timed_out(uuid, started));
            }
            tracing::debug!(
                "[搜索协调] 等待远程搜索 {} ({:?}, {}/{})",
                uuid,
                record.status,
                record.num_found,
                end
            );
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }

    /// 认领一个尚未开始的搜索并在本地继续执行
    fn try_resume(
        &self,
        record: &SearchRecord,
        ctx: &RequestContext,
    ) -> Result<Option<watch::Receiver<TaskState>>> {
        let Some(claimed) = self.inner.records.try_to_mark_in_progress(record)? else {
            tracing::debug!("[搜索协调] 搜索 {} 已被其他任务认领", record.uuid);
            return Ok(None);
        };

        match self.prepare_resume(&claimed, ctx) {
            Ok((iterator, prior)) => {
                tracing::info!(
                    "[搜索协调] 接手搜索 {}, 已缓存 {} 条",
                    claimed.uuid,
                    prior.len()
                );
                Ok(Some(self.start_task(claimed, iterator, prior)))
            }
            Err(e) if e.is_gone() => Err(e),
            Err(e) => {
                // 已认领的记录不能停留在 Loading，否则其他读取方只能等到超时
                let mut failed = claimed;
                failed.fail(FailureKind::Iteration, format!("{e} - FAILED"))?;
                self.inner.records.save(&failed)?;
                Err(e)
            }
        }
    }

    fn prepare_resume(
        &self,
        claimed: &SearchRecord,
        ctx: &RequestContext,
    ) -> Result<(ClosingIterator, Vec<ResourceId>)> {
        let prior = self
            .inner
            .results
            .fetch_all_result_ids(&claimed.uuid)?
            .ok_or_else(|| SearchError::gone(&claimed.uuid))?;
        let query = SearchQuery::decode(&claimed.query_payload)?;
        let engine = self.inner.engines.get(&claimed.resource_type)?;
        let iterator = ClosingIterator::new(engine.create_query(&query, ctx)?);
        Ok((iterator, prior))
    }

    fn read_page(&self, uuid: &str, start: usize, end: usize) -> Result<Vec<ResourceId>> {
        let record = self
            .inner
            .records
            .fetch_by_uuid(uuid)?
            .ok_or_else(|| SearchError::gone(uuid))?;
        if let Some(err) = record.failure_error() {
            return Err(err);
        }

        let effective_end = end.min(record.num_found);
        let Some(page) = to_page(start, effective_end) else {
            return Ok(Vec::new());
        };
        match self.inner.results.fetch_result_ids(uuid, page)? {
            Some(ids) if !ids.is_empty() => Ok(ids),
            _ => {
                tracing::warn!(
                    "[搜索协调] 搜索 {} 的记录有 {} 条结果，但结果缓存中没有数据",
                    uuid,
                    record.num_found
                );
                Err(SearchError::gone(uuid))
            }
        }
    }

    fn timed_out(uuid: &str, started: Instant) -> SearchError {
        SearchError::RequestTimeout {
            uuid: uuid.to_string(),
            waited_ms: started.elapsed().as_millis(),
        }
    }

    /// 取消本进程内所有正在运行的搜索，并等待它们写入终止状态
    pub async fn cancel_all_active_searches(&self) {
        let searches: Vec<(String, watch::Receiver<TaskState>)> = {
            let active = self.inner.active.lock();
            tracing::info!("[搜索协调] 取消 {} 个活动搜索", active.len());
            active
                .iter()
                .map(|(uuid, search)| {
                    search.cancel.cancel();
                    (uuid.clone(), search.progress.clone())
                })
                .collect()
        };

        let wait = self.inner.config.max_wait_for_results();
        for (uuid, mut progress) in searches {
            let stopped = tokio::time::timeout(wait, async {
                progress
                    .wait_for(|s| s.status.is_terminal())
                    .await
                    .map(|_| ())
            })
            .await;
            if stopped.is_err() {
                tracing::warn!("[搜索协调] 搜索 {} 在取消后仍未停止", uuid);
            }
        }
    }

    pub fn active_search_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    pub fn search_record(&self, uuid: &str) -> Result<Option<SearchRecord>> {
        self.inner.records.fetch_by_uuid(uuid)
    }

    /// 通过资源类型对应的引擎加载完整对象，保持标识符顺序
    pub async fn load_resources(
        &self,
        resource_type: &str,
        ids: Vec<ResourceId>,
        ctx: &RequestContext,
    ) -> Result<Vec<R>> {
        let engine = self.inner.engines.get(resource_type)?;
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || engine.load_resources(&ids, &ctx)).await?
    }
}
