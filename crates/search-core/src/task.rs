// search-core/src/task.rs
//! 后台搜索任务
//!
//! 任务持有已认领（`Loading`）的搜索记录和独占的迭代器，
//! 按批读取标识符、追加到结果缓存并推进记录状态，直到：
//! - 迭代器耗尽或达到结果上限 -> `Finished`
//! - 迭代器出错 -> `Failed`
//! - 收到取消信号 -> `Failed`（取消专用信息）
//!
//! 每次调用 `next()` 之前都会检查取消信号。
//! 任务状态通过 `watch` 通道广播给本进程内等待结果的读取方，
//! 其他实例只能通过持久化的搜索记录观察进度。

use std::panic::Location;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cache::{SearchRecordStore, SearchResultStore};
use crate::error::{IterationError, Result, SearchError};
use crate::iterator::ClosingIterator;
use crate::models::ResourceId;
use crate::record::{FailureKind, SearchFailure, SearchRecord, SearchStatus};

/// 广播给本地读取方的任务进度
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TaskState {
    pub status: SearchStatus,
    pub num_found: usize,
    pub failure: Option<SearchFailure>,
}

impl TaskState {
    pub fn from_record(record: &SearchRecord) -> Self {
        Self {
            status: record.status,
            num_found: record.num_found,
            failure: record.failure.clone(),
        }
    }

    /// 已经可以回答 `[.., end)`，或者不会再有新结果
    pub fn is_ready_for(&self, end: usize) -> bool {
        self.status.is_terminal() || self.num_found >= end
    }
}

enum Outcome {
    /// 终止状态已写入
    Finished,
    Failed(IterationError),
    Aborted(&'static Location<'static>),
    /// 写入结果缓存或记录缓存失败
    StorageFailed(SearchError, &'static Location<'static>),
}

pub(crate) struct SearchTask {
    record: SearchRecord,
    iterator: ClosingIterator,
    /// 已写入结果缓存的标识符
    synced: Vec<ResourceId>,
    /// 重新创建的迭代器需要跳过的前缀长度
    skip: usize,
    batch_size: usize,
    capture_backtrace: bool,
    records: Arc<dyn SearchRecordStore>,
    results: Arc<dyn SearchResultStore>,
    cancel: CancellationToken,
    progress: watch::Sender<TaskState>,
}

impl SearchTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        record: SearchRecord,
        iterator: ClosingIterator,
        prior: Vec<ResourceId>,
        batch_size: usize,
        capture_backtrace: bool,
        records: Arc<dyn SearchRecordStore>,
        results: Arc<dyn SearchResultStore>,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<TaskState>) {
        let (progress, rx) = watch::channel(TaskState::from_record(&record));
        let task = Self {
            record,
            iterator,
            skip: prior.len(),
            synced: prior,
            batch_size: batch_size.max(1),
            capture_backtrace,
            records,
            results,
            cancel,
            progress,
        };
        (task, rx)
    }

    /// 阻塞运行直到终止状态，应在 `spawn_blocking` 中调用
    pub fn run(mut self) {
        let uuid = self.record.uuid.clone();
        tracing::info!(
            "[搜索任务] 开始读取搜索 {} (已有 {} 条, 上限 {:?})",
            uuid,
            self.skip,
            self.record.max_results
        );

        let outcome = self.drain();
        if self.iterator.skipped_count() > 0 {
            tracing::debug!(
                "[搜索任务] 搜索 {} 的迭代器跳过了 {} 条记录",
                uuid,
                self.iterator.skipped_count()
            );
        }
        // 失败和取消时先释放迭代器，再发布终止状态
        self.iterator.close();

        match outcome {
            Outcome::Finished => {}
            Outcome::Failed(e) => {
                let message = self.failure_message(&e);
                tracing::error!("[搜索任务] 搜索 {} 失败: {}", uuid, e);
                self.persist_failure(FailureKind::Iteration, message);
            }
            Outcome::Aborted(location) => {
                tracing::info!("[搜索任务] 搜索 {} 已取消, 已读取 {} 条", uuid, self.synced.len());
                self.persist_failure(
                    FailureKind::Aborted,
                    format!("Abort has been requested\n    at {location}"),
                );
            }
            Outcome::StorageFailed(e, location) => {
                tracing::error!("[搜索任务] 搜索 {} 写入缓存失败: {}", uuid, e);
                self.persist_failure(
                    FailureKind::Iteration,
                    format!("{e} - FAILED\n    at {location}"),
                );
            }
        }
    }

    fn drain(&mut self) -> Outcome {
        // 接手其他实例的搜索时，前缀已经在结果缓存中
        let mut to_skip = self.skip;
        while to_skip > 0 {
            if self.cancel.is_cancelled() {
                return Outcome::Aborted(Location::caller());
            }
            match self.iterator.next() {
                Some(Ok(_)) => to_skip -= 1,
                Some(Err(e)) => return Outcome::Failed(e),
                None => return self.finish_with(Vec::new()),
            }
        }

        loop {
            let remaining = self
                .record
                .max_results
                .map(|max| max.saturating_sub(self.synced.len()));
            if remaining == Some(0) {
                return self.finish_with(Vec::new());
            }
            let limit = remaining.map_or(self.batch_size, |r| r.min(self.batch_size));

            let mut batch = Vec::with_capacity(limit);
            let mut exhausted = false;
            while batch.len() < limit {
                if self.cancel.is_cancelled() {
                    return Outcome::Aborted(Location::caller());
                }
                match self.iterator.next() {
                    Some(Ok(id)) => batch.push(id),
                    Some(Err(e)) => return Outcome::Failed(e),
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }

            let reached_cap = remaining == Some(batch.len());
            if exhausted || reached_cap {
                return self.finish_with(batch);
            }
            if let Err(outcome) = self.flush_batch(batch, false) {
                return outcome;
            }
        }
    }

    #[track_caller]
    fn finish_with(&mut self, batch: Vec<ResourceId>) -> Outcome {
        match self.flush_batch(batch, true) {
            Ok(()) => Outcome::Finished,
            Err(outcome) => outcome,
        }
    }

    /// 写入失败时带上调用位置
    #[track_caller]
    fn flush_batch(&mut self, batch: Vec<ResourceId>, last: bool) -> std::result::Result<(), Outcome> {
        let location = Location::caller();
        self.store_batch(batch, last)
            .map_err(|e| Outcome::StorageFailed(e, location))
    }

    /// 追加一批结果并保存记录；`last` 为真时同一次保存里完成搜索
    fn store_batch(&mut self, batch: Vec<ResourceId>, last: bool) -> Result<()> {
        self.results
            .store_results(&self.record.uuid, &self.synced, &batch)?;
        self.synced.extend(batch);

        let mut next = self.record.clone();
        next.record_progress(self.synced.len())?;
        if last {
            next.finish()?;
        }
        self.record = self.records.save(&next)?;
        self.publish();

        if last {
            tracing::info!(
                "[搜索任务] 搜索 {} 完成, 共 {} 条",
                self.record.uuid,
                self.record.num_found
            );
        } else {
            tracing::debug!(
                "[搜索任务] 搜索 {} 已写入 {} 条",
                self.record.uuid,
                self.record.num_found
            );
        }
        Ok(())
    }

    fn persist_failure(&mut self, kind: FailureKind, message: String) {
        if let Err(e) = self.record.fail(kind, message.clone()) {
            tracing::warn!("[搜索任务] 无法标记搜索 {} 为失败: {}", self.record.uuid, e);
        }
        if let Err(e) = self.records.save(&self.record) {
            tracing::error!("[搜索任务] 保存搜索 {} 的失败状态出错: {}", self.record.uuid, e);
        }
        // 即使保存失败，本地读取方也要拿到确定的结果
        self.progress.send_replace(TaskState {
            status: SearchStatus::Failed,
            num_found: self.record.num_found,
            failure: Some(SearchFailure { kind, message }),
        });
    }

    fn failure_message(&self, e: &IterationError) -> String {
        let mut message = format!("{} - FAILED\n    at {}", e.message(), e.location());
        if self.capture_backtrace {
            message.push('\n');
            message.push_str(&std::backtrace::Backtrace::force_capture().to_string());
        }
        message
    }

    fn publish(&self) {
        self.progress.send_replace(TaskState::from_record(&self.record));
    }
}
