// search-core/src/record.rs
//! 搜索记录及其状态机
//!
//! 状态只能单向前进：
//! `Queued -> PassComplete -> Loading -> (Finished | Failed)`，
//! `Loading -> Loading` 表示一批结果写入后的进度更新。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::models::SearchQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchStatus {
    /// 刚创建，尚未保存
    Queued,
    /// 已登记，等待某个任务认领
    PassComplete,
    /// 已被认领，正在读取迭代器
    Loading,
    Finished,
    Failed,
}

impl SearchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SearchStatus::Finished | SearchStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            SearchStatus::Queued => 0,
            SearchStatus::PassComplete => 1,
            SearchStatus::Loading => 2,
            SearchStatus::Finished | SearchStatus::Failed => 3,
        }
    }

    pub fn can_transition_to(self, next: SearchStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if self == SearchStatus::Loading && next == SearchStatus::Loading {
            return true;
        }
        // Loading 只能由原子认领进入
        if next == SearchStatus::Loading && self != SearchStatus::PassComplete {
            return false;
        }
        next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// 底层迭代器出错
    Iteration,
    /// 收到取消信号
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SearchFailure {
    pub fn to_error(&self) -> SearchError {
        match self.kind {
            FailureKind::Iteration => SearchError::SearchFailed(self.message.clone()),
            FailureKind::Aborted => SearchError::Aborted(self.message.clone()),
        }
    }
}

/// 每个搜索一条的持久化状态记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub uuid: String,
    pub resource_type: String,
    /// 规范化查询串，用于搜索复用
    pub query_string: String,
    /// 序列化后的 [`SearchQuery`]，用于其他实例接手搜索
    pub query_payload: String,
    pub status: SearchStatus,
    /// 已写入结果缓存的标识符数量，只增不减
    pub num_found: usize,
    /// 结果总数，迭代结束前为 `None`
    pub total_count: Option<usize>,
    /// 异步搜索的结果上限
    pub max_results: Option<usize>,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub failure: Option<SearchFailure>,
}

impl SearchRecord {
    pub fn new(
        uuid: impl Into<String>,
        resource_type: impl Into<String>,
        query: &SearchQuery,
        max_results: Option<usize>,
    ) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            uuid: uuid.into(),
            resource_type: resource_type.into(),
            query_string: query.to_query_string(),
            query_payload: query.encode()?,
            status: SearchStatus::Queued,
            num_found: 0,
            total_count: None,
            max_results,
            created: now,
            last_updated: now,
            failure: None,
        })
    }

    pub fn transition(&mut self, next: SearchStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SearchError::InvalidTransition {
                uuid: self.uuid.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.last_updated = Utc::now();
        Ok(())
    }

    /// 一批结果写入后更新计数
    pub fn record_progress(&mut self, num_found: usize) -> Result<()> {
        self.transition(SearchStatus::Loading)?;
        self.num_found = self.num_found.max(num_found);
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        self.transition(SearchStatus::Finished)?;
        self.total_count = Some(self.num_found);
        Ok(())
    }

    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) -> Result<()> {
        self.transition(SearchStatus::Failed)?;
        self.failure = Some(SearchFailure {
            kind,
            message: message.into(),
        });
        Ok(())
    }

    /// 记录中已有的结果是否足以覆盖 `[.., end)`
    pub fn covers(&self, end: usize) -> bool {
        self.status == SearchStatus::Finished || self.num_found >= end
    }

    pub fn failure_error(&self) -> Option<SearchError> {
        if self.status != SearchStatus::Failed {
            return None;
        }
        Some(match &self.failure {
            Some(failure) => failure.to_error(),
            None => SearchError::SearchFailed(format!("Search \"{}\" failed", self.uuid)),
        })
    }
}
