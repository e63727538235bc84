// search-core/src/error.rs
//! 错误类型
//!
//! 后台任务中的失败不会直接抛给读取方，而是写入搜索记录；
//! 读取方（本地或其他实例）再从记录中还原成同一个错误。

use std::panic::Location;

use thiserror::Error;

use crate::record::SearchStatus;

/// 底层查询引擎在迭代过程中产生的错误
///
/// 构造时通过 `#[track_caller]` 记录出错位置，失败信息中会带上该位置，方便排查。
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct IterationError {
    message: String,
    location: &'static Location<'static>,
}

impl IterationError {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: Location::caller(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 错误产生的源码位置
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    /// 搜索记录不存在，或记录还在但结果缓存已丢失
    #[error("Search ID \"{0}\" does not exist and may have expired")]
    ResourceGone(String),

    /// 等待远程搜索结果超时
    #[error("Request timed out after {waited_ms}ms waiting for results of search \"{uuid}\"")]
    RequestTimeout { uuid: String, waited_ms: u128 },

    /// 搜索被主动取消
    #[error("{0}")]
    Aborted(String),

    /// 后台任务迭代失败（信息来自持久化的搜索记录）
    #[error("{0}")]
    SearchFailed(String),

    /// 同步执行时的迭代错误，直接返回给调用方
    #[error("Failed during synchronous search: {0}")]
    Iteration(#[from] IterationError),

    #[error("No query engine registered for resource type \"{0}\"")]
    UnknownResourceType(String),

    #[error("Search \"{uuid}\" can not move from {from:?} to {to:?}")]
    InvalidTransition {
        uuid: String,
        from: SearchStatus,
        to: SearchStatus,
    },

    #[error("Invalid range [{start}, {end})")]
    InvalidRange { start: usize, end: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    pub fn gone(uuid: impl Into<String>) -> Self {
        SearchError::ResourceGone(uuid.into())
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, SearchError::ResourceGone(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SearchError::RequestTimeout { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, SearchError::Aborted(_))
    }
}
