// search-core/src/lib.rs
//! 异步搜索协调与结果分页
//!
//! 登记搜索后立即返回结果句柄，后台任务把查询引擎产出的标识符
//! 分批写入持久化的结果缓存；调用方按 `[start, end)` 分页读取，
//! 读取方可以是启动搜索的实例，也可以是只共享缓存的其他实例。
//!
//! - [`SearchCoordinator`]：登记、分页读取、取消
//! - [`cache`]：搜索记录缓存与结果缓存（内存 / sled）
//! - [`QueryEngine`]：底层查询引擎接口，按资源类型注册

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod iterator;
pub mod models;
pub mod provider;
pub mod record;
mod task;

// 重导出核心类型
pub use cache::{MemorySearchCache, PersistentSearchCache, SearchRecordStore, SearchResultStore};
pub use config::CoordinatorConfig;
pub use coordinator::{ExecutionMode, SearchCoordinator};
pub use engine::{EngineRegistry, QueryEngine};
pub use error::{IterationError, Result, SearchError};
pub use iterator::{ClosingIterator, IdResult, IdentifierIterator, VecIdIterator};
pub use models::{
    CacheControlDirective, PageRange, RequestContext, ResourceId, SearchQuery, to_page,
};
pub use provider::{LoadedResults, PersistedResults, SearchResults};
pub use record::{FailureKind, SearchFailure, SearchRecord, SearchStatus};
