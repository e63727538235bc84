// search-core/src/cache/mod.rs
//! 搜索缓存
//!
//! 两类存储是不同实例之间唯一共享的状态：
//! - 搜索记录缓存：每个搜索一条状态记录，支持原子认领
//! - 结果缓存：每个搜索一个只追加、可按偏移读取的标识符列表

pub mod memory;
pub mod persistent;

pub use memory::MemorySearchCache;
pub use persistent::PersistentSearchCache;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{PageRange, ResourceId};
use crate::record::{SearchRecord, SearchStatus};

pub trait SearchRecordStore: Send + Sync {
    fn fetch_by_uuid(&self, uuid: &str) -> Result<Option<SearchRecord>>;

    /// 插入或覆盖
    fn save(&self, record: &SearchRecord) -> Result<SearchRecord>;

    /// 原子认领：仅当持久化状态仍是 `PassComplete` 时把它改成 `Loading` 并返回新记录，
    /// 否则返回 `None`，表示已有其他任务在处理这个搜索。
    fn try_to_mark_in_progress(&self, record: &SearchRecord) -> Result<Option<SearchRecord>>;

    /// 查找可以复用的搜索：资源类型、查询串和结果上限都相同，未失败，
    /// 且创建时间不早于 `created_after`
    fn find_reusable(
        &self,
        resource_type: &str,
        query_string: &str,
        max_results: Option<usize>,
        created_after: DateTime<Utc>,
    ) -> Result<Option<SearchRecord>>;

    fn list(&self) -> Result<Vec<SearchRecord>>;

    fn remove(&self, uuid: &str) -> Result<bool>;
}

pub trait SearchResultStore: Send + Sync {
    /// 按顺序追加 `new`；`prior` 是该搜索此前已写入的全部结果
    fn store_results(&self, uuid: &str, prior: &[ResourceId], new: &[ResourceId]) -> Result<()>;

    /// 读取一页；结果条目不存在时返回 `None`
    fn fetch_result_ids(&self, uuid: &str, page: PageRange) -> Result<Option<Vec<ResourceId>>>;

    fn fetch_all_result_ids(&self, uuid: &str) -> Result<Option<Vec<ResourceId>>>;

    fn remove_results(&self, uuid: &str) -> Result<()>;
}

/// 从候选记录中挑出最近创建的可复用记录
pub(crate) fn pick_reusable<'a>(
    candidates: impl Iterator<Item = &'a SearchRecord>,
    resource_type: &str,
    query_string: &str,
    max_results: Option<usize>,
    created_after: DateTime<Utc>,
) -> Option<SearchRecord> {
    // 上限不同的搜索结果集不同，不能互相复用
    candidates
        .filter(|r| r.resource_type == resource_type && r.query_string == query_string)
        .filter(|r| r.max_results == max_results)
        .filter(|r| r.created >= created_after && r.status != SearchStatus::Failed)
        .max_by_key(|r| r.created)
        .cloned()
}
