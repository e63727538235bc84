// search-core/src/cache/memory.rs
//! 进程内缓存实现
//!
//! 同一个 `Arc<MemorySearchCache>` 交给多个协调器时，
//! 它们的行为等同于共享同一个外部缓存的多个实例。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{SearchRecordStore, SearchResultStore, pick_reusable};
use crate::error::Result;
use crate::models::{PageRange, ResourceId};
use crate::record::{SearchRecord, SearchStatus};

#[derive(Default)]
pub struct MemorySearchCache {
    records: Mutex<HashMap<String, SearchRecord>>,
    results: Mutex<HashMap<String, Vec<ResourceId>>>,
}

impl MemorySearchCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchRecordStore for MemorySearchCache {
    fn fetch_by_uuid(&self, uuid: &str) -> Result<Option<SearchRecord>> {
        Ok(self.records.lock().get(uuid).cloned())
    }

    fn save(&self, record: &SearchRecord) -> Result<SearchRecord> {
        self.records
            .lock()
            .insert(record.uuid.clone(), record.clone());
        Ok(record.clone())
    }

    fn try_to_mark_in_progress(&self, record: &SearchRecord) -> Result<Option<SearchRecord>> {
        let mut records = self.records.lock();
        let Some(current) = records.get_mut(&record.uuid) else {
            return Ok(None);
        };
        if current.status != SearchStatus::PassComplete {
            return Ok(None);
        }
        current.transition(SearchStatus::Loading)?;
        Ok(Some(current.clone()))
    }

    fn find_reusable(
        &self,
        resource_type: &str,
        query_string: &str,
        max_results: Option<usize>,
        created_after: DateTime<Utc>,
    ) -> Result<Option<SearchRecord>> {
        let records = self.records.lock();
        Ok(pick_reusable(
            records.values(),
            resource_type,
            query_string,
            max_results,
            created_after,
        ))
    }

    fn list(&self) -> Result<Vec<SearchRecord>> {
        let mut records: Vec<_> = self.records.lock().values().cloned().collect();
        records.sort_by_key(|r| r.created);
        Ok(records)
    }

    fn remove(&self, uuid: &str) -> Result<bool> {
        Ok(self.records.lock().remove(uuid).is_some())
    }
}

impl SearchResultStore for MemorySearchCache {
    fn store_results(&self, uuid: &str, prior: &[ResourceId], new: &[ResourceId]) -> Result<()> {
        let mut results = self.results.lock();
        let ids = results.entry(uuid.to_string()).or_default();
        if ids.len() != prior.len() {
            tracing::warn!(
                "[结果缓存] 搜索 {} 的已有结果数 {} 与调用方的 {} 不一致，按偏移覆盖",
                uuid,
                ids.len(),
                prior.len()
            );
            ids.truncate(prior.len());
        }
        ids.extend_from_slice(new);
        Ok(())
    }

    fn fetch_result_ids(&self, uuid: &str, page: PageRange) -> Result<Option<Vec<ResourceId>>> {
        let results = self.results.lock();
        Ok(results.get(uuid).map(|ids| {
            let start = page.offset.min(ids.len());
            let end = page.end().min(ids.len());
            ids[start..end].to_vec()
        }))
    }

    fn fetch_all_result_ids(&self, uuid: &str) -> Result<Option<Vec<ResourceId>>> {
        Ok(self.results.lock().get(uuid).cloned())
    }

    fn remove_results(&self, uuid: &str) -> Result<()> {
        self.results.lock().remove(uuid);
        Ok(())
    }
}
