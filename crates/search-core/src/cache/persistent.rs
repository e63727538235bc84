// search-core/src/cache/persistent.rs
//! 基于 sled 的持久化搜索缓存
//!
//! - `search_records`：uuid -> bincode(SearchRecord)
//! - `search_results`：uuid + 0x00 + 偏移(u64 大端) -> 标识符(i64 大端)
//! - `search_result_sizes`：uuid -> 已写入的结果数(u64 大端)
//!
//! 偏移用大端编码，sled 的有序键就是结果顺序，按页读取只需一次范围扫描。
//! 认领使用 sled 的 `compare_and_swap`，是对持久化状态的单次原子比较交换。

use std::path::Path;

use chrono::{DateTime, Utc};
use sled::{Db, Tree};

use super::{SearchRecordStore, SearchResultStore, pick_reusable};
use crate::error::{Result, SearchError};
use crate::models::{PageRange, ResourceId};
use crate::record::{SearchRecord, SearchStatus};

const RECORDS_TREE: &str = "search_records";
const RESULTS_TREE: &str = "search_results";
const SIZES_TREE: &str = "search_result_sizes";

pub struct PersistentSearchCache {
    db: Db,
    records: Tree,
    results: Tree,
    sizes: Tree,
}

impl PersistentSearchCache {
    /// 创建或打开缓存数据库
    pub fn open(cache_path: &Path) -> Result<Self> {
        let db = sled::open(cache_path)?;
        tracing::info!("[搜索缓存] 已加载: {:?}", cache_path);
        Self::from_db(db)
    }

    /// 在已打开的数据库上创建缓存，同一个 `Db` 可以交给多个协调器共享
    pub fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            records: db.open_tree(RECORDS_TREE)?,
            results: db.open_tree(RESULTS_TREE)?,
            sizes: db.open_tree(SIZES_TREE)?,
            db,
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// 记录数和磁盘占用
    pub fn stats(&self) -> (usize, u64) {
        let count = self.records.len();
        let size = self.db.size_on_disk().unwrap_or(0);
        (count, size)
    }

    fn result_prefix(uuid: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(uuid.len() + 1);
        key.extend_from_slice(uuid.as_bytes());
        key.push(0);
        key
    }

    fn result_key(uuid: &str, offset: usize) -> Vec<u8> {
        let mut key = Self::result_prefix(uuid);
        key.extend_from_slice(&(offset as u64).to_be_bytes());
        key
    }

    fn decode_id(bytes: &[u8]) -> Result<ResourceId> {
        let raw: [u8; 8] = bytes.try_into().map_err(|_| {
            SearchError::Storage(sled::Error::Unsupported(format!(
                "标识符长度错误: {} 字节",
                bytes.len()
            )))
        })?;
        Ok(ResourceId(i64::from_be_bytes(raw)))
    }

    fn result_count(&self, uuid: &str) -> Result<Option<usize>> {
        let Some(raw) = self.sizes.get(uuid.as_bytes())? else {
            return Ok(None);
        };
        let raw: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
            SearchError::Storage(sled::Error::Unsupported("结果数长度错误".to_string()))
        })?;
        Ok(Some(u64::from_be_bytes(raw) as usize))
    }

    fn decode_record(bytes: &[u8]) -> Result<SearchRecord> {
        Ok(bincode::deserialize::<SearchRecord>(bytes)?)
    }
}

impl SearchRecordStore for PersistentSearchCache {
    fn fetch_by_uuid(&self, uuid: &str) -> Result<Option<SearchRecord>> {
        match self.records.get(uuid.as_bytes())? {
            Some(data) => Ok(Some(Self::decode_record(&data)?)),
            None => Ok(None),
        }
    }

    fn save(&self, record: &SearchRecord) -> Result<SearchRecord> {
        let data = bincode::serialize(record)?;
        self.records.insert(record.uuid.as_bytes(), data)?;
        self.records.flush()?;
        Ok(record.clone())
    }

    fn try_to_mark_in_progress(&self, record: &SearchRecord) -> Result<Option<SearchRecord>> {
        let key = record.uuid.as_bytes();
        loop {
            let Some(current_data) = self.records.get(key)? else {
                return Ok(None);
            };
            let mut current = Self::decode_record(&current_data)?;
            if current.status != SearchStatus::PassComplete {
                return Ok(None);
            }
            current.transition(SearchStatus::Loading)?;
            let new_data = bincode::serialize(&current)?;

            match self
                .records
                .compare_and_swap(key, Some(&current_data), Some(new_data))?
            {
                Ok(()) => {
                    self.records.flush()?;
                    return Ok(Some(current));
                }
                // 读取之后记录被并发修改，重新读取再判断
                Err(_) => continue,
            }
        }
    }

    fn find_reusable(
        &self,
        resource_type: &str,
        query_string: &str,
        max_results: Option<usize>,
        created_after: DateTime<Utc>,
    ) -> Result<Option<SearchRecord>> {
        let records = self.list()?;
        Ok(pick_reusable(
            records.iter(),
            resource_type,
            query_string,
            max_results,
            created_after,
        ))
    }

    fn list(&self) -> Result<Vec<SearchRecord>> {
        let mut records = Vec::new();
        for entry in self.records.iter() {
            let (_, data) = entry?;
            match Self::decode_record(&data) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("[搜索缓存] 跳过无法解析的记录: {}", e),
            }
        }
        records.sort_by_key(|r| r.created);
        Ok(records)
    }

    fn remove(&self, uuid: &str) -> Result<bool> {
        let removed = self.records.remove(uuid.as_bytes())?.is_some();
        self.remove_results(uuid)?;
        self.records.flush()?;
        Ok(removed)
    }
}

impl SearchResultStore for PersistentSearchCache {
    fn store_results(&self, uuid: &str, prior: &[ResourceId], new: &[ResourceId]) -> Result<()> {
        let existing = self.result_count(uuid)?.unwrap_or(0);
        if existing != prior.len() {
            tracing::warn!(
                "[结果缓存] 搜索 {} 的已有结果数 {} 与调用方的 {} 不一致，按偏移覆盖",
                uuid,
                existing,
                prior.len()
            );
        }

        let mut batch = sled::Batch::default();
        for (i, id) in new.iter().enumerate() {
            batch.insert(
                Self::result_key(uuid, prior.len() + i),
                id.as_i64().to_be_bytes().to_vec(),
            );
        }
        self.results.apply_batch(batch)?;

        let count = (prior.len() + new.len()) as u64;
        self.sizes.insert(uuid.as_bytes(), count.to_be_bytes().to_vec())?;
        self.db.flush()?;
        Ok(())
    }

    fn fetch_result_ids(&self, uuid: &str, page: PageRange) -> Result<Option<Vec<ResourceId>>> {
        let Some(count) = self.result_count(uuid)? else {
            return Ok(None);
        };
        let end = page.end().min(count);
        if page.offset >= end {
            return Ok(Some(Vec::new()));
        }

        let start_key = Self::result_key(uuid, page.offset);
        let end_key = Self::result_key(uuid, end);
        let mut ids = Vec::with_capacity(end - page.offset);
        for entry in self.results.range(start_key..end_key) {
            let (_, value) = entry?;
            ids.push(Self::decode_id(&value)?);
        }
        Ok(Some(ids))
    }

    fn fetch_all_result_ids(&self, uuid: &str) -> Result<Option<Vec<ResourceId>>> {
        let Some(count) = self.result_count(uuid)? else {
            return Ok(None);
        };
        let mut ids = Vec::with_capacity(count);
        for entry in self.results.scan_prefix(Self::result_prefix(uuid)) {
            let (_, value) = entry?;
            ids.push(Self::decode_id(&value)?);
        }
        ids.truncate(count);
        Ok(Some(ids))
    }

    fn remove_results(&self, uuid: &str) -> Result<()> {
        let mut batch = sled::Batch::default();
        for entry in self.results.scan_prefix(Self::result_prefix(uuid)) {
            let (key, _) = entry?;
            batch.remove(key);
        }
        self.results.apply_batch(batch)?;
        self.sizes.remove(uuid.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}
