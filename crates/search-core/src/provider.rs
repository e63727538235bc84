// search-core/src/provider.rs
//! 结果句柄
//!
//! 登记搜索后立即返回给调用方，之后的分页都通过它完成。
//! - `Loaded`：同步执行的结果，全部在内存中，没有 uuid
//! - `Persisted`：异步搜索，按 uuid 从缓存读取，可以在任何实例上重新打开

use tokio::sync::OnceCell;

use crate::coordinator::SearchCoordinator;
use crate::error::{Result, SearchError};
use crate::models::RequestContext;

pub enum SearchResults<R> {
    Loaded(LoadedResults<R>),
    Persisted(PersistedResults<R>),
}

impl<R: Clone + Send + 'static> SearchResults<R> {
    /// 同步结果没有 uuid
    pub fn uuid(&self) -> Option<&str> {
        match self {
            SearchResults::Loaded(_) => None,
            SearchResults::Persisted(results) => Some(results.uuid()),
        }
    }

    /// 结果总数，搜索仍在进行时为 `None`
    pub async fn size(&self) -> Result<Option<usize>> {
        match self {
            SearchResults::Loaded(results) => Ok(Some(results.size())),
            SearchResults::Persisted(results) => results.size().await,
        }
    }

    /// 读取 `[start, end)`，顺序与查询引擎产出的顺序一致
    pub async fn get_resources(&self, start: usize, end: usize) -> Result<Vec<R>> {
        match self {
            SearchResults::Loaded(results) => Ok(results.get_resources(start, end)),
            SearchResults::Persisted(results) => results.get_resources(start, end).await,
        }
    }
}

pub struct LoadedResults<R> {
    resources: Vec<R>,
}

impl<R> LoadedResults<R> {
    pub fn new(resources: Vec<R>) -> Self {
        Self { resources }
    }

    pub fn into_inner(self) -> Vec<R> {
        self.resources
    }
}

impl<R: Clone> LoadedResults<R> {
    pub fn size(&self) -> usize {
        self.resources.len()
    }

    pub fn get_resources(&self, start: usize, end: usize) -> Vec<R> {
        let end = end.min(self.resources.len());
        let start = start.min(end);
        self.resources[start..end].to_vec()
    }
}

pub struct PersistedResults<R> {
    coordinator: SearchCoordinator<R>,
    uuid: String,
    ctx: RequestContext,
    resource_type: OnceCell<String>,
}

impl<R: Send + 'static> PersistedResults<R> {
    pub(crate) fn new(coordinator: SearchCoordinator<R>, uuid: String, ctx: RequestContext) -> Self {
        Self {
            coordinator,
            uuid,
            ctx,
            resource_type: OnceCell::new(),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// 每次都重新读取搜索记录
    pub async fn size(&self) -> Result<Option<usize>> {
        let record = self
            .coordinator
            .search_record(&self.uuid)?
            .ok_or_else(|| SearchError::gone(&self.uuid))?;
        Ok(record.total_count)
    }

    pub async fn get_resources(&self, start: usize, end: usize) -> Result<Vec<R>> {
        let ids = self
            .coordinator
            .get_resources(&self.uuid, start, end, &self.ctx)
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let resource_type = self
            .resource_type
            .get_or_try_init(|| async {
                self.coordinator
                    .search_record(&self.uuid)?
                    .map(|record| record.resource_type)
                    .ok_or_else(|| SearchError::gone(&self.uuid))
            })
            .await?;

        let resources = self
            .coordinator
            .load_resources(resource_type, ids, &self.ctx)
            .await?;
        tracing::debug!(
            "[结果句柄] 搜索 {} [{}, {}) 加载 {} 条",
            self.uuid,
            start,
            end,
            resources.len()
        );
        Ok(resources)
    }
}
