// search-core/src/engine.rs
//! 查询引擎接口
//!
//! 引擎按资源类型注册。任何实例只要拿到搜索记录，
//! 就能通过记录里的资源类型找到引擎并重新创建迭代器。

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, SearchError};
use crate::iterator::IdentifierIterator;
use crate::models::{RequestContext, ResourceId, SearchQuery};

pub trait QueryEngine<R>: Send + Sync {
    /// 把过滤条件转成按结果顺序产出标识符的迭代器
    fn create_query(
        &self,
        query: &SearchQuery,
        ctx: &RequestContext,
    ) -> Result<Box<dyn IdentifierIterator>>;

    /// 批量加载完整对象，返回顺序必须与 `ids` 一致
    fn load_resources(&self, ids: &[ResourceId], ctx: &RequestContext) -> Result<Vec<R>>;
}

/// 资源类型到查询引擎的映射
pub struct EngineRegistry<R> {
    engines: HashMap<String, Arc<dyn QueryEngine<R>>>,
}

impl<R> EngineRegistry<R> {
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    pub fn register(
        mut self,
        resource_type: impl Into<String>,
        engine: Arc<dyn QueryEngine<R>>,
    ) -> Self {
        self.engines.insert(resource_type.into(), engine);
        self
    }

    pub fn get(&self, resource_type: &str) -> Result<Arc<dyn QueryEngine<R>>> {
        self.engines
            .get(resource_type)
            .cloned()
            .ok_or_else(|| SearchError::UnknownResourceType(resource_type.to_string()))
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }
}

impl<R> Default for EngineRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}
