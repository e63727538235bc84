// search-core/src/models.rs
//! 数据模型定义

use std::collections::BTreeMap;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 资源在底层存储中的标识符
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Display,
)]
pub struct ResourceId(pub i64);

impl ResourceId {
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

/// 过滤条件
///
/// 对协调器来说 `params` 是不透明的，只有查询引擎会解释它；
/// 协调器只关心执行方式（同步 / 异步）以及用于复用和恢复的序列化形式。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub params: BTreeMap<String, Vec<String>>,
    /// 要求在调用线程上一次性加载全部结果
    pub load_synchronous: bool,
    /// 同步加载的结果上限
    pub load_synchronous_up_to: Option<usize>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_load_synchronous(mut self, load_synchronous: bool) -> Self {
        self.load_synchronous = load_synchronous;
        self
    }

    pub fn with_load_synchronous_up_to(mut self, up_to: usize) -> Self {
        self.load_synchronous_up_to = Some(up_to);
        self
    }

    /// 第一个参数值
    pub fn first(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// 规范化查询串，用于判断两次搜索是否相同
    ///
    /// 参数按名称排序（`BTreeMap`），同名参数保持添加顺序。
    pub fn to_query_string(&self) -> String {
        self.params
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |value| format!("{name}={value}")))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// 序列化为持久化在搜索记录中的载荷
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// 客户端的缓存控制指令
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControlDirective {
    /// 不复用已有的搜索结果
    pub no_cache: bool,
    /// 不写入缓存，直接同步加载
    pub no_store: bool,
    /// 配合 `no_store` 使用的结果上限
    pub max_results: Option<usize>,
}

impl CacheControlDirective {
    pub fn no_cache() -> Self {
        Self {
            no_cache: true,
            ..Default::default()
        }
    }

    pub fn no_store(max_results: Option<usize>) -> Self {
        Self {
            no_store: true,
            max_results,
            ..Default::default()
        }
    }
}

/// 请求上下文，原样传给查询引擎
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: Option<String>,
    pub tenant: Option<String>,
}

impl RequestContext {
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            tenant: None,
        }
    }
}

/// 结果缓存中的一页 `[offset, offset + size)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub offset: usize,
    pub size: usize,
}

impl PageRange {
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// 把 `[from, to)` 转成分页；空区间返回 `None`
pub fn to_page(from: usize, to: usize) -> Option<PageRange> {
    if to <= from {
        return None;
    }
    Some(PageRange {
        offset: from,
        size: to - from,
    })
}
