// apps/search-admin/src/synthetic.rs
//! 合成查询引擎
//!
//! 产出 `[from, to)` 的连续标识符，可选地在每个标识符之间延迟，
//! 用来在真实缓存上演练登记、分页、取消和跨实例读取。
//!
//! 查询参数：`from`、`to`、`delay-ms`

use std::fmt;
use std::time::Duration;

use search_core::{
    IdResult, IdentifierIterator, IterationError, QueryEngine, RequestContext, ResourceId,
    Result, SearchError, SearchQuery,
};

pub const RESOURCE_TYPE: &str = "Synthetic";

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticResource {
    pub id: ResourceId,
    pub label: String,
}

impl fmt::Display for SyntheticResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.label)
    }
}

pub fn synthetic_query(from: i64, to: i64, delay_ms: u64) -> SearchQuery {
    SearchQuery::new()
        .add("from", from.to_string())
        .add("to", to.to_string())
        .add("delay-ms", delay_ms.to_string())
}

struct SyntheticIterator {
    next: i64,
    end: i64,
    delay: Duration,
}

impl Iterator for SyntheticIterator {
    type Item = IdResult;

    fn next(&mut self) -> Option<IdResult> {
        if self.next >= self.end {
            return None;
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let id = ResourceId(self.next);
        self.next += 1;
        Some(Ok(id))
    }
}

impl IdentifierIterator for SyntheticIterator {
    fn close(&mut self) {
        tracing::debug!("[合成引擎] 迭代器关闭于 {}", self.next);
    }
}

pub struct SyntheticEngine;

impl SyntheticEngine {
    fn param<T: std::str::FromStr>(query: &SearchQuery, name: &str, default: T) -> Result<T> {
        match query.first(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                SearchError::Iteration(IterationError::new(format!(
                    "invalid value for parameter \"{name}\": {raw}"
                )))
            }),
        }
    }
}

impl QueryEngine<SyntheticResource> for SyntheticEngine {
    fn create_query(
        &self,
        query: &SearchQuery,
        _ctx: &RequestContext,
    ) -> Result<Box<dyn IdentifierIterator>> {
        let from: i64 = Self::param(query, "from", 0)?;
        let to: i64 = Self::param(query, "to", from)?;
        let delay_ms: u64 = Self::param(query, "delay-ms", 0)?;
        Ok(Box::new(SyntheticIterator {
            next: from,
            end: to,
            delay: Duration::from_millis(delay_ms),
        }))
    }

    fn load_resources(
        &self,
        ids: &[ResourceId],
        _ctx: &RequestContext,
    ) -> Result<Vec<SyntheticResource>> {
        Ok(ids
            .iter()
            .map(|id| SyntheticResource {
                id: *id,
                label: format!("synthetic-{id}"),
            })
            .collect())
    }
}
