// search-core/src/iterator.rs
//! 标识符迭代器
//!
//! 由查询引擎产生的惰性、单次遍历的标识符序列。
//! 迭代器只归一个搜索任务所有，任何退出路径上都必须调用 `close`。

use crate::error::IterationError;
use crate::models::ResourceId;

pub type IdResult = std::result::Result<ResourceId, IterationError>;

pub trait IdentifierIterator: Iterator<Item = IdResult> + Send {
    /// 在第一个匹配项之前被过滤掉的记录数
    fn skipped_count(&self) -> usize {
        0
    }

    /// 释放底层资源，必须可以重复调用
    fn close(&mut self);
}

/// 保证 `close` 恰好被调用一次的包装
///
/// 无论任务是正常结束、出错还是被取消，drop 时都会关闭内部迭代器。
pub struct ClosingIterator {
    inner: Box<dyn IdentifierIterator>,
    closed: bool,
}

impl ClosingIterator {
    pub fn new(inner: Box<dyn IdentifierIterator>) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    pub fn skipped_count(&self) -> usize {
        self.inner.skipped_count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.close();
        }
    }
}

impl Iterator for ClosingIterator {
    type Item = IdResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        self.inner.next()
    }
}

impl Drop for ClosingIterator {
    fn drop(&mut self) {
        self.close();
    }
}

/// 基于内存列表的迭代器
pub struct VecIdIterator {
    ids: std::vec::IntoIter<ResourceId>,
    skipped: usize,
}

impl VecIdIterator {
    pub fn new(ids: Vec<ResourceId>) -> Self {
        Self {
            ids: ids.into_iter(),
            skipped: 0,
        }
    }

    pub fn with_skipped_count(mut self, skipped: usize) -> Self {
        self.skipped = skipped;
        self
    }
}

impl Iterator for VecIdIterator {
    type Item = IdResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.ids.next().map(Ok)
    }
}

impl IdentifierIterator for VecIdIterator {
    fn skipped_count(&self) -> usize {
        self.skipped
    }

    fn close(&mut self) {}
}
