// search-core/src/config.rs
//! 协调器配置

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 搜索协调器配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CoordinatorConfig {
    /// `load_synchronous_up_to` 不超过该值时同步执行
    pub synchronous_threshold: usize,
    /// 同步执行且未指定上限时的结果上限
    pub synchronous_upper_bound: usize,
    pub batch_size: usize,
    /// 注册时等待第一批结果的最长时间
    pub initial_sync_wait_ms: u64,
    /// 读取结果时的最长等待时间，本地和远程搜索共用
    pub max_wait_for_results_ms: u64,
    pub remote_poll_interval_ms: u64,
    /// 复用已有搜索结果的时间窗口，`0` 或 `None` 表示不复用
    pub reuse_cached_results_for_ms: Option<u64>,
    /// 失败信息中附带完整调用栈
    pub capture_backtrace: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            synchronous_threshold: 1000,
            synchronous_upper_bound: 10_000,
            batch_size: 500,
            initial_sync_wait_ms: 1000,
            max_wait_for_results_ms: 60_000,
            remote_poll_interval_ms: 500,
            reuse_cached_results_for_ms: Some(60_000),
            capture_backtrace: false,
        }
    }
}

impl CoordinatorConfig {
    /// 从 TOML 文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CoordinatorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn initial_sync_wait(&self) -> Duration {
        Duration::from_millis(self.initial_sync_wait_ms)
    }

    pub fn max_wait_for_results(&self) -> Duration {
        Duration::from_millis(self.max_wait_for_results_ms)
    }

    pub fn remote_poll_interval(&self) -> Duration {
        Duration::from_millis(self.remote_poll_interval_ms.max(1))
    }

    /// 复用窗口，关闭复用时为 `None`
    pub fn reuse_window(&self) -> Option<Duration> {
        self.reuse_cached_results_for_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// 批大小至少为 1
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch-size = 10").unwrap();
        writeln!(file, "max-wait-for-results-ms = 2500").unwrap();

        let config = CoordinatorConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_wait_for_results(), Duration::from_millis(2500));
        assert_eq!(config.synchronous_threshold, 1000);
        assert_eq!(config.reuse_window(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_reuse_window_disables_reuse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "reuse-cached-results-for-ms = 0").unwrap();

        let config = CoordinatorConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.reuse_window(), None);
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch-size = \"many\"").unwrap();
        assert!(CoordinatorConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let config = CoordinatorConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert_eq!(config.effective_batch_size(), 1);
    }
}
