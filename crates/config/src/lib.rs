// config/src/lib.rs
//! 应用目录策略
//!
//! 目录优先取环境变量，其次取平台约定目录，最后退回到临时目录。

pub mod constants;

pub use etcetera::AppStrategy;
use etcetera::{AppStrategyArgs, choose_app_strategy};

use std::env;
use std::path::PathBuf;

pub fn create_strategy() -> std::result::Result<impl AppStrategy, etcetera::HomeDirError> {
    choose_app_strategy(AppStrategyArgs {
        top_level_domain: constants::TOP_LEVEL_DOMAIN.to_string(),
        author: constants::AUTHOR.to_string(),
        app_name: constants::APP_NAME.to_string(),
    })
}

pub fn resolve_dir<S, F>(env_key: &str, strategy: &S, strategy_fn: F) -> PathBuf
where
    S: AppStrategy,
    F: FnOnce(&S) -> Option<PathBuf>,
{
    env::var_os(env_key)
        .map(PathBuf::from)
        .or_else(|| strategy_fn(strategy))
        .unwrap_or_else(|| env::temp_dir().join(constants::APP_NAME))
}

/// sled 搜索缓存所在目录
pub fn search_cache_path(cache_dir: &std::path::Path) -> PathBuf {
    cache_dir.join(constants::SEARCH_CACHE_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_override_wins() {
        let strategy = create_strategy().unwrap();
        let key = "SEARCH_ADMIN_TEST_CACHE_DIRECTORY";
        // SAFETY: 测试内独占使用该变量
        unsafe { env::set_var(key, "/tmp/override") };
        let dir = resolve_dir(key, &strategy, |s| Some(s.cache_dir()));
        unsafe { env::remove_var(key) };
        assert_eq!(dir, PathBuf::from("/tmp/override"));
    }

    #[test]
    fn test_fallback_to_temp_dir() {
        let strategy = create_strategy().unwrap();
        let dir = resolve_dir("SEARCH_ADMIN_UNSET_DIRECTORY", &strategy, |_| None);
        assert_eq!(dir, env::temp_dir().join(constants::APP_NAME));
    }

    #[test]
    fn test_search_cache_path() {
        let path = search_cache_path(std::path::Path::new("/var/cache/app"));
        assert_eq!(path, PathBuf::from("/var/cache/app/search_cache"));
    }
}
