// config/src/constants.rs
//! 应用目录与文件名常量

pub const TOP_LEVEL_DOMAIN: &str = "org";
pub const AUTHOR: &str = "search-coordination";
pub const APP_NAME: &str = "search-admin";

pub const ADMIN_CONFIG_FILE_NAME: &str = "search-admin.toml";

/// 缓存目录下 sled 数据库的子目录名
pub const SEARCH_CACHE_DIR_NAME: &str = "search_cache";
