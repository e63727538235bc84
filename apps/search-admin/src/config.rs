use crate::error::Result;
use config::{AppStrategy, create_strategy, resolve_dir};
use search_core::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default = "default_config", deny_unknown_fields)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub coordinator: CoordinatorConfig,
}

fn default_config() -> Config {
    let cache_dir = match create_strategy() {
        Ok(strategy) => resolve_dir("CACHE_DIRECTORY", &strategy, |s| Some(s.cache_dir())),
        Err(_) => std::env::temp_dir().join(config::constants::APP_NAME),
    };

    Config {
        cache_dir,
        coordinator: CoordinatorConfig::default(),
    }
}

impl Config {
    fn load_str(user_config_str: &str) -> Result<Config> {
        let user_config: Config = toml::from_str(user_config_str)?;
        Ok(user_config)
    }

    pub fn load() -> Result<Config> {
        let strategy = create_strategy()?;
        let config_path = strategy
            .config_dir()
            .join(config::constants::ADMIN_CONFIG_FILE_NAME);

        match std::fs::read_to_string(&config_path) {
            Ok(user_config_str) => Self::load_str(&user_config_str),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // 配置文件不存在，创建示例配置文件
                Self::create_example_config(&config_path)?;
                Self::load_str("")
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn search_cache_path(&self) -> PathBuf {
        config::search_cache_path(&self.cache_dir)
    }

    fn create_example_config(config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let example_config = r#"# search-admin 配置文件
#
# 此文件在首次运行时自动创建

# 可选：自定义缓存目录
# cache-dir = "/custom/cache/path"

[coordinator]
# load-synchronous-up-to 不超过该值时同步执行
# synchronous-threshold = 1000
# 同步执行且未指定上限时的结果上限
# synchronous-upper-bound = 10000
# batch-size = 500
# 登记时等待第一批结果的最长时间
# initial-sync-wait-ms = 1000
# 读取结果时的最长等待时间
# max-wait-for-results-ms = 60000
# remote-poll-interval-ms = 500
# 复用相同搜索结果的时间窗口，设为 0 关闭复用
# reuse-cached-results-for-ms = 60000
# capture-backtrace = false
"#;

        std::fs::write(config_path, example_config)?;
        eprintln!("\n📝 已创建配置文件: {:?}\n", config_path);
        Ok(())
    }
}
