// apps/search-admin/src/command/clear_cache.rs
//! 清除缓存命令

use super::{Command, open_cache};
use crate::config::Config;
use crate::error::{Result, WrapErr};

pub struct ClearCacheCommand {
    config: Config,
}

impl ClearCacheCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl Command for ClearCacheCommand {
    async fn execute(&self) -> Result<()> {
        println!("\n🗑️  清除搜索缓存");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        let cache_path = self.config.search_cache_path();
        println!("📂 缓存目录: {:?}\n", cache_path);

        if !cache_path.exists() {
            println!("⏭️  目录不存在，无需清理");
            return Ok(());
        }

        // 删除目录前先释放数据库
        let (count, size) = open_cache(&self.config)?.stats();
        std::fs::remove_dir_all(&cache_path)
            .wrap_err_with(|| format!("无法删除 {:?}", cache_path))?;
        tracing::info!("[清除缓存] 已删除 {:?} ({} 条记录)", cache_path, count);

        println!("✨ 清理完成！共删除 {} 条搜索记录，释放 {} 字节", count, size);
        println!("\n⚠️  其他实例仍在读取的搜索会得到 \"does not exist and may have expired\"");
        Ok(())
    }
}
