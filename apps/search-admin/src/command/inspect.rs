// apps/search-admin/src/command/inspect.rs
//! 查看缓存中的搜索记录

use chrono::Local;
use search_core::{SearchRecord, SearchRecordStore};

use super::{Command, open_cache};
use crate::config::Config;
use crate::error::Result;

pub struct InspectCommand {
    config: Config,
    uuid: Option<String>,
    limit: usize,
}

impl InspectCommand {
    pub fn new(config: Config, uuid: Option<String>, limit: usize) -> Self {
        Self {
            config,
            uuid,
            limit,
        }
    }

    fn print_record(record: &SearchRecord) {
        println!("  🆔 {}", record.uuid);
        println!("     类型: {}  状态: {:?}", record.resource_type, record.status);
        println!(
            "     已找到: {}  总数: {}  上限: {}",
            record.num_found,
            record
                .total_count
                .map_or_else(|| "-".to_string(), |n| n.to_string()),
            record
                .max_results
                .map_or_else(|| "-".to_string(), |n| n.to_string())
        );
        println!("     查询: {}", record.query_string);
        println!(
            "     创建: {}  更新: {}",
            record.created.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            record.last_updated.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(failure) = &record.failure {
            println!("     失败 ({:?}): {}", failure.kind, failure.message);
        }
        println!();
    }
}

#[async_trait::async_trait]
impl Command for InspectCommand {
    async fn execute(&self) -> Result<()> {
        let cache = open_cache(&self.config)?;
        let (count, size) = cache.stats();

        println!("\n🔍 搜索缓存");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("📂 {:?}", self.config.search_cache_path());
        println!("📊 {} 条记录, {} 字节\n", count, size);

        if let Some(uuid) = &self.uuid {
            match cache.fetch_by_uuid(uuid)? {
                Some(record) => Self::print_record(&record),
                None => println!("❌ 搜索 {} 不存在或已过期", uuid),
            }
            return Ok(());
        }

        let records = cache.list()?;
        // 最近创建的在前
        for record in records.iter().rev().take(self.limit) {
            Self::print_record(record);
        }
        if records.len() > self.limit {
            println!("  ... 还有 {} 条未显示", records.len() - self.limit);
        }
        Ok(())
    }
}
