// apps/search-admin/src/command/fetch.rs
//! 按 uuid 读取已有搜索，走跨实例读取路径

use search_core::RequestContext;

use super::{Command, format_size, open_coordinator};
use crate::config::Config;
use crate::error::{Result, WrapErr};

pub struct FetchCommand {
    config: Config,
    uuid: String,
    start: usize,
    end: usize,
}

impl FetchCommand {
    pub fn new(config: Config, uuid: String, start: usize, end: usize) -> Self {
        Self {
            config,
            uuid,
            start,
            end,
        }
    }
}

#[async_trait::async_trait]
impl Command for FetchCommand {
    async fn execute(&self) -> Result<()> {
        let coordinator = open_coordinator(&self.config)?;
        let ctx = RequestContext::with_request_id("search-admin");
        let results = coordinator.open(&self.uuid, &ctx);

        let resources = results
            .get_resources(self.start, self.end)
            .await
            .wrap_err_with(|| format!("读取搜索 {} 失败", self.uuid))?;

        println!("\n📄 搜索 {} [{}, {})", self.uuid, self.start, self.end);
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for (i, resource) in resources.iter().enumerate() {
            println!("  {:>6}  {}", self.start + i, resource);
        }
        println!("\n  返回 {} 条, 总数 {}", resources.len(), format_size(results.size().await?));

        // 可能接手了尚未开始的搜索，退出前让它停下
        coordinator.cancel_all_active_searches().await;
        Ok(())
    }
}
