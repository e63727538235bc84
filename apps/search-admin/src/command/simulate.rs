// apps/search-admin/src/command/simulate.rs
//! 模拟搜索命令：登记合成搜索并逐页读取，Ctrl-C 取消

use std::time::Instant;

use search_core::{CacheControlDirective, RequestContext};

use super::{Command, format_size, open_coordinator};
use crate::config::Config;
use crate::error::Result;
use crate::synthetic::{RESOURCE_TYPE, synthetic_query};

pub struct SimulateCommand {
    config: Config,
    from: i64,
    to: i64,
    delay_ms: u64,
    page_size: usize,
    sync: bool,
    no_cache: bool,
}

impl SimulateCommand {
    pub fn new(
        config: Config,
        from: i64,
        to: i64,
        delay_ms: u64,
        page_size: usize,
        sync: bool,
        no_cache: bool,
    ) -> Self {
        Self {
            config,
            from,
            to,
            delay_ms,
            page_size,
            sync,
            no_cache,
        }
    }
}

#[async_trait::async_trait]
impl Command for SimulateCommand {
    async fn execute(&self) -> Result<()> {
        let coordinator = open_coordinator(&self.config)?;
        let query = synthetic_query(self.from, self.to, self.delay_ms).with_load_synchronous(self.sync);
        let directive = if self.no_cache {
            CacheControlDirective::no_cache()
        } else {
            CacheControlDirective::default()
        };
        let ctx = RequestContext::with_request_id("search-admin");

        let started = Instant::now();
        let results = coordinator
            .register_search(&query, RESOURCE_TYPE, &directive, &ctx)
            .await?;

        println!("\n🔍 搜索已登记");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("  uuid: {}", results.uuid().unwrap_or("(同步执行，无 uuid)"));
        println!("  总数: {}", format_size(results.size().await?));
        println!();

        let page_size = self.page_size.max(1);
        let paging = async {
            let mut start = 0;
            let mut pages = 0;
            loop {
                let page = results.get_resources(start, start + page_size).await?;
                let (Some(first), Some(last)) = (page.first(), page.last()) else {
                    break;
                };
                pages += 1;
                println!(
                    "  第 {:>3} 页 [{}, {}): {} .. {}",
                    pages,
                    start,
                    start + page.len(),
                    first,
                    last
                );
                start += page.len();
            }
            Ok::<_, search_core::SearchError>((pages, start))
        };

        tokio::select! {
            outcome = paging => {
                let (pages, total) = outcome?;
                println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                println!(
                    "✨ 共 {} 页, {} 条, 耗时 {:.2?}, 最终总数 {}",
                    pages,
                    total,
                    started.elapsed(),
                    format_size(results.size().await?)
                );
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n⏹️  收到中断，取消所有活动搜索...");
                coordinator.cancel_all_active_searches().await;
                if let Some(uuid) = results.uuid() {
                    println!("   搜索 {} 已标记为取消", uuid);
                }
            }
        }

        Ok(())
    }
}
