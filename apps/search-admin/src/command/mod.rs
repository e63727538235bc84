pub mod clear_cache;
pub mod fetch;
pub mod inspect;
pub mod simulate;

use std::sync::Arc;

use search_core::{EngineRegistry, PersistentSearchCache, SearchCoordinator};

use crate::config::Config;
use crate::error::{Result, WrapErr};
use crate::synthetic::{RESOURCE_TYPE, SyntheticEngine, SyntheticResource};

pub use clear_cache::ClearCacheCommand;
pub use fetch::FetchCommand;
pub use inspect::InspectCommand;
pub use simulate::SimulateCommand;

#[async_trait::async_trait]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

fn open_cache(config: &Config) -> Result<Arc<PersistentSearchCache>> {
    let path = config.search_cache_path();
    let cache = PersistentSearchCache::open(&path)
        .wrap_err_with(|| format!("无法打开搜索缓存 {:?}", path))?;
    Ok(Arc::new(cache))
}

fn open_coordinator(config: &Config) -> Result<SearchCoordinator<SyntheticResource>> {
    let cache = open_cache(config)?;
    let engines = EngineRegistry::new().register(RESOURCE_TYPE, Arc::new(SyntheticEngine));
    Ok(SearchCoordinator::with_cache(
        config.coordinator.clone(),
        engines,
        cache,
    ))
}

fn format_size(size: Option<usize>) -> String {
    match size {
        Some(n) => n.to_string(),
        None => "未知（仍在加载）".to_string(),
    }
}
