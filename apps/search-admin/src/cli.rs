use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase verbosity. Can be used multiple times (e.g., -v, -vv, -vvv).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 登记一个合成搜索并逐页读取结果
    Simulate {
        /// 第一个标识符
        #[arg(long, default_value_t = 0)]
        from: i64,
        /// 最后一个标识符（不含）
        #[arg(long, default_value_t = 1000)]
        to: i64,
        /// 每个标识符的生成延迟（毫秒）
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
        /// 每页大小
        #[arg(long, default_value_t = 100)]
        page_size: usize,
        /// 同步执行
        #[arg(long)]
        sync: bool,
        /// 不复用已有搜索
        #[arg(long)]
        no_cache: bool,
    },
    /// 列出缓存中的搜索记录
    Inspect {
        /// 只显示该 uuid 的记录
        uuid: Option<String>,
        /// 最多显示多少条
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// 按 uuid 读取已有搜索的一页结果
    Fetch {
        uuid: String,
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(long, default_value_t = 20)]
        end: usize,
    },
    /// 清除搜索缓存
    ClearCache,
}
