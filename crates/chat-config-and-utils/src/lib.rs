//! Configuration, paths, and logging setup shared by chatsync binaries.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, IdScheme, DEFAULT_BURST_WINDOW_SECS, DEFAULT_LOG_LEVEL, DEFAULT_NEAR_BOTTOM_THRESHOLD,
    DEFAULT_PAGE_LIMIT, DEFAULT_SUPABASE_URL, DEFAULT_TAIL_LIMIT,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
