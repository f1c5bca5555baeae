//! CLI command implementations.

mod ask;
mod chat;
mod config;
mod history;
mod ingest;
mod list;
mod remove;
mod search;
mod serve;
mod show;
mod themes;

pub use ask::run_ask;
pub use chat::run_chat;
pub use config::run_config;
pub use history::run_history;
pub use ingest::run_ingest;
pub use list::run_list;
pub use remove::run_remove;
pub use search::run_search;
pub use serve::run_serve;
pub use show::run_show;
pub use themes::run_themes;
