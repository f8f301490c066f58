pub mod cli;
pub mod credentials;
pub mod file_store;
pub mod http;
pub mod load_config;
pub mod notify;

pub use cli::{run, Cli, Commands};
