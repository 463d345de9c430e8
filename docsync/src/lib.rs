pub mod backend;
pub mod cli;
pub mod load_config;
pub mod markdown;
