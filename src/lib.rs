pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod favorites;
pub mod logging;
pub mod pagination;
pub mod query;
pub mod render;
pub mod state;
pub mod utils;
