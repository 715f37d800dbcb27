pub mod config;
pub mod dispatch;
pub mod error;
pub mod formatter;
pub mod loader;
pub mod master;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod storage;
pub mod transform;
pub mod utils;
pub mod warehouse;
