pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod pagination;
pub mod redis_pool;
pub mod tasks;
pub mod types;
