pub mod auth;
pub mod cache;
pub mod completion;
pub mod config;
pub mod context;
pub mod gateway;
pub mod rate_limiter;
pub mod storage;
