pub mod auth;
pub mod config;
pub mod engine;
pub mod feed;
pub mod lottery;
pub mod pipeline;
pub mod recommend;
pub mod scheduler;
pub mod settlement;
pub mod store;
pub mod tui;
