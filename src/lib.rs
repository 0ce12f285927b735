//! serpwatch - distributed search result page monitoring.
//!
//! Core library: keyword partitioning across a fleet of servers, a resilient
//! upstream fetcher with a shared identity blacklist, per-keyword extraction,
//! and exactly-once report dispatch once every shard has reported.

pub mod app;
pub mod catalog;
pub mod completion;
pub mod config;
pub mod coordination;
pub mod crawler;
pub mod diagnostics;
pub mod dispatch;
pub mod http_client;
pub mod identity;
pub mod models;
pub mod orchestrator;
pub mod partition;
pub mod report;
pub mod repository;
pub mod scheduler;
pub mod schema;
pub mod server;
