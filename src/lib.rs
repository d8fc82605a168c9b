pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod filter;
pub mod handlers;
pub mod logging;
pub mod masking;
pub mod output;
pub mod query;
pub mod reader;
pub mod records;
pub mod server;
pub mod tables;
pub mod volumes;
