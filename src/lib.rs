pub mod cache;
pub mod cancel;
pub mod config;
pub mod database;
pub mod error;
pub mod http;
pub mod pattern;
pub mod remote;
pub mod runtime;
pub mod search;
pub mod state;
