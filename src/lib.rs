pub mod aggregate;
pub mod chunked;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod output;
pub mod scanner;
pub mod source;
pub mod store;
pub mod sync;
pub mod tui;
