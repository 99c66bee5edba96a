pub mod builder;
pub mod codec;
pub mod collectors;
pub mod config;
pub mod consumer;
pub mod merger;
pub mod snapshot;
pub mod source;
pub mod types;
