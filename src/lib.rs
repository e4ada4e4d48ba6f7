//! SimSearch: multi-attribute similarity search with top-k rank aggregation.

pub mod aggregator;
pub mod assembler;
pub mod catalog;
pub mod config;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod search;
pub mod server;
pub mod similarity;
pub mod source;
pub mod types;
