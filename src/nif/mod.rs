// src/nif/mod.rs

pub mod config;
pub mod dedup;
pub mod error;
pub mod export;
pub mod host;
pub mod names;
pub mod palette;
pub mod registry;
pub mod scale;
pub mod session;
pub mod types;
pub mod version;
pub mod writer;
