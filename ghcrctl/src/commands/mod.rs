/// Config command handlers
pub mod config;

/// Stats command handler
pub mod stats;

/// Tag command handlers
pub mod tag;

/// Version command handlers
pub mod version;
