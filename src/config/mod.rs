//! Configuration and path management for Stockpile

pub mod paths;
pub mod settings;

pub use paths::StockpilePaths;
pub use settings::{RetentionPolicy, Settings};
