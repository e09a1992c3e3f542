// Configuration loading

pub mod settings;

pub use settings::{ConfigError, FileSettings, OutputSettings, Settings, SqliteSettings};
