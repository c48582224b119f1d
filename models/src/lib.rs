#![allow(dead_code)]

pub mod change;
pub mod config;
pub mod health;

pub use change::{IndexedFile, WatchEvent, WatchEventKind};
pub use config::{AppConfig, WatchErrorPolicy, DEFAULT_STATE_DIR};
pub use health::{IndexHealth, IndexState};
