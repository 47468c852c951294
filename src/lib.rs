pub mod config;
pub mod events;
pub mod extraction;
pub mod models;
pub mod persistence;
pub mod scheduler;
pub mod scraper;
pub mod search;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use config::AppConfig;
pub use events::{EventBus, QueueEvent};
pub use extraction::{ExtractionSettings, PriceExtractor};
pub use models::*;
pub use persistence::{MemoryStateStore, SqliteStateStore, StateStore};
pub use scheduler::{QueueScheduler, QueueSettings, SchedulerHandle};
pub use scraper::{ChromeNavigator, NavigationProvider, PageExtraction, PageHandle};
pub use utils::error::{AppError, Result};
