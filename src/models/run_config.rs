use serde::{Deserialize, Serialize};

pub const DEFAULT_ENGINE: &str = "google";
pub const DEFAULT_DELAY_MS: u64 = 8000;
pub const DEFAULT_LIMIT: usize = 100;
pub const DEFAULT_LOCALE: &str = "ru";

/// Configuration fixed for the lifetime of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Search engine id, see [`crate::search::SearchEngine`].
    pub engine: String,
    pub delay_ms: u64,
    pub use_quotes: bool,
    /// Maximum number of items taken from a start request; 0 takes all.
    pub limit_count: usize,
    /// Interface language (`hl`) for engines that accept one.
    pub locale_hl: String,
    /// Result region (`gl`) for engines that accept one.
    pub locale_gl: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            delay_ms: DEFAULT_DELAY_MS,
            use_quotes: true,
            limit_count: DEFAULT_LIMIT,
            locale_hl: DEFAULT_LOCALE.to_string(),
            locale_gl: DEFAULT_LOCALE.to_string(),
        }
    }
}

impl RunConfig {
    /// Replaces zero and blank fields with the built-in defaults.
    pub fn normalized(mut self) -> Self {
        if self.engine.trim().is_empty() {
            self.engine = DEFAULT_ENGINE.to_string();
        }
        if self.delay_ms == 0 {
            self.delay_ms = DEFAULT_DELAY_MS;
        }
        if self.locale_hl.trim().is_empty() {
            self.locale_hl = DEFAULT_LOCALE.to_string();
        }
        if self.locale_gl.trim().is_empty() {
            self.locale_gl = DEFAULT_LOCALE.to_string();
        }
        self
    }

    /// Takes the leading `limit_count` items, or all of them when the limit is 0.
    pub fn limit_items(&self, items: Vec<String>) -> Vec<String> {
        if self.limit_count == 0 {
            return items;
        }
        items.into_iter().take(self.limit_count).collect()
    }
}

/// Per-start overrides layered over the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub engine: Option<String>,
    pub delay_ms: Option<u64>,
    pub use_quotes: Option<bool>,
    pub limit_count: Option<usize>,
    pub locale_hl: Option<String>,
    pub locale_gl: Option<String>,
}

impl RunOptions {
    pub fn resolve(self, base: &RunConfig) -> RunConfig {
        RunConfig {
            engine: self.engine.unwrap_or_else(|| base.engine.clone()),
            delay_ms: self.delay_ms.unwrap_or(base.delay_ms),
            use_quotes: self.use_quotes.unwrap_or(base.use_quotes),
            limit_count: self.limit_count.unwrap_or(base.limit_count),
            locale_hl: self.locale_hl.unwrap_or_else(|| base.locale_hl.clone()),
            locale_gl: self.locale_gl.unwrap_or_else(|| base.locale_gl.clone()),
        }
        .normalized()
    }
}
