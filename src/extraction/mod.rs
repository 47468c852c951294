pub mod anomaly;
pub mod extractor;
pub mod lexicon;
pub mod page_text;
pub mod selector;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use anomaly::is_challenge_page;
pub use extractor::PriceExtractor;
pub use page_text::result_text;
pub use selector::select_best;

/// Tunables for price extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Characters of padding captured either side of a match.
    pub context_window: usize,
    /// Values of one currency closer than this are treated as the same price.
    pub dedup_epsilon: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            context_window: 6,
            dedup_epsilon: Decimal::new(9, 3),
            min_price: Decimal::ONE,
            max_price: Decimal::from(100_000_000u64),
        }
    }
}
