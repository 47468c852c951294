use regex::{Captures, Regex};
use rust_decimal::Decimal;
use std::str::FromStr;

use super::lexicon;
use super::ExtractionSettings;
use crate::models::{Currency, GroupedPrices, PriceObservation};
use crate::Result;

/// Digit-group separators: space, no-break space, narrow no-break space.
const GROUP_SEPARATORS: [char; 3] = [' ', '\u{00A0}', '\u{202F}'];

const NUMBER: &str = r"[0-9]{1,3}(?:[ \x{00A0}\x{202F}]?[0-9]{3})*(?:[.,][0-9]{2})?";
const LEFT_MARKER: &str = r"[€$₽₴₸]|\b(?:usd|eur|byn)\b";
const RIGHT_MARKER: &str = r"[€$₽₴₸]|руб(?:\.|лей)?\b|грн\b|тенге\b|byn\b|usd\b|eur\b";

/// Finds currency-tagged numbers in plain text and groups them by currency.
#[derive(Debug, Clone)]
pub struct PriceExtractor {
    pattern: Regex,
    settings: ExtractionSettings,
}

impl PriceExtractor {
    pub fn new(settings: ExtractionSettings) -> Result<Self> {
        // groups: 1 = left marker, 2 = number after it, 3 = number, 4 = right marker
        let pattern = Regex::new(&format!(
            r"(?i)(?:({LEFT_MARKER}) ?({NUMBER})|({NUMBER}) ?({RIGHT_MARKER}))"
        ))?;
        Ok(Self { pattern, settings })
    }

    pub fn settings(&self) -> &ExtractionSettings {
        &self.settings
    }

    /// Every parseable positive number+currency match, in text order.
    pub fn scan(&self, text: &str) -> Vec<PriceObservation> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| self.observe(text, &caps))
            .collect()
    }

    /// Scans `text` and folds the observations into deduplicated,
    /// range-filtered currency groups.
    pub fn extract(&self, text: &str) -> GroupedPrices {
        let mut grouped = GroupedPrices::empty();

        for observation in self.scan(text) {
            let group = grouped.get_mut(observation.currency);
            let duplicate = group
                .values
                .iter()
                .any(|v| (*v - observation.value).abs() < self.settings.dedup_epsilon);
            if !duplicate {
                group.values.push(observation.value);
                group.samples.push(observation.context);
            }
        }

        for group in grouped.iter_mut() {
            let (values, samples): (Vec<_>, Vec<_>) = group
                .values
                .drain(..)
                .zip(group.samples.drain(..))
                .filter(|(v, _)| *v >= self.settings.min_price && *v <= self.settings.max_price)
                .unzip();
            group.values = values;
            group.samples = samples;
        }

        grouped
    }

    fn observe(&self, text: &str, caps: &Captures<'_>) -> Option<PriceObservation> {
        let whole = caps.get(0)?;
        let number = caps.get(2).or_else(|| caps.get(3))?;
        let value = parse_amount(number.as_str())?;

        let (start, end) = context_bounds(text, whole.start(), whole.end(), self.settings.context_window);
        let context = text[start..end].replace(['\r', '\n'], " ").trim().to_string();

        let marker = caps.get(1).or_else(|| caps.get(4)).map(|m| m.as_str()).unwrap_or("");
        let currency = match lexicon::classify(marker) {
            Currency::Unk => lexicon::classify(&context),
            currency => currency,
        };

        Some(PriceObservation { value, currency, context })
    }
}

/// Normalises a matched numeric literal and parses it. Returns `None` for
/// unparseable or non-positive amounts.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut digits: String = raw.chars().filter(|c| !GROUP_SEPARATORS.contains(c)).collect();

    let bytes = digits.as_bytes();
    let len = bytes.len();
    if len >= 3 && bytes[len - 3] == b',' && bytes[len - 2].is_ascii_digit() && bytes[len - 1].is_ascii_digit() {
        digits.replace_range(len - 3..len - 2, ".");
    }

    let value = Decimal::from_str(&digits).ok()?;
    (value > Decimal::ZERO).then_some(value)
}

/// Byte range covering `width` characters either side of `start..end`.
fn context_bounds(text: &str, start: usize, end: usize, width: usize) -> (usize, usize) {
    let left = if width == 0 {
        start
    } else {
        text[..start]
            .char_indices()
            .rev()
            .take(width)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(start)
    };
    let right = text[end..]
        .char_indices()
        .nth(width)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    (left, right)
}
