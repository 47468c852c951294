use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Currencies the lexicon can attribute a price to.
///
/// Variant order is the lexicon priority order and doubles as the iteration
/// order of [`GroupedPrices`], which the selector relies on for tie-breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Rub,
    Usd,
    Eur,
    Uah,
    Kzt,
    Byn,
    Unk,
}

impl Currency {
    pub const ALL: [Currency; 7] = [
        Currency::Rub,
        Currency::Usd,
        Currency::Eur,
        Currency::Uah,
        Currency::Kzt,
        Currency::Byn,
        Currency::Unk,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Rub => "RUB",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Uah => "UAH",
            Currency::Kzt => "KZT",
            Currency::Byn => "BYN",
            Currency::Unk => "UNK",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Ok(Currency::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .unwrap_or(Currency::Unk))
    }
}

/// A single number+currency pair found in page text.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    pub value: Decimal,
    pub currency: Currency,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyGroup {
    pub currency: Currency,
    pub values: Vec<Decimal>,
    pub samples: Vec<String>,
}

impl CurrencyGroup {
    pub fn new(currency: Currency) -> Self {
        Self {
            currency,
            values: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Per-page grouping of observations, one entry per lexicon currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupedPrices {
    groups: BTreeMap<Currency, CurrencyGroup>,
}

impl GroupedPrices {
    pub fn empty() -> Self {
        let groups = Currency::ALL
            .into_iter()
            .map(|c| (c, CurrencyGroup::new(c)))
            .collect();
        Self { groups }
    }

    pub fn get(&self, currency: Currency) -> Option<&CurrencyGroup> {
        self.groups.get(&currency)
    }

    pub fn get_mut(&mut self, currency: Currency) -> &mut CurrencyGroup {
        self.groups
            .entry(currency)
            .or_insert_with(|| CurrencyGroup::new(currency))
    }

    /// Groups in lexicon order.
    pub fn iter(&self) -> impl Iterator<Item = &CurrencyGroup> {
        self.groups.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CurrencyGroup> {
        self.groups.values_mut()
    }

    pub fn has_evidence(&self) -> bool {
        self.groups.values().any(|g| !g.is_empty())
    }
}

impl Default for GroupedPrices {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub min: Decimal,
    pub max: Decimal,
    pub avg: Decimal,
    pub currency: Currency,
    pub samples: Vec<String>,
}
