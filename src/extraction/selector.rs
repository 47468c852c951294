use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{CurrencyGroup, GroupedPrices, TaskResult};

/// Number of context snippets carried into a [`TaskResult`].
pub const SAMPLE_PREVIEW: usize = 5;

/// Picks the currency with the most retained values and summarises it.
///
/// Ties go to the group that comes first in lexicon order. Returns `None`
/// when no group has any value.
pub fn select_best(grouped: &GroupedPrices) -> Option<TaskResult> {
    let mut best: Option<&CurrencyGroup> = None;
    for group in grouped.iter().filter(|g| !g.is_empty()) {
        match best {
            Some(current) if group.len() <= current.len() => {}
            _ => best = Some(group),
        }
    }
    let group = best?;

    let min = group.values.iter().copied().min()?;
    let max = group.values.iter().copied().max()?;
    let sum: Decimal = group.values.iter().copied().sum();
    let avg = (sum / Decimal::from(group.values.len()))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    Some(TaskResult {
        min,
        max,
        avg,
        currency: group.currency,
        samples: group.samples.iter().take(SAMPLE_PREVIEW).cloned().collect(),
    })
}
