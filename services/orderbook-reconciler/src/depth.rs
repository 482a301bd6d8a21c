//! Cumulative depth totals
//!
//! Annotates each level with the running sum of quantity from the best price
//! through itself. The side's maximum total is the last level's total, floored
//! at one so that depth-bar percentages never divide by zero. Totals clamp at
//! `Decimal::MAX`.

use rust_decimal::Decimal;
use types::level::PriceLevel;
use types::numeric::Quantity;

/// Return `levels` with every `total` recomputed as a running sum.
pub fn with_cumulative_totals(levels: &[PriceLevel]) -> Vec<PriceLevel> {
    let mut cumulative = Quantity::ZERO;
    levels
        .iter()
        .map(|level| {
            cumulative = cumulative.saturating_add(level.quantity);
            level.with_total(cumulative)
        })
        .collect()
}

/// Maximum cumulative total of an annotated side, never below one.
pub fn max_cumulative_total(levels: &[PriceLevel]) -> Decimal {
    match levels.last() {
        Some(last) if last.total.as_decimal() > Decimal::ZERO => last.total.as_decimal(),
        _ => Decimal::ONE,
    }
}

/// Share of `max_total` reached by each level's cumulative total, in percent.
///
/// A non-positive `max_total` yields zero for every level. Shares too large
/// for a `Decimal` clamp at `Decimal::MAX`.
pub fn depth_percentages(levels: &[PriceLevel], max_total: Decimal) -> Vec<Decimal> {
    levels
        .iter()
        .map(|level| {
            if max_total > Decimal::ZERO {
                level
                    .total
                    .as_decimal()
                    .checked_div(max_total)
                    .and_then(|share| share.checked_mul(Decimal::ONE_HUNDRED))
                    .unwrap_or(Decimal::MAX)
            } else {
                Decimal::ZERO
            }
        })
        .collect()
}
