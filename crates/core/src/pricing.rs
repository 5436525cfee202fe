//! Checkout total computation and minor-unit formatting.

use crate::error::CoreError;
use crate::types::MinorUnits;

/// Sum the given prices, rejecting negative entries and overflow.
pub fn checkout_total<I>(prices: I) -> Result<MinorUnits, CoreError>
where
    I: IntoIterator<Item = MinorUnits>,
{
    prices.into_iter().try_fold(0, |acc: MinorUnits, price| {
        if price < 0 {
            return Err(CoreError::Validation(format!("negative price {price}")));
        }
        acc.checked_add(price)
            .ok_or_else(|| CoreError::Validation("checkout total overflows".into()))
    })
}

/// Format minor units as a decimal amount with two fraction digits,
/// e.g. `1999` -> `"19.99"`.
pub fn format_minor_units(amount: MinorUnits) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
