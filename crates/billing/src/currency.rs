//! Currency conversion against a static exchange-rate table
//!
//! Rates are quoted against a single base currency (USD). Converting between
//! two non-base currencies first normalises to the base and then applies the
//! target rate. All arithmetic stays in `Decimal`.

use ledgerline_shared::{Currency, Money};
use rust_decimal::Decimal;

use crate::error::{BillingError, BillingResult};

/// Currency every rate in the table is quoted against
pub const BASE_CURRENCY: Currency = Currency::Usd;

/// Units of `currency` per one unit of the base currency, or `None` when the
/// table has no entry (the base currency itself has no entry either)
pub fn exchange_rate(currency: Currency) -> Option<Decimal> {
    match currency {
        Currency::Ngn => Some(Decimal::new(38050, 2)),
        Currency::Sek => Some(Decimal::new(864, 2)),
        Currency::Dkk => Some(Decimal::new(619, 2)),
        Currency::Eur => Some(Decimal::new(83, 2)),
        Currency::Gbp => Some(Decimal::new(72, 2)),
        Currency::Usd => None,
    }
}

/// Convert `amount` into `target`, returning the converted value.
///
/// Same-currency conversion returns the value untouched. A missing rate for
/// either side fails with `RateUnavailable` naming that currency.
pub fn convert(amount: Money, target: Currency) -> BillingResult<Decimal> {
    if amount.currency == target {
        return Ok(amount.value);
    }

    let target_rate = exchange_rate(target).ok_or(BillingError::RateUnavailable(target))?;

    let mut base_value = amount.value;
    if amount.currency != BASE_CURRENCY {
        let source_rate = exchange_rate(amount.currency)
            .ok_or(BillingError::RateUnavailable(amount.currency))?;
        base_value = base_value
            .checked_div(source_rate)
            .ok_or_else(|| BillingError::InvalidAmount(format!("cannot convert {}", amount)))?;
    }

    base_value
        .checked_mul(target_rate)
        .ok_or_else(|| BillingError::InvalidAmount(format!("cannot convert {}", amount)))
}

/// Convenience wrapper returning `Money` in the target currency
pub fn convert_money(amount: Money, target: Currency) -> BillingResult<Money> {
    Ok(Money::new(convert(amount, target)?, target))
}
