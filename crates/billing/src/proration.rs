//! Proration and billing calendar helpers
//!
//! Partial periods are priced with a fixed 30-day month: the daily rate is
//! the monthly amount divided by 30 regardless of the actual month length.

use ledgerline_shared::Money;
use rust_decimal::Decimal;
use time::{Date, OffsetDateTime, Time};

use crate::error::{BillingError, BillingResult};

/// Days in the approximated billing month
pub const PRORATION_MONTH_DAYS: i64 = 30;

/// Price `days` worth of a monthly amount, in the same currency.
///
/// Zero days is valid and yields a zero amount; negative day counts are rejected.
pub fn prorate(monthly_amount: Money, days: i64) -> BillingResult<Money> {
    if days < 0 {
        return Err(BillingError::InvalidInput(format!(
            "cannot prorate a negative day count ({})",
            days
        )));
    }

    // monthly / 30 * days, multiplied first so whole months stay exact
    let value = monthly_amount
        .value
        .checked_mul(Decimal::from(days))
        .and_then(|v| v.checked_div(Decimal::from(PRORATION_MONTH_DAYS)))
        .ok_or_else(|| BillingError::InvalidAmount(format!("{} over {} days", monthly_amount, days)))?;

    Ok(Money::new(value, monthly_amount.currency))
}

/// Whole days elapsed from `start` to `end`, truncated; never negative
pub fn whole_days_between(start: OffsetDateTime, end: OffsetDateTime) -> i64 {
    (end - start).whole_days().max(0)
}

/// Human-readable description for a prorated invoice
pub fn partial_charge_description(days: i64) -> String {
    let mut description = format!("Partial subscription charge for {} day", days);
    if days > 1 {
        description.push('s');
    }
    description
}

/// Midnight (UTC) on the first day of the month containing `at`
pub fn start_of_month(at: OffsetDateTime) -> BillingResult<OffsetDateTime> {
    let at = at.to_offset(time::UtcOffset::UTC);
    let first = Date::from_calendar_date(at.year(), at.month(), 1)
        .map_err(|e| BillingError::Internal(e.to_string()))?;
    Ok(first.with_time(Time::MIDNIGHT).assume_utc())
}

/// Midnight (UTC) on the last day of the month containing `at`
pub fn end_of_month(at: OffsetDateTime) -> BillingResult<OffsetDateTime> {
    let at = at.to_offset(time::UtcOffset::UTC);
    let last_day = time::util::days_in_year_month(at.year(), at.month());
    let last = Date::from_calendar_date(at.year(), at.month(), last_day)
        .map_err(|e| BillingError::Internal(e.to_string()))?;
    Ok(last.with_time(Time::MIDNIGHT).assume_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerline_shared::Currency;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    #[test]
    fn test_full_month_is_full_amount() {
        let monthly = Money::new(dec!(5000), Currency::Usd);
        assert_eq!(prorate(monthly, 30).unwrap(), Money::new(dec!(5000), Currency::Usd));
    }

    #[test]
    fn test_zero_days_is_zero_amount() {
        let monthly = Money::new(dec!(3000), Currency::Usd);
        assert_eq!(prorate(monthly, 0).unwrap(), Money::zero(Currency::Usd));
    }

    #[test]
    fn test_partial_period_keeps_currency() {
        let monthly = Money::new(dec!(3000), Currency::Ngn);
        assert_eq!(prorate(monthly, 11).unwrap(), Money::new(dec!(1100), Currency::Ngn));
    }

    #[test]
    fn test_negative_days_rejected() {
        let monthly = Money::new(dec!(3000), Currency::Usd);
        assert!(matches!(prorate(monthly, -1), Err(BillingError::InvalidInput(_))));
    }

    #[test]
    fn test_whole_days_truncates() {
        let start = datetime!(2024-05-01 10:00 UTC);
        let end = datetime!(2024-05-12 09:59 UTC);
        assert_eq!(whole_days_between(start, end), 10);
        assert_eq!(whole_days_between(end, start), 0);
    }

    #[test]
    fn test_description_pluralises() {
        assert_eq!(partial_charge_description(1), "Partial subscription charge for 1 day");
        assert_eq!(partial_charge_description(11), "Partial subscription charge for 11 days");
    }

    #[test]
    fn test_month_bounds() {
        let at = datetime!(2024-02-19 15:30 UTC);
        assert_eq!(start_of_month(at).unwrap(), datetime!(2024-02-01 0:00 UTC));
        assert_eq!(end_of_month(at).unwrap(), datetime!(2024-02-29 0:00 UTC));
    }
}
