use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ParseEnumError;

/// Currencies a customer can be billed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Ngn,
    Sek,
    Dkk,
    Eur,
    Gbp,
}

impl Currency {
    pub const ALL: [Currency; 6] = [
        Currency::Usd,
        Currency::Ngn,
        Currency::Sek,
        Currency::Dkk,
        Currency::Eur,
        Currency::Gbp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Ngn => "NGN",
            Currency::Sek => "SEK",
            Currency::Dkk => "DKK",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Currency {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "NGN" => Ok(Currency::Ngn),
            "SEK" => Ok(Currency::Sek),
            "DKK" => Ok(Currency::Dkk),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            _ => Err(ParseEnumError::new("currency", s)),
        }
    }
}

/// An exact monetary amount in a given currency.
///
/// Values are `Decimal`, never floats, so repeated conversion and proration
/// does not drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub value: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            value: Decimal::ZERO,
            currency,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_parse_is_case_insensitive() {
        assert_eq!("ngn".parse::<Currency>().unwrap(), Currency::Ngn);
        assert_eq!("Eur".parse::<Currency>().unwrap(), Currency::Eur);
        assert!("JPY".parse::<Currency>().is_err());
    }

    #[test]
    fn test_currency_round_trips_through_as_str() {
        for currency in Currency::ALL {
            assert_eq!(currency.as_str().parse::<Currency>().unwrap(), currency);
        }
    }

    #[test]
    fn test_money_serializes_currency_uppercase() {
        let money = Money::new(dec!(5000), Currency::Ngn);
        let json = serde_json::to_value(money).unwrap();
        assert_eq!(json["currency"], "NGN");
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::new(dec!(12.50), Currency::Usd).to_string(), "12.50 USD");
    }
}
