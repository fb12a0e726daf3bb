use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{Currency, ParseEnumError};

/// Account standing of a customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CustomerStatus {
    #[default]
    Active,
    Inactive,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::Active => "ACTIVE",
            CustomerStatus::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CustomerStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(CustomerStatus::Active),
            "INACTIVE" => Ok(CustomerStatus::Inactive),
            _ => Err(ParseEnumError::new("customer status", s)),
        }
    }
}

/// A billed customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub currency: Currency,
    pub status: CustomerStatus,
    /// Customer reference at the payment provider
    pub stripe_id: Option<String>,
    /// Stored payment method charged by the billing runs
    pub default_payment_method_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl Customer {
    pub fn is_active(&self) -> bool {
        self.status == CustomerStatus::Active
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Partial update for a customer; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerUpdate {
    pub status: Option<CustomerStatus>,
    pub currency: Option<Currency>,
    pub stripe_id: Option<String>,
    pub default_payment_method_id: Option<String>,
    pub deleted: bool,
}

impl CustomerUpdate {
    pub fn status(status: CustomerStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn deactivate() -> Self {
        Self::status(CustomerStatus::Inactive)
    }

    pub fn soft_delete() -> Self {
        Self {
            deleted: true,
            ..Default::default()
        }
    }

    /// Apply the update in place, stamping `updated_at` (and `deleted_at` if requested)
    pub fn apply_to(&self, customer: &mut Customer, now: OffsetDateTime) {
        if let Some(status) = self.status {
            customer.status = status;
        }
        if let Some(currency) = self.currency {
            customer.currency = currency;
        }
        if let Some(stripe_id) = &self.stripe_id {
            customer.stripe_id = Some(stripe_id.clone());
        }
        if let Some(method) = &self.default_payment_method_id {
            customer.default_payment_method_id = Some(method.clone());
        }
        if self.deleted {
            customer.deleted_at = Some(now);
        }
        customer.updated_at = now;
    }
}
