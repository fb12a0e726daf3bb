use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{Money, ParseEnumError};

/// Lifecycle state of an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Processing,
    Paid,
    Failed,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Processing => "PROCESSING",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(InvoiceStatus::Pending),
            "PROCESSING" => Ok(InvoiceStatus::Processing),
            "PAID" => Ok(InvoiceStatus::Paid),
            "FAILED" => Ok(InvoiceStatus::Failed),
            _ => Err(ParseEnumError::new("invoice status", s)),
        }
    }
}

/// One billing obligation for a customer's subscription period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub customer_id: i64,
    pub subscription_id: i64,
    pub amount: Money,
    pub status: InvoiceStatus,
    /// Provider payment reference, set once the provider accepts a payment
    pub payment_ref: Option<String>,
    pub description: Option<String>,
    /// Unset until the first declined charge
    pub number_of_failed_charges: Option<i32>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_failed_charge: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub charge_start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub charge_end_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl Invoice {
    pub fn failed_charges(&self) -> i32 {
        self.number_of_failed_charges.unwrap_or(0)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Partial update for an invoice; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceUpdate {
    pub amount: Option<Money>,
    pub status: Option<InvoiceStatus>,
    pub payment_ref: Option<String>,
    pub description: Option<String>,
    pub number_of_failed_charges: Option<i32>,
    pub last_failed_charge: Option<OffsetDateTime>,
    pub charge_start_date: Option<OffsetDateTime>,
    pub charge_end_date: Option<OffsetDateTime>,
    pub deleted: bool,
}

impl InvoiceUpdate {
    /// Record a declined charge attempt on top of the invoice's current counter
    pub fn failed_charge(invoice: &Invoice, at: OffsetDateTime) -> Self {
        Self {
            status: Some(InvoiceStatus::Failed),
            number_of_failed_charges: Some(invoice.failed_charges() + 1),
            last_failed_charge: Some(at),
            ..Default::default()
        }
    }

    /// Provider confirmed a payment (or reported it as in flight)
    pub fn payment(status: InvoiceStatus, payment_ref: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            payment_ref: Some(payment_ref.into()),
            ..Default::default()
        }
    }

    /// Apply the update in place, stamping `updated_at` (and `deleted_at` if requested)
    pub fn apply_to(&self, invoice: &mut Invoice, now: OffsetDateTime) {
        if let Some(amount) = self.amount {
            invoice.amount = amount;
        }
        if let Some(status) = self.status {
            invoice.status = status;
        }
        if let Some(payment_ref) = &self.payment_ref {
            invoice.payment_ref = Some(payment_ref.clone());
        }
        if let Some(description) = &self.description {
            invoice.description = Some(description.clone());
        }
        if let Some(count) = self.number_of_failed_charges {
            invoice.number_of_failed_charges = Some(count);
        }
        if let Some(at) = self.last_failed_charge {
            invoice.last_failed_charge = Some(at);
        }
        if let Some(start) = self.charge_start_date {
            invoice.charge_start_date = start;
        }
        if let Some(end) = self.charge_end_date {
            invoice.charge_end_date = end;
        }
        if self.deleted {
            invoice.deleted_at = Some(now);
        }
        invoice.updated_at = now;
    }
}

/// Selection criteria for listing invoices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceFilter {
    /// `false` selects live invoices, `true` selects soft-deleted ones
    pub deleted: bool,
    /// Restrict to these statuses; `None` means any status
    pub statuses: Option<Vec<InvoiceStatus>>,
    pub customer_id: Option<i64>,
}

impl InvoiceFilter {
    /// Every non-deleted invoice regardless of status
    pub fn active() -> Self {
        Self::default()
    }

    /// Non-deleted invoices that still need collecting
    pub fn unpaid() -> Self {
        Self {
            statuses: Some(vec![InvoiceStatus::Pending, InvoiceStatus::Failed]),
            ..Default::default()
        }
    }

    /// Non-deleted invoices whose last charge was declined
    pub fn failed() -> Self {
        Self::with_status(InvoiceStatus::Failed)
    }

    pub fn with_status(status: InvoiceStatus) -> Self {
        Self {
            statuses: Some(vec![status]),
            ..Default::default()
        }
    }

    pub fn for_customer(mut self, customer_id: i64) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        if invoice.is_deleted() != self.deleted {
            return false;
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&invoice.status) {
                return false;
            }
        }
        if let Some(customer_id) = self.customer_id {
            if invoice.customer_id != customer_id {
                return false;
            }
        }
        true
    }
}
