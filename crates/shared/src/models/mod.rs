//! Billing domain model

mod customer;
mod invoice;
mod money;
mod subscription;

pub use customer::{Customer, CustomerStatus, CustomerUpdate};
pub use invoice::{Invoice, InvoiceFilter, InvoiceStatus, InvoiceUpdate};
pub use money::{Currency, Money};
pub use subscription::{Subscription, SubscriptionPlan, SubscriptionPlanUpdate, SubscriptionUpdate};

/// Returned when a persisted enum value is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
