//! Billing error types

use ledgerline_shared::{Currency, ParseEnumError};
use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Clone, Error)]
pub enum BillingError {
    #[error("No payment method found for customer {customer_id}")]
    NoPaymentMethod { customer_id: i64 },

    #[error("Customer {0} has no active subscriptions")]
    NoActiveSubscription(i64),

    #[error("{0} exchange rate is unavailable")]
    RateUnavailable(Currency),

    #[error("Invoice {0} not found")]
    InvoiceNotFound(i64),

    #[error("Customer {0} not found")]
    CustomerNotFound(i64),

    #[error("Subscription {0} not found")]
    SubscriptionNotFound(i64),

    #[error("Subscription plan {0} not found")]
    PlanNotFound(i64),

    #[error("Unable to create {0}")]
    CreationFailed(&'static str),

    #[error("Invoice {0} is already being charged")]
    ChargeInProgress(i64),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Payment method setup failed: {0}")]
    PaymentSetupFailed(String),

    #[error("Webhook signature is invalid")]
    WebhookSignatureInvalid,

    #[error("Webhook event not supported: {0}")]
    WebhookEventNotSupported(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Entity lookups that came back empty
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BillingError::InvoiceNotFound(_)
                | BillingError::CustomerNotFound(_)
                | BillingError::SubscriptionNotFound(_)
                | BillingError::PlanNotFound(_)
        )
    }

    /// Expected business conditions the caller can act on (surfaced as 4xx upstream)
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            BillingError::NoPaymentMethod { .. }
                | BillingError::NoActiveSubscription(_)
                | BillingError::RateUnavailable(_)
                | BillingError::ChargeInProgress(_)
                | BillingError::InvalidAmount(_)
                | BillingError::InvalidInput(_)
        )
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

impl From<ParseEnumError> for BillingError {
    fn from(err: ParseEnumError) -> Self {
        BillingError::Database(err.to_string())
    }
}
