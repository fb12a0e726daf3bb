//! Payment gateway contract
//!
//! The orchestrator only ever talks to a [`PaymentGateway`]. The Stripe-backed
//! implementation lives in [`crate::client`]; [`OfflineGateway`] is used when no
//! provider credentials are configured.

use std::collections::HashMap;

use async_trait::async_trait;
use ledgerline_shared::Currency;
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};

/// Metadata key carrying our invoice id on provider payments
pub const META_INVOICE_ID: &str = "invoice_id";

/// Metadata key carrying our customer id on provider customers
pub const META_CUSTOMER_ID: &str = "customer_id";

/// A single charge against a stored payment method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    /// Amount in the currency's minor unit (value * 100)
    pub amount_minor: i64,
    pub currency: Currency,
    /// Customer reference at the provider, if one has been linked
    pub customer_reference: Option<String>,
    pub payment_method: String,
    pub invoice_id: i64,
    pub idempotency_key: String,
}

impl ChargeRequest {
    /// Correlation metadata attached to the provider payment
    pub fn metadata(&self) -> HashMap<String, String> {
        let mut meta = HashMap::new();
        meta.insert(META_INVOICE_ID.to_string(), self.invoice_id.to_string());
        meta
    }
}

/// Request to start collecting a payment method for a customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSetupRequest {
    pub customer_id: i64,
    /// Existing provider customer reference; one is created when absent
    pub customer_reference: Option<String>,
}

/// Provider handle for an in-progress payment method setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSetup {
    pub reference: String,
    pub client_secret: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge the request. `Ok(true)` when the provider accepted the payment,
    /// `Ok(false)` when it was declined. Errors are reserved for transport or
    /// provider faults that are not a decline.
    async fn charge(&self, request: &ChargeRequest) -> BillingResult<bool>;

    async fn init_payment_setup(&self, request: &PaymentSetupRequest)
        -> BillingResult<PaymentSetup>;
}

/// Gateway used when no provider is configured: every charge is declined.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGateway;

#[async_trait]
impl PaymentGateway for OfflineGateway {
    async fn charge(&self, request: &ChargeRequest) -> BillingResult<bool> {
        tracing::warn!(
            invoice_id = request.invoice_id,
            amount_minor = request.amount_minor,
            currency = %request.currency,
            "No payment provider configured, declining charge"
        );
        Ok(false)
    }

    async fn init_payment_setup(
        &self,
        request: &PaymentSetupRequest,
    ) -> BillingResult<PaymentSetup> {
        Err(BillingError::PaymentSetupFailed(format!(
            "no payment provider configured for customer {}",
            request.customer_id
        )))
    }
}
