//! Invoice charging
//!
//! [`BillingOrchestrator`] drives the per-invoice charge state machine and the
//! two batch runs built on it:
//!
//! - **Monthly run** (`charge_all_active_invoices`): charges every non-deleted
//!   invoice, whatever its status. Any error on an invoice deactivates its
//!   customer and the run moves on.
//! - **Retry run** (`retry_failed_invoices`): re-charges FAILED invoices and
//!   deactivates the customer whenever the invoice left by the attempt carries
//!   a failure count at or above the configured maximum.
//!
//! A successful charge leaves the invoice as it is; the PAID transition is
//! applied when the provider's payment webhook arrives.

use std::sync::Arc;

use dashmap::DashSet;
use ledgerline_shared::{Invoice, InvoiceFilter, InvoiceUpdate, Money};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use time::OffsetDateTime;

use crate::config::DEFAULT_MAX_CHARGE_RETRIES;
use crate::customer::CustomerService;
use crate::error::{BillingError, BillingResult};
use crate::gateway::{ChargeRequest, PaymentGateway, PaymentSetup, PaymentSetupRequest};
use crate::invoices::InvoiceService;
use crate::store::BillingStore;

/// Convert a major-unit amount into the provider's integer minor units
pub fn to_minor_units(amount: Money) -> BillingResult<i64> {
    amount
        .value
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|v| v.to_i64())
        .ok_or_else(|| BillingError::InvalidAmount(format!("{} does not fit in minor units", amount)))
}

/// Idempotency key for the next charge attempt on an invoice
pub fn idempotency_key(invoice: &Invoice) -> String {
    format!("invoice-{}-attempt-{}", invoice.id, invoice.failed_charges() + 1)
}

/// Result of one provider charge attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Provider accepted the payment; the invoice is returned as it was
    Accepted(Invoice),
    /// Provider declined; the invoice now carries the recorded failure
    Declined(Invoice),
}

impl ChargeOutcome {
    pub fn invoice(&self) -> &Invoice {
        match self {
            ChargeOutcome::Accepted(invoice) | ChargeOutcome::Declined(invoice) => invoice,
        }
    }

    pub fn into_invoice(self) -> Invoice {
        match self {
            ChargeOutcome::Accepted(invoice) | ChargeOutcome::Declined(invoice) => invoice,
        }
    }
}

/// An invoice that could not be charged during a batch run
#[derive(Debug, Clone)]
pub struct InvoiceFailure {
    pub invoice_id: i64,
    pub customer_id: i64,
    pub error: BillingError,
}

/// Outcome of one batch run
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Invoices the provider was called for, as they stand after the attempt
    pub processed: Vec<Invoice>,
    pub failures: Vec<InvoiceFailure>,
    pub deactivated_customers: Vec<i64>,
}

impl BatchReport {
    fn record_failure(&mut self, invoice: &Invoice, error: BillingError) {
        self.failures.push(InvoiceFailure {
            invoice_id: invoice.id,
            customer_id: invoice.customer_id,
            error,
        });
    }

    fn record_deactivation(&mut self, customer_id: i64) {
        if !self.deactivated_customers.contains(&customer_id) {
            self.deactivated_customers.push(customer_id);
        }
    }
}

/// In-process lease on invoices currently being charged.
///
/// Taking a lease on an invoice that is already leased fails with
/// `ChargeInProgress`; the lease is released on drop.
#[derive(Debug, Clone, Default)]
pub struct InvoiceLocks {
    held: Arc<DashSet<i64>>,
}

impl InvoiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, invoice_id: i64) -> BillingResult<InvoiceLease> {
        if !self.held.insert(invoice_id) {
            return Err(BillingError::ChargeInProgress(invoice_id));
        }
        Ok(InvoiceLease {
            invoice_id,
            held: self.held.clone(),
        })
    }

    pub fn is_held(&self, invoice_id: i64) -> bool {
        self.held.contains(&invoice_id)
    }
}

#[derive(Debug)]
pub struct InvoiceLease {
    invoice_id: i64,
    held: Arc<DashSet<i64>>,
}

impl Drop for InvoiceLease {
    fn drop(&mut self) {
        self.held.remove(&self.invoice_id);
    }
}

#[derive(Clone)]
pub struct BillingOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    invoices: InvoiceService,
    customers: CustomerService,
    locks: InvoiceLocks,
    max_charge_retries: i32,
}

impl BillingOrchestrator {
    pub fn new(store: Arc<dyn BillingStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            gateway,
            invoices: InvoiceService::new(store.clone()),
            customers: CustomerService::new(store),
            locks: InvoiceLocks::new(),
            max_charge_retries: DEFAULT_MAX_CHARGE_RETRIES,
        }
    }

    /// Failed charges after which the retry run deactivates the customer.
    ///
    /// Values below 1 are clamped to 1; `BillingConfig::from_env` rejects them
    /// before they get here.
    pub fn with_max_charge_retries(mut self, max_charge_retries: i32) -> Self {
        self.max_charge_retries = max_charge_retries.max(1);
        self
    }

    /// Share a lease table with other orchestrators in the same process
    pub fn with_locks(mut self, locks: InvoiceLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn max_charge_retries(&self) -> i32 {
        self.max_charge_retries
    }

    pub fn locks(&self) -> &InvoiceLocks {
        &self.locks
    }

    /// Start collecting a payment method through the provider
    pub async fn init_payment_method(
        &self,
        request: &PaymentSetupRequest,
    ) -> BillingResult<PaymentSetup> {
        let setup = self.gateway.init_payment_setup(request).await?;
        tracing::info!(
            customer_id = request.customer_id,
            setup_reference = %setup.reference,
            "Payment method setup started"
        );
        Ok(setup)
    }

    /// Charge one invoice on demand.
    ///
    /// Returns the invoice unchanged when the provider accepts, or the updated
    /// FAILED invoice when it declines. A missing payment method is an error and
    /// leaves the invoice untouched.
    pub async fn charge_single_invoice(&self, invoice: &Invoice) -> BillingResult<Invoice> {
        Ok(self.attempt_charge(invoice).await?.into_invoice())
    }

    /// Charge one invoice under its lease, reporting whether the provider accepted
    pub async fn attempt_charge(&self, invoice: &Invoice) -> BillingResult<ChargeOutcome> {
        let _lease = self.locks.acquire(invoice.id)?;

        // The caller's copy may predate a concurrent run; charge from the stored row
        let invoice = self.invoices.fetch(invoice.id).await?;
        let customer = self.customers.fetch(invoice.customer_id).await?;

        let payment_method = customer
            .default_payment_method_id
            .clone()
            .ok_or(BillingError::NoPaymentMethod {
                customer_id: customer.id,
            })?;

        let request = ChargeRequest {
            amount_minor: to_minor_units(invoice.amount)?,
            currency: invoice.amount.currency,
            customer_reference: customer.stripe_id.clone(),
            payment_method,
            invoice_id: invoice.id,
            idempotency_key: idempotency_key(&invoice),
        };

        if self.gateway.charge(&request).await? {
            tracing::info!(
                invoice_id = invoice.id,
                customer_id = customer.id,
                amount = %invoice.amount,
                "Charge accepted"
            );
            return Ok(ChargeOutcome::Accepted(invoice));
        }

        let update = InvoiceUpdate::failed_charge(&invoice, OffsetDateTime::now_utc());
        let updated = self.invoices.update(invoice.id, &update).await?;

        tracing::warn!(
            invoice_id = updated.id,
            customer_id = customer.id,
            failed_charges = updated.failed_charges(),
            "Charge declined"
        );
        Ok(ChargeOutcome::Declined(updated))
    }

    /// Charge every non-deleted invoice. One invoice failing never stops the run.
    pub async fn charge_all_active_invoices(&self) -> BillingResult<BatchReport> {
        let invoices = self.invoices.fetch_all(&InvoiceFilter::active()).await?;
        let mut report = BatchReport::default();

        for invoice in invoices {
            match self.attempt_charge(&invoice).await {
                Ok(outcome) => report.processed.push(outcome.into_invoice()),
                Err(e @ BillingError::ChargeInProgress(_)) => {
                    tracing::info!(invoice_id = invoice.id, "Invoice already being charged, skipping");
                    report.record_failure(&invoice, e);
                }
                Err(e) => {
                    tracing::warn!(
                        invoice_id = invoice.id,
                        customer_id = invoice.customer_id,
                        error = %e,
                        "Failed to charge invoice, deactivating customer"
                    );
                    report.record_failure(&invoice, e);
                    self.deactivate_customer(invoice.customer_id, &mut report)
                        .await;
                }
            }
        }

        tracing::info!(
            processed = report.processed.len(),
            failures = report.failures.len(),
            deactivated = report.deactivated_customers.len(),
            "Monthly charge run finished"
        );
        Ok(report)
    }

    /// Re-charge FAILED invoices, deactivating customers that hit the retry limit
    pub async fn retry_failed_invoices(&self) -> BillingResult<BatchReport> {
        let invoices = self.invoices.fetch_all(&InvoiceFilter::failed()).await?;
        let mut report = BatchReport::default();

        for invoice in invoices {
            match self.attempt_charge(&invoice).await {
                Ok(outcome) => {
                    // Checked on both outcomes: an accepted charge leaves the stored count as it was
                    let updated = outcome.into_invoice();
                    if updated.failed_charges() >= self.max_charge_retries {
                        tracing::warn!(
                            invoice_id = updated.id,
                            customer_id = updated.customer_id,
                            failed_charges = updated.failed_charges(),
                            max_charge_retries = self.max_charge_retries,
                            "Retry limit reached"
                        );
                        self.deactivate_customer(updated.customer_id, &mut report)
                            .await;
                    }
                    report.processed.push(updated);
                }
                Err(e) => {
                    tracing::warn!(
                        invoice_id = invoice.id,
                        customer_id = invoice.customer_id,
                        error = %e,
                        "Failed to retry invoice"
                    );
                    report.record_failure(&invoice, e);
                }
            }
        }

        tracing::info!(
            processed = report.processed.len(),
            failures = report.failures.len(),
            deactivated = report.deactivated_customers.len(),
            "Retry run finished"
        );
        Ok(report)
    }

    async fn deactivate_customer(&self, customer_id: i64, report: &mut BatchReport) {
        match self.customers.deactivate(customer_id).await {
            Ok(_) => report.record_deactivation(customer_id),
            Err(e) => {
                tracing::error!(
                    customer_id,
                    error = %e,
                    "Failed to deactivate customer"
                );
            }
        }
    }
}
