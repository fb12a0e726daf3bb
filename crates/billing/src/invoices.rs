//! Invoice service
//!
//! Creation prices an invoice from its subscription: a custom amount always
//! wins, a valid charge window is prorated, anything else bills the full
//! monthly amount from now to the end of the month.

use std::sync::Arc;

use ledgerline_shared::{
    Customer, Invoice, InvoiceFilter, InvoiceStatus, InvoiceUpdate, Money, Subscription,
};
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};
use crate::proration::{end_of_month, partial_charge_description, prorate, whole_days_between};
use crate::store::{BillingStore, NewInvoice};

/// Optional pricing inputs for a new invoice
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceDraft {
    pub custom_amount: Option<Money>,
    pub charge_start_date: Option<OffsetDateTime>,
    pub charge_end_date: Option<OffsetDateTime>,
}

impl InvoiceDraft {
    pub fn custom(amount: Money) -> Self {
        Self {
            custom_amount: Some(amount),
            ..Default::default()
        }
    }

    pub fn window(start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self {
            charge_start_date: Some(start),
            charge_end_date: Some(end),
            ..Default::default()
        }
    }

    /// The charge window, if both ends are set and ordered
    fn valid_window(&self) -> Option<(OffsetDateTime, OffsetDateTime)> {
        match (self.charge_start_date, self.charge_end_date) {
            (Some(start), Some(end)) if start <= end => Some((start, end)),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct InvoiceService {
    store: Arc<dyn BillingStore>,
}

impl InvoiceService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn fetch(&self, id: i64) -> BillingResult<Invoice> {
        self.store
            .fetch_invoice(id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    pub async fn fetch_all(&self, filter: &InvoiceFilter) -> BillingResult<Vec<Invoice>> {
        self.store.fetch_invoices(filter).await
    }

    pub async fn update(&self, id: i64, update: &InvoiceUpdate) -> BillingResult<Invoice> {
        self.store
            .update_invoice(id, update)
            .await?
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    pub async fn create(
        &self,
        customer: &Customer,
        subscription: &Subscription,
        draft: InvoiceDraft,
    ) -> BillingResult<Invoice> {
        let now = OffsetDateTime::now_utc();

        let new = if let Some(amount) = draft.custom_amount {
            NewInvoice {
                customer_id: customer.id,
                subscription_id: subscription.id,
                amount,
                status: InvoiceStatus::Pending,
                description: None,
                charge_start_date: now,
                charge_end_date: end_of_month(now)?,
            }
        } else if let Some((start, end)) = draft.valid_window() {
            let days = whole_days_between(start, end);
            NewInvoice {
                customer_id: customer.id,
                subscription_id: subscription.id,
                amount: prorate(subscription.amount, days)?,
                status: InvoiceStatus::Pending,
                description: Some(partial_charge_description(days)),
                charge_start_date: start,
                charge_end_date: end,
            }
        } else {
            NewInvoice {
                customer_id: customer.id,
                subscription_id: subscription.id,
                amount: subscription.amount,
                status: InvoiceStatus::Pending,
                description: None,
                charge_start_date: now,
                charge_end_date: end_of_month(now)?,
            }
        };

        let invoice = self
            .store
            .create_invoice(new)
            .await?
            .ok_or(BillingError::CreationFailed("invoice"))?;

        tracing::info!(
            invoice_id = invoice.id,
            customer_id = customer.id,
            amount = %invoice.amount,
            "Invoice created"
        );
        Ok(invoice)
    }
}
