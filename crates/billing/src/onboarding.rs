//! Customer onboarding and cancellation

use std::sync::Arc;

use ledgerline_shared::{
    Currency, Customer, CustomerUpdate, Invoice, InvoiceFilter, InvoiceStatus, InvoiceUpdate,
    Money, Subscription, SubscriptionUpdate,
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::customer::CustomerService;
use crate::error::{BillingError, BillingResult};
use crate::invoices::{InvoiceDraft, InvoiceService};
use crate::proration::{end_of_month, prorate, whole_days_between};
use crate::store::BillingStore;
use crate::subscriptions::{SubscriptionPlanService, SubscriptionService};

/// Everything created for a new customer
#[derive(Debug, Clone, Serialize)]
pub struct Onboarded {
    pub customer: Customer,
    pub subscription: Subscription,
    pub first_invoice: Invoice,
}

/// State left behind after a customer cancels
#[derive(Debug, Clone, Serialize)]
pub struct Cancellation {
    pub customer: Customer,
    pub subscription: Subscription,
    /// The pending invoice, cut down to the days used this month
    pub final_invoice: Invoice,
}

#[derive(Clone)]
pub struct OnboardingService {
    customers: CustomerService,
    invoices: InvoiceService,
    subscriptions: SubscriptionService,
    plans: SubscriptionPlanService,
}

impl OnboardingService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self {
            customers: CustomerService::new(store.clone()),
            invoices: InvoiceService::new(store.clone()),
            subscriptions: SubscriptionService::new(store.clone()),
            plans: SubscriptionPlanService::new(store),
        }
    }

    /// Create a customer on a plan and bill the rest of the current month
    pub async fn onboard(&self, currency: Currency, plan_id: i64) -> BillingResult<Onboarded> {
        let plan = self.plans.fetch(plan_id).await?;
        let customer = self.customers.create(currency).await?;
        let subscription = self.subscriptions.create(&plan, &customer).await?;

        let now = OffsetDateTime::now_utc();
        let draft = InvoiceDraft::window(now, end_of_month(now)?);
        let first_invoice = self.invoices.create(&customer, &subscription, draft).await?;

        tracing::info!(
            customer_id = customer.id,
            plan_id,
            first_invoice_id = first_invoice.id,
            "Customer onboarded"
        );

        Ok(Onboarded {
            customer,
            subscription,
            first_invoice,
        })
    }

    /// Soft-delete a customer and its subscription, prorating the pending
    /// invoice from its start date to the end of the month.
    pub async fn cancel_customer(&self, customer_id: i64) -> BillingResult<Cancellation> {
        self.customers.fetch(customer_id).await?;

        let pending = self
            .invoices
            .fetch_all(&InvoiceFilter::with_status(InvoiceStatus::Pending).for_customer(customer_id))
            .await?
            .into_iter()
            .next()
            .ok_or(BillingError::NoActiveSubscription(customer_id))?;

        let customer = self
            .customers
            .update(customer_id, &CustomerUpdate::soft_delete())
            .await?;
        let subscription = self
            .subscriptions
            .update(pending.subscription_id, &SubscriptionUpdate::soft_delete())
            .await?;

        let month_end = end_of_month(OffsetDateTime::now_utc())?;
        let days = whole_days_between(pending.charge_start_date, month_end);
        let update = InvoiceUpdate {
            amount: Some(prorate(pending.amount, days)?),
            charge_end_date: Some(month_end),
            ..Default::default()
        };
        let final_invoice = self.invoices.update(pending.id, &update).await?;

        tracing::info!(
            customer_id,
            subscription_id = subscription.id,
            invoice_id = final_invoice.id,
            days,
            amount = %final_invoice.amount,
            "Customer cancelled"
        );

        Ok(Cancellation {
            customer,
            subscription,
            final_invoice,
        })
    }

    /// Invoice a customer against its first live subscription
    pub async fn create_invoice_for_customer(
        &self,
        customer_id: i64,
        custom_amount: Option<Money>,
    ) -> BillingResult<Invoice> {
        let customer = self.customers.fetch(customer_id).await?;
        let subscription = self.subscriptions.active_for_customer(customer_id).await?;

        let draft = InvoiceDraft {
            custom_amount,
            ..Default::default()
        };
        self.invoices.create(&customer, &subscription, draft).await
    }
}
