//! Persistence contracts consumed by the billing core
//!
//! Lookups return `Ok(None)` when the row does not exist; the entity services
//! turn that into the matching `*NotFound` error. Implementations: the
//! in-memory store in [`crate::memory`] and the Postgres store in
//! [`crate::postgres`].

use async_trait::async_trait;
use ledgerline_shared::{
    Currency, Customer, CustomerStatus, CustomerUpdate, Invoice, InvoiceFilter, InvoiceStatus,
    InvoiceUpdate, Money, Subscription, SubscriptionPlan, SubscriptionPlanUpdate,
    SubscriptionUpdate,
};
use time::OffsetDateTime;

use crate::error::BillingResult;

/// Fields for a new invoice row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub customer_id: i64,
    pub subscription_id: i64,
    pub amount: Money,
    pub status: InvoiceStatus,
    pub description: Option<String>,
    pub charge_start_date: OffsetDateTime,
    pub charge_end_date: OffsetDateTime,
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn fetch_invoices(&self, filter: &InvoiceFilter) -> BillingResult<Vec<Invoice>>;

    async fn fetch_invoice(&self, id: i64) -> BillingResult<Option<Invoice>>;

    /// Apply a partial update and return the row as stored afterwards
    async fn update_invoice(&self, id: i64, update: &InvoiceUpdate)
        -> BillingResult<Option<Invoice>>;

    async fn create_invoice(&self, invoice: NewInvoice) -> BillingResult<Option<Invoice>>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn fetch_customers(
        &self,
        deleted: bool,
        status: Option<CustomerStatus>,
    ) -> BillingResult<Vec<Customer>>;

    async fn fetch_customer(&self, id: i64) -> BillingResult<Option<Customer>>;

    /// Look a customer up by its payment-provider reference
    async fn fetch_customer_by_stripe_id(&self, stripe_id: &str)
        -> BillingResult<Option<Customer>>;

    async fn update_customer(
        &self,
        id: i64,
        update: &CustomerUpdate,
    ) -> BillingResult<Option<Customer>>;

    async fn create_customer(&self, currency: Currency) -> BillingResult<Option<Customer>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn fetch_subscriptions(
        &self,
        deleted: bool,
        customer_id: Option<i64>,
        plan_id: Option<i64>,
    ) -> BillingResult<Vec<Subscription>>;

    async fn fetch_subscription(&self, id: i64) -> BillingResult<Option<Subscription>>;

    async fn update_subscription(
        &self,
        id: i64,
        update: &SubscriptionUpdate,
    ) -> BillingResult<Option<Subscription>>;

    async fn create_subscription(
        &self,
        plan_id: i64,
        customer_id: i64,
        amount: Money,
    ) -> BillingResult<Option<Subscription>>;
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn fetch_plans(&self, deleted: bool) -> BillingResult<Vec<SubscriptionPlan>>;

    async fn fetch_plan(&self, id: i64) -> BillingResult<Option<SubscriptionPlan>>;

    async fn update_plan(
        &self,
        id: i64,
        update: &SubscriptionPlanUpdate,
    ) -> BillingResult<Option<SubscriptionPlan>>;

    async fn create_plan(&self, name: &str, amount: Money)
        -> BillingResult<Option<SubscriptionPlan>>;
}

/// Everything the billing services need from persistence
pub trait BillingStore: InvoiceStore + CustomerStore + SubscriptionStore + PlanStore {}

impl<T> BillingStore for T where T: InvoiceStore + CustomerStore + SubscriptionStore + PlanStore {}
