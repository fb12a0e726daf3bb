//! In-memory store
//!
//! Backs the test suite and the worker's demo mode. Each table is a map behind
//! a tokio `RwLock`; ids come from one shared counter.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use ledgerline_shared::{
    Currency, Customer, CustomerStatus, CustomerUpdate, Invoice, InvoiceFilter, InvoiceStatus,
    InvoiceUpdate, Money, Subscription, SubscriptionPlan, SubscriptionPlanUpdate,
    SubscriptionUpdate,
};
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::currency::convert_money;
use crate::error::BillingResult;
use crate::proration::end_of_month;
use crate::store::{CustomerStore, InvoiceStore, NewInvoice, PlanStore, SubscriptionStore};

pub struct InMemoryStore {
    next_id: AtomicI64,
    customers: RwLock<BTreeMap<i64, Customer>>,
    invoices: RwLock<BTreeMap<i64, Invoice>>,
    subscriptions: RwLock<BTreeMap<i64, Subscription>>,
    plans: RwLock<BTreeMap<i64, SubscriptionPlan>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            customers: RwLock::new(BTreeMap::new()),
            invoices: RwLock::new(BTreeMap::new()),
            subscriptions: RwLock::new(BTreeMap::new()),
            plans: RwLock::new(BTreeMap::new()),
        }
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Keep generated ids clear of rows inserted with explicit ids
    fn reserve_id(&self, id: i64) {
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
    }

    /// Insert a fully-formed customer, keeping its id
    pub async fn insert_customer(&self, customer: Customer) {
        self.reserve_id(customer.id);
        self.customers.write().await.insert(customer.id, customer);
    }

    /// Insert a fully-formed invoice, keeping its id
    pub async fn insert_invoice(&self, invoice: Invoice) {
        self.reserve_id(invoice.id);
        self.invoices.write().await.insert(invoice.id, invoice);
    }

    pub async fn insert_subscription(&self, subscription: Subscription) {
        self.reserve_id(subscription.id);
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription);
    }

    pub async fn insert_plan(&self, plan: SubscriptionPlan) {
        self.reserve_id(plan.id);
        self.plans.write().await.insert(plan.id, plan);
    }

    /// Populate a small data set for running the worker without a database.
    ///
    /// One plan, one customer per currency, each with a subscription and a
    /// pending invoice for the current month. Every other customer has no
    /// stored payment method.
    pub async fn seed_demo_data(&self) -> BillingResult<()> {
        let now = OffsetDateTime::now_utc();
        let month_end = end_of_month(now)?;

        let plan = self
            .create_plan("Standard", Money::new(Decimal::new(50, 0), Currency::Usd))
            .await?;
        let Some(plan) = plan else {
            return Ok(());
        };

        for (index, currency) in Currency::ALL.iter().enumerate() {
            let Some(customer) = self.create_customer(*currency).await? else {
                continue;
            };
            if index % 2 == 0 {
                let update = CustomerUpdate {
                    default_payment_method_id: Some(format!("pm_demo_{}", customer.id)),
                    ..Default::default()
                };
                self.update_customer(customer.id, &update).await?;
            }

            // No USD rate is published, so USD customers keep the plan amount
            let amount = convert_money(plan.amount, *currency).unwrap_or(plan.amount);
            let Some(subscription) = self
                .create_subscription(plan.id, customer.id, amount)
                .await?
            else {
                continue;
            };

            self.create_invoice(NewInvoice {
                customer_id: customer.id,
                subscription_id: subscription.id,
                amount,
                status: InvoiceStatus::Pending,
                description: None,
                charge_start_date: now,
                charge_end_date: month_end,
            })
            .await?;
        }

        tracing::info!(
            customers = self.customers.read().await.len(),
            invoices = self.invoices.read().await.len(),
            "Seeded in-memory store with demo data"
        );
        Ok(())
    }
}

#[async_trait]
impl InvoiceStore for InMemoryStore {
    async fn fetch_invoices(&self, filter: &InvoiceFilter) -> BillingResult<Vec<Invoice>> {
        Ok(self
            .invoices
            .read()
            .await
            .values()
            .filter(|invoice| filter.matches(invoice))
            .cloned()
            .collect())
    }

    async fn fetch_invoice(&self, id: i64) -> BillingResult<Option<Invoice>> {
        Ok(self.invoices.read().await.get(&id).cloned())
    }

    async fn update_invoice(
        &self,
        id: i64,
        update: &InvoiceUpdate,
    ) -> BillingResult<Option<Invoice>> {
        let mut invoices = self.invoices.write().await;
        Ok(invoices.get_mut(&id).map(|invoice| {
            update.apply_to(invoice, OffsetDateTime::now_utc());
            invoice.clone()
        }))
    }

    async fn create_invoice(&self, new: NewInvoice) -> BillingResult<Option<Invoice>> {
        let now = OffsetDateTime::now_utc();
        let invoice = Invoice {
            id: self.allocate_id(),
            customer_id: new.customer_id,
            subscription_id: new.subscription_id,
            amount: new.amount,
            status: new.status,
            payment_ref: None,
            description: new.description,
            number_of_failed_charges: None,
            last_failed_charge: None,
            charge_start_date: new.charge_start_date,
            charge_end_date: new.charge_end_date,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.invoices
            .write()
            .await
            .insert(invoice.id, invoice.clone());
        Ok(Some(invoice))
    }
}

#[async_trait]
impl CustomerStore for InMemoryStore {
    async fn fetch_customers(
        &self,
        deleted: bool,
        status: Option<CustomerStatus>,
    ) -> BillingResult<Vec<Customer>> {
        Ok(self
            .customers
            .read()
            .await
            .values()
            .filter(|c| c.is_deleted() == deleted)
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect())
    }

    async fn fetch_customer(&self, id: i64) -> BillingResult<Option<Customer>> {
        Ok(self.customers.read().await.get(&id).cloned())
    }

    async fn fetch_customer_by_stripe_id(
        &self,
        stripe_id: &str,
    ) -> BillingResult<Option<Customer>> {
        Ok(self
            .customers
            .read()
            .await
            .values()
            .find(|c| !c.is_deleted() && c.stripe_id.as_deref() == Some(stripe_id))
            .cloned())
    }

    async fn update_customer(
        &self,
        id: i64,
        update: &CustomerUpdate,
    ) -> BillingResult<Option<Customer>> {
        let mut customers = self.customers.write().await;
        Ok(customers.get_mut(&id).map(|customer| {
            update.apply_to(customer, OffsetDateTime::now_utc());
            customer.clone()
        }))
    }

    async fn create_customer(&self, currency: Currency) -> BillingResult<Option<Customer>> {
        let now = OffsetDateTime::now_utc();
        let customer = Customer {
            id: self.allocate_id(),
            currency,
            status: CustomerStatus::Active,
            stripe_id: None,
            default_payment_method_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.customers
            .write()
            .await
            .insert(customer.id, customer.clone());
        Ok(Some(customer))
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn fetch_subscriptions(
        &self,
        deleted: bool,
        customer_id: Option<i64>,
        plan_id: Option<i64>,
    ) -> BillingResult<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.is_deleted() == deleted)
            .filter(|s| customer_id.map_or(true, |id| s.customer_id == id))
            .filter(|s| plan_id.map_or(true, |id| s.plan_id == id))
            .cloned()
            .collect())
    }

    async fn fetch_subscription(&self, id: i64) -> BillingResult<Option<Subscription>> {
        Ok(self.subscriptions.read().await.get(&id).cloned())
    }

    async fn update_subscription(
        &self,
        id: i64,
        update: &SubscriptionUpdate,
    ) -> BillingResult<Option<Subscription>> {
        let mut subscriptions = self.subscriptions.write().await;
        Ok(subscriptions.get_mut(&id).map(|subscription| {
            update.apply_to(subscription, OffsetDateTime::now_utc());
            subscription.clone()
        }))
    }

    async fn create_subscription(
        &self,
        plan_id: i64,
        customer_id: i64,
        amount: Money,
    ) -> BillingResult<Option<Subscription>> {
        let now = OffsetDateTime::now_utc();
        let subscription = Subscription {
            id: self.allocate_id(),
            customer_id,
            plan_id,
            amount,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription.clone());
        Ok(Some(subscription))
    }
}

#[async_trait]
impl PlanStore for InMemoryStore {
    async fn fetch_plans(&self, deleted: bool) -> BillingResult<Vec<SubscriptionPlan>> {
        Ok(self
            .plans
            .read()
            .await
            .values()
            .filter(|p| p.deleted_at.is_some() == deleted)
            .cloned()
            .collect())
    }

    async fn fetch_plan(&self, id: i64) -> BillingResult<Option<SubscriptionPlan>> {
        Ok(self.plans.read().await.get(&id).cloned())
    }

    async fn update_plan(
        &self,
        id: i64,
        update: &SubscriptionPlanUpdate,
    ) -> BillingResult<Option<SubscriptionPlan>> {
        let mut plans = self.plans.write().await;
        Ok(plans.get_mut(&id).map(|plan| {
            update.apply_to(plan, OffsetDateTime::now_utc());
            plan.clone()
        }))
    }

    async fn create_plan(
        &self,
        name: &str,
        amount: Money,
    ) -> BillingResult<Option<SubscriptionPlan>> {
        let now = OffsetDateTime::now_utc();
        let plan = SubscriptionPlan {
            id: self.allocate_id(),
            name: name.to_string(),
            amount,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.plans.write().await.insert(plan.id, plan.clone());
        Ok(Some(plan))
    }
}
