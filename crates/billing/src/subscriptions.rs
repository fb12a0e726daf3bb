//! Subscription and plan management
//!
//! A subscription copies its plan's price converted into the subscribing
//! customer's currency. Missing exchange rates abort the subscription.

use std::sync::Arc;

use ledgerline_shared::{
    Customer, Money, Subscription, SubscriptionPlan, SubscriptionPlanUpdate, SubscriptionUpdate,
};

use crate::currency::convert_money;
use crate::error::{BillingError, BillingResult};
use crate::store::BillingStore;

/// Subscription service
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn BillingStore>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn fetch(&self, id: i64) -> BillingResult<Subscription> {
        self.store
            .fetch_subscription(id)
            .await?
            .ok_or(BillingError::SubscriptionNotFound(id))
    }

    pub async fn fetch_all(
        &self,
        deleted: bool,
        customer_id: Option<i64>,
        plan_id: Option<i64>,
    ) -> BillingResult<Vec<Subscription>> {
        self.store
            .fetch_subscriptions(deleted, customer_id, plan_id)
            .await
    }

    /// First live subscription of a customer
    pub async fn active_for_customer(&self, customer_id: i64) -> BillingResult<Subscription> {
        self.fetch_all(false, Some(customer_id), None)
            .await?
            .into_iter()
            .next()
            .ok_or(BillingError::NoActiveSubscription(customer_id))
    }

    pub async fn update(
        &self,
        id: i64,
        update: &SubscriptionUpdate,
    ) -> BillingResult<Subscription> {
        self.store
            .update_subscription(id, update)
            .await?
            .ok_or(BillingError::SubscriptionNotFound(id))
    }

    /// Subscribe a customer to a plan, priced in the customer's currency
    pub async fn create(
        &self,
        plan: &SubscriptionPlan,
        customer: &Customer,
    ) -> BillingResult<Subscription> {
        let amount = convert_money(plan.amount, customer.currency)?;

        let subscription = self
            .store
            .create_subscription(plan.id, customer.id, amount)
            .await?
            .ok_or(BillingError::CreationFailed("subscription"))?;

        tracing::info!(
            subscription_id = subscription.id,
            customer_id = customer.id,
            plan_id = plan.id,
            amount = %subscription.amount,
            "Subscription created"
        );
        Ok(subscription)
    }
}

#[derive(Clone)]
pub struct SubscriptionPlanService {
    store: Arc<dyn BillingStore>,
}

impl SubscriptionPlanService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, name: &str, amount: Money) -> BillingResult<SubscriptionPlan> {
        if name.trim().is_empty() {
            return Err(BillingError::InvalidInput("plan name is empty".to_string()));
        }
        if amount.value.is_sign_negative() {
            return Err(BillingError::InvalidAmount(format!(
                "plan amount {} is negative",
                amount
            )));
        }

        self.store
            .create_plan(name, amount)
            .await?
            .ok_or(BillingError::CreationFailed("subscription plan"))
    }

    pub async fn fetch(&self, id: i64) -> BillingResult<SubscriptionPlan> {
        self.store
            .fetch_plan(id)
            .await?
            .ok_or(BillingError::PlanNotFound(id))
    }

    pub async fn fetch_all(&self, deleted: bool) -> BillingResult<Vec<SubscriptionPlan>> {
        self.store.fetch_plans(deleted).await
    }

    pub async fn update(
        &self,
        id: i64,
        update: &SubscriptionPlanUpdate,
    ) -> BillingResult<SubscriptionPlan> {
        self.store
            .update_plan(id, update)
            .await?
            .ok_or(BillingError::PlanNotFound(id))
    }
}
