use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::Money;

/// A named plan customers subscribe to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: i64,
    pub name: String,
    /// Monthly price in the plan's own currency
    pub amount: Money,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

/// A customer's subscription to a plan, priced in the customer's currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub customer_id: i64,
    pub plan_id: i64,
    pub amount: Money,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl Subscription {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub amount: Option<Money>,
    pub plan_id: Option<i64>,
    pub deleted: bool,
}

impl SubscriptionUpdate {
    pub fn soft_delete() -> Self {
        Self {
            deleted: true,
            ..Default::default()
        }
    }

    pub fn apply_to(&self, subscription: &mut Subscription, now: OffsetDateTime) {
        if let Some(amount) = self.amount {
            subscription.amount = amount;
        }
        if let Some(plan_id) = self.plan_id {
            subscription.plan_id = plan_id;
        }
        if self.deleted {
            subscription.deleted_at = Some(now);
        }
        subscription.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionPlanUpdate {
    pub name: Option<String>,
    pub amount: Option<Money>,
    pub deleted: bool,
}

impl SubscriptionPlanUpdate {
    pub fn apply_to(&self, plan: &mut SubscriptionPlan, now: OffsetDateTime) {
        if let Some(name) = &self.name {
            plan.name = name.clone();
        }
        if let Some(amount) = self.amount {
            plan.amount = amount;
        }
        if self.deleted {
            plan.deleted_at = Some(now);
        }
        plan.updated_at = now;
    }
}
