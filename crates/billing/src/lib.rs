// Billing crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::result_large_err)] // BillingError carries owned messages from provider and database errors
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Ledgerline Billing Core
//!
//! Charges subscription invoices through a payment provider and keeps invoice
//! and customer state consistent with the outcome.
//!
//! ## Features
//!
//! - **Charging**: Single-invoice charge state machine with per-invoice leases
//! - **Batch Runs**: Monthly charge run and daily retry run with structured reports
//! - **Deactivation**: Customers are deactivated once an invoice reaches the failed-charge limit
//! - **Currency**: Static-rate conversion and 30-day proration in exact decimals
//! - **Onboarding**: Customer, subscription and first prorated invoice in one call
//! - **Webhooks**: Payment confirmation and payment-method events from Stripe
//! - **Storage**: Postgres via sqlx, or an in-memory store for tests and demos

pub mod client;
pub mod config;
pub mod currency;
pub mod customer;
pub mod error;
pub mod gateway;
pub mod invoices;
pub mod memory;
pub mod onboarding;
pub mod orchestrator;
pub mod postgres;
pub mod proration;
pub mod scheduler;
pub mod store;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Client
pub use client::{StripeClient, StripeConfig};

// Config
pub use config::{BillingConfig, ScheduleConfig};

// Currency
pub use currency::{convert, convert_money, exchange_rate, BASE_CURRENCY};

// Customer
pub use customer::CustomerService;

// Error
pub use error::{BillingError, BillingResult};

// Gateway
pub use gateway::{ChargeRequest, OfflineGateway, PaymentGateway, PaymentSetup, PaymentSetupRequest};

// Invoices
pub use invoices::{InvoiceDraft, InvoiceService};

// Onboarding
pub use onboarding::{Cancellation, Onboarded, OnboardingService};

// Orchestrator
pub use orchestrator::{
    BatchReport, BillingOrchestrator, ChargeOutcome, InvoiceFailure, InvoiceLocks,
};

// Proration
pub use proration::{prorate, PRORATION_MONTH_DAYS};

// Scheduler
pub use scheduler::{BillingScheduler, SchedulerHandle};

// Storage
pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use store::{BillingStore, CustomerStore, InvoiceStore, NewInvoice, PlanStore, SubscriptionStore};

// Subscriptions
pub use subscriptions::{SubscriptionPlanService, SubscriptionService};

// Webhooks
pub use webhooks::{PaymentEvent, WebhookHandler};

use std::sync::Arc;

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub orchestrator: Arc<BillingOrchestrator>,
    pub customers: CustomerService,
    pub invoices: InvoiceService,
    pub subscriptions: SubscriptionService,
    pub plans: SubscriptionPlanService,
    pub onboarding: OnboardingService,
    /// Present only when Stripe credentials are configured
    pub webhooks: Option<WebhookHandler>,
    schedule: ScheduleConfig,
}

impl BillingService {
    /// Create a billing service over `store`, charging through Stripe when it
    /// is configured and declining every charge otherwise
    pub fn from_config(config: &BillingConfig, store: Arc<dyn BillingStore>) -> Self {
        let gateway: Arc<dyn PaymentGateway> = match &config.stripe {
            Some(stripe) => Arc::new(StripeClient::new(stripe.clone())),
            None => {
                tracing::warn!("STRIPE_SECRET_KEY not set, charges will be declined");
                Arc::new(OfflineGateway)
            }
        };
        Self::new(config, store, gateway)
    }

    /// Create a billing service with an explicit gateway
    pub fn new(
        config: &BillingConfig,
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let orchestrator = BillingOrchestrator::new(store.clone(), gateway)
            .with_max_charge_retries(config.max_charge_retries);

        Self {
            orchestrator: Arc::new(orchestrator),
            customers: CustomerService::new(store.clone()),
            invoices: InvoiceService::new(store.clone()),
            subscriptions: SubscriptionService::new(store.clone()),
            plans: SubscriptionPlanService::new(store.clone()),
            onboarding: OnboardingService::new(store.clone()),
            webhooks: config
                .stripe
                .as_ref()
                .map(|stripe| WebhookHandler::new(store, stripe.webhook_secret.clone())),
            schedule: config.schedule,
        }
    }

    /// Scheduler for the monthly and retry runs, not yet started
    pub fn scheduler(&self) -> BillingScheduler {
        BillingScheduler::new(self.orchestrator.clone(), self.schedule)
    }
}
