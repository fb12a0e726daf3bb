// Shared crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Ledgerline Shared Types
//!
//! Domain model shared by the billing core and the worker binary:
//! money and currencies, customers, subscriptions, plans and invoices,
//! plus the typed partial-update structs used by the stores.

pub mod db;
pub mod models;

pub use db::create_pool;
pub use models::{
    Currency, Customer, CustomerStatus, CustomerUpdate, Invoice, InvoiceFilter, InvoiceStatus,
    InvoiceUpdate, Money, ParseEnumError, Subscription, SubscriptionPlan, SubscriptionPlanUpdate,
    SubscriptionUpdate,
};
