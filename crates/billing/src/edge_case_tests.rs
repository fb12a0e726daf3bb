// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Billing System
//!
//! Tests boundary conditions and failure handling in:
//! - Currency conversion and proration arithmetic
//! - The single-invoice charge state machine
//! - Monthly and retry batch runs
//! - Concurrent charges of the same invoice

#[cfg(test)]
mod fixtures {
    use std::sync::Arc;

    use ledgerline_shared::{Currency, Customer, CustomerStatus, Invoice, InvoiceStatus, Money};
    use rust_decimal::Decimal;
    use time::OffsetDateTime;

    use crate::memory::InMemoryStore;

    pub fn customer(id: i64, currency: Currency, payment_method: Option<&str>) -> Customer {
        let now = OffsetDateTime::now_utc();
        Customer {
            id,
            currency,
            status: CustomerStatus::Active,
            stripe_id: Some(format!("cus_{}", id)),
            default_payment_method_id: payment_method.map(str::to_string),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn invoice(
        id: i64,
        customer_id: i64,
        amount: Money,
        status: InvoiceStatus,
        failed_charges: Option<i32>,
    ) -> Invoice {
        let now = OffsetDateTime::now_utc();
        Invoice {
            id,
            customer_id,
            subscription_id: 1,
            amount,
            status,
            payment_ref: None,
            description: None,
            number_of_failed_charges: failed_charges,
            last_failed_charge: None,
            charge_start_date: now,
            charge_end_date: now,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn ngn(value: Decimal) -> Money {
        Money::new(value, Currency::Ngn)
    }

    pub async fn store(customers: Vec<Customer>, invoices: Vec<Invoice>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for customer in customers {
            store.insert_customer(customer).await;
        }
        for invoice in invoices {
            store.insert_invoice(invoice).await;
        }
        store
    }
}

#[cfg(test)]
mod arithmetic_tests {
    use ledgerline_shared::{Currency, Money};
    use rust_decimal_macros::dec;

    use crate::currency::convert;
    use crate::proration::prorate;

    // =========================================================================
    // Conversion to the same currency returns the value untouched
    // =========================================================================
    #[test]
    fn test_conversion_identity_keeps_scale() {
        for currency in Currency::ALL {
            let money = Money::new(dec!(0.000001), currency);
            let converted = convert(money, currency).unwrap();
            assert_eq!(converted, dec!(0.000001));
            assert_eq!(converted.scale(), 6, "identity must not rescale");
        }
    }

    // =========================================================================
    // NGN -> EUR goes through USD with no float drift
    // =========================================================================
    #[test]
    fn test_ngn_to_eur_through_base() {
        let converted = convert(Money::new(dec!(5000), Currency::Ngn), Currency::Eur).unwrap();
        assert_eq!(converted, dec!(5000) / dec!(380.50) * dec!(0.83));
        assert!(converted > dec!(10.90) && converted < dec!(10.91));
    }

    // =========================================================================
    // A full 30-day month prorates to exactly the monthly amount
    // =========================================================================
    #[test]
    fn test_full_month_proration_is_exact() {
        let monthly = Money::new(dec!(5000), Currency::Usd);
        assert_eq!(prorate(monthly, 30).unwrap(), Money::new(dec!(5000), Currency::Usd));
    }

    // =========================================================================
    // Zero days is a valid, zero-valued charge
    // =========================================================================
    #[test]
    fn test_zero_day_proration() {
        let monthly = Money::new(dec!(3000), Currency::Usd);
        let prorated = prorate(monthly, 0).unwrap();
        assert!(prorated.value.is_zero());
        assert_eq!(prorated.currency, Currency::Usd);
    }

    // =========================================================================
    // Months longer than 30 days bill more than the monthly amount
    // =========================================================================
    #[test]
    fn test_31_days_exceeds_monthly_amount() {
        let monthly = Money::new(dec!(3000), Currency::Usd);
        assert_eq!(prorate(monthly, 31).unwrap().value, dec!(3100));
    }
}

#[cfg(test)]
mod charge_tests {
    use std::sync::Arc;

    use ledgerline_shared::{Currency, CustomerStatus, InvoiceStatus};
    use rust_decimal_macros::dec;

    use super::fixtures::{customer, invoice, ngn, store};
    use crate::error::BillingError;
    use crate::gateway::MockPaymentGateway;
    use crate::orchestrator::BillingOrchestrator;
    use crate::store::{CustomerStore, InvoiceStore};

    fn declining_gateway() -> MockPaymentGateway {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_charge().returning(|_| Ok(false));
        gateway
    }

    // =========================================================================
    // Customer 200, invoice 203 (5000 NGN, PENDING), gateway declines
    // =========================================================================
    #[tokio::test]
    async fn test_declined_charge_marks_invoice_failed() {
        let store = store(
            vec![customer(200, Currency::Ngn, Some("pm_200"))],
            vec![invoice(203, 200, ngn(dec!(5000)), InvoiceStatus::Pending, None)],
        )
        .await;
        let orchestrator = BillingOrchestrator::new(store.clone(), Arc::new(declining_gateway()));

        let pending = store.fetch_invoice(203).await.unwrap().unwrap();
        let updated = orchestrator.charge_single_invoice(&pending).await.unwrap();

        assert_eq!(updated.status, InvoiceStatus::Failed);
        assert_eq!(updated.number_of_failed_charges, Some(1));
        assert!(updated.last_failed_charge.is_some());
        assert_eq!(updated.amount, ngn(dec!(5000)), "amount is never touched");
    }

    // =========================================================================
    // Failure counter accumulates 1 -> 2 on the next decline
    // =========================================================================
    #[tokio::test]
    async fn test_failure_counter_accumulates() {
        let store = store(
            vec![customer(200, Currency::Ngn, Some("pm_200"))],
            vec![invoice(203, 200, ngn(dec!(5000)), InvoiceStatus::Pending, None)],
        )
        .await;
        let orchestrator = BillingOrchestrator::new(store.clone(), Arc::new(declining_gateway()));

        let first = store.fetch_invoice(203).await.unwrap().unwrap();
        let once = orchestrator.charge_single_invoice(&first).await.unwrap();
        let twice = orchestrator.charge_single_invoice(&once).await.unwrap();

        assert_eq!(once.number_of_failed_charges, Some(1));
        assert_eq!(twice.number_of_failed_charges, Some(2));
        assert_eq!(twice.status, InvoiceStatus::Failed);
    }

    // =========================================================================
    // Customer 205 without a payment method: error, invoice untouched
    // =========================================================================
    #[tokio::test]
    async fn test_no_payment_method_leaves_invoice_untouched() {
        let store = store(
            vec![customer(205, Currency::Ngn, None)],
            vec![invoice(206, 205, ngn(dec!(5000)), InvoiceStatus::Pending, None)],
        )
        .await;
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_charge().never();
        let orchestrator = BillingOrchestrator::new(store.clone(), Arc::new(gateway));

        let before = store.fetch_invoice(206).await.unwrap().unwrap();
        let err = orchestrator.charge_single_invoice(&before).await.unwrap_err();

        assert!(matches!(err, BillingError::NoPaymentMethod { customer_id: 205 }));
        assert_eq!(store.fetch_invoice(206).await.unwrap().unwrap(), before);
        assert_eq!(
            store.fetch_customer(205).await.unwrap().unwrap().status,
            CustomerStatus::Active,
            "a single charge never deactivates"
        );
    }

    // =========================================================================
    // Accepted charge returns the invoice exactly as stored
    // =========================================================================
    #[tokio::test]
    async fn test_accepted_charge_returns_invoice_unchanged() {
        let store = store(
            vec![customer(200, Currency::Ngn, Some("pm_200"))],
            vec![invoice(203, 200, ngn(dec!(5000)), InvoiceStatus::Failed, Some(1))],
        )
        .await;
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_charge().times(1).returning(|_| Ok(true));
        let orchestrator = BillingOrchestrator::new(store.clone(), Arc::new(gateway));

        let before = store.fetch_invoice(203).await.unwrap().unwrap();
        let after = orchestrator.charge_single_invoice(&before).await.unwrap();

        assert_eq!(after, before);
        assert_eq!(after.status, InvoiceStatus::Failed, "PAID arrives via webhook");
    }

    // =========================================================================
    // Invoice missing from the store
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_invoice_is_not_found() {
        let store = store(vec![customer(200, Currency::Ngn, Some("pm_200"))], vec![]).await;
        let orchestrator = BillingOrchestrator::new(store, Arc::new(declining_gateway()));

        let ghost = invoice(999, 200, ngn(dec!(1)), InvoiceStatus::Pending, None);
        let err = orchestrator.charge_single_invoice(&ghost).await.unwrap_err();
        assert!(err.is_not_found());
    }
}

#[cfg(test)]
mod batch_tests {
    use std::sync::Arc;

    use ledgerline_shared::{Currency, CustomerStatus, InvoiceStatus};
    use rust_decimal_macros::dec;

    use super::fixtures::{customer, invoice, ngn, store};
    use crate::error::BillingError;
    use crate::gateway::MockPaymentGateway;
    use crate::orchestrator::BillingOrchestrator;
    use crate::store::{CustomerStore, InvoiceStore};

    // =========================================================================
    // Invoice A raises, invoice B is still charged and reported
    // =========================================================================
    #[tokio::test]
    async fn test_one_bad_invoice_does_not_stop_the_run() {
        let store = store(
            vec![
                customer(1, Currency::Ngn, Some("pm_1")),
                customer(2, Currency::Ngn, Some("pm_2")),
            ],
            vec![
                invoice(10, 1, ngn(dec!(100)), InvoiceStatus::Pending, None),
                invoice(20, 2, ngn(dec!(200)), InvoiceStatus::Pending, None),
            ],
        )
        .await;

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_charge().returning(|request| {
            if request.invoice_id == 10 {
                Err(BillingError::StripeApi("socket closed".to_string()))
            } else {
                Ok(false)
            }
        });
        let orchestrator = BillingOrchestrator::new(store.clone(), Arc::new(gateway));

        let report = orchestrator.charge_all_active_invoices().await.unwrap();

        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.processed[0].id, 20);
        assert_eq!(report.processed[0].status, InvoiceStatus::Failed);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].invoice_id, 10);
        assert_eq!(report.failures[0].customer_id, 1);
        assert_eq!(report.deactivated_customers, vec![1]);

        let a = store.fetch_customer(1).await.unwrap().unwrap();
        let b = store.fetch_customer(2).await.unwrap().unwrap();
        assert_eq!(a.status, CustomerStatus::Inactive);
        assert_eq!(b.status, CustomerStatus::Active, "a decline alone never deactivates");
    }

    // =========================================================================
    // Monthly run: missing payment method deactivates that customer only
    // =========================================================================
    #[tokio::test]
    async fn test_monthly_run_deactivates_customer_without_payment_method() {
        let store = store(
            vec![
                customer(200, Currency::Ngn, Some("pm_200")),
                customer(205, Currency::Ngn, None),
            ],
            vec![
                invoice(203, 200, ngn(dec!(5000)), InvoiceStatus::Pending, None),
                invoice(206, 205, ngn(dec!(5000)), InvoiceStatus::Pending, None),
            ],
        )
        .await;
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_charge().times(1).returning(|_| Ok(true));
        let orchestrator = BillingOrchestrator::new(store.clone(), Arc::new(gateway));

        let report = orchestrator.charge_all_active_invoices().await.unwrap();

        assert_eq!(report.processed.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            BillingError::NoPaymentMethod { customer_id: 205 }
        ));
        assert_eq!(report.deactivated_customers, vec![205]);
        assert_eq!(
            store.fetch_invoice(206).await.unwrap().unwrap().status,
            InvoiceStatus::Pending
        );
    }

    // =========================================================================
    // Monthly run charges every live invoice regardless of status
    // =========================================================================
    #[tokio::test]
    async fn test_monthly_run_working_set() {
        let mut deleted = invoice(40, 1, ngn(dec!(1)), InvoiceStatus::Pending, None);
        deleted.deleted_at = Some(time::OffsetDateTime::now_utc());

        let store = store(
            vec![customer(1, Currency::Ngn, Some("pm_1"))],
            vec![
                invoice(10, 1, ngn(dec!(1)), InvoiceStatus::Paid, None),
                invoice(20, 1, ngn(dec!(1)), InvoiceStatus::Processing, None),
                invoice(30, 1, ngn(dec!(1)), InvoiceStatus::Pending, None),
                deleted,
            ],
        )
        .await;
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_charge()
            .withf(|request| request.invoice_id != 40)
            .times(3)
            .returning(|_| Ok(true));
        let orchestrator = BillingOrchestrator::new(store, Arc::new(gateway));

        let report = orchestrator.charge_all_active_invoices().await.unwrap();
        let ids: Vec<i64> = report.processed.iter().map(|invoice| invoice.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert!(report.failures.is_empty());
    }

    // =========================================================================
    // Retry: an accepted charge on an invoice already at the limit deactivates
    // =========================================================================
    #[tokio::test]
    async fn test_retry_success_at_threshold_deactivates() {
        let store = store(
            vec![customer(200, Currency::Ngn, Some("pm_200"))],
            vec![invoice(203, 200, ngn(dec!(5000)), InvoiceStatus::Failed, Some(3))],
        )
        .await;
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_charge().times(1).returning(|_| Ok(true));
        let orchestrator = BillingOrchestrator::new(store.clone(), Arc::new(gateway));

        let report = orchestrator.retry_failed_invoices().await.unwrap();

        assert_eq!(report.processed[0].number_of_failed_charges, Some(3));
        assert_eq!(report.deactivated_customers, vec![200]);
        assert_eq!(
            store.fetch_customer(200).await.unwrap().unwrap().status,
            CustomerStatus::Inactive
        );
    }

    // =========================================================================
    // Retry: a decline reaching 3 failures deactivates the customer
    // =========================================================================
    #[tokio::test]
    async fn test_retry_threshold_deactivates() {
        let store = store(
            vec![customer(200, Currency::Ngn, Some("pm_200"))],
            vec![invoice(203, 200, ngn(dec!(5000)), InvoiceStatus::Failed, Some(2))],
        )
        .await;
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_charge().returning(|_| Ok(false));
        let orchestrator = BillingOrchestrator::new(store.clone(), Arc::new(gateway));

        let report = orchestrator.retry_failed_invoices().await.unwrap();

        assert_eq!(report.processed[0].number_of_failed_charges, Some(3));
        assert_eq!(report.deactivated_customers, vec![200]);
        assert_eq!(
            store.fetch_customer(200).await.unwrap().unwrap().status,
            CustomerStatus::Inactive
        );
    }

    // =========================================================================
    // Retry: reaching 2 failures leaves the customer alone
    // =========================================================================
    #[tokio::test]
    async fn test_retry_below_threshold_keeps_customer() {
        let store = store(
            vec![customer(200, Currency::Ngn, Some("pm_200"))],
            vec![invoice(203, 200, ngn(dec!(5000)), InvoiceStatus::Failed, Some(1))],
        )
        .await;
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_charge().returning(|_| Ok(false));
        let orchestrator = BillingOrchestrator::new(store.clone(), Arc::new(gateway));

        let report = orchestrator.retry_failed_invoices().await.unwrap();

        assert_eq!(report.processed[0].number_of_failed_charges, Some(2));
        assert!(report.deactivated_customers.is_empty());
        assert_eq!(
            store.fetch_customer(200).await.unwrap().unwrap().status,
            CustomerStatus::Active
        );
    }

    // =========================================================================
    // Retry: errors are reported but never deactivate
    // =========================================================================
    #[tokio::test]
    async fn test_retry_errors_are_collected() {
        let store = store(
            vec![
                customer(205, Currency::Ngn, None),
                customer(200, Currency::Ngn, Some("pm_200")),
            ],
            vec![
                invoice(206, 205, ngn(dec!(5000)), InvoiceStatus::Failed, Some(2)),
                invoice(203, 200, ngn(dec!(5000)), InvoiceStatus::Failed, Some(1)),
            ],
        )
        .await;
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_charge().times(1).returning(|_| Ok(false));
        let orchestrator = BillingOrchestrator::new(store.clone(), Arc::new(gateway));

        let report = orchestrator.retry_failed_invoices().await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].invoice_id, 206);
        assert_eq!(report.processed.len(), 1);
        assert!(report.deactivated_customers.is_empty());
        assert_eq!(
            store.fetch_customer(205).await.unwrap().unwrap().status,
            CustomerStatus::Active
        );
    }

    // =========================================================================
    // Several failing invoices of one customer deactivate it once
    // =========================================================================
    #[tokio::test]
    async fn test_deactivation_reported_once_per_customer() {
        let store = store(
            vec![customer(205, Currency::Ngn, None)],
            vec![
                invoice(1, 205, ngn(dec!(10)), InvoiceStatus::Pending, None),
                invoice(2, 205, ngn(dec!(20)), InvoiceStatus::Failed, Some(1)),
            ],
        )
        .await;
        let orchestrator =
            BillingOrchestrator::new(store, Arc::new(MockPaymentGateway::new()));

        let report = orchestrator.charge_all_active_invoices().await.unwrap();
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.deactivated_customers, vec![205]);
    }
}

#[cfg(test)]
mod concurrency_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use ledgerline_shared::{Currency, InvoiceStatus};
    use rust_decimal_macros::dec;

    use super::fixtures::{customer, invoice, ngn, store};
    use crate::error::{BillingError, BillingResult};
    use crate::gateway::{ChargeRequest, PaymentGateway, PaymentSetup, PaymentSetupRequest};
    use crate::orchestrator::BillingOrchestrator;
    use crate::store::InvoiceStore;

    /// Gateway that takes a while to answer and counts calls
    struct SlowGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PaymentGateway for SlowGateway {
        async fn charge(&self, _request: &ChargeRequest) -> BillingResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(false)
        }

        async fn init_payment_setup(
            &self,
            _request: &PaymentSetupRequest,
        ) -> BillingResult<PaymentSetup> {
            Err(BillingError::PaymentSetupFailed("unused".to_string()))
        }
    }

    // =========================================================================
    // Two concurrent charges of one invoice reach the provider once
    // =========================================================================
    #[tokio::test(start_paused = true)]
    async fn test_concurrent_charges_of_same_invoice() {
        let store = store(
            vec![customer(200, Currency::Ngn, Some("pm_200"))],
            vec![invoice(203, 200, ngn(dec!(5000)), InvoiceStatus::Pending, None)],
        )
        .await;
        let gateway = Arc::new(SlowGateway {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = BillingOrchestrator::new(store.clone(), gateway.clone());
        let target = store.fetch_invoice(203).await.unwrap().unwrap();

        let (first, second) = tokio::join!(
            orchestrator.charge_single_invoice(&target),
            orchestrator.charge_single_invoice(&target)
        );

        let results = [first, second];
        let in_progress = results
            .iter()
            .filter(|r| matches!(r, Err(BillingError::ChargeInProgress(203))))
            .count();
        assert_eq!(in_progress, 1);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);

        let stored = store.fetch_invoice(203).await.unwrap().unwrap();
        assert_eq!(stored.number_of_failed_charges, Some(1), "counted once");
        assert!(!orchestrator.locks().is_held(203));
    }

    // =========================================================================
    // Monthly and retry runs racing on the same FAILED invoice
    // =========================================================================
    #[tokio::test(start_paused = true)]
    async fn test_overlapping_batch_runs() {
        let store = store(
            vec![customer(200, Currency::Ngn, Some("pm_200"))],
            vec![invoice(203, 200, ngn(dec!(5000)), InvoiceStatus::Failed, Some(1))],
        )
        .await;
        let gateway = Arc::new(SlowGateway {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = BillingOrchestrator::new(store.clone(), gateway.clone());

        let (monthly, retry) = tokio::join!(
            orchestrator.charge_all_active_invoices(),
            orchestrator.retry_failed_invoices()
        );
        let (monthly, retry) = (monthly.unwrap(), retry.unwrap());

        assert_eq!(monthly.processed.len() + retry.processed.len(), 1);
        assert_eq!(monthly.failures.len() + retry.failures.len(), 1);
        assert!(monthly.deactivated_customers.is_empty());
        assert!(retry.deactivated_customers.is_empty());
        assert_eq!(
            store.fetch_invoice(203).await.unwrap().unwrap().number_of_failed_charges,
            Some(2)
        );
    }
}
