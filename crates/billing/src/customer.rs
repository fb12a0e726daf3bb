//! Customer service

use std::sync::Arc;

use ledgerline_shared::{Currency, Customer, CustomerStatus, CustomerUpdate};

use crate::error::{BillingError, BillingResult};
use crate::store::BillingStore;

/// Customer lookups and mutations with not-found mapping
#[derive(Clone)]
pub struct CustomerService {
    store: Arc<dyn BillingStore>,
}

impl CustomerService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn fetch(&self, id: i64) -> BillingResult<Customer> {
        self.store
            .fetch_customer(id)
            .await?
            .ok_or(BillingError::CustomerNotFound(id))
    }

    pub async fn fetch_all(
        &self,
        deleted: bool,
        status: Option<CustomerStatus>,
    ) -> BillingResult<Vec<Customer>> {
        self.store.fetch_customers(deleted, status).await
    }

    /// Find the live customer linked to a provider customer reference
    pub async fn fetch_by_stripe_id(&self, stripe_id: &str) -> BillingResult<Option<Customer>> {
        self.store.fetch_customer_by_stripe_id(stripe_id).await
    }

    pub async fn update(&self, id: i64, update: &CustomerUpdate) -> BillingResult<Customer> {
        self.store
            .update_customer(id, update)
            .await?
            .ok_or(BillingError::CustomerNotFound(id))
    }

    pub async fn deactivate(&self, id: i64) -> BillingResult<Customer> {
        let customer = self.update(id, &CustomerUpdate::deactivate()).await?;
        tracing::warn!(customer_id = id, "Customer deactivated");
        Ok(customer)
    }

    pub async fn create(&self, currency: Currency) -> BillingResult<Customer> {
        let customer = self
            .store
            .create_customer(currency)
            .await?
            .ok_or(BillingError::CreationFailed("customer"))?;

        tracing::info!(customer_id = customer.id, currency = %currency, "Customer created");
        Ok(customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[tokio::test]
    async fn test_fetch_missing_customer() {
        let service = CustomerService::new(Arc::new(InMemoryStore::new()));
        let err = service.fetch(404).await.unwrap_err();
        assert!(matches!(err, BillingError::CustomerNotFound(404)));
    }

    #[tokio::test]
    async fn test_create_then_deactivate() {
        let service = CustomerService::new(Arc::new(InMemoryStore::new()));
        let customer = service.create(Currency::Dkk).await.unwrap();
        assert!(customer.is_active());

        let customer = service.deactivate(customer.id).await.unwrap();
        assert_eq!(customer.status, CustomerStatus::Inactive);

        let inactive = service
            .fetch_all(false, Some(CustomerStatus::Inactive))
            .await
            .unwrap();
        assert_eq!(inactive.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_customer() {
        let service = CustomerService::new(Arc::new(InMemoryStore::new()));
        let err = service
            .update(9, &CustomerUpdate::soft_delete())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
