//! Stripe client wrapper and the Stripe-backed payment gateway

use std::collections::HashMap;

use async_trait::async_trait;
use ledgerline_shared::Currency;
use stripe::{
    CreateCustomer, CreatePaymentIntent, CreateSetupIntent, Customer, CustomerId, PaymentIntent,
    PaymentIntentStatus, PaymentMethodId, SetupIntent,
};

use crate::config::optional_var;
use crate::error::{BillingError, BillingResult};
use crate::gateway::{
    ChargeRequest, PaymentGateway, PaymentSetup, PaymentSetupRequest, META_CUSTOMER_ID,
};

/// Stripe credentials
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = optional_var("STRIPE_SECRET_KEY")
            .ok_or_else(|| BillingError::Config("STRIPE_SECRET_KEY is not set".to_string()))?;
        let webhook_secret = optional_var("STRIPE_WEBHOOK_SECRET").ok_or_else(|| {
            BillingError::Config("STRIPE_WEBHOOK_SECRET is not set".to_string())
        })?;

        Ok(Self {
            secret_key,
            webhook_secret,
        })
    }
}

// Keep secrets out of logs
impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[redacted]")
            .field("webhook_secret", &"[redacted]")
            .finish()
    }
}

/// Thin wrapper around `stripe::Client` that also keeps its configuration
#[derive(Clone)]
pub struct StripeClient {
    inner: stripe::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = stripe::Client::new(config.secret_key.clone());
        Self { inner, config }
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.inner
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Client that sends the given idempotency key with every request
    fn idempotent(&self, key: &str) -> stripe::Client {
        self.inner
            .clone()
            .with_strategy(stripe::RequestStrategy::Idempotent(key.to_string()))
    }

    async fn ensure_customer(&self, request: &PaymentSetupRequest) -> BillingResult<CustomerId> {
        if let Some(reference) = &request.customer_reference {
            let id = parse_customer_id(reference)?;
            let customer = Customer::retrieve(&self.inner, &id, &[]).await?;
            return Ok(customer.id);
        }

        let mut meta = HashMap::new();
        meta.insert(META_CUSTOMER_ID.to_string(), request.customer_id.to_string());

        let mut params = CreateCustomer::new();
        params.metadata = Some(meta);

        let customer = Customer::create(&self.inner, params).await?;
        tracing::info!(
            customer_id = request.customer_id,
            stripe_customer_id = %customer.id,
            "Created Stripe customer"
        );
        Ok(customer.id)
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn charge(&self, request: &ChargeRequest) -> BillingResult<bool> {
        let mut params =
            CreatePaymentIntent::new(request.amount_minor, stripe_currency(request.currency));
        params.confirm = Some(true);
        params.metadata = Some(request.metadata());
        params.payment_method = Some(
            request
                .payment_method
                .parse::<PaymentMethodId>()
                .map_err(|e| BillingError::InvalidInput(format!("payment method: {}", e)))?,
        );
        if let Some(reference) = &request.customer_reference {
            params.customer = Some(parse_customer_id(reference)?);
        }

        let client = self.idempotent(&request.idempotency_key);
        match PaymentIntent::create(&client, params).await {
            Ok(intent) => {
                let accepted = matches!(
                    intent.status,
                    PaymentIntentStatus::Succeeded
                        | PaymentIntentStatus::Processing
                        | PaymentIntentStatus::RequiresCapture
                );
                tracing::info!(
                    invoice_id = request.invoice_id,
                    payment_intent_id = %intent.id,
                    status = ?intent.status,
                    accepted,
                    "Payment intent created"
                );
                Ok(accepted)
            }
            Err(stripe::StripeError::Stripe(request_error))
                if is_card_error(&request_error) =>
            {
                tracing::warn!(
                    invoice_id = request.invoice_id,
                    http_status = request_error.http_status,
                    message = ?request_error.message,
                    "Card declined"
                );
                Ok(false)
            }
            Err(e) => {
                tracing::error!(
                    invoice_id = request.invoice_id,
                    error = %e,
                    "Stripe charge failed"
                );
                Err(e.into())
            }
        }
    }

    async fn init_payment_setup(
        &self,
        request: &PaymentSetupRequest,
    ) -> BillingResult<PaymentSetup> {
        let customer_id = self
            .ensure_customer(request)
            .await
            .map_err(|e| BillingError::PaymentSetupFailed(e.to_string()))?;

        let mut params = CreateSetupIntent::new();
        params.customer = Some(customer_id);
        params.payment_method_types = Some(vec!["card".to_string()]);

        let intent = SetupIntent::create(&self.inner, params)
            .await
            .map_err(|e| BillingError::PaymentSetupFailed(e.to_string()))?;

        Ok(PaymentSetup {
            reference: intent.id.to_string(),
            client_secret: intent.client_secret,
        })
    }
}

fn is_card_error(error: &stripe::RequestError) -> bool {
    matches!(error.error_type, stripe::ErrorType::Card) || error.http_status == 402
}

fn parse_customer_id(reference: &str) -> BillingResult<CustomerId> {
    reference
        .parse::<CustomerId>()
        .map_err(|e| BillingError::InvalidInput(format!("customer reference: {}", e)))
}

pub(crate) fn stripe_currency(currency: Currency) -> stripe::Currency {
    match currency {
        Currency::Usd => stripe::Currency::USD,
        Currency::Ngn => stripe::Currency::NGN,
        Currency::Sek => stripe::Currency::SEK,
        Currency::Dkk => stripe::Currency::DKK,
        Currency::Eur => stripe::Currency::EUR,
        Currency::Gbp => stripe::Currency::GBP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_mapping() {
        assert_eq!(stripe_currency(Currency::Ngn), stripe::Currency::NGN);
        assert_eq!(stripe_currency(Currency::Usd), stripe::Currency::USD);
    }

    #[test]
    fn test_config_debug_redacts_secrets() {
        let config = StripeConfig {
            secret_key: "sk_test_abc".to_string(),
            webhook_secret: "whsec_abc".to_string(),
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("sk_test_abc"));
        assert!(!printed.contains("whsec_abc"));
    }

    #[test]
    fn test_customer_reference_must_be_stripe_id() {
        assert!(parse_customer_id("cus_123").is_ok());
        assert!(matches!(
            parse_customer_id("not-a-customer"),
            Err(BillingError::InvalidInput(_))
        ));
    }
}
