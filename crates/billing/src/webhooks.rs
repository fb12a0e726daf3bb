//! Stripe webhook handling
//!
//! Verified provider events are narrowed to the few [`PaymentEvent`]s the
//! billing core reacts to, then applied to invoices and customers. Payment
//! confirmation happens here, not in the synchronous charge path.

use std::sync::Arc;

use ledgerline_shared::{CustomerStatus, CustomerUpdate, InvoiceStatus, InvoiceUpdate};
use serde_json::Value;
use stripe::{Event, Webhook};

use crate::customer::CustomerService;
use crate::error::{BillingError, BillingResult};
use crate::gateway::{META_CUSTOMER_ID, META_INVOICE_ID};
use crate::invoices::InvoiceService;
use crate::store::BillingStore;

/// Provider events the billing core acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    /// A provider customer was created for one of our customers
    CustomerLinked {
        customer_id: i64,
        provider_customer_id: String,
    },
    PaymentSucceeded {
        invoice_id: i64,
        payment_ref: String,
    },
    PaymentProcessing {
        invoice_id: i64,
        payment_ref: String,
    },
    /// A payment method setup finished for a provider customer
    PaymentMethodAttached {
        provider_customer_id: String,
        payment_method_id: String,
    },
}

impl PaymentEvent {
    /// Narrow a verified provider event; `Ok(None)` for events we ignore
    pub fn from_stripe_event(event: &Event) -> BillingResult<Option<Self>> {
        let object = serde_json::to_value(&event.data.object)
            .map_err(|e| BillingError::Internal(format!("unreadable event object: {}", e)))?;
        Ok(Self::from_parts(&event.type_.to_string(), &object))
    }

    /// Narrow an event given its type name and the JSON of its data object
    pub fn from_parts(event_type: &str, object: &Value) -> Option<Self> {
        match event_type {
            "customer.created" => Some(PaymentEvent::CustomerLinked {
                customer_id: metadata_id(object, META_CUSTOMER_ID)?,
                provider_customer_id: object.get("id")?.as_str()?.to_string(),
            }),
            "payment_intent.succeeded" => Some(PaymentEvent::PaymentSucceeded {
                invoice_id: metadata_id(object, META_INVOICE_ID)?,
                payment_ref: object.get("id")?.as_str()?.to_string(),
            }),
            "payment_intent.processing" => Some(PaymentEvent::PaymentProcessing {
                invoice_id: metadata_id(object, META_INVOICE_ID)?,
                payment_ref: object.get("id")?.as_str()?.to_string(),
            }),
            "setup_intent.succeeded" => Some(PaymentEvent::PaymentMethodAttached {
                provider_customer_id: expandable_id(object.get("customer")?)?,
                payment_method_id: expandable_id(object.get("payment_method")?)?,
            }),
            _ => None,
        }
    }
}

/// Our numeric id stored under `key` in the object's metadata
fn metadata_id(object: &Value, key: &str) -> Option<i64> {
    object.get("metadata")?.get(key)?.as_str()?.trim().parse().ok()
}

/// Id of a field that is either a bare id or an expanded object
fn expandable_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(_) => value.get("id")?.as_str().map(str::to_string),
        _ => None,
    }
}

/// Webhook handler for Stripe events
#[derive(Clone)]
pub struct WebhookHandler {
    customers: CustomerService,
    invoices: InvoiceService,
    webhook_secret: String,
}

impl WebhookHandler {
    pub fn new(store: Arc<dyn BillingStore>, webhook_secret: impl Into<String>) -> Self {
        Self {
            customers: CustomerService::new(store.clone()),
            invoices: InvoiceService::new(store),
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Verify the signature header and parse the event
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        Webhook::construct_event(payload, signature, &self.webhook_secret).map_err(|e| {
            tracing::warn!(error = %e, payload_len = payload.len(), "Webhook signature rejected");
            BillingError::WebhookSignatureInvalid
        })
    }

    /// Apply a verified event, returning the narrowed event if one was acted on
    pub async fn handle_event(&self, event: &Event) -> BillingResult<Option<PaymentEvent>> {
        let Some(payment_event) = PaymentEvent::from_stripe_event(event)? else {
            tracing::info!(
                event_id = %event.id,
                event_type = %event.type_,
                "Ignoring webhook event"
            );
            return Ok(None);
        };

        tracing::info!(event_id = %event.id, event_type = %event.type_, "Processing webhook event");
        self.apply(&payment_event).await?;
        Ok(Some(payment_event))
    }

    pub async fn apply(&self, event: &PaymentEvent) -> BillingResult<()> {
        match event {
            PaymentEvent::CustomerLinked {
                customer_id,
                provider_customer_id,
            } => {
                let update = CustomerUpdate {
                    stripe_id: Some(provider_customer_id.clone()),
                    ..Default::default()
                };
                self.customers.update(*customer_id, &update).await?;
                tracing::info!(
                    customer_id,
                    stripe_customer_id = %provider_customer_id,
                    "Linked Stripe customer"
                );
            }

            PaymentEvent::PaymentSucceeded {
                invoice_id,
                payment_ref,
            } => {
                let invoice = self
                    .invoices
                    .update(
                        *invoice_id,
                        &InvoiceUpdate::payment(InvoiceStatus::Paid, payment_ref.clone()),
                    )
                    .await?;
                self.customers
                    .update(
                        invoice.customer_id,
                        &CustomerUpdate::status(CustomerStatus::Active),
                    )
                    .await?;
                tracing::info!(
                    invoice_id,
                    customer_id = invoice.customer_id,
                    payment_ref = %payment_ref,
                    "Invoice paid"
                );
            }

            PaymentEvent::PaymentProcessing {
                invoice_id,
                payment_ref,
            } => {
                self.invoices
                    .update(
                        *invoice_id,
                        &InvoiceUpdate::payment(InvoiceStatus::Processing, payment_ref.clone()),
                    )
                    .await?;
                tracing::info!(invoice_id, payment_ref = %payment_ref, "Invoice payment processing");
            }

            PaymentEvent::PaymentMethodAttached {
                provider_customer_id,
                payment_method_id,
            } => {
                let Some(customer) = self.customers.fetch_by_stripe_id(provider_customer_id).await?
                else {
                    tracing::warn!(
                        stripe_customer_id = %provider_customer_id,
                        "Payment method attached for unknown customer"
                    );
                    return Ok(());
                };

                let update = CustomerUpdate {
                    default_payment_method_id: Some(payment_method_id.clone()),
                    ..Default::default()
                };
                self.customers.update(customer.id, &update).await?;
                tracing::info!(
                    customer_id = customer.id,
                    payment_method_id = %payment_method_id,
                    "Default payment method set"
                );
            }
        }

        Ok(())
    }
}
