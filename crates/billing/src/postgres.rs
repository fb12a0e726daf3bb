//! Postgres-backed store
//!
//! Money is stored as a `NUMERIC` amount plus a currency code column; enum
//! states are stored as upper-case text. Partial updates use
//! `COALESCE($n, column)` so a `NULL` bind leaves the column untouched.

use async_trait::async_trait;
use ledgerline_shared::{
    Currency, Customer, CustomerStatus, CustomerUpdate, Invoice, InvoiceFilter, InvoiceUpdate,
    Money, Subscription, SubscriptionPlan, SubscriptionPlanUpdate, SubscriptionUpdate,
};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};
use crate::store::{CustomerStore, InvoiceStore, NewInvoice, PlanStore, SubscriptionStore};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> BillingResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BillingError::Database(e.to_string()))?;
        tracing::info!("Billing migrations applied");
        Ok(())
    }
}

#[derive(FromRow)]
struct InvoiceRow {
    id: i64,
    customer_id: i64,
    subscription_id: i64,
    amount: Decimal,
    currency: String,
    status: String,
    payment_ref: Option<String>,
    description: Option<String>,
    number_of_failed_charges: Option<i32>,
    last_failed_charge: Option<OffsetDateTime>,
    charge_start_date: OffsetDateTime,
    charge_end_date: OffsetDateTime,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = BillingError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: row.id,
            customer_id: row.customer_id,
            subscription_id: row.subscription_id,
            amount: Money::new(row.amount, row.currency.parse()?),
            status: row.status.parse()?,
            payment_ref: row.payment_ref,
            description: row.description,
            number_of_failed_charges: row.number_of_failed_charges,
            last_failed_charge: row.last_failed_charge,
            charge_start_date: row.charge_start_date,
            charge_end_date: row.charge_end_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(FromRow)]
struct CustomerRow {
    id: i64,
    currency: String,
    status: String,
    stripe_id: Option<String>,
    default_payment_method_id: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = BillingError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(Customer {
            id: row.id,
            currency: row.currency.parse()?,
            status: row.status.parse()?,
            stripe_id: row.stripe_id,
            default_payment_method_id: row.default_payment_method_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(FromRow)]
struct SubscriptionRow {
    id: i64,
    customer_id: i64,
    plan_id: i64,
    amount: Decimal,
    currency: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = BillingError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: row.id,
            customer_id: row.customer_id,
            plan_id: row.plan_id,
            amount: Money::new(row.amount, row.currency.parse()?),
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(FromRow)]
struct PlanRow {
    id: i64,
    name: String,
    amount: Decimal,
    currency: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl TryFrom<PlanRow> for SubscriptionPlan {
    type Error = BillingError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(SubscriptionPlan {
            id: row.id,
            name: row.name,
            amount: Money::new(row.amount, row.currency.parse()?),
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

fn convert_rows<R, T>(rows: Vec<R>) -> BillingResult<Vec<T>>
where
    T: TryFrom<R, Error = BillingError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn convert_row<R, T>(row: Option<R>) -> BillingResult<Option<T>>
where
    T: TryFrom<R, Error = BillingError>,
{
    row.map(T::try_from).transpose()
}

const INVOICE_COLUMNS: &str = "id, customer_id, subscription_id, amount, currency, status, \
     payment_ref, description, number_of_failed_charges, last_failed_charge, \
     charge_start_date, charge_end_date, created_at, updated_at, deleted_at";

const CUSTOMER_COLUMNS: &str = "id, currency, status, stripe_id, default_payment_method_id, \
     created_at, updated_at, deleted_at";

const SUBSCRIPTION_COLUMNS: &str =
    "id, customer_id, plan_id, amount, currency, created_at, updated_at, deleted_at";

const PLAN_COLUMNS: &str = "id, name, amount, currency, created_at, updated_at, deleted_at";

#[async_trait]
impl InvoiceStore for PgStore {
    async fn fetch_invoices(&self, filter: &InvoiceFilter) -> BillingResult<Vec<Invoice>> {
        let statuses: Option<Vec<String>> = filter
            .statuses
            .as_ref()
            .map(|s| s.iter().map(|status| status.as_str().to_string()).collect());

        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE (deleted_at IS NOT NULL) = $1
              AND ($2::text[] IS NULL OR status = ANY($2))
              AND ($3::bigint IS NULL OR customer_id = $3)
            ORDER BY id
            "#
        ))
        .bind(filter.deleted)
        .bind(statuses)
        .bind(filter.customer_id)
        .fetch_all(&self.pool)
        .await?;

        convert_rows(rows)
    }

    async fn fetch_invoice(&self, id: i64) -> BillingResult<Option<Invoice>> {
        let row: Option<InvoiceRow> =
            sqlx::query_as(&format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        convert_row(row)
    }

    async fn update_invoice(
        &self,
        id: i64,
        update: &InvoiceUpdate,
    ) -> BillingResult<Option<Invoice>> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!(
            r#"
            UPDATE invoices SET
                amount = COALESCE($2, amount),
                currency = COALESCE($3, currency),
                status = COALESCE($4, status),
                payment_ref = COALESCE($5, payment_ref),
                description = COALESCE($6, description),
                number_of_failed_charges = COALESCE($7, number_of_failed_charges),
                last_failed_charge = COALESCE($8, last_failed_charge),
                charge_start_date = COALESCE($9, charge_start_date),
                charge_end_date = COALESCE($10, charge_end_date),
                deleted_at = CASE WHEN $11 THEN NOW() ELSE deleted_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.amount.map(|m| m.value))
        .bind(update.amount.map(|m| m.currency.as_str()))
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.payment_ref.as_deref())
        .bind(update.description.as_deref())
        .bind(update.number_of_failed_charges)
        .bind(update.last_failed_charge)
        .bind(update.charge_start_date)
        .bind(update.charge_end_date)
        .bind(update.deleted)
        .fetch_optional(&self.pool)
        .await?;

        convert_row(row)
    }

    async fn create_invoice(&self, new: NewInvoice) -> BillingResult<Option<Invoice>> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO invoices
                (customer_id, subscription_id, amount, currency, status, description,
                 charge_start_date, charge_end_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(new.customer_id)
        .bind(new.subscription_id)
        .bind(new.amount.value)
        .bind(new.amount.currency.as_str())
        .bind(new.status.as_str())
        .bind(new.description.as_deref())
        .bind(new.charge_start_date)
        .bind(new.charge_end_date)
        .fetch_optional(&self.pool)
        .await?;

        convert_row(row)
    }
}

#[async_trait]
impl CustomerStore for PgStore {
    async fn fetch_customers(
        &self,
        deleted: bool,
        status: Option<CustomerStatus>,
    ) -> BillingResult<Vec<Customer>> {
        let rows: Vec<CustomerRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CUSTOMER_COLUMNS}
            FROM customers
            WHERE (deleted_at IS NOT NULL) = $1
              AND ($2::text IS NULL OR status = $2)
            ORDER BY id
            "#
        ))
        .bind(deleted)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        convert_rows(rows)
    }

    async fn fetch_customer(&self, id: i64) -> BillingResult<Option<Customer>> {
        let row: Option<CustomerRow> =
            sqlx::query_as(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        convert_row(row)
    }

    async fn fetch_customer_by_stripe_id(
        &self,
        stripe_id: &str,
    ) -> BillingResult<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers \
             WHERE stripe_id = $1 AND deleted_at IS NULL ORDER BY id LIMIT 1"
        ))
        .bind(stripe_id)
        .fetch_optional(&self.pool)
        .await?;

        convert_row(row)
    }

    async fn update_customer(
        &self,
        id: i64,
        update: &CustomerUpdate,
    ) -> BillingResult<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            r#"
            UPDATE customers SET
                status = COALESCE($2, status),
                currency = COALESCE($3, currency),
                stripe_id = COALESCE($4, stripe_id),
                default_payment_method_id = COALESCE($5, default_payment_method_id),
                deleted_at = CASE WHEN $6 THEN NOW() ELSE deleted_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.currency.map(|c| c.as_str()))
        .bind(update.stripe_id.as_deref())
        .bind(update.default_payment_method_id.as_deref())
        .bind(update.deleted)
        .fetch_optional(&self.pool)
        .await?;

        convert_row(row)
    }

    async fn create_customer(&self, currency: Currency) -> BillingResult<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "INSERT INTO customers (currency, status) VALUES ($1, $2) RETURNING {CUSTOMER_COLUMNS}"
        ))
        .bind(currency.as_str())
        .bind(CustomerStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await?;

        convert_row(row)
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn fetch_subscriptions(
        &self,
        deleted: bool,
        customer_id: Option<i64>,
        plan_id: Option<i64>,
    ) -> BillingResult<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE (deleted_at IS NOT NULL) = $1
              AND ($2::bigint IS NULL OR customer_id = $2)
              AND ($3::bigint IS NULL OR plan_id = $3)
            ORDER BY id
            "#
        ))
        .bind(deleted)
        .bind(customer_id)
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await?;

        convert_rows(rows)
    }

    async fn fetch_subscription(&self, id: i64) -> BillingResult<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        convert_row(row)
    }

    async fn update_subscription(
        &self,
        id: i64,
        update: &SubscriptionUpdate,
    ) -> BillingResult<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            UPDATE subscriptions SET
                amount = COALESCE($2, amount),
                currency = COALESCE($3, currency),
                plan_id = COALESCE($4, plan_id),
                deleted_at = CASE WHEN $5 THEN NOW() ELSE deleted_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.amount.map(|m| m.value))
        .bind(update.amount.map(|m| m.currency.as_str()))
        .bind(update.plan_id)
        .bind(update.deleted)
        .fetch_optional(&self.pool)
        .await?;

        convert_row(row)
    }

    async fn create_subscription(
        &self,
        plan_id: i64,
        customer_id: i64,
        amount: Money,
    ) -> BillingResult<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO subscriptions (customer_id, plan_id, amount, currency)
            VALUES ($1, $2, $3, $4)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(customer_id)
        .bind(plan_id)
        .bind(amount.value)
        .bind(amount.currency.as_str())
        .fetch_optional(&self.pool)
        .await?;

        convert_row(row)
    }
}

#[async_trait]
impl PlanStore for PgStore {
    async fn fetch_plans(&self, deleted: bool) -> BillingResult<Vec<SubscriptionPlan>> {
        let rows: Vec<PlanRow> = sqlx::query_as(&format!(
            "SELECT {PLAN_COLUMNS} FROM subscription_plans \
             WHERE (deleted_at IS NOT NULL) = $1 ORDER BY id"
        ))
        .bind(deleted)
        .fetch_all(&self.pool)
        .await?;

        convert_rows(rows)
    }

    async fn fetch_plan(&self, id: i64) -> BillingResult<Option<SubscriptionPlan>> {
        let row: Option<PlanRow> = sqlx::query_as(&format!(
            "SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        convert_row(row)
    }

    async fn update_plan(
        &self,
        id: i64,
        update: &SubscriptionPlanUpdate,
    ) -> BillingResult<Option<SubscriptionPlan>> {
        let row: Option<PlanRow> = sqlx::query_as(&format!(
            r#"
            UPDATE subscription_plans SET
                name = COALESCE($2, name),
                amount = COALESCE($3, amount),
                currency = COALESCE($4, currency),
                deleted_at = CASE WHEN $5 THEN NOW() ELSE deleted_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.amount.map(|m| m.value))
        .bind(update.amount.map(|m| m.currency.as_str()))
        .bind(update.deleted)
        .fetch_optional(&self.pool)
        .await?;

        convert_row(row)
    }

    async fn create_plan(
        &self,
        name: &str,
        amount: Money,
    ) -> BillingResult<Option<SubscriptionPlan>> {
        let row: Option<PlanRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO subscription_plans (name, amount, currency)
            VALUES ($1, $2, $3)
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(amount.value)
        .bind(amount.currency.as_str())
        .fetch_optional(&self.pool)
        .await?;

        convert_row(row)
    }
}
