//! Billing configuration loaded from the environment

use std::str::FromStr;
use std::time::Duration;

use crate::client::StripeConfig;
use crate::error::{BillingError, BillingResult};

/// Charge attempts allowed before the owning customer is deactivated
pub const DEFAULT_MAX_CHARGE_RETRIES: i32 = 3;

/// Roughly one month (30.4 days)
pub const DEFAULT_MONTHLY_PERIOD_MS: u64 = 2_628_000_000;

/// One day
pub const DEFAULT_RETRY_PERIOD_MS: u64 = 86_400_000;

/// Timer periods for the two batch runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub monthly_period: Duration,
    pub retry_period: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            monthly_period: Duration::from_millis(DEFAULT_MONTHLY_PERIOD_MS),
            retry_period: Duration::from_millis(DEFAULT_RETRY_PERIOD_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Postgres URL; when absent the worker runs on the in-memory store
    pub database_url: Option<String>,
    /// Stripe credentials; when absent no provider is configured
    pub stripe: Option<StripeConfig>,
    pub max_charge_retries: i32,
    pub schedule: ScheduleConfig,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            stripe: None,
            max_charge_retries: DEFAULT_MAX_CHARGE_RETRIES,
            schedule: ScheduleConfig::default(),
        }
    }
}

impl BillingConfig {
    /// Read configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a local `.env` file.
    pub fn from_env() -> BillingResult<Self> {
        let database_url = optional_var("DATABASE_URL");

        let stripe = match optional_var("STRIPE_SECRET_KEY") {
            Some(_) => Some(StripeConfig::from_env()?),
            None => None,
        };

        let max_charge_retries = parse_var("MAX_CHARGE_RETRIES", DEFAULT_MAX_CHARGE_RETRIES)?;
        if max_charge_retries < 1 {
            return Err(BillingError::Config(
                "MAX_CHARGE_RETRIES must be at least 1".to_string(),
            ));
        }

        let monthly_ms = parse_var("MONTHLY_CHARGE_PERIOD_MS", DEFAULT_MONTHLY_PERIOD_MS)?;
        let retry_ms = parse_var("RETRY_PERIOD_MS", DEFAULT_RETRY_PERIOD_MS)?;
        if monthly_ms == 0 || retry_ms == 0 {
            return Err(BillingError::Config(
                "Scheduler periods must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            stripe,
            max_charge_retries,
            schedule: ScheduleConfig {
                monthly_period: Duration::from_millis(monthly_ms),
                retry_period: Duration::from_millis(retry_ms),
            },
        })
    }
}

pub(crate) fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn parse_var<T: FromStr>(key: &str, default: T) -> BillingResult<T> {
    match optional_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BillingError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
