use std::env;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub notification_queue_size: usize,
    pub event_buffer_size: usize,
    pub business: BusinessRules,
    pub overdue_sweep_secs: u64,
}

/// Tunables of the business operations. Pricing values are only defaults,
/// the `settings` table overrides them at runtime.
#[derive(Debug, Clone)]
pub struct BusinessRules {
    pub bon_value_eur: f64,
    pub supplement_per_km_bons: f64,
    pub vat_rate: f64,
    pub cancellation_fee_eur: f64,
    pub dispatch_advance_minutes: i64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            bon_value_eur: 5.5,
            supplement_per_km_bons: 0.1,
            vat_rate: 0.20,
            cancellation_fee_eur: 8.0,
            dispatch_advance_minutes: 45,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = BusinessRules::default();
        let log_format = match env::var("LOG_FORMAT") {
            Ok(raw) if raw.eq_ignore_ascii_case("json") => LogFormat::Json,
            Ok(raw) if raw.eq_ignore_ascii_case("compact") => LogFormat::Compact,
            Ok(raw) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {raw} (expected compact or json)"
                )));
            }
            Err(_) => LogFormat::Compact,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            notification_queue_size: parse_or_default("NOTIFICATION_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            business: BusinessRules {
                bon_value_eur: parse_or_default("BON_VALUE_EUR", defaults.bon_value_eur)?,
                supplement_per_km_bons: parse_or_default(
                    "SUPPLEMENT_PER_KM_BONS",
                    defaults.supplement_per_km_bons,
                )?,
                vat_rate: parse_or_default("VAT_RATE", defaults.vat_rate)?,
                cancellation_fee_eur: parse_or_default(
                    "CANCELLATION_FEE_EUR",
                    defaults.cancellation_fee_eur,
                )?,
                dispatch_advance_minutes: parse_or_default(
                    "DISPATCH_ADVANCE_MINUTES",
                    defaults.dispatch_advance_minutes,
                )?,
            },
            overdue_sweep_secs: parse_or_default("OVERDUE_SWEEP_SECS", 3600)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
