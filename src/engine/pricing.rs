//! Tariff engine.
//!
//! Prices are expressed in *bons*. Every city carries one pickup tariff per
//! formula; a trip is charged the higher of its two cities' tariffs. A
//! kilometre surcharge is added only for suburb-to-suburb trips, i.e. when
//! neither end is in Paris.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::AppError;
use crate::models::change::{ChangeKind, Table};
use crate::models::order::Formula;
use crate::state::AppState;

pub const SETTING_BON_VALUE: &str = "bon_value_eur";
pub const SETTING_SUPPLEMENT_PER_KM: &str = "supplement_per_km_bons";

const EMBEDDED_TARIFFS: &str = include_str!("../../data/pickup_tariffs.json");

#[derive(Debug, Clone, Deserialize)]
struct TariffRow {
    city: String,
    normal: f64,
    express: f64,
    urgent: f64,
    vl_normal: f64,
    vl_express: f64,
}

impl TariffRow {
    fn for_formula(&self, formula: Formula) -> f64 {
        match formula {
            Formula::Normal => self.normal,
            Formula::Express => self.express,
            Formula::Urgent => self.urgent,
            Formula::VlNormal => self.vl_normal,
            Formula::VlExpress => self.vl_express,
        }
    }
}

/// Pickup tariffs per city, in table order. Fuzzy lookups return the first
/// matching row, so order matters.
pub struct TariffTable {
    rows: Vec<TariffRow>,
}

impl TariffTable {
    pub fn embedded() -> &'static TariffTable {
        static TABLE: OnceLock<TariffTable> = OnceLock::new();
        TABLE.get_or_init(|| {
            let rows: Vec<TariffRow> =
                serde_json::from_str(EMBEDDED_TARIFFS).expect("embedded tariff table is valid json");
            TariffTable { rows }
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolves a free-form city name to its canonical table key.
    pub fn find_city(&self, city: &str) -> Option<&str> {
        let wanted = normalize_city(city);
        if wanted.is_empty() {
            return None;
        }

        if let Some(row) = self.rows.iter().find(|row| row.city == wanted) {
            return Some(row.city.as_str());
        }

        self.rows
            .iter()
            .find(|row| wanted.contains(row.city.as_str()) || row.city.contains(wanted.as_str()))
            .map(|row| row.city.as_str())
    }

    pub fn pickup_charge(&self, city: &str, formula: Formula) -> Result<f64, AppError> {
        let key = self
            .find_city(city)
            .ok_or_else(|| AppError::BadRequest(format!("city not in tariff table: {city}")))?;

        self.rows
            .iter()
            .find(|row| row.city == key)
            .map(|row| row.for_formula(formula))
            .ok_or_else(|| AppError::Internal(format!("tariff row vanished for {key}")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricingConfig {
    pub bon_value_eur: f64,
    pub supplement_per_km_bons: f64,
}

impl PricingConfig {
    /// Settings rows win over the configured defaults. Unparsable rows are
    /// ignored.
    pub fn resolve(state: &AppState) -> Self {
        let read = |key: &str, default: f64| {
            state
                .settings
                .get(key)
                .and_then(|value| value.parse::<f64>().ok())
                .unwrap_or(default)
        };

        Self {
            bon_value_eur: read(SETTING_BON_VALUE, state.rules.bon_value_eur),
            supplement_per_km_bons: read(
                SETTING_SUPPLEMENT_PER_KM,
                state.rules.supplement_per_km_bons,
            ),
        }
    }
}

/// Stores new pricing values in the settings table. Absent fields keep their
/// current value.
pub fn update_settings(
    state: &AppState,
    bon_value_eur: Option<f64>,
    supplement_per_km_bons: Option<f64>,
) -> Result<PricingConfig, AppError> {
    let updates = [
        (SETTING_BON_VALUE, bon_value_eur),
        (SETTING_SUPPLEMENT_PER_KM, supplement_per_km_bons),
    ];

    for (key, value) in updates {
        if let Some(value) = value {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::BadRequest(format!("{key} must be a positive number")));
            }
        }
    }

    for (key, value) in updates {
        if let Some(value) = value {
            state.settings.insert(key.to_string(), value.to_string());
        }
    }
    state.publish(Table::Settings, ChangeKind::Update, None);

    Ok(PricingConfig::resolve(state))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub departure_city: String,
    pub arrival_city: String,
    pub formula: Formula,
    pub distance_km: f64,
    pub pickup_charge_bons: f64,
    pub supplement_bons: f64,
    pub total_bons: f64,
    pub total_eur: f64,
    pub paris_involved: bool,
    pub supplement_applied: bool,
}

/// Uppercase, strip accents, dash-separate words.
pub fn normalize_city(city: &str) -> String {
    let upper: String = city
        .trim()
        .to_uppercase()
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .map(|c| match c {
            '\'' | '\u{2019}' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect();

    let mut collapsed = String::with_capacity(upper.len());
    for c in upper.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    collapsed.trim_matches('-').to_string()
}

pub fn is_paris(city: &str) -> bool {
    let normalized = normalize_city(city);
    normalized == "PARIS" || normalized.starts_with("PARIS-")
}

pub fn quote(
    table: &TariffTable,
    departure: &str,
    arrival: &str,
    distance_meters: f64,
    formula: Formula,
    config: &PricingConfig,
) -> Result<Quote, AppError> {
    if !distance_meters.is_finite() || distance_meters < 0.0 {
        return Err(AppError::BadRequest(
            "distance must be a positive number of meters".to_string(),
        ));
    }

    let departure_city = table
        .find_city(departure)
        .ok_or_else(|| AppError::BadRequest(format!("departure city not found: {departure}")))?;
    let arrival_city = table
        .find_city(arrival)
        .ok_or_else(|| AppError::BadRequest(format!("arrival city not found: {arrival}")))?;

    let distance_km = distance_meters / 1000.0;
    let pickup_charge = table
        .pickup_charge(departure_city, formula)?
        .max(table.pickup_charge(arrival_city, formula)?);

    let paris_involved = is_paris(departure_city) || is_paris(arrival_city);
    let supplement = if paris_involved {
        0.0
    } else {
        distance_km * config.supplement_per_km_bons
    };

    let total_bons = pickup_charge + supplement;
    let total_eur = total_bons * config.bon_value_eur;

    Ok(Quote {
        departure_city: departure_city.to_string(),
        arrival_city: arrival_city.to_string(),
        formula,
        distance_km: round_to(distance_km, 3),
        pickup_charge_bons: round_to(pickup_charge, 3),
        supplement_bons: round_to(supplement, 3),
        total_bons: round_to(total_bons, 3),
        total_eur: round_to(total_eur, 2),
        paris_involved,
        supplement_applied: !paris_involved,
    })
}

pub fn quote_all_formulas(
    table: &TariffTable,
    departure: &str,
    arrival: &str,
    distance_meters: f64,
    config: &PricingConfig,
) -> Result<Vec<Quote>, AppError> {
    Formula::ALL
        .iter()
        .map(|formula| quote(table, departure, arrival, distance_meters, *formula, config))
        .collect()
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
