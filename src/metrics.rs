//! Replenishment analytics derived from raw inventory records.
//!
//! Every derived field is computed in a fixed order and may only read fields
//! computed before it. Numeric edge cases (no sales, intake in the future,
//! zero divisors, negative square-root arguments) resolve to [`Metric::Empty`]
//! instead of surfacing as errors.

use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, EnrichedRecord, Metric, PurchaseStrategy, RawRecord};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsEngine {
    holding_cost_percent: f64,
    turnover_window_days: f64,
    reorder_level_max: f64,
    prepare_level_max: f64,
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self::new(&AppSettings::default())
    }
}

impl MetricsEngine {
    pub fn new(settings: &AppSettings) -> Self {
        Self {
            holding_cost_percent: settings.holding_cost_percent,
            turnover_window_days: settings.turnover_window_days,
            reorder_level_max: settings.reorder_level_max,
            prepare_level_max: settings.prepare_level_max,
        }
    }

    /// Enriches a batch against the supplied clock reading.
    ///
    /// The batch is validated up front: the first record missing a required
    /// field aborts the call and nothing is returned for the other records.
    pub fn enrich(&self, records: &[RawRecord], as_of: NaiveDateTime) -> AppResult<Vec<EnrichedRecord>> {
        let checked = records
            .iter()
            .enumerate()
            .map(|(index, record)| CheckedRecord::from_raw(record, index + 1))
            .collect::<AppResult<Vec<_>>>()
            .inspect_err(|error| tracing::warn!(error = %error, "rejected inventory batch"))?;

        let enriched = checked
            .into_iter()
            .enumerate()
            .map(|(index, record)| self.enrich_one(record, sequence_id(index), as_of))
            .collect::<Vec<_>>();

        tracing::info!(rows = enriched.len(), as_of = %as_of, "enriched inventory batch");
        Ok(enriched)
    }

    fn enrich_one(&self, record: CheckedRecord, sequence_id: u32, as_of: NaiveDateTime) -> EnrichedRecord {
        let days_elapsed = days_elapsed(record.intake_date, as_of);
        let velocity = sales_velocity(record.units_sold, days_elapsed);

        let intake_total = record.stock + record.units_sold;
        let monthly_turnover = match velocity {
            Some(per_day) => round_half_even(per_day * self.turnover_window_days, 2),
            None => Metric::Empty,
        };
        let stockout_days = match velocity {
            Some(per_day) => round_half_even(record.lead_time_days * per_day, 0),
            None => Metric::Empty,
        };
        let purchase_strategy = self.purchase_strategy(stockout_days, record.stock, record.lead_time_days, velocity);
        let holding_cost = match record.unit_cost {
            Some(cost) => Metric::new(cost * self.holding_cost_percent / 100.0),
            None => Metric::Empty,
        };
        let reorder_quantity = reorder_quantity(
            purchase_strategy,
            holding_cost,
            stockout_days,
            record.stock,
            record.units_sold,
            record.ordering_cost,
        );

        EnrichedRecord {
            sequence_id,
            product_name: record.product_name,
            stock: record.stock,
            units_sold: record.units_sold,
            unit_cost: Metric::from(record.unit_cost),
            ordering_cost: record.ordering_cost,
            lead_time_days: record.lead_time_days,
            intake_date: record.intake_date,
            last_intake_date: record.last_intake_date,
            intake_total,
            monthly_turnover,
            stockout_days,
            purchase_strategy,
            holding_cost,
            reorder_quantity,
        }
    }

    fn purchase_strategy(
        &self,
        stockout_days: Metric,
        stock: f64,
        lead_time_days: f64,
        velocity: Option<f64>,
    ) -> Option<PurchaseStrategy> {
        let stockout_days = stockout_days.value()?;
        let per_day = velocity?;
        if stockout_days <= 0.0 {
            return None;
        }

        let lead_time_demand = lead_time_days * per_day;
        let level = checked_div(stock, lead_time_demand).ok()?;
        if level <= self.reorder_level_max {
            Some(PurchaseStrategy::Reorder)
        } else if level <= self.prepare_level_max {
            Some(PurchaseStrategy::Prepare)
        } else {
            None
        }
    }
}

/// Enriches with the default settings.
pub fn enrich(records: &[RawRecord], as_of: NaiveDateTime) -> AppResult<Vec<EnrichedRecord>> {
    MetricsEngine::default().enrich(records, as_of)
}

/// Rounds to `places` decimals, ties going to the even neighbour.
pub fn round_half_even(value: f64, places: i32) -> Metric {
    let factor = 10f64.powi(places);
    Metric::new((value * factor).round_ties_even() / factor)
}

fn sequence_id(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

/// Whole days between midnight of the intake date and `as_of`.
fn days_elapsed(intake_date: Option<NaiveDate>, as_of: NaiveDateTime) -> Option<i64> {
    let intake = intake_date?.and_time(NaiveTime::MIN);
    Some((as_of - intake).num_days())
}

/// Units sold per elapsed day; `None` when there were no sales or no elapsed time.
fn sales_velocity(units_sold: f64, days_elapsed: Option<i64>) -> Option<f64> {
    let days = days_elapsed?;
    if units_sold > 0.0 && days > 0 {
        Some(units_sold / days as f64)
    } else {
        None
    }
}

fn reorder_quantity(
    strategy: Option<PurchaseStrategy>,
    holding_cost: Metric,
    stockout_days: Metric,
    stock: f64,
    units_sold: f64,
    ordering_cost: f64,
) -> Metric {
    if strategy.is_none() {
        return Metric::Empty;
    }
    let (Some(holding), Some(stockout)) = (holding_cost.value(), stockout_days.value()) else {
        return Metric::Empty;
    };
    if holding <= 0.0 {
        return Metric::Empty;
    }

    let order_term = checked_div(2.0 * units_sold * ordering_cost, holding).and_then(checked_sqrt);
    match order_term {
        Ok(term) => round_half_even((stockout - stock) + term, 0),
        Err(error) => {
            tracing::debug!(error = %error, "reorder quantity left empty");
            Metric::Empty
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DomainError {
    DivisionByZero,
    NegativeRadicand(f64),
    NonFinite,
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::NegativeRadicand(value) => write!(f, "square root of negative value {}", value),
            Self::NonFinite => write!(f, "non-finite intermediate value"),
        }
    }
}

fn checked_div(numerator: f64, denominator: f64) -> Result<f64, DomainError> {
    if denominator == 0.0 {
        return Err(DomainError::DivisionByZero);
    }
    let quotient = numerator / denominator;
    if quotient.is_finite() {
        Ok(quotient)
    } else {
        Err(DomainError::NonFinite)
    }
}

fn checked_sqrt(radicand: f64) -> Result<f64, DomainError> {
    if !radicand.is_finite() {
        return Err(DomainError::NonFinite);
    }
    if radicand < 0.0 {
        return Err(DomainError::NegativeRadicand(radicand));
    }
    Ok(radicand.sqrt())
}

/// A record whose required fields are all present.
#[derive(Debug, Clone)]
struct CheckedRecord {
    product_name: String,
    stock: f64,
    units_sold: f64,
    unit_cost: Option<f64>,
    ordering_cost: f64,
    lead_time_days: f64,
    intake_date: Option<NaiveDate>,
    last_intake_date: Option<NaiveDate>,
}

impl CheckedRecord {
    fn from_raw(raw: &RawRecord, position: usize) -> AppResult<Self> {
        let product_name = raw
            .product_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(AppError::Validation {
                position,
                field: "product_name",
            })?
            .to_string();

        Ok(Self {
            product_name,
            stock: required(raw.stock, position, "stock")?,
            units_sold: required(raw.units_sold, position, "units_sold")?,
            unit_cost: raw.unit_cost.filter(|cost| cost.is_finite()),
            ordering_cost: required(raw.ordering_cost, position, "ordering_cost")?,
            lead_time_days: required(raw.lead_time_days, position, "lead_time_days")?,
            intake_date: raw.intake_date,
            last_intake_date: raw.last_intake_date,
        })
    }
}

fn required(value: Option<f64>, position: usize, field: &'static str) -> AppResult<f64> {
    value
        .filter(|number| number.is_finite())
        .ok_or(AppError::Validation { position, field })
}
