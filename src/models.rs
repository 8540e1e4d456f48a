use crate::errors::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A derived figure that is either a finite number or the canonical empty
/// marker. Empty serializes as `""` so it renders the same way a blank cell does.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Metric {
    #[default]
    Empty,
    Value(f64),
}

impl Metric {
    /// Non-finite input collapses to `Empty`.
    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Self::Value(value)
        } else {
            Self::Empty
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Self::Empty => None,
            Self::Value(value) => Some(value),
        }
    }
}

impl From<Option<f64>> for Metric {
    fn from(value: Option<f64>) -> Self {
        value.map(Self::new).unwrap_or(Self::Empty)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Value(value) => write!(f, "{}", value),
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_str(""),
            Self::Value(value) => serializer.serialize_f64(*value),
        }
    }
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(Self::Empty),
            Some(Repr::Number(value)) => Ok(Self::new(value)),
            Some(Repr::Text(text)) if text.trim().is_empty() => Ok(Self::Empty),
            Some(Repr::Text(text)) => text
                .trim()
                .parse::<f64>()
                .map(Self::new)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseStrategy {
    Reorder,
    Prepare,
}

impl PurchaseStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reorder => "Reorder",
            Self::Prepare => "Prepare",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Reorder" => Some(Self::Reorder),
            "Prepare" => Some(Self::Prepare),
            _ => None,
        }
    }
}

/// Row as handed over by a record reader. Every field may be missing; the
/// metrics engine decides which ones are required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, alias = "Producto", alias = "productName")]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "blank_number::deserialize", alias = "Stock")]
    pub stock: Option<f64>,
    #[serde(default, deserialize_with = "blank_number::deserialize", alias = "Vendido", alias = "unitsSold")]
    pub units_sold: Option<f64>,
    #[serde(default, deserialize_with = "blank_number::deserialize", alias = "Costo", alias = "unitCost")]
    pub unit_cost: Option<f64>,
    #[serde(default, deserialize_with = "blank_number::deserialize", alias = "CostoOrdenar", alias = "orderingCost")]
    pub ordering_cost: Option<f64>,
    #[serde(default, deserialize_with = "blank_number::deserialize", alias = "TiempoEntregaDías", alias = "leadTimeDays")]
    pub lead_time_days: Option<f64>,
    #[serde(default, with = "blank_date", alias = "FechaIngreso", alias = "intakeDate")]
    pub intake_date: Option<NaiveDate>,
    #[serde(default, with = "blank_date", alias = "FechaÚltimoIngreso", alias = "lastIntakeDate")]
    pub last_intake_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    pub sequence_id: u32,
    pub product_name: String,
    pub stock: f64,
    pub units_sold: f64,
    pub unit_cost: Metric,
    pub ordering_cost: f64,
    pub lead_time_days: f64,
    #[serde(with = "blank_date")]
    pub intake_date: Option<NaiveDate>,
    #[serde(with = "blank_date")]
    pub last_intake_date: Option<NaiveDate>,
    pub intake_total: f64,
    pub monthly_turnover: Metric,
    pub stockout_days: Metric,
    #[serde(with = "blank_strategy")]
    pub purchase_strategy: Option<PurchaseStrategy>,
    pub holding_cost: Metric,
    pub reorder_quantity: Metric,
}

impl EnrichedRecord {
    pub fn projection(&self) -> RowProjection {
        RowProjection {
            product_name: self.product_name.clone(),
            stock: self.stock,
            units_sold: self.units_sold,
            intake_total: self.intake_total,
            monthly_turnover: self.monthly_turnover,
            stockout_days: self.stockout_days,
            purchase_strategy: self.purchase_strategy,
            holding_cost: self.holding_cost,
            reorder_quantity: self.reorder_quantity,
        }
    }
}

/// The figures a stored row keeps from an enriched record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowProjection {
    pub product_name: String,
    pub stock: f64,
    pub units_sold: f64,
    pub intake_total: f64,
    pub monthly_turnover: Metric,
    pub stockout_days: Metric,
    #[serde(with = "blank_strategy")]
    pub purchase_strategy: Option<PurchaseStrategy>,
    pub holding_cost: Metric,
    pub reorder_quantity: Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRow {
    pub id: i64,
    pub product_name: String,
    pub stock: f64,
    pub units_sold: f64,
    pub intake_total: f64,
    pub monthly_turnover: Metric,
    pub stockout_days: Metric,
    #[serde(with = "blank_strategy")]
    pub purchase_strategy: Option<PurchaseStrategy>,
    pub holding_cost: Metric,
    pub reorder_quantity: Metric,
    pub notes: String,
    pub imported_at: DateTime<Utc>,
}

impl StoredRow {
    pub fn projection(&self) -> RowProjection {
        RowProjection {
            product_name: self.product_name.clone(),
            stock: self.stock,
            units_sold: self.units_sold,
            intake_total: self.intake_total,
            monthly_turnover: self.monthly_turnover,
            stockout_days: self.stockout_days,
            purchase_strategy: self.purchase_strategy,
            holding_cost: self.holding_cost,
            reorder_quantity: self.reorder_quantity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Share of unit cost charged as holding cost, in percent.
    pub holding_cost_percent: f64,
    pub turnover_window_days: f64,
    pub reorder_level_max: f64,
    pub prepare_level_max: f64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            holding_cost_percent: 26.0,
            turnover_window_days: 30.0,
            reorder_level_max: 1.0,
            prepare_level_max: 1.25,
        }
    }
}

impl AppSettings {
    /// Rejects values that would turn a derived figure negative or make the
    /// two replenishment bands overlap.
    pub fn validate(&self) -> AppResult<()> {
        if !(self.holding_cost_percent > 0.0 && self.holding_cost_percent.is_finite()) {
            return Err(AppError::Settings(format!(
                "holdingCostPercent must be positive, got {}",
                self.holding_cost_percent
            )));
        }
        if !(self.turnover_window_days > 0.0 && self.turnover_window_days.is_finite()) {
            return Err(AppError::Settings(format!(
                "turnoverWindowDays must be positive, got {}",
                self.turnover_window_days
            )));
        }
        if !(self.reorder_level_max > 0.0
            && self.reorder_level_max <= self.prepare_level_max
            && self.prepare_level_max.is_finite())
        {
            return Err(AppError::Settings(format!(
                "expected 0 < reorderLevelMax <= prepareLevelMax, got {} and {}",
                self.reorder_level_max, self.prepare_level_max
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SearchCorpus {
    #[default]
    Loaded,
    Stored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendNotePayload {
    pub id: i64,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResponse {
    pub batch: Vec<EnrichedRecord>,
    pub stored: Vec<StoredRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchResponse {
    Loaded(Vec<EnrichedRecord>),
    Stored(Vec<StoredRow>),
}

const EMPTY_CELL_MARKERS: &[&str] = &["", "nat", "nan", "null", "none"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];
const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Normalizes a date cell. Null-like markers become `None`.
pub fn parse_record_date(raw: &str) -> Result<Option<NaiveDate>, String> {
    let trimmed = raw.trim();
    if EMPTY_CELL_MARKERS
        .iter()
        .any(|marker| trimmed.eq_ignore_ascii_case(marker))
    {
        return Ok(None);
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(Some(date));
        }
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(stamp) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Some(stamp.date()));
        }
    }
    Err(format!("unrecognized date '{}'", trimmed))
}

pub(crate) mod blank_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.collect_str(&date.format("%Y-%m-%d")),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => super::parse_record_date(&raw).map_err(serde::de::Error::custom),
        }
    }
}

/// Numeric cells: blank or null-like text reads as missing, numeric text is
/// parsed. CSV and JSON sources go through the same path.
pub(crate) mod blank_number {
    use serde::de::{self, Deserializer, Visitor};
    use std::fmt;

    struct BlankNumber;

    impl<'de> Visitor<'de> for BlankNumber {
        type Value = Option<f64>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number, numeric text or a blank cell")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
            deserializer.deserialize_any(self)
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
            Ok(Some(value))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(Some(value as f64))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(Some(value as f64))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            let trimmed = value.trim();
            if super::EMPTY_CELL_MARKERS
                .iter()
                .any(|marker| trimmed.eq_ignore_ascii_case(marker))
            {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .map(Some)
                .map_err(|_| E::custom(format!("expected a number, got '{}'", trimmed)))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        deserializer.deserialize_option(BlankNumber)
    }
}

pub(crate) mod blank_strategy {
    use super::PurchaseStrategy;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<PurchaseStrategy>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.map(PurchaseStrategy::as_str).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<PurchaseStrategy>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(None);
        }
        PurchaseStrategy::parse(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown purchase strategy '{}'", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_record_date, AppSettings, EnrichedRecord, Metric, PurchaseStrategy, RawRecord};
    use crate::errors::AppError;
    use chrono::NaiveDate;

    #[test]
    fn metric_empty_serializes_as_blank_string() {
        assert_eq!(serde_json::to_string(&Metric::Empty).expect("json"), "\"\"");
        assert_eq!(serde_json::to_string(&Metric::Value(4.0)).expect("json"), "4.0");
        assert_eq!(Metric::Empty.to_string(), "");
    }

    #[test]
    fn metric_rejects_non_finite_values() {
        assert_eq!(Metric::new(f64::NAN), Metric::Empty);
        assert_eq!(Metric::new(f64::INFINITY), Metric::Empty);
        assert_eq!(Metric::from(Some(2.5)), Metric::Value(2.5));
    }

    #[test]
    fn metric_reads_blank_and_numeric_forms() {
        let parsed: Vec<Metric> = serde_json::from_str(r#"["", null, 3, "  ", "1.5"]"#).expect("parse");
        assert_eq!(
            parsed,
            vec![Metric::Empty, Metric::Empty, Metric::Value(3.0), Metric::Empty, Metric::Value(1.5)]
        );
    }

    #[test]
    fn null_like_dates_normalize_to_none() {
        for raw in ["", "NaT", "nan", "NULL", " None "] {
            assert_eq!(parse_record_date(raw).expect("date"), None, "{raw}");
        }
        assert_eq!(
            parse_record_date("2026-08-19 00:00:00").expect("date"),
            NaiveDate::from_ymd_opt(2026, 8, 19)
        );
        assert_eq!(
            parse_record_date("19/08/2026").expect("date"),
            NaiveDate::from_ymd_opt(2026, 8, 19)
        );
        assert!(parse_record_date("next tuesday").is_err());
    }

    #[test]
    fn raw_record_accepts_legacy_headers() {
        let raw: RawRecord = serde_json::from_value(serde_json::json!({
            "Producto": "Widget",
            "Stock": 100,
            "Vendido": 30,
            "Costo": 10,
            "CostoOrdenar": 5,
            "TiempoEntregaDías": 7,
            "FechaIngreso": "NaT",
            "FechaÚltimoIngreso": null
        }))
        .expect("raw record");
        assert_eq!(raw.product_name.as_deref(), Some("Widget"));
        assert_eq!(raw.lead_time_days, Some(7.0));
        assert_eq!(raw.intake_date, None);
        assert_eq!(raw.last_intake_date, None);
    }

    #[test]
    fn raw_record_treats_blank_numeric_text_as_missing() {
        let raw: RawRecord = serde_json::from_value(serde_json::json!({
            "product_name": "Widget",
            "stock": "",
            "units_sold": " 30 ",
            "unit_cost": "nan",
            "ordering_cost": null,
            "lead_time_days": 7
        }))
        .expect("raw record");
        assert_eq!(raw.stock, None);
        assert_eq!(raw.units_sold, Some(30.0));
        assert_eq!(raw.unit_cost, None);
        assert_eq!(raw.ordering_cost, None);
        assert_eq!(raw.lead_time_days, Some(7.0));

        let error = serde_json::from_value::<RawRecord>(serde_json::json!({ "stock": "ten" }))
            .expect_err("non-numeric stock");
        assert!(error.to_string().contains("'ten'"), "{error}");
    }

    #[test]
    fn settings_validation_guards_formula_constants() {
        assert!(AppSettings::default().validate().is_ok());

        let cases = [
            AppSettings { holding_cost_percent: -26.0, ..AppSettings::default() },
            AppSettings { holding_cost_percent: 0.0, ..AppSettings::default() },
            AppSettings { turnover_window_days: 0.0, ..AppSettings::default() },
            AppSettings { reorder_level_max: 0.0, ..AppSettings::default() },
            AppSettings { reorder_level_max: 5.0, prepare_level_max: 0.1, ..AppSettings::default() },
        ];
        for settings in cases {
            assert!(matches!(settings.validate(), Err(AppError::Settings(_))), "{settings:?}");
        }

        let equal_bands = AppSettings { reorder_level_max: 1.1, prepare_level_max: 1.1, ..AppSettings::default() };
        assert!(equal_bands.validate().is_ok());
    }

    #[test]
    fn enriched_record_renders_empty_fields_as_blank() {
        let record = EnrichedRecord {
            sequence_id: 1,
            product_name: "Widget".to_string(),
            stock: 1.0,
            units_sold: 0.0,
            unit_cost: Metric::Empty,
            ordering_cost: 0.0,
            lead_time_days: 1.0,
            intake_date: None,
            last_intake_date: None,
            intake_total: 1.0,
            monthly_turnover: Metric::Empty,
            stockout_days: Metric::Empty,
            purchase_strategy: None,
            holding_cost: Metric::Empty,
            reorder_quantity: Metric::Empty,
        };
        let value = serde_json::to_value(&record).expect("json");
        assert_eq!(value["intakeDate"], "");
        assert_eq!(value["purchaseStrategy"], "");
        assert_eq!(value["reorderQuantity"], "");

        let back: EnrichedRecord = serde_json::from_value(value).expect("round trip");
        assert_eq!(back, record);
        assert_eq!(PurchaseStrategy::parse("Prepare"), Some(PurchaseStrategy::Prepare));
    }
}
