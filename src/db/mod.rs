use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, EnrichedRecord, Metric, PurchaseStrategy, StoredRow};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const ROW_COLUMNS: &str = "id, product_name, stock, units_sold, intake_total, monthly_turnover, stockout_days,
     purchase_strategy, holding_cost, reorder_quantity, notes, imported_at";

const LEGACY_IMPORTED_AT: &str = "1970-01-01T00:00:00+00:00";

/// Durable row store. Every public call that mutates data commits before it
/// returns; calls are serialized through the connection mutex.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| AppError::Storage(format!("cannot create {}: {}", parent.display(), err)))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };

        db.ensure_schema_extensions()?;
        db.ensure_default_settings()?;

        tracing::info!(path = %db.db_path.display(), journal_mode = %journal_mode, "opened inventory store");
        Ok(db)
    }

    /// Inserts every row of the batch with a fresh identifier and empty notes.
    /// Rows are never matched against existing ones; re-importing a product
    /// creates a second row for it.
    pub fn merge_batch(&self, rows: &[EnrichedRecord]) -> AppResult<Vec<StoredRow>> {
        let imported_at = Utc::now();

        let mut conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;
        let mut stored = Vec::with_capacity(rows.len());
        {
            let mut statement = tx.prepare(
                "INSERT INTO inventory_rows (
                   product_name, stock, units_sold, intake_total, monthly_turnover, stockout_days,
                   purchase_strategy, holding_cost, reorder_quantity, notes, imported_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, '', ?10)",
            )?;
            for row in rows {
                let projection = row.projection();
                statement.execute(params![
                    projection.product_name,
                    projection.stock,
                    projection.units_sold,
                    projection.intake_total,
                    projection.monthly_turnover.value(),
                    projection.stockout_days.value(),
                    strategy_as_str(projection.purchase_strategy),
                    projection.holding_cost.value(),
                    projection.reorder_quantity.value(),
                    imported_at.to_rfc3339(),
                ])?;

                stored.push(StoredRow {
                    id: tx.last_insert_rowid(),
                    product_name: projection.product_name,
                    stock: projection.stock,
                    units_sold: projection.units_sold,
                    intake_total: projection.intake_total,
                    monthly_turnover: projection.monthly_turnover,
                    stockout_days: projection.stockout_days,
                    purchase_strategy: projection.purchase_strategy,
                    holding_cost: projection.holding_cost,
                    reorder_quantity: projection.reorder_quantity,
                    notes: String::new(),
                    imported_at,
                });
            }
        }
        tx.commit()?;

        tracing::info!(
            rows = stored.len(),
            first_id = stored.first().map(|row| row.id),
            last_id = stored.last().map(|row| row.id),
            "merged inventory batch"
        );
        Ok(stored)
    }

    pub fn list_all(&self) -> AppResult<Vec<StoredRow>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let query = format!("SELECT {} FROM inventory_rows ORDER BY id ASC", ROW_COLUMNS);
        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map([], parse_stored_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn get_row(&self, id: i64) -> AppResult<Option<StoredRow>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let query = format!("SELECT {} FROM inventory_rows WHERE id = ?1", ROW_COLUMNS);
        conn.query_row(&query, [id], parse_stored_row)
            .optional()
            .map_err(AppError::from)
    }

    pub fn row_count(&self) -> AppResult<u64> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM inventory_rows", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Appends `note` to the row's notes, joined to earlier notes by a newline.
    pub fn append_note(&self, id: i64, note: &str) -> AppResult<StoredRow> {
        let mut conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row("SELECT notes FROM inventory_rows WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        let Some(existing) = existing else {
            return Err(AppError::NotFound(id));
        };
        if note.trim().is_empty() {
            return Err(AppError::EmptyNote(id));
        }

        let notes = if existing.is_empty() {
            note.to_string()
        } else {
            format!("{}\n{}", existing, note)
        };
        tx.execute(
            "UPDATE inventory_rows SET notes = ?1 WHERE id = ?2",
            params![notes, id],
        )?;

        let query = format!("SELECT {} FROM inventory_rows WHERE id = ?1", ROW_COLUMNS);
        let row = tx.query_row(&query, [id], parse_stored_row)?;
        tx.commit()?;

        tracing::info!(id, note_bytes = note.len(), "appended note");
        Ok(row)
    }

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'app'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(AppSettings::default());
        };
        let parsed = serde_json::from_str::<AppSettings>(&raw)
            .map_err(AppError::from)
            .and_then(|settings| settings.validate().map(|()| settings));
        match parsed {
            Ok(settings) => Ok(settings),
            Err(error) => {
                tracing::warn!(error = %error, "stored settings are unusable, falling back to defaults");
                Ok(AppSettings::default())
            }
        }
    }

    /// Merges a partial JSON object into the stored settings.
    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: AppSettings =
            serde_json::from_value(merged).map_err(|error| AppError::Settings(error.to_string()))?;
        settings
            .validate()
            .inspect_err(|error| tracing::warn!(error = %error, "rejected settings update"))?;

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('app', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(&settings)?, Utc::now().to_rfc3339()],
        )?;

        tracing::info!(settings = ?settings, "updated settings");
        Ok(settings)
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM settings WHERE key = 'app'", [], |row| row.get(0))?;
        if count == 0 {
            conn.execute(
                "INSERT INTO settings (key, value_json, updated_at) VALUES ('app', ?1, ?2)",
                params![
                    serde_json::to_string(&AppSettings::default())?,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(())
    }

    // Files written before notes and import timestamps existed lack these columns.
    fn ensure_schema_extensions(&self) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;

        if !column_exists(&conn, "inventory_rows", "notes")? {
            conn.execute(
                "ALTER TABLE inventory_rows ADD COLUMN notes TEXT NOT NULL DEFAULT ''",
                [],
            )?;
        }
        if !column_exists(&conn, "inventory_rows", "imported_at")? {
            conn.execute(
                &format!(
                    "ALTER TABLE inventory_rows ADD COLUMN imported_at TEXT NOT NULL DEFAULT '{}'",
                    LEGACY_IMPORTED_AT
                ),
                [],
            )?;
        }
        Ok(())
    }
}

fn parse_stored_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRow> {
    let strategy: String = row.get(7)?;
    let imported_at: String = row.get(11)?;
    Ok(StoredRow {
        id: row.get(0)?,
        product_name: row.get(1)?,
        stock: row.get(2)?,
        units_sold: row.get(3)?,
        intake_total: row.get(4)?,
        monthly_turnover: Metric::from(row.get::<_, Option<f64>>(5)?),
        stockout_days: Metric::from(row.get::<_, Option<f64>>(6)?),
        purchase_strategy: parse_strategy(&strategy)?,
        holding_cost: Metric::from(row.get::<_, Option<f64>>(8)?),
        reorder_quantity: Metric::from(row.get::<_, Option<f64>>(9)?),
        notes: row.get(10)?,
        imported_at: parse_time(&imported_at)?,
    })
}

fn strategy_as_str(strategy: Option<PurchaseStrategy>) -> &'static str {
    strategy.map(PurchaseStrategy::as_str).unwrap_or("")
}

fn parse_strategy(raw: &str) -> rusqlite::Result<Option<PurchaseStrategy>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    PurchaseStrategy::parse(raw).map(Some).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown purchase strategy '{}'", raw),
            )),
        )
    })
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                11,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => *target = update,
    }
}
