use crate::db::Database;
use crate::errors::AppResult;
use crate::import;
use crate::metrics::MetricsEngine;
use crate::models::{
    AppSettings, AppendNotePayload, EnrichedRecord, LoadResponse, RawRecord, SearchCorpus, SearchResponse, StoredRow,
};
use crate::session::Session;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

pub const DATABASE_FILE: &str = "inventory.sqlite";

/// Entry point for presenters: owns the store and the session and runs one
/// action at a time.
#[derive(Debug)]
pub struct DeskCore {
    db: Database,
    session: Session,
}

impl DeskCore {
    pub fn new(data_dir: &Path) -> AppResult<Self> {
        let db_path: PathBuf = data_dir.join(DATABASE_FILE);
        Ok(Self::with_database(Database::new(&db_path)?))
    }

    pub fn with_database(db: Database) -> Self {
        Self {
            db,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Reads, enriches and persists a record file.
    pub fn load_file(&mut self, path: &Path, as_of: NaiveDateTime) -> AppResult<LoadResponse> {
        let records = import::read_records(path)?;
        self.load_records(&records, as_of)
    }

    pub fn load_records(&mut self, records: &[RawRecord], as_of: NaiveDateTime) -> AppResult<LoadResponse> {
        let batch = self.engine()?.enrich(records, as_of)?;
        let stored = self.db.merge_batch(&batch)?;
        self.session.remember_load(batch.clone(), &stored);
        Ok(LoadResponse { batch, stored })
    }

    /// Enriches a record file for display only; nothing is written.
    pub fn preview_file(&mut self, path: &Path, as_of: NaiveDateTime) -> AppResult<Vec<EnrichedRecord>> {
        let records = import::read_records(path)?;
        let batch = self.engine()?.enrich(&records, as_of)?;
        self.session.remember_preview(batch.clone());
        Ok(batch)
    }

    pub fn list_stored(&mut self) -> AppResult<Vec<StoredRow>> {
        let rows = self.db.list_all()?;
        self.session.remember_listing(rows.clone());
        Ok(rows)
    }

    pub fn search(&self, query: &str, corpus: SearchCorpus) -> SearchResponse {
        match corpus {
            SearchCorpus::Loaded => SearchResponse::Loaded(self.session.search_loaded(query)),
            SearchCorpus::Stored => SearchResponse::Stored(self.session.search_stored(query)),
        }
    }

    pub fn add_note(&mut self, payload: AppendNotePayload) -> AppResult<StoredRow> {
        let row = self.db.append_note(payload.id, &payload.note)?;
        self.session.refresh_row(&row);
        Ok(row)
    }

    pub fn stored_id_for(&self, sequence_id: u32) -> Option<i64> {
        self.session.stored_id_for(sequence_id)
    }

    pub fn settings(&self) -> AppResult<AppSettings> {
        self.db.get_settings()
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        self.db.update_settings(update)
    }

    fn engine(&self) -> AppResult<MetricsEngine> {
        Ok(MetricsEngine::new(&self.db.get_settings()?))
    }
}

#[cfg(test)]
mod tests {
    use super::DeskCore;
    use crate::errors::AppError;
    use crate::models::{AppendNotePayload, RawRecord, SearchCorpus, SearchResponse};
    use chrono::{NaiveDate, NaiveDateTime};

    fn as_of() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .and_then(|date| date.and_hms_opt(8, 0, 0))
            .expect("clock")
    }

    fn raw(name: &str) -> RawRecord {
        RawRecord {
            product_name: Some(name.to_string()),
            stock: Some(10.0),
            units_sold: Some(60.0),
            unit_cost: Some(50.0),
            ordering_cost: Some(65.0),
            lead_time_days: Some(10.0),
            intake_date: NaiveDate::from_ymd_opt(2026, 9, 18),
            last_intake_date: None,
        }
    }

    #[test]
    fn note_added_through_desk_updates_cached_listing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut desk = DeskCore::new(dir.path()).expect("desk");
        let loaded = desk.load_records(&[raw("Bolt"), raw("Nut")], as_of()).expect("load");
        desk.list_stored().expect("list");

        let id = desk.stored_id_for(2).expect("mapped id");
        assert_eq!(id, loaded.stored[1].id);
        desk.add_note(AppendNotePayload {
            id,
            note: "call supplier".to_string(),
        })
        .expect("note");

        match desk.search("nut", SearchCorpus::Stored) {
            SearchResponse::Stored(rows) => assert_eq!(rows[0].notes, "call supplier"),
            other => panic!("unexpected corpus: {other:?}"),
        }
    }

    #[test]
    fn failed_load_persists_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut desk = DeskCore::new(dir.path()).expect("desk");
        let mut broken = raw("Broken");
        broken.lead_time_days = None;

        let error = desk
            .load_records(&[raw("Bolt"), broken], as_of())
            .expect_err("invalid batch");
        assert!(matches!(error, AppError::Validation { position: 2, field: "lead_time_days" }));
        assert!(desk.list_stored().expect("list").is_empty());
        assert!(desk.session().loaded().is_empty());
    }

    #[test]
    fn settings_feed_the_engine() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut desk = DeskCore::new(dir.path()).expect("desk");
        desk.update_settings(serde_json::json!({ "holdingCostPercent": 10.0 }))
            .expect("settings");
        let loaded = desk.load_records(&[raw("Bolt")], as_of()).expect("load");
        assert_eq!(loaded.batch[0].holding_cost.value(), Some(5.0));
    }
}
